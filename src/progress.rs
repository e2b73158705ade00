use lsp_server::{Notification, Request, RequestId};
use lsp_types::notification::Notification as _;
use lsp_types::request::Request as _;
use lsp_types::{
    NumberOrString, ProgressParams, ProgressParamsValue, WorkDoneProgress, WorkDoneProgressBegin,
    WorkDoneProgressCreateParams, WorkDoneProgressEnd, WorkDoneProgressReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    Active,
    Ended,
}

/// Work-done progress state machine for one batch check.
///
/// Emits exactly one `begin`, reports in update order, and at most one
/// `end` per token; the caller decides whether to create one at all (the
/// client capability and the progress threshold gate that).
#[derive(Debug)]
pub struct ProgressReporter {
    token: String,
    state: State,
}

impl ProgressReporter {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into(), state: State::Pending }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// The `window/workDoneProgress/create` request negotiating the token.
    pub fn create_request(&self, id: RequestId) -> Request {
        Request::new(
            id,
            lsp_types::request::WorkDoneProgressCreate::METHOD.to_string(),
            WorkDoneProgressCreateParams {
                token: NumberOrString::String(self.token.clone()),
            },
        )
    }

    /// The `begin` event. Only the first call produces one.
    pub fn begin(&mut self, title: impl Into<String>) -> Option<Notification> {
        if self.state != State::Pending {
            return None;
        }
        self.state = State::Active;
        Some(self.notification(WorkDoneProgress::Begin(WorkDoneProgressBegin {
            title: title.into(),
            cancellable: Some(false),
            message: None,
            percentage: Some(0),
        })))
    }

    /// A percentage report; dropped unless the progress is active.
    pub fn report(&mut self, percentage: u32) -> Option<Notification> {
        if self.state != State::Active {
            return None;
        }
        Some(self.notification(WorkDoneProgress::Report(WorkDoneProgressReport {
            cancellable: Some(false),
            message: None,
            percentage: Some(percentage),
        })))
    }

    /// The `end` event. Only the first call after `begin` produces one.
    pub fn end(&mut self) -> Option<Notification> {
        if self.state != State::Active {
            return None;
        }
        self.state = State::Ended;
        Some(self.notification(WorkDoneProgress::End(WorkDoneProgressEnd { message: None })))
    }

    fn notification(&self, value: WorkDoneProgress) -> Notification {
        Notification::new(
            lsp_types::notification::Progress::METHOD.to_string(),
            ProgressParams {
                token: NumberOrString::String(self.token.clone()),
                value: ProgressParamsValue::WorkDone(value),
            },
        )
    }
}
