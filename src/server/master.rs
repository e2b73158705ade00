use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crossbeam_channel::Sender;
use lsp_server::{Message, Notification, Request, RequestId, Response};
use lsp_types::notification::Notification as _;
use lsp_types::request::Request as _;
use lsp_types::{InitializeParams, MessageType, ShowMessageParams, Uri};

use crate::controller::{stable_hash, Request as CheckRequest, TypeCheckController};
use crate::lsp_util::{is_untitled, uri_to_path};
use crate::progress::ProgressReporter;
use crate::sig::is_signature_path;

use super::{
    Dest, SendMessageJob, TypecheckParams, TypecheckStartParams, TypecheckUpdateParams, WorkerId,
    TYPECHECK_METHOD, TYPECHECK_START_METHOD, TYPECHECK_UPDATE_METHOD,
};

struct ActiveCheck {
    request: CheckRequest,
    progress: Option<ProgressReporter>,
}

struct SymbolQuery {
    respond_to: RequestId,
    pending: HashMap<RequestId, WorkerId>,
    results: Vec<serde_json::Value>,
}

struct ShutdownState {
    respond_to: RequestId,
    pending: HashMap<RequestId, WorkerId>,
}

/// The LSP endpoint the client talks to. Demultiplexes client traffic to
/// the worker pool, aggregates worker traffic back, and accounts batch
/// progress. Never touches type-level work itself.
///
/// Runs entirely on one event-loop thread; every outbound message goes
/// through the write queue in insertion order.
pub struct Master {
    controller: TypeCheckController,
    queue: Sender<SendMessageJob>,
    report_progress_threshold: usize,
    work_done_progress: bool,
    current: Option<ActiveCheck>,
    /// Outstanding interaction round-trips: outgoing id → client id.
    interaction_requests: HashMap<RequestId, RequestId>,
    cancelled_interactions: HashSet<RequestId>,
    symbol_query: Option<SymbolQuery>,
    shutdown: Option<ShutdownState>,
    alive_check_workers: Vec<bool>,
    next_outgoing_id: i32,
    fatal: bool,
    exit: bool,
}

impl Master {
    pub fn new(
        check_worker_count: usize,
        report_progress_threshold: usize,
        queue: Sender<SendMessageJob>,
    ) -> Self {
        let check_worker_count = check_worker_count.max(1);
        Self {
            controller: TypeCheckController::new(check_worker_count),
            queue,
            report_progress_threshold,
            work_done_progress: false,
            current: None,
            interaction_requests: HashMap::new(),
            cancelled_interactions: HashSet::new(),
            symbol_query: None,
            shutdown: None,
            alive_check_workers: vec![true; check_worker_count],
            next_outgoing_id: 0,
            fatal: false,
            exit: false,
        }
    }

    pub fn should_exit(&self) -> bool {
        self.exit
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Record client capabilities and introduce the session to every
    /// worker.
    pub fn initialize(&mut self, params: &InitializeParams) {
        self.work_done_progress = params
            .capabilities
            .window
            .as_ref()
            .and_then(|w| w.work_done_progress)
            .unwrap_or(false);
        for id in self.all_workers() {
            let outgoing = self.next_id();
            self.push(
                Dest::Worker(id),
                Message::Request(Request::new(
                    outgoing,
                    lsp_types::request::Initialize::METHOD.to_string(),
                    serde_json::json!({ "capabilities": {} }),
                )),
            );
            self.push(
                Dest::Worker(id),
                Message::Notification(Notification::new(
                    lsp_types::notification::Initialized::METHOD.to_string(),
                    serde_json::json!({}),
                )),
            );
        }
    }

    pub fn handle_client_message(&mut self, message: Message) {
        match message {
            Message::Request(req) => self.handle_client_request(req),
            Message::Notification(not) => self.handle_client_notification(not),
            // The only request the master sends the client is progress
            // creation; the reply carries nothing actionable.
            Message::Response(_) => {}
        }
    }

    fn handle_client_request(&mut self, req: Request) {
        match req.method.as_str() {
            lsp_types::request::Initialize::METHOD => {
                // Normally consumed by the connection handshake; kept for
                // direct drives of the handler.
                match serde_json::from_value::<InitializeParams>(req.params) {
                    Ok(params) => {
                        self.initialize(&params);
                        self.respond_ok(req.id, serde_json::json!({ "capabilities": {} }));
                    }
                    Err(e) => self.respond_invalid(req.id, &e.to_string()),
                }
            }
            lsp_types::request::HoverRequest::METHOD
            | lsp_types::request::Completion::METHOD => {
                match request_uri(&req.params) {
                    Some(uri) if is_untitled(&uri) => {
                        self.respond_ok(req.id, serde_json::Value::Null);
                    }
                    Some(_) => self.forward_interaction(req),
                    None => self.respond_invalid(req.id, "missing textDocument.uri"),
                }
            }
            lsp_types::request::GotoDefinition::METHOD
            | lsp_types::request::GotoImplementation::METHOD => {
                match request_uri(&req.params) {
                    Some(uri) if is_untitled(&uri) => {
                        self.respond_ok(req.id, serde_json::json!([]));
                    }
                    Some(_) => self.forward_interaction(req),
                    None => self.respond_invalid(req.id, "missing textDocument.uri"),
                }
            }
            lsp_types::request::WorkspaceSymbolRequest::METHOD => {
                self.broadcast_symbol_query(req);
            }
            TYPECHECK_METHOD => {
                let params: TypecheckParams =
                    serde_json::from_value(req.params).unwrap_or_default();
                self.start_type_check(params, Some(req.id));
            }
            lsp_types::request::Shutdown::METHOD => {
                let mut pending = HashMap::new();
                for id in self.all_workers() {
                    let outgoing = self.next_id();
                    pending.insert(outgoing.clone(), id);
                    self.push(
                        Dest::Worker(id),
                        Message::Request(Request::new(
                            outgoing,
                            lsp_types::request::Shutdown::METHOD.to_string(),
                            serde_json::Value::Null,
                        )),
                    );
                }
                self.shutdown = Some(ShutdownState { respond_to: req.id, pending });
            }
            other => {
                let resp = Response::new_err(
                    req.id,
                    lsp_server::ErrorCode::MethodNotFound as i32,
                    format!("unknown method: {other}"),
                );
                self.push(Dest::Client, Message::Response(resp));
            }
        }
    }

    fn handle_client_notification(&mut self, not: Notification) {
        match not.method.as_str() {
            lsp_types::notification::DidOpenTextDocument::METHOD => {
                let Some(path) = notification_path(&not.params) else {
                    return;
                };
                self.controller.update_priority(&[path], &[]);
                self.broadcast_check_workers(Message::Notification(not));
            }
            lsp_types::notification::DidCloseTextDocument::METHOD => {
                let Some(path) = notification_path(&not.params) else {
                    return;
                };
                self.controller.update_priority(&[], &[path]);
                self.broadcast_check_workers(Message::Notification(not));
            }
            lsp_types::notification::DidChangeTextDocument::METHOD => {
                let Some(path) = notification_path(&not.params) else {
                    return;
                };
                if is_signature_path(&path) {
                    // Signature edits revalidate the whole environment on
                    // the signature worker; code files go through batches.
                    self.push(
                        Dest::Worker(WorkerId::Signature),
                        Message::Notification(not),
                    );
                } else {
                    self.controller.push_change(path);
                    self.broadcast_check_workers(Message::Notification(not));
                }
            }
            lsp_types::notification::DidSaveTextDocument::METHOD => {}
            lsp_types::notification::Cancel::METHOD => {
                self.forward_cancel(&not);
            }
            lsp_types::notification::Exit::METHOD => {
                for id in self.all_workers() {
                    self.push(
                        Dest::Worker(id),
                        Message::Notification(Notification::new(
                            lsp_types::notification::Exit::METHOD.to_string(),
                            serde_json::Value::Null,
                        )),
                    );
                }
                self.exit = true;
            }
            _ => {}
        }
    }

    pub fn handle_worker_message(&mut self, source: WorkerId, message: Message) {
        match message {
            Message::Notification(not) => match not.method.as_str() {
                lsp_types::notification::PublishDiagnostics::METHOD => {
                    self.push(Dest::Client, Message::Notification(not));
                }
                TYPECHECK_UPDATE_METHOD => {
                    if let Ok(params) =
                        serde_json::from_value::<TypecheckUpdateParams>(not.params)
                    {
                        self.on_type_check_update(source, &params);
                    }
                }
                lsp_types::notification::ShowMessage::METHOD => {
                    if let Ok(params) =
                        serde_json::from_value::<ShowMessageParams>(not.params.clone())
                    {
                        if params.typ == MessageType::ERROR {
                            eprintln!(
                                "[sigil-master] unrecoverable error from worker {source}: {}",
                                params.message
                            );
                            self.fatal = true;
                        }
                    }
                    self.push(Dest::Client, Message::Notification(not));
                }
                _ => {}
            },
            Message::Response(resp) => self.handle_worker_response(resp),
            // Workers never initiate requests toward the master.
            Message::Request(_) => {}
        }
    }

    fn handle_worker_response(&mut self, resp: Response) {
        let mut acked_shutdown = false;
        if let Some(state) = &mut self.shutdown {
            acked_shutdown = state.pending.remove(&resp.id).is_some();
        }
        if acked_shutdown {
            self.finish_shutdown_if_ready();
            return;
        }

        if let Some(client_id) = self.interaction_requests.remove(&resp.id) {
            if self.cancelled_interactions.remove(&resp.id) {
                return;
            }
            let forwarded = Response { id: client_id, result: resp.result, error: resp.error };
            self.push(Dest::Client, Message::Response(forwarded));
            return;
        }

        let mut in_query = false;
        if let Some(query) = &mut self.symbol_query {
            if query.pending.remove(&resp.id).is_some() {
                in_query = true;
                if let Some(serde_json::Value::Array(items)) = resp.result {
                    query.results.extend(items);
                }
            }
        }
        if in_query {
            self.finish_symbol_query_if_ready();
        }
        // Anything else (worker initialize replies) carries no state.
    }

    fn finish_shutdown_if_ready(&mut self) {
        let done = self
            .shutdown
            .as_ref()
            .map(|state| state.pending.is_empty())
            .unwrap_or(false);
        if done {
            if let Some(state) = self.shutdown.take() {
                self.respond_ok(state.respond_to, serde_json::Value::Null);
            }
        }
    }

    fn finish_symbol_query_if_ready(&mut self) {
        let done = self
            .symbol_query
            .as_ref()
            .map(|query| query.pending.is_empty())
            .unwrap_or(false);
        if done {
            if let Some(query) = self.symbol_query.take() {
                self.respond_ok(query.respond_to, serde_json::Value::Array(query.results));
            }
        }
    }

    /// A worker's stdout reached EOF: mark it dead and requeue whatever it
    /// still owed the current batch onto the survivors.
    pub fn handle_worker_exit(&mut self, source: WorkerId) {
        eprintln!("[sigil-master] worker {source} died");

        if let Some(state) = &mut self.shutdown {
            state.pending.retain(|_, worker| *worker != source);
        }
        self.finish_shutdown_if_ready();
        if let Some(query) = &mut self.symbol_query {
            query.pending.retain(|_, worker| *worker != source);
        }
        self.finish_symbol_query_if_ready();

        let WorkerId::Check(index) = source else {
            return;
        };
        if let Some(alive) = self.alive_check_workers.get_mut(index) {
            *alive = false;
        }

        let survivors: Vec<usize> = self
            .alive_check_workers
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(i, _)| i)
            .collect();

        let Some(active) = &mut self.current else {
            return;
        };
        let moved = active.request.take_remaining(index);
        if moved.is_empty() {
            return;
        }
        if survivors.is_empty() {
            self.send_error_message("all check workers died; shutting down");
            self.fatal = true;
            self.exit = true;
            return;
        }

        let guid = active.request.guid.clone();
        let mut per_worker: HashMap<usize, Vec<PathBuf>> = HashMap::new();
        for path in moved {
            let target = survivors[(stable_hash(&path) % survivors.len() as u64) as usize];
            per_worker.entry(target).or_default().push(path);
        }
        for (worker, paths) in per_worker {
            if let Some(active) = &mut self.current {
                active.request.extend_assignment(worker, paths.clone());
            }
            self.push(
                Dest::Worker(WorkerId::Check(worker)),
                Message::Notification(Notification::new(
                    TYPECHECK_START_METHOD.to_string(),
                    serde_json::to_value(TypecheckStartParams { guid: guid.clone(), paths })
                        .unwrap_or_default(),
                )),
            );
        }
    }

    /// Kick off a batch check: drain the controller, negotiate progress if
    /// the client can display it and the batch is big enough, and dispatch
    /// one start notification per assigned worker.
    pub fn start_type_check(&mut self, params: TypecheckParams, respond_to: Option<RequestId>) {
        for path in params.paths.unwrap_or_default() {
            self.controller.push_change(path);
        }

        let last = self.current.as_ref().map(|active| &active.request);
        let Some(request) = self.controller.make_request(last, params.guid, respond_to.clone())
        else {
            if let Some(id) = respond_to {
                self.respond_ok(id, serde_json::json!({ "guid": serde_json::Value::Null }));
            }
            return;
        };

        let progress = if self.work_done_progress
            && request.total >= self.report_progress_threshold
        {
            let mut reporter = ProgressReporter::new(request.guid.clone());
            let outgoing = self.next_id();
            self.push(
                Dest::Client,
                Message::Request(reporter.create_request(outgoing)),
            );
            if let Some(begin) = reporter.begin("sigil: checking") {
                self.push(Dest::Client, Message::Notification(begin));
            }
            Some(reporter)
        } else {
            None
        };

        for (index, paths) in request.assignments.iter().enumerate() {
            if paths.is_empty() {
                continue;
            }
            self.push(
                Dest::Worker(WorkerId::Check(index)),
                Message::Notification(Notification::new(
                    TYPECHECK_START_METHOD.to_string(),
                    serde_json::to_value(TypecheckStartParams {
                        guid: request.guid.clone(),
                        paths: paths.clone(),
                    })
                    .unwrap_or_default(),
                )),
            );
        }

        self.current = Some(ActiveCheck { request, progress });
    }

    /// Progress accounting for one finished file.
    fn on_type_check_update(&mut self, source: WorkerId, params: &TypecheckUpdateParams) {
        let WorkerId::Check(worker) = source else {
            return;
        };
        let (report, complete) = {
            let Some(active) = &mut self.current else {
                return;
            };
            // Stale updates from a superseded batch are dropped.
            if active.request.guid != params.guid {
                return;
            }
            if !active.request.mark_done(worker, &params.path) {
                return;
            }
            let percentage = active.request.percentage();
            let report = active
                .progress
                .as_mut()
                .and_then(|progress| progress.report(percentage));
            (report, active.request.is_complete())
        };
        if let Some(report) = report {
            self.push(Dest::Client, Message::Notification(report));
        }

        if complete {
            let Some(mut finished) = self.current.take() else {
                return;
            };
            if let Some(end) = finished.progress.as_mut().and_then(|p| p.end()) {
                self.push(Dest::Client, Message::Notification(end));
            }
            if let Some(respond_to) = finished.request.respond_to {
                self.respond_ok(
                    respond_to,
                    serde_json::json!({ "guid": finished.request.guid }),
                );
            }
        }
    }

    fn forward_interaction(&mut self, req: Request) {
        let outgoing = self.next_id();
        self.interaction_requests.insert(outgoing.clone(), req.id);
        self.push(
            Dest::Worker(WorkerId::Interaction),
            Message::Request(Request { id: outgoing, method: req.method, params: req.params }),
        );
    }

    fn forward_cancel(&mut self, not: &Notification) {
        let Some(client_id) = cancel_target(&not.params) else {
            return;
        };
        let Some(outgoing) = self
            .interaction_requests
            .iter()
            .find(|(_, client)| **client == client_id)
            .map(|(outgoing, _)| outgoing.clone())
        else {
            return;
        };
        self.cancelled_interactions.insert(outgoing.clone());
        self.push(
            Dest::Worker(WorkerId::Interaction),
            Message::Notification(Notification::new(
                lsp_types::notification::Cancel::METHOD.to_string(),
                serde_json::json!({ "id": request_id_to_json(&outgoing) }),
            )),
        );
    }

    fn broadcast_symbol_query(&mut self, req: Request) {
        let mut pending = HashMap::new();
        for index in 0..self.controller.worker_count() {
            if !self.alive_check_workers[index] {
                continue;
            }
            let outgoing = self.next_id();
            pending.insert(outgoing.clone(), WorkerId::Check(index));
            self.push(
                Dest::Worker(WorkerId::Check(index)),
                Message::Request(Request {
                    id: outgoing,
                    method: req.method.clone(),
                    params: req.params.clone(),
                }),
            );
        }
        if pending.is_empty() {
            self.respond_ok(req.id, serde_json::json!([]));
            return;
        }
        self.symbol_query = Some(SymbolQuery {
            respond_to: req.id,
            pending,
            results: Vec::new(),
        });
    }

    fn broadcast_check_workers(&mut self, message: Message) {
        for index in 0..self.controller.worker_count() {
            if self.alive_check_workers[index] {
                self.push(Dest::Worker(WorkerId::Check(index)), clone_message(&message));
            }
        }
    }

    fn send_error_message(&mut self, text: &str) {
        self.push(
            Dest::Client,
            Message::Notification(Notification::new(
                lsp_types::notification::ShowMessage::METHOD.to_string(),
                serde_json::json!({ "type": MessageType::ERROR, "message": text }),
            )),
        );
    }

    fn all_workers(&self) -> Vec<WorkerId> {
        let mut ids = vec![WorkerId::Interaction, WorkerId::Signature];
        for i in 0..self.controller.worker_count() {
            ids.push(WorkerId::Check(i));
        }
        ids
    }

    fn respond_ok(&mut self, id: RequestId, result: serde_json::Value) {
        self.push(Dest::Client, Message::Response(Response::new_ok(id, result)));
    }

    fn respond_invalid(&mut self, id: RequestId, message: &str) {
        let resp = Response::new_err(
            id,
            lsp_server::ErrorCode::InvalidParams as i32,
            message.to_string(),
        );
        self.push(Dest::Client, Message::Response(resp));
    }

    fn next_id(&mut self) -> RequestId {
        self.next_outgoing_id += 1;
        RequestId::from(self.next_outgoing_id)
    }

    fn push(&mut self, dest: Dest, message: Message) {
        if self.queue.send(SendMessageJob { dest, message }).is_err() {
            eprintln!("[sigil-master] write queue closed");
        }
    }
}

/// `textDocument.uri` of a positional request's params.
fn request_uri(params: &serde_json::Value) -> Option<Uri> {
    params.get("textDocument")?.get("uri")?.as_str()?.parse().ok()
}

/// Filesystem path of a text-document notification; None for untitled
/// buffers, which never enter the pipeline.
fn notification_path(params: &serde_json::Value) -> Option<PathBuf> {
    let uri: Uri = params.get("textDocument")?.get("uri")?.as_str()?.parse().ok()?;
    if is_untitled(&uri) {
        return None;
    }
    uri_to_path(&uri)
}

fn cancel_target(params: &serde_json::Value) -> Option<RequestId> {
    match params.get("id")? {
        serde_json::Value::Number(n) => Some(RequestId::from(n.as_i64()? as i32)),
        serde_json::Value::String(s) => Some(RequestId::from(s.clone())),
        _ => None,
    }
}

fn request_id_to_json(id: &RequestId) -> serde_json::Value {
    // RequestId prints numbers bare and strings quoted.
    let repr = id.to_string();
    match repr.parse::<i64>() {
        Ok(n) => serde_json::json!(n),
        Err(_) => serde_json::json!(repr.trim_matches('"')),
    }
}

fn clone_message(message: &Message) -> Message {
    match message {
        Message::Request(r) => Message::Request(Request {
            id: r.id.clone(),
            method: r.method.clone(),
            params: r.params.clone(),
        }),
        Message::Response(r) => Message::Response(Response {
            id: r.id.clone(),
            result: r.result.clone(),
            error: r.error.clone(),
        }),
        Message::Notification(n) => Message::Notification(Notification {
            method: n.method.clone(),
            params: n.params.clone(),
        }),
    }
}
