use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use lsp_server::{Connection, Message, Notification, Request, Response};
use lsp_types::notification::Notification as _;
use lsp_types::request::Request as _;
use lsp_types::{MessageType, PublishDiagnosticsParams};

use crate::check::code::check_code_file;
use crate::check::check_file;
use crate::controller::assigned_worker;
use crate::diagnostics::{CheckError, Diagnostic};
use crate::lsp_util::{is_untitled, path_to_uri, to_lsp_diagnostic, uri_to_path, LineIndex};
use crate::parser::ast::SourceFile;
use crate::parser::parse_source;
use crate::sig::env::TypeEnv;
use crate::sig::{
    collect_code_files, collect_signature_files, is_code_path, read_source, register_file,
    Overlays,
};
use crate::sigilfile::SigilConfig;

use super::{interaction, TypecheckStartParams, TypecheckUpdateParams, TYPECHECK_START_METHOD, TYPECHECK_UPDATE_METHOD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    Interaction,
    Signature,
    Check { index: usize, count: usize },
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerRole::Interaction => write!(f, "interaction"),
            WorkerRole::Signature => write!(f, "signature"),
            WorkerRole::Check { index, count } => write!(f, "check {}/{}", index + 1, count),
        }
    }
}

/// One worker process: owns its own copy of the signature environment and
/// serves whichever requests its role covers.
pub struct Worker {
    role: WorkerRole,
    config: SigilConfig,
    sender: Sender<Message>,
    overlays: Overlays,
    files: Vec<PathBuf>,
    code_files: Vec<PathBuf>,
    sources: HashMap<PathBuf, String>,
    parsed: HashMap<PathBuf, SourceFile>,
    env: TypeEnv,
    /// Syntax and registration problems found while loading, keyed by file.
    load_diagnostics: HashMap<PathBuf, Vec<Diagnostic>>,
}

/// Run a worker over stdio until the master closes the channel or sends
/// `exit`.
pub fn run_worker(role: WorkerRole, config: SigilConfig) -> Result<(), CheckError> {
    let (connection, io_threads) = Connection::stdio();
    eprintln!("[sigil-worker] {role} worker started");

    let mut worker = Worker::new(role, config, connection.sender.clone())?;
    for message in &connection.receiver {
        match message {
            Message::Request(req) => worker.handle_request(req),
            Message::Notification(not) => {
                if not.method == lsp_types::notification::Exit::METHOD {
                    break;
                }
                worker.handle_notification(not);
            }
            Message::Response(_) => {}
        }
    }

    drop(worker);
    drop(connection);
    io_threads
        .join()
        .map_err(|e| CheckError::protocol(e.to_string()))?;
    eprintln!("[sigil-worker] {role} worker stopped");
    Ok(())
}

impl Worker {
    pub fn new(
        role: WorkerRole,
        config: SigilConfig,
        sender: Sender<Message>,
    ) -> Result<Self, CheckError> {
        let mut worker = Self {
            role,
            config,
            sender,
            overlays: Overlays::new(),
            files: Vec::new(),
            code_files: Vec::new(),
            sources: HashMap::new(),
            parsed: HashMap::new(),
            env: TypeEnv::with_builtins(),
            load_diagnostics: HashMap::new(),
        };
        worker.reload()?;
        Ok(worker)
    }

    pub fn env(&self) -> &TypeEnv {
        &self.env
    }

    pub fn sources(&self) -> &HashMap<PathBuf, String> {
        &self.sources
    }

    pub fn parsed(&self) -> &HashMap<PathBuf, SourceFile> {
        &self.parsed
    }

    /// Rebuild the environment from disk plus editor overlays. Whole-world
    /// reload: signature sets are small and re-checking is whole-file
    /// anyway.
    fn reload(&mut self) -> Result<(), CheckError> {
        self.files = collect_signature_files(&self.config.signature_dirs)?;
        self.code_files = collect_code_files(&self.config.code_dirs)?;
        self.sources.clear();
        self.parsed.clear();
        self.load_diagnostics.clear();

        let mut env = TypeEnv::with_builtins();
        for path in &self.files {
            let source = read_source(path, &self.overlays)?;
            let mut diags = Vec::new();
            match parse_source(&source) {
                Ok(file) => {
                    diags.extend(register_file(&mut env, path, &file));
                    self.parsed.insert(path.clone(), file);
                }
                Err(CheckError::Syntax { msg, span }) => {
                    diags.push(Diagnostic::error(
                        path,
                        span,
                        crate::diagnostics::DiagnosticCode::SyntaxError,
                        msg,
                    ));
                }
                Err(other) => return Err(other),
            }
            self.load_diagnostics.insert(path.clone(), diags);
            self.sources.insert(path.clone(), source);
        }
        self.env = env;

        // Code files are not registered anywhere; their sources are kept
        // for position mapping.
        for path in &self.code_files {
            let source = read_source(path, &self.overlays)?;
            self.sources.insert(path.clone(), source);
        }
        Ok(())
    }

    pub fn handle_request(&mut self, req: Request) {
        match req.method.as_str() {
            lsp_types::request::Initialize::METHOD => {
                self.respond(Response::new_ok(
                    req.id,
                    serde_json::json!({ "capabilities": {} }),
                ));
            }
            lsp_types::request::Shutdown::METHOD => {
                self.respond(Response::new_ok(req.id, serde_json::Value::Null));
            }
            lsp_types::request::HoverRequest::METHOD => {
                let result = serde_json::from_value(req.params)
                    .ok()
                    .and_then(|params| interaction::hover(self, &params));
                self.respond_serialized(req.id, &result);
            }
            lsp_types::request::Completion::METHOD => {
                let result = serde_json::from_value(req.params)
                    .ok()
                    .map(|params| interaction::completion(self, &params));
                self.respond_serialized(req.id, &result);
            }
            lsp_types::request::GotoDefinition::METHOD => {
                let locations = serde_json::from_value(req.params)
                    .ok()
                    .map(|params| interaction::definition(self, &params))
                    .unwrap_or_default();
                self.respond_serialized(req.id, &locations);
            }
            lsp_types::request::GotoImplementation::METHOD => {
                let locations = serde_json::from_value(req.params)
                    .ok()
                    .map(|params| interaction::implementation(self, &params))
                    .unwrap_or_default();
                self.respond_serialized(req.id, &locations);
            }
            lsp_types::request::WorkspaceSymbolRequest::METHOD => {
                let query = req
                    .params
                    .get("query")
                    .and_then(|q| q.as_str())
                    .unwrap_or("")
                    .to_string();
                let symbols = self.workspace_symbols(&query);
                self.respond(Response::new_ok(req.id, serde_json::Value::Array(symbols)));
            }
            other => {
                self.respond(Response::new_err(
                    req.id,
                    lsp_server::ErrorCode::MethodNotFound as i32,
                    format!("unknown method: {other}"),
                ));
            }
        }
    }

    pub fn handle_notification(&mut self, not: Notification) {
        match not.method.as_str() {
            lsp_types::notification::Initialized::METHOD => {
                if self.role == WorkerRole::Signature {
                    self.validate_signatures();
                }
            }
            lsp_types::notification::DidOpenTextDocument::METHOD => {
                let Some((path, text)) = open_params(&not.params) else {
                    return;
                };
                self.overlays.insert(path, text);
                self.after_edit();
            }
            lsp_types::notification::DidChangeTextDocument::METHOD => {
                let Some((path, text)) = change_params(&not.params) else {
                    return;
                };
                self.overlays.insert(path, text);
                self.after_edit();
            }
            lsp_types::notification::DidCloseTextDocument::METHOD => {
                let Some(path) = params_path(&not.params) else {
                    return;
                };
                self.overlays.remove(&path);
                self.after_edit();
            }
            TYPECHECK_START_METHOD => {
                if let Ok(params) = serde_json::from_value::<TypecheckStartParams>(not.params) {
                    self.run_batch(&params);
                }
            }
            // Handlers are run-to-completion; cancellation has nothing to
            // interrupt here.
            lsp_types::notification::Cancel::METHOD => {}
            _ => {}
        }
    }

    fn after_edit(&mut self) {
        if let Err(e) = self.reload() {
            self.show_error(&format!("failed to reload signatures: {e}"));
            return;
        }
        if self.role == WorkerRole::Signature {
            self.validate_signatures();
        }
    }

    /// Check each assigned path, publish its diagnostics, and report the
    /// file done to the master.
    fn run_batch(&mut self, params: &TypecheckStartParams) {
        let WorkerRole::Check { .. } = self.role else {
            return;
        };
        for path in &params.paths {
            match self.check_one(path) {
                Ok(diagnostics) => self.publish(path, &diagnostics),
                Err(e) => {
                    // Invariant violations and I/O problems terminate the
                    // file's check; the master decides what is fatal.
                    self.show_error(&format!("{}: {e}", path.display()));
                }
            }
            self.notify(
                TYPECHECK_UPDATE_METHOD,
                serde_json::to_value(TypecheckUpdateParams {
                    guid: params.guid.clone(),
                    path: path.clone(),
                })
                .unwrap_or_default(),
            );
        }
    }

    fn check_one(&self, path: &Path) -> Result<Vec<Diagnostic>, CheckError> {
        let source = read_source(path, &self.overlays)?;
        if is_code_path(path) {
            return check_code_file(&self.env, path, &source);
        }
        let mut diagnostics = self
            .load_diagnostics
            .get(path)
            .cloned()
            .unwrap_or_default();
        diagnostics.extend(check_file(&self.env, path, &source)?);
        Ok(diagnostics)
    }

    /// The signature worker's whole-environment pass: every file gets its
    /// load and check diagnostics republished, clearing stale ones.
    fn validate_signatures(&mut self) {
        for path in self.files.clone() {
            match self.check_one(&path) {
                Ok(diagnostics) => self.publish(&path, &diagnostics),
                Err(e) => self.show_error(&format!("{}: {e}", path.display())),
            }
        }
    }

    /// Symbols for the partition of files this worker owns, so that a
    /// master broadcast aggregates to exactly one copy of each.
    fn workspace_symbols(&self, query: &str) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        let query = query.to_lowercase();
        for (path, file) in &self.parsed {
            if let WorkerRole::Check { index, count } = self.role {
                if assigned_worker(path, count) != index {
                    continue;
                }
            }
            let Some(source) = self.sources.get(path) else {
                continue;
            };
            let index = LineIndex::new(source);
            for decl in &file.decls {
                let name = decl.node.name();
                if !query.is_empty() && !name.to_lowercase().contains(&query) {
                    continue;
                }
                let range = index.span_to_range(decl.span);
                let kind = match &decl.node {
                    crate::parser::ast::Decl::Class(_) => 5,     // Class
                    crate::parser::ast::Decl::Interface(_) => 11, // Interface
                    crate::parser::ast::Decl::Alias(_) => 26,    // TypeParameter
                };
                out.push(serde_json::json!({
                    "name": name,
                    "kind": kind,
                    "location": {
                        "uri": path_to_uri(path),
                        "range": range,
                    },
                }));
            }
        }
        out
    }

    fn publish(&self, path: &Path, diagnostics: &[Diagnostic]) {
        let source = self
            .sources
            .get(path)
            .cloned()
            .or_else(|| read_source(path, &self.overlays).ok())
            .unwrap_or_default();
        let index = LineIndex::new(&source);
        let params = PublishDiagnosticsParams {
            uri: path_to_uri(path),
            diagnostics: diagnostics.iter().map(|d| to_lsp_diagnostic(d, &index)).collect(),
            version: None,
        };
        self.notify(
            lsp_types::notification::PublishDiagnostics::METHOD,
            serde_json::to_value(params).unwrap_or_default(),
        );
    }

    fn show_error(&self, message: &str) {
        eprintln!("[sigil-worker] {}: {message}", self.role);
        self.notify(
            lsp_types::notification::ShowMessage::METHOD,
            serde_json::json!({ "type": MessageType::ERROR, "message": message }),
        );
    }

    fn notify(&self, method: &str, params: serde_json::Value) {
        let _ = self
            .sender
            .send(Message::Notification(Notification::new(method.to_string(), params)));
    }

    fn respond(&self, response: Response) {
        let _ = self.sender.send(Message::Response(response));
    }

    fn respond_serialized<T: serde::Serialize>(&self, id: lsp_server::RequestId, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.respond(Response::new_ok(id, value)),
            Err(e) => self.respond(Response::new_err(
                id,
                lsp_server::ErrorCode::InternalError as i32,
                e.to_string(),
            )),
        }
    }
}

fn params_path(params: &serde_json::Value) -> Option<PathBuf> {
    let uri: lsp_types::Uri = params.get("textDocument")?.get("uri")?.as_str()?.parse().ok()?;
    if is_untitled(&uri) {
        return None;
    }
    uri_to_path(&uri)
}

fn open_params(params: &serde_json::Value) -> Option<(PathBuf, String)> {
    let path = params_path(params)?;
    let text = params.get("textDocument")?.get("text")?.as_str()?.to_string();
    Some((path, text))
}

/// Full-sync change: the last content change carries the whole buffer.
fn change_params(params: &serde_json::Value) -> Option<(PathBuf, String)> {
    let path = params_path(params)?;
    let text = params
        .get("contentChanges")?
        .as_array()?
        .last()?
        .get("text")?
        .as_str()?
        .to_string();
    Some((path, text))
}
