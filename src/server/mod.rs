pub mod interaction;
pub mod master;
pub mod process;
pub mod worker;

use std::collections::HashMap;
use std::path::PathBuf;

use crossbeam_channel::unbounded;
use lsp_server::{Connection, Message};
use lsp_types::{
    CompletionOptions, HoverProviderCapability, ImplementationProviderCapability, OneOf,
    ServerCapabilities, TextDocumentSyncCapability, TextDocumentSyncKind,
};
use serde::{Deserialize, Serialize};

use crate::diagnostics::CheckError;
use crate::sigilfile::SigilConfig;

/// Batch check, client → master. Answered when the batch completes.
pub const TYPECHECK_METHOD: &str = "$/sigil/typecheck";
/// Batch dispatch, master → worker.
pub const TYPECHECK_START_METHOD: &str = "$/sigil/typecheck_start";
/// Per-file completion, worker → master.
pub const TYPECHECK_UPDATE_METHOD: &str = "$/sigil/typecheck_update";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TypecheckParams {
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(default)]
    pub paths: Option<Vec<PathBuf>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypecheckStartParams {
    pub guid: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypecheckUpdateParams {
    pub guid: String,
    pub path: PathBuf,
}

/// One worker slot of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerId {
    Interaction,
    Signature,
    Check(usize),
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerId::Interaction => write!(f, "interaction"),
            WorkerId::Signature => write!(f, "signature"),
            WorkerId::Check(i) => write!(f, "check-{i}"),
        }
    }
}

/// Where an outbound message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    Client,
    Worker(WorkerId),
}

/// One entry on the master's write queue.
#[derive(Debug)]
pub struct SendMessageJob {
    pub dest: Dest,
    pub message: Message,
}

/// Events pushed onto the master's inbound channel by worker reader
/// threads.
#[derive(Debug)]
pub enum Inbound {
    Worker(WorkerId, Message),
    Exited(WorkerId),
}

fn server_capabilities() -> Result<serde_json::Value, CheckError> {
    serde_json::to_value(ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        completion_provider: Some(CompletionOptions::default()),
        definition_provider: Some(OneOf::Left(true)),
        implementation_provider: Some(ImplementationProviderCapability::Simple(true)),
        workspace_symbol_provider: Some(OneOf::Left(true)),
        ..Default::default()
    })
    .map_err(|e| CheckError::protocol(e.to_string()))
}

/// Run the LSP master on stdio: spawn the worker pool, drain the client
/// and worker channels on a single event loop, and dispatch the write
/// queue. Returns the process exit code.
pub fn run_master(config: &SigilConfig) -> Result<i32, CheckError> {
    let (connection, io_threads) = Connection::stdio();
    let (inbound_tx, inbound_rx) = unbounded::<Inbound>();

    let mut worker_ids = vec![WorkerId::Interaction, WorkerId::Signature];
    for i in 0..config.check_workers {
        worker_ids.push(WorkerId::Check(i));
    }
    let mut workers = Vec::new();
    for id in worker_ids {
        workers.push(process::spawn_worker(id, config, inbound_tx.clone())?);
    }

    let (queue_tx, queue_rx) = unbounded::<SendMessageJob>();
    let client_sender = connection.sender.clone();
    let worker_senders: HashMap<WorkerId, crossbeam_channel::Sender<Message>> =
        workers.iter().map(|w| (w.id, w.sender.clone())).collect();
    let dispatcher = std::thread::spawn(move || {
        for job in queue_rx {
            let delivered = match job.dest {
                Dest::Client => client_sender.send(job.message).is_ok(),
                Dest::Worker(id) => worker_senders
                    .get(&id)
                    .map(|s| s.send(job.message).is_ok())
                    .unwrap_or(false),
            };
            if !delivered {
                eprintln!("[sigil-master] dropped message for {:?}", job.dest);
            }
        }
    });

    let init_value = connection
        .initialize(server_capabilities()?)
        .map_err(|e| CheckError::protocol(e.to_string()))?;
    let init_params: lsp_types::InitializeParams = serde_json::from_value(init_value)
        .map_err(|e| CheckError::protocol(e.to_string()))?;

    let mut master = master::Master::new(
        config.check_workers,
        config.progress_threshold,
        queue_tx.clone(),
    );
    master.initialize(&init_params);
    eprintln!(
        "[sigil-master] session started with {} check workers",
        config.check_workers
    );

    loop {
        crossbeam_channel::select! {
            recv(connection.receiver) -> msg => match msg {
                Ok(msg) => master.handle_client_message(msg),
                Err(_) => break,
            },
            recv(inbound_rx) -> event => match event {
                Ok(Inbound::Worker(id, msg)) => master.handle_worker_message(id, msg),
                Ok(Inbound::Exited(id)) => master.handle_worker_exit(id),
                Err(_) => break,
            },
        }
        if master.should_exit() {
            break;
        }
    }

    let fatal = master.is_fatal();
    drop(master);
    drop(queue_tx);
    dispatcher.join().ok();
    for worker in workers {
        worker.shutdown();
    }
    io_threads
        .join()
        .map_err(|e| CheckError::protocol(e.to_string()))?;
    eprintln!("[sigil-master] session ended");

    Ok(if fatal { 2 } else { 0 })
}
