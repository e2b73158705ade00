use std::io::{BufReader, BufWriter, Write};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use lsp_server::Message;

use crate::diagnostics::CheckError;
use crate::sigilfile::SigilConfig;

use super::{Inbound, WorkerId};

/// A child worker process and its I/O plumbing.
///
/// The reader thread decodes framed messages off the child's stdout and
/// pushes them onto the master's inbound channel; the writer thread drains
/// a per-worker channel into the child's stdin. Closing that channel drops
/// stdin, which is the worker's EOF sentinel.
pub struct WorkerProcess {
    pub id: WorkerId,
    pub sender: Sender<Message>,
    child: Child,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

pub fn spawn_worker(
    id: WorkerId,
    config: &SigilConfig,
    inbound: Sender<Inbound>,
) -> Result<WorkerProcess, CheckError> {
    let exe = std::env::current_exe()?;
    let mut cmd = Command::new(exe);
    cmd.arg("worker");
    match id {
        WorkerId::Interaction => {
            cmd.arg("--interaction");
        }
        WorkerId::Signature => {
            cmd.arg("--signature");
        }
        WorkerId::Check(index) => {
            cmd.arg("--typecheck")
                .arg(format!("--index={index}"))
                .arg(format!("--count={}", config.check_workers));
        }
    }
    if let Some(sigilfile) = &config.sigilfile {
        cmd.arg(format!("--sigilfile={}", sigilfile.display()));
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn()?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| CheckError::protocol(format!("no stdin pipe for worker {id}")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CheckError::protocol(format!("no stdout pipe for worker {id}")))?;

    let (tx, rx) = unbounded::<Message>();

    let writer = std::thread::spawn(move || {
        let mut stdin = BufWriter::new(stdin);
        for message in rx {
            if message.write(&mut stdin).is_err() || stdin.flush().is_err() {
                break;
            }
        }
        // Channel closed: dropping stdin signals the worker to drain and
        // exit.
    });

    let reader = std::thread::spawn(move || {
        let mut stdout = BufReader::new(stdout);
        loop {
            match Message::read(&mut stdout) {
                Ok(Some(message)) => {
                    if inbound.send(Inbound::Worker(id, message)).is_err() {
                        break;
                    }
                }
                Ok(None) | Err(_) => {
                    let _ = inbound.send(Inbound::Exited(id));
                    break;
                }
            }
        }
    });

    Ok(WorkerProcess {
        id,
        sender: tx,
        child,
        reader: Some(reader),
        writer: Some(writer),
    })
}

impl WorkerProcess {
    /// Drain the write queue, close stdin, and reap the child.
    pub fn shutdown(mut self) {
        drop(self.sender);
        if let Some(writer) = self.writer.take() {
            writer.join().ok();
        }
        match self.child.wait() {
            Ok(status) if !status.success() => {
                eprintln!("[sigil-master] worker {} exited with {status}", self.id);
            }
            Ok(_) => {}
            Err(e) => eprintln!("[sigil-master] failed to reap worker {}: {e}", self.id),
        }
        if let Some(reader) = self.reader.take() {
            reader.join().ok();
        }
    }
}
