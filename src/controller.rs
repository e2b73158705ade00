use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use lsp_server::RequestId;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Stable hash of a path, independent of platform hasher seeds so that
/// assignments are reproducible across runs and processes.
pub fn stable_hash(path: &Path) -> u64 {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}

/// Which check worker owns a path.
pub fn assigned_worker(path: &Path, worker_count: usize) -> usize {
    (stable_hash(path) % worker_count.max(1) as u64) as usize
}

/// One in-flight batch check.
#[derive(Debug, Clone)]
pub struct Request {
    pub guid: String,
    /// Per-worker paths in dispatch order: priority first, each group
    /// lexicographic.
    pub assignments: Vec<Vec<PathBuf>>,
    /// Paths not yet reported done, per worker.
    remaining: Vec<BTreeSet<PathBuf>>,
    pub completed: usize,
    pub total: usize,
    /// The client request to answer once `completed == total`.
    pub respond_to: Option<RequestId>,
}

impl Request {
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }

    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            100
        } else {
            (100 * self.completed / self.total) as u32
        }
    }

    /// Record one finished path. Returns false (and changes nothing) when
    /// the path is not part of the worker's assignment.
    pub fn mark_done(&mut self, worker: usize, path: &Path) -> bool {
        let Some(remaining) = self.remaining.get_mut(worker) else {
            return false;
        };
        if remaining.remove(path) {
            self.completed += 1;
            true
        } else {
            false
        }
    }

    /// Paths still unchecked, across all workers.
    pub fn unfinished_paths(&self) -> Vec<PathBuf> {
        self.remaining.iter().flat_map(|set| set.iter().cloned()).collect()
    }

    /// Strip a dead worker of its unfinished paths.
    pub fn take_remaining(&mut self, worker: usize) -> Vec<PathBuf> {
        match self.remaining.get_mut(worker) {
            Some(set) => std::mem::take(set).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Hand extra paths to a worker mid-flight (requeue after a crash).
    /// The batch total is unchanged: the paths were already counted.
    pub fn extend_assignment(&mut self, worker: usize, paths: Vec<PathBuf>) {
        if let (Some(assignment), Some(remaining)) =
            (self.assignments.get_mut(worker), self.remaining.get_mut(worker))
        {
            remaining.extend(paths.iter().cloned());
            assignment.extend(paths);
        }
    }
}

/// Tracks which files are dirty and which are open in the editor, and
/// turns them into worker assignments on demand.
#[derive(Debug)]
pub struct TypeCheckController {
    changed_paths: BTreeSet<PathBuf>,
    priority_paths: BTreeSet<PathBuf>,
    worker_count: usize,
}

impl TypeCheckController {
    pub fn new(worker_count: usize) -> Self {
        Self {
            changed_paths: BTreeSet::new(),
            priority_paths: BTreeSet::new(),
            worker_count: worker_count.max(1),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn push_change(&mut self, path: impl Into<PathBuf>) {
        self.changed_paths.insert(path.into());
    }

    pub fn update_priority(&mut self, opened: &[PathBuf], closed: &[PathBuf]) {
        for path in opened {
            self.priority_paths.insert(path.clone());
        }
        for path in closed {
            self.priority_paths.remove(path);
        }
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changed_paths.is_empty()
    }

    /// Atomically drain the dirty set into a new request. Unfinished paths
    /// of a superseded request are folded in so nothing is silently
    /// skipped. Priority paths are assigned first, in lexicographic order;
    /// the rest land on their stable-hash worker. Returns `None` when
    /// there is nothing to check.
    pub fn make_request(
        &mut self,
        last: Option<&Request>,
        guid: Option<String>,
        respond_to: Option<RequestId>,
    ) -> Option<Request> {
        let mut paths = std::mem::take(&mut self.changed_paths);
        if let Some(last) = last {
            paths.extend(last.unfinished_paths());
        }
        if paths.is_empty() {
            return None;
        }

        let mut assignments: Vec<Vec<PathBuf>> = vec![Vec::new(); self.worker_count];

        // BTreeSet iteration is lexicographic, so both groups are
        // dispatched in deterministic order.
        let (priority, rest): (Vec<&PathBuf>, Vec<&PathBuf>) =
            paths.iter().partition(|p| self.priority_paths.contains(*p));
        for (i, path) in priority.iter().enumerate() {
            assignments[i % self.worker_count].push((*path).clone());
        }
        for path in rest {
            assignments[assigned_worker(path, self.worker_count)].push(path.clone());
        }

        let total = assignments.iter().map(Vec::len).sum();
        let remaining = assignments
            .iter()
            .map(|paths| paths.iter().cloned().collect())
            .collect();

        Some(Request {
            guid: guid.unwrap_or_else(|| Uuid::new_v4().to_string()),
            assignments,
            remaining,
            completed: 0,
            total,
            respond_to,
        })
    }
}
