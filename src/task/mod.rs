//! The abstract task contract (spec.md 3, 4.5).
//!
//! The scheduler core is generic over any `Task` implementation so admission,
//! blocker-safety, and resume behaviour can be exercised with lightweight
//! synthetic tasks in tests, independently from the concrete encoder-task
//! adapters in [`crate::encoder`].

pub mod graph;

#[cfg(test)]
pub mod testing;

use std::fmt::Debug;
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SchedulerError;

/// `(kind, priority)` pair used for slot accounting. Lower `priority` means
/// higher precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, serde::Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub priority: u32,
}

impl Resource {
    pub const fn new(kind: ResourceKind, priority: u32) -> Self {
        Resource { kind, priority }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, serde::Deserialize)]
pub enum ResourceKind {
    Cpu,
    Io,
}

/// A dispatchable unit of work within a batch.
///
/// Implementors must be cheap to clone (the executor keeps two independent
/// projections of the same graph) and must round-trip through
/// serialisation preserving the fields that make up their identity
/// (`PartialEq`), since [`super::executor::Executor`]'s completion
/// bookkeeping asserts equality against a freshly re-read copy.
pub trait Task: Clone + PartialEq + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Short stable string used only for blocker matching within a batch.
    fn name(&self) -> String;

    /// Task names that, if still pending in the same batch, block this task
    /// from running.
    fn blockers(&self) -> &[String];

    /// Resource class this task consumes a slot from.
    fn resource(&self) -> Resource;

    /// Static upper bound on concurrently running tasks of this concrete
    /// kind.
    fn static_limit(&self) -> u32;

    /// Dynamic slot budget. Defaults to [`Task::static_limit`]; concrete
    /// kinds may override to express look-ahead policies.
    fn get_limit(&self, _candidates: &[&Self], _running: &[Self]) -> u32 {
        self.static_limit()
    }

    /// True iff no pending task in the same batch has a name in
    /// [`Task::blockers`]. Concrete kinds may override (e.g. multi-pass
    /// video encode serialisation). `unfinished_in_batch` is the batch's
    /// *unfinished* projection: completed slots are `None`, but dispatched
    /// (currently running) tasks are still `Some`.
    fn can_run(&self, unfinished_in_batch: &[Option<Self>]) -> bool {
        default_can_run(self, unfinished_in_batch)
    }

    /// Output paths this task produces. Informational; persisted but not
    /// used by scheduler logic.
    fn produced_files(&self) -> Vec<PathBuf>;

    /// Whether [`Task::scriptize`] should run after a successful
    /// [`Task::run`] in non-scriptize mode. Defaults to true.
    fn do_script(&self) -> bool {
        true
    }

    /// Executes the task for real (spawns/waits on a subprocess, or performs
    /// the task's own side effect).
    fn run(&self) -> Result<(), SchedulerError>;

    /// Emits this task's command vector into its per-media script instead of
    /// executing it.
    fn scriptize(&self) -> Result<(), SchedulerError>;
}

/// Shared default for `can_run`: no pending task in the same batch names this
/// task as a blocker.
pub fn default_can_run<T: Task>(task: &T, unfinished_in_batch: &[Option<T>]) -> bool {
    let blockers = task.blockers();
    if blockers.is_empty() {
        return true;
    }
    !unfinished_in_batch.iter().flatten().any(|other| other != task && blockers.contains(&other.name()))
}
