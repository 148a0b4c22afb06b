//! Serialises the persistent task graph under a sibling lock file.
//!
//! All reads and writes against the data file are expected to happen while
//! the scope returned by [`LockedState::lock`] is held; the lock file itself
//! is independent of the data file and is never removed by [`LockedState::remove`].

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::SchedulerError;
use crate::file_lock::FileLock;
use crate::task::Task;
use crate::task::graph::TaskGraph;

pub struct LockedState {
    path: PathBuf,
    lock_path: PathBuf,
}

/// RAII scope held while the cross-process lock is acquired. `read`/`write`
/// calls against the data file are only meaningful while a scope is alive.
pub struct LockedStateScope<'a> {
    state: &'a LockedState,
    lock: Option<FileLock>,
}

impl LockedState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = sibling_lock_path(&path);
        LockedState { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquires the cross-process lock and returns a scope. Release happens
    /// when the scope is dropped, including on unwind.
    pub fn lock(&self) -> anyhow::Result<LockedStateScope<'_>> {
        let lock = FileLock::acquire(&self.lock_path)?;
        Ok(LockedStateScope {
            state: self,
            lock: Some(lock),
        })
    }
}

impl LockedStateScope<'_> {
    /// Deserialises the current on-disk graph. Must be called while the
    /// scope is held.
    pub fn read<T: Task>(&self) -> Result<TaskGraph<T>, SchedulerError> {
        let file = match File::open(&self.state.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SchedulerError::NotFound(self.state.path.clone()));
            }
            Err(err) => return Err(SchedulerError::Io(err)),
        };
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(SchedulerError::Serde)
    }

    /// Atomically overwrites the data file with `graph`.
    pub fn write<T: Task>(&self, graph: &TaskGraph<T>) -> Result<(), SchedulerError> {
        let tmp_path = self.state.path.with_extension("tmp");
        if let Some(parent) = self.state.path.parent() {
            fs::create_dir_all(parent).map_err(SchedulerError::Io)?;
        }
        {
            let file = File::create(&tmp_path).map_err(SchedulerError::Io)?;
            serde_json::to_writer(&file, graph).map_err(SchedulerError::Serde)?;
        }
        fs::rename(&tmp_path, &self.state.path).map_err(SchedulerError::Io)?;
        Ok(())
    }

    /// Unlinks the data file. The lock file is untouched.
    pub fn remove(&self) -> Result<(), SchedulerError> {
        match fs::remove_file(&self.state.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SchedulerError::Io(err)),
        }
    }

    /// Appends one batch to the persisted graph, creating it if absent.
    /// This is the ingestor's side of spec.md 2's data flow: "an ingestion
    /// step (external) produces one batch per media item and appends it to
    /// the persistent task list under lock."
    pub fn append_batch<T: Task>(
        &self,
        batch: crate::task::graph::Batch<T>,
    ) -> Result<(), SchedulerError> {
        let mut graph = match self.read::<T>() {
            Ok(graph) => graph,
            Err(SchedulerError::NotFound(_)) => TaskGraph::empty(),
            Err(err) => return Err(err),
        };
        graph.push_batch(batch);
        self.write(&graph)
    }
}

impl Drop for LockedStateScope<'_> {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
    }
}

fn sibling_lock_path(path: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!(".{name}.lock"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::graph::Batch;
    use crate::task::testing::SyntheticTask;

    #[test]
    fn read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = LockedState::new(dir.path().join("tasks.json"));
        let scope = state.lock().unwrap();
        let err = scope.read::<SyntheticTask>().unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));
    }

    #[test]
    fn round_trip_preserves_empty_graph() {
        let dir = tempfile::tempdir().unwrap();
        let state = LockedState::new(dir.path().join("tasks.json"));
        {
            let scope = state.lock().unwrap();
            let graph: TaskGraph<SyntheticTask> = TaskGraph::new(vec![Batch::new(vec![])]);
            scope.write(&graph).unwrap();
        }
        let scope = state.lock().unwrap();
        let graph = scope.read::<SyntheticTask>().unwrap();
        assert_eq!(graph.batches().len(), 1);
    }

    #[test]
    fn remove_is_idempotent_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let state = LockedState::new(dir.path().join("tasks.json"));
        let scope = state.lock().unwrap();
        scope.remove().unwrap();
        scope.remove().unwrap();
    }

    #[test]
    fn lock_sibling_path_is_dotfile_in_same_dir() {
        let state = LockedState::new(Path::new("/tmp/recodex/tasks.json"));
        assert_eq!(
            state.lock_path,
            Path::new("/tmp/recodex/.tasks.json.lock")
        );
    }
}
