//! Batch and task-graph data structures (spec.md 3).

use serde::{Deserialize, Serialize};

use super::Task;

/// Ordered sequence of tasks for one media item. Insertion order is the
/// canonical dependency order. A `None` slot is the `⊥` sentinel: dispatched
/// (remaining projection) or completed (unfinished projection) task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: serde::de::DeserializeOwned"
))]
pub struct Batch<T: Task> {
    tasks: Vec<Option<T>>,
}

impl<T: Task> Batch<T> {
    pub fn new(tasks: Vec<Option<T>>) -> Self {
        Batch { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// True iff every slot is `⊥` (the batch is fully drained).
    pub fn is_done(&self) -> bool {
        self.tasks.iter().all(Option::is_none)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.tasks.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn slots(&self) -> &[Option<T>] {
        &self.tasks
    }

    pub fn slots_mut(&mut self) -> &mut [Option<T>] {
        &mut self.tasks
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.tasks
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|t| (i, t)))
    }

    /// Takes the task at `index`, leaving `⊥` (`None`) behind.
    pub fn take(&mut self, index: usize) -> Option<T> {
        self.tasks.get_mut(index).and_then(Option::take)
    }
}

/// Ordered sequence of batches. Batches are independent of each other; only
/// intra-batch blockers exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: serde::de::DeserializeOwned"
))]
pub struct TaskGraph<T: Task> {
    batches: Vec<Batch<T>>,
}

impl<T: Task> TaskGraph<T> {
    pub fn new(batches: Vec<Batch<T>>) -> Self {
        TaskGraph { batches }
    }

    pub fn empty() -> Self {
        TaskGraph { batches: Vec::new() }
    }

    pub fn batches(&self) -> &[Batch<T>] {
        &self.batches
    }

    pub fn batches_mut(&mut self) -> &mut Vec<Batch<T>> {
        &mut self.batches
    }

    pub fn push_batch(&mut self, batch: Batch<T>) {
        self.batches.push(batch);
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Number of batches with at least one non-`⊥` slot remaining.
    pub fn nonempty_batch_count(&self) -> usize {
        self.batches.iter().filter(|b| !b.is_done()).count()
    }

    pub fn is_fully_drained(&self) -> bool {
        self.batches.iter().all(Batch::is_done)
    }

    pub fn into_batches(self) -> Vec<Batch<T>> {
        self.batches
    }
}

impl<T: Task> Batch<T> {
    /// Sets slot `index` to `⊥` without returning the previous value.
    pub fn clear(&mut self, index: usize) {
        if let Some(slot) = self.tasks.get_mut(index) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::testing::SyntheticTask;

    #[test]
    fn round_trip_preserves_structure_and_identity() {
        let graph: TaskGraph<SyntheticTask> = TaskGraph::new(vec![Batch::new(vec![
            Some(SyntheticTask::new("a", &[], crate::task::Resource::new(crate::task::ResourceKind::Cpu, 0), 1)),
            None,
        ])]);
        let json = serde_json::to_string(&graph).unwrap();
        let restored: TaskGraph<SyntheticTask> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.batches().len(), 1);
        assert_eq!(restored.batches()[0].len(), 2);
        assert_eq!(restored.batches()[0].get(0), graph.batches()[0].get(0));
        assert!(restored.batches()[0].get(1).is_none());
    }

    #[test]
    fn nonempty_batch_count_ignores_fully_drained_batches() {
        let graph: TaskGraph<SyntheticTask> = TaskGraph::new(vec![
            Batch::new(vec![None, None]),
            Batch::new(vec![Some(SyntheticTask::new(
                "a",
                &[],
                crate::task::Resource::new(crate::task::ResourceKind::Io, 0),
                1,
            ))]),
        ]);
        assert_eq!(graph.nonempty_batch_count(), 1);
        assert!(!graph.is_fully_drained());
    }
}
