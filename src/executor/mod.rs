//! Admission control, dispatch, and resume bookkeeping (spec.md 4.4).
//!
//! The executor owns one internal lock `M` (a [`Mutex<ExecutorState>`]) plus
//! a [`Condvar`] used to wake the selection loop early when a worker
//! finishes, instead of always blocking the full ~500ms tick (spec.md
//! 4.4.2, 5). Completion bookkeeping and incremental ingest both acquire
//! `M` before ever touching the cross-process file lock, per spec.md 5's
//! ordering rule.

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::error::SchedulerError;
use crate::locked_state::LockedState;
use crate::sync_ext::{CondvarExt, MutexExt};
use crate::task::graph::TaskGraph;
use crate::task::{Resource, ResourceKind, Task};

/// Upper bound on the selection-loop sleep when no candidate is admissible
/// but work is still in flight (spec.md 4.4.2).
const TICK_SLEEP: Duration = Duration::from_millis(500);

/// Default throttle for incremental ingest re-reads (spec.md 4.4.5).
const UPDATE_DELAY: Duration = Duration::from_secs(20);

struct ExecutorState<T: Task> {
    remaining: TaskGraph<T>,
    unfinished: TaskGraph<T>,
    running: Vec<T>,
    last_ingest: Instant,
}

struct Inner<T: Task> {
    state: Mutex<ExecutorState<T>>,
    cv: Condvar,
    locked_state: LockedState,
    scriptize: bool,
    update_delay: Duration,
}

/// The scheduler/executor (spec.md 4.4). Generic over any [`Task`]
/// implementation so the admission and resume logic can be exercised with
/// lightweight synthetic tasks, independently of the concrete encoder-task
/// adapters in [`crate::encoder`].
pub struct Executor<T: Task> {
    inner: Arc<Inner<T>>,
}

enum Action<T> {
    Done,
    Stall(usize),
    Dispatch(usize, usize, T),
    Continue,
}

impl<T: Task> Executor<T> {
    /// Reads the persisted graph under lock and prepares to run it. A
    /// missing state file is not an error: the graph starts empty.
    pub fn new(locked_state: LockedState, scriptize: bool) -> anyhow::Result<Self> {
        Self::with_update_delay(locked_state, scriptize, UPDATE_DELAY)
    }

    /// Same as [`Executor::new`], but with an overridable throttle for
    /// incremental ingest (spec.md 4.4.5) instead of the [`UPDATE_DELAY`]
    /// default. Exposed so tests can observe ingest of a concurrently
    /// appended batch without waiting 20 real seconds.
    pub fn with_update_delay(
        locked_state: LockedState,
        scriptize: bool,
        update_delay: Duration,
    ) -> anyhow::Result<Self> {
        let graph = {
            let scope = locked_state.lock()?;
            match scope.read::<T>() {
                Ok(graph) => graph,
                Err(SchedulerError::NotFound(_)) => TaskGraph::empty(),
                Err(err) => return Err(err.into()),
            }
        };
        log::info!("amount of batches: {}", graph.nonempty_batch_count());
        let unfinished = graph.clone();
        let state = ExecutorState {
            remaining: graph,
            unfinished,
            running: Vec::new(),
            last_ingest: Instant::now(),
        };
        Ok(Executor {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                cv: Condvar::new(),
                locked_state,
                scriptize,
                update_delay,
            }),
        })
    }

    /// Runs the selection/dispatch loop until every batch is drained, or
    /// until a scheduler stall is detected (spec.md 4.4.2, 7).
    pub fn run(&self) -> anyhow::Result<()> {
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        loop {
            let action = {
                let mut state = self.inner.state.lock_unpoisoned();
                if state.remaining.is_fully_drained() {
                    Action::Done
                } else if let Some((b, j, task)) = pop_next_task(&mut state) {
                    Action::Dispatch(b, j, task)
                } else if state.running.is_empty() {
                    Action::Stall(state.remaining.nonempty_batch_count())
                } else {
                    let (_guard, _timeout) =
                        self.inner.cv.wait_timeout_unpoisoned(state, TICK_SLEEP);
                    Action::Continue
                }
            };

            match action {
                Action::Done => break,
                Action::Stall(remaining) => {
                    log::warn!(
                        "exiting: no admissible candidate and nothing running, but {remaining} \
                         batch(es) remain; this indicates a dependency inconsistency"
                    );
                    break;
                }
                Action::Dispatch(b, j, task) => {
                    log::info!("starting {}", task.name());
                    let inner = Arc::clone(&self.inner);
                    let handle = thread::Builder::new()
                        .name(format!("recodex-worker-{b}-{j}"))
                        .spawn(move || run_worker(inner, b, j, task))
                        .context("failed to spawn worker thread")?;
                    handles.push(handle);
                }
                Action::Continue => {}
            }

            maybe_ingest(&self.inner)?;
        }

        for handle in handles {
            if handle.join().is_err() {
                anyhow::bail!("a worker thread panicked; scheduler bookkeeping may be corrupted");
            }
        }

        if !self.inner.scriptize {
            self.shutdown()?;
        }
        Ok(())
    }

    /// Re-reads the file once more; removes it only if it is still fully
    /// drained (a concurrent ingest may have appended a batch meanwhile).
    fn shutdown(&self) -> anyhow::Result<()> {
        let scope = self.inner.locked_state.lock()?;
        match scope.read::<T>() {
            Ok(graph) if graph.is_fully_drained() => scope.remove().map_err(Into::into),
            Ok(_) => Ok(()),
            Err(SchedulerError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Admission control (spec.md 4.4.1): enumerates candidates in
/// `(resource, batch-index, task-index)` order, builds a per-resource-kind
/// slot tableau keyed by priority, and dispatches the first candidate whose
/// `(kind, priority)` cell is admissible.
fn pop_next_task<T: Task>(state: &mut ExecutorState<T>) -> Option<(usize, usize, T)> {
    let mut candidates: Vec<(Resource, usize, usize, T)> = Vec::new();
    for (b, batch) in state.remaining.batches().iter().enumerate() {
        let unfinished_in_batch = state.unfinished.batches()[b].slots();
        for (j, task) in batch.iter() {
            if task.can_run(unfinished_in_batch) {
                candidates.push((task.resource(), b, j, task.clone()));
            }
        }
    }
    candidates.sort_by_key(|(resource, b, j, _)| (*resource, *b, *j));

    let all_tasks: Vec<&T> = candidates.iter().map(|(_, _, _, task)| task).collect();

    let mut candidates_limit: Vec<(u32, Resource, usize, usize, T)> = Vec::new();
    let mut resource_slots: BTreeMap<ResourceKind, BTreeMap<u32, u32>> = BTreeMap::new();
    for (resource, b, j, task) in &candidates {
        let limit = task.get_limit(&all_tasks, &state.running);
        candidates_limit.push((limit, *resource, *b, *j, task.clone()));
        let slot = resource_slots
            .entry(resource.kind)
            .or_default()
            .entry(resource.priority)
            .or_insert(0);
        *slot = (*slot).max(limit);
    }

    let mut resource_uses: BTreeMap<ResourceKind, BTreeMap<u32, u32>> = BTreeMap::new();
    for task in &state.running {
        let resource = task.resource();
        *resource_uses
            .entry(resource.kind)
            .or_default()
            .entry(resource.priority)
            .or_insert(0) += 1;
    }

    let found_resource = find_admissible_resource(&resource_slots, &resource_uses);

    let found_resource = found_resource?;
    for (_, resource, b, j, task) in candidates_limit {
        if resource == found_resource {
            state.remaining.batches_mut()[b].take(j);
            state.running.push(task.clone());
            return Some((b, j, task));
        }
    }
    None
}

/// For each resource kind (ascending), augments its slot tableau with
/// currently-running priorities absent from it, then walks priorities
/// ascending looking for the first `(kind, priority)` cell where taking one
/// more occupant at that priority keeps every priority class within its
/// slot budget (spec.md 4.4.1 step 4).
fn find_admissible_resource(
    resource_slots: &BTreeMap<ResourceKind, BTreeMap<u32, u32>>,
    resource_uses: &BTreeMap<ResourceKind, BTreeMap<u32, u32>>,
) -> Option<Resource> {
    for (&kind, slots) in resource_slots {
        let mut slots = slots.clone();
        let uses = resource_uses.get(&kind).cloned().unwrap_or_default();
        for (&running_prio, &running_users) in &uses {
            slots.entry(running_prio).or_insert(running_users);
        }

        let priorities: Vec<u32> = slots.keys().copied().collect();
        for priority in priorities {
            let mut potential = uses.clone();
            *potential.entry(priority).or_insert(0) += 1;

            let all_priorities: BTreeSet<u32> = potential
                .keys()
                .chain(slots.keys())
                .copied()
                .collect();

            let fits = all_priorities.iter().all(|&p| {
                let total: u32 = potential
                    .iter()
                    .filter(|(&pp, _)| pp <= p)
                    .map(|(_, &count)| count)
                    .sum();
                total <= slots.get(&p).copied().unwrap_or(0)
            });

            if fits {
                return Some(Resource::new(kind, priority));
            }
        }
    }
    None
}

fn run_worker<T: Task>(inner: Arc<Inner<T>>, b: usize, j: usize, task: T) {
    let outcome = if inner.scriptize {
        task.scriptize()
    } else {
        task.run().and_then(|()| {
            if task.do_script() {
                task.scriptize()
            } else {
                Ok(())
            }
        })
    };

    match outcome {
        Ok(()) => {
            log::info!("completed {}", task.name());
            if let Err(err) = mark_finished(&inner, b, j, &task) {
                log::error!(
                    "structural violation marking {} finished: {err:#}",
                    task.name()
                );
                panic!("mark_finished invariant violated for {}: {err:#}", task.name());
            }
        }
        Err(err) => {
            log::error!("error running {}: {err}", task.name());
        }
    }

    {
        let mut state = inner.state.lock_unpoisoned();
        if let Some(pos) = state.running.iter().position(|running| running == &task) {
            state.running.remove(pos);
        }
    }
    inner.cv.notify_all();
}

/// Completion & state write (spec.md 4.4.4). Asserts `unfinished[b][j] ==
/// task` (a structural-bookkeeping invariant; violation is fatal per
/// spec.md 7), then reconciles with a fresh on-disk read so concurrent
/// ingestor appends survive.
fn mark_finished<T: Task>(
    inner: &Arc<Inner<T>>,
    b: usize,
    j: usize,
    task: &T,
) -> anyhow::Result<()> {
    let mut state = inner.state.lock_unpoisoned();
    let current = state.unfinished.batches()[b].get(j);
    if current != Some(task) {
        anyhow::bail!(
            "unfinished[{b}][{j}] did not match the task that just completed \
             (expected {task:?}, found {current:?})"
        );
    }
    state.unfinished.batches_mut()[b].clear(j);

    if !inner.scriptize {
        let scope = inner.locked_state.lock()?;
        let mut on_disk = match scope.read::<T>() {
            Ok(graph) => graph,
            Err(SchedulerError::NotFound(_)) => TaskGraph::empty(),
            Err(err) => return Err(err.into()),
        };

        for (i, batch) in state.unfinished.batches().iter().enumerate() {
            if i >= on_disk.batches().len() {
                break;
            }
            for (k, slot) in batch.slots().iter().enumerate() {
                if slot.is_none() {
                    on_disk.batches_mut()[i].clear(k);
                }
            }
        }

        if on_disk.batches().len() > state.remaining.batches().len() {
            for extra in &on_disk.batches()[state.remaining.batches().len()..] {
                state.remaining.push_batch(extra.clone());
            }
        }

        state.unfinished = on_disk;
        scope.write(&state.unfinished)?;
    }

    Ok(())
}

/// Incremental ingest (spec.md 4.4.5): throttled to at most once per
/// [`UPDATE_DELAY`], re-reads the state file under lock and appends any
/// batches beyond what the executor already knows about to both
/// projections.
fn maybe_ingest<T: Task>(inner: &Arc<Inner<T>>) -> anyhow::Result<()> {
    let mut state = inner.state.lock_unpoisoned();
    if state.last_ingest.elapsed() < inner.update_delay {
        return Ok(());
    }
    state.last_ingest = Instant::now();

    let scope = inner.locked_state.lock()?;
    let on_disk = match scope.read::<T>() {
        Ok(graph) => graph,
        Err(SchedulerError::NotFound(_)) => TaskGraph::empty(),
        Err(err) => return Err(err.into()),
    };
    drop(scope);

    let current_len = state.unfinished.batches().len();
    if on_disk.batches().len() > current_len {
        let added = on_disk.batches().len() - current_len;
        log::info!("adding {added} more batch(es)");
        for extra in &on_disk.batches()[current_len..] {
            state.remaining.push_batch(extra.clone());
            state.unfinished.push_batch(extra.clone());
        }
    }
    Ok(())
}
