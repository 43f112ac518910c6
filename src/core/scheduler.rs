//! Cooperative thread scheduler for concurrent narrative branches.
//!
//! There is no real parallelism here: threads are cooperative units
//! advanced one tick at a time by the embedding interpreter calling
//! [`ThreadScheduler::step`]. All mutation is synchronous, so the
//! scheduler needs no locking; ordering within a tick is strict
//! priority order with stable insertion-order tie-breaking.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::thread::{Thread, ThreadId, ThreadState};
use crate::schema::value::Value;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown thread {0:?}")]
    UnknownThread(ThreadId),
    #[error("a main thread already exists")]
    MainThreadExists,
    #[error("thread limit reached ({0})")]
    ThreadLimit(usize),
    #[error("invalid transition for thread {id:?}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: ThreadId,
        from: ThreadState,
        to: ThreadState,
    },
    #[error("RON serialization error: {0}")]
    Encode(#[from] ron::Error),
    #[error("RON deserialization error: {0}")]
    Decode(#[from] ron::error::SpannedError),
}

/// Scheduler tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Hard cap on live thread records, terminal ones included.
    pub max_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_threads: 64 }
    }
}

/// What the executor wants done with a thread after one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Keep running; the thread will be eligible next tick.
    Continue,
    /// Finish the thread with an optional result value.
    Complete(Option<Value>),
    /// Suspend until the target thread reaches a terminal state.
    Wait(ThreadId),
    /// Suspend until explicitly resumed.
    Pause,
}

/// Per-state census returned by [`ThreadScheduler::thread_counts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadCounts {
    pub running: usize,
    pub waiting: usize,
    pub paused: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub total: usize,
}

/// Serializable scheduler state. Threads appear in creation order;
/// the id counter is recovered from the highest id on restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub threads: Vec<Thread>,
}

/// The thread arena. Threads are stored in an id-indexed map and are
/// never deleted, only transitioned to a terminal state, so finished
/// branches stay available for inspection and save files.
#[derive(Debug, Default)]
pub struct ThreadScheduler {
    threads: FxHashMap<ThreadId, Thread>,
    /// Creation order, for stable tie-breaking and snapshot layout.
    order: Vec<ThreadId>,
    next_id: u64,
    config: SchedulerConfig,
}

impl ThreadScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            threads: FxHashMap::default(),
            order: Vec::new(),
            next_id: 0,
            config,
        }
    }

    /// Create the sole root ("main") thread.
    pub fn create_thread(&mut self, passage: &str) -> Result<ThreadId, SchedulerError> {
        if self.threads.values().any(|t| t.is_main) {
            return Err(SchedulerError::MainThreadExists);
        }
        let id = self.insert_thread(passage, None, 0, true)?;
        debug!(?id, passage, "created main thread");
        Ok(id)
    }

    /// Spawn a child thread under an existing parent.
    pub fn spawn_thread(
        &mut self,
        passage: &str,
        parent: ThreadId,
        priority: i32,
    ) -> Result<ThreadId, SchedulerError> {
        if !self.threads.contains_key(&parent) {
            warn!(?parent, passage, "spawn refused: unknown parent thread");
            return Err(SchedulerError::UnknownThread(parent));
        }
        let id = self.insert_thread(passage, Some(parent), priority, false)?;
        if let Some(p) = self.threads.get_mut(&parent) {
            p.children.push(id);
        }
        debug!(?id, ?parent, passage, priority, "spawned thread");
        Ok(id)
    }

    fn insert_thread(
        &mut self,
        passage: &str,
        parent: Option<ThreadId>,
        priority: i32,
        is_main: bool,
    ) -> Result<ThreadId, SchedulerError> {
        if self.threads.len() >= self.config.max_threads {
            warn!(
                limit = self.config.max_threads,
                passage, "spawn refused: thread limit reached"
            );
            return Err(SchedulerError::ThreadLimit(self.config.max_threads));
        }
        let id = ThreadId(self.next_id);
        self.next_id += 1;
        let created_at = self.order.len() as u64;
        self.threads.insert(
            id,
            Thread {
                id,
                passage: passage.to_string(),
                parent,
                children: Vec::new(),
                state: ThreadState::Running,
                priority,
                variables: FxHashMap::default(),
                waiting_for: None,
                result: None,
                is_main,
                created_at,
            },
        );
        self.order.push(id);
        Ok(id)
    }

    pub fn get_thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(&id)
    }

    pub fn get_main_thread(&self) -> Option<&Thread> {
        self.order
            .iter()
            .filter_map(|id| self.threads.get(id))
            .find(|t| t.is_main)
    }

    /// All threads in creation order.
    pub fn all_threads(&self) -> Vec<&Thread> {
        self.order
            .iter()
            .filter_map(|id| self.threads.get(id))
            .collect()
    }

    pub fn children_of(&self, id: ThreadId) -> Vec<ThreadId> {
        self.threads
            .get(&id)
            .map(|t| t.children.clone())
            .unwrap_or_default()
    }

    /// Ids of all `Running` threads, priority-descending.
    ///
    /// Equal priorities keep creation order; the sort is stable, so
    /// the tick order is fully deterministic.
    pub fn get_runnable_threads(&self) -> Vec<ThreadId> {
        let mut runnable: Vec<ThreadId> = self
            .order
            .iter()
            .filter(|id| {
                self.threads
                    .get(id)
                    .is_some_and(|t| t.state == ThreadState::Running)
            })
            .copied()
            .collect();
        runnable.sort_by_key(|id| std::cmp::Reverse(self.threads[id].priority));
        runnable
    }

    /// Run one tick: invoke `executor` once per thread that was
    /// runnable when the tick began and is still running when its turn
    /// comes (an earlier thread may have cancelled it).
    ///
    /// Executor errors never escape: a failing thread is forced to
    /// `Completed` with the error message as its result, and the tick
    /// continues. Returns the number of threads stepped.
    pub fn step<F>(&mut self, mut executor: F) -> usize
    where
        F: FnMut(&Thread) -> Result<StepOutcome, String>,
    {
        let runnable = self.get_runnable_threads();
        let mut stepped = 0;
        for id in runnable {
            let outcome = match self.threads.get(&id) {
                Some(t) if t.state == ThreadState::Running => executor(t),
                _ => continue,
            };
            stepped += 1;
            match outcome {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Complete(result)) => {
                    let _ = self.complete_thread(id, result);
                }
                Ok(StepOutcome::Wait(target)) => {
                    let _ = self.await_thread(id, target);
                }
                Ok(StepOutcome::Pause) => {
                    let _ = self.pause_thread(id);
                }
                Err(message) => {
                    warn!(?id, %message, "executor failed; completing thread with error");
                    if let Some(t) = self.threads.get_mut(&id) {
                        t.state = ThreadState::Completed;
                        t.result = Some(Value::String(message));
                        t.waiting_for = None;
                    }
                    self.release_waiters(id);
                }
            }
        }
        stepped
    }

    /// Force a state transition, validating it against the lifecycle
    /// graph.
    pub fn set_thread_state(
        &mut self,
        id: ThreadId,
        to: ThreadState,
    ) -> Result<(), SchedulerError> {
        let thread = self
            .threads
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownThread(id))?;
        let from = thread.state;
        if !from.can_transition_to(to) {
            return Err(SchedulerError::InvalidTransition { id, from, to });
        }
        thread.state = to;
        if to != ThreadState::Waiting {
            thread.waiting_for = None;
        }
        if to.is_terminal() {
            self.release_waiters(id);
        }
        Ok(())
    }

    pub fn pause_thread(&mut self, id: ThreadId) -> Result<(), SchedulerError> {
        match self.threads.get_mut(&id) {
            None => Err(SchedulerError::UnknownThread(id)),
            Some(t) if t.state == ThreadState::Running => {
                t.state = ThreadState::Paused;
                Ok(())
            }
            Some(t) => Err(SchedulerError::InvalidTransition {
                id,
                from: t.state,
                to: ThreadState::Paused,
            }),
        }
    }

    pub fn resume_thread(&mut self, id: ThreadId) -> Result<(), SchedulerError> {
        match self.threads.get_mut(&id) {
            None => Err(SchedulerError::UnknownThread(id)),
            Some(t) if t.state == ThreadState::Paused => {
                t.state = ThreadState::Running;
                Ok(())
            }
            Some(t) => Err(SchedulerError::InvalidTransition {
                id,
                from: t.state,
                to: ThreadState::Running,
            }),
        }
    }

    /// Complete a thread with an optional result and release anything
    /// waiting on it.
    pub fn complete_thread(
        &mut self,
        id: ThreadId,
        result: Option<Value>,
    ) -> Result<(), SchedulerError> {
        let thread = self
            .threads
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownThread(id))?;
        let from = thread.state;
        if !from.can_transition_to(ThreadState::Completed) {
            return Err(SchedulerError::InvalidTransition {
                id,
                from,
                to: ThreadState::Completed,
            });
        }
        thread.state = ThreadState::Completed;
        thread.result = result;
        thread.waiting_for = None;
        self.release_waiters(id);
        debug!(?id, "thread completed");
        Ok(())
    }

    /// Cancel a thread and its entire subtree, descendants first.
    ///
    /// Every waiter on any cancelled thread is released, so no thread
    /// is ever left `Waiting` on a terminal target.
    pub fn cancel_thread(&mut self, id: ThreadId) -> Result<(), SchedulerError> {
        if !self.threads.contains_key(&id) {
            return Err(SchedulerError::UnknownThread(id));
        }
        for child in self.children_of(id) {
            // Already-terminal children are skipped, not errors.
            let _ = self.cancel_thread(child);
        }
        if let Some(t) = self.threads.get_mut(&id) {
            if t.state.is_terminal() {
                return Err(SchedulerError::InvalidTransition {
                    id,
                    from: t.state,
                    to: ThreadState::Cancelled,
                });
            }
            t.state = ThreadState::Cancelled;
            t.waiting_for = None;
        }
        self.release_waiters(id);
        debug!(?id, "thread cancelled");
        Ok(())
    }

    /// Suspend `waiter` until `target` reaches a terminal state.
    ///
    /// A no-op success when the target is already terminal. There is
    /// no timeout: a waiting thread whose target never resolves stays
    /// waiting until it is cancelled, and liveness is the caller's
    /// responsibility.
    pub fn await_thread(
        &mut self,
        waiter: ThreadId,
        target: ThreadId,
    ) -> Result<(), SchedulerError> {
        let target_state = self
            .threads
            .get(&target)
            .map(|t| t.state)
            .ok_or(SchedulerError::UnknownThread(target))?;
        if target_state.is_terminal() {
            return Ok(());
        }
        let thread = self
            .threads
            .get_mut(&waiter)
            .ok_or(SchedulerError::UnknownThread(waiter))?;
        let from = thread.state;
        if !from.can_transition_to(ThreadState::Waiting) {
            return Err(SchedulerError::InvalidTransition {
                id: waiter,
                from,
                to: ThreadState::Waiting,
            });
        }
        thread.state = ThreadState::Waiting;
        thread.waiting_for = Some(target);
        Ok(())
    }

    /// Flip every thread waiting on `target` back to running.
    fn release_waiters(&mut self, target: ThreadId) {
        for thread in self.threads.values_mut() {
            if thread.waiting_for == Some(target) {
                thread.state = ThreadState::Running;
                thread.waiting_for = None;
            }
        }
    }

    pub fn set_thread_variable(
        &mut self,
        id: ThreadId,
        name: &str,
        value: Value,
    ) -> Result<(), SchedulerError> {
        let thread = self
            .threads
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownThread(id))?;
        thread.variables.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get_thread_variable(&self, id: ThreadId, name: &str) -> Option<&Value> {
        self.threads.get(&id).and_then(|t| t.variables.get(name))
    }

    /// True when every thread has reached a terminal state.
    pub fn is_complete(&self) -> bool {
        self.threads.values().all(|t| t.is_terminal())
    }

    pub fn thread_counts(&self) -> ThreadCounts {
        let mut counts = ThreadCounts::default();
        for thread in self.threads.values() {
            match thread.state {
                ThreadState::Running => counts.running += 1,
                ThreadState::Waiting => counts.waiting += 1,
                ThreadState::Paused => counts.paused += 1,
                ThreadState::Completed => counts.completed += 1,
                ThreadState::Cancelled => counts.cancelled += 1,
            }
            counts.total += 1;
        }
        counts
    }

    /// Discard all threads and reset the id counter.
    pub fn reset(&mut self) {
        self.threads.clear();
        self.order.clear();
        self.next_id = 0;
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            threads: self
                .order
                .iter()
                .filter_map(|id| self.threads.get(id))
                .cloned()
                .collect(),
        }
    }

    /// Replace this scheduler's contents from a snapshot.
    ///
    /// The id counter is recovered as the highest id seen plus one,
    /// so threads allocated after a reload cannot collide with saved
    /// ones.
    pub fn restore(&mut self, snapshot: SchedulerSnapshot) {
        self.threads.clear();
        self.order.clear();
        self.next_id = 0;
        for thread in snapshot.threads {
            self.next_id = self.next_id.max(thread.id.0 + 1);
            self.order.push(thread.id);
            self.threads.insert(thread.id, thread);
        }
    }

    /// Snapshot to a RON string.
    pub fn serialize(&self) -> Result<String, SchedulerError> {
        Ok(ron::to_string(&self.snapshot())?)
    }

    /// Restore from a RON string produced by [`serialize`](Self::serialize).
    pub fn deserialize(&mut self, input: &str) -> Result<(), SchedulerError> {
        let snapshot: SchedulerSnapshot = ron::from_str(input)?;
        self.restore(snapshot);
        Ok(())
    }
}
