use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::value::Value;

/// Newtype wrapper for thread IDs.
///
/// Threads are tracked in an id-indexed arena; parent/child links are
/// ids, never references, so the tree serializes cleanly and cannot
/// form ownership cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub u64);

/// Lifecycle state of a narrative thread.
///
/// `Completed` and `Cancelled` are terminal; threads are never removed
/// from the scheduler, only transitioned, so finished branches remain
/// inspectable and serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreadState {
    Running,
    Waiting,
    Paused,
    Completed,
    Cancelled,
}

impl ThreadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether a direct transition from `self` to `to` is legal.
    ///
    /// Running may suspend (wait/pause) or finish; waiting resumes or
    /// is cancelled; paused resumes or is cancelled; terminal states
    /// never change. Completing a waiting or paused thread is allowed:
    /// an external `complete_thread` resolves it like any other.
    pub fn can_transition_to(&self, to: ThreadState) -> bool {
        if *self == to {
            return false;
        }
        match self {
            Self::Running => true,
            Self::Waiting | Self::Paused => {
                matches!(to, Self::Running | Self::Completed | Self::Cancelled)
            }
            Self::Completed | Self::Cancelled => false,
        }
    }
}

/// A cooperative unit of narrative execution.
///
/// Not an OS thread: it is advanced one tick at a time by the
/// scheduler's `step`, and suspends only by explicit state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    /// Target passage this thread is executing.
    pub passage: String,
    pub parent: Option<ThreadId>,
    pub children: Vec<ThreadId>,
    pub state: ThreadState,
    pub priority: i32,
    /// Thread-private variable scope.
    pub variables: FxHashMap<String, Value>,
    /// Set while `state == Waiting`: the thread whose completion or
    /// cancellation releases this one.
    pub waiting_for: Option<ThreadId>,
    /// Result recorded at completion (or the captured executor error).
    pub result: Option<Value>,
    pub is_main: bool,
    /// Monotonic allocation sequence, used for stable tie-breaking
    /// between equal-priority threads.
    pub created_at: u64,
}

impl Thread {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
