//! Pending tasks — the only signal that suspends a turn.
//!
//! `spec.md` §3 "Pending task": "a structured signal emitted by a subgraph
//! node requesting user interaction... Only tasks that require input cause
//! suspension." [`PendingTask::requires_input`] is exactly that test; the
//! orchestrator checks it once, after running the subgraph executor, to
//! decide whether to save-and-return or keep stepping.

use serde::{Deserialize, Serialize};

/// A request for user interaction (or a message to deliver) emitted by the
/// step currently executing. `spec.md` §3 "Pending task".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingTask {
    /// A value is required for `slot` before the flow can continue.
    Collect { slot: String, prompt: String },
    /// A yes/no answer is required before the flow can continue.
    Confirm { prompt: String },
    /// A message to deliver. If `wait_for_ack` is false the subgraph
    /// executor continues immediately after queuing it; if true, the turn
    /// suspends until the user sends any reply.
    Inform { prompt: String, wait_for_ack: bool },
}

impl PendingTask {
    /// Whether this task requires a user reply before the flow may
    /// continue. `Inform` only requires one when `wait_for_ack` is set;
    /// `Collect` and `Confirm` always do.
    pub fn requires_input(&self) -> bool {
        match self {
            PendingTask::Collect { .. } | PendingTask::Confirm { .. } => true,
            PendingTask::Inform { wait_for_ack, .. } => *wait_for_ack,
        }
    }

    /// The slot this task is awaiting a value for, if any — used by the
    /// orchestrator to synthesize a `SetSlot` command from a raw user
    /// message (`spec.md` §4.6 step 2).
    pub fn awaited_slot(&self) -> Option<&str> {
        match self {
            PendingTask::Collect { slot, .. } => Some(slot),
            _ => None,
        }
    }
}
