//! Error taxonomy for the dialogue orchestration core.
//!
//! This mirrors `spec.md` §7 kind-for-kind rather than inventing a generic
//! catch-all: callers that need to distinguish "reprompt the user" from
//! "abort the turn" from "this is a deployment bug" can match on the
//! variant instead of parsing a message string.
//!
//! # Propagation policy
//!
//! - [`DialogueError::InvalidSlotValue`] is handled locally by the command
//!   layer (reprompt, no state change) and never escapes to the turn loop.
//! - [`DialogueError::NoActiveFlow`] and [`DialogueError::UnknownCommand`]
//!   are logged and the offending command is skipped; the turn continues.
//! - [`DialogueError::Nlu`], [`DialogueError::Action`], and
//!   [`DialogueError::Checkpoint`] (on load) are reported to the user via a
//!   configured fallback message and do not corrupt state.
//! - [`DialogueError::StepBudgetExhausted`] and
//!   [`DialogueError::TurnBudgetExhausted`] abort the turn with an error
//!   message; the command log records the failure for operators.
//! - [`DialogueError::FlowDefinition`] is fatal at compile time and never
//!   occurs at runtime — the compiler runs once, at startup.

use thiserror::Error;

/// Result type used throughout the core.
pub type Result<T> = std::result::Result<T, DialogueError>;

#[derive(Error, Debug)]
pub enum DialogueError {
    /// A flow definition failed compiler validation (`spec.md` §4.1).
    /// Fatal at startup; compilation never runs again after that.
    #[error("flow definition error in flow '{flow}'{}: {reason}", step.as_ref().map(|s| format!(" at step '{s}'")).unwrap_or_default())]
    FlowDefinition {
        flow: String,
        step: Option<String>,
        reason: String,
    },

    /// A `SetSlot`/`CorrectSlot` command carried a value that failed its
    /// slot's validator. Handled locally: the command executor queues a
    /// reprompt and leaves state untouched.
    #[error("invalid value for slot '{slot}': {reason}")]
    InvalidSlotValue { slot: String, reason: String },

    /// `set_slot` (or any flow-manager mutation that requires one) was
    /// called with an empty flow stack.
    #[error("no active flow")]
    NoActiveFlow,

    /// NLU produced a command type with no registered handler. Forward
    /// compatibility for newer NLU vocabularies: logged, command skipped,
    /// turn continues.
    #[error("unknown command type: {0}")]
    UnknownCommand(String),

    /// `StartFlow` (or any command referencing a flow name) named a flow
    /// that isn't in the compiled flow set. Per `spec.md` §9: skip the
    /// command, record the failure, do not crash the turn.
    #[error("unknown flow: {0}")]
    UnknownFlow(String),

    /// The NLU provider failed or timed out. Reported via a configured
    /// fallback message; flow state is untouched.
    #[error("NLU provider error: {0}")]
    Nlu(String),

    /// A registered action handler returned an error. Reported via a
    /// configured fallback message; flow state is untouched beyond the
    /// `action_error` routing tag already taken by the subgraph executor.
    #[error("action '{handler}' failed: {reason}")]
    Action { handler: String, reason: String },

    /// An `action` step referenced a handler name not present in the
    /// action registry. Treated the same as a runtime `action_error` by
    /// the subgraph executor, but distinguished here for diagnostics.
    #[error("unknown action handler: {0}")]
    UnknownAction(String),

    /// The per-turn step budget (`spec.md` §4.5) was exhausted without
    /// reaching a pending task or an `end` node. Aborts the turn.
    #[error("step budget of {limit} exhausted in flow '{flow}'")]
    StepBudgetExhausted { flow: String, limit: usize },

    /// The per-turn subgraph-execution budget (`spec.md` §4.6) was
    /// exhausted by repeated push/pop oscillation. Aborts the turn.
    #[error("turn budget of {limit} subgraph executions exhausted")]
    TurnBudgetExhausted { limit: usize },

    /// A `branch` step's slot value matched no declared case and the step
    /// has no `default_step`. The compiler guarantees coverage for a
    /// slot's declared enum variants (`spec.md` §4.1), so this only fires
    /// when the slot was never filled before the branch ran — a flow
    /// authoring defect, not a user input error. Treated as a safety error:
    /// aborts the turn with an error message.
    #[error("branch step '{step}' in flow '{flow}' matched no case and has no default_step")]
    BranchNoMatch { flow: String, step: String },

    /// The configured per-turn deadline (`spec.md` §5 "Cancellation and
    /// timeouts") elapsed before the turn reached a boundary. Equivalent to
    /// a crash: nothing from the turn is persisted.
    #[error("turn deadline exceeded")]
    TurnTimeout,

    /// Checkpoint store failure. On load this is recoverable (the turn
    /// loop falls back to a fresh state); on save the turn is lost.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] dialogue_checkpoint::CheckpointError),

    /// Failure serializing or deserializing dialogue state to/from the
    /// checkpoint store's JSON payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DialogueError {
    /// Whether this error kind should abort the whole turn (safety errors
    /// and unrecoverable checkpoint-save failures) as opposed to being
    /// handled locally and letting the turn continue.
    pub fn is_fatal_to_turn(&self) -> bool {
        matches!(
            self,
            DialogueError::StepBudgetExhausted { .. }
                | DialogueError::TurnBudgetExhausted { .. }
                | DialogueError::BranchNoMatch { .. }
                | DialogueError::TurnTimeout
        )
    }
}
