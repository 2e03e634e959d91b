//! Runtime-tunable numbers and message templates.
//!
//! `spec.md` names several defaults inline (a step budget of ~1000, a turn
//! budget of ~8, pruning caps of "most recent N") without pinning them to
//! constants. Grouped here into plain structs with `Default` impls holding
//! those suggested defaults, in the same shape as a `CacheConfig` /
//! `RetryPolicy` pair: embedders construct one, tweak what they need, and
//! pass it into [`crate::context::RuntimeContext`] at startup.

use std::time::Duration;

use crate::state::PruningCaps;

/// User-visible text for each error kind in `spec.md` §7. Deterministic per
/// kind, never leaking internal identifiers or stack traces.
#[derive(Debug, Clone)]
pub struct FallbackMessages {
    /// Shown when the NLU provider fails or times out (`nlu_error`).
    pub nlu_error: String,
    /// Shown when a registered action handler fails (`action_error`).
    pub action_error: String,
    /// Shown when loading from the checkpoint store fails (recoverable;
    /// the turn proceeds on a fresh state, but the user is told something
    /// went missing).
    pub checkpoint_load_error: String,
    /// Shown when the per-turn step budget is exhausted
    /// (`step_budget_exhausted`).
    pub step_budget_exhausted: String,
    /// Shown when the per-turn subgraph-execution budget is exhausted
    /// (`turn_budget_exhausted`).
    pub turn_budget_exhausted: String,
    /// Shown when the configured turn deadline elapses.
    pub turn_timeout: String,
    /// Acknowledgement sent after a `CancelFlow` command completes.
    pub cancel_acknowledgement: String,
    /// Shown when `StartFlow`/any flow-name-bearing command names a flow
    /// the compiler never compiled (`unknown_flow`).
    pub unknown_flow: String,
    /// Shown after a `HumanHandoff` command; the sentinel response that
    /// ends the turn.
    pub human_handoff: String,
    /// Prefix used to introduce a `Clarify` response when the embedder
    /// hasn't wired in a real help generator.
    pub clarify_fallback: String,
}

impl Default for FallbackMessages {
    fn default() -> Self {
        Self {
            nlu_error: "Sorry, I'm having trouble understanding right now. Could you try again?"
                .to_string(),
            action_error: "Something went wrong completing that step. Let's try again.".to_string(),
            checkpoint_load_error: "I lost track of where we were — let's start fresh.".to_string(),
            step_budget_exhausted: "Something went wrong and I had to stop. Please try again."
                .to_string(),
            turn_budget_exhausted: "Something went wrong and I had to stop. Please try again."
                .to_string(),
            turn_timeout: "That took longer than expected. Please try again.".to_string(),
            cancel_acknowledgement: "Okay, I've cancelled that.".to_string(),
            unknown_flow: "I don't know how to do that yet.".to_string(),
            human_handoff: "Connecting you with a human agent now.".to_string(),
            clarify_fallback: "Here's some help:".to_string(),
        }
    }
}

/// Tunables for the orchestrator and subgraph executor (`spec.md` §4.5,
/// §4.6, §5).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-turn cap on steps executed within one subgraph run before
    /// [`crate::error::DialogueError::StepBudgetExhausted`] aborts the
    /// turn. `spec.md` §4.5 suggests 1000.
    pub step_budget: usize,
    /// Per-turn cap on the number of times the orchestrator invokes the
    /// subgraph executor (guards against push/pop oscillation). `spec.md`
    /// §4.6 suggests 8.
    pub turn_budget: usize,
    /// Wall-clock deadline for a whole turn (`spec.md` §5). Exceeding it is
    /// equivalent to a crash: nothing from the turn is persisted.
    pub turn_deadline: Duration,
    /// Separator joining buffered messages at turn end (`spec.md` §4.8).
    pub sink_separator: String,
    /// Pruning caps applied at save time (`spec.md` §3, §4.7).
    pub pruning: PruningCaps,
    /// Bound on how many recent messages are exposed to the NLU provider's
    /// context (`spec.md` §6 `recent_messages`).
    pub nlu_recent_messages: usize,
    pub messages: FallbackMessages,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_budget: 1000,
            turn_budget: 8,
            turn_deadline: Duration::from_secs(30),
            sink_separator: "\n\n".to_string(),
            pruning: PruningCaps::default(),
            nlu_recent_messages: 20,
            messages: FallbackMessages::default(),
        }
    }
}
