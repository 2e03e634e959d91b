//! The NLU provider boundary (`spec.md` §6).
//!
//! The core never decides what the user meant — it hands the raw message
//! plus a bounded context to an external [`NluProvider`] and consumes the
//! ordered [`Command`] list it returns. Optimization, prompting, and model
//! choice all belong to the implementer of this trait; the core only needs
//! the shape in and out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::command::Command;
use crate::pending_task::PendingTask;
use crate::scope::ScopedSlot;
use crate::state::Message;

/// What the turn is currently waiting on, derived from the dialogue state's
/// pending task — told to the NLU provider so it can weigh "this reply is
/// probably the awaited value" against "this looks like an orthogonal
/// command" (`spec.md` §6 `awaiting`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Awaiting {
    None,
    Collect(String),
    Confirm,
    InformAck,
}

impl Awaiting {
    pub fn from_pending_task(task: Option<&PendingTask>) -> Self {
        match task {
            None => Awaiting::None,
            Some(PendingTask::Collect { slot, .. }) => Awaiting::Collect(slot.clone()),
            Some(PendingTask::Confirm { .. }) => Awaiting::Confirm,
            Some(PendingTask::Inform { wait_for_ack, .. }) if *wait_for_ack => Awaiting::InformAck,
            Some(PendingTask::Inform { .. }) => Awaiting::None,
        }
    }
}

/// Everything the orchestrator hands the NLU provider for one turn
/// (`spec.md` §6 "context (consumed)").
#[derive(Debug, Clone)]
pub struct NluContext {
    pub active_flow_name: Option<String>,
    pub in_scope_slots: Vec<ScopedSlot>,
    pub in_scope_actions: Vec<String>,
    pub recent_messages: Vec<Message>,
    pub awaiting: Awaiting,
    pub current_time: DateTime<Utc>,
}

/// What the NLU provider returns for one turn (`spec.md` §6 `NLUOutput`).
#[derive(Debug, Clone)]
pub struct NluOutput {
    pub commands: Vec<Command>,
    pub confidence: f32,
    /// Opaque string carried for audit only; the core never parses it.
    pub reasoning: String,
}

impl NluOutput {
    pub fn empty(reasoning: impl Into<String>) -> Self {
        Self {
            commands: Vec::new(),
            confidence: 0.0,
            reasoning: reasoning.into(),
        }
    }
}

/// The external language-understanding collaborator (`spec.md` §6). The
/// core treats calls as possibly slow and possibly failing: a failure
/// surfaces a configured fallback message and marks the turn with
/// `nlu_error` without changing flow state (`spec.md` §7).
#[async_trait]
pub trait NluProvider: Send + Sync {
    async fn understand(
        &self,
        user_message: &str,
        context: NluContext,
    ) -> Result<NluOutput, String>;
}

/// A test double that never produces a command. Useful for exercising the
/// orchestrator's synthesized-command path (collect/confirm resumption) in
/// isolation, without wiring a real NLU provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNlu;

#[async_trait]
impl NluProvider for NoopNlu {
    async fn understand(
        &self,
        _user_message: &str,
        _context: NluContext,
    ) -> Result<NluOutput, String> {
        Ok(NluOutput::empty("noop"))
    }
}
