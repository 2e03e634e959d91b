//! The command layer: the closed, versioned vocabulary of intents NLU can
//! produce, and the handlers that translate each into a state delta
//! (`spec.md` §2, §4.4).
//!
//! Commands are pure data — `Command`/`CommandKind` carry no behavior of
//! their own. Each kind has exactly one handler, looked up by tag in a
//! registry map rather than a hardcoded `match`, so a newer NLU vocabulary
//! can register a handler for a new kind without touching
//! [`CommandExecutor`] (`spec.md` §9 "a registry map... enabling open/closed
//! extension without touching the executor"). No handler ever takes
//! `&mut DialogueState`; each returns a [`HandlerOutcome`] that the executor
//! folds into an accumulated view so later commands in the same turn see
//! the effects of earlier ones (`spec.md` §4.4 "Executor").

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::context::RuntimeContext;
use crate::flow_manager::{FlowManager, TerminalState};
use crate::state::{CommandLogEntry, CommandOutcome, DialogueState, StateDelta};
use crate::validator::validate_slot_value;

/// The closed set of intents NLU can produce (`spec.md` §2).
#[derive(Debug, Clone)]
pub enum CommandKind {
    StartFlow {
        flow_name: String,
        inputs: HashMap<String, Value>,
    },
    CancelFlow,
    SetSlot {
        slot: String,
        value: Value,
    },
    CorrectSlot {
        slot: String,
        value: Value,
    },
    AffirmConfirmation,
    DenyConfirmation {
        /// Optional slot to rewind to instead of following the step's
        /// `on_deny_step` (`spec.md` §4.4 "Deny optionally carries a slot
        /// name to rewind to").
        rewind_slot: Option<String>,
    },
    Clarify {
        topic: Option<String>,
    },
    HumanHandoff {
        reason: Option<String>,
    },
}

impl CommandKind {
    /// Stable tag used as the registry key and in command-log entries.
    pub fn tag(&self) -> &'static str {
        match self {
            CommandKind::StartFlow { .. } => "start_flow",
            CommandKind::CancelFlow => "cancel_flow",
            CommandKind::SetSlot { .. } => "set_slot",
            CommandKind::CorrectSlot { .. } => "correct_slot",
            CommandKind::AffirmConfirmation => "affirm_confirmation",
            CommandKind::DenyConfirmation { .. } => "deny_confirmation",
            CommandKind::Clarify { .. } => "clarify",
            CommandKind::HumanHandoff { .. } => "human_handoff",
        }
    }
}

/// One command as produced by NLU: its data plus a confidence in `[0, 1]`
/// (`spec.md` §3 "Command").
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub confidence: f32,
}

impl Command {
    pub fn new(kind: CommandKind, confidence: f32) -> Self {
        Self { kind, confidence }
    }

    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }
}

/// What a handler did with one command: the delta to fold in, any
/// response-sink messages to queue, the outcome to record in the command
/// log, and whether this command ends the turn outright (`HumanHandoff`).
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub outcome: CommandOutcome,
    pub detail: Option<String>,
    pub delta: StateDelta,
    pub messages: Vec<String>,
    pub ends_turn: bool,
}

impl HandlerOutcome {
    pub fn success(delta: StateDelta) -> Self {
        Self {
            outcome: CommandOutcome::Success,
            detail: None,
            delta,
            messages: Vec::new(),
            ends_turn: false,
        }
    }

    pub fn success_with_messages(delta: StateDelta, messages: Vec<String>) -> Self {
        Self {
            outcome: CommandOutcome::Success,
            detail: None,
            delta,
            messages,
            ends_turn: false,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            outcome: CommandOutcome::Error,
            detail: Some(detail.into()),
            delta: StateDelta::empty(),
            messages: Vec::new(),
            ends_turn: false,
        }
    }

    pub fn error_with_message(detail: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            outcome: CommandOutcome::Error,
            detail: Some(detail.into()),
            delta: StateDelta::empty(),
            messages: vec![message.into()],
            ends_turn: false,
        }
    }
}

/// Given a command, the current (accumulated-so-far) view of state, and the
/// runtime context, returns a [`HandlerOutcome`]. Never mutates `state`;
/// never fails — even "this should never happen" cases (no active flow,
/// unknown flow name) are reported as an `Error` outcome rather than a Rust
/// `Err`, so the executor has one uniform path for folding results into the
/// command log (`spec.md` §4.4, §7).
pub trait CommandHandler: Send + Sync {
    fn handle(&self, command: &Command, state: &DialogueState, ctx: &RuntimeContext)
        -> HandlerOutcome;
}

struct StartFlowHandler;

impl CommandHandler for StartFlowHandler {
    fn handle(
        &self,
        command: &Command,
        state: &DialogueState,
        ctx: &RuntimeContext,
    ) -> HandlerOutcome {
        let CommandKind::StartFlow { flow_name, inputs } = &command.kind else {
            unreachable!("registry only dispatches StartFlow to this handler")
        };
        if !ctx.flows.contains(flow_name) {
            return HandlerOutcome::error_with_message(
                format!("unknown_flow: {flow_name}"),
                ctx.config.messages.unknown_flow.clone(),
            );
        }
        let delta = FlowManager.push_flow(state, flow_name, inputs.clone());
        HandlerOutcome::success(delta)
    }
}

struct CancelFlowHandler;

impl CommandHandler for CancelFlowHandler {
    fn handle(
        &self,
        _command: &Command,
        state: &DialogueState,
        ctx: &RuntimeContext,
    ) -> HandlerOutcome {
        match FlowManager.pop_flow(state, HashMap::new(), TerminalState::Cancelled) {
            Ok(delta) => HandlerOutcome::success_with_messages(
                delta,
                vec![ctx.config.messages.cancel_acknowledgement.clone()],
            ),
            Err(_) => HandlerOutcome::error("no_active_flow"),
        }
    }
}

fn set_slot_like(
    command_value: &Value,
    slot_name: &str,
    state: &DialogueState,
    ctx: &RuntimeContext,
) -> Result<Value, HandlerOutcome> {
    let active = match FlowManager.get_active(state) {
        Some(a) => a,
        None => return Err(HandlerOutcome::error("no_active_flow")),
    };
    let compiled = match ctx.flows.get(&active.flow_name) {
        Some(c) => c,
        None => return Err(HandlerOutcome::error(format!("unknown_flow: {}", active.flow_name))),
    };
    let declaration = match compiled.slot(slot_name) {
        Some(d) => d,
        None => {
            return Err(HandlerOutcome::error(format!(
                "unknown_slot: '{slot_name}' is not declared by flow '{}'",
                active.flow_name
            )))
        }
    };
    match validate_slot_value(
        &declaration.slot_type,
        declaration.validator.as_deref(),
        &ctx.validators,
        command_value,
    ) {
        Ok(validated) => Ok(validated),
        Err(reason) => {
            let prompt = compiled
                .collect_step_for_slot(slot_name)
                .and_then(|step_id| compiled.step(step_id))
                .and_then(|step| match &step.kind {
                    crate::definition::StepKind::Collect { prompt, .. } => Some(prompt.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| format!("That doesn't look right: {reason}. Could you try again?"));
            Err(HandlerOutcome::error_with_message(
                format!("invalid_slot_value: {reason}"),
                prompt,
            ))
        }
    }
}

struct SetSlotHandler;

impl CommandHandler for SetSlotHandler {
    fn handle(
        &self,
        command: &Command,
        state: &DialogueState,
        ctx: &RuntimeContext,
    ) -> HandlerOutcome {
        let CommandKind::SetSlot { slot, value } = &command.kind else {
            unreachable!("registry only dispatches SetSlot to this handler")
        };
        match set_slot_like(value, slot, state, ctx) {
            Ok(validated) => {
                let delta = FlowManager
                    .set_slot(state, slot, validated)
                    .expect("active flow already confirmed present above");
                HandlerOutcome::success(delta)
            }
            Err(outcome) => outcome,
        }
    }
}

struct CorrectSlotHandler;

impl CommandHandler for CorrectSlotHandler {
    fn handle(
        &self,
        command: &Command,
        state: &DialogueState,
        ctx: &RuntimeContext,
    ) -> HandlerOutcome {
        let CommandKind::CorrectSlot { slot, value } = &command.kind else {
            unreachable!("registry only dispatches CorrectSlot to this handler")
        };
        let prior = FlowManager.get_slot(state, slot).cloned();
        match set_slot_like(value, slot, state, ctx) {
            Ok(validated) => {
                let mut delta = FlowManager
                    .set_slot(state, slot, validated)
                    .expect("active flow already confirmed present above");
                let active = FlowManager
                    .get_active(state)
                    .expect("active flow already confirmed present above");
                if let Some(compiled) = ctx.flows.get(&active.flow_name) {
                    if let Some(collect_step) = compiled.collect_step_for_slot(slot) {
                        if active.current_step.as_deref() != Some(collect_step) {
                            let rewind = FlowManager
                                .rewind_to_step(state, collect_step)
                                .expect("active flow already confirmed present above");
                            delta = delta.then(rewind);
                        }
                    }
                }
                let detail = match prior {
                    Some(prior_value) => format!("correction: prior value was {prior_value}"),
                    None => "correction: slot was not previously set".to_string(),
                };
                HandlerOutcome {
                    outcome: CommandOutcome::Success,
                    detail: Some(detail),
                    delta,
                    messages: Vec::new(),
                    ends_turn: false,
                }
            }
            Err(outcome) => outcome,
        }
    }
}

struct AffirmConfirmationHandler;

impl CommandHandler for AffirmConfirmationHandler {
    fn handle(
        &self,
        _command: &Command,
        state: &DialogueState,
        ctx: &RuntimeContext,
    ) -> HandlerOutcome {
        resolve_confirmation(state, ctx, true, None)
    }
}

struct DenyConfirmationHandler;

impl CommandHandler for DenyConfirmationHandler {
    fn handle(
        &self,
        command: &Command,
        state: &DialogueState,
        ctx: &RuntimeContext,
    ) -> HandlerOutcome {
        let CommandKind::DenyConfirmation { rewind_slot } = &command.kind else {
            unreachable!("registry only dispatches DenyConfirmation to this handler")
        };
        resolve_confirmation(state, ctx, false, rewind_slot.as_deref())
    }
}

/// Shared implementation for `AffirmConfirmation`/`DenyConfirmation`:
/// advances the active instance's `current_step` to the confirm step's
/// `on_affirm_step`/`on_deny_step`, or, for a deny carrying `rewind_slot`,
/// to that slot's collect step instead (`spec.md` §4.4).
fn resolve_confirmation(
    state: &DialogueState,
    ctx: &RuntimeContext,
    affirmed: bool,
    rewind_slot: Option<&str>,
) -> HandlerOutcome {
    let active = match FlowManager.get_active(state) {
        Some(a) => a,
        None => return HandlerOutcome::error("no_active_flow"),
    };
    let compiled = match ctx.flows.get(&active.flow_name) {
        Some(c) => c,
        None => return HandlerOutcome::error(format!("unknown_flow: {}", active.flow_name)),
    };
    let step_id = match &active.current_step {
        Some(id) => id.clone(),
        None => return HandlerOutcome::error("no_pending_confirmation"),
    };
    let step = match compiled.step(&step_id) {
        Some(s) => s,
        None => return HandlerOutcome::error("no_pending_confirmation"),
    };
    let (on_affirm_step, on_deny_step) = match &step.kind {
        crate::definition::StepKind::Confirm {
            on_affirm_step,
            on_deny_step,
            ..
        } => (on_affirm_step.clone(), on_deny_step.clone()),
        _ => return HandlerOutcome::error("no_pending_confirmation"),
    };

    let target = if affirmed {
        on_affirm_step
    } else if let Some(slot) = rewind_slot {
        compiled
            .collect_step_for_slot(slot)
            .map(str::to_string)
            .unwrap_or(on_deny_step)
    } else {
        on_deny_step
    };

    let mut delta = FlowManager
        .advance_step(state, &target)
        .expect("active flow already confirmed present above");
    delta.pending_task = Some(None);
    HandlerOutcome::success(delta)
}

struct ClarifyHandler;

impl CommandHandler for ClarifyHandler {
    fn handle(
        &self,
        command: &Command,
        _state: &DialogueState,
        ctx: &RuntimeContext,
    ) -> HandlerOutcome {
        let CommandKind::Clarify { topic } = &command.kind else {
            unreachable!("registry only dispatches Clarify to this handler")
        };
        let message = match topic {
            Some(topic) => format!("{} {}", ctx.config.messages.clarify_fallback, topic),
            None => ctx.config.messages.clarify_fallback.clone(),
        };
        // Does not suspend (`wait_for_ack = false`): the turn continues and
        // the subgraph executor re-emits the current collect/confirm prompt
        // naturally, since `current_step` is untouched (`spec.md` §4.4).
        HandlerOutcome::success_with_messages(StateDelta::empty(), vec![message])
    }
}

struct HumanHandoffHandler;

impl CommandHandler for HumanHandoffHandler {
    fn handle(
        &self,
        command: &Command,
        _state: &DialogueState,
        ctx: &RuntimeContext,
    ) -> HandlerOutcome {
        let CommandKind::HumanHandoff { reason } = &command.kind else {
            unreachable!("registry only dispatches HumanHandoff to this handler")
        };
        let detail = reason.clone().unwrap_or_else(|| "handoff".to_string());
        HandlerOutcome {
            outcome: CommandOutcome::Success,
            detail: Some(detail),
            delta: StateDelta::empty(),
            messages: vec![ctx.config.messages.human_handoff.clone()],
            ends_turn: true,
        }
    }
}

/// Name-keyed lookup of one handler per command tag (`spec.md` §4.4 "a
/// registry map (command-type → handler)").
pub struct CommandHandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl CommandHandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The eight handlers `spec.md` §2/§4.4 names, pre-registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("start_flow", Arc::new(StartFlowHandler));
        registry.register("cancel_flow", Arc::new(CancelFlowHandler));
        registry.register("set_slot", Arc::new(SetSlotHandler));
        registry.register("correct_slot", Arc::new(CorrectSlotHandler));
        registry.register("affirm_confirmation", Arc::new(AffirmConfirmationHandler));
        registry.register("deny_confirmation", Arc::new(DenyConfirmationHandler));
        registry.register("clarify", Arc::new(ClarifyHandler));
        registry.register("human_handoff", Arc::new(HumanHandoffHandler));
        registry
    }

    pub fn register(&mut self, tag: &'static str, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(tag, handler);
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(tag).cloned()
    }
}

impl Default for CommandHandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// The outcome of running a whole turn's worth of commands in order
/// (`spec.md` §4.4 "Executor").
pub struct CommandExecutionResult {
    pub delta: StateDelta,
    pub messages: Vec<String>,
    /// Set by a `HumanHandoff` command: the orchestrator stops processing
    /// immediately and returns the buffered response as a sentinel.
    pub ends_turn: bool,
}

/// Runs an ordered list of commands against a locally accumulated state
/// view, folding each handler's delta in before the next command runs, so
/// later commands see earlier ones' effects — without ever mutating the
/// caller's `state` (`spec.md` §4.4).
pub struct CommandExecutor {
    registry: CommandHandlerRegistry,
}

impl CommandExecutor {
    pub fn new(registry: CommandHandlerRegistry) -> Self {
        Self { registry }
    }

    pub fn with_builtins() -> Self {
        Self::new(CommandHandlerRegistry::with_builtins())
    }

    pub fn execute_all(
        &self,
        commands: &[Command],
        state: &DialogueState,
        ctx: &RuntimeContext,
    ) -> CommandExecutionResult {
        let mut accumulated_delta = StateDelta::empty();
        let mut view = state.clone();
        let mut messages = Vec::new();
        let mut ends_turn = false;

        for command in commands {
            if ends_turn {
                break;
            }
            let tag = command.tag();
            let (outcome, detail, delta, mut command_messages, stop) = match self.registry.get(tag)
            {
                Some(handler) => {
                    let result = handler.handle(command, &view, ctx);
                    (
                        result.outcome,
                        result.detail,
                        result.delta,
                        result.messages,
                        result.ends_turn,
                    )
                }
                None => (
                    CommandOutcome::Skipped,
                    Some(format!("unknown_command: {tag}")),
                    StateDelta::empty(),
                    Vec::new(),
                    false,
                ),
            };

            let log_entry = CommandLogEntry {
                id: Uuid::new_v4(),
                command_kind: tag.to_string(),
                outcome,
                detail,
                at: chrono::Utc::now(),
            };
            let delta_with_log = delta.with_command_log(log_entry);
            view = view.apply(delta_with_log.clone());
            accumulated_delta = accumulated_delta.then(delta_with_log);
            messages.append(&mut command_messages);
            ends_turn = stop;
        }

        CommandExecutionResult {
            delta: accumulated_delta,
            messages,
            ends_turn,
        }
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::with_builtins()
    }
}
