//! The checkpointed subgraph executor: steps a single active flow instance
//! forward, one step at a time, until it suspends awaiting input, reaches
//! `end`, or exhausts its step budget (`spec.md` §4.5).
//!
//! Mirrors the teacher's Pregel-style step loop — each iteration dispatches
//! on the current node's kind, applies whatever delta that produces, and
//! either continues within the same turn or yields control back to the
//! caller. The loop itself never mutates `DialogueState` in place; it
//! threads a locally accumulated view exactly the way
//! [`crate::command::CommandExecutor`] does, folding deltas as it goes and
//! returning only the final accumulated delta.

use std::collections::HashMap;

use serde_json::Value;

use crate::context::RuntimeContext;
use crate::definition::StepKind;
use crate::error::{DialogueError, Result};
use crate::flow_manager::{FlowManager, TerminalState};
use crate::pending_task::PendingTask;
use crate::response_sink::ResponseSink;
use crate::state::{DialogueState, StateDelta};

/// How a subgraph run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubgraphOutcome {
    /// A step emitted a pending task requiring user input; the turn stops
    /// here until the next message arrives.
    Suspended,
    /// The active flow reached `end` and was popped. The stack may now
    /// reveal another paused instance as active, in which case the
    /// orchestrator runs the executor again.
    FlowCompleted,
    /// No flow was active when the executor was invoked.
    Idle,
}

/// Zero-sized namespace for running one flow instance forward, mirroring
/// [`FlowManager`]'s grouping style.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubgraphExecutor;

impl SubgraphExecutor {
    /// Run the active flow instance forward until it suspends, completes,
    /// or exhausts `ctx.config.step_budget` (`spec.md` §4.5 — on exhaustion
    /// this returns [`DialogueError::StepBudgetExhausted`], a safety error
    /// that aborts the whole turn).
    pub async fn run(
        &self,
        state: &DialogueState,
        ctx: &RuntimeContext,
        sink: &mut ResponseSink,
    ) -> Result<(StateDelta, SubgraphOutcome)> {
        let mut view = state.clone();
        let mut accumulated = StateDelta::empty();
        let mut steps_taken = 0usize;

        loop {
            let Some(active) = FlowManager.get_active(&view).cloned() else {
                return Ok((accumulated, SubgraphOutcome::Idle));
            };
            let compiled = ctx
                .flows
                .get(&active.flow_name)
                .ok_or_else(|| DialogueError::UnknownFlow(active.flow_name.clone()))?;

            let step_id = active
                .current_step
                .clone()
                .unwrap_or_else(|| compiled.entry_step.to_string());
            if active.current_step.is_none() {
                let delta = FlowManager
                    .advance_step(&view, &step_id)
                    .expect("active flow confirmed present above");
                view = view.apply(delta.clone());
                accumulated = accumulated.then(delta);
            }

            steps_taken += 1;
            if steps_taken > ctx.config.step_budget {
                return Err(DialogueError::StepBudgetExhausted {
                    flow: active.flow_name.clone(),
                    limit: ctx.config.step_budget,
                });
            }

            let step = compiled
                .step(&step_id)
                .expect("compiler guarantees every current_step we set resolves");

            match step.kind.clone() {
                StepKind::Collect { slot, prompt } => {
                    if let Some(value) = FlowManager.get_slot_for(&view, active.instance_id, &slot)
                    {
                        let _ = value;
                        let target = step
                            .next_step
                            .clone()
                            .expect("compiler requires next_step on collect");
                        let mut delta = FlowManager
                            .advance_step(&view, &target)
                            .expect("active flow confirmed present above");
                        delta.pending_task = Some(None);
                        view = view.apply(delta.clone());
                        accumulated = accumulated.then(delta);
                    } else {
                        let mut delta = StateDelta::empty();
                        delta.pending_task = Some(Some(PendingTask::Collect {
                            slot: slot.clone(),
                            prompt: prompt.clone(),
                        }));
                        sink.push(prompt);
                        accumulated = accumulated.then(delta.clone());
                        return Ok((accumulated, SubgraphOutcome::Suspended));
                    }
                }
                StepKind::Say { message } => {
                    sink.push(message);
                    let target = step
                        .next_step
                        .clone()
                        .expect("compiler requires next_step on say");
                    let delta = FlowManager
                        .advance_step(&view, &target)
                        .expect("active flow confirmed present above");
                    view = view.apply(delta.clone());
                    accumulated = accumulated.then(delta);
                }
                StepKind::Inform {
                    template,
                    slots,
                    wait_for_ack,
                } => {
                    let rendered = render_template(&template, &slots, &view, active.instance_id);
                    sink.push(rendered.clone());
                    if wait_for_ack {
                        let mut delta = StateDelta::empty();
                        delta.pending_task = Some(Some(PendingTask::Inform {
                            prompt: rendered,
                            wait_for_ack: true,
                        }));
                        accumulated = accumulated.then(delta);
                        return Ok((accumulated, SubgraphOutcome::Suspended));
                    }
                    let target = step
                        .next_step
                        .clone()
                        .expect("compiler requires next_step on inform");
                    let mut delta = FlowManager
                        .advance_step(&view, &target)
                        .expect("active flow confirmed present above");
                    delta.pending_task = Some(None);
                    view = view.apply(delta.clone());
                    accumulated = accumulated.then(delta);
                }
                StepKind::Confirm { prompt, .. } => {
                    let mut delta = StateDelta::empty();
                    delta.pending_task = Some(Some(PendingTask::Confirm {
                        prompt: prompt.clone(),
                    }));
                    sink.push(prompt);
                    accumulated = accumulated.then(delta);
                    return Ok((accumulated, SubgraphOutcome::Suspended));
                }
                StepKind::Action {
                    handler,
                    input_slots,
                    output_slots,
                    on_success_step,
                    on_error_step,
                } => {
                    let mut inputs = HashMap::new();
                    for slot in &input_slots {
                        if let Some(value) =
                            FlowManager.get_slot_for(&view, active.instance_id, slot)
                        {
                            inputs.insert(slot.clone(), value.clone());
                        }
                    }

                    let target = match ctx.actions.invoke(&handler, inputs).await {
                        Ok(outputs) => {
                            let mut kept = HashMap::new();
                            for name in &output_slots {
                                if let Some(value) = outputs.get(name) {
                                    kept.insert(name.clone(), value.clone());
                                }
                            }
                            if !kept.is_empty() {
                                let mut updates = HashMap::new();
                                updates.insert(active.instance_id, kept);
                                let delta = StateDelta {
                                    slot_heap_updates: updates,
                                    ..StateDelta::empty()
                                };
                                view = view.apply(delta.clone());
                                accumulated = accumulated.then(delta);
                            }
                            on_success_step
                        }
                        Err(e) => {
                            sink.push(ctx.config.messages.action_error.clone());
                            tracing::warn!(action = %handler, error = %e, "action handler failed");
                            on_error_step
                        }
                    };

                    let delta = FlowManager
                        .advance_step(&view, &target)
                        .expect("active flow confirmed present above");
                    view = view.apply(delta.clone());
                    accumulated = accumulated.then(delta);
                }
                StepKind::Branch {
                    slot,
                    case_to_step_map,
                    default_step,
                } => {
                    let matched = FlowManager
                        .get_slot_for(&view, active.instance_id, &slot)
                        .and_then(Value::as_str)
                        .and_then(|value| case_to_step_map.get(value).cloned());
                    let target = matched.or(default_step).ok_or_else(|| {
                        DialogueError::BranchNoMatch {
                            flow: active.flow_name.clone(),
                            step: step_id.clone(),
                        }
                    })?;
                    let delta = FlowManager
                        .advance_step(&view, &target)
                        .expect("active flow confirmed present above");
                    view = view.apply(delta.clone());
                    accumulated = accumulated.then(delta);
                }
                StepKind::While {
                    condition_slot,
                    body_step,
                } => {
                    let truthy = FlowManager
                        .get_slot_for(&view, active.instance_id, &condition_slot)
                        .map(is_truthy)
                        .unwrap_or(false);
                    let target = if truthy {
                        body_step
                    } else {
                        step
                            .next_step
                            .clone()
                            .expect("compiler requires next_step on while")
                    };
                    let delta = FlowManager
                        .advance_step(&view, &target)
                        .expect("active flow confirmed present above");
                    view = view.apply(delta.clone());
                    accumulated = accumulated.then(delta);
                }
                StepKind::Jump { target_step } => {
                    let delta = FlowManager
                        .advance_step(&view, &target_step)
                        .expect("active flow confirmed present above");
                    view = view.apply(delta.clone());
                    accumulated = accumulated.then(delta);
                }
                StepKind::End => {
                    let outputs = compiled
                        .declared_outputs
                        .iter()
                        .filter_map(|name| {
                            FlowManager
                                .get_slot_for(&view, active.instance_id, name)
                                .map(|value| (name.clone(), value.clone()))
                        })
                        .collect::<HashMap<String, Value>>();
                    let delta = FlowManager
                        .pop_flow(&view, outputs, TerminalState::Completed)
                        .expect("active flow confirmed present above");
                    accumulated = accumulated.then(delta);
                    return Ok((accumulated, SubgraphOutcome::FlowCompleted));
                }
            }
        }
    }
}

/// Replace each `{slot_name}` placeholder in `template` with that slot's
/// current value in `instance_id`'s scope, rendered as a plain string.
/// Placeholders for slots not yet filled are left untouched — an author
/// error the compiler does not currently catch (`spec.md` §4.1 open
/// question on template validation).
fn render_template(
    template: &str,
    slots: &[String],
    state: &DialogueState,
    instance_id: crate::state::FlowInstanceId,
) -> String {
    let mut rendered = template.to_string();
    for slot in slots {
        if let Some(value) = FlowManager.get_slot_for(state, instance_id, slot) {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&format!("{{{slot}}}"), &text);
        }
    }
    rendered
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
