//! The orchestrator: ties NLU, the command layer, and the subgraph executor
//! together into one turn (`spec.md` §4.6).
//!
//! `Orchestrator::run_turn` is deliberately the only place in the crate that
//! knows the full turn sequence. Everything it calls — [`CommandExecutor`],
//! [`SubgraphExecutor`], [`ScopeManager`] — stays ignorant of that sequence
//! and only does its own narrow job, the way the teacher's top-level
//! `run_graph` loop composes independently-testable node executions without
//! any of them knowing about the others.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::command::{Command, CommandExecutor, CommandKind};
use crate::context::RuntimeContext;
use crate::error::{DialogueError, Result};
use crate::executor::{SubgraphExecutor, SubgraphOutcome};
use crate::flow_manager::FlowManager;
use crate::nlu::{Awaiting, NluContext, NluProvider};
use crate::pending_task::PendingTask;
use crate::response_sink::ResponseSink;
use crate::scope::ScopeManager;
use crate::state::{DialogueState, Message, MessageRole, StateDelta};

/// Zero-sized namespace for running a single turn end to end.
#[derive(Debug, Clone, Copy, Default)]
pub struct Orchestrator;

impl Orchestrator {
    /// Run one turn: record the user's message, resolve any pending-task
    /// resumption, call NLU, execute the resulting commands, then step the
    /// subgraph executor until the turn suspends, goes idle, or the
    /// configured turn budget is exhausted (`spec.md` §4.6, numbered steps
    /// 1-6).
    ///
    /// Returns the fully evolved next state and the response text to send
    /// back to the user. A safety error
    /// ([`DialogueError::is_fatal_to_turn`]) aborts the whole turn: the
    /// caller ([`crate::turn::TurnLoop`]) must not persist `state` changes
    /// when this returns `Err`.
    pub async fn run_turn(
        &self,
        state: &DialogueState,
        ctx: &RuntimeContext,
        nlu: &dyn NluProvider,
        user_message: &str,
    ) -> Result<(DialogueState, String)> {
        let mut view = state.clone();
        let mut sink = ResponseSink::new(ctx.config.sink_separator.clone());

        view = view.apply(StateDelta::empty().with_message(Message {
            id: Uuid::new_v4(),
            role: MessageRole::User,
            text: user_message.to_string(),
            at: Utc::now(),
        }));

        // Any reply satisfies a fire-and-forget `inform` that opted into
        // waiting for an acknowledgement. This is structural, not a command
        // in the closed vocabulary (`spec.md` §2) — the flow simply
        // continues from where it suspended before anything else runs.
        view = resolve_inform_ack(&view, ctx);

        let awaiting = Awaiting::from_pending_task(view.pending_task.as_ref());
        let synthesized = synthesize_pending_command(view.pending_task.as_ref(), user_message);

        let nlu_context = NluContext {
            active_flow_name: FlowManager.get_active(&view).map(|a| a.flow_name.clone()),
            in_scope_slots: ScopeManager.in_scope_slots(&view, &ctx.flows),
            in_scope_actions: ScopeManager.in_scope_actions(&view, &ctx.flows),
            recent_messages: last_n(&view.messages, ctx.config.nlu_recent_messages),
            awaiting,
            current_time: Utc::now(),
        };

        let commands: Vec<Command> = match nlu.understand(user_message, nlu_context).await {
            Ok(output) if !output.commands.is_empty() => output.commands,
            Ok(_) => synthesized.into_iter().collect(),
            Err(reason) => {
                tracing::warn!(error = %reason, "NLU provider call failed");
                sink.push(ctx.config.messages.nlu_error.clone());
                view = view.apply(StateDelta {
                    last_error: Some(format!("nlu_error: {reason}")),
                    ..StateDelta::empty()
                });
                synthesized.into_iter().collect()
            }
        };

        let exec_result = ctx.commands.execute_all(&commands, &view, ctx);
        view = view.apply(exec_result.delta);
        sink.push_all(exec_result.messages);

        if exec_result.ends_turn {
            view = view.apply(StateDelta {
                increment_turn_counter: true,
                ..StateDelta::empty()
            });
            return Ok((view, sink.finish()));
        }

        let mut subgraph_runs = 0usize;
        loop {
            if FlowManager.get_active(&view).is_none() {
                break;
            }
            if view
                .pending_task
                .as_ref()
                .map(PendingTask::requires_input)
                .unwrap_or(false)
            {
                break;
            }

            subgraph_runs += 1;
            if subgraph_runs > ctx.config.turn_budget {
                return Err(DialogueError::TurnBudgetExhausted {
                    limit: ctx.config.turn_budget,
                });
            }

            let (delta, outcome) = SubgraphExecutor.run(&view, ctx, &mut sink).await?;
            view = view.apply(delta);
            if outcome == SubgraphOutcome::Idle {
                break;
            }
        }

        view = view.apply(StateDelta {
            increment_turn_counter: true,
            ..StateDelta::empty()
        });

        Ok((view, sink.finish()))
    }
}

/// If the active instance is suspended on an `inform` awaiting
/// acknowledgement, advance it past that step and clear the pending task.
/// A no-op otherwise.
fn resolve_inform_ack(state: &DialogueState, ctx: &RuntimeContext) -> DialogueState {
    let Some(PendingTask::Inform {
        wait_for_ack: true, ..
    }) = &state.pending_task
    else {
        return state.clone();
    };
    let Some(active) = FlowManager.get_active(state) else {
        return state.clone();
    };
    let Some(compiled) = ctx.flows.get(&active.flow_name) else {
        return state.clone();
    };
    let Some(step_id) = &active.current_step else {
        return state.clone();
    };
    let Some(step) = compiled.step(step_id) else {
        return state.clone();
    };
    let Some(next) = step.next_step.clone() else {
        return state.clone();
    };

    let mut delta = FlowManager
        .advance_step(state, &next)
        .expect("active flow confirmed present above");
    delta.pending_task = Some(None);
    state.apply(delta)
}

/// Build the default `SetSlot` command a pending `collect` task implies, as
/// a fallback for when NLU returns nothing usable (`spec.md` §4.6 step 2).
/// `confirm` and `inform`-ack resumption are not synthesized this way: a
/// yes/no judgment call belongs to NLU, and inform-ack resumption is
/// already handled structurally above.
fn synthesize_pending_command(pending: Option<&PendingTask>, user_message: &str) -> Option<Command> {
    match pending {
        Some(PendingTask::Collect { slot, .. }) => Some(Command::new(
            CommandKind::SetSlot {
                slot: slot.clone(),
                value: Value::String(user_message.to_string()),
            },
            1.0,
        )),
        _ => None,
    }
}

fn last_n(messages: &[Message], n: usize) -> Vec<Message> {
    let start = messages.len().saturating_sub(n);
    messages[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::InMemoryActionRegistry;
    use crate::compiler::FlowCompiler;
    use crate::config::EngineConfig;
    use crate::definition::{ActionSignature, FlowDefinition, SlotDeclaration, StepDefinition, StepKind};
    use crate::nlu::{NluOutput, NoopNlu};
    use crate::validator::{SlotType, ValidatorRegistry};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn greeter_ctx() -> RuntimeContext {
        let flow = FlowDefinition::new("book_flight", "ask_origin")
            .with_slot("origin", SlotDeclaration::new(SlotType::String))
            .with_step(
                "ask_origin",
                StepDefinition::new(StepKind::Collect {
                    slot: "origin".into(),
                    prompt: "Where from?".into(),
                })
                .then("done"),
            )
            .with_step("done", StepDefinition::new(StepKind::End));

        let validators = ValidatorRegistry::with_builtins();
        let actions: Vec<ActionSignature> = vec![];
        let flows = FlowCompiler::new(&validators, &actions)
            .compile(vec![flow])
            .unwrap();

        RuntimeContext::new(
            flows,
            validators,
            Arc::new(InMemoryActionRegistry::new()),
            EngineConfig::default(),
        )
    }

    struct ScriptedNlu {
        commands: Vec<Command>,
    }

    #[async_trait]
    impl NluProvider for ScriptedNlu {
        async fn understand(
            &self,
            _user_message: &str,
            _context: NluContext,
        ) -> std::result::Result<NluOutput, String> {
            Ok(NluOutput {
                commands: self.commands.clone(),
                confidence: 1.0,
                reasoning: "scripted".into(),
            })
        }
    }

    #[tokio::test]
    async fn start_flow_then_collect_suspends_awaiting_origin() {
        let ctx = greeter_ctx();
        let nlu = ScriptedNlu {
            commands: vec![Command::new(
                CommandKind::StartFlow {
                    flow_name: "book_flight".into(),
                    inputs: Default::default(),
                },
                1.0,
            )],
        };
        let state = DialogueState::fresh();
        let (next, response) = Orchestrator
            .run_turn(&state, &ctx, &nlu, "I'd like to book a flight")
            .await
            .unwrap();

        assert!(next.active_flow().is_some());
        assert!(matches!(next.pending_task, Some(PendingTask::Collect { .. })));
        assert!(response.contains("Where from?"));
        assert_eq!(next.metadata.turn_counter, 1);
    }

    #[tokio::test]
    async fn synthesized_set_slot_resumes_collect_when_nlu_returns_nothing() {
        let ctx = greeter_ctx();
        let state = DialogueState::fresh();
        let (state, _) = Orchestrator
            .run_turn(&state, &ctx, &ScriptedNlu { commands: vec![] }, "noop")
            .await
            .unwrap();
        let (state, _) = Orchestrator
            .run_turn(
                &state,
                &ctx,
                &ScriptedNlu {
                    commands: vec![Command::new(
                        CommandKind::StartFlow {
                            flow_name: "book_flight".into(),
                            inputs: Default::default(),
                        },
                        1.0,
                    )],
                },
                "start it",
            )
            .await
            .unwrap();
        assert!(matches!(state.pending_task, Some(PendingTask::Collect { .. })));

        let (next, _) = Orchestrator
            .run_turn(&state, &ctx, &NoopNlu, "NYC")
            .await
            .unwrap();
        assert!(next.is_idle(), "flow should have completed and been popped");
        assert_eq!(next.archive.last().unwrap().outputs.len(), 0);
    }

    #[tokio::test]
    async fn nlu_failure_pushes_fallback_and_does_not_crash_the_turn() {
        struct AlwaysFails;
        #[async_trait]
        impl NluProvider for AlwaysFails {
            async fn understand(
                &self,
                _user_message: &str,
                _context: NluContext,
            ) -> std::result::Result<NluOutput, String> {
                Err("model unavailable".to_string())
            }
        }

        let ctx = greeter_ctx();
        let state = DialogueState::fresh();
        let (next, response) = Orchestrator
            .run_turn(&state, &ctx, &AlwaysFails, "hello")
            .await
            .unwrap();
        assert_eq!(response, ctx.config.messages.nlu_error);
        assert!(next.metadata.last_error.is_some());
    }
}
