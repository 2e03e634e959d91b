//! The turn loop: per-user-key serialization, checkpoint load/save, and the
//! wall-clock turn deadline around [`Orchestrator::run_turn`] (`spec.md`
//! §4.7, §5).
//!
//! Grounded on the teacher's `ConnectionPool` (`orchestrator/src/api/ws`):
//! a `DashMap` of per-key `Mutex<()>` guards so two turns for the same
//! conversation never interleave, while turns for different conversations
//! run fully concurrently — no global lock anywhere in this module.

use std::sync::Arc;

use dashmap::DashMap;
use dialogue_checkpoint::{CheckpointStore, MigrationRegistry, PersistedState};
use tokio::sync::Mutex;

use crate::context::RuntimeContext;
use crate::error::{DialogueError, Result};
use crate::nlu::NluProvider;
use crate::orchestrator::Orchestrator;
use crate::state::DialogueState;

/// Drives turns for many concurrent conversations against one shared
/// [`RuntimeContext`], one NLU provider, and one checkpoint store.
pub struct TurnLoop {
    ctx: Arc<RuntimeContext>,
    nlu: Arc<dyn NluProvider>,
    store: Arc<dyn CheckpointStore>,
    migrations: Arc<MigrationRegistry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TurnLoop {
    pub fn new(
        ctx: Arc<RuntimeContext>,
        nlu: Arc<dyn NluProvider>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self::with_migrations(ctx, nlu, store, MigrationRegistry::new())
    }

    /// Like [`TurnLoop::new`] but with a caller-supplied migration registry,
    /// for deployments that have shipped a schema change and need to
    /// upgrade older checkpoints on load (`spec.md` §4.7).
    pub fn with_migrations(
        ctx: Arc<RuntimeContext>,
        nlu: Arc<dyn NluProvider>,
        store: Arc<dyn CheckpointStore>,
        migrations: MigrationRegistry,
    ) -> Self {
        Self {
            ctx,
            nlu,
            store,
            migrations: Arc::new(migrations),
            locks: DashMap::new(),
        }
    }

    /// Process one turn for `user_key`: load the conversation's checkpoint
    /// (falling back to a fresh state on any load failure), run it through
    /// [`Orchestrator::run_turn`] under the configured turn deadline, prune,
    /// and save — all while holding this user key's lock, so a second
    /// concurrent message for the same key waits rather than racing
    /// (`spec.md` §5 "Shared resources").
    ///
    /// A turn that hits a fatal safety error or exceeds the deadline returns
    /// `Ok` with a fallback message; nothing is persisted for that turn,
    /// matching "equivalent to a crash" (`spec.md` §5, §7).
    pub async fn process_turn(&self, user_key: &str, user_message: &str) -> Result<String> {
        let lock = self.lock_for(user_key);
        let _guard = lock.lock().await;

        let state = self.load_or_fresh(user_key).await;

        let outcome = tokio::time::timeout(
            self.ctx.config.turn_deadline,
            Orchestrator.run_turn(&state, &self.ctx, self.nlu.as_ref(), user_message),
        )
        .await;

        let (mut next_state, response) = match outcome {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) if e.is_fatal_to_turn() => {
                tracing::error!(user_key, error = %e, "turn aborted by a safety error");
                return Ok(fallback_message_for(&e, &self.ctx));
            }
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) => {
                tracing::error!(
                    user_key,
                    deadline_secs = self.ctx.config.turn_deadline.as_secs_f64(),
                    "turn exceeded its deadline; nothing persisted"
                );
                return Ok(self.ctx.config.messages.turn_timeout.clone());
            }
        };

        next_state.prune(&self.ctx.config.pruning);

        let payload = serde_json::to_value(&next_state)?;
        self.store
            .save(user_key, PersistedState::current(payload))
            .await?;

        Ok(response)
    }

    async fn load_or_fresh(&self, user_key: &str) -> DialogueState {
        match self.store.load(user_key).await {
            Ok(None) => DialogueState::fresh(),
            Ok(Some(persisted)) => match self.migrations.migrate(persisted) {
                Ok(payload) => match serde_json::from_value(payload) {
                    Ok(state) => state,
                    Err(e) => {
                        tracing::warn!(user_key, error = %e, "checkpoint payload did not deserialize; starting fresh");
                        DialogueState::fresh()
                    }
                },
                Err(e) => {
                    tracing::warn!(user_key, error = %e, "checkpoint migration failed; starting fresh");
                    DialogueState::fresh()
                }
            },
            Err(e) => {
                tracing::warn!(user_key, error = %e, "checkpoint load failed; starting fresh");
                DialogueState::fresh()
            }
        }
    }

    fn lock_for(&self, user_key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Pick the user-facing fallback message for a turn-fatal error. All three
/// budget/routing safety errors share the same generic "something went
/// wrong" wording; only the timeout gets a distinct message, since it is
/// the one case a user might plausibly act on (retry after a pause).
fn fallback_message_for(error: &DialogueError, ctx: &RuntimeContext) -> String {
    match error {
        DialogueError::TurnBudgetExhausted { .. } => ctx.config.messages.turn_budget_exhausted.clone(),
        DialogueError::TurnTimeout => ctx.config.messages.turn_timeout.clone(),
        _ => ctx.config.messages.step_budget_exhausted.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::InMemoryActionRegistry;
    use crate::command::{Command, CommandKind};
    use crate::compiler::FlowCompiler;
    use crate::config::EngineConfig;
    use crate::definition::{ActionSignature, FlowDefinition, SlotDeclaration, StepDefinition, StepKind};
    use crate::nlu::{NluContext, NluOutput, NoopNlu};
    use crate::validator::{SlotType, ValidatorRegistry};
    use async_trait::async_trait;
    use dialogue_checkpoint::InMemoryCheckpointStore;
    use std::time::Duration;

    fn greeter_ctx() -> Arc<RuntimeContext> {
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
        Arc::new(RuntimeContext::new(
            flows,
            validators,
            Arc::new(InMemoryActionRegistry::new()),
            EngineConfig::default(),
        ))
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
    async fn checkpoint_round_trips_across_turns() {
        let ctx = greeter_ctx();
        let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
        let nlu: Arc<dyn NluProvider> = Arc::new(ScriptedNlu {
            commands: vec![Command::new(
                CommandKind::StartFlow {
                    flow_name: "book_flight".into(),
                    inputs: Default::default(),
                },
                1.0,
            )],
        });
        let loop1 = TurnLoop::new(ctx.clone(), nlu, store.clone());

        let response = loop1.process_turn("user-1", "book a flight").await.unwrap();
        assert!(response.contains("Where from?"));

        let loop2 = TurnLoop::new(ctx, Arc::new(NoopNlu), store);
        let response2 = loop2.process_turn("user-1", "NYC").await.unwrap();
        assert!(!response2.is_empty());
    }

    #[tokio::test]
    async fn unrelated_user_keys_have_independent_checkpoints() {
        let ctx = greeter_ctx();
        let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
        let turn_loop = TurnLoop::new(ctx, Arc::new(NoopNlu), store.clone());

        turn_loop.process_turn("alice", "hi").await.unwrap();
        turn_loop.process_turn("bob", "hi").await.unwrap();

        let in_memory = store.load("alice").await.unwrap();
        assert!(in_memory.is_some());
        assert!(store.load("bob").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn turn_exceeding_deadline_persists_nothing() {
        struct SlowNlu;
        #[async_trait]
        impl NluProvider for SlowNlu {
            async fn understand(
                &self,
                _user_message: &str,
                _context: NluContext,
            ) -> std::result::Result<NluOutput, String> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(NluOutput::empty("slow"))
            }
        }

        let mut ctx = (*greeter_ctx()).clone();
        ctx.config.turn_deadline = Duration::from_millis(5);
        let ctx = Arc::new(ctx);
        let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
        let turn_loop = TurnLoop::new(ctx.clone(), Arc::new(SlowNlu), store.clone());

        let response = turn_loop.process_turn("user-1", "hello").await.unwrap();
        assert_eq!(response, ctx.config.messages.turn_timeout);
        assert!(store.load("user-1").await.unwrap().is_none());
    }
}
