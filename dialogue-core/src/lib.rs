//! # dialogue-core — a task-oriented dialogue orchestration engine
//!
//! `dialogue-core` runs multi-turn, flow-based conversations: an embedder
//! declares flows as step graphs (collect a slot, say something, confirm,
//! invoke a registered action, branch, loop, jump, end), compiles them once
//! at startup, and then drives turns through [`TurnLoop::process_turn`] —
//! one call per inbound user message, keyed by a stable per-conversation
//! user key.
//!
//! ## Shape of the system
//!
//! - **Definition → compiled flow.** Authors build [`definition::FlowDefinition`]
//!   values; [`compiler::FlowCompiler`] validates every cross-reference once
//!   and produces a [`compiled::CompiledFlowSet`] that the rest of the crate
//!   trusts without re-checking.
//! - **State is a pure record.** [`state::DialogueState`] never mutates
//!   itself; every operation ([`flow_manager::FlowManager`],
//!   [`command::CommandHandler`] implementations, the subgraph executor)
//!   returns a [`state::StateDelta`], and only [`state::DialogueState::apply`]
//!   turns one into a new state.
//! - **NLU is a boundary, not a component.** The core never decides what
//!   the user meant; it hands a bounded [`nlu::NluContext`] to an
//!   implementation of [`nlu::NluProvider`] and consumes the
//!   [`command::Command`]s it returns.
//! - **Execution is checkpointed at turn boundaries only.** A
//!   [`turn::TurnLoop`] serializes concurrent turns per user key, loads and
//!   saves through a `dialogue_checkpoint::CheckpointStore`, and treats a
//!   deadline overrun the same as a crash: nothing from that turn is kept.
//!
//! ## Minimal wiring
//!
//! ```no_run
//! use std::sync::Arc;
//! use dialogue_core::action::InMemoryActionRegistry;
//! use dialogue_core::compiler::FlowCompiler;
//! use dialogue_core::config::EngineConfig;
//! use dialogue_core::context::RuntimeContext;
//! use dialogue_core::definition::{ActionSignature, FlowDefinition, SlotDeclaration, StepDefinition, StepKind};
//! use dialogue_core::nlu::NoopNlu;
//! use dialogue_core::turn::TurnLoop;
//! use dialogue_core::validator::{SlotType, ValidatorRegistry};
//! use dialogue_checkpoint::InMemoryCheckpointStore;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let flow = FlowDefinition::new("greet", "say_hello")
//!     .with_slot("name", SlotDeclaration::new(SlotType::String))
//!     .with_step(
//!         "say_hello",
//!         StepDefinition::new(StepKind::Collect {
//!             slot: "name".into(),
//!             prompt: "What's your name?".into(),
//!         })
//!         .then("done"),
//!     )
//!     .with_step("done", StepDefinition::new(StepKind::End));
//!
//! let validators = ValidatorRegistry::with_builtins();
//! let actions: Vec<ActionSignature> = vec![];
//! let flows = FlowCompiler::new(&validators, &actions)
//!     .compile(vec![flow])
//!     .expect("flow definitions are valid");
//!
//! let ctx = Arc::new(RuntimeContext::new(
//!     flows,
//!     validators,
//!     Arc::new(InMemoryActionRegistry::new()),
//!     EngineConfig::default(),
//! ));
//! let store = Arc::new(InMemoryCheckpointStore::new());
//! let turn_loop = TurnLoop::new(ctx, Arc::new(NoopNlu), store);
//!
//! let response = turn_loop.process_turn("conversation-42", "hi").await.unwrap();
//! println!("{response}");
//! # }
//! ```

pub mod action;
pub mod command;
pub mod compiled;
pub mod compiler;
pub mod config;
pub mod context;
pub mod definition;
pub mod error;
pub mod executor;
pub mod flow_manager;
pub mod nlu;
pub mod orchestrator;
pub mod pending_task;
pub mod response_sink;
pub mod scope;
pub mod state;
pub mod step;
pub mod turn;
pub mod validator;

pub use command::{Command, CommandKind};
pub use context::RuntimeContext;
pub use error::{DialogueError, Result};
pub use orchestrator::Orchestrator;
pub use state::{DialogueState, StateDelta};
pub use turn::TurnLoop;
