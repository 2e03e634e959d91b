//! The runtime context: the immutable, per-process bundle injected into
//! every node (`spec.md` §2 "Runtime Context").
//!
//! Everything here is set once, at startup, and shared read-only across
//! every turn for every user key for the lifetime of the process — compiled
//! flows, the validator registry, the action registry, and the tunable
//! [`EngineConfig`]. No turn ever mutates a `RuntimeContext`; per-turn
//! mutable state ([`crate::response_sink::ResponseSink`],
//! [`crate::state::DialogueState`]) is threaded alongside it, never through
//! it.

use std::sync::Arc;

use crate::action::ActionRegistry;
use crate::command::{CommandExecutor, CommandHandlerRegistry};
use crate::compiled::CompiledFlowSet;
use crate::config::EngineConfig;
use crate::validator::ValidatorRegistry;

/// Shared, read-only bundle of everything a turn needs beyond its own
/// per-conversation state.
#[derive(Clone)]
pub struct RuntimeContext {
    pub flows: Arc<CompiledFlowSet>,
    pub validators: Arc<ValidatorRegistry>,
    pub actions: Arc<dyn ActionRegistry>,
    pub commands: Arc<CommandExecutor>,
    pub config: EngineConfig,
}

impl RuntimeContext {
    pub fn new(
        flows: CompiledFlowSet,
        validators: ValidatorRegistry,
        actions: Arc<dyn ActionRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            flows: Arc::new(flows),
            validators: Arc::new(validators),
            actions,
            commands: Arc::new(CommandExecutor::with_builtins()),
            config,
        }
    }

    /// Like [`RuntimeContext::new`] but with a caller-supplied command
    /// handler registry, for embedders that extend the closed command
    /// vocabulary with their own handlers (`spec.md` §9 "enabling
    /// open/closed extension without touching the executor").
    pub fn with_command_registry(
        flows: CompiledFlowSet,
        validators: ValidatorRegistry,
        actions: Arc<dyn ActionRegistry>,
        commands: CommandHandlerRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            flows: Arc::new(flows),
            validators: Arc::new(validators),
            actions,
            commands: Arc::new(CommandExecutor::new(commands)),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::InMemoryActionRegistry;

    #[test]
    fn construction_holds_the_given_flow_set() {
        let ctx = RuntimeContext::new(
            CompiledFlowSet::new(),
            ValidatorRegistry::with_builtins(),
            Arc::new(InMemoryActionRegistry::new()),
            EngineConfig::default(),
        );
        assert!(ctx.flows.is_empty());
    }
}
