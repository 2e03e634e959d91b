//! Action handler registry — the external collaborator that runs business
//! logic behind an `action` step. `spec.md` §6 "Action handler registry":
//! business logic bodies are registered user code, deliberately out of
//! scope for the core; the core only validates input keys and merges
//! declared outputs.
//!
//! Shaped after the teacher's `ToolRegistry` (a name-keyed map of callable
//! units with a uniform `execute` entry point), generalized to `async_trait`
//! since action handlers commonly do their own I/O (payment gateways,
//! inventory lookups, etc).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Inputs handed to an action handler: the declared input slots' current
/// values, keyed by slot name.
pub type ActionInputs = HashMap<String, Value>;

/// Outputs an action handler produces, merged into the active flow
/// instance's outputs and slots per the step's output mapping (`spec.md`
/// §4.1 `action`).
pub type ActionOutputs = HashMap<String, Value>;

/// Error surfaced by an action handler. Carried into
/// [`crate::error::DialogueError::Action`] by the subgraph executor, which
/// routes to the step's `on_error_step` rather than aborting the turn.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ActionError(pub String);

impl From<String> for ActionError {
    fn from(value: String) -> Self {
        ActionError(value)
    }
}

impl From<&str> for ActionError {
    fn from(value: &str) -> Self {
        ActionError(value.to_string())
    }
}

/// One registered action handler. Business logic lives entirely in the
/// implementer; the core calls `execute` and interprets only the
/// `Result`.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, inputs: ActionInputs) -> Result<ActionOutputs, ActionError>;
}

/// Name-keyed lookup of registered action handlers, read-only once the
/// process has started (`spec.md` §5 "Action handler registry is read-only
/// after startup").
#[async_trait]
pub trait ActionRegistry: Send + Sync {
    async fn invoke(&self, name: &str, inputs: ActionInputs) -> Result<ActionOutputs, ActionError>;

    fn has_action(&self, name: &str) -> bool;

    fn action_names(&self) -> Vec<String>;
}

/// An in-process, `HashMap`-backed registry. Sufficient for single-binary
/// deployments and for tests; a distributed deployment might instead route
/// `invoke` over RPC to a separate action-execution service, which is
/// exactly what the trait boundary is for.
#[derive(Default)]
pub struct InMemoryActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl InMemoryActionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(name.into(), handler);
    }
}

#[async_trait]
impl ActionRegistry for InMemoryActionRegistry {
    async fn invoke(&self, name: &str, inputs: ActionInputs) -> Result<ActionOutputs, ActionError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ActionError(format!("no action handler registered for '{name}'")))?;
        handler.execute(inputs).await
    }

    fn has_action(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    fn action_names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        async fn execute(&self, inputs: ActionInputs) -> Result<ActionOutputs, ActionError> {
            Ok(inputs)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl ActionHandler for AlwaysFails {
        async fn execute(&self, _inputs: ActionInputs) -> Result<ActionOutputs, ActionError> {
            Err(ActionError("boom".into()))
        }
    }

    #[tokio::test]
    async fn invoke_runs_the_registered_handler() {
        let mut registry = InMemoryActionRegistry::new();
        registry.register("echo", Arc::new(Echo));

        let mut inputs = HashMap::new();
        inputs.insert("x".to_string(), Value::String("y".into()));
        let outputs = registry.invoke("echo", inputs.clone()).await.unwrap();
        assert_eq!(outputs, inputs);
    }

    #[tokio::test]
    async fn invoke_unknown_action_errors() {
        let registry = InMemoryActionRegistry::new();
        let err = registry.invoke("missing", HashMap::new()).await.unwrap_err();
        assert!(err.0.contains("missing"));
    }

    #[tokio::test]
    async fn handler_error_propagates() {
        let mut registry = InMemoryActionRegistry::new();
        registry.register("fails", Arc::new(AlwaysFails));
        let err = registry.invoke("fails", HashMap::new()).await.unwrap_err();
        assert_eq!(err.0, "boom");
    }
}
