//! The flow definition model — the declarative, author-facing input to the
//! [compiler](crate::compiler).
//!
//! These types are what an embedder builds (by hand, or by deserializing
//! from YAML/JSON) to describe a conversational flow: its steps, the slots
//! it collects, the actions it calls, and how control moves between steps.
//! Nothing here is validated yet — that happens once, at startup, in
//! [`crate::compiler::FlowCompiler`]. `definition.rs` is deliberately inert:
//! it is a data model, not an execution model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::validator::SlotType;

/// A named flow: an ordered step graph plus the slot declarations its steps
/// reference. Mirrors `spec.md` §3 "Flow definition".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub name: String,
    /// The step executed first when the flow is pushed onto the stack.
    pub entry_step: String,
    pub steps: HashMap<String, StepDefinition>,
    /// Slots this flow declares, in addition to any shared/global slots the
    /// embedder registers separately.
    #[serde(default)]
    pub slots: HashMap<String, SlotDeclaration>,
    /// Names of declared slots copied into the completed
    /// [`crate::state::FlowContext::outputs`] bag when the flow reaches an
    /// `end` step (`spec.md` §3 "Compiled flow... declared outputs"). Read by
    /// another flow out of the archive, never out of live slots (`spec.md`
    /// §9 "Cross-flow data transfer").
    #[serde(default)]
    pub declared_outputs: Vec<String>,
}

impl FlowDefinition {
    pub fn new(name: impl Into<String>, entry_step: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_step: entry_step.into(),
            steps: HashMap::new(),
            slots: HashMap::new(),
            declared_outputs: Vec::new(),
        }
    }

    pub fn with_step(mut self, id: impl Into<String>, step: StepDefinition) -> Self {
        self.steps.insert(id.into(), step);
        self
    }

    pub fn with_slot(mut self, name: impl Into<String>, slot: SlotDeclaration) -> Self {
        self.slots.insert(name.into(), slot);
        self
    }

    pub fn with_outputs(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.declared_outputs = names.into_iter().map(Into::into).collect();
        self
    }
}

/// A slot's declared type and whether a validator name is required to
/// accompany values stored into it. `spec.md` §3 "Slot".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDeclaration {
    pub slot_type: SlotType,
    /// Name of a [`crate::validator::Validator`] registered in the
    /// compiler's [`crate::validator::ValidatorRegistry`]. `Enum` slots are
    /// validated structurally from `slot_type` and don't need this.
    #[serde(default)]
    pub validator: Option<String>,
}

impl SlotDeclaration {
    pub fn new(slot_type: SlotType) -> Self {
        Self {
            slot_type,
            validator: None,
        }
    }

    pub fn with_validator(mut self, name: impl Into<String>) -> Self {
        self.validator = Some(name.into());
        self
    }
}

/// One step within a flow. The `kind` determines which other fields are
/// meaningful; the compiler enforces that combination (`spec.md` §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub kind: StepKind,
    /// Step executed after this one completes, if the `kind` doesn't
    /// determine its own successor (`branch`, `action` with
    /// `on_error_step`, and `end` all route differently).
    #[serde(default)]
    pub next_step: Option<String>,
}

impl StepDefinition {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            next_step: None,
        }
    }

    pub fn then(mut self, next_step: impl Into<String>) -> Self {
        self.next_step = Some(next_step.into());
        self
    }
}

/// The seven step kinds named in `spec.md` §3, plus `jump` and `while`,
/// each carrying exactly the fields that kind needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Prompt for and collect a single slot value. Suspends the turn
    /// (becomes a pending task) until the slot is filled.
    Collect {
        slot: String,
        prompt: String,
    },
    /// Emit a message with no state effect and no suspension; control
    /// passes straight to `next_step`.
    Say {
        message: String,
    },
    /// Render a templated message using the values of the named slots.
    /// If `wait_for_ack` is false, control passes straight to `next_step`
    /// without suspending; if true, the turn suspends until any reply
    /// arrives (`spec.md` §3 "Pending task" `inform`).
    Inform {
        template: String,
        #[serde(default)]
        slots: Vec<String>,
        #[serde(default)]
        wait_for_ack: bool,
    },
    /// Ask the user to confirm a yes/no proposition. Suspends as a pending
    /// task until `AffirmConfirmation` or `DenyConfirmation` arrives.
    Confirm {
        prompt: String,
        on_affirm_step: String,
        on_deny_step: String,
    },
    /// Invoke a registered action handler by name. Routes to
    /// `on_success_step` or `on_error_step` depending on the handler's
    /// result; does not suspend (handlers run to completion within the
    /// turn).
    Action {
        handler: String,
        #[serde(default)]
        input_slots: Vec<String>,
        /// Names of the handler's output keys to merge into the active
        /// instance's slot scope on success (`spec.md` §4.1 `action`'s
        /// "output_mapping"). Keys the handler returns that aren't named
        /// here are discarded.
        #[serde(default)]
        output_slots: Vec<String>,
        on_success_step: String,
        on_error_step: String,
    },
    /// Route to one of several steps based on the value of `slot`. The
    /// compiler checks `case_to_step_map` covers the slot's declared enum
    /// variants (or is exhaustive via `default_step` for non-enum slots).
    Branch {
        slot: String,
        case_to_step_map: HashMap<String, String>,
        #[serde(default)]
        default_step: Option<String>,
    },
    /// Loop back to `body_step` while `condition_slot` holds a truthy
    /// value, otherwise continue to `next_step` (via the enclosing
    /// [`StepDefinition::next_step`]).
    While {
        condition_slot: String,
        body_step: String,
    },
    /// Unconditional transfer to another step within the same flow,
    /// without consuming a turn or requiring user input.
    Jump {
        target_step: String,
    },
    /// Terminates the flow: on reaching this step the subgraph executor
    /// pops the flow from the stack (`spec.md` §4.3).
    End,
}

impl StepKind {
    /// Short tag used in logs and compiler diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            StepKind::Collect { .. } => "collect",
            StepKind::Say { .. } => "say",
            StepKind::Inform { .. } => "inform",
            StepKind::Confirm { .. } => "confirm",
            StepKind::Action { .. } => "action",
            StepKind::Branch { .. } => "branch",
            StepKind::While { .. } => "while",
            StepKind::Jump { .. } => "jump",
            StepKind::End => "end",
        }
    }

    /// Whether this step kind suspends the turn awaiting user input
    /// (becomes a [`crate::pending_task::PendingTask`]).
    pub fn suspends(&self) -> bool {
        matches!(self, StepKind::Collect { .. } | StepKind::Confirm { .. })
    }
}

/// A registered action handler's declared input shape, used only for
/// compiler cross-checks against `action` steps (the actual behavior lives
/// behind [`crate::action::ActionHandler`] at runtime).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActionSignature {
    pub name: String,
    /// Slot names the handler declares as its required inputs, checked
    /// against an `action` step's own `input_slots` at compile time
    /// (`spec.md` §4.1 "the declared input keys match the action's declared
    /// inputs"). Empty means the handler places no constraint on which
    /// slots a step may wire in.
    #[serde(default)]
    pub declared_inputs: Vec<String>,
}

impl ActionSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_inputs: Vec::new(),
        }
    }

    pub fn with_declared_inputs(
        mut self,
        inputs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.declared_inputs = inputs.into_iter().map(Into::into).collect();
        self
    }
}

/// Arbitrary key/value context an embedder attaches to a flow definition at
/// registration time — not interpreted by the core, only threaded through
/// to action handlers at invocation time.
pub type DefinitionMetadata = HashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_populate_expected_fields() {
        let flow = FlowDefinition::new("book_flight", "ask_destination")
            .with_slot("destination", SlotDeclaration::new(SlotType::String))
            .with_step(
                "ask_destination",
                StepDefinition::new(StepKind::Collect {
                    slot: "destination".into(),
                    prompt: "Where to?".into(),
                })
                .then("confirm_destination"),
            );

        assert_eq!(flow.name, "book_flight");
        assert_eq!(flow.entry_step, "ask_destination");
        assert!(flow.slots.contains_key("destination"));
        let step = &flow.steps["ask_destination"];
        assert_eq!(step.next_step.as_deref(), Some("confirm_destination"));
        assert_eq!(step.kind.tag(), "collect");
        assert!(step.kind.suspends());
    }

    #[test]
    fn step_kind_tags_are_distinct() {
        let kinds = vec![
            StepKind::Say { message: "hi".into() },
            StepKind::Inform {
                template: "t".into(),
                slots: vec![],
                wait_for_ack: false,
            },
            StepKind::End,
        ];
        let tags: Vec<_> = kinds.iter().map(StepKind::tag).collect();
        assert_eq!(tags, vec!["say", "inform", "end"]);
    }
}
