//! The compiled form of a flow: the executable artifact produced once, at
//! startup, by [`crate::compiler::FlowCompiler`] and then shared (behind an
//! `Arc`) across every turn for every user for the lifetime of the process.
//!
//! Mirrors the teacher's split between `StateGraph` (builder) and
//! `CompiledGraph` (executable): a [`CompiledFlow`] never changes after
//! construction, so the executor can index into it without revalidating
//! anything a turn could plausibly violate.

use std::collections::HashMap;
use std::sync::Arc;

use crate::definition::SlotDeclaration;
use crate::step::{CompiledStep, StepTable};

/// One compiled, validated flow ready for execution.
#[derive(Debug, Clone)]
pub struct CompiledFlow {
    pub name: Arc<str>,
    pub entry_step: Arc<str>,
    pub steps: Arc<StepTable>,
    pub slots: Arc<HashMap<String, SlotDeclaration>>,
    /// Slot names copied into [`crate::state::FlowContext::outputs`] when
    /// this flow reaches an `end` step.
    pub declared_outputs: Arc<Vec<String>>,
}

impl CompiledFlow {
    pub fn step(&self, id: &str) -> Option<&CompiledStep> {
        self.steps.get(id)
    }

    pub fn entry(&self) -> &CompiledStep {
        self.steps
            .get(self.entry_step.as_ref())
            .expect("compiler guarantees entry_step resolves to a step")
    }

    pub fn slot(&self, name: &str) -> Option<&SlotDeclaration> {
        self.slots.get(name)
    }

    /// The id of the `collect` step that fills `slot`, if this flow has one.
    /// Used by `CorrectSlot` to rewind the active instance back to the
    /// collection point for a slot the user just corrected (`spec.md` §4.4
    /// `CorrectSlot`).
    pub fn collect_step_for_slot(&self, slot: &str) -> Option<&str> {
        self.steps.values().find_map(|step| match &step.kind {
            crate::definition::StepKind::Collect { slot: s, .. } if s == slot => {
                Some(step.id.as_str())
            }
            _ => None,
        })
    }
}

/// The full set of compiled flows an [`crate::orchestrator::Orchestrator`]
/// can start, keyed by flow name. Produced once by
/// [`crate::compiler::FlowCompiler::compile`] and shared read-only
/// thereafter.
#[derive(Debug, Clone, Default)]
pub struct CompiledFlowSet {
    flows: HashMap<String, Arc<CompiledFlow>>,
}

impl CompiledFlowSet {
    pub fn new() -> Self {
        Self {
            flows: HashMap::new(),
        }
    }

    pub fn insert(&mut self, flow: CompiledFlow) {
        self.flows.insert(flow.name.to_string(), Arc::new(flow));
    }

    pub fn get(&self, name: &str) -> Option<Arc<CompiledFlow>> {
        self.flows.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flows.contains_key(name)
    }

    pub fn flow_names(&self) -> impl Iterator<Item = &str> {
        self.flows.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
