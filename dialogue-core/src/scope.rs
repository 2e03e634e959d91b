//! The slot/scope manager: pure queries over state plus compiled
//! definitions, used to bound what the NLU provider is told is plausible.
//! `spec.md` §4.3.

use std::collections::HashSet;

use crate::compiled::{CompiledFlow, CompiledFlowSet};
use crate::definition::StepKind;
use crate::flow_manager::FlowManager;
use crate::state::DialogueState;

/// One slot as presented to the NLU context builder: its name and whether
/// the active instance already has a value for it (`spec.md` §6
/// `in_scope_slots : list of (name, type, is_filled)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedSlot {
    pub name: String,
    pub is_filled: bool,
}

/// Commands that are always plausible regardless of which flow (if any) is
/// active — the "conversation-pattern" actions of `spec.md` §4.3.
pub const ALWAYS_IN_SCOPE_ACTIONS: &[&str] = &["start_flow", "cancel_flow", "clarify", "handoff"];

/// Namespace for scope queries, mirroring [`FlowManager`]'s zero-sized
/// grouping style.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeManager;

impl ScopeManager {
    /// The declared slot set of the active flow, each annotated with
    /// whether the active instance already holds a value for it. Empty if
    /// no flow is active.
    pub fn in_scope_slots(
        &self,
        state: &DialogueState,
        compiled_flows: &CompiledFlowSet,
    ) -> Vec<ScopedSlot> {
        let Some(active) = FlowManager.get_active(state) else {
            return Vec::new();
        };
        let Some(compiled) = compiled_flows.get(&active.flow_name) else {
            return Vec::new();
        };
        let filled = state.slot_heap.get(&active.instance_id);

        compiled
            .slots
            .keys()
            .map(|name| ScopedSlot {
                name: name.clone(),
                is_filled: filled.map(|slots| slots.contains_key(name)).unwrap_or(false),
            })
            .collect()
    }

    /// The set of action handler names plausible in the active flow's
    /// current context: every `action` step's handler referenced anywhere
    /// in the compiled flow, plus the always-in-scope conversation-pattern
    /// actions.
    pub fn in_scope_actions(
        &self,
        state: &DialogueState,
        compiled_flows: &CompiledFlowSet,
    ) -> Vec<String> {
        let mut actions: HashSet<String> = ALWAYS_IN_SCOPE_ACTIONS
            .iter()
            .map(|s| s.to_string())
            .collect();

        if let Some(active) = FlowManager.get_active(state) {
            if let Some(compiled) = compiled_flows.get(&active.flow_name) {
                collect_action_handlers(&compiled, &mut actions);
            }
        }

        let mut actions: Vec<String> = actions.into_iter().collect();
        actions.sort_unstable();
        actions
    }
}

fn collect_action_handlers(compiled: &CompiledFlow, into: &mut HashSet<String>) {
    for step in compiled.steps.values() {
        if let StepKind::Action { handler, .. } = &step.kind {
            into.insert(handler.clone());
        }
    }
}
