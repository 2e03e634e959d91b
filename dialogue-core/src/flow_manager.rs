//! The flow manager: the only blessed way to mutate flow structure.
//!
//! `spec.md` §4.2. Every function here is a pure query or a pure delta
//! producer — none take `&mut DialogueState`, and none are called directly
//! by the subgraph executor or orchestrator without going through
//! [`crate::state::DialogueState::apply`] afterward. Keeping mutation
//! confined to this one module is what lets the stack invariants (at most
//! one active instance, archive monotonicity, slot heap keys always a
//! subset of stack ∪ archive) be checked in one place instead of audited
//! across the whole crate.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{DialogueError, Result};
use crate::pending_task::PendingTask;
use crate::state::{DialogueState, FlowContext, FlowInstanceId, LifecycleState, StateDelta};

/// Namespace for flow-stack operations. Zero-sized; exists only to group
/// these functions under a name mirroring `spec.md`'s "Flow Manager"
/// component rather than scattering free functions through the crate root.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowManager;

impl FlowManager {
    /// Push a new flow instance onto the stack. If a flow is currently
    /// active, it is marked paused first. Seeds the new instance's slot
    /// scope with `inputs` (`spec.md` §4.2 `push_flow`).
    pub fn push_flow(
        &self,
        state: &DialogueState,
        flow_name: &str,
        inputs: HashMap<String, Value>,
    ) -> StateDelta {
        let now = Utc::now();
        let mut next_stack = state.flow_stack.clone();

        if let Some(top) = next_stack.last_mut() {
            if top.is_active() {
                top.lifecycle = LifecycleState::Paused;
                top.paused_at = Some(now);
                top.context_note = Some(format!("paused because '{flow_name}' was started"));
            }
        }

        let new_instance = FlowContext::new(flow_name, now);
        let instance_id = new_instance.instance_id;
        next_stack.push(new_instance);

        let mut slot_heap_updates = HashMap::new();
        if !inputs.is_empty() {
            slot_heap_updates.insert(instance_id, inputs);
        }

        StateDelta {
            flow_stack: Some(next_stack),
            slot_heap_updates,
            // The newly pushed instance hasn't run yet and so has no
            // pending task of its own; whatever was pending for the
            // instance beneath it is stale until the subgraph executor
            // re-derives it from that instance's own `current_step`
            // (`spec.md` §4.2 `push_flow`).
            pending_task: Some(None),
            ..StateDelta::empty()
        }
    }

    /// Pop the active flow instance, moving it to the archive with a
    /// terminal lifecycle and the given outputs. If another instance
    /// remains below, it becomes active again (`spec.md` §4.2 `pop_flow`).
    pub fn pop_flow(
        &self,
        state: &DialogueState,
        outputs: HashMap<String, Value>,
        result: TerminalState,
    ) -> Result<StateDelta> {
        if state.flow_stack.is_empty() {
            return Err(DialogueError::NoActiveFlow);
        }

        let now = Utc::now();
        let mut next_stack = state.flow_stack.clone();
        let mut popped = next_stack.pop().expect("checked non-empty above");

        popped.lifecycle = result.into();
        popped.completed_at = Some(now);
        popped.outputs = outputs;

        if let Some(revealed) = next_stack.last_mut() {
            revealed.lifecycle = LifecycleState::Active;
            revealed.paused_at = None;
        }

        Ok(StateDelta {
            flow_stack: Some(next_stack),
            archive_additions: vec![popped],
            // The revealed instance (if any) was paused before the popped
            // instance ever ran; whatever pending task is stored belongs to
            // the popped instance, not the one regaining control. The
            // subgraph executor re-derives the revealed instance's own
            // pending task from its `current_step` on the next run, same as
            // `push_flow` (`spec.md` §4.2 `pop_flow`).
            pending_task: Some(None),
            ..StateDelta::empty()
        })
    }

    /// The active flow instance, if the stack is non-empty. `spec.md`
    /// §4.2 `get_active`.
    pub fn get_active<'a>(&self, state: &'a DialogueState) -> Option<&'a FlowContext> {
        state.active_flow()
    }

    /// Read a slot's value from the active instance's scope. `spec.md`
    /// §4.2 `get_slot`.
    pub fn get_slot<'a>(&self, state: &'a DialogueState, name: &str) -> Option<&'a Value> {
        let active = self.get_active(state)?;
        state.slot_heap.get(&active.instance_id)?.get(name)
    }

    /// Read a slot's value from a specific instance's scope, regardless of
    /// whether it is currently active. Used by `CorrectSlot`, which may
    /// target the active instance directly, and by cross-flow archive
    /// lookups (`spec.md` §9 "Cross-flow data transfer").
    pub fn get_slot_for<'a>(
        &self,
        state: &'a DialogueState,
        instance_id: FlowInstanceId,
        name: &str,
    ) -> Option<&'a Value> {
        state.slot_heap.get(&instance_id)?.get(name)
    }

    /// Write a slot value under the active instance's scope. Fails with
    /// [`DialogueError::NoActiveFlow`] if the stack is empty (`spec.md`
    /// §4.2 `set_slot`).
    ///
    /// If the instance was suspended awaiting exactly this slot (a
    /// `collect` task), clears `pending_task` in the same delta. Without
    /// this, the stale `Collect` would still read as "requires input" on
    /// the very turn that fills it, and the subgraph executor would never
    /// run to advance past the step that produced it (`spec.md` §4.4
    /// `SetSlot`, §4.6 step 5's loop guard).
    pub fn set_slot(&self, state: &DialogueState, name: &str, value: Value) -> Result<StateDelta> {
        let active = self.get_active(state).ok_or(DialogueError::NoActiveFlow)?;
        let mut updates = HashMap::new();
        let mut fields = HashMap::new();
        fields.insert(name.to_string(), value);
        updates.insert(active.instance_id, fields);

        let pending_task = match &state.pending_task {
            Some(PendingTask::Collect { slot, .. }) if slot == name => Some(None),
            _ => None,
        };

        Ok(StateDelta {
            slot_heap_updates: updates,
            pending_task,
            ..StateDelta::empty()
        })
    }

    /// Rewind the active instance's `current_step` to `step_id`, without
    /// touching slot values. Used by `CorrectSlot` when the flow has
    /// already advanced past the slot being corrected (`spec.md` §4.4
    /// `CorrectSlot`).
    pub fn rewind_to_step(&self, state: &DialogueState, step_id: &str) -> Result<StateDelta> {
        let mut next_stack = state.flow_stack.clone();
        let top = next_stack.last_mut().ok_or(DialogueError::NoActiveFlow)?;
        top.current_step = Some(step_id.to_string());

        Ok(StateDelta {
            flow_stack: Some(next_stack),
            ..StateDelta::empty()
        })
    }

    /// Update the active instance's `current_step` without any other
    /// lifecycle change. Called by the subgraph executor after each
    /// routing decision.
    pub fn advance_step(&self, state: &DialogueState, step_id: &str) -> Result<StateDelta> {
        self.rewind_to_step(state, step_id)
    }
}

/// The terminal lifecycle a popped flow instance lands in. A narrower enum
/// than [`LifecycleState`] so callers of `pop_flow` can't accidentally pass
/// `Active`/`Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Completed,
    Cancelled,
    Error,
}

impl From<TerminalState> for LifecycleState {
    fn from(value: TerminalState) -> Self {
        match value {
            TerminalState::Completed => LifecycleState::Completed,
            TerminalState::Cancelled => LifecycleState::Cancelled,
            TerminalState::Error => LifecycleState::Error,
        }
    }
}

/// Generates a fresh, unique flow instance id. Exposed for callers (e.g.
/// tests) that need to seed a stack directly rather than through
/// `push_flow`.
pub fn new_instance_id() -> FlowInstanceId {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_flow_pauses_previous_active_instance() {
        let manager = FlowManager;
        let state = DialogueState::fresh();
        let delta = manager.push_flow(&state, "book_flight", HashMap::new());
        let state = state.apply(delta);

        let delta = manager.push_flow(&state, "check_balance", HashMap::new());
        let state = state.apply(delta);

        assert_eq!(state.flow_stack.len(), 2);
        assert_eq!(state.flow_stack[0].lifecycle, LifecycleState::Paused);
        assert_eq!(state.flow_stack[1].lifecycle, LifecycleState::Active);
    }

    #[test]
    fn pop_flow_reveals_paused_instance_as_active() {
        let manager = FlowManager;
        let state = DialogueState::fresh();
        let state = state.apply(manager.push_flow(&state, "book_flight", HashMap::new()));
        let state = state.apply(manager.push_flow(&state, "check_balance", HashMap::new()));

        let delta = manager
            .pop_flow(&state, HashMap::new(), TerminalState::Completed)
            .unwrap();
        let state = state.apply(delta);

        assert_eq!(state.flow_stack.len(), 1);
        assert_eq!(state.flow_stack[0].flow_name, "book_flight");
        assert_eq!(state.flow_stack[0].lifecycle, LifecycleState::Active);
        assert_eq!(state.archive.len(), 1);
        assert_eq!(state.archive[0].flow_name, "check_balance");
    }

    #[test]
    fn pop_flow_on_empty_stack_is_an_error() {
        let manager = FlowManager;
        let state = DialogueState::fresh();
        let err = manager
            .pop_flow(&state, HashMap::new(), TerminalState::Cancelled)
            .unwrap_err();
        assert!(matches!(err, DialogueError::NoActiveFlow));
    }

    #[test]
    fn set_slot_without_active_flow_errors() {
        let manager = FlowManager;
        let state = DialogueState::fresh();
        let err = manager
            .set_slot(&state, "origin", Value::String("NYC".into()))
            .unwrap_err();
        assert!(matches!(err, DialogueError::NoActiveFlow));
    }

    #[test]
    fn two_instances_of_the_same_flow_have_independent_slots() {
        let manager = FlowManager;
        let state = DialogueState::fresh();
        let state = state.apply(manager.push_flow(&state, "book_flight", HashMap::new()));
        let instance_a = state.active_flow().unwrap().instance_id;
        let state = state.apply(
            manager
                .set_slot(&state, "origin", Value::String("NYC".into()))
                .unwrap(),
        );
        let state = state.apply(
            manager
                .pop_flow(&state, HashMap::new(), TerminalState::Completed)
                .unwrap(),
        );

        let state = state.apply(manager.push_flow(&state, "book_flight", HashMap::new()));
        let instance_b = state.active_flow().unwrap().instance_id;
        assert_ne!(instance_a, instance_b);
        assert!(manager.get_slot(&state, "origin").is_none());
    }
}
