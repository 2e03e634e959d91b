//! The dialogue state record and the delta type used to evolve it.
//!
//! `spec.md` §3 is explicit that dialogue state is "a plain record with no
//! hidden behavior: any operation on it is a pure function producing a
//! delta." This module holds both halves of that contract: [`DialogueState`]
//! itself, and [`StateDelta`], the only sanctioned way to describe a change
//! to it. Every handler in [`crate::command`] and every operation in
//! [`crate::flow_manager`] returns a `StateDelta`; only
//! [`DialogueState::apply`] turns one into a new state, and it never mutates
//! its receiver in place — callers decide whether to keep the old state or
//! move to the new one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::pending_task::PendingTask;

/// Stable identifier for one flow instance, assigned at push time and
/// retained through archiving. Slot heap entries are always keyed by this,
/// never by flow name, which is what gives two concurrent instances of the
/// same flow independent slot storage (`spec.md` §3, §8 "flow-scoped slot
/// isolation").
pub type FlowInstanceId = Uuid;

/// One message in the conversation history, stored with a stable id so
/// transcripts can be referenced (e.g. by a future correction) without
/// positional indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Lifecycle state of a [`FlowContext`]. `spec.md` §3 "Flow instance".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Paused,
    Completed,
    Cancelled,
    Error,
    Abandoned,
}

/// One entry on the flow stack (while active/paused) or in the archive
/// (once terminal). `spec.md` §3 "Flow instance (FlowContext)".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowContext {
    pub instance_id: FlowInstanceId,
    pub flow_name: String,
    pub lifecycle: LifecycleState,
    /// The step the subgraph executor is currently positioned at, or
    /// `None` before the flow has taken its first step.
    pub current_step: Option<String>,
    pub outputs: HashMap<String, Value>,
    pub started_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-form debugging note, e.g. "paused because user started
    /// check_balance".
    pub context_note: Option<String>,
}

impl FlowContext {
    pub fn new(flow_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            flow_name: flow_name.into(),
            lifecycle: LifecycleState::Active,
            current_step: None,
            outputs: HashMap::new(),
            started_at: now,
            paused_at: None,
            completed_at: None,
            context_note: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == LifecycleState::Active
    }
}

/// One recorded command execution, kept in the append-only command log for
/// audit and for `spec.md` §8's "command log completeness" property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub id: Uuid,
    pub command_kind: String,
    pub outcome: CommandOutcome,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Success,
    Skipped,
    Error,
}

/// Turn-level bookkeeping that isn't part of the conversational content
/// proper: the turn counter, the last error kind observed (for operator
/// diagnostics), and pruning markers. `spec.md` §3 "metadata".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StateMetadata {
    pub turn_counter: u64,
    pub last_error: Option<String>,
}

/// The per-conversation record persisted across turns. `spec.md` §3
/// "Dialogue state".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DialogueState {
    pub messages: Vec<Message>,
    pub flow_stack: Vec<FlowContext>,
    /// Slot values, keyed first by owning flow instance, then by slot
    /// name. No global namespace — see [`FlowInstanceId`].
    pub slot_heap: HashMap<FlowInstanceId, HashMap<String, Value>>,
    pub archive: Vec<FlowContext>,
    pub command_log: Vec<CommandLogEntry>,
    pub pending_task: Option<PendingTask>,
    pub metadata: StateMetadata,
}

impl DialogueState {
    /// A freshly initialized state: empty stack, empty heap, counters at
    /// zero. Returned by the checkpoint engine on a cache miss (`spec.md`
    /// §4.7).
    pub fn fresh() -> Self {
        Self::default()
    }

    pub fn active_flow(&self) -> Option<&FlowContext> {
        self.flow_stack.last().filter(|f| f.is_active())
    }

    pub fn active_flow_mut(&mut self) -> Option<&mut FlowContext> {
        if self.flow_stack.last().map(|f| f.is_active()).unwrap_or(false) {
            self.flow_stack.last_mut()
        } else {
            None
        }
    }

    pub fn is_idle(&self) -> bool {
        self.flow_stack.is_empty()
    }

    /// Apply a delta, producing a new state. Never mutates `self` — the
    /// caller is always the one deciding whether the old state is still
    /// reachable, which keeps every handler honest about not touching its
    /// input (`spec.md` §4.2, §9 "no handler mutates its input").
    pub fn apply(&self, delta: StateDelta) -> DialogueState {
        let mut next = self.clone();

        if let Some(new_stack) = delta.flow_stack {
            next.flow_stack = new_stack;
        }
        for (instance_id, updates) in delta.slot_heap_updates {
            next.slot_heap.entry(instance_id).or_default().extend(updates);
        }
        next.archive.extend(delta.archive_additions);
        next.messages.extend(delta.messages);
        next.command_log.extend(delta.command_log_additions);
        if let Some(pending) = delta.pending_task {
            next.pending_task = pending;
        }
        if delta.increment_turn_counter {
            next.metadata.turn_counter += 1;
        }
        if let Some(err) = delta.last_error {
            next.metadata.last_error = Some(err);
        }

        next
    }

    /// Drop the oldest entries in messages, command log, and archive past
    /// `caps`. Run only at save time, never at load (`spec.md` §4.7).
    pub fn prune(&mut self, caps: &PruningCaps) {
        prune_back(&mut self.messages, caps.max_messages);
        prune_back(&mut self.command_log, caps.max_command_log_entries);
        prune_back(&mut self.archive, caps.max_archive_entries);
    }
}

fn prune_back<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let drop_count = items.len() - cap;
        items.drain(0..drop_count);
    }
}

/// Caps applied during [`DialogueState::prune`]. Defaults mirror
/// `spec.md` §3's "most recent N" guidance without pinning a specific N in
/// the data model itself — see [`crate::config::EngineConfig`] for the
/// values actually wired in at runtime.
#[derive(Debug, Clone, Copy)]
pub struct PruningCaps {
    pub max_messages: usize,
    pub max_command_log_entries: usize,
    pub max_archive_entries: usize,
}

impl Default for PruningCaps {
    fn default() -> Self {
        Self {
            max_messages: 200,
            max_command_log_entries: 200,
            max_archive_entries: 100,
        }
    }
}

/// An immutable description of a change to [`DialogueState`]. Every field
/// defaults to "no change"; handlers populate only what they touch.
/// `spec.md` §4.2 "Every operation returns a delta".
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    /// `Some` replaces the whole flow stack. Flow-stack operations
    /// (push/pop) always compute the full next stack rather than
    /// expressing it as a smaller patch, since push/pop change adjacent
    /// entries' lifecycle too (`spec.md` §4.2 invariants).
    pub flow_stack: Option<Vec<FlowContext>>,
    pub slot_heap_updates: HashMap<FlowInstanceId, HashMap<String, Value>>,
    pub archive_additions: Vec<FlowContext>,
    pub messages: Vec<Message>,
    pub command_log_additions: Vec<CommandLogEntry>,
    /// `Some(None)` clears the pending task; `Some(Some(_))` sets one;
    /// `None` leaves it untouched.
    pub pending_task: Option<Option<PendingTask>>,
    pub increment_turn_counter: bool,
    pub last_error: Option<String>,
}

impl StateDelta {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_command_log(mut self, entry: CommandLogEntry) -> Self {
        self.command_log_additions.push(entry);
        self
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Merge `other` after `self`, left-biased on conflicting
    /// `pending_task`/`flow_stack` replacements (the later delta wins).
    /// Used by the command executor to fold several commands' deltas into
    /// one accumulated view within a turn (`spec.md` §4.4).
    pub fn then(mut self, other: StateDelta) -> StateDelta {
        if other.flow_stack.is_some() {
            self.flow_stack = other.flow_stack;
        }
        for (id, updates) in other.slot_heap_updates {
            self.slot_heap_updates.entry(id).or_default().extend(updates);
        }
        self.archive_additions.extend(other.archive_additions);
        self.messages.extend(other.messages);
        self.command_log_additions.extend(other.command_log_additions);
        if other.pending_task.is_some() {
            self.pending_task = other.pending_task;
        }
        self.increment_turn_counter = self.increment_turn_counter || other.increment_turn_counter;
        if other.last_error.is_some() {
            self.last_error = other.last_error;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_extends_rather_than_replaces_archive() {
        let state = DialogueState::fresh();
        let ctx = FlowContext::new("book_flight", Utc::now());
        let delta = StateDelta {
            archive_additions: vec![ctx],
            ..StateDelta::empty()
        };
        let next = state.apply(delta);
        assert_eq!(next.archive.len(), 1);
        assert!(state.archive.is_empty(), "apply must not mutate the receiver");
    }

    #[test]
    fn slot_heap_updates_merge_per_instance() {
        let state = DialogueState::fresh();
        let instance_id = Uuid::new_v4();
        let mut first = HashMap::new();
        first.insert("origin".to_string(), Value::String("NYC".into()));
        let mut updates = HashMap::new();
        updates.insert(instance_id, first);

        let state = state.apply(StateDelta {
            slot_heap_updates: updates,
            ..StateDelta::empty()
        });

        let mut second = HashMap::new();
        second.insert("destination".to_string(), Value::String("LAX".into()));
        let mut updates2 = HashMap::new();
        updates2.insert(instance_id, second);

        let state = state.apply(StateDelta {
            slot_heap_updates: updates2,
            ..StateDelta::empty()
        });

        let slots = &state.slot_heap[&instance_id];
        assert_eq!(slots["origin"], Value::String("NYC".into()));
        assert_eq!(slots["destination"], Value::String("LAX".into()));
    }

    #[test]
    fn pruning_drops_oldest_entries_past_cap() {
        let mut state = DialogueState::fresh();
        for i in 0..5 {
            state.messages.push(Message {
                id: Uuid::new_v4(),
                role: MessageRole::User,
                text: format!("msg {i}"),
                at: Utc::now(),
            });
        }
        state.prune(&PruningCaps {
            max_messages: 2,
            max_command_log_entries: 10,
            max_archive_entries: 10,
        });
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].text, "msg 3");
        assert_eq!(state.messages[1].text, "msg 4");
    }

    #[test]
    fn delta_then_later_pending_task_wins() {
        let a = StateDelta {
            pending_task: Some(None),
            ..StateDelta::empty()
        };
        let b = StateDelta::empty();
        let merged = a.then(b);
        assert_eq!(merged.pending_task, Some(None));
    }
}
