//! Compiled step representation.
//!
//! Where [`crate::definition::StepDefinition`] is the author-facing,
//! unchecked input, [`CompiledStep`] is what the compiler produces after
//! validating cross-references: slot names resolved against declared
//! slots, step targets resolved against the flow's step set, and branch
//! case coverage checked against enum variants. The subgraph executor only
//! ever looks at compiled steps — by the time a turn runs, every id it
//! dereferences is known to exist (mirrors the teacher's `NodeSpec` / `Edge`
//! split between a graph's builder-time and executable representations).

use std::collections::HashMap;

use crate::definition::StepKind;

/// A step within a [`crate::compiled::CompiledFlow`], identical in shape to
/// [`StepKind`] but produced only by the compiler, never authored directly.
#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub id: String,
    pub kind: StepKind,
    pub next_step: Option<String>,
}

impl CompiledStep {
    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    pub fn suspends(&self) -> bool {
        self.kind.suspends()
    }

    /// All step ids this step can transfer control to, used by the
    /// compiler's reachability and reference-validity passes. Does not
    /// include steps reached only indirectly through an action step's
    /// success/error routing followed by *its* `next_step` — those are
    /// already covered since `on_success_step`/`on_error_step` are
    /// themselves step ids returned here.
    pub fn successors(&self) -> Vec<&str> {
        let mut out = Vec::new();
        match &self.kind {
            StepKind::Collect { .. } | StepKind::Say { .. } | StepKind::Inform { .. } => {
                out.extend(self.next_step.as_deref());
            }
            StepKind::Confirm {
                on_affirm_step,
                on_deny_step,
                ..
            } => {
                out.push(on_affirm_step.as_str());
                out.push(on_deny_step.as_str());
            }
            StepKind::Action {
                on_success_step,
                on_error_step,
                ..
            } => {
                out.push(on_success_step.as_str());
                out.push(on_error_step.as_str());
            }
            StepKind::Branch {
                case_to_step_map,
                default_step,
                ..
            } => {
                out.extend(case_to_step_map.values().map(String::as_str));
                out.extend(default_step.as_deref());
            }
            StepKind::While { body_step, .. } => {
                out.push(body_step.as_str());
                out.extend(self.next_step.as_deref());
            }
            StepKind::Jump { target_step } => {
                out.push(target_step.as_str());
            }
            StepKind::End => {}
        }
        out
    }
}

/// Index of compiled steps by id, owned by a [`crate::compiled::CompiledFlow`].
pub type StepTable = HashMap<String, CompiledStep>;
