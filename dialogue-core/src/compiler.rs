//! Validates a set of [`FlowDefinition`]s and produces a
//! [`CompiledFlowSet`].
//!
//! Compilation runs once, at startup, and is the only place
//! [`DialogueError::FlowDefinition`] is ever produced — by the time a
//! [`CompiledFlowSet`] exists, every step reference, slot reference, and
//! branch case has already been checked, and the executor trusts that
//! without re-checking on every turn (`spec.md` §4.1).

use std::collections::HashMap;

use crate::compiled::{CompiledFlow, CompiledFlowSet};
use crate::definition::{ActionSignature, FlowDefinition, StepKind};
use crate::error::{DialogueError, Result};
use crate::step::CompiledStep;
use crate::validator::ValidatorRegistry;

/// Compiles flow definitions into an executable [`CompiledFlowSet`].
///
/// Construct with the validator registry and the action signatures known at
/// startup, then call [`FlowCompiler::compile`] once. A `FlowCompiler` is
/// not retained after compilation — it exists only to carry the
/// cross-checking context.
pub struct FlowCompiler<'a> {
    validators: &'a ValidatorRegistry,
    known_actions: &'a [ActionSignature],
}

impl<'a> FlowCompiler<'a> {
    pub fn new(validators: &'a ValidatorRegistry, known_actions: &'a [ActionSignature]) -> Self {
        Self {
            validators,
            known_actions,
        }
    }

    /// Validate and compile every definition in `definitions`. Fails fast
    /// on the first invalid flow, naming the flow and (where applicable)
    /// the offending step, so a misconfigured deployment fails loudly at
    /// startup rather than surfacing as a confusing runtime error mid-turn.
    pub fn compile(&self, definitions: Vec<FlowDefinition>) -> Result<CompiledFlowSet> {
        let flow_names: Vec<String> = definitions.iter().map(|d| d.name.clone()).collect();
        let mut set = CompiledFlowSet::new();
        for definition in definitions {
            let compiled = self.compile_one(&definition, &flow_names)?;
            set.insert(compiled);
        }
        Ok(set)
    }

    fn compile_one(&self, def: &FlowDefinition, all_flow_names: &[String]) -> Result<CompiledFlow> {
        let err = |step: Option<&str>, reason: String| DialogueError::FlowDefinition {
            flow: def.name.clone(),
            step: step.map(str::to_string),
            reason,
        };

        if def.steps.is_empty() {
            return Err(err(None, "flow has no steps".to_string()));
        }
        if !def.steps.contains_key(&def.entry_step) {
            return Err(err(
                None,
                format!("entry_step '{}' is not a declared step", def.entry_step),
            ));
        }

        for (step_id, step_def) in &def.steps {
            self.validate_step(def, step_id, &step_def.kind, all_flow_names)
                .map_err(|reason| err(Some(step_id), reason))?;

            if let Some(next) = &step_def.next_step {
                if !def.steps.contains_key(next) {
                    return Err(err(
                        Some(step_id),
                        format!("next_step '{next}' is not a declared step"),
                    ));
                }
            } else if requires_next_step(&step_def.kind) {
                return Err(err(
                    Some(step_id),
                    format!(
                        "step kind '{}' has no next_step to route to once it's done",
                        step_def.kind.tag()
                    ),
                ));
            }
        }

        for name in &def.declared_outputs {
            if !def.slots.contains_key(name) {
                return Err(err(
                    None,
                    format!("declared output '{name}' references undeclared slot"),
                ));
            }
        }

        let mut steps = HashMap::new();
        for (step_id, step_def) in &def.steps {
            steps.insert(
                step_id.clone(),
                CompiledStep {
                    id: step_id.clone(),
                    kind: step_def.kind.clone(),
                    next_step: step_def.next_step.clone(),
                },
            );
        }

        Ok(CompiledFlow {
            name: def.name.as_str().into(),
            entry_step: def.entry_step.as_str().into(),
            steps: steps.into(),
            slots: def.slots.clone().into(),
            declared_outputs: def.declared_outputs.clone().into(),
        })
    }

    /// Cross-check a single step's references: slot names against declared
    /// slots (and their validators), step targets against the flow's own
    /// step set, action handlers against the known registry, and branch
    /// case coverage against the slot's enum variants where applicable.
    fn validate_step(
        &self,
        def: &FlowDefinition,
        step_id: &str,
        kind: &StepKind,
        all_flow_names: &[String],
    ) -> std::result::Result<(), String> {
        let check_step_ref = |target: &str| -> std::result::Result<(), String> {
            if def.steps.contains_key(target) {
                Ok(())
            } else {
                Err(format!("references undeclared step '{target}'"))
            }
        };
        let check_slot_ref = |slot: &str| -> std::result::Result<(), String> {
            if def.slots.contains_key(slot) {
                Ok(())
            } else {
                Err(format!("references undeclared slot '{slot}'"))
            }
        };

        match kind {
            StepKind::Collect { slot, .. } => {
                check_slot_ref(slot)?;
                let declaration = &def.slots[slot];
                if let Some(validator_name) = &declaration.validator {
                    let validator = self.validators.get(validator_name).ok_or_else(|| {
                        format!("slot '{slot}' references unknown validator '{validator_name}'")
                    })?;
                    if validator.accepted_type() != declaration.slot_type {
                        return Err(format!(
                            "slot '{slot}' is declared as {:?} but validator '{validator_name}' expects {:?}",
                            declaration.slot_type,
                            validator.accepted_type()
                        ));
                    }
                }
                Ok(())
            }
            StepKind::Say { .. } => Ok(()),
            StepKind::Inform { slots, .. } => {
                for slot in slots {
                    check_slot_ref(slot)?;
                }
                Ok(())
            }
            StepKind::Confirm {
                on_affirm_step,
                on_deny_step,
                ..
            } => {
                check_step_ref(on_affirm_step)?;
                check_step_ref(on_deny_step)
            }
            StepKind::Action {
                handler,
                input_slots,
                output_slots,
                on_success_step,
                on_error_step,
            } => {
                let signature = self
                    .known_actions
                    .iter()
                    .find(|a| &a.name == handler)
                    .ok_or_else(|| format!("action step references unknown handler '{handler}'"))?;
                for slot in input_slots {
                    check_slot_ref(slot)?;
                }
                for slot in output_slots {
                    check_slot_ref(slot)?;
                }
                if !signature.declared_inputs.is_empty() {
                    let mut declared: Vec<&str> =
                        signature.declared_inputs.iter().map(String::as_str).collect();
                    let mut given: Vec<&str> = input_slots.iter().map(String::as_str).collect();
                    declared.sort_unstable();
                    given.sort_unstable();
                    if declared != given {
                        return Err(format!(
                            "action '{handler}' declares inputs {:?} but step '{step_id}' provides {:?}",
                            signature.declared_inputs, input_slots
                        ));
                    }
                }
                check_step_ref(on_success_step)?;
                check_step_ref(on_error_step)
            }
            StepKind::Branch {
                slot,
                case_to_step_map,
                default_step,
            } => {
                check_slot_ref(slot)?;
                for target in case_to_step_map.values() {
                    check_step_ref(target)?;
                }
                if let Some(target) = default_step {
                    check_step_ref(target)?;
                }
                let declaration = &def.slots[slot];
                if let crate::validator::SlotType::Enum(variants) = &declaration.slot_type {
                    let uncovered: Vec<&String> = variants
                        .iter()
                        .filter(|v| !case_to_step_map.contains_key(v.as_str()))
                        .collect();
                    if !uncovered.is_empty() && default_step.is_none() {
                        return Err(format!(
                            "branch on enum slot '{slot}' does not cover variants {:?} and has no default_step",
                            uncovered
                        ));
                    }
                }
                if case_to_step_map.is_empty() && default_step.is_none() {
                    return Err(format!(
                        "branch on '{step_id}' has no cases and no default_step",
                    ));
                }
                Ok(())
            }
            StepKind::While {
                condition_slot,
                body_step,
            } => {
                check_slot_ref(condition_slot)?;
                check_step_ref(body_step)
            }
            StepKind::Jump { target_step } => check_step_ref(target_step),
            StepKind::End => Ok(()),
        }
        .map_err(|reason| {
            // Surface the flow's own name list only for diagnosability when a
            // step accidentally names another flow instead of a step id.
            if all_flow_names.iter().any(|f| reason.contains(f.as_str())) {
                format!("{reason} (did you mean to reference a flow, not a step?)")
            } else {
                reason
            }
        })
    }
}

/// Whether a step kind routes to `next_step` on its own "done" path and
/// therefore must declare one at compile time. `Confirm`, `Action`, and
/// `Branch` carry their own explicit routing targets; `Jump` and `End`
/// don't continue at all.
fn requires_next_step(kind: &StepKind) -> bool {
    matches!(
        kind,
        StepKind::Collect { .. } | StepKind::Say { .. } | StepKind::Inform { .. } | StepKind::While { .. }
    )
}
