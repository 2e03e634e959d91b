//! Slot types and value validators.
//!
//! A declared slot has a [`SlotType`] and is checked at store time by a
//! [`Validator`] — the same "trait object behind a registry name" shape the
//! teacher uses for its state [`Reducer`](crate) family (overwrite, append,
//! merge, sum): a small set of built-ins cover the common cases, and
//! embedders can register their own for domain-specific types (structured
//! slots, anything past `spec.md`'s closed list).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The declared type of a slot, per `spec.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    String,
    Number,
    Boolean,
    /// Enum slots carry their closed set of valid values so the compiler can
    /// check `branch` `case_to_step_map` coverage against it (`spec.md`
    /// §4.1).
    Enum(Vec<String>),
    Date,
    /// Arbitrary structured data, validated only by a registered custom
    /// validator — the core has no opinion on its internal shape.
    Structured,
}

/// Result of validating a candidate slot value.
pub type ValidationResult = Result<Value, String>;

/// A named check applied to a candidate slot value before it is stored.
///
/// Like [`crate::state::Reducer`] in spirit: a small trait with a `name()`
/// for registry lookup and diagnostics, and a single entry point that
/// either normalizes-and-accepts or rejects with a reason a reprompt
/// message can quote.
pub trait Validator: Send + Sync {
    /// Validate (and possibly normalize) a candidate value. `Ok` carries the
    /// value to actually store — validators may coerce, e.g. parsing a
    /// numeric string into a JSON number.
    fn validate(&self, candidate: &Value) -> ValidationResult;

    /// Human-readable name, used in compiler diagnostics and the validator
    /// registry.
    fn name(&self) -> &str;

    /// The [`SlotType`] this validator is meant to drive. Checked against a
    /// slot's declared type at compile time so a slot can never be wired to
    /// a validator built for a different kind of value (`spec.md` §4.1
    /// "declared slot types match their validator's expected type").
    fn accepted_type(&self) -> SlotType;
}

/// Accepts any JSON string, rejecting only non-string values.
#[derive(Debug, Clone, Default)]
pub struct StringValidator;

impl Validator for StringValidator {
    fn validate(&self, candidate: &Value) -> ValidationResult {
        match candidate {
            Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(format!("expected a string, got {other}")),
        }
    }

    fn name(&self) -> &str {
        "string"
    }

    fn accepted_type(&self) -> SlotType {
        SlotType::String
    }
}

/// Accepts JSON numbers, or numeric strings which are coerced to numbers.
#[derive(Debug, Clone, Default)]
pub struct NumberValidator;

impl Validator for NumberValidator {
    fn validate(&self, candidate: &Value) -> ValidationResult {
        match candidate {
            Value::Number(_) => Ok(candidate.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{s}' is not a number")),
            other => Err(format!("expected a number, got {other}")),
        }
    }

    fn name(&self) -> &str {
        "number"
    }

    fn accepted_type(&self) -> SlotType {
        SlotType::Number
    }
}

/// Like [`NumberValidator`] but additionally requires a positive integer —
/// grounded on the `amount` / `positive_integer` validator named in
/// `spec.md` §8 scenario 5.
#[derive(Debug, Clone, Default)]
pub struct PositiveIntegerValidator;

impl Validator for PositiveIntegerValidator {
    fn validate(&self, candidate: &Value) -> ValidationResult {
        let as_str;
        let numeric_str: &str = match candidate {
            Value::String(s) => s.trim(),
            Value::Number(n) => {
                as_str = n.to_string();
                as_str.as_str()
            }
            other => return Err(format!("expected a positive integer, got {other}")),
        };
        match numeric_str.parse::<i64>() {
            Ok(n) if n > 0 => Ok(Value::Number(n.into())),
            Ok(n) => Err(format!("{n} is not positive")),
            Err(_) => Err(format!("'{numeric_str}' is not an integer")),
        }
    }

    fn name(&self) -> &str {
        "positive_integer"
    }

    fn accepted_type(&self) -> SlotType {
        SlotType::Number
    }
}

/// Accepts JSON booleans, or the strings "true"/"false" (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct BooleanValidator;

impl Validator for BooleanValidator {
    fn validate(&self, candidate: &Value) -> ValidationResult {
        match candidate {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("'{s}' is not true/false")),
            },
            other => Err(format!("expected a boolean, got {other}")),
        }
    }

    fn name(&self) -> &str {
        "boolean"
    }

    fn accepted_type(&self) -> SlotType {
        SlotType::Boolean
    }
}

/// Accepts a value only if it is a string within a fixed set of variants.
#[derive(Debug, Clone)]
pub struct EnumValidator {
    variants: Vec<String>,
}

impl EnumValidator {
    pub fn new(variants: Vec<String>) -> Self {
        Self { variants }
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }
}

impl Validator for EnumValidator {
    fn validate(&self, candidate: &Value) -> ValidationResult {
        match candidate {
            Value::String(s) if self.variants.iter().any(|v| v == s) => {
                Ok(Value::String(s.clone()))
            }
            Value::String(s) => Err(format!(
                "'{s}' is not one of {}",
                self.variants.join(", ")
            )),
            other => Err(format!("expected one of {}, got {other}", self.variants.join(", "))),
        }
    }

    fn name(&self) -> &str {
        "enum"
    }

    fn accepted_type(&self) -> SlotType {
        SlotType::Enum(self.variants.clone())
    }
}

/// Accepts an ISO-8601 `YYYY-MM-DD` date string. Kept deliberately simple —
/// richer date parsing (relative dates, locales) belongs to the NLU
/// provider, which is expected to normalize before emitting `SetSlot`.
#[derive(Debug, Clone, Default)]
pub struct DateValidator;

impl Validator for DateValidator {
    fn validate(&self, candidate: &Value) -> ValidationResult {
        let s = candidate
            .as_str()
            .ok_or_else(|| format!("expected a date string, got {candidate}"))?;
        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(|_| Value::String(s.to_string()))
            .map_err(|_| format!("'{s}' is not a YYYY-MM-DD date"))
    }

    fn name(&self) -> &str {
        "date"
    }

    fn accepted_type(&self) -> SlotType {
        SlotType::Date
    }
}

/// Registry of named validators, looked up by name from a flow's `collect`
/// step declaration. The compiler checks at compile time that every
/// `collect` references a name present here (`spec.md` §4.1).
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn Validator>>,
}

impl ValidatorRegistry {
    /// An empty registry with no validators registered.
    pub fn new() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    /// A registry pre-populated with the built-in validators this module
    /// provides: `string`, `number`, `positive_integer`, `boolean`, `date`.
    /// Enum validators are registered per-slot by the compiler since they
    /// carry slot-specific variants, not by name here.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(StringValidator);
        registry.register(NumberValidator);
        registry.register(PositiveIntegerValidator);
        registry.register(BooleanValidator);
        registry.register(DateValidator);
        registry
    }

    pub fn register<V: Validator + 'static>(&mut self, validator: V) {
        self.validators
            .insert(validator.name().to_string(), Arc::new(validator));
    }

    pub fn register_arc(&mut self, name: impl Into<String>, validator: Arc<dyn Validator>) {
        self.validators.insert(name.into(), validator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Validator>> {
        self.validators.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }
}

/// Validate a candidate slot value against its declaration, the way
/// `SetSlot`/`CorrectSlot` handlers do before ever touching state (`spec.md`
/// §4.4, §7 `invalid_slot_value`).
///
/// `Enum` slots are checked structurally against their own declared
/// variants rather than through the registry, since an enum's valid set is
/// per-slot, not a named, shareable validator.
pub fn validate_slot_value(
    slot_type: &SlotType,
    validator_name: Option<&str>,
    registry: &ValidatorRegistry,
    candidate: &Value,
) -> ValidationResult {
    if let SlotType::Enum(variants) = slot_type {
        return EnumValidator::new(variants.clone()).validate(candidate);
    }
    match validator_name {
        Some(name) => {
            let validator = registry
                .get(name)
                .ok_or_else(|| format!("no validator registered for '{name}'"))?;
            validator.validate(candidate)
        }
        None => Ok(candidate.clone()),
    }
}

#[cfg(test)]
mod validate_slot_value_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enum_slot_validates_structurally_without_a_named_validator() {
        let registry = ValidatorRegistry::with_builtins();
        let slot_type = SlotType::Enum(vec!["NYC".into(), "LAX".into()]);
        assert!(validate_slot_value(&slot_type, None, &registry, &json!("NYC")).is_ok());
        assert!(validate_slot_value(&slot_type, None, &registry, &json!("SFO")).is_err());
    }

    #[test]
    fn string_slot_with_no_validator_passes_through() {
        let registry = ValidatorRegistry::with_builtins();
        let result = validate_slot_value(&SlotType::String, None, &registry, &json!("anything"));
        assert_eq!(result.unwrap(), json!("anything"));
    }

    #[test]
    fn named_validator_is_applied() {
        let registry = ValidatorRegistry::with_builtins();
        let result = validate_slot_value(
            &SlotType::Number,
            Some("positive_integer"),
            &registry,
            &json!("-5"),
        );
        assert!(result.is_err());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn positive_integer_rejects_negative() {
        let v = PositiveIntegerValidator;
        assert!(v.validate(&json!("-5")).is_err());
    }

    #[test]
    fn positive_integer_accepts_positive_string() {
        let v = PositiveIntegerValidator;
        assert_eq!(v.validate(&json!("42")).unwrap(), json!(42));
    }

    #[test]
    fn enum_validator_rejects_out_of_set() {
        let v = EnumValidator::new(vec!["NYC".into(), "LAX".into()]);
        assert!(v.validate(&json!("SFO")).is_err());
        assert!(v.validate(&json!("NYC")).is_ok());
    }

    #[test]
    fn builtins_registry_has_expected_names() {
        let registry = ValidatorRegistry::with_builtins();
        for name in ["string", "number", "positive_integer", "boolean", "date"] {
            assert!(registry.contains(name), "missing validator: {name}");
        }
    }
}

#[cfg(test)]
mod positive_integer_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every positive `i64`, round-tripped through its decimal string
        /// form, validates deterministically to the same number.
        #[test]
        fn positive_integers_always_validate_to_themselves(n in 1i64..=i64::MAX) {
            let v = PositiveIntegerValidator;
            let as_string = Value::String(n.to_string());
            prop_assert_eq!(v.validate(&as_string), Ok(Value::Number(n.into())));
            let as_number = Value::Number(n.into());
            prop_assert_eq!(v.validate(&as_number), Ok(Value::Number(n.into())));
        }

        /// Every non-positive `i64` is rejected deterministically, never
        /// coerced into a stored value.
        #[test]
        fn non_positive_integers_are_always_rejected(n in i64::MIN..=0i64) {
            let v = PositiveIntegerValidator;
            prop_assert!(v.validate(&Value::String(n.to_string())).is_err());
            prop_assert!(v.validate(&Value::Number(n.into())).is_err());
        }

        /// Any string containing a non-ASCII-digit, non-sign byte never
        /// parses as an integer, so it is always rejected — validation never
        /// panics on arbitrary input.
        #[test]
        fn arbitrary_non_numeric_strings_are_rejected(s in "[a-zA-Z ]{1,16}") {
            let v = PositiveIntegerValidator;
            prop_assert!(v.validate(&Value::String(s)).is_err());
        }
    }
}
