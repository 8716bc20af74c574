//! Workflow document model.
//!
//! A [`WorkflowDoc`] is the validated, immutable plan produced by the
//! planner: an ordered list of steps plus a description of the expected
//! final output. Step parameters referencing prior step outputs are tagged
//! as [`ParamValue::Reference`] at parse time instead of being sniffed as
//! `$`-prefixed strings at call time.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Sentinel prefix marking a string parameter as a step-output reference.
pub const REFERENCE_MARKER: char = '$';

/// A step parameter: either a literal value passed through untouched, or a
/// reference to the output of a previously completed step.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Literal(Value),
    Reference(String),
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) if s.starts_with(REFERENCE_MARKER) => {
                ParamValue::Reference(s[1..].to_string())
            }
            other => ParamValue::Literal(other),
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Literal(value) => value.serialize(serializer),
            ParamValue::Reference(step_id) => {
                format!("{REFERENCE_MARKER}{step_id}").serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Value::deserialize(deserializer)?.into())
    }
}

/// One planned invocation of `tool.action`.
///
/// `depends_on` is advisory metadata; actual ordering is always the declared
/// sequence order of the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default)]
    pub id: String,
    pub tool: String,
    pub action: String,
    #[serde(default)]
    pub params: HashMap<String, ParamValue>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default = "default_retry_on_error")]
    pub retry_on_error: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds", alias = "timeout")]
    pub timeout_seconds: u64,
}

fn default_retry_on_error() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDoc {
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub expected_output: String,
}

impl WorkflowDoc {
    /// Assign `step_<ordinal>` (1-based) to any step that came without an id.
    pub fn normalize_ids(&mut self) {
        for (idx, step) in self.steps.iter_mut().enumerate() {
            if step.id.is_empty() {
                step.id = format!("step_{}", idx + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_defaults_apply() {
        let step: StepSpec =
            serde_json::from_value(json!({"tool": "betfair", "action": "getOdds"})).unwrap();
        assert!(step.id.is_empty());
        assert!(step.retry_on_error);
        assert_eq!(step.max_retries, 3);
        assert_eq!(step.timeout_seconds, 30);
        assert!(step.params.is_empty());
        assert!(step.depends_on.is_empty());
    }

    #[test]
    fn timeout_alias_is_accepted() {
        let step: StepSpec = serde_json::from_value(
            json!({"tool": "betfair", "action": "getOdds", "timeout": 5}),
        )
        .unwrap();
        assert_eq!(step.timeout_seconds, 5);
    }

    #[test]
    fn marked_strings_parse_as_references() {
        assert_eq!(
            ParamValue::from(json!("$step_1")),
            ParamValue::Reference("step_1".to_string())
        );
        assert_eq!(
            ParamValue::from(json!("plain")),
            ParamValue::Literal(json!("plain"))
        );
        assert_eq!(ParamValue::from(json!(42)), ParamValue::Literal(json!(42)));
    }

    #[test]
    fn references_round_trip_through_serde() {
        let step: StepSpec = serde_json::from_value(json!({
            "tool": "betfair",
            "action": "placeBet",
            "params": {"odds": "$step_1", "stake": 10}
        }))
        .unwrap();
        assert_eq!(
            step.params["odds"],
            ParamValue::Reference("step_1".to_string())
        );

        let wire = serde_json::to_value(&step).unwrap();
        assert_eq!(wire["params"]["odds"], "$step_1");
        assert_eq!(wire["params"]["stake"], 10);
    }

    #[test]
    fn missing_ids_default_to_ordinal() {
        let mut doc: WorkflowDoc = serde_json::from_value(json!({
            "steps": [
                {"tool": "a", "action": "x"},
                {"id": "fetch", "tool": "b", "action": "y"},
                {"tool": "c", "action": "z"}
            ],
            "expected_output": "done"
        }))
        .unwrap();
        doc.normalize_ids();
        assert_eq!(doc.steps[0].id, "step_1");
        assert_eq!(doc.steps[1].id, "fetch");
        assert_eq!(doc.steps[2].id, "step_3");
    }
}
