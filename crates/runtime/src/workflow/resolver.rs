//! Step parameter dependency resolution.
//!
//! Runs once per step, immediately before authorization and invocation,
//! against the already-settled session state. Resolution is tolerant: a
//! reference to a step that has no recorded output falls back to the
//! original marker string instead of erroring.

use std::collections::HashMap;

use serde_json::Value;

use crate::workflow::doc::{ParamValue, REFERENCE_MARKER};

/// Rewrite a step's raw parameters against accumulated session state.
pub fn resolve_params(
    params: &HashMap<String, ParamValue>,
    state: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    params
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, state)))
        .collect()
}

fn resolve_value(value: &ParamValue, state: &HashMap<String, Value>) -> Value {
    match value {
        ParamValue::Literal(literal) => literal.clone(),
        ParamValue::Reference(step_id) => match state.get(step_id) {
            Some(output) => output.clone(),
            None => Value::String(format!("{REFERENCE_MARKER}{step_id}")),
        },
    }
}
