//! JSON <-> Tansy Value conversion utilities

use crate::value::{Map, Value};

/// Largest magnitude at which every integer is exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Convert serde_json::Value to Tansy Value
pub fn json_to_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            Value::Object(obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect())
        }
    }
}

/// Convert a JSON object into a run context. `null` gives an empty context;
/// anything else that is not an object gives `None`.
pub fn json_to_context(v: serde_json::Value) -> Option<Map> {
    match json_to_value(v) {
        Value::Object(map) => Some(map),
        Value::Null => Some(Map::new()),
        _ => None,
    }
}

/// Convert Tansy Value to serde_json::Value
///
/// Integral numbers are written without a fraction; NaN and the infinities
/// have no JSON form and become `null`.
pub fn value_to_json(v: Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(b),
        Value::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
            serde_json::Value::Number((n as i64).into())
        }
        Value::Number(n) => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s),
        Value::Array(arr) => serde_json::Value::Array(arr.into_iter().map(value_to_json).collect()),
        Value::Object(obj) => {
            serde_json::Value::Object(obj.into_iter().map(|(k, v)| (k, value_to_json(v))).collect())
        }
    }
}

#[test]
fn test_non_finite_numbers_become_null() {
    assert_eq!(value_to_json(Value::Number(f64::NAN)), serde_json::Value::Null);
    assert_eq!(value_to_json(Value::Number(f64::INFINITY)), serde_json::Value::Null);
    assert_eq!(value_to_json(Value::Number(3.0)), serde_json::json!(3));
    assert_eq!(value_to_json(Value::Number(2.5)), serde_json::json!(2.5));
}
