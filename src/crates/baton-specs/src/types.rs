//! Reusable schema fragments
//!
//! Spec kinds assemble their schemas from these fragments. Each function
//! returns a fresh `serde_json::Value` in the restricted schema subset the
//! validator understands (`type`, `properties`, `required`,
//! `additionalProperties`, `enum`, `items`, `oneOf`, plus the usual size
//! constraints).

use serde_json::{json, Value};

/// A string with at least one character
pub fn nonempty_string() -> Value {
    json!({
        "type": "string",
        "minLength": 1
    })
}

/// An object with no constraint on its members
pub fn any_object() -> Value {
    json!({
        "type": "object"
    })
}

/// An object with at least one member
pub fn nonempty_object() -> Value {
    json!({
        "type": "object",
        "minProperties": 1
    })
}

/// An integer greater than or equal to one
pub fn positive_integer() -> Value {
    json!({
        "type": "integer",
        "minimum": 1
    })
}

/// A list of distinct nonempty strings
pub fn unique_string_list() -> Value {
    json!({
        "type": "array",
        "items": nonempty_string(),
        "uniqueItems": true
    })
}

/// The version enum for a spec kind: the declared version as written, plus
/// its numeric form when it has one (YAML parses `version: 1.0` as a float)
pub fn version_enum(version: &str) -> Value {
    let mut allowed = vec![Value::String(version.to_string())];
    if let Ok(number) = version.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(number) {
            allowed.push(Value::Number(number));
        }
    }
    json!({ "enum": allowed })
}
