//! Argument validation against a tool's declared parameter schema.
//!
//! Covers the subset of JSON schema the tools actually declare: an object
//! with typed properties and a required list.

use minder_protocol::ToolError;
use serde_json::Value;

/// Validate arguments against a parameter schema.
pub fn validate_arguments(tool_name: &str, schema: &Value, args: &Value) -> Result<(), ToolError> {
    let Some(args_map) = args.as_object() else {
        return Err(ToolError::ValidationFailed(format!(
            "{tool_name}: arguments must be an object"
        )));
    };

    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for entry in required {
            let Some(field) = entry.as_str() else { continue };
            if !args_map.contains_key(field) {
                return Err(ToolError::ValidationFailed(format!(
                    "{tool_name}: missing required argument '{field}'"
                )));
            }
        }
    }

    if let Some(properties) = properties {
        for (field, value) in args_map {
            let Some(declared) = properties.get(field) else {
                continue;
            };
            let Some(expected) = declared.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(ToolError::ValidationFailed(format!(
                    "{tool_name}: argument '{field}' should be {expected}"
                )));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
