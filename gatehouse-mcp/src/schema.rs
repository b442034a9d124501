//! Structural validation of tool arguments against JSON schemas
//!
//! Upstream schemas are consumed opaquely; before forwarding a call the
//! gateway checks the argument object structurally: required properties are
//! present and declared primitive types match.

use serde_json::Value;

use crate::error::{McpError, McpResult};

/// Validate `arguments` against a tool's input schema
pub fn validate_arguments(schema: &Value, arguments: &Value) -> McpResult<()> {
    let Some(schema_obj) = schema.as_object() else {
        // No usable schema: accept anything
        return Ok(());
    };

    if schema_obj.get("type").and_then(Value::as_str) == Some("object") {
        let Some(args) = arguments.as_object() else {
            return Err(McpError::bad_request("arguments must be an object"));
        };

        if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !args.contains_key(name) {
                    return Err(McpError::bad_request(format!(
                        "missing required argument '{}'",
                        name
                    )));
                }
            }
        }

        if let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) {
            for (name, value) in args {
                let Some(declared) = properties.get(name) else {
                    continue;
                };
                let Some(expected) = declared.get("type").and_then(Value::as_str) else {
                    continue;
                };
                if !type_matches(expected, value) {
                    return Err(McpError::bad_request(format!(
                        "argument '{}' must be of type {}",
                        name, expected
                    )));
                }
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"}
            },
            "required": ["query"]
        })
    }

    #[test]
    fn test_valid_arguments_pass() {
        assert!(validate_arguments(&schema(), &json!({"query": "x", "limit": 3})).is_ok());
        assert!(validate_arguments(&schema(), &json!({"query": "x"})).is_ok());
        // Unknown properties pass through untouched
        assert!(validate_arguments(&schema(), &json!({"query": "x", "extra": true})).is_ok());
    }

    #[test]
    fn test_missing_required_rejected() {
        let err = validate_arguments(&schema(), &json!({"limit": 3})).unwrap_err();
        assert_eq!(err.kind(), "BAD_REQUEST");
    }

    #[test]
    fn test_wrong_type_rejected() {
        let err = validate_arguments(&schema(), &json!({"query": 42})).unwrap_err();
        assert_eq!(err.kind(), "BAD_REQUEST");
        assert!(validate_arguments(&schema(), &json!({"query": "x", "limit": "many"})).is_err());
    }

    #[test]
    fn test_schemaless_tools_accept_anything() {
        assert!(validate_arguments(&json!(null), &json!({"any": 1})).is_ok());
        assert!(validate_arguments(&json!({}), &json!("scalar")).is_ok());
    }
}
