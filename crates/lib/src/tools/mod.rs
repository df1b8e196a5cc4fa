//! Tool layer: the live-data agent's function-calling surface.
//!
//! Arguments proposed by the model are checked against the tool's JSON schema with
//! [`validate_args`] before anything is executed.

mod chess;

use async_trait::async_trait;
use serde_json::Value;

pub use crate::llm::{ToolDefinition, ToolFunctionDefinition};
pub use chess::{recent_months, ChessTools};

/// Runs named tools. Errors are plain strings so they can be handed back to the model.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tool schemas offered to the model.
    fn definitions(&self) -> Vec<ToolDefinition>;

    async fn execute(&self, name: &str, args: &Value) -> Result<String, String>;
}

/// Build an OpenAI-style function definition.
pub fn function_definition(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        typ: "function".to_string(),
        function: ToolFunctionDefinition {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters,
        },
    }
}

/// Check arguments against a definition's schema: object shape, required fields present,
/// required strings non-empty, declared types and integer bounds respected.
pub fn validate_args(def: &ToolDefinition, args: &Value) -> Result<(), String> {
    let name = &def.function.name;
    let Some(obj) = args.as_object() else {
        return Err(format!("{}: arguments must be a JSON object", name));
    };
    let schema = &def.function.parameters;
    let properties = schema.get("properties").and_then(|p| p.as_object());

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            match obj.get(field) {
                None | Some(Value::Null) => {
                    return Err(format!("{}: missing required argument '{}'", name, field))
                }
                Some(Value::String(s)) if s.trim().is_empty() => {
                    return Err(format!("{}: argument '{}' must not be empty", name, field))
                }
                _ => {}
            }
        }
    }

    let Some(properties) = properties else {
        return Ok(());
    };
    for (field, value) in obj {
        let Some(prop) = properties.get(field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        match prop.get("type").and_then(|t| t.as_str()) {
            Some("string") if !value.is_string() => {
                return Err(format!("{}: argument '{}' must be a string", name, field));
            }
            Some("integer") => {
                let Some(n) = value.as_i64() else {
                    return Err(format!("{}: argument '{}' must be an integer", name, field));
                };
                if let Some(min) = prop.get("minimum").and_then(|m| m.as_i64()) {
                    if n < min {
                        return Err(format!("{}: argument '{}' must be >= {}", name, field, min));
                    }
                }
                if let Some(max) = prop.get("maximum").and_then(|m| m.as_i64()) {
                    if n > max {
                        return Err(format!("{}: argument '{}' must be <= {}", name, field, max));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recent_games_def() -> ToolDefinition {
        function_definition(
            "get_recent_games",
            "recent games",
            json!({
                "type": "object",
                "properties": {
                    "username": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 50}
                },
                "required": ["username"]
            }),
        )
    }

    #[test]
    fn accepts_valid_args() {
        let def = recent_games_def();
        assert!(validate_args(&def, &json!({"username": "hikaru"})).is_ok());
        assert!(validate_args(&def, &json!({"username": "hikaru", "limit": 5})).is_ok());
    }

    #[test]
    fn rejects_missing_and_empty_required() {
        let def = recent_games_def();
        let err = validate_args(&def, &json!({"limit": 5})).unwrap_err();
        assert!(err.contains("missing required argument 'username'"));
        assert!(validate_args(&def, &json!({"username": null})).is_err());
        assert!(validate_args(&def, &json!({"username": "  "})).is_err());
    }

    #[test]
    fn rejects_non_object_and_wrong_types() {
        let def = recent_games_def();
        assert!(validate_args(&def, &Value::Null).is_err());
        assert!(validate_args(&def, &json!("hikaru")).is_err());
        assert!(validate_args(&def, &json!({"username": 42})).is_err());
        assert!(validate_args(&def, &json!({"username": "a", "limit": "ten"})).is_err());
    }

    #[test]
    fn enforces_integer_bounds() {
        let def = recent_games_def();
        assert!(validate_args(&def, &json!({"username": "a", "limit": 0})).is_err());
        assert!(validate_args(&def, &json!({"username": "a", "limit": 51})).is_err());
        assert!(validate_args(&def, &json!({"username": "a", "limit": 50})).is_ok());
    }
}
