use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSchemaValidationError {
    pub tool_name: String,
    pub path: String,
    pub reason: String,
}

impl std::fmt::Display for ToolSchemaValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid tool schema `{}` at `{}`: {}", self.tool_name, self.path, self.reason)
    }
}

impl std::error::Error for ToolSchemaValidationError {}

/// Recursively validates that every array node declares `items`, the minimal
/// shape the ReAct loop's tool-call parser relies on.
pub fn validate_tool_schemas(schemas: &[ToolSchema]) -> Result<(), ToolSchemaValidationError> {
    for schema in schemas {
        validate_schema_node(&schema.name, "$", &schema.input_schema)?;
    }
    Ok(())
}

fn validate_schema_node(tool_name: &str, path: &str, value: &Value) -> Result<(), ToolSchemaValidationError> {
    let Some(obj) = value.as_object() else {
        if let Some(arr) = value.as_array() {
            for (idx, item) in arr.iter().enumerate() {
                validate_schema_node(tool_name, &format!("{path}[{idx}]"), item)?;
            }
        }
        return Ok(());
    };

    if obj.get("type").and_then(|t| t.as_str()) == Some("array") && !obj.contains_key("items") {
        return Err(ToolSchemaValidationError {
            tool_name: tool_name.to_string(),
            path: path.to_string(),
            reason: "array schema missing items".to_string(),
        });
    }

    if let Some(items) = obj.get("items") {
        validate_schema_node(tool_name, &format!("{path}.items"), items)?;
    }
    if let Some(props) = obj.get("properties").and_then(|v| v.as_object()) {
        for (key, child) in props {
            validate_schema_node(tool_name, &format!("{path}.properties.{key}"), child)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_array_without_items() {
        let schema = ToolSchema {
            name: "bad".to_string(),
            description: String::new(),
            input_schema: json!({"type": "object", "properties": {"tags": {"type": "array"}}}),
        };
        assert!(validate_tool_schemas(&[schema]).is_err());
    }

    #[test]
    fn accepts_well_formed_schema() {
        let schema = ToolSchema {
            name: "good".to_string(),
            description: String::new(),
            input_schema: json!({"type": "object", "properties": {"tags": {"type": "array", "items": {"type": "string"}}}}),
        };
        assert!(validate_tool_schemas(&[schema]).is_ok());
    }
}
