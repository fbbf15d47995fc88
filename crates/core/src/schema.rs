//! Parameter schemas for tools.
//!
//! One JSON Schema document per tool serves two purposes: it is sent to the
//! model verbatim, and incoming arguments are checked against it before a
//! handler ever runs. Only the structural subset models actually emit is
//! enforced: `type`, `properties`, `required`, `items`, `enum`, and
//! `additionalProperties: false`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single way in which arguments fail to match a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Dotted path to the offending value (`$` is the root)
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A tool's parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSchema(Value);

impl ParamSchema {
    /// Wrap a JSON Schema document.
    pub fn new(schema: Value) -> Self {
        Self(schema)
    }

    /// Schema for a tool that takes no parameters.
    pub fn empty() -> Self {
        Self(serde_json::json!({ "type": "object", "properties": {} }))
    }

    /// The raw document, as sent to the model.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Check that the root of the schema describes an object.
    pub fn is_object_schema(&self) -> bool {
        match self.0.get("type") {
            Some(Value::String(t)) => t == "object",
            None => self.0.get("properties").is_some(),
            _ => false,
        }
    }

    /// Validate `args`, collecting every violation rather than stopping at the first.
    pub fn validate(&self, args: &Value) -> Result<(), Vec<SchemaViolation>> {
        let mut violations = Vec::new();
        check(&self.0, args, "$", &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

impl Default for ParamSchema {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for ParamSchema {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

fn check(schema: &Value, value: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
    let Some(schema) = schema.as_object() else {
        // `true` / missing sub-schemas accept anything
        return;
    };

    if let Some(expected) = schema.get("type") {
        if !type_matches(expected, value) {
            out.push(SchemaViolation {
                path: path.to_string(),
                message: format!("expected {}, got {}", describe_type(expected), json_type(value)),
            });
            return;
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            out.push(SchemaViolation {
                path: path.to_string(),
                message: format!("value {value} is not one of {}", Value::Array(allowed.clone())),
            });
        }
    }

    match value {
        Value::Object(map) => check_object(schema, map, path, out),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check(item_schema, item, &format!("{path}[{i}]"), out);
                }
            }
        }
        _ => {}
    }
}

fn check_object(
    schema: &Map<String, Value>,
    map: &Map<String, Value>,
    path: &str,
    out: &mut Vec<SchemaViolation>,
) {
    if let Some(Value::Array(required)) = schema.get("required") {
        for field in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(field) {
                out.push(SchemaViolation {
                    path: path.to_string(),
                    message: format!("missing required field '{field}'"),
                });
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = matches!(schema.get("additionalProperties"), Some(Value::Bool(false)));

    for (key, child) in map {
        match properties.and_then(|p| p.get(key)) {
            Some(child_schema) => check(child_schema, child, &format!("{path}.{key}"), out),
            None if closed => out.push(SchemaViolation {
                path: path.to_string(),
                message: format!("unexpected field '{key}'"),
            }),
            None => {}
        }
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(t) => single_type_matches(t, value),
        Value::Array(options) => options
            .iter()
            .filter_map(Value::as_str)
            .any(|t| single_type_matches(t, value)),
        _ => true,
    }
}

fn single_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        // Unknown type keywords are not ours to enforce.
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::Array(options) => options
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        Value::String(t) => t.clone(),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email_schema() -> ParamSchema {
        ParamSchema::new(json!({
            "type": "object",
            "properties": {
                "to": { "type": "string" },
                "subject": { "type": "string" },
                "priority": { "type": "string", "enum": ["low", "normal", "high"] },
                "cc": { "type": "array", "items": { "type": "string" } },
                "retries": { "type": "integer" }
            },
            "required": ["to", "subject"]
        }))
    }

    #[test]
    fn accepts_matching_arguments() {
        let args = json!({"to": "a@b.c", "subject": "hi", "cc": ["d@e.f"], "retries": 2});
        assert!(email_schema().validate(&args).is_ok());
    }

    #[test]
    fn reports_every_missing_required_field() {
        let errs = email_schema().validate(&json!({})).unwrap_err();
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().any(|e| e.message.contains("'to'")));
        assert!(errs.iter().any(|e| e.message.contains("'subject'")));
    }

    #[test]
    fn rejects_wrong_types_with_paths() {
        let args = json!({"to": 42, "subject": "hi", "cc": ["ok", 7]});
        let errs = email_schema().validate(&args).unwrap_err();
        let paths: Vec<_> = errs.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"$.to"));
        assert!(paths.contains(&"$.cc[1]"));
    }

    #[test]
    fn rejects_values_outside_enum() {
        let args = json!({"to": "a", "subject": "b", "priority": "urgent"});
        let errs = email_schema().validate(&args).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].path, "$.priority");
    }

    #[test]
    fn non_object_root_is_rejected() {
        let errs = email_schema().validate(&json!("just a string")).unwrap_err();
        assert_eq!(errs[0].path, "$");
        assert!(errs[0].message.contains("expected object"));
    }

    #[test]
    fn closed_objects_reject_unknown_fields() {
        let schema = ParamSchema::new(json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "additionalProperties": false
        }));
        assert!(schema.validate(&json!({"path": "a"})).is_ok());
        let errs = schema.validate(&json!({"path": "a", "mode": "x"})).unwrap_err();
        assert!(errs[0].message.contains("'mode'"));
    }

    #[test]
    fn integer_accepts_whole_floats_only() {
        let schema = ParamSchema::new(json!({"type": "integer"}));
        assert!(schema.validate(&json!(3)).is_ok());
        assert!(schema.validate(&json!(3.0)).is_ok());
        assert!(schema.validate(&json!(3.5)).is_err());
    }

    #[test]
    fn empty_schema_accepts_empty_object() {
        let schema = ParamSchema::empty();
        assert!(schema.is_object_schema());
        assert!(schema.validate(&json!({})).is_ok());
        assert!(schema.validate(&json!(null)).is_err());
    }
}
