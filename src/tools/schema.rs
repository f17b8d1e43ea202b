//! Structural parameter contracts for tools
//!
//! Each tool declares named, typed fields. Arguments chosen by the model
//! are validated against the declaration before dispatch.

use crate::error::ChatError;
use crate::Result;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParameterKind {
    fn json_type(self) -> &'static str {
        match self {
            ParameterKind::String => "string",
            ParameterKind::Integer => "integer",
            ParameterKind::Number => "number",
            ParameterKind::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParameterKind::String => value.is_string(),
            ParameterKind::Integer => value.is_i64() || value.is_u64(),
            ParameterKind::Number => value.is_number(),
            ParameterKind::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterField {
    pub name: &'static str,
    pub kind: ParameterKind,
    pub description: &'static str,
    pub required: bool,
}

impl ParameterField {
    pub fn required(name: &'static str, kind: ParameterKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSchema {
    fields: Vec<ParameterField>,
}

impl ParameterSchema {
    pub fn new(fields: Vec<ParameterField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[ParameterField] {
        &self.fields
    }

    pub fn has_optional_fields(&self) -> bool {
        self.fields.iter().any(|f| !f.required)
    }

    /// JSON schema object advertised to the model
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.to_string(),
                    json!({ "type": f.kind.json_type(), "description": f.description }),
                )
            })
            .collect();

        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check arguments against the declared fields. Unknown keys are
    /// dropped; missing required fields and type mismatches are errors.
    pub fn validate(&self, arguments: &Value) -> Result<ToolParameters> {
        let object = match arguments {
            Value::Object(map) => map,
            Value::Null if self.fields.iter().all(|f| !f.required) => {
                return Ok(ToolParameters::default())
            }
            _ => {
                return Err(ChatError::InvalidToolInput(
                    "tool arguments must be a JSON object".to_string(),
                ))
            }
        };

        let mut values = Map::new();
        for field in &self.fields {
            match object.get(field.name) {
                Some(Value::Null) | None if field.required => {
                    return Err(ChatError::InvalidToolInput(format!(
                        "missing required parameter '{}'",
                        field.name
                    )));
                }
                Some(Value::Null) | None => {}
                Some(value) if field.kind.accepts(value) => {
                    values.insert(field.name.to_string(), value.clone());
                }
                Some(value) => {
                    return Err(ChatError::InvalidToolInput(format!(
                        "parameter '{}' must be a {}, got {}",
                        field.name,
                        field.kind.json_type(),
                        value
                    )));
                }
            }
        }

        Ok(ToolParameters { values })
    }
}

/// Arguments that passed schema validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolParameters {
    values: Map<String, Value>,
}

impl ToolParameters {
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Value of a required string field. Validation already guaranteed it.
    pub fn required_str(&self, name: &str) -> Result<&str> {
        self.get_str(name).ok_or_else(|| {
            ChatError::InvalidToolInput(format!("missing required parameter '{}'", name))
        })
    }
}
