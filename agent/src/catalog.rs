//! Tool catalog adapter.
//!
//! Translates backend tool descriptions into the `{name, description,
//! input_schema}` shape the model expects, and keeps one compiled JSON Schema
//! validator per tool so the bridge can reject malformed arguments before they
//! reach the backend.

use std::collections::HashMap;

use jsonschema::Validator;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::core::types::ToolSpec;

/// Tool description as presented to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// The run's tool catalog. Built once before the first phase.
pub struct ToolCatalog {
    tools: Vec<ModelTool>,
    validators: HashMap<String, Validator>,
}

impl ToolCatalog {
    /// Adapt backend specs. Duplicate and unnamed tools are dropped; a schema
    /// that fails to compile disables argument validation for that tool only.
    pub fn from_specs(specs: Vec<ToolSpec>) -> Self {
        let mut tools: Vec<ModelTool> = Vec::with_capacity(specs.len());
        let mut validators = HashMap::new();
        for spec in specs {
            let name = spec.name.trim().to_string();
            if name.is_empty() {
                warn!("skipping backend tool without a name");
                continue;
            }
            if tools.iter().any(|t| t.name == name) {
                warn!(tool = %name, "skipping duplicate backend tool");
                continue;
            }
            let input_schema = normalize_schema(spec.input_schema);
            match jsonschema::options().build(&input_schema) {
                Ok(validator) => {
                    validators.insert(name.clone(), validator);
                }
                Err(err) => warn!(tool = %name, err = %err, "tool schema does not compile"),
            }
            tools.push(ModelTool {
                description: spec.description.unwrap_or_default().trim().to_string(),
                name,
                input_schema,
            });
        }
        debug!(tools = tools.len(), "tool catalog built");
        Self { tools, validators }
    }

    pub fn tools(&self) -> &[ModelTool] {
        &self.tools
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// Check `arguments` against the tool's input schema.
    ///
    /// Returns the validation messages on failure. Tools without a compiled
    /// validator accept any arguments.
    pub fn validate_arguments(&self, name: &str, arguments: &Value) -> Result<(), Vec<String>> {
        let Some(validator) = self.validators.get(name) else {
            return Ok(());
        };
        let messages: Vec<String> = validator
            .iter_errors(arguments)
            .map(|err| err.to_string())
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages)
        }
    }
}

/// Ensure the schema is an object schema the model API accepts.
fn normalize_schema(schema: Option<Value>) -> Value {
    match schema {
        Some(Value::Object(mut obj)) => {
            obj.entry("type").or_insert_with(|| json!("object"));
            if obj.get("type") == Some(&json!("object")) {
                obj.entry("properties")
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            Value::Object(obj)
        }
        _ => json!({"type": "object", "properties": {}}),
    }
}
