//! Compiled action schema.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use super::DecoderError;

/// A JSON Schema compiled once per match and shared by every decode.
pub struct ActionSchema {
    source: Value,
    compiled: JSONSchema,
}

impl std::fmt::Debug for ActionSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSchema")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl ActionSchema {
    pub fn compile(source: Value) -> Result<Self, DecoderError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&source)
            .map_err(|e| DecoderError::InvalidSchema(e.to_string()))?;
        Ok(Self { source, compiled })
    }

    pub fn source(&self) -> &Value {
        &self.source
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.compiled.is_valid(instance)
    }

    /// Validation messages, empty when `instance` is valid.
    pub fn errors(&self, instance: &Value) -> Vec<String> {
        match self.compiled.validate(instance) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_and_validate() {
        let schema = ActionSchema::compile(json!({
            "type": "object",
            "required": ["guess"],
            "properties": {"guess": {"type": "integer"}}
        }))
        .expect("compile");
        assert!(schema.is_valid(&json!({"guess": 3})));
        assert!(!schema.is_valid(&json!({"guess": "3"})));
        assert!(!schema.errors(&json!({})).is_empty());
        assert!(schema.errors(&json!({"guess": 1})).is_empty());
    }

    #[test]
    fn test_bad_schema_is_an_error() {
        let err = ActionSchema::compile(json!({"type": 12})).expect_err("invalid schema");
        assert!(matches!(err, DecoderError::InvalidSchema(_)));
    }
}
