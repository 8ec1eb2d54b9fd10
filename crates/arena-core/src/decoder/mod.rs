//! Tolerant action decoder.
//!
//! Turns untrusted agent text into a schema-valid action. Strategies run
//! in a fixed order (`direct`, `fenced`, `brace-extract`); each parsed
//! candidate is validated as-is, then through the known wrapper paths
//! (`unwrapped`). The first candidate that validates wins. Malformed
//! input is an expected condition: decoding always returns an outcome,
//! falling back to the configured action with a machine-readable reason.

mod schema;
mod strategies;

use serde_json::Value;

use crate::domain::{DecodeMethod, FailureReason};

pub use schema::ActionSchema;
pub use strategies::DecodeLimits;

use strategies::{unwrap_candidates, STRATEGIES};

/// Errors building a decoder. Decoding itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("invalid action schema: {0}")]
    InvalidSchema(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome {
    pub action: Value,
    /// Set when decoding succeeded.
    pub method: Option<DecodeMethod>,
    /// Set when the fallback was used.
    pub failure: Option<FailureReason>,
    /// Bounded-scan aborts and similar non-fatal notes.
    pub warnings: Vec<String>,
    /// Schema errors of the last rejected candidate.
    pub errors: Vec<String>,
}

impl DecodeOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug)]
pub struct ActionDecoder {
    schema: ActionSchema,
    limits: DecodeLimits,
    fallback: Value,
}

impl ActionDecoder {
    pub fn new(schema: Value, fallback: Value, limits: DecodeLimits) -> Result<Self, DecoderError> {
        Ok(Self {
            schema: ActionSchema::compile(schema)?,
            limits,
            fallback,
        })
    }

    pub fn fallback(&self) -> &Value {
        &self.fallback
    }

    pub fn schema(&self) -> &ActionSchema {
        &self.schema
    }

    /// Decode free-form agent output.
    pub fn decode(&self, text: &str) -> DecodeOutcome {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        let mut parsed_any = false;

        for (method, strategy) in STRATEGIES {
            let Some(candidate) = strategy(text, &self.limits, &mut warnings) else {
                continue;
            };
            parsed_any = true;
            match self.accept(&candidate, *method) {
                Ok((action, method)) => {
                    return DecodeOutcome {
                        action,
                        method: Some(method),
                        failure: None,
                        warnings,
                        errors: Vec::new(),
                    }
                }
                Err(e) => errors = e,
            }
        }

        let failure = if parsed_any {
            FailureReason::SchemaValidationFailed
        } else {
            FailureReason::NoJsonFound
        };
        self.fail(failure, warnings, errors)
    }

    /// Validate an already-structured action (scripted agents).
    pub fn decode_value(&self, value: &Value) -> DecodeOutcome {
        match self.accept(value, DecodeMethod::Direct) {
            Ok((action, method)) => DecodeOutcome {
                action,
                method: Some(method),
                failure: None,
                warnings: Vec::new(),
                errors: Vec::new(),
            },
            Err(errors) => self.fail(FailureReason::SchemaValidationFailed, Vec::new(), errors),
        }
    }

    fn accept(
        &self,
        candidate: &Value,
        method: DecodeMethod,
    ) -> Result<(Value, DecodeMethod), Vec<String>> {
        if self.schema.is_valid(candidate) {
            return Ok((candidate.clone(), method));
        }
        if let Some(inner) = unwrap_candidates(candidate).find(|v| self.schema.is_valid(v)) {
            return Ok((inner.clone(), DecodeMethod::Unwrapped));
        }
        Err(self.schema.errors(candidate))
    }

    fn fail(
        &self,
        failure: FailureReason,
        warnings: Vec<String>,
        errors: Vec<String>,
    ) -> DecodeOutcome {
        DecodeOutcome {
            action: self.fallback.clone(),
            method: None,
            failure: Some(failure),
            warnings,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decoder() -> ActionDecoder {
        ActionDecoder::new(
            json!({
                "type": "object",
                "required": ["guess"],
                "properties": {"guess": {"type": "integer"}}
            }),
            json!({"noop": true}),
            DecodeLimits::default(),
        )
        .expect("decoder")
    }

    #[test]
    fn test_fenced_and_direct_agree() {
        let d = decoder();
        let direct = d.decode("{\"guess\":50}");
        let fenced = d.decode("```json\n{\"guess\":50}\n```");
        assert_eq!(direct.action, fenced.action);
        assert_eq!(direct.method, Some(DecodeMethod::Direct));
        assert_eq!(fenced.method, Some(DecodeMethod::Fenced));
    }

    #[test]
    fn test_garbage_falls_back() {
        let out = decoder().decode("I think the answer is fifty.");
        assert_eq!(out.action, json!({"noop": true}));
        assert_eq!(out.failure, Some(FailureReason::NoJsonFound));
        assert!(!out.is_success());
    }

    #[test]
    fn test_wrong_shape_is_schema_failure() {
        let out = decoder().decode("{\"guess\": \"fifty\"}");
        assert_eq!(out.failure, Some(FailureReason::SchemaValidationFailed));
        assert!(!out.errors.is_empty());
    }

    #[test]
    fn test_wrapped_payload_is_unwrapped() {
        let out = decoder().decode("{\"response\": {\"action\": {\"guess\": 12}}}");
        assert_eq!(out.action, json!({"guess": 12}));
        assert_eq!(out.method, Some(DecodeMethod::Unwrapped));
    }

    #[test]
    fn test_prose_with_object() {
        let out = decoder().decode("My move: {\"guess\": 64}. Good luck!");
        assert_eq!(out.action, json!({"guess": 64}));
        assert_eq!(out.method, Some(DecodeMethod::BraceExtract));
    }

    #[test]
    fn test_decode_value() {
        let d = decoder();
        assert!(d.decode_value(&json!({"guess": 1})).is_success());
        let bad = d.decode_value(&json!({"move": "rock"}));
        assert_eq!(bad.failure, Some(FailureReason::SchemaValidationFailed));
        assert_eq!(bad.action, json!({"noop": true}));
    }
}
