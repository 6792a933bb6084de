use jsonschema::{validator_for, Validator};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SchemaValidationError {
    #[error("Schema parse error: {0}")]
    SchemaParse(#[from] serde_json::Error),
    #[error("Schema compile error: {0}")]
    SchemaCompile(String),
    #[error("{0}")]
    ValidationFailed(String),
}

/// Compile a JSON Schema (draft 2020-12) once for repeated validation.
pub fn compile(schema: &Value) -> Result<Validator, SchemaValidationError> {
    validator_for(schema).map_err(|e| SchemaValidationError::SchemaCompile(e.to_string()))
}

/// Validate `instance` against a compiled schema, joining every violation
/// into one message.
pub fn validate_value(validator: &Validator, instance: &Value) -> Result<(), SchemaValidationError> {
    let problems: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| e.to_string())
        .collect();

    if problems.is_empty() {
        Ok(())
    } else {
        Err(SchemaValidationError::ValidationFailed(problems.join("; ")))
    }
}

/// Validate a JSON instance against a JSON Schema (draft 2020-12).
/// Returns Ok(()) if valid, Err otherwise.
pub fn validate_json(schema_str: &str, instance_str: &str) -> Result<(), SchemaValidationError> {
    let schema_json: Value = serde_json::from_str(schema_str)?;
    let instance_json: Value = serde_json::from_str(instance_str)?;

    let validator = compile(&schema_json)?;
    validate_value(&validator, &instance_json)
}
