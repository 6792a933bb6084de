use std::fmt;
use std::sync::Arc;

use jsonschema::Validator;
use serde_json::{Map, Value};

use crate::inference::InferenceError;
use crate::schema::{self, SchemaValidationError};
use crate::store::StoreError;

/// JSON type of a tool parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ValueKind {
    pub fn json_type(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueKind::String => value.is_string(),
            ValueKind::Integer => as_integer(value).is_some() || value.is_u64(),
            ValueKind::Number => value.is_number(),
            ValueKind::Boolean => value.is_boolean(),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type())
    }
}

/// `value` as an `i64`, including floats with no fractional part.
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(n) if n.as_f64().is_some_and(|f| f.fract() == 0.0) => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared tool parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub kind: ValueKind,
    pub required: bool,
    pub description: String,
}

impl Param {
    pub fn required(name: impl Into<String>, kind: ValueKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(name: impl Into<String>, kind: ValueKind, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Failures surfaced to the caller as a tool result with `isError: true`.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {detail}")]
    InvalidArguments { tool: String, detail: String },
    #[error("Tool {tool} returned {found}, declared {declared}")]
    ReturnMismatch {
        tool: String,
        declared: ValueKind,
        found: &'static str,
    },
    #[error("Tool {tool} failed: {detail}")]
    Failed { tool: String, detail: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Validated arguments handed to a tool handler.
#[derive(Debug, Clone)]
pub struct ToolArgs {
    tool: String,
    values: Map<String, Value>,
}

impl ToolArgs {
    pub fn new(tool: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            values,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Result<&str, ToolError> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.invalid(name, "a string"))
    }

    /// Integer argument. Integral floats such as `1.0` pass the `integer`
    /// schema and are accepted here too.
    pub fn int(&self, name: &str) -> Result<i64, ToolError> {
        self.get(name)
            .and_then(as_integer)
            .ok_or_else(|| self.invalid(name, "an integer"))
    }

    fn invalid(&self, name: &str, expected: &str) -> ToolError {
        ToolError::InvalidArguments {
            tool: self.tool.clone(),
            detail: format!("\"{name}\" must be {expected}"),
        }
    }
}

/// Handler behind a registered tool. Runs on a blocking worker.
pub type ToolHandler = Arc<dyn Fn(&ToolArgs) -> Result<Value, ToolError> + Send + Sync>;

/// A named, schema-typed operation.
pub struct Tool {
    name: String,
    description: String,
    params: Vec<Param>,
    returns: ValueKind,
    input_schema: Value,
    validator: Validator,
    handler: ToolHandler,
}

impl Tool {
    /// Build a tool, generating and compiling its input schema from `params`.
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        params: Vec<Param>,
        returns: ValueKind,
        handler: F,
    ) -> Result<Self, SchemaValidationError>
    where
        F: Fn(&ToolArgs) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        let input_schema = input_schema(&params);
        let validator = schema::compile(&input_schema)?;
        Ok(Self {
            name: name.into(),
            description: description.into(),
            params,
            returns,
            input_schema,
            validator,
            handler: Arc::new(handler),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn returns(&self) -> ValueKind {
        self.returns
    }

    pub(crate) fn handler(&self) -> ToolHandler {
        Arc::clone(&self.handler)
    }

    /// Entry for `tools/list`.
    pub fn descriptor(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }

    /// Check raw call arguments against the input schema.
    ///
    /// Absent arguments are treated as an empty object, so a tool with
    /// required parameters rejects them.
    pub fn validate(&self, arguments: Option<&Value>) -> Result<ToolArgs, ToolError> {
        let empty = Value::Object(Map::new());
        let instance = arguments.unwrap_or(&empty);

        schema::validate_value(&self.validator, instance).map_err(|e| ToolError::InvalidArguments {
            tool: self.name.clone(),
            detail: e.to_string(),
        })?;

        match instance {
            Value::Object(values) => Ok(ToolArgs::new(self.name.clone(), values.clone())),
            other => Err(ToolError::InvalidArguments {
                tool: self.name.clone(),
                detail: format!("expected an object, got {}", kind_of(other)),
            }),
        }
    }

    /// Render a handler value as result text, enforcing the declared kind.
    pub fn render(&self, value: Value) -> Result<String, ToolError> {
        if !self.returns.matches(&value) {
            return Err(ToolError::ReturnMismatch {
                tool: self.name.clone(),
                declared: self.returns,
                found: kind_of(&value),
            });
        }
        Ok(match value {
            Value::String(text) => text,
            other => other.to_string(),
        })
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

fn input_schema(params: &[Param]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in params {
        properties.insert(
            param.name.clone(),
            serde_json::json!({
                "type": param.kind.json_type(),
                "description": param.description,
            }),
        );
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    let mut schema = serde_json::json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = Value::Array(required);
    }
    schema
}
