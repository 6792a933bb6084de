use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::inference::Role;
use crate::protocol::{GetPromptResult, PromptMessage};

/// One declared prompt argument.
#[derive(Debug, Clone)]
pub struct PromptArg {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl PromptArg {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }
}

/// Handler behind a prompt: string arguments in, ordered messages out.
pub type PromptHandler = Arc<dyn Fn(&BTreeMap<String, String>) -> Vec<(Role, String)> + Send + Sync>;

/// A named message template.
#[derive(Clone)]
pub struct Prompt {
    name: String,
    description: String,
    arguments: Vec<PromptArg>,
    handler: PromptHandler,
}

impl Prompt {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments: Vec<PromptArg>,
        handler: F,
    ) -> Self
    where
        F: Fn(&BTreeMap<String, String>) -> Vec<(Role, String)> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            arguments,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry for `prompts/list`.
    pub fn descriptor(&self) -> Value {
        let arguments: Vec<Value> = self
            .arguments
            .iter()
            .map(|arg| {
                serde_json::json!({
                    "name": arg.name,
                    "description": arg.description,
                    "required": arg.required,
                })
            })
            .collect();
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "arguments": arguments,
        })
    }

    /// Render the prompt. Non-string argument values are taken as their JSON text.
    ///
    /// Returns the name of the first missing required argument as the error.
    pub fn render(
        &self,
        raw: Option<&serde_json::Map<String, Value>>,
    ) -> Result<GetPromptResult, String> {
        let args: BTreeMap<String, String> = raw
            .into_iter()
            .flatten()
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), text)
            })
            .collect();

        if let Some(missing) = self
            .arguments
            .iter()
            .find(|arg| arg.required && !args.contains_key(&arg.name))
        {
            return Err(missing.name.clone());
        }

        let messages = (self.handler)(&args)
            .into_iter()
            .map(|(role, text)| PromptMessage::text(role.to_string(), text))
            .collect();

        Ok(GetPromptResult {
            description: Some(self.description.clone()),
            messages,
        })
    }
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}
