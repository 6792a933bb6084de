//! Explicit registration of tools, resources and prompts.
//!
//! A [`Registry`] is filled once at startup and then shared read-only by the
//! session loop. Handlers are synchronous; the registry runs them on the
//! blocking pool so a panicking handler becomes a failure result instead of
//! taking the endpoint down.

mod prompt;
mod resource;
mod tool;

pub use prompt::{Prompt, PromptArg, PromptHandler};
pub use resource::{Resource, UriPattern};
pub use tool::{Param, Tool, ToolArgs, ToolError, ToolHandler, ValueKind};

use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{GetPromptResult, JsonRpcError, ReadResourceResult, ToolResult};
use crate::schema::SchemaValidationError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),
    #[error("Resource already registered: {0}")]
    DuplicateResource(String),
    #[error("Prompt already registered: {0}")]
    DuplicatePrompt(String),
    #[error("Invalid resource URI pattern: {0}")]
    InvalidPattern(String),
    #[error(transparent)]
    Schema(#[from] SchemaValidationError),
}

/// Name → handler tables exposed by one server.
#[derive(Debug)]
pub struct Registry {
    server_name: String,
    tools: Vec<Tool>,
    resources: Vec<Resource>,
    prompts: Vec<Prompt>,
}

impl Registry {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            tools: Vec::new(),
            resources: Vec::new(),
            prompts: Vec::new(),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn register_tool(&mut self, tool: Tool) -> Result<&mut Self, RegistryError> {
        if self.tool(tool.name()).is_some() {
            return Err(RegistryError::DuplicateTool(tool.name().to_string()));
        }
        debug!(tool = tool.name(), "registered tool");
        self.tools.push(tool);
        Ok(self)
    }

    pub fn register_resource(&mut self, resource: Resource) -> Result<&mut Self, RegistryError> {
        if self.resources.iter().any(|r| r.pattern() == resource.pattern()) {
            return Err(RegistryError::DuplicateResource(resource.pattern().to_string()));
        }
        debug!(resource = %resource.pattern(), "registered resource");
        self.resources.push(resource);
        Ok(self)
    }

    pub fn register_prompt(&mut self, prompt: Prompt) -> Result<&mut Self, RegistryError> {
        if self.prompts.iter().any(|p| p.name() == prompt.name()) {
            return Err(RegistryError::DuplicatePrompt(prompt.name().to_string()));
        }
        debug!(prompt = prompt.name(), "registered prompt");
        self.prompts.push(prompt);
        Ok(self)
    }

    pub fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// `capabilities` object for the `initialize` result.
    pub fn capabilities(&self) -> Value {
        let mut caps = serde_json::Map::new();
        if !self.tools.is_empty() {
            caps.insert("tools".into(), serde_json::json!({}));
        }
        if !self.resources.is_empty() {
            caps.insert("resources".into(), serde_json::json!({}));
        }
        if !self.prompts.is_empty() {
            caps.insert("prompts".into(), serde_json::json!({}));
        }
        Value::Object(caps)
    }

    pub fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self.tools.iter().map(Tool::descriptor).collect();
        serde_json::json!({ "tools": tools })
    }

    pub fn list_resources(&self) -> Value {
        let resources: Vec<Value> = self
            .resources
            .iter()
            .filter(|r| !r.is_template())
            .map(Resource::descriptor)
            .collect();
        serde_json::json!({ "resources": resources })
    }

    pub fn list_resource_templates(&self) -> Value {
        let templates: Vec<Value> = self
            .resources
            .iter()
            .filter(|r| r.is_template())
            .map(Resource::descriptor)
            .collect();
        serde_json::json!({ "resourceTemplates": templates })
    }

    pub fn list_prompts(&self) -> Value {
        let prompts: Vec<Value> = self.prompts.iter().map(Prompt::descriptor).collect();
        serde_json::json!({ "prompts": prompts })
    }

    /// Run a tool call to completion.
    ///
    /// Every outcome is a [`ToolResult`]: unknown names, schema violations,
    /// handler errors and handler panics come back with `isError: true`.
    pub async fn call_tool(&self, name: &str, arguments: Option<&Value>) -> ToolResult {
        match self.try_call_tool(name, arguments).await {
            Ok(text) => ToolResult::text(text),
            Err(e) => {
                warn!(tool = name, "tool call failed: {e}");
                ToolResult::error(e.to_string())
            }
        }
    }

    async fn try_call_tool(&self, name: &str, arguments: Option<&Value>) -> Result<String, ToolError> {
        let tool = self
            .tool(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let args = tool.validate(arguments)?;

        debug!(tool = name, "invoking tool");
        let handler = tool.handler();
        let value = tokio::task::spawn_blocking(move || handler(&args))
            .await
            .map_err(|join_err| ToolError::Failed {
                tool: name.to_string(),
                detail: join_err.to_string(),
            })??;

        tool.render(value)
    }

    /// Read a resource. Static URIs take precedence over templates.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, JsonRpcError> {
        let resource = self
            .resources
            .iter()
            .filter(|r| !r.is_template())
            .chain(self.resources.iter().filter(|r| r.is_template()))
            .find(|r| r.matches(uri))
            .cloned()
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown resource: {uri}")))?;

        debug!(uri, pattern = %resource.pattern(), "reading resource");
        let owned_uri = uri.to_string();
        let text = tokio::task::spawn_blocking(move || resource.read(&owned_uri))
            .await
            .map_err(|join_err| {
                warn!(uri, "resource handler panicked: {join_err}");
                JsonRpcError::internal_error(format!("Resource handler failed: {join_err}"))
            })?
            .map_err(|e| {
                warn!(uri, "resource read failed: {e}");
                JsonRpcError::internal_error(e.to_string())
            })?;

        Ok(ReadResourceResult::text(uri, text))
    }

    pub fn get_prompt(
        &self,
        name: &str,
        arguments: Option<&serde_json::Map<String, Value>>,
    ) -> Result<GetPromptResult, JsonRpcError> {
        let prompt = self
            .prompts
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown prompt: {name}")))?;

        prompt.render(arguments).map_err(|missing| {
            JsonRpcError::invalid_params(format!(
                "Missing required argument '{missing}' for prompt {name}"
            ))
        })
    }
}
