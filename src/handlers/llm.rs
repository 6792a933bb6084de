use std::sync::Arc;

use serde_json::Value;

use crate::config::Profile;
use crate::inference::{ChatMessage, CompletionBackend, CompletionRequest};
use crate::registry::{Param, Registry, RegistryError, Tool, ValueKind};

/// System message for plain prompts.
pub const ASSISTANT_PERSONA: &str = "You are a helpful, friendly AI assistant.";

/// Registry for the `llm` profile: a single `query_llm` tool.
pub fn registry(backend: Arc<dyn CompletionBackend>) -> Result<Registry, RegistryError> {
    let mut registry = Registry::new(Profile::Llm.server_name());

    registry.register_tool(Tool::new(
        "query_llm",
        "Send a prompt to the local LLM and return its response",
        vec![Param::required("prompt", ValueKind::String, "Prompt text")],
        ValueKind::String,
        move |args| {
            let messages = [
                ChatMessage::system(ASSISTANT_PERSONA),
                ChatMessage::user(args.str("prompt")?),
            ];
            let request = CompletionRequest::from_messages(&messages);
            Ok(Value::String(backend.complete(&request)?))
        },
    )?)?;

    Ok(registry)
}
