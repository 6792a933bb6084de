pub mod demo;
pub mod knowledge_base;
pub mod llm;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{Profile, ServerConfig};
use crate::inference::CompletionBackend;
use crate::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, PromptGetParams, ResourceReadParams,
    ToolCallParams, PROTOCOL_VERSION,
};
use crate::registry::{Registry, RegistryError};
use crate::store::KnowledgeBase;

/// Build the registry for the configured profile.
pub fn build_registry(
    config: &ServerConfig,
    backend: Arc<dyn CompletionBackend>,
) -> Result<Registry, RegistryError> {
    match config.profile {
        Profile::KnowledgeBase => knowledge_base::registry(
            KnowledgeBase::new(&config.kb_path, config.header_mode),
            backend,
        ),
        Profile::Llm => llm::registry(backend),
        Profile::Demo => demo::registry(),
    }
}

/// Dispatch a JSON-RPC request to the appropriate handler.
///
/// Returns `None` for notifications (no response required).
pub async fn dispatch(req: &JsonRpcRequest, registry: &Registry) -> Option<JsonRpcResponse> {
    if req.method.starts_with("notifications/") {
        debug!(method = %req.method, "notification received");
        return None;
    }

    let response = match req.method.as_str() {
        "initialize" => {
            let result = serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": registry.capabilities(),
                "serverInfo": {
                    "name": registry.server_name(),
                    "version": env!("CARGO_PKG_VERSION")
                }
            });
            JsonRpcResponse::success(req.id.clone(), result)
        }

        "ping" => JsonRpcResponse::success(req.id.clone(), serde_json::json!({})),

        "tools/list" => JsonRpcResponse::success(req.id.clone(), registry.list_tools()),

        "tools/call" => {
            let params: ToolCallParams = match parse_params(req) {
                Ok(p) => p,
                Err(resp) => return Some(resp),
            };

            let tool_result = registry.call_tool(&params.name, params.arguments.as_ref()).await;
            let result_json = serde_json::to_value(&tool_result).expect("ToolResult must serialize to JSON Value");
            JsonRpcResponse::success(req.id.clone(), result_json)
        }

        "resources/list" => JsonRpcResponse::success(req.id.clone(), registry.list_resources()),

        "resources/templates/list" => {
            JsonRpcResponse::success(req.id.clone(), registry.list_resource_templates())
        }

        "resources/read" => {
            let params: ResourceReadParams = match parse_params(req) {
                Ok(p) => p,
                Err(resp) => return Some(resp),
            };

            match registry.read_resource(&params.uri).await {
                Ok(contents) => JsonRpcResponse::success(
                    req.id.clone(),
                    serde_json::to_value(&contents).expect("ReadResourceResult must serialize to JSON Value"),
                ),
                Err(err) => JsonRpcResponse::error(req.id.clone(), err),
            }
        }

        "prompts/list" => JsonRpcResponse::success(req.id.clone(), registry.list_prompts()),

        "prompts/get" => {
            let params: PromptGetParams = match parse_params(req) {
                Ok(p) => p,
                Err(resp) => return Some(resp),
            };

            match registry.get_prompt(&params.name, params.arguments.as_ref()) {
                Ok(prompt) => JsonRpcResponse::success(
                    req.id.clone(),
                    serde_json::to_value(&prompt).expect("GetPromptResult must serialize to JSON Value"),
                ),
                Err(err) => JsonRpcResponse::error(req.id.clone(), err),
            }
        }

        _ => JsonRpcResponse::error(req.id.clone(), JsonRpcError::method_not_found(&req.method)),
    };

    // Requests sent without an id are notifications: run them, reply to nobody.
    req.id.as_ref().map(|_| response)
}

fn parse_params<T: DeserializeOwned>(req: &JsonRpcRequest) -> Result<T, JsonRpcResponse> {
    match &req.params {
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            JsonRpcResponse::error(
                req.id.clone(),
                JsonRpcError::invalid_params(format!("Invalid {} params: {e}", req.method)),
            )
        }),
        None => Err(JsonRpcResponse::error(
            req.id.clone(),
            JsonRpcError::invalid_params(format!("Missing params for {}", req.method)),
        )),
    }
}
