pub mod request;
pub mod response;

/// MCP protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub use request::{
    ClientInfo, InitializeParams, JsonRpcRequest, PromptGetParams, ResourceReadParams, RpcId,
    ToolCallParams,
};
pub use response::{
    GetPromptResult, JsonRpcError, JsonRpcResponse, PromptMessage, ReadResourceResult,
    ResourceContents, ToolResult, ToolResultContent,
};
