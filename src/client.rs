//! Client side of a session: spawn (or attach to) a server, negotiate
//! capabilities, then issue tool calls, resource reads and prompt requests.

use std::ffi::OsStr;
use std::process::Stdio;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use crate::protocol::{
    GetPromptResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PromptGetParams,
    ReadResourceResult, ResourceReadParams, RpcId, ToolCallParams, ToolResult, PROTOCOL_VERSION,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to start server: {0}")]
    Spawn(std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid message from server: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Rpc(#[from] JsonRpcError),
    #[error("Server closed the connection")]
    Closed,
    #[error("Response to {0} carried neither result nor error")]
    EmptyResponse(String),
}

/// `serverInfo` from the `initialize` result.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// `initialize` result.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// A tool advertised by `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// A resource advertised by `resources/list` or `resources/templates/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceInfo {
    #[serde(alias = "uriTemplate")]
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A prompt advertised by `prompts/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptArgInfo {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Deserialize)]
struct ToolList {
    tools: Vec<ToolInfo>,
}

#[derive(Deserialize)]
struct ResourceList {
    resources: Vec<ResourceInfo>,
}

#[derive(Deserialize)]
struct ResourceTemplateList {
    #[serde(rename = "resourceTemplates")]
    resource_templates: Vec<ResourceInfo>,
}

#[derive(Deserialize)]
struct PromptList {
    prompts: Vec<PromptInfo>,
}

/// A session to a server spawned with piped stdio.
pub type StdioSession = ClientSession<BufReader<ChildStdout>, ChildStdin>;

/// Spawn `program` as a server and attach a session to its stdio.
///
/// The server's stderr is inherited. The child is killed if dropped.
pub fn spawn_server<I, S>(
    program: impl AsRef<OsStr>,
    args: I,
    envs: &[(String, String)],
) -> Result<(StdioSession, Child), ClientError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program.as_ref())
        .args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(ClientError::Spawn)?;

    let missing = |what: &str| {
        ClientError::Spawn(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("server {what} was not captured"),
        ))
    };
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

    info!(program = %program.as_ref().to_string_lossy(), "server spawned");
    Ok((ClientSession::new(BufReader::new(stdout), stdin), child))
}

/// One client-side session over newline-delimited JSON-RPC 2.0.
pub struct ClientSession<R, W> {
    reader: R,
    writer: W,
    next_id: i64,
    line: String,
}

impl<R, W> ClientSession<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            next_id: 1,
            line: String::new(),
        }
    }

    /// Handshake: `initialize` followed by the `notifications/initialized`
    /// notification.
    pub async fn initialize(&mut self) -> Result<InitializeResult, ClientError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "kb-mcp-client",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result: InitializeResult = self.request_as("initialize", Some(params)).await?;
        self.notify("notifications/initialized").await?;

        info!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            "session initialized"
        );
        Ok(result)
    }

    pub async fn list_tools(&mut self) -> Result<Vec<ToolInfo>, ClientError> {
        let list: ToolList = self.request_as("tools/list", None).await?;
        Ok(list.tools)
    }

    pub async fn list_resources(&mut self) -> Result<Vec<ResourceInfo>, ClientError> {
        let list: ResourceList = self.request_as("resources/list", None).await?;
        Ok(list.resources)
    }

    pub async fn list_resource_templates(&mut self) -> Result<Vec<ResourceInfo>, ClientError> {
        let list: ResourceTemplateList = self.request_as("resources/templates/list", None).await?;
        Ok(list.resource_templates)
    }

    pub async fn list_prompts(&mut self) -> Result<Vec<PromptInfo>, ClientError> {
        let list: PromptList = self.request_as("prompts/list", None).await?;
        Ok(list.prompts)
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolResult, ClientError> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        self.request_as("tools/call", Some(serde_json::to_value(params)?)).await
    }

    pub async fn read_resource(&mut self, uri: &str) -> Result<ReadResourceResult, ClientError> {
        let params = ResourceReadParams { uri: uri.to_string() };
        self.request_as("resources/read", Some(serde_json::to_value(params)?)).await
    }

    pub async fn get_prompt(
        &mut self,
        name: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> Result<GetPromptResult, ClientError> {
        let params = PromptGetParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        self.request_as("prompts/get", Some(serde_json::to_value(params)?)).await
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.request("ping", None).await.map(|_| ())
    }

    /// Send a request and wait for the response with the same id.
    pub async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let id = RpcId::Number(self.next_id);
        self.next_id += 1;

        self.send(&JsonRpcRequest::new(id.clone(), method, params)).await?;

        loop {
            let response = self.receive().await?;
            // Parse errors come back without an id.
            if response.id.is_none() {
                if let Some(error) = response.error {
                    return Err(error.into());
                }
            }
            if response.id.as_ref() != Some(&id) {
                debug!(?response.id, "skipping response for another request");
                continue;
            }
            if let Some(error) = response.error {
                return Err(error.into());
            }
            return response
                .result
                .ok_or_else(|| ClientError::EmptyResponse(method.to_string()));
        }
    }

    pub async fn notify(&mut self, method: &str) -> Result<(), ClientError> {
        self.send(&JsonRpcRequest::notification(method)).await
    }

    async fn request_as<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, ClientError> {
        let value = self.request(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn send(&mut self, message: &JsonRpcRequest) -> Result<(), ClientError> {
        let out = serde_json::to_string(message)?;
        debug!(method = %message.method, "sending");
        self.writer.write_all(out.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<JsonRpcResponse, ClientError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Err(ClientError::Closed);
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(serde_json::from_str(trimmed)?);
        }
    }
}
