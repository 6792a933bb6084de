use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::handlers;
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::registry::Registry;

/// Maximum bytes per JSON-RPC message (1 MiB).
const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// MCP server that communicates using newline-delimited JSON-RPC 2.0.
///
/// One session, one request at a time: the next line is read only after the
/// current response has been written.
pub struct McpServer {
    registry: Arc<Registry>,
    initialized: bool,
}

impl McpServer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            initialized: false,
        }
    }

    /// Serve over the process's stdin/stdout until stdin closes.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve one session over any line reader and writer until the reader ends.
    pub async fn serve<R, W>(
        &mut self,
        mut reader: R,
        mut writer: W,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(server = self.registry.server_name(), "session started");
        let mut raw = Vec::new();

        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw).await? == 0 {
                break;
            }

            let req = match decode_line(&raw) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(rejection) => {
                    write_response(&mut writer, &rejection).await?;
                    continue;
                }
            };

            // Only `initialize` passes before the handshake.
            if !self.initialized && req.method != "initialize" {
                if req.id.is_some() {
                    let error = JsonRpcError::invalid_request_with("Server not initialized");
                    write_response(&mut writer, &JsonRpcResponse::error(req.id, error)).await?;
                }
                continue;
            }

            debug!(method = %req.method, id = ?req.id, "request");
            if let Some(resp) = handlers::dispatch(&req, &self.registry).await {
                write_response(&mut writer, &resp).await?;
            }

            if req.method == "initialize" {
                self.initialized = true;
            }
        }

        info!("session ended");
        Ok(())
    }
}

/// Turn one raw line into a request.
///
/// `Ok(None)` for blank lines. Oversized, non-UTF-8 and unparsable lines
/// become a parse error without an id; a wrong `jsonrpc` version becomes an
/// invalid-request error for that id.
fn decode_line(raw: &[u8]) -> Result<Option<JsonRpcRequest>, JsonRpcResponse> {
    let parse_error = || JsonRpcResponse::error(None, JsonRpcError::parse_error());

    if raw.len() > MAX_MESSAGE_BYTES {
        warn!("Message too large: {} bytes (limit {MAX_MESSAGE_BYTES})", raw.len());
        return Err(parse_error());
    }

    let text = std::str::from_utf8(raw).map_err(|e| {
        warn!("Message is not UTF-8: {e}");
        parse_error()
    })?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let req: JsonRpcRequest = serde_json::from_str(trimmed).map_err(|e| {
        warn!("Parse error: {e}");
        parse_error()
    })?;

    if req.jsonrpc != "2.0" {
        return Err(JsonRpcResponse::error(req.id, JsonRpcError::invalid_request()));
    }
    Ok(Some(req))
}

async fn write_response<W>(
    writer: &mut W,
    resp: &JsonRpcResponse,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    W: AsyncWrite + Unpin,
{
    let out = serde_json::to_string(resp)?;
    writer.write_all(out.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_skipped() {
        assert!(decode_line(b"  \r\n").unwrap().is_none());
    }

    #[test]
    fn oversized_and_invalid_lines_are_parse_errors() {
        let oversized = vec![b' '; MAX_MESSAGE_BYTES + 1];
        let lines: [&[u8]; 3] = [&oversized, b"\xff\xfe\n", b"{\"jsonrpc\":\n"];
        for line in lines {
            let rejection = decode_line(line).unwrap_err();
            assert!(rejection.id.is_none());
            assert_eq!(rejection.error.unwrap().code, JsonRpcError::PARSE_ERROR);
        }
    }

    #[test]
    fn wrong_version_keeps_request_id() {
        let rejection = decode_line(br#"{"jsonrpc":"1.0","id":4,"method":"ping"}"#).unwrap_err();
        assert_eq!(rejection.id, Some(crate::protocol::RpcId::Number(4)));
        assert_eq!(rejection.error.unwrap().code, JsonRpcError::INVALID_REQUEST);
    }

    #[test]
    fn valid_line_decodes() {
        let req = decode_line(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
            .unwrap()
            .unwrap();
        assert_eq!(req.method, "ping");
    }
}
