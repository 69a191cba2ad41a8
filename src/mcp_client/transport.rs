//! Line-delimited JSON-RPC transport for MCP server pipes.
//!
//! Handles low-level communication with MCP server child processes:
//! - Writing JSON-RPC requests and notifications, one JSON object per line
//! - Reading lines until the response with the matching id arrives
//! - Skipping server log output and unrelated messages on stdout

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR};

// ─── Request ID Generator ────────────────────────────────────────────────────

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-wide request id; never reused.
pub fn next_request_id() -> u64 {
    REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport ───────────────────────────────────────────────────────────────

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

/// Bi-directional JSON-RPC transport over a pair of byte streams
/// (normally a child process's stdin/stdout).
pub struct StdioTransport {
    server_name: String,
    writer: Mutex<Writer>,
    reader: Mutex<Reader>,
}

impl StdioTransport {
    pub fn new<W, R>(server_name: &str, writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            server_name: server_name.to_string(),
            writer: Mutex::new(Box::new(writer)),
            reader: Mutex::new(BufReader::new(Box::new(reader))),
        }
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason,
        }
    }

    /// Serialize `message` and write it as one line.
    async fn write_line<T: Serialize>(&self, message: &T) -> Result<(), McpError> {
        let mut bytes =
            serde_json::to_vec(message).map_err(|e| self.transport_error(format!("encoding message: {e}")))?;
        bytes.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await.map_err(|e| self.transport_error(format!("writing stdin: {e}")))?;
        writer.flush().await.map_err(|e| self.transport_error(format!("flushing stdin: {e}")))
    }

    /// Write a request and block until the response carrying its id arrives.
    pub async fn request(&self, method: &str, params: Option<serde_json::Value>) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        self.write_line(&JsonRpcRequest::new(id, method, params)).await?;
        self.read_response(id).await
    }

    async fn read_response(&self, id: u64) -> Result<JsonRpcResponse, McpError> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader
                .read_line(&mut line)
                .await
                .map_err(|e| self.transport_error(format!("reading stdout: {e}")))?;
            if n == 0 {
                return Err(self.transport_error("stdout closed before a response arrived".into()));
            }

            // Log lines, server notifications and stale responses are skipped.
            let candidate = line.trim();
            if candidate.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(candidate) {
                Ok(resp) if resp.id == id => return Ok(resp),
                Ok(resp) => tracing::debug!(server = %self.server_name, expected = id, got = resp.id, "ignoring response for another request"),
                Err(_) => tracing::trace!(server = %self.server_name, line = candidate, "ignoring non-JSON-RPC line"),
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<(), McpError> {
        self.write_line(&JsonRpcNotification::new(method, params)).await
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// The `result` of a response, or its `error` as `McpError::ServerError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    match (response.result, response.error) {
        (_, Some(err)) => Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        }),
        (Some(result), None) => Ok(result),
        (None, None) => Err(McpError::ServerError {
            code: INTERNAL_ERROR,
            message: format!("response {} carried neither result nor error", response.id),
            data: None,
        }),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    #[test]
    fn test_request_ids_increase() {
        let first = next_request_id();
        assert!(next_request_id() > first);
    }

    #[tokio::test]
    async fn test_request_skips_noise_until_matching_id() {
        let (client_out, mut server_in) = duplex(4096);
        let (mut server_out, client_in) = duplex(4096);
        let transport = StdioTransport::new("mysql", client_out, client_in);

        let server = tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let n = server_in.read(&mut buf).await.unwrap();
            let req: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
            let id = req["id"].as_u64().unwrap();
            assert_eq!(req["method"], "tools/list");

            let reply = format!(
                "MySQL server running on stdio\n{{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":{{}}}}\n\n{{\"jsonrpc\":\"2.0\",\"id\":{id},\"result\":{{\"tools\":[]}}}}\n"
            );
            server_out.write_all(reply.as_bytes()).await.unwrap();
        });

        let resp = transport.request("tools/list", None).await.unwrap();
        assert_eq!(extract_result(resp).unwrap()["tools"], serde_json::json!([]));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_stdout_is_transport_error() {
        let (client_out, _server_in) = duplex(1024);
        let (server_out, client_in) = duplex(1024);
        drop(server_out);
        let transport = StdioTransport::new("mysql", client_out, client_in);

        let err = transport.request("initialize", None).await.unwrap_err();
        assert!(matches!(err, McpError::TransportError { .. }));
    }

    #[test]
    fn test_extract_result_shapes() {
        let ok: JsonRpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"result":{"tools":[]}}"#).unwrap();
        assert_eq!(extract_result(ok).unwrap(), serde_json::json!({"tools": []}));

        let failed: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":8,"error":{"code":-32602,"message":"Unknown table 尺寸表2"}}"#,
        )
        .unwrap();
        assert!(matches!(
            extract_result(failed),
            Err(McpError::ServerError { code: -32602, ref message, .. }) if message == "Unknown table 尺寸表2"
        ));

        let empty: JsonRpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":9}"#).unwrap();
        assert!(matches!(extract_result(empty), Err(McpError::ServerError { code: INTERNAL_ERROR, .. })));
    }
}
