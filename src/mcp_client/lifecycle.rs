//! Server process lifecycle management.
//!
//! Handles spawning and shutting down MCP server child processes. Each
//! server runs as a separate OS process speaking JSON-RPC over stdio.

use std::collections::HashMap;
use std::time::Duration;

use tokio::process::{Child, Command};

use super::errors::McpError;
use super::transport::{extract_result, StdioTransport};
use super::types::{InitializeResult, ListToolsResult, McpToolDefinition, ServerConfig, PROTOCOL_VERSION};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the whole initialize → initialized → tools/list handshake.
///
/// `npx`-launched servers can spend a while resolving packages on first run.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for a killed child to be reaped.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Max stderr characters folded into an init error.
const STDERR_LIMIT: usize = 2000;

// ─── ManagedServer ───────────────────────────────────────────────────────────

/// A running MCP server process with its transport and tool definitions.
pub struct ManagedServer {
    pub name: String,
    process: Child,
    pub transport: StdioTransport,
    /// Tools reported by `tools/list` during the handshake.
    pub tools: Vec<McpToolDefinition>,
    /// `serverInfo.name` from `initialize`, if reported.
    pub server_label: Option<String>,
}

impl ManagedServer {
    /// Check if the server process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(None))
    }

    /// Kill the process and wait for it to exit.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.process.start_kill() {
            tracing::debug!(server = %self.name, error = %e, "kill failed (process already gone?)");
        }
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.process.wait()).await.is_err() {
            tracing::warn!(server = %self.name, "server did not exit after kill");
        }
    }
}

// ─── Spawning ────────────────────────────────────────────────────────────────

/// Spawn a single MCP server process and perform the initialization handshake.
pub async fn spawn_server(name: &str, config: &ServerConfig) -> Result<ManagedServer, McpError> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);
    cmd.envs(&config.env);
    if let Some(dir) = config.cwd.as_deref() {
        cmd.current_dir(dir);
    }

    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
        name: name.to_string(),
        reason: format!("{} {}: {e}", config.command, config.args.join(" ")),
    })?;

    let stdin = child.stdin.take().ok_or(McpError::SpawnFailed {
        name: name.to_string(),
        reason: "failed to capture stdin".into(),
    })?;
    let stdout = child.stdout.take().ok_or(McpError::SpawnFailed {
        name: name.to_string(),
        reason: "failed to capture stdout".into(),
    })?;
    let stderr_handle = child.stderr.take();

    let transport = StdioTransport::new(name, stdin, stdout);

    let handshake = match tokio::time::timeout(INIT_TIMEOUT, initialize(&transport, name)).await {
        Ok(Ok(handshake)) => handshake,
        Ok(Err(e)) => {
            let stderr_ctx = read_stderr_on_failure(stderr_handle).await;
            let _ = child.start_kill();
            return Err(McpError::InitFailed {
                name: name.to_string(),
                reason: format!("{e}{}", format_stderr_suffix(&stderr_ctx)),
            });
        }
        Err(_) => {
            let _ = child.start_kill();
            let stderr_ctx = read_stderr_on_failure(stderr_handle).await;
            return Err(McpError::InitFailed {
                name: name.to_string(),
                reason: format!(
                    "initialization timed out after {}s{}",
                    INIT_TIMEOUT.as_secs(),
                    format_stderr_suffix(&stderr_ctx)
                ),
            });
        }
    };

    // Drain stderr so a chatty server never blocks on a full pipe.
    if let Some(stderr) = stderr_handle {
        spawn_stderr_logger(name.to_string(), stderr);
    }

    tracing::info!(
        server = name,
        tools = handshake.tools.len(),
        server_info = handshake.server_label.as_deref().unwrap_or("-"),
        "MCP server ready"
    );

    Ok(ManagedServer {
        name: name.to_string(),
        process: child,
        transport,
        tools: handshake.tools,
        server_label: handshake.server_label,
    })
}

fn spawn_stderr_logger(name: String, stderr: tokio::process::ChildStderr) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %name, line = %line, "server stderr");
        }
    });
}

/// Read whatever stderr a failed server left behind.
async fn read_stderr_on_failure(stderr_handle: Option<tokio::process::ChildStderr>) -> String {
    use tokio::io::AsyncReadExt;

    let Some(mut stderr) = stderr_handle else {
        return String::new();
    };

    let mut buf = String::new();
    match tokio::time::timeout(Duration::from_millis(500), stderr.read_to_string(&mut buf)).await {
        Ok(Ok(_)) => truncate_chars(buf, STDERR_LIMIT),
        _ => String::new(),
    }
}

fn truncate_chars(text: String, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...(truncated)", &text[..cut]),
        None => text,
    }
}

/// Format a stderr suffix for error messages (empty string if no stderr).
fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

// ─── Handshake ───────────────────────────────────────────────────────────────

/// What the handshake learned about the server.
pub(crate) struct Handshake {
    pub tools: Vec<McpToolDefinition>,
    pub server_label: Option<String>,
}

/// `initialize` → `notifications/initialized` → `tools/list`.
pub(crate) async fn initialize(transport: &StdioTransport, server_name: &str) -> Result<Handshake, McpError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    });
    let result = extract_result(transport.request("initialize", Some(params)).await?)?;
    let init: InitializeResult = serde_json::from_value(result).map_err(|e| McpError::InitFailed {
        name: server_name.to_string(),
        reason: format!("failed to parse initialize response: {e}"),
    })?;
    tracing::debug!(
        server = server_name,
        protocol = init.protocol_version.as_deref().unwrap_or("-"),
        "initialize acknowledged"
    );

    transport.notify("notifications/initialized", None).await?;

    let result = extract_result(transport.request("tools/list", None).await?)?;
    let listed: ListToolsResult = serde_json::from_value(result).map_err(|e| McpError::InitFailed {
        name: server_name.to_string(),
        reason: format!("failed to parse tools/list response: {e}"),
    })?;

    Ok(Handshake {
        tools: listed.tools,
        server_label: init.server_info.and_then(|info| info.name),
    })
}

// ─── Batch Operations ────────────────────────────────────────────────────────

/// Spawn all configured servers concurrently.
///
/// Servers that fail to start are returned alongside their error; partial
/// startup is acceptable.
pub async fn spawn_all_servers(
    configs: &HashMap<String, ServerConfig>,
) -> (HashMap<String, ManagedServer>, Vec<(String, McpError)>) {
    let mut servers = HashMap::new();
    let mut errors = Vec::new();

    let handles: Vec<_> = configs
        .iter()
        .map(|(name, config)| {
            let name = name.clone();
            let config = config.clone();
            let handle = tokio::spawn({
                let name = name.clone();
                async move { spawn_server(&name, &config).await }
            });
            (name, handle)
        })
        .collect();

    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(server)) => {
                servers.insert(name, server);
            }
            Ok(Err(e)) => errors.push((name, e)),
            Err(e) => errors.push((
                name.clone(),
                McpError::SpawnFailed {
                    name,
                    reason: format!("join error: {e}"),
                },
            )),
        }
    }

    (servers, errors)
}

/// Shut down all managed servers.
pub async fn shutdown_all_servers(servers: &mut HashMap<String, ManagedServer>) {
    for server in servers.values_mut() {
        server.shutdown().await;
    }
    servers.clear();
}

// ─── Tests ───────────────────────────────────────────────────────────────────
