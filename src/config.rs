//! Application configuration loading.
//!
//! Resolution order:
//! 1. Base directory: `--home`, then `SALES_AGENT_HOME`, then the current dir
//! 2. `<base>/.env` loaded into the process environment (dotenvy)
//! 3. `agent.yaml` (or `SALES_AGENT_CONFIG`), with `${VAR}` / `${VAR:-default}`
//!    interpolation, layered over built-in defaults
//!
//! Relative paths in the `paths` section are resolved against the base dir.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::cache::{DEFAULT_QUERY_CACHE_CAPACITY, DEFAULT_SCHEMA_CACHE_CAPACITY};
use crate::agent_core::conversation::DEFAULT_MAX_TOOL_ROUNDS;
use crate::agent_core::tool_router::{UnknownToolPolicy, DEFAULT_PREVIEW_CHARS};
use crate::agent_core::window::DEFAULT_WINDOW_SIZE;
use crate::mcp_client::types::{McpServersConfig, ServerConfig};

// ─── Constants ───────────────────────────────────────────────────────────────

pub const HOME_ENV: &str = "SALES_AGENT_HOME";
pub const CONFIG_ENV: &str = "SALES_AGENT_CONFIG";
pub const MODEL_KEY_ENV: &str = "DEEPSEEK_API_KEY";
pub const EMBEDDING_KEY_ENV: &str = "DASHSCOPE_API_KEY";

const CONFIG_FILE: &str = "agent.yaml";

/// Used when `system_prompt.txt` is missing or empty.
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个智能数据库助手。";

/// Entry script of the MySQL MCP server, relative to its package dir.
pub const MYSQL_SERVER_SCRIPT: &str = "node_modules/@fhuang/mcp-mysql-server/build/index.js";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("{var} is not set; add it to .env or the environment")]
    MissingApiKey { var: String },
}

// ─── Sections ────────────────────────────────────────────────────────────────

/// Chat model endpoint (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".into(),
            model: "deepseek-chat".into(),
            api_key: std::env::var(MODEL_KEY_ENV).unwrap_or_default(),
            temperature: 0.0,
            max_tokens: None,
            request_timeout_secs: 120,
        }
    }
}

/// Embedding endpoint used by the knowledge base.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimensions: u32,
    pub api_key: String,
    pub batch_size: usize,
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".into(),
            model: "text-embedding-v4".into(),
            dimensions: 1024,
            api_key: std::env::var(EMBEDDING_KEY_ENV).unwrap_or_default(),
            batch_size: 10,
            request_timeout_secs: 60,
        }
    }
}

/// Conversation loop and tool dispatch tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub window_size: usize,
    pub max_tool_rounds: usize,
    pub query_cache_capacity: usize,
    pub schema_cache_capacity: usize,
    pub unknown_tool_policy: UnknownToolPolicy,
    pub tool_call_timeout_ms: u64,
    pub result_preview_chars: usize,
    pub knowledge_top_k: usize,
    pub media_top_k: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            query_cache_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
            schema_cache_capacity: DEFAULT_SCHEMA_CACHE_CAPACITY,
            unknown_tool_policy: UnknownToolPolicy::Report,
            tool_call_timeout_ms: 30_000,
            result_preview_chars: DEFAULT_PREVIEW_CHARS,
            knowledge_top_k: 3,
            media_top_k: 3,
        }
    }
}

/// File-system layout. Relative entries are resolved against the base dir.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub knowledge_db: PathBuf,
    pub qa_dir: PathBuf,
    pub image_dir: PathBuf,
    pub video_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub system_prompt: PathBuf,
    pub media_tags: PathBuf,
    pub mcp_servers: PathBuf,
    pub mysql_server_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            knowledge_db: "kb/knowledge.db".into(),
            qa_dir: "QA_txt".into(),
            image_dir: "img".into(),
            video_dir: "video".into(),
            sessions_dir: "sessions".into(),
            logs_dir: "logs".into(),
            system_prompt: "system_prompt.txt".into(),
            media_tags: "media_tags.yaml".into(),
            mcp_servers: "mcp-servers.json".into(),
            mysql_server_dir: "mcp-mysql-server".into(),
        }
    }
}

impl PathsConfig {
    pub(crate) fn resolve_against(&mut self, base: &Path) {
        for path in [
            &mut self.knowledge_db,
            &mut self.qa_dir,
            &mut self.image_dir,
            &mut self.video_dir,
            &mut self.sessions_dir,
            &mut self.logs_dir,
            &mut self.system_prompt,
            &mut self.media_tags,
            &mut self.mcp_servers,
            &mut self.mysql_server_dir,
        ] {
            let expanded = PathBuf::from(expand_tilde(&path.to_string_lossy()));
            *path = if expanded.is_absolute() {
                expanded
            } else {
                base.join(expanded)
            };
        }
    }
}

/// Log file rotation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub max_bytes: u64,
    pub backups: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            backups: 5,
        }
    }
}

// ─── AppConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub embedding: EmbeddingConfig,
    pub agent: AgentSettings,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
    /// Base directory everything else is resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
    /// Config file actually read, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration for `base_dir`. A missing config file yields defaults.
    pub fn load(base_dir: &Path) -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| base_dir.join(CONFIG_FILE));

        let mut config = if path.exists() {
            let mut config = Self::from_file(&path)?;
            config.source = Some(path);
            config
        } else {
            Self::default()
        };

        config.base_dir = base_dir.to_path_buf();
        config.paths.resolve_against(base_dir);
        Ok(config)
    }

    /// Parse a YAML config file after env-var interpolation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&raw).map_err(|reason| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason,
        })
    }

    fn from_yaml_str(raw: &str) -> Result<Self, String> {
        let interpolated = interpolate_env_vars(raw);
        if interpolated.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&interpolated).map_err(|e| e.to_string())
    }

    /// Fail unless the chat model has credentials.
    pub fn require_model_key(&self) -> Result<(), ConfigError> {
        if self.model.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey {
                var: MODEL_KEY_ENV.into(),
            });
        }
        Ok(())
    }

    /// Static instruction text: `system_prompt.txt`, or the built-in default.
    pub fn system_prompt(&self) -> String {
        match std::fs::read_to_string(&self.paths.system_prompt) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => DEFAULT_SYSTEM_PROMPT.to_string(),
            Err(e) => {
                tracing::warn!(
                    path = %self.paths.system_prompt.display(),
                    error = %e,
                    "system prompt not readable, using default"
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        }
    }

    /// Path of the default MySQL MCP server entry script.
    pub fn mysql_server_script(&self) -> PathBuf {
        self.paths.mysql_server_dir.join(MYSQL_SERVER_SCRIPT)
    }

    /// MCP servers to start: the override file if present, else the bundled
    /// MySQL server configured from `<mysql_server_dir>/env`.
    pub fn mcp_servers(&self) -> McpServersConfig {
        let mut config = load_override_file(&self.paths.mcp_servers).unwrap_or_else(|| {
            let env_file = self.paths.mysql_server_dir.join("env");
            let env = match std::fs::read_to_string(&env_file) {
                Ok(content) => parse_env_file(&content),
                Err(e) => {
                    tracing::warn!(path = %env_file.display(), error = %e, "MySQL MCP env file not readable");
                    HashMap::new()
                }
            };
            let server = ServerConfig {
                command: "node".into(),
                args: vec![self.mysql_server_script().to_string_lossy().into_owned()],
                env,
                cwd: None,
            };
            McpServersConfig {
                servers: HashMap::from([("mysql".to_string(), server)]),
            }
        });

        for server in config.servers.values_mut() {
            if let Some(cwd) = &server.cwd {
                if !Path::new(cwd).is_absolute() {
                    server.cwd = Some(self.base_dir.join(cwd).to_string_lossy().into_owned());
                }
            }
        }
        config
    }
}

/// Resolve the base directory from the CLI flag, `SALES_AGENT_HOME`, or cwd.
pub fn resolve_base_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var(HOME_ENV).ok().map(PathBuf::from))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load `<base>/.env` into the environment. Returns the path when found.
pub fn load_dotenv(base_dir: &Path) -> Option<PathBuf> {
    let path = base_dir.join(".env");
    match dotenvy::from_path(&path) {
        Ok(()) => Some(path),
        Err(_) => None,
    }
}

/// Load the optional `mcp-servers.json` override file.
fn load_override_file(path: &Path) -> Option<McpServersConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<McpServersConfig>(&content) {
        Ok(cfg) => {
            tracing::info!(path = %path.display(), count = cfg.servers.len(), "loaded MCP override config");
            Some(cfg)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse MCP override config");
            None
        }
    }
}

/// Parse dotenv-style `KEY=VALUE` content (quotes, `export`, `#` comments).
///
/// Lines dotenvy cannot parse are logged and skipped.
pub fn parse_env_file(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for item in dotenvy::from_read_iter(content.as_bytes()) {
        match item {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e) => tracing::warn!(error = %e, "skipping invalid env line"),
        }
    }
    vars
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let expr: String = chars.by_ref().take_while(|c| *c != '}').collect();
            result.push_str(&resolve_var_expr(&expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Unset and empty both take the default.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
