use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sales_agent::agent_core::tool_router::preview;
use sales_agent::agent_core::{
    ConversationLoop, DispatchOutcome, LoopSettings, SessionStore, ToolRequest, ToolResultCache, ToolRouter,
    TurnObserver,
};
use sales_agent::config::{self, AppConfig};
use sales_agent::console::Console;
use sales_agent::inference::InferenceClient;
use sales_agent::knowledge::{
    build_media_kb, build_text_kb, Embedder, EmbeddingClient, MediaTagConfig, TextBuildReport, VectorStore,
};
use sales_agent::mcp_client::McpClient;
use sales_agent::tools::{
    pricing_tools, AskSupervisorApproval, KnowledgeIndex, SearchLocalKnowledge, SearchMedia, ToolCatalog,
};
use sales_agent::{health, init_tracing};

#[derive(Parser)]
#[command(name = "sales-agent")]
#[command(version, about = "Sales Agent - pre-sales assistant for all-in-one display quotes", long_about = None)]
struct Cli {
    /// Working directory holding QA_txt/, img/, video/, sessions/ and logs/
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Start an interactive chat session (default)
    Chat,
    /// Build the Q&A knowledge base from QA_txt/*.txt
    BuildKb,
    /// Index the img/ and video/ directories
    BuildMediaKb,
    /// Check credentials, directories and runtime files
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_dir = config::resolve_base_dir(cli.home);
    let dotenv = config::load_dotenv(&base_dir);
    let config = AppConfig::load(&base_dir).context("failed to load configuration")?;

    let command = cli.command.unwrap_or(Commands::Chat);
    if let Commands::Health = command {
        let report = health::run(&config, dotenv.as_deref());
        println!("{report}");
        std::process::exit(report.exit_code());
    }

    let log_path = init_tracing(&base_dir, &config.paths.logs_dir, &config.logging)
        .with_context(|| format!("failed to open log directory {}", config.paths.logs_dir.display()))?;
    if let Some(path) = &dotenv {
        tracing::info!(path = %path.display(), "loaded .env");
    }
    tracing::debug!(log_file = %log_path.display(), command = command_name(command), "dispatching command");

    match command {
        Commands::Chat => run_chat(&config).await,
        Commands::BuildKb => run_build_kb(&config).await,
        Commands::BuildMediaKb => run_build_media_kb(&config).await,
        Commands::Health => Ok(()),
    }
}

fn command_name(command: Commands) -> &'static str {
    match command {
        Commands::Chat => "chat",
        Commands::BuildKb => "build-kb",
        Commands::BuildMediaKb => "build-media-kb",
        Commands::Health => "health",
    }
}

// ─── Knowledge Builds ───────────────────────────────────────────────────────

async fn run_build_kb(config: &AppConfig) -> Result<()> {
    let embedder = EmbeddingClient::from_config(config.embedding.clone())?;
    let mut store = VectorStore::open(&config.paths.knowledge_db)?;

    println!("正在从 {} 构建知识库...", config.paths.qa_dir.display());
    match build_text_kb(&config.paths.qa_dir, &mut store, &embedder).await? {
        TextBuildReport::NoDocuments => println!("未找到任何问答文档，请检查 QA_txt 目录。"),
        TextBuildReport::AlreadyBuilt { existing } => {
            println!("知识库已存在 ({existing} 条记录)，跳过构建。")
        }
        TextBuildReport::Added { chunks } => println!("知识库构建完成，共写入 {chunks} 条记录。"),
    }
    Ok(())
}

async fn run_build_media_kb(config: &AppConfig) -> Result<()> {
    let embedder = EmbeddingClient::from_config(config.embedding.clone())?;
    let tags = MediaTagConfig::load(&config.paths.media_tags)?;
    let mut store = VectorStore::open(&config.paths.knowledge_db)?;

    println!("正在索引图片与视频...");
    let report = build_media_kb(
        &config.paths.image_dir,
        &config.paths.video_dir,
        &tags,
        &mut store,
        &embedder,
    )
    .await?;
    println!("媒体库构建完成：图片 {} 个，视频 {} 个。", report.images, report.videos);
    Ok(())
}

// ─── Chat ───────────────────────────────────────────────────────────────────

/// Prints turn progress to the console.
struct ConsoleObserver {
    preview_chars: usize,
}

impl TurnObserver for ConsoleObserver {
    fn on_thinking(&mut self, content: &str) {
        println!("\n> 思考过程:\n{content}\n");
    }

    fn on_tool_call(&mut self, request: &ToolRequest) {
        println!("🔧 调用工具: {}", request.name);
        println!("   参数: {}", request.arguments);
    }

    fn on_tool_result(&mut self, _request: &ToolRequest, outcome: &DispatchOutcome) {
        if let Some(text) = outcome.result_text() {
            let cached = if outcome.is_cached() { " (缓存)" } else { "" };
            println!("   结果{cached}: {}\n", preview(text, self.preview_chars));
        }
    }

    fn on_answer(&mut self, content: &str) {
        let rule = "-".repeat(50);
        println!("{rule}\nFinal Answer:\n{content}\n{rule}");
    }
}

fn open_knowledge_index(config: &AppConfig) -> Result<Arc<KnowledgeIndex>> {
    let store = match VectorStore::open(&config.paths.knowledge_db) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(
                path = %config.paths.knowledge_db.display(),
                error = %e,
                "knowledge store unavailable, using an empty in-memory store"
            );
            VectorStore::open_in_memory().context("failed to open in-memory knowledge store")?
        }
    };
    let embedder: Option<Box<dyn Embedder>> = match EmbeddingClient::from_config(config.embedding.clone()) {
        Ok(client) => Some(Box::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "embedding client unavailable, knowledge search disabled");
            None
        }
    };
    Ok(KnowledgeIndex::new(store, embedder))
}

async fn start_tool_servers(config: &AppConfig) -> McpClient {
    let mut mcp = McpClient::new(config.mcp_servers());
    mcp.set_call_timeout(config.agent.tool_call_timeout_ms);
    for (name, error) in mcp.start_all().await {
        tracing::warn!(server = %name, error = %error, "MCP server failed to start, skipping");
        println!("⚠️  MCP 服务 {name} 启动失败: {error}");
    }
    mcp
}

/// Numbered startup menu. Returns the session to resume, or `None` for new.
async fn choose_session(console: &Console, store: &SessionStore) -> Result<Option<String>> {
    let sessions = store.list();
    if sessions.is_empty() {
        return Ok(None);
    }

    println!("\n历史会话:");
    for (i, listing) in sessions.iter().enumerate() {
        println!(
            "  {}. {} (更新于 {}, {} 条消息)",
            i + 1,
            listing.session_id,
            listing.created_at,
            listing.message_count
        );
    }

    let choice = console
        .read_line("输入编号恢复会话，直接回车开始新会话: ")
        .await
        .context("failed to read session choice")?
        .unwrap_or_default();

    Ok(choice
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| sessions.get(i))
        .map(|listing| listing.session_id.clone()))
}

fn is_exit_keyword(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "exit" | "quit")
}

async fn run_chat(config: &AppConfig) -> Result<()> {
    config.require_model_key()?;
    let model = InferenceClient::from_config(config.model.clone())?;
    let console = Console::stdin();

    let mcp = start_tool_servers(config).await;
    let index = open_knowledge_index(config)?;
    let settings = &config.agent;

    let mut catalog = ToolCatalog::new(Some(mcp))
        .with(Box::new(SearchLocalKnowledge::new(index.clone(), settings.knowledge_top_k)))
        .with(Box::new(SearchMedia::new(index, settings.media_top_k)))
        .with(Box::new(AskSupervisorApproval::new(console.clone())));
    for tool in pricing_tools() {
        catalog.register(tool);
    }
    tracing::info!(tools = catalog.len(), model = %model.model_name(), "tool catalog ready");

    let router = ToolRouter::new(
        catalog,
        ToolResultCache::new(settings.query_cache_capacity, settings.schema_cache_capacity),
        settings.unknown_tool_policy,
    );
    let mut conversation = ConversationLoop::new(
        model,
        router,
        SessionStore::new(&config.paths.sessions_dir),
        config.system_prompt(),
        LoopSettings {
            window_size: settings.window_size,
            max_rounds: settings.max_tool_rounds,
        },
    );

    match choose_session(&console, conversation.store()).await? {
        Some(id) => conversation.resume_session(&id),
        None => conversation.start_new_session(),
    }
    println!("会话 ID: {} (输入 'exit' 或 'quit' 退出)", conversation.session_id());

    let mut observer = ConsoleObserver {
        preview_chars: settings.result_preview_chars,
    };

    loop {
        let input = match console.read_line("\nUser: ").await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read user input");
                break;
            }
        };
        if is_exit_keyword(&input) {
            break;
        }
        if input.trim().is_empty() {
            continue;
        }

        tracing::info!(session_id = %conversation.session_id(), input = %input, "user input");
        match conversation.run_turn(&input, &mut observer).await {
            Ok(outcome) if !outcome.persisted => println!("⚠️  会话保存失败，详见日志。"),
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                println!("对话处理出错: {e}");
            }
        }
    }

    if let Err(e) = conversation.save_if_started() {
        tracing::error!(error = %e, "failed to save session on exit");
        println!("⚠️  会话保存失败: {e}");
    }
    println!("再见！");

    let mut catalog = conversation.into_router().into_invoker();
    catalog.shutdown().await;
    tracing::info!("=== Sales Agent stopped ===");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_keywords() {
        assert!(is_exit_keyword("exit"));
        assert!(is_exit_keyword(" QUIT "));
        assert!(!is_exit_keyword("exit now"));
    }

    #[test]
    fn test_default_command_is_chat() {
        let cli = Cli::parse_from(["sales-agent", "--home", "/tmp/x"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/x")));
        let cli = Cli::parse_from(["sales-agent", "build-media-kb"]);
        assert!(matches!(cli.command, Some(Commands::BuildMediaKb)));
    }

    #[tokio::test]
    async fn test_choose_session_by_ordinal() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(choose_session(&Console::from_reader(&b"1\n"[..]), &store).await.unwrap().is_none());

        store.save("abc12345", &[], &Default::default()).unwrap();
        let picked = choose_session(&Console::from_reader(&b"1\n"[..]), &store).await.unwrap();
        assert_eq!(picked.as_deref(), Some("abc12345"));

        let picked = choose_session(&Console::from_reader(&b"\n"[..]), &store).await.unwrap();
        assert!(picked.is_none());
    }
}
