//! Health check — verifies the working directory before a chat session.
//!
//! Checks credentials, data directories, the knowledge store, the MCP server
//! script and the system prompt. Only failures affect the exit status;
//! warnings and info lines are advisory.

use std::fmt;
use std::path::Path;

use crate::config::{AppConfig, EMBEDDING_KEY_ENV, MODEL_KEY_ENV};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Info,
    Warn,
    Fail,
}

impl CheckStatus {
    fn icon(self) -> &'static str {
        match self {
            Self::Pass => "✅",
            Self::Info => "ℹ️ ",
            Self::Warn => "⚠️ ",
            Self::Fail => "❌",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckItem {
    pub section: &'static str,
    pub status: CheckStatus,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub items: Vec<CheckItem>,
}

impl HealthReport {
    fn push(&mut self, section: &'static str, status: CheckStatus, message: impl Into<String>) {
        self.items.push(CheckItem {
            section,
            status,
            message: message.into(),
        });
    }

    pub fn passed(&self) -> bool {
        !self.items.iter().any(|item| item.status == CheckStatus::Fail)
    }

    pub fn failures(&self) -> usize {
        self.items.iter().filter(|item| item.status == CheckStatus::Fail).count()
    }

    /// Process exit code: 0 when nothing failed.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}\n电商售前智能助手 - 项目健康检查\n{rule}")?;

        let mut current = "";
        for item in &self.items {
            if item.section != current {
                current = item.section;
                writeln!(f, "\n[{current}]")?;
            }
            writeln!(f, "{} {}", item.status.icon(), item.message)?;
        }

        writeln!(f, "\n{rule}")?;
        if self.passed() {
            writeln!(f, "🎉 所有检查通过！项目可以正常运行。\n运行命令: sales-agent chat")?;
        } else {
            writeln!(f, "⚠️  {} 项检查失败，请先解决上述问题。", self.failures())?;
        }
        write!(f, "{rule}")
    }
}

// ─── Checks ─────────────────────────────────────────────────────────────────

/// Run every check. `dotenv` is the `.env` path found at startup, if any.
pub fn run(config: &AppConfig, dotenv: Option<&Path>) -> HealthReport {
    let mut report = HealthReport::default();
    check_credentials(&mut report, config, dotenv);
    check_directories(&mut report, config);
    check_runtime_files(&mut report, config);
    report
}

fn check_credentials(report: &mut HealthReport, config: &AppConfig, dotenv: Option<&Path>) {
    const SECTION: &str = "配置文件";
    match dotenv {
        Some(path) => report.push(SECTION, CheckStatus::Pass, format!(".env 文件存在: {}", path.display())),
        None => report.push(SECTION, CheckStatus::Warn, ".env 文件不存在 (将只使用进程环境变量)"),
    }

    if config.model.api_key.trim().is_empty() {
        report.push(SECTION, CheckStatus::Fail, format!("{MODEL_KEY_ENV} 未配置"));
    } else {
        report.push(SECTION, CheckStatus::Pass, format!("{MODEL_KEY_ENV} 已配置"));
    }

    if config.embedding.api_key.trim().is_empty() {
        report.push(
            SECTION,
            CheckStatus::Warn,
            format!("{EMBEDDING_KEY_ENV} 未配置 (知识库构建与检索不可用)"),
        );
    } else {
        report.push(SECTION, CheckStatus::Pass, format!("{EMBEDDING_KEY_ENV} 已配置"));
    }

    match config.source.as_deref() {
        Some(path) => report.push(SECTION, CheckStatus::Info, format!("配置文件: {}", path.display())),
        None => report.push(SECTION, CheckStatus::Info, "未找到 agent.yaml，使用默认配置"),
    }
}

fn check_directories(report: &mut HealthReport, config: &AppConfig) {
    const SECTION: &str = "目录结构";
    let paths = &config.paths;

    for (label, dir) in [("QA_txt", &paths.qa_dir), ("img", &paths.image_dir), ("video", &paths.video_dir)] {
        match std::fs::read_dir(dir) {
            Ok(entries) => {
                let entries: Vec<_> = entries.filter_map(Result::ok).collect();
                let detail = if label == "QA_txt" {
                    let txt = entries
                        .iter()
                        .filter(|e| e.path().extension().is_some_and(|ext| ext == "txt"))
                        .count();
                    format!("找到 {txt} 个问答文件")
                } else {
                    format!("包含 {} 个文件/子目录", entries.len())
                };
                report.push(SECTION, CheckStatus::Pass, format!("{label}/ 目录存在: {} ({detail})", dir.display()));
            }
            Err(_) => report.push(SECTION, CheckStatus::Warn, format!("{label}/ 目录不存在: {}", dir.display())),
        }
    }

    if paths.knowledge_db.exists() {
        report.push(SECTION, CheckStatus::Pass, format!("知识库存在: {}", paths.knowledge_db.display()));
    } else {
        report.push(
            SECTION,
            CheckStatus::Info,
            format!("知识库不存在: {} (运行 sales-agent build-kb 构建)", paths.knowledge_db.display()),
        );
    }

    for (label, dir) in [("logs", &paths.logs_dir), ("sessions", &paths.sessions_dir)] {
        if dir.is_dir() {
            report.push(SECTION, CheckStatus::Pass, format!("{label}/ 目录存在"));
        } else {
            report.push(SECTION, CheckStatus::Info, format!("{label}/ 目录不存在 (会在运行时自动创建)"));
        }
    }
}

fn check_runtime_files(report: &mut HealthReport, config: &AppConfig) {
    const SECTION: &str = "运行依赖";

    if config.paths.mcp_servers.exists() {
        report.push(
            SECTION,
            CheckStatus::Info,
            format!("使用自定义 MCP 配置: {}", config.paths.mcp_servers.display()),
        );
    } else {
        let script = config.mysql_server_script();
        if script.exists() {
            report.push(SECTION, CheckStatus::Pass, format!("MCP MySQL 服务脚本存在: {}", script.display()));
        } else {
            report.push(
                SECTION,
                CheckStatus::Warn,
                format!("MCP MySQL 服务脚本不存在: {} (数据库工具不可用)", script.display()),
            );
        }
    }

    if config.paths.system_prompt.exists() {
        report.push(SECTION, CheckStatus::Pass, "system_prompt.txt 存在");
    } else {
        report.push(SECTION, CheckStatus::Warn, "system_prompt.txt 不存在 (使用默认提示词)");
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path, model_key: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.base_dir = dir.to_path_buf();
        config.paths.resolve_against(dir);
        config.model.api_key = model_key.into();
        config.embedding.api_key = String::new();
        config
    }

    #[test]
    fn test_missing_model_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let report = run(&config_in(dir.path(), ""), None);
        assert!(!report.passed());
        assert_eq!(report.exit_code(), 1);
        assert!(report
            .items
            .iter()
            .any(|i| i.status == CheckStatus::Fail && i.message.contains("DEEPSEEK_API_KEY")));
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let report = run(&config_in(dir.path(), "sk-test"), None);
        assert!(report.passed());
        assert_eq!(report.exit_code(), 0);
        assert!(report.items.iter().any(|i| i.status == CheckStatus::Warn));
        assert!(report.to_string().contains("所有检查通过"));
    }

    #[test]
    fn test_counts_qa_files() {
        let dir = tempfile::tempdir().unwrap();
        let qa = dir.path().join("QA_txt");
        std::fs::create_dir(&qa).unwrap();
        std::fs::write(qa.join("a.txt"), "x").unwrap();
        std::fs::write(qa.join("b.txt"), "y").unwrap();
        std::fs::write(qa.join("c.md"), "z").unwrap();
        std::fs::write(dir.path().join(".env"), "DEEPSEEK_API_KEY=x").unwrap();

        let env = dir.path().join(".env");
        let report = run(&config_in(dir.path(), "sk-test"), Some(&env));
        assert!(report.items.iter().any(|i| i.message.contains("找到 2 个问答文件")));
        assert!(report.items.iter().any(|i| i.message.starts_with(".env 文件存在")));
    }
}
