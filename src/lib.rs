pub mod agent_core;
pub mod config;
pub mod console;
pub mod health;
pub mod inference;
pub mod knowledge;
pub mod mcp_client;
pub mod tools;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use config::LoggingConfig;

/// Log file name for a given day: `sales_agent_YYYYMMDD.log`.
pub fn log_file_name(date: chrono::NaiveDate) -> String {
    format!("sales_agent_{}.log", date.format("%Y%m%d"))
}

/// Initialize the tracing subscriber, writing structured logs under `logs_dir`.
///
/// Logs go to today's `sales_agent_YYYYMMDD.log` through a line-flushing
/// writer that rotates by size (`max_bytes`) into `.1` … `.{backups}`.
/// Returns the log file path.
pub fn init_tracing(base_dir: &Path, logs_dir: &Path, logging: &LoggingConfig) -> io::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    std::fs::create_dir_all(logs_dir)?;
    let log_path = logs_dir.join(log_file_name(chrono::Local::now().date_naive()));
    let writer = RotatingWriter::open(&log_path, logging.max_bytes, logging.backups)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sales_agent=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        base_dir = %base_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== Sales Agent starting ==="
    );
    Ok(log_path)
}

/// Rotate log files: `x.log` → `x.log.1` → `.2` → … → `.{keep}`.
///
/// The file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: usize) {
    if keep == 0 {
        let _ = std::fs::remove_file(base_path);
        return;
    }

    let numbered = |i: usize| format!("{}.{i}", base_path.display());
    let _ = std::fs::remove_file(numbered(keep));
    for i in (1..keep).rev() {
        let _ = std::fs::rename(numbered(i), numbered(i + 1));
    }
    if base_path.exists() {
        let _ = std::fs::rename(base_path, numbered(1));
    }
}

struct LogFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: usize,
}

impl LogFile {
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        rotate_log_file(&self.path, self.backups);
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

/// A size-rotating log writer that flushes after every write.
///
/// Each write is on disk immediately, so a crash never loses the last lines.
#[derive(Clone)]
struct RotatingWriter {
    inner: Arc<Mutex<LogFile>>,
}

impl RotatingWriter {
    fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            inner: Arc::new(Mutex::new(LogFile {
                path: path.to_path_buf(),
                file,
                written,
                max_bytes,
                backups,
            })),
        })
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, LogFile>> {
        self.inner
            .lock()
            .map_err(|e| io::Error::other(format!("lock poisoned: {e}")))
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut log = self.lock()?;
        if log.max_bytes > 0 && log.written > 0 && log.written + buf.len() as u64 > log.max_bytes {
            log.rotate()?;
        }
        let n = log.file.write(buf)?;
        log.file.flush()?;
        log.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
