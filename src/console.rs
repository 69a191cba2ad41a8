//! Operator console — the one line reader over stdin.
//!
//! The chat loop and the supervisor-approval tool both read operator input.
//! They share this reader so neither steals buffered lines from the other.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

pub struct Console {
    reader: Mutex<Box<dyn AsyncBufRead + Send + Unpin>>,
}

impl Console {
    /// Console over the process's stdin.
    pub fn stdin() -> Arc<Self> {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    /// Console over any buffered reader (tests, scripted input).
    pub fn from_reader<R>(reader: R) -> Arc<Self>
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        Arc::new(Self {
            reader: Mutex::new(Box::new(reader)),
        })
    }

    /// Print `prompt` without a newline, then read one line.
    ///
    /// Returns `None` at end of input. The trailing newline is stripped.
    pub async fn read_line(&self, prompt: &str) -> std::io::Result<Option<String>> {
        {
            let mut out = std::io::stdout().lock();
            write!(out, "{prompt}")?;
            out.flush()?;
        }

        let mut line = String::new();
        let n = self.reader.lock().await.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_lines_then_eof() {
        let console = Console::from_reader("55寸\r\n同意\n".as_bytes());
        assert_eq!(console.read_line("> ").await.unwrap().as_deref(), Some("55寸"));
        assert_eq!(console.read_line("> ").await.unwrap().as_deref(), Some("同意"));
        assert_eq!(console.read_line("> ").await.unwrap(), None);
    }
}
