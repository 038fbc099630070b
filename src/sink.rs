//! Persistence of extracted tokens, one file per source and run.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;

use crate::error::SinkError;

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[<>:/\\|?*]").expect("valid regex"));

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Store `tokens` (one per line) for `source_id`, returning where.
    async fn persist(&self, source_id: &str, tokens: &[String]) -> Result<PathBuf, SinkError>;
}

/// Writes `<dir>/<source>-<timestamp>.txt`.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_name(&self, source_id: &str) -> String {
        let prefix = UNSAFE_FILENAME_CHARS.replace_all(source_id, "_");
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
        format!("{}-{}.txt", prefix, timestamp)
    }
}

#[async_trait]
impl ResultSink for FileSink {
    async fn persist(&self, source_id: &str, tokens: &[String]) -> Result<PathBuf, SinkError> {
        let io_err = |path: &Path| {
            let path = path.display().to_string();
            move |source: std::io::Error| SinkError::Io { path, source }
        };

        fs::create_dir_all(&self.dir).await.map_err(io_err(&self.dir))?;

        let path = self.dir.join(self.file_name(source_id));
        fs::write(&path, tokens.join("\n"))
            .await
            .map_err(io_err(&path))?;

        info!("Data written to: {}", path.display());
        Ok(path)
    }
}
