use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::captioner::CaptionSummary;
use crate::error::Result;

/// One caption line in the output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionRecord {
    pub model_name: String,
    pub text_prompt: String,
    pub response: String,
    pub video_path: String,
}

/// Append-only JSONL writer, flushed after every record
#[derive(Debug)]
pub struct CaptionWriter {
    path: PathBuf,
    file: File,
    written: usize,
}

async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

impl CaptionWriter {
    /// Open `path` for appending, creating it and its directory if needed
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent_dir(&path).await?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!("Appending captions to {}", path.display());

        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this writer
    pub fn written(&self) -> usize {
        self.written
    }

    /// Write one record as a single JSON line and flush it
    pub async fn append(&mut self, record: &CaptionRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        self.written += 1;
        Ok(())
    }
}

/// Write the run summary as pretty JSON, replacing any previous one
pub async fn write_summary(path: &Path, summary: &CaptionSummary) -> Result<()> {
    ensure_parent_dir(path).await?;
    let json = serde_json::to_string_pretty(summary)?;
    tokio::fs::write(path, json).await?;

    info!("💾 Summary saved to: {}", path.display());
    Ok(())
}
