//! Loading of the prompt list and the video path list

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Errors raised while reading an input document
#[derive(thiserror::Error, Debug)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no prompts found in {0}")]
    EmptyPrompts(PathBuf),
}

/// On-disk shape of the prompts document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsFile {
    #[serde(default)]
    pub prompts: Vec<String>,
}

/// On-disk shape of the video list document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoPathsFile {
    #[serde(default)]
    pub video_paths: Vec<String>,
}

/// Non-empty, immutable set of candidate prompts
#[derive(Debug, Clone)]
pub struct PromptSet {
    prompts: Vec<String>,
}

impl PromptSet {
    /// Returns `None` when `prompts` is empty
    pub fn new(prompts: Vec<String>) -> Option<Self> {
        if prompts.is_empty() {
            None
        } else {
            Some(Self { prompts })
        }
    }

    /// Draw one prompt uniformly at random
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        let index = rng.gen_range(0..self.prompts.len());
        &self.prompts[index]
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.prompts
    }
}

/// A single video to caption, identified only by its path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTask {
    pub path: String,
}

impl VideoTask {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.path)
    }

    /// Whether anything exists at the path
    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, InputError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    serde_json::from_str(&raw).map_err(|source| InputError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `{"prompts": [...]}`. An empty or missing list is an error.
pub async fn load_prompts(path: &Path) -> Result<PromptSet, InputError> {
    let file: PromptsFile = read_json(path).await?;
    let prompts = PromptSet::new(file.prompts)
        .ok_or_else(|| InputError::EmptyPrompts(path.to_path_buf()))?;

    info!("📝 Loaded {} prompts from {}", prompts.len(), path.display());
    Ok(prompts)
}

/// Load `{"video_paths": [...]}`. An empty or missing list is allowed.
pub async fn load_video_paths(path: &Path) -> Result<Vec<VideoTask>, InputError> {
    let file: VideoPathsFile = read_json(path).await?;

    if file.video_paths.is_empty() {
        debug!("Video list {} is empty", path.display());
    }

    Ok(file.video_paths.into_iter().map(VideoTask::new).collect())
}
