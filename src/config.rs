use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::{ModelConfig, ModelProvider};

/// Configuration file locations searched when none is given explicitly
pub const CONFIG_PATHS: [&str; 2] = ["video-captioner.toml", "config/video-captioner.toml"];

/// Configuration for the video captioner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model backend settings
    pub model: ModelConfig,

    /// Video frame sampling settings
    pub sampling: SamplingConfig,

    /// Output and logging settings
    pub output: OutputConfig,

    /// File the configuration was read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Target frames per second sampled from each video
    pub fps: f64,

    /// Upper bound on frames sampled from one video
    pub max_frames: u32,

    /// Frames are downscaled so neither side exceeds this (None = keep size)
    pub max_frame_side: Option<u32>,

    /// ffmpeg JPEG quality scale (2 = best, 31 = worst)
    pub jpeg_quality: u8,

    /// ffmpeg binary
    pub ffmpeg_path: String,

    /// ffprobe binary
    pub ffprobe_path: String,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            fps: 1.0,
            max_frames: 1024,
            max_frame_side: Some(768),
            jpeg_quality: 2,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JSONL file captions are appended to
    pub output_file: PathBuf,

    /// Where to write the JSON run summary (None = don't write one)
    pub summary_file: Option<PathBuf>,

    /// Default log level for the crate
    pub log_level: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_file: PathBuf::from("captions.jsonl"),
            summary_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the first file in
    /// [`CONFIG_PATHS`] that exists, then apply environment overrides.
    /// Runs before logging is installed, so it does not log; see [`Config::source`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::search_default_paths()?,
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn search_default_paths() -> Result<Self> {
        for candidate in CONFIG_PATHS {
            let candidate = Path::new(candidate);
            if candidate.exists() {
                return Self::from_file(candidate);
            }
        }

        Ok(Self::default())
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Override settings from `VIDEO_CAPTIONER_*` variables, looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("VIDEO_CAPTIONER_ENDPOINT") {
            self.model.endpoint = Some(endpoint);
        }

        if let Some(api_key) = lookup("VIDEO_CAPTIONER_API_KEY") {
            self.model.api_key = Some(api_key);
        }

        if let Some(model_name) = lookup("VIDEO_CAPTIONER_MODEL") {
            self.model.model_name = model_name;
        }

        if let Some(log_level) = lookup("VIDEO_CAPTIONER_LOG_LEVEL") {
            self.output.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.sampling.fps > 0.0 && self.sampling.fps.is_finite()) {
            return Err(anyhow!("fps must be a positive number, got {}", self.sampling.fps));
        }

        if self.sampling.max_frames == 0 {
            return Err(anyhow!("max_frames must be greater than 0"));
        }

        if self.model.max_new_tokens == 0 {
            return Err(anyhow!("max_new_tokens must be greater than 0"));
        }

        if self.model.model_name.trim().is_empty() {
            return Err(anyhow!("model_name must not be empty"));
        }

        if self.model.provider == ModelProvider::OpenAI && self.model.api_key.is_none() {
            return Err(anyhow!("API key required for the OpenAI provider"));
        }

        if self.output.output_file.as_os_str().is_empty() {
            return Err(anyhow!("output_file must not be empty"));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Video Captioner Configuration:\n\
            - Model: {}\n\
            - Provider: {:?}\n\
            - Endpoint: {}\n\
            - Max New Tokens: {}\n\
            - Sampling: {} fps, max {} frames\n\
            - Video Transport: {:?}\n\
            - Output File: {}",
            self.model.model_name,
            self.model.provider,
            self.model.endpoint.as_deref().unwrap_or("(provider default)"),
            self.model.max_new_tokens,
            self.sampling.fps,
            self.sampling.max_frames,
            self.model.video_transport,
            self.output.output_file.display(),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.config.sampling.fps = fps;
        self
    }

    pub fn with_max_frames(mut self, max_frames: u32) -> Self {
        self.config.sampling.max_frames = max_frames;
        self
    }

    pub fn with_output_file(mut self, path: PathBuf) -> Self {
        self.config.output.output_file = path;
        self
    }

    pub fn with_provider(mut self, provider: ModelProvider) -> Self {
        self.config.model.provider = provider;
        self
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.config.model.api_key = Some(api_key);
        self
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: u32) -> Self {
        self.config.model.max_new_tokens = max_new_tokens;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
