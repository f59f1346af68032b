pub mod decode;
pub mod providers;
pub mod request;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SamplingConfig;
use crate::error::{CaptionError, Result};

pub use request::{ChatTurn, ContentPart, InferenceRequest, Role, VideoRef};

/// Model every caption is generated with unless configured otherwise
pub const DEFAULT_MODEL_NAME: &str = "Kwai-Keye/Keye-VL-1_5-8B";

/// Upper bound on newly generated tokens per video
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 1024;

/// Model backend types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelProvider {
    /// Self-hosted OpenAI-compatible server (vLLM, SGLang, LM Studio)
    OpenAICompatible,
    /// Hosted OpenAI API
    OpenAI,
}

/// How the video reaches the model server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VideoTransport {
    /// Sample JPEG frames locally and send them as images
    Frames,
    /// Send a `file://` URL and let the server sample frames
    VideoUrl,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub model_name: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub max_new_tokens: u32,
    pub temperature: f32,
    /// HTTP request timeout; generation is unbounded in time when unset
    pub timeout_seconds: Option<u64>,
    pub video_transport: VideoTransport,
    /// Markers stripped from generated text when the server leaves them in
    pub special_tokens: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::OpenAICompatible,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            endpoint: Some("http://localhost:8000/v1/chat/completions".to_string()),
            api_key: None,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: 0.0,
            timeout_seconds: None,
            video_transport: VideoTransport::Frames,
            special_tokens: vec![
                "<|im_end|>".to_string(),
                "<|endoftext|>".to_string(),
                "<|im_start|>".to_string(),
            ],
        }
    }
}

/// Vision part of the preprocessed model input
#[derive(Debug, Clone, PartialEq)]
pub enum VisionPayload {
    /// `data:image/jpeg;base64,...` URIs, in temporal order
    Frames(Vec<String>),
    /// Video reference for servers that do their own sampling
    VideoUrl { url: String, fps: f64, max_frames: u32 },
}

/// Request converted into what the model consumes
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputs {
    pub prompt: String,
    pub vision: VisionPayload,
}

/// Raw generation result before decoding
#[derive(Debug, Clone, Default)]
pub struct Generation {
    /// Prompt the generation answered
    pub prompt: String,
    /// Text as returned by the backend
    pub text: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

/// Trait for vision-language model backends
#[async_trait]
pub trait VisionLanguageModel: Send + Sync {
    /// Identifier written into every caption record
    fn model_name(&self) -> &str;

    fn provider_type(&self) -> ModelProvider;

    async fn is_available(&self) -> bool;

    /// Turn a conversation into model inputs (chat template + vision extraction)
    async fn prepare(&self, request: &InferenceRequest) -> Result<ModelInputs>;

    /// Generate at most `max_new_tokens` new tokens
    async fn generate(&self, inputs: ModelInputs, max_new_tokens: u32) -> Result<Generation>;

    /// Keep only newly generated text, without special tokens
    fn decode(&self, generation: &Generation) -> String {
        decode::decode_generation(generation, &[])
    }
}

/// Create model instance based on configuration
pub fn create_model(
    config: &ModelConfig,
    sampling: &SamplingConfig,
) -> Result<Box<dyn VisionLanguageModel>> {
    match config.provider {
        ModelProvider::OpenAICompatible | ModelProvider::OpenAI => Ok(Box::new(
            providers::ChatCompletionsModel::new(config.clone(), sampling.clone())?,
        )),
    }
}

/// Create the model and make sure the backend answers before any video is touched
pub async fn load_model(
    config: &ModelConfig,
    sampling: &SamplingConfig,
) -> Result<Box<dyn VisionLanguageModel>> {
    let model = create_model(config, sampling)?;

    if !model.is_available().await {
        return Err(CaptionError::Config(format!(
            "model backend {:?} is not available at {}",
            config.provider,
            config.endpoint.as_deref().unwrap_or("(provider default)")
        )));
    }

    info!(
        "✅ Model {} ready ({:?} provider)",
        model.model_name(),
        model.provider_type()
    );
    Ok(model)
}
