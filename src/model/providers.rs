use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{
    decode, Generation, InferenceRequest, ModelConfig, ModelInputs, ModelProvider, Role,
    VideoTransport, VisionLanguageModel, VisionPayload,
};
use crate::config::SamplingConfig;
use crate::error::{CaptionError, Result};
use crate::video::FrameSampler;

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const LOCAL_ENDPOINT: &str = "http://localhost:8000/v1/chat/completions";

/// Chat-completions client for OpenAI-compatible servers and the hosted OpenAI API
pub struct ChatCompletionsModel {
    config: ModelConfig,
    sampler: FrameSampler,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    echo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_special_tokens: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mm_processor_kwargs: Option<MmProcessorKwargs>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: UrlRef },
    VideoUrl { video_url: UrlRef },
}

#[derive(Debug, Serialize)]
struct UrlRef {
    url: String,
}

#[derive(Debug, Serialize)]
struct MmProcessorKwargs {
    fps: f64,
    max_frames: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

/// `.../v1/chat/completions` -> `.../v1/models`
fn models_url(endpoint: &str) -> String {
    match endpoint.strip_suffix("/chat/completions") {
        Some(base) => format!("{base}/models"),
        None => format!("{}/models", endpoint.trim_end_matches('/')),
    }
}

fn frame_data_uri(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

impl ChatCompletionsModel {
    pub fn new(config: ModelConfig, sampling: SamplingConfig) -> Result<Self> {
        if config.provider == ModelProvider::OpenAI && config.api_key.is_none() {
            return Err(CaptionError::Config("OpenAI API key required".to_string()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(seconds) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        let client = builder.build()?;

        Ok(Self {
            config,
            sampler: FrameSampler::new(sampling),
            client,
        })
    }

    fn endpoint(&self) -> &str {
        match (&self.config.endpoint, self.config.provider) {
            (Some(endpoint), _) => endpoint,
            (None, ModelProvider::OpenAI) => OPENAI_ENDPOINT,
            (None, ModelProvider::OpenAICompatible) => LOCAL_ENDPOINT,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(api_key) => request.bearer_auth(api_key),
            None => request,
        }
    }

    /// Chat template for one user turn: vision parts first, then the prompt
    fn build_request(&self, inputs: &ModelInputs, max_new_tokens: u32) -> ChatCompletionRequest {
        let mut content = Vec::new();
        let mut mm_processor_kwargs = None;

        match &inputs.vision {
            VisionPayload::Frames(frames) => {
                content.extend(frames.iter().map(|url| WirePart::ImageUrl {
                    image_url: UrlRef { url: url.clone() },
                }));
            }
            VisionPayload::VideoUrl {
                url,
                fps,
                max_frames,
            } => {
                content.push(WirePart::VideoUrl {
                    video_url: UrlRef { url: url.clone() },
                });
                mm_processor_kwargs = Some(MmProcessorKwargs {
                    fps: *fps,
                    max_frames: *max_frames,
                });
            }
        }

        content.push(WirePart::Text {
            text: inputs.prompt.clone(),
        });

        // Sampling extensions are only understood by self-hosted servers
        let self_hosted = self.config.provider == ModelProvider::OpenAICompatible;

        ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages: vec![WireMessage {
                role: Role::User,
                content,
            }],
            max_tokens: max_new_tokens,
            temperature: self.config.temperature,
            echo: self_hosted.then_some(false),
            skip_special_tokens: self_hosted.then_some(true),
            mm_processor_kwargs: mm_processor_kwargs.filter(|_| self_hosted),
        }
    }

    fn into_generation(response: ChatCompletionResponse, prompt: String) -> Result<Generation> {
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CaptionError::EmptyResponse("no choices with content".to_string()))?;

        let (prompt_tokens, completion_tokens) = response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((None, None));

        Ok(Generation {
            prompt,
            text,
            prompt_tokens,
            completion_tokens,
        })
    }
}

#[async_trait]
impl VisionLanguageModel for ChatCompletionsModel {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn provider_type(&self) -> ModelProvider {
        self.config.provider
    }

    async fn is_available(&self) -> bool {
        let url = models_url(self.endpoint());

        match self.authorize(self.client.get(&url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Availability probe to {} failed: {}", url, e);
                false
            }
        }
    }

    async fn prepare(&self, request: &InferenceRequest) -> Result<ModelInputs> {
        let video = request
            .video()
            .ok_or_else(|| CaptionError::InvalidRequest("request has no video part".to_string()))?;
        let prompt = request.text_prompt();

        let vision = match self.config.video_transport {
            VideoTransport::Frames => {
                let sampled = self
                    .sampler
                    .sample(Path::new(video.path), video.fps, video.max_frames)
                    .await?;
                VisionPayload::Frames(sampled.frames.iter().map(|f| frame_data_uri(f)).collect())
            }
            VideoTransport::VideoUrl => {
                let absolute = tokio::fs::canonicalize(video.path).await?;
                let url = Url::from_file_path(&absolute)
                    .map_err(|_| CaptionError::video(&absolute, "cannot be expressed as a file URL"))?;
                VisionPayload::VideoUrl {
                    url: url.to_string(),
                    fps: video.fps,
                    max_frames: video.max_frames,
                }
            }
        };

        Ok(ModelInputs { prompt, vision })
    }

    async fn generate(&self, inputs: ModelInputs, max_new_tokens: u32) -> Result<Generation> {
        let request = self.build_request(&inputs, max_new_tokens);
        let endpoint = self.endpoint();

        debug!(
            "Sending request to {} ({} content parts, max {} new tokens)",
            endpoint,
            request.messages.iter().map(|m| m.content.len()).sum::<usize>(),
            max_new_tokens
        );

        let response = self
            .authorize(self.client.post(endpoint))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CaptionError::Api { status, body });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let generation = Self::into_generation(completion, inputs.prompt)?;

        debug!(
            "Generation finished (prompt tokens: {:?}, completion tokens: {:?})",
            generation.prompt_tokens, generation.completion_tokens
        );

        Ok(generation)
    }

    fn decode(&self, generation: &Generation) -> String {
        decode::decode_generation(generation, &self.config.special_tokens)
    }
}
