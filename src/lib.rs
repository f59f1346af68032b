//! Video Captioner
//!
//! Batch caption generation for video files with a pretrained vision-language
//! model served over an OpenAI-compatible chat-completions API.

pub mod captioner;
pub mod config;
pub mod error;
pub mod inputs;
pub mod model;
pub mod output;
pub mod runner;
pub mod video;

// Re-export main types for easy access
pub use crate::captioner::{CaptionOptions, CaptionSession, CaptionSummary, ItemOutcome};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{CaptionError, Result};
pub use crate::inputs::{load_prompts, load_video_paths, InputError, PromptSet, VideoTask};
pub use crate::model::{
    create_model, load_model, Generation, InferenceRequest, ModelConfig, ModelInputs,
    ModelProvider, VideoTransport, VisionLanguageModel, VisionPayload,
};
pub use crate::output::{CaptionRecord, CaptionWriter};
pub use crate::runner::{run_captioning, RunStatus};
pub use crate::video::{FrameSampler, VideoInfo};
