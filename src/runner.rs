//! A complete captioning run, from the input files to the summary

use anyhow::Result;
use std::future::Future;
use std::path::Path;
use tracing::{error, info, warn};

use crate::captioner::{CaptionOptions, CaptionSession, CaptionSummary};
use crate::config::Config;
use crate::inputs::{load_prompts, load_video_paths};
use crate::model::VisionLanguageModel;
use crate::output::{write_summary, CaptionWriter};

/// How a run ended
#[derive(Debug)]
pub enum RunStatus {
    /// An input file was missing, malformed or had no prompts.
    /// Neither the model nor the output file was touched.
    InputsRejected,
    Completed(CaptionSummary),
}

/// Load both inputs, then the model, then caption every video.
///
/// `make_model` is only called once both input files have been read
/// successfully. Errors from it are fatal and returned as-is.
pub async fn run_captioning<F, Fut>(
    config: &Config,
    prompts_path: &Path,
    videos_path: &Path,
    seed: Option<u64>,
    make_model: F,
) -> Result<RunStatus>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = crate::error::Result<Box<dyn VisionLanguageModel>>>,
{
    match &config.source {
        Some(path) => info!("📄 Loaded configuration from: {}", path.display()),
        None => info!("📄 No configuration file found, using defaults"),
    }

    let prompts = match load_prompts(prompts_path).await {
        Ok(prompts) => prompts,
        Err(e) => {
            error!("Error loading prompts: {}", e);
            return Ok(RunStatus::InputsRejected);
        }
    };

    let tasks = match load_video_paths(videos_path).await {
        Ok(tasks) => tasks,
        Err(e) => {
            error!("Error loading video paths: {}", e);
            return Ok(RunStatus::InputsRejected);
        }
    };

    info!("🧠 Loading model {}...", config.model.model_name);
    let model = make_model().await?;

    let mut writer = CaptionWriter::open(&config.output.output_file).await?;
    info!("📂 Output file: {}", writer.path().display());

    let mut session = CaptionSession::new(model, prompts, CaptionOptions::from(config));
    if let Some(seed) = seed {
        session = session.with_seed(seed);
    }

    let summary = session.run(&tasks, &mut writer).await;

    info!("🎉 Captioning completed in {:.2}s", summary.elapsed_seconds);
    info!("✅ Written: {}", summary.written);
    info!("⏭️  Skipped: {}", summary.skipped);
    info!("❌ Failed: {}", summary.failed);
    info!("📊 Success rate: {:.1}%", summary.success_rate());

    if let Some(summary_file) = &config.output.summary_file {
        if let Err(e) = write_summary(summary_file, &summary).await {
            warn!("Failed to write summary to {}: {}", summary_file.display(), e);
        }
    }

    Ok(RunStatus::Completed(summary))
}
