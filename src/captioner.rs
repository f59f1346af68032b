use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::inputs::{PromptSet, VideoTask};
use crate::model::{InferenceRequest, VisionLanguageModel, DEFAULT_MAX_NEW_TOKENS};
use crate::output::{CaptionRecord, CaptionWriter};

/// Per-run generation settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionOptions {
    pub fps: f64,
    pub max_frames: u32,
    pub max_new_tokens: u32,
}

impl Default for CaptionOptions {
    fn default() -> Self {
        Self {
            fps: 1.0,
            max_frames: 1024,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
        }
    }
}

impl From<&Config> for CaptionOptions {
    fn from(config: &Config) -> Self {
        Self {
            fps: config.sampling.fps,
            max_frames: config.sampling.max_frames,
            max_new_tokens: config.model.max_new_tokens,
        }
    }
}

/// What happened to one video
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Written { record: CaptionRecord },
    Skipped { video_path: String, reason: String },
    Failed { video_path: String, error: String },
}

impl ItemOutcome {
    pub fn video_path(&self) -> &str {
        match self {
            Self::Written { record } => &record.video_path,
            Self::Skipped { video_path, .. } | Self::Failed { video_path, .. } => video_path,
        }
    }
}

/// Overall results of one captioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionSummary {
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub outcomes: Vec<ItemOutcome>,
}

impl CaptionSummary {
    fn from_outcomes(outcomes: Vec<ItemOutcome>, started_at: DateTime<Utc>, elapsed_seconds: f64) -> Self {
        let count = |pred: fn(&ItemOutcome) -> bool| outcomes.iter().filter(|o| pred(o)).count();
        let written = count(|o| matches!(o, ItemOutcome::Written { .. }));
        let skipped = count(|o| matches!(o, ItemOutcome::Skipped { .. }));
        let failed = count(|o| matches!(o, ItemOutcome::Failed { .. }));

        Self {
            total: outcomes.len(),
            written,
            skipped,
            failed,
            started_at,
            finished_at: Utc::now(),
            elapsed_seconds,
            outcomes,
        }
    }

    /// Share of attempted videos that produced a caption, in percent
    pub fn success_rate(&self) -> f64 {
        let attempted = self.written + self.failed;
        if attempted > 0 {
            self.written as f64 / attempted as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// Owns the model and prompts for the lifetime of a run.
/// Videos are captioned strictly one after another.
pub struct CaptionSession {
    model: Box<dyn VisionLanguageModel>,
    prompts: PromptSet,
    options: CaptionOptions,
    rng: StdRng,
}

impl CaptionSession {
    pub fn new(model: Box<dyn VisionLanguageModel>, prompts: PromptSet, options: CaptionOptions) -> Self {
        Self {
            model,
            prompts,
            options,
            rng: StdRng::from_entropy(),
        }
    }

    /// Make prompt selection reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Select a prompt, run the model and decode the answer for one video
    pub async fn caption_video(&mut self, task: &VideoTask) -> Result<CaptionRecord> {
        let prompt = self.prompts.choose(&mut self.rng).to_string();
        debug!("💬 Prompt for {}: {}", task.path, prompt);

        let request = InferenceRequest::for_video(
            &task.path,
            &prompt,
            self.options.fps,
            self.options.max_frames,
        );

        let inputs = self.model.prepare(&request).await?;
        let generation = self
            .model
            .generate(inputs, self.options.max_new_tokens)
            .await?;
        let response = self.model.decode(&generation);

        Ok(CaptionRecord {
            model_name: self.model.model_name().to_string(),
            text_prompt: prompt,
            response,
            video_path: task.path.clone(),
        })
    }

    /// Caption one video and append its record, reporting the outcome
    pub async fn process(&mut self, task: &VideoTask, writer: &mut CaptionWriter) -> ItemOutcome {
        if !task.exists().await {
            warn!("File not found: {}, skipping.", task.path);
            return ItemOutcome::Skipped {
                video_path: task.path.clone(),
                reason: "file not found".to_string(),
            };
        }

        let written = match self.caption_video(task).await {
            Ok(record) => writer.append(&record).await.map(|_| record),
            Err(e) => Err(e),
        };

        match written {
            Ok(record) => {
                info!("✅ Processed: {}", task.path);
                ItemOutcome::Written { record }
            }
            Err(e) => {
                error!("❌ Error processing {}: {}", task.path, e);
                ItemOutcome::Failed {
                    video_path: task.path.clone(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Process every task in order and collect the outcomes
    pub async fn run(&mut self, tasks: &[VideoTask], writer: &mut CaptionWriter) -> CaptionSummary {
        let started_at = Utc::now();
        let start_time = Instant::now();

        info!("🚀 Starting captioning for {} videos...", tasks.len());

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            debug!("📹 Video {}/{}: {}", index + 1, tasks.len(), task.path);
            outcomes.push(self.process(task, writer).await);
        }

        CaptionSummary::from_outcomes(outcomes, started_at, start_time.elapsed().as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(video: &str) -> ItemOutcome {
        ItemOutcome::Written {
            record: CaptionRecord {
                model_name: "m".to_string(),
                text_prompt: "p".to_string(),
                response: "r".to_string(),
                video_path: video.to_string(),
            },
        }
    }

    #[test]
    fn test_summary_counts() {
        let outcomes = vec![
            written("a.mp4"),
            ItemOutcome::Skipped {
                video_path: "b.mp4".to_string(),
                reason: "file not found".to_string(),
            },
            ItemOutcome::Failed {
                video_path: "c.mp4".to_string(),
                error: "boom".to_string(),
            },
            written("d.mp4"),
        ];

        let summary = CaptionSummary::from_outcomes(outcomes, Utc::now(), 1.5);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.written, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert!((summary.success_rate() - 66.666).abs() < 0.01);
        assert_eq!(summary.outcomes[2].video_path(), "c.mp4");
    }

    #[test]
    fn test_empty_summary() {
        let summary = CaptionSummary::from_outcomes(Vec::new(), Utc::now(), 0.0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[test]
    fn test_outcome_serialization() {
        let value = serde_json::to_value(ItemOutcome::Skipped {
            video_path: "b.mp4".to_string(),
            reason: "file not found".to_string(),
        })
        .unwrap();
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["video_path"], "b.mp4");
    }

    #[test]
    fn test_options_from_config() {
        let config = crate::config::ConfigBuilder::new()
            .with_fps(2.0)
            .with_max_frames(32)
            .build();
        let options = CaptionOptions::from(&config);
        assert_eq!(options.fps, 2.0);
        assert_eq!(options.max_frames, 32);
        assert_eq!(options.max_new_tokens, 1024);
    }
}
