use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SamplingConfig;
use crate::error::{CaptionError, Result};

/// Fewest frames handed to the model for any video that has them
pub const MIN_FRAMES: usize = 4;

/// Frame counts are rounded down to a multiple of this
pub const FRAME_FACTOR: usize = 2;

/// Video stream information extracted with ffprobe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub duration: Duration,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: u64,
}

/// JPEG frames sampled from one video
#[derive(Debug, Clone)]
pub struct SampledFrames {
    pub info: VideoInfo,
    /// Effective sampling rate used to spread frames across the video
    pub sample_fps: f64,
    pub frames: Vec<Vec<u8>>,
}

/// Number of frames to sample from a video.
///
/// The wanted count is `duration * fps`, clamped to
/// `[MIN_FRAMES, min(max_frames, total_frames)]` and rounded down to a
/// multiple of [`FRAME_FACTOR`]. Never returns less than `FRAME_FACTOR`.
pub fn frame_budget(duration_secs: f64, total_frames: u64, fps: f64, max_frames: u32) -> usize {
    let available = usize::try_from(total_frames.max(1)).unwrap_or(usize::MAX);
    let upper = (max_frames.max(1) as usize).min(available);
    let lower = MIN_FRAMES.min(upper);

    let wanted = (duration_secs.max(0.0) * fps.max(0.0)).round() as usize;
    let clamped = wanted.clamp(lower, upper);

    let rounded = clamped / FRAME_FACTOR * FRAME_FACTOR;
    rounded.max(FRAME_FACTOR)
}

/// Parse a rate like `30000/1001` or `25`
fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => rate.parse().ok(),
    }
}

/// Build [`VideoInfo`] from `ffprobe -print_format json` output
pub fn parse_probe_output(path: &Path, json: &str) -> Result<VideoInfo> {
    let data: serde_json::Value = serde_json::from_str(json)?;

    let video_stream = data["streams"]
        .as_array()
        .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
        .ok_or_else(|| CaptionError::video(path, "no video stream found"))?;

    let duration_secs = video_stream["duration"]
        .as_str()
        .or_else(|| data["format"]["duration"].as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video_stream["avg_frame_rate"]
        .as_str()
        .and_then(parse_rate)
        .filter(|fps| *fps > 0.0)
        .or_else(|| video_stream["r_frame_rate"].as_str().and_then(parse_rate))
        .unwrap_or(0.0);

    let duration = Duration::try_from_secs_f64(duration_secs.max(0.0))
        .map_err(|e| CaptionError::video(path, format!("invalid duration {duration_secs}: {e}")))?;

    let total_frames = video_stream["nb_frames"]
        .as_str()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or_else(|| (duration_secs * fps).round() as u64);

    Ok(VideoInfo {
        path: path.to_path_buf(),
        duration,
        width: video_stream["width"].as_u64().unwrap_or(0) as u32,
        height: video_stream["height"].as_u64().unwrap_or(0) as u32,
        fps,
        total_frames,
    })
}

/// ffmpeg `-vf` filter chain for sampling at `sample_fps`
pub fn sampling_filter(sample_fps: f64, max_side: Option<u32>) -> String {
    let mut filter = format!("fps={sample_fps:.6}");
    if let Some(side) = max_side {
        filter.push_str(&format!(
            ",scale=w='min(iw,{side})':h='min(ih,{side})':force_original_aspect_ratio=decrease:force_divisible_by=2"
        ));
    }
    filter
}

/// Decodes sampled video frames with the ffprobe/ffmpeg command line tools
#[derive(Debug, Clone)]
pub struct FrameSampler {
    config: SamplingConfig,
}

impl FrameSampler {
    pub fn new(config: SamplingConfig) -> Self {
        Self { config }
    }

    /// Probe the first video stream
    pub async fn probe(&self, video_path: &Path) -> Result<VideoInfo> {
        let output = tokio::process::Command::new(&self.config.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(video_path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(CaptionError::video(video_path, "ffprobe failed"));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let info = parse_probe_output(video_path, &json)?;

        debug!(
            "📹 Probed {}: {}x{}, {:.2}fps, {:.1}s, {} frames",
            video_path.display(),
            info.width,
            info.height,
            info.fps,
            info.duration.as_secs_f64(),
            info.total_frames
        );

        Ok(info)
    }

    /// Sample frames spread uniformly across the whole video
    pub async fn sample(&self, video_path: &Path, fps: f64, max_frames: u32) -> Result<SampledFrames> {
        let info = self.probe(video_path).await?;
        let duration_secs = info.duration.as_secs_f64();
        let count = frame_budget(duration_secs, info.total_frames, fps, max_frames);

        let sample_fps = if duration_secs > 0.0 {
            count as f64 / duration_secs
        } else {
            fps
        };

        let frame_dir = tempfile::Builder::new()
            .prefix("video-captioner-")
            .tempdir()?;
        let pattern = frame_dir.path().join("frame_%05d.jpg");

        let output = tokio::process::Command::new(&self.config.ffmpeg_path)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(video_path)
            .arg("-vf")
            .arg(sampling_filter(sample_fps, self.config.max_frame_side))
            .arg("-frames:v")
            .arg(count.to_string())
            .arg("-q:v")
            .arg(self.config.jpeg_quality.to_string())
            .arg("-y")
            .arg(&pattern)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptionError::video(
                video_path,
                format!("ffmpeg frame extraction failed: {}", stderr.trim()),
            ));
        }

        let frames = read_frames(frame_dir.path()).await?;
        if frames.is_empty() {
            return Err(CaptionError::video(video_path, "ffmpeg produced no frames"));
        }

        info!(
            "🎞️  Sampled {} frames from {} ({:.3} fps)",
            frames.len(),
            video_path.display(),
            sample_fps
        );

        Ok(SampledFrames {
            info,
            sample_fps,
            frames,
        })
    }
}

/// Read every `.jpg` in `dir`, ordered by file name
async fn read_frames(dir: &Path) -> Result<Vec<Vec<u8>>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("jpg") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        frames.push(tokio::fs::read(&path).await?);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_frame_budget_follows_fps() {
        assert_eq!(frame_budget(10.0, 300, 1.0, 1024), 10);
        assert_eq!(frame_budget(10.0, 300, 2.0, 1024), 20);
    }

    #[test]
    fn test_frame_budget_minimum() {
        // 2s at 1fps would give 2 frames, raised to the minimum
        assert_eq!(frame_budget(2.0, 60, 1.0, 1024), 4);
        assert_eq!(frame_budget(0.0, 60, 1.0, 1024), 4);
    }

    #[test]
    fn test_frame_budget_capped_by_max_frames() {
        assert_eq!(frame_budget(3000.0, 90_000, 1.0, 1024), 1024);
        assert_eq!(frame_budget(3000.0, 90_000, 1.0, 7), 6);
    }

    #[test]
    fn test_frame_budget_capped_by_available_frames() {
        assert_eq!(frame_budget(0.1, 3, 1.0, 1024), 2);
        assert_eq!(frame_budget(100.0, 9, 1.0, 1024), 8);
    }

    #[test]
    fn test_frame_budget_never_below_factor() {
        assert_eq!(frame_budget(0.04, 1, 1.0, 1024), FRAME_FACTOR);
        assert_eq!(frame_budget(10.0, 300, 1.0, 1), FRAME_FACTOR);
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("0/0"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "width": 1920, "height": 1080,
                 "avg_frame_rate": "30/1", "r_frame_rate": "30/1",
                 "duration": "12.5", "nb_frames": "375"}
            ],
            "format": {"duration": "12.6"}
        }"#;

        let info = parse_probe_output(Path::new("clip.mp4"), json).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert_eq!(info.fps, 30.0);
        assert_eq!(info.total_frames, 375);
        assert_eq!(info.duration, Duration::from_secs_f64(12.5));
    }

    #[test]
    fn test_parse_probe_output_estimates_frames() {
        let json = r#"{
            "streams": [{"codec_type": "video", "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}],
            "format": {"duration": "4.0"}
        }"#;

        let info = parse_probe_output(Path::new("clip.webm"), json).unwrap();
        assert_eq!(info.fps, 25.0);
        assert_eq!(info.total_frames, 100);
    }

    #[test]
    fn test_parse_probe_output_without_video_stream() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        let err = parse_probe_output(Path::new("song.mp3"), json).unwrap_err();
        assert!(matches!(err, CaptionError::Video { .. }));
    }

    #[test]
    fn test_parse_probe_output_infinite_duration() {
        let json = r#"{
            "streams": [{"codec_type": "video", "avg_frame_rate": "25/1", "duration": "inf"}],
            "format": {}
        }"#;
        let err = parse_probe_output(Path::new("live.ts"), json).unwrap_err();
        assert!(matches!(err, CaptionError::Video { .. }));
    }

    #[test]
    fn test_sampling_filter() {
        assert_eq!(sampling_filter(0.5, None), "fps=0.500000");
        let scaled = sampling_filter(1.0, Some(768));
        assert!(scaled.starts_with("fps=1.000000,scale="));
        assert!(scaled.contains("min(iw,768)"));
    }

    #[tokio::test]
    async fn test_read_frames_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("frame_00002.jpg"), b"two").await.unwrap();
        tokio::fs::write(dir.path().join("frame_00001.jpg"), b"one").await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"skip").await.unwrap();

        let frames = read_frames(dir.path()).await.unwrap();
        assert_eq!(frames, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[tokio::test]
    async fn test_probe_missing_binary_fails() {
        let sampler = FrameSampler::new(SamplingConfig {
            ffprobe_path: "/nonexistent/ffprobe".to_string(),
            ..SamplingConfig::default()
        });
        assert!(sampler.probe(Path::new("clip.mp4")).await.is_err());
    }
}
