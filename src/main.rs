use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use video_captioner::{load_model, run_captioning, Config, RunStatus};

fn cli() -> Command {
    Command::new("Video Captioner")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Batch video captioning with a vision-language model")
        .arg(
            Arg::new("video_paths_json")
                .long("video_paths_json")
                .value_name("FILE")
                .help("JSON file with {\"video_paths\": [...]}")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("prompts_json")
                .long("prompts_json")
                .value_name("FILE")
                .help("JSON file with {\"prompts\": [...]}")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .value_name("FPS")
                .help("Frames per second sampled from each video [default: 1.0]")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("max_frames")
                .long("max_frames")
                .value_name("NUM")
                .help("Maximum frames sampled from each video [default: 1024]")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("output_file")
                .long("output_file")
                .value_name("FILE")
                .help("JSONL file captions are appended to [default: captions.jsonl]")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .value_name("URL")
                .help("Chat completions endpoint of the model server"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .help("Seed for prompt selection")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("summary_file")
                .long("summary_file")
                .value_name("FILE")
                .help("Write a JSON run summary to this file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
}

/// Command line flags win over the config file and environment
fn apply_cli_overrides(config: &mut Config, matches: &ArgMatches) {
    if let Some(fps) = matches.get_one::<f64>("fps") {
        config.sampling.fps = *fps;
    }
    if let Some(max_frames) = matches.get_one::<u32>("max_frames") {
        config.sampling.max_frames = *max_frames;
    }
    if let Some(output_file) = matches.get_one::<PathBuf>("output_file") {
        config.output.output_file = output_file.clone();
    }
    if let Some(endpoint) = matches.get_one::<String>("endpoint") {
        config.model.endpoint = Some(endpoint.clone());
    }
    if let Some(summary_file) = matches.get_one::<PathBuf>("summary_file") {
        config.output.summary_file = Some(summary_file.clone());
    }
}

fn init_logging(level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("video_captioner={level},warn")));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<PathBuf>("config");
    let mut config = Config::load(config_path.map(PathBuf::as_path))?;
    apply_cli_overrides(&mut config, &matches);

    init_logging(&config.output.log_level, matches.get_flag("verbose"));
    config.validate()?;

    info!("🎬 Video Captioner starting...");
    for line in config.summary().lines() {
        info!("{}", line);
    }

    let (Some(prompts_path), Some(videos_path)) = (
        matches.get_one::<PathBuf>("prompts_json"),
        matches.get_one::<PathBuf>("video_paths_json"),
    ) else {
        return Ok(ExitCode::FAILURE);
    };
    let seed = matches.get_one::<u64>("seed").copied();

    let status = run_captioning(&config, prompts_path, videos_path, seed, || {
        load_model(&config.model, &config.sampling)
    })
    .await?;

    match status {
        RunStatus::Completed(_) => Ok(ExitCode::SUCCESS),
        RunStatus::InputsRejected => Ok(ExitCode::FAILURE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_required_flags() {
        assert!(cli().try_get_matches_from(["video-captioner"]).is_err());
        assert!(cli()
            .try_get_matches_from(["video-captioner", "--prompts_json", "p.json"])
            .is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let matches = cli()
            .try_get_matches_from([
                "video-captioner",
                "--video_paths_json",
                "videos.json",
                "--prompts_json",
                "prompts.json",
                "--fps",
                "2.5",
                "--max_frames",
                "64",
                "--output_file",
                "out/captions.jsonl",
            ])
            .unwrap();

        let mut config = Config::default();
        apply_cli_overrides(&mut config, &matches);

        assert_eq!(config.sampling.fps, 2.5);
        assert_eq!(config.sampling.max_frames, 64);
        assert_eq!(config.output.output_file, PathBuf::from("out/captions.jsonl"));
        assert!(config.output.summary_file.is_none());
    }

    #[test]
    fn test_defaults_survive_without_flags() {
        let matches = cli()
            .try_get_matches_from([
                "video-captioner",
                "--video_paths_json",
                "videos.json",
                "--prompts_json",
                "prompts.json",
            ])
            .unwrap();

        let mut config = Config::default();
        apply_cli_overrides(&mut config, &matches);

        assert_eq!(config.sampling.fps, 1.0);
        assert_eq!(config.sampling.max_frames, 1024);
        assert_eq!(config.output.output_file, PathBuf::from("captions.jsonl"));
    }
}
