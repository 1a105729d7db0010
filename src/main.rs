//! Redub - Automated Video Dubbing Workflow
//!
//! This is the main entry point for the redub application, which re-dubs
//! video files into other spoken languages using speech-to-text, machine
//! translation, text-to-speech, and ffmpeg.

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use redub::cli::{parse_language_list, Args, Commands};
use redub::config::Config;
use redub::workflow::{RunContext, Workflow};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    // Load configuration
    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load config.toml from current directory first
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    // Create workflow instance
    let workflow = Workflow::new(config)?;

    // Execute command
    match args.command {
        Commands::Dub {
            input,
            source_lang,
            target_langs,
            output_dir,
        } => {
            let target_langs = parse_language_list(&target_langs);
            let ctx = RunContext::new(input, output_dir, source_lang, target_langs)?;

            let summary = workflow.dub(&ctx).await?;

            for (language, path) in &summary.completed {
                println!("{}: {}", language, path.display());
            }
            if !summary.failed.is_empty() {
                for (language, reason) in &summary.failed {
                    eprintln!("{}: failed ({})", language, reason);
                }
                anyhow::bail!("{} language(s) failed to dub", summary.failed.len());
            }
        }
        Commands::Batch {
            input_dir,
            source_lang,
            target_langs,
            output_dir,
        } => {
            let target_langs = parse_language_list(&target_langs);
            workflow
                .dub_directory(&input_dir, &source_lang, &target_langs, output_dir.as_deref())
                .await?;
        }
        Commands::Extract { input, output } => {
            info!("Extracting audio from: {}", input.display());
            workflow.extract_audio(&input, &output).await?;
        }
        Commands::Transcribe {
            input,
            output,
            language,
        } => {
            info!("Transcribing audio: {}", input.display());
            workflow
                .transcribe_to_file(&input, &output, &language)
                .await?;
        }
        Commands::Segment {
            input,
            output,
            source_lang,
        } => {
            info!("Segmenting transcript: {}", input.display());
            workflow.segment_to_file(&input, &output, &source_lang).await?;
        }
        Commands::Synthesize {
            sentences,
            language,
            output_dir,
        } => {
            info!("Synthesizing {} clips from: {}", language, sentences.display());
            workflow
                .synthesize_to_dir(&sentences, &language, &output_dir)
                .await?;
        }
        Commands::Stitch {
            video,
            sentences,
            clips_dir,
            language,
            output,
        } => {
            info!("Stitching {} clips onto: {}", language, video.display());
            let written = workflow
                .stitch_artifacts(&video, &sentences, &clips_dir, &language, &output)
                .await?;
            println!("{}", written.display());
        }
    }

    info!("Redub workflow completed successfully");
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let redub_dir = std::env::current_dir()?.join(".redub");
    let log_dir = redub_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "redub.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    // Determine log level
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Create console layer
    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    // Create file layer
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    // Setup layered subscriber
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer);

    subscriber
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
