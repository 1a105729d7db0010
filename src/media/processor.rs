use async_trait::async_trait;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{DubError, Result};

use super::{MediaCommandBuilder, MediaProcessor};

/// ffmpeg-backed media processor
pub struct FfmpegProcessor {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegProcessor {
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl MediaProcessor for FfmpegProcessor {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        info!(
            "Extracting audio from {} to {}",
            video_path.display(),
            audio_path.display()
        );

        let command = self.command_builder.extract_audio(
            video_path,
            audio_path,
            self.config.sample_rate,
        );
        command.execute().await?;

        info!("Audio extraction completed");
        Ok(())
    }

    async fn replace_audio(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<()> {
        info!(
            "Muxing {} with audio {} -> {}",
            video_path.display(),
            audio_path.display(),
            output_path.display()
        );

        let command = self.command_builder.replace_audio(
            video_path,
            audio_path,
            output_path,
            &self.config.encode_options,
        );
        command.execute().await?;

        info!("Audio replacement completed");
        Ok(())
    }

    fn check_availability(&self) -> Result<()> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .map_err(|e| DubError::Media(format!("Media processor not found: {}", e)))?;

        if output.status.success() {
            debug!("Media processor is available");
            Ok(())
        } else {
            Err(DubError::Media(
                "Media processor version check failed".to_string(),
            ))
        }
    }

    async fn get_version_info(&self) -> Result<String> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .map_err(|e| DubError::Media(format!("Failed to execute media processor: {}", e)))?;

        if output.status.success() {
            let version_info = String::from_utf8_lossy(&output.stdout);
            let first_line = version_info.lines().next().unwrap_or("Unknown version");
            Ok(first_line.to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DubError::Media(format!(
                "Media processor version check failed: {}",
                stderr
            )))
        }
    }
}
