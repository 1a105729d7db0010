use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{DubError, Result};

fn default_gap_threshold() -> f64 {
    1.0
}

fn default_overlay_gain() -> f64 {
    -30.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub transcribe: TranscribeConfig,
    pub translate: TranslateConfig,
    pub speech: SpeechConfig,
    pub media: MediaConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeConfig {
    /// Speech-to-text API endpoint
    pub endpoint: String,
    /// API key for the speech service
    pub api_key: String,
    /// Words that are unusual but likely to appear in the audio
    #[serde(default)]
    pub phrase_hints: Vec<String>,
    /// Number of speakers in the video; diarization is enabled when > 1
    pub speaker_count: u32,
    /// Request timeout in seconds (transcription of long audio is slow)
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Translation API endpoint
    pub endpoint: String,
    /// API key for the translation service
    pub api_key: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Text-to-speech API endpoint
    pub endpoint: String,
    /// API key for the synthesis service
    pub api_key: String,
    /// Voice name per language code, e.g. { en = "en-AU-Standard-A" }.
    /// Languages without an entry fall back to a neutral default voice.
    #[serde(default)]
    pub voices: HashMap<String, String>,
    /// Allowed speaking-rate multiplier range [min, max]
    pub speaking_rate_bounds: [f64; 2],
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Sample rate for the extracted source audio track
    pub sample_rate: u32,
    /// Attenuation in dB applied to the original audio under a dubbed segment
    #[serde(default = "default_overlay_gain")]
    pub overlay_gain_db: f64,
    /// Additional encoding options for the final mux
    /// Common options: ["-preset", "medium", "-crf", "23"]
    pub encode_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum retries for failed collaborator calls
    pub max_retries: u32,
    /// Base backoff in milliseconds, doubled on each retry
    pub retry_backoff_ms: u64,
    /// Maximum concurrent per-sentence requests within one language lane
    pub sentence_concurrency: usize,
    /// Minimum inter-word gap in seconds that closes a sentence
    #[serde(default = "default_gap_threshold")]
    pub sentence_gap_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transcribe: TranscribeConfig {
                endpoint: "https://speech.googleapis.com".to_string(),
                api_key: String::new(),
                phrase_hints: Vec::new(),
                speaker_count: 1,
                timeout_secs: 600,
            },
            translate: TranslateConfig {
                endpoint: "https://translation.googleapis.com".to_string(),
                api_key: String::new(),
                timeout_secs: 60,
            },
            speech: SpeechConfig {
                endpoint: "https://texttospeech.googleapis.com".to_string(),
                api_key: String::new(),
                voices: HashMap::new(),
                speaking_rate_bounds: [1.0, 4.0],
                timeout_secs: 120,
            },
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                sample_rate: 24000,
                overlay_gain_db: default_overlay_gain(),
                encode_options: vec![
                    // Example encoding options users can customize:
                    // "-preset".to_string(), "medium".to_string(),
                    // "-crf".to_string(), "23".to_string(),
                ],
            },
            pipeline: PipelineConfig {
                max_retries: 3,
                retry_backoff_ms: 1000,
                sentence_concurrency: 4,
                sentence_gap_secs: default_gap_threshold(),
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DubError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| DubError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DubError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| DubError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.transcribe.speaker_count < 1 {
            return Err(DubError::Config(
                "transcribe.speaker_count must be at least 1".to_string(),
            ));
        }

        let [min, max] = self.speech.speaking_rate_bounds;
        if !(min > 0.0 && min <= 1.0) {
            return Err(DubError::Config(format!(
                "speech.speaking_rate_bounds minimum must be in (0, 1], got {}",
                min
            )));
        }
        if !(max >= 1.0 && max <= 4.0) {
            return Err(DubError::Config(format!(
                "speech.speaking_rate_bounds maximum must be in [1, 4], got {}",
                max
            )));
        }

        if self.pipeline.sentence_concurrency == 0 {
            return Err(DubError::Config(
                "pipeline.sentence_concurrency must be at least 1".to_string(),
            ));
        }
        if self.pipeline.sentence_gap_secs <= 0.0 {
            return Err(DubError::Config(
                "pipeline.sentence_gap_secs must be positive".to_string(),
            ));
        }

        if self.media.sample_rate == 0 {
            return Err(DubError::Config(
                "media.sample_rate must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_speaker_count_rejected() {
        let mut config = Config::default();
        config.transcribe.speaker_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_bounds_above_four_rejected() {
        let mut config = Config::default();
        config.speech.speaking_rate_bounds = [1.0, 5.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_bounds_min_above_one_rejected() {
        let mut config = Config::default();
        config.speech.speaking_rate_bounds = [1.5, 4.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.media.overlay_gain_db, config.media.overlay_gain_db);
        assert_eq!(parsed.pipeline.max_retries, config.pipeline.max_retries);
    }
}
