// Modular transcription architecture
//
// This module provides transcription implementations through a factory
// pattern. To add a new speech-to-text service:
// 1. Create service-specific data structures for parsing its response JSON
// 2. Implement the Transcriber trait, mapping the response to TranscriptResult
// 3. Add the service to the factory

pub mod google;

use async_trait::async_trait;
use std::path::Path;

use crate::config::TranscribeConfig;
use crate::error::Result;
use crate::transcript::TranscriptResult;

/// Speech-to-text collaborator: turns an audio file into recognition results
/// with word-level time offsets and speaker tags.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &Path,
        language: &str,
    ) -> Result<Vec<TranscriptResult>>;
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    /// Create the default transcriber implementation (Google Speech-to-Text)
    pub fn create_transcriber(config: TranscribeConfig) -> Box<dyn Transcriber> {
        Box::new(google::GoogleTranscriber::new(config))
    }
}
