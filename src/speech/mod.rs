// Modular speech synthesis architecture
//
// A Speaker converts text into WAV audio at a given speaking rate. The
// RateFittingSynthesizer wraps a Speaker and fits the synthesized clip into
// a sentence's original time slot.

pub mod fitting;
pub mod google;

use async_trait::async_trait;

pub use fitting::{FittedClip, RateFittingSynthesizer};

use crate::config::SpeechConfig;
use crate::error::Result;

/// Text-to-speech collaborator. Returns 16-bit PCM WAV bytes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn synthesize<'a>(
        &self,
        text: &str,
        language: &str,
        voice: Option<&'a str>,
        speaking_rate: f64,
    ) -> Result<Vec<u8>>;
}

/// Factory for creating speaker instances
pub struct SpeakerFactory;

impl SpeakerFactory {
    /// Create the default speaker implementation (Google Text-to-Speech)
    pub fn create_speaker(config: SpeechConfig) -> Box<dyn Speaker> {
        Box::new(google::GoogleSpeaker::new(config))
    }
}
