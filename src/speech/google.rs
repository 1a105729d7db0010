use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::SpeechConfig;
use crate::error::{DubError, Result};

use super::Speaker;

const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Google Cloud Text-to-Speech client. Synthesizes LINEAR16 (WAV) audio;
/// when no voice is named the service picks a neutral default for the
/// language.
pub struct GoogleSpeaker {
    client: Client,
    config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest {
    input: SynthesisInput,
    voice: VoiceSelection,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection {
    language_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssml_gender: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: String,
    speaking_rate: f64,
    sample_rate_hertz: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

impl GoogleSpeaker {
    pub fn new(config: SpeechConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("HTTP client creation should not fail");

        Self { client, config }
    }

    fn build_request(
        &self,
        text: &str,
        language: &str,
        voice: Option<&str>,
        speaking_rate: f64,
    ) -> SynthesizeRequest {
        let voice = match voice {
            Some(name) => VoiceSelection {
                language_code: language.to_string(),
                name: Some(name.to_string()),
                ssml_gender: None,
            },
            None => VoiceSelection {
                language_code: language.to_string(),
                name: None,
                ssml_gender: Some("NEUTRAL".to_string()),
            },
        };

        SynthesizeRequest {
            input: SynthesisInput {
                text: text.to_string(),
            },
            voice,
            audio_config: AudioConfig {
                audio_encoding: "LINEAR16".to_string(),
                speaking_rate,
                sample_rate_hertz: OUTPUT_SAMPLE_RATE,
            },
        }
    }
}

#[async_trait]
impl Speaker for GoogleSpeaker {
    async fn synthesize<'a>(
        &self,
        text: &str,
        language: &str,
        voice: Option<&'a str>,
        speaking_rate: f64,
    ) -> Result<Vec<u8>> {
        let url = format!(
            "{}/v1/text:synthesize?key={}",
            self.config.endpoint, self.config.api_key
        );

        let request = self.build_request(text, language, voice, speaking_rate);

        debug!(
            "Synthesizing {} chars in {} at rate {}",
            text.len(),
            language,
            speaking_rate
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DubError::Synthesis(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DubError::Synthesis(format!(
                "Text-to-speech API error {}: {}",
                status, body
            )));
        }

        let synthesize_response: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| DubError::Synthesis(format!("Failed to parse response: {}", e)))?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(&synthesize_response.audio_content)
            .map_err(|e| DubError::Synthesis(format!("Invalid audio payload: {}", e)))?;

        if audio.is_empty() {
            return Err(DubError::Synthesis("Empty audio received".to_string()));
        }

        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SpeechConfig {
        SpeechConfig {
            endpoint: "http://localhost".to_string(),
            api_key: "k".to_string(),
            voices: Default::default(),
            speaking_rate_bounds: [1.0, 4.0],
            timeout_secs: 10,
        }
    }

    #[test]
    fn test_named_voice_selection() {
        let speaker = GoogleSpeaker::new(config());
        let request = speaker.build_request("hi", "en", Some("en-AU-Standard-A"), 1.0);

        assert_eq!(request.voice.name.as_deref(), Some("en-AU-Standard-A"));
        assert!(request.voice.ssml_gender.is_none());
        assert_eq!(request.audio_config.audio_encoding, "LINEAR16");
    }

    #[test]
    fn test_neutral_fallback_without_voice() {
        let speaker = GoogleSpeaker::new(config());
        let request = speaker.build_request("hola", "es", None, 2.5);

        assert!(request.voice.name.is_none());
        assert_eq!(request.voice.ssml_gender.as_deref(), Some("NEUTRAL"));
        assert_eq!(request.audio_config.speaking_rate, 2.5);
    }
}
