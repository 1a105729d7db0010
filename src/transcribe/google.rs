use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TranscribeConfig;
use crate::error::{DubError, Result};
use crate::transcript::{TranscriptResult, Word};

use super::Transcriber;

/// Google Cloud Speech-to-Text client. Requests word time offsets and, when
/// more than one speaker is configured, speaker diarization.
pub struct GoogleTranscriber {
    client: Client,
    config: TranscribeConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest {
    config: RecognitionConfig,
    audio: RecognitionAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig {
    language_code: String,
    enable_automatic_punctuation: bool,
    enable_word_time_offsets: bool,
    speech_contexts: Vec<SpeechContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diarization_config: Option<DiarizationConfig>,
    profanity_filter: bool,
    use_enhanced: bool,
    model: String,
}

#[derive(Debug, Serialize)]
struct SpeechContext {
    phrases: Vec<String>,
    boost: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiarizationConfig {
    enable_speaker_diarization: bool,
    max_speaker_count: u32,
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<SpeechAlternative>,
}

#[derive(Debug, Deserialize)]
struct SpeechAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    words: Vec<SpeechWord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechWord {
    word: String,
    start_time: String,
    end_time: String,
    #[serde(default)]
    speaker_tag: i32,
}

impl GoogleTranscriber {
    pub fn new(config: TranscribeConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("HTTP client creation should not fail");

        Self { client, config }
    }

    fn build_request(&self, audio_content: String, language: &str) -> RecognizeRequest {
        let diarize = self.config.speaker_count > 1;

        RecognizeRequest {
            config: RecognitionConfig {
                // The enhanced video model is English-only
                language_code: if language == "en" {
                    "en-US".to_string()
                } else {
                    language.to_string()
                },
                enable_automatic_punctuation: true,
                enable_word_time_offsets: true,
                speech_contexts: vec![SpeechContext {
                    phrases: self.config.phrase_hints.clone(),
                    boost: 15.0,
                }],
                diarization_config: diarize.then(|| DiarizationConfig {
                    enable_speaker_diarization: true,
                    max_speaker_count: self.config.speaker_count,
                }),
                profanity_filter: true,
                use_enhanced: true,
                model: "video".to_string(),
            },
            audio: RecognitionAudio {
                content: audio_content,
            },
        }
    }
}

#[async_trait]
impl Transcriber for GoogleTranscriber {
    async fn transcribe(
        &self,
        audio_path: &Path,
        language: &str,
    ) -> Result<Vec<TranscriptResult>> {
        if !audio_path.exists() {
            return Err(DubError::FileNotFound(audio_path.display().to_string()));
        }

        info!(
            "Transcribing {} (language {}, {} speaker(s))",
            audio_path.display(),
            language,
            self.config.speaker_count
        );

        let audio_bytes = tokio::fs::read(audio_path).await?;
        let content = base64::engine::general_purpose::STANDARD.encode(&audio_bytes);
        let request = self.build_request(content, language);

        let url = format!(
            "{}/v1p1beta1/speech:recognize?key={}",
            self.config.endpoint, self.config.api_key
        );

        debug!("Sending recognition request ({} bytes audio)", audio_bytes.len());

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DubError::Transcription(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DubError::Transcription(format!(
                "Speech API error {}: {}",
                status, body
            )));
        }

        let recognize: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| DubError::Transcription(format!("Failed to parse response: {}", e)))?;

        let results = map_results(recognize)?;
        info!("Transcription returned {} result(s)", results.len());
        Ok(results)
    }
}

/// Flatten the API response into transcript results, keeping only the top
/// alternative of each result as the recognized text.
fn map_results(response: RecognizeResponse) -> Result<Vec<TranscriptResult>> {
    let mut results = Vec::new();

    for speech_result in response.results {
        let Some(best) = speech_result.alternatives.into_iter().next() else {
            continue;
        };

        let words = best
            .words
            .into_iter()
            .map(|w| {
                Ok(Word {
                    text: w.word,
                    start_time: parse_offset_secs(&w.start_time)?,
                    end_time: parse_offset_secs(&w.end_time)?,
                    speaker_tag: w.speaker_tag,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        results.push(TranscriptResult {
            transcript: best.transcript,
            words,
        });
    }

    Ok(results)
}

/// Parse a protobuf Duration rendered as JSON, e.g. "3.500s" or "7s".
fn parse_offset_secs(value: &str) -> Result<f64> {
    value
        .strip_suffix('s')
        .unwrap_or(value)
        .parse::<f64>()
        .map_err(|_| DubError::Transcription(format!("Invalid time offset: {:?}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offset_secs() {
        assert_eq!(parse_offset_secs("3.500s").unwrap(), 3.5);
        assert_eq!(parse_offset_secs("7s").unwrap(), 7.0);
        assert_eq!(parse_offset_secs("0s").unwrap(), 0.0);
        assert!(parse_offset_secs("abc").is_err());
    }

    #[test]
    fn test_map_results_flattens_top_alternative() {
        let response: RecognizeResponse = serde_json::from_str(
            r#"{
                "results": [
                    {
                        "alternatives": [
                            {
                                "transcript": "hello world",
                                "words": [
                                    {"word": "hello", "startTime": "0s", "endTime": "0.500s", "speakerTag": 1},
                                    {"word": "world", "startTime": "0.600s", "endTime": "1.100s", "speakerTag": 1}
                                ]
                            },
                            {"transcript": "yellow whirled", "words": []}
                        ]
                    },
                    {"alternatives": []}
                ]
            }"#,
        )
        .unwrap();

        let results = map_results(response).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].transcript, "hello world");
        assert_eq!(results[0].words.len(), 2);
        assert_eq!(results[0].words[1].start_time, 0.6);
        assert_eq!(results[0].words[1].speaker_tag, 1);
    }

    #[test]
    fn test_diarization_only_above_one_speaker() {
        let mut config = TranscribeConfig {
            endpoint: "http://localhost".to_string(),
            api_key: "k".to_string(),
            phrase_hints: vec![],
            speaker_count: 1,
            timeout_secs: 10,
        };

        let transcriber = GoogleTranscriber::new(config.clone());
        let request = transcriber.build_request("audio".to_string(), "fi");
        assert!(request.config.diarization_config.is_none());
        assert_eq!(request.config.language_code, "fi");

        config.speaker_count = 3;
        let transcriber = GoogleTranscriber::new(config);
        let request = transcriber.build_request("audio".to_string(), "en");
        let diarization = request.config.diarization_config.unwrap();
        assert!(diarization.enable_speaker_diarization);
        assert_eq!(diarization.max_speaker_count, 3);
        assert_eq!(request.config.language_code, "en-US");
    }
}
