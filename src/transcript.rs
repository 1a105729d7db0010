use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

use crate::error::{DubError, Result};

/// A single recognized word with its time offsets and speaker attribution.
/// `speaker_tag` is 0 when diarization is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub speaker_tag: i32,
}

/// One recognition result as returned by the transcriber: the full
/// recognized text plus its word-level timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub transcript: String,
    pub words: Vec<Word>,
}

/// A speaker-attributed sentence, the unit threaded through translation,
/// synthesis, and stitching. `text` maps language codes to the sentence in
/// that language; the source language entry is present from segmentation on,
/// and translation adds one entry per target language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    pub speaker: i32,
    pub start_time: f64,
    pub end_time: f64,
    pub text: BTreeMap<String, String>,
}

impl Sentence {
    /// Length of the original time slot in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn text_for(&self, language: &str) -> Option<&str> {
        self.text.get(language).map(String::as_str)
    }
}

/// Load a JSON array of transcript results from disk.
pub async fn load_transcript<P: AsRef<Path>>(path: P) -> Result<Vec<TranscriptResult>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DubError::FileNotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Persist a JSON array of transcript results.
pub async fn save_transcript<P: AsRef<Path>>(
    results: &[TranscriptResult],
    path: P,
) -> Result<()> {
    let content = serde_json::to_string_pretty(results)?;
    fs::write(path, content).await?;
    Ok(())
}

/// Load the sentence list shared by all language lanes.
pub async fn load_sentences<P: AsRef<Path>>(path: P) -> Result<Vec<Sentence>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DubError::FileNotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Persist the sentence list atomically so a crash mid-write never leaves a
/// truncated artifact behind.
pub async fn save_sentences<P: AsRef<Path>>(sentences: &[Sentence], path: P) -> Result<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(sentences)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, content).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_duration() {
        let mut text = BTreeMap::new();
        text.insert("en".to_string(), "hello there".to_string());
        let sentence = Sentence {
            speaker: 1,
            start_time: 2.5,
            end_time: 4.0,
            text,
        };
        assert!((sentence.duration_secs() - 1.5).abs() < 1e-9);
        assert_eq!(sentence.text_for("en"), Some("hello there"));
        assert_eq!(sentence.text_for("fr"), None);
    }

    #[test]
    fn test_word_speaker_tag_defaults_to_zero() {
        let word: Word =
            serde_json::from_str(r#"{"text":"hi","start_time":0.0,"end_time":0.5}"#).unwrap();
        assert_eq!(word.speaker_tag, 0);
    }

    #[tokio::test]
    async fn test_sentence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentences.json");

        let mut text = BTreeMap::new();
        text.insert("en".to_string(), "one two".to_string());
        text.insert("fr".to_string(), "un deux".to_string());
        let sentences = vec![Sentence {
            speaker: 2,
            start_time: 0.0,
            end_time: 1.2,
            text,
        }];

        save_sentences(&sentences, &path).await.unwrap();
        let loaded = load_sentences(&path).await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].speaker, 2);
        assert_eq!(loaded[0].text_for("fr"), Some("un deux"));
    }

    #[tokio::test]
    async fn test_load_missing_transcript_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_transcript(dir.path().join("absent.json")).await;
        assert!(matches!(result, Err(DubError::FileNotFound(_))));
    }
}
