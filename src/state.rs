use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use crate::error::{DubError, Result};

/// Per-language lane progress through translation, synthesis, and stitching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaneState {
    pub translated: bool,
    pub synthesized: bool,
    pub stitched: bool,
}

/// Durable record of a dubbing run, persisted next to its artifacts.
///
/// Resumption is a single lookup against this record instead of scattered
/// file-existence checks; a stage marked complete is skipped on the next run
/// as long as its artifact is still in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub video_path: String,
    pub source_lang: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub audio_extracted: bool,
    pub transcribed: bool,
    pub segmented: bool,
    pub languages: BTreeMap<String, LaneState>,
}

impl RunState {
    pub fn new(video_path: &str, source_lang: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            video_path: video_path.to_string(),
            source_lang: source_lang.to_string(),
            created_at: now,
            updated_at: now,
            audio_extracted: false,
            transcribed: false,
            segmented: false,
            languages: BTreeMap::new(),
        }
    }

    /// Load the state record at `path`, or create a fresh one when no record
    /// exists yet. A record belonging to a different video or source
    /// language is rejected rather than silently reused.
    pub async fn load_or_create(
        path: &Path,
        video_path: &str,
        source_lang: &str,
    ) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(video_path, source_lang));
        }

        let content = fs::read_to_string(path).await?;
        let state: RunState = serde_json::from_str(&content)
            .map_err(|e| DubError::State(format!("Failed to parse state record: {}", e)))?;

        if state.video_path != video_path {
            return Err(DubError::State(format!(
                "State record belongs to {}, not {}",
                state.video_path, video_path
            )));
        }
        if state.source_lang != source_lang {
            return Err(DubError::State(format!(
                "State record has source language {}, not {}",
                state.source_lang, source_lang
            )));
        }

        Ok(state)
    }

    /// Persist the record atomically (temp file + rename).
    pub async fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(self)?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, path).await?;

        Ok(())
    }

    pub fn lane(&self, language: &str) -> LaneState {
        self.languages.get(language).cloned().unwrap_or_default()
    }

    pub fn lane_mut(&mut self, language: &str) -> &mut LaneState {
        self.languages.entry(language.to_string()).or_default()
    }

    /// True when every global stage and every requested lane is complete.
    pub fn is_complete(&self, target_langs: &[String]) -> bool {
        self.audio_extracted
            && self.transcribed
            && self.segmented
            && target_langs.iter().all(|lang| {
                let lane = self.lane(lang);
                lane.translated && lane.synthesized && lane.stitched
            })
    }
}
