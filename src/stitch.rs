use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use crate::audio::PcmAudio;
use crate::error::{DubError, Result};
use crate::media::MediaProcessor;
use crate::transcript::Sentence;

/// Lays synthesized clips onto the original audio track at their sentence
/// offsets and muxes the composed track back into the video.
pub struct TimelineStitcher {
    media: Arc<dyn MediaProcessor>,
    overlay_gain_db: f64,
}

impl TimelineStitcher {
    pub fn new(media: Arc<dyn MediaProcessor>, overlay_gain_db: f64) -> Self {
        Self {
            media,
            overlay_gain_db,
        }
    }

    /// Compose the dubbed track: a copy of the source track with every clip
    /// overlaid at its sentence's start offset, in ascending time order. The
    /// original audio under each overlay window is attenuated by the overlay
    /// gain, not muted. Every sentence must have a clip; a missing one is a
    /// pipeline invariant violation.
    pub fn compose_track(
        &self,
        sentences: &[Sentence],
        clips: &BTreeMap<usize, PcmAudio>,
        source_track: &PcmAudio,
    ) -> Result<PcmAudio> {
        let mut track = source_track.clone();

        // Sentences are ordered by start time from segmentation on, so
        // iterating by index applies overlays in ascending time order.
        for (index, sentence) in sentences.iter().enumerate() {
            let clip = clips
                .get(&index)
                .ok_or(DubError::MissingClip {
                    sentence_index: index,
                })?;

            debug!(
                "Overlaying clip {} at {:.2}s ({:.2}s long)",
                index,
                sentence.start_time,
                clip.duration_secs()
            );

            track.overlay(clip, sentence.start_time, self.overlay_gain_db);
        }

        Ok(track)
    }

    /// Stitch the final video for one language: compose the dubbed track,
    /// stage it as a WAV file, and remux. The mux output is written to a
    /// temporary path and renamed into place, so a partially written final
    /// video never exists.
    pub async fn stitch(
        &self,
        sentences: &[Sentence],
        clips: &BTreeMap<usize, PcmAudio>,
        source_audio_path: &Path,
        video_path: &Path,
        output_path: &Path,
    ) -> Result<PathBuf> {
        let source_bytes = fs::read(source_audio_path).await?;
        let source_track = PcmAudio::from_wav_bytes(&source_bytes)?;

        info!(
            "Stitching {} clips onto a {:.1}s track",
            clips.len(),
            source_track.duration_secs()
        );

        let composed = self.compose_track(sentences, clips, &source_track)?;

        let staging_dir = tempfile::tempdir()?;
        let track_path = staging_dir.path().join("dubbed_track.wav");
        fs::write(&track_path, composed.to_wav_bytes()?).await?;

        let tmp_output = temporary_sibling(output_path);
        let mux_result = self
            .media
            .replace_audio(video_path, &track_path, &tmp_output)
            .await;

        if let Err(e) = mux_result {
            let _ = fs::remove_file(&tmp_output).await;
            return Err(e);
        }

        fs::rename(&tmp_output, output_path).await?;
        info!("Wrote dubbed video {}", output_path.display());

        Ok(output_path.to_path_buf())
    }
}

/// Temporary path next to the final output so the rename stays on one
/// filesystem.
fn temporary_sibling(output_path: &Path) -> PathBuf {
    let file_name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    output_path.with_file_name(format!(".{}.part", file_name))
}
