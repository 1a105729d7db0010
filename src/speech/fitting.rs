use tracing::{debug, warn};

use crate::audio::wav_duration_secs;
use crate::error::{DubError, Result};

use super::Speaker;

/// A synthesized clip fitted to a sentence's time slot.
#[derive(Debug, Clone)]
pub struct FittedClip {
    pub audio: Vec<u8>,
    pub speaking_rate: f64,
    pub duration_secs: f64,
    /// True when the required rate exceeded the configured maximum and the
    /// clip still overflows its slot.
    pub overflow: bool,
}

/// Wraps a Speaker and fits its output into a target duration.
///
/// The fit is one-shot: synthesize at normal rate, and if the clip is longer
/// than the slot, re-synthesize once at a faster rate. Audio that already
/// fits is returned untouched rather than sped up.
pub struct RateFittingSynthesizer {
    speaker: Box<dyn Speaker>,
    max_rate: f64,
}

impl RateFittingSynthesizer {
    pub fn new(speaker: Box<dyn Speaker>, speaking_rate_bounds: [f64; 2]) -> Self {
        Self {
            speaker,
            max_rate: speaking_rate_bounds[1],
        }
    }

    pub async fn fit(
        &self,
        text: &str,
        language: &str,
        target_duration_secs: f64,
        voice: Option<&str>,
    ) -> Result<FittedClip> {
        if target_duration_secs <= 0.0 {
            return Err(DubError::Synthesis(format!(
                "Non-positive target duration: {}",
                target_duration_secs
            )));
        }

        let baseline = self.speaker.synthesize(text, language, voice, 1.0).await?;
        if baseline.is_empty() {
            return Err(DubError::Synthesis("Empty audio received".to_string()));
        }

        let base_duration = wav_duration_secs(&baseline)?;
        let ratio = base_duration / target_duration_secs;

        if ratio <= 1.0 {
            debug!(
                "Clip fits: {:.2}s into a {:.2}s slot",
                base_duration, target_duration_secs
            );
            return Ok(FittedClip {
                audio: baseline,
                speaking_rate: 1.0,
                duration_secs: base_duration,
                overflow: false,
            });
        }

        // Round to one decimal; a marginally-short clip is acceptable.
        let mut rate = (ratio * 10.0).round() / 10.0;
        let mut overflow = false;

        if rate > self.max_rate {
            warn!(
                "Required speaking rate {:.1} exceeds maximum {:.1}; clip will overflow its {:.2}s slot",
                rate, self.max_rate, target_duration_secs
            );
            rate = self.max_rate;
            overflow = true;
        }

        debug!(
            "Re-synthesizing at rate {:.1} ({:.2}s into {:.2}s)",
            rate, base_duration, target_duration_secs
        );

        let audio = self.speaker.synthesize(text, language, voice, rate).await?;
        if audio.is_empty() {
            return Err(DubError::Synthesis("Empty audio received".to_string()));
        }
        let duration_secs = wav_duration_secs(&audio)?;

        Ok(FittedClip {
            audio,
            speaking_rate: rate,
            duration_secs,
            overflow,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PcmAudio;
    use crate::speech::MockSpeaker;

    const RATE: u32 = 24000;

    fn wav_of_secs(secs: f64) -> Vec<u8> {
        PcmAudio::silence(secs, RATE).to_wav_bytes().unwrap()
    }

    fn fake_speaker(base_secs: f64) -> MockSpeaker {
        let mut speaker = MockSpeaker::new();
        speaker
            .expect_synthesize()
            .returning(move |_, _, _, rate| Ok(wav_of_secs(base_secs / rate)));
        speaker
    }

    #[tokio::test]
    async fn test_fitting_clip_returned_unmodified() {
        let baseline = wav_of_secs(1.5);
        let expected = baseline.clone();

        let mut speaker = MockSpeaker::new();
        speaker
            .expect_synthesize()
            .times(1)
            .returning(move |_, _, _, _| Ok(baseline.clone()));

        let synthesizer = RateFittingSynthesizer::new(Box::new(speaker), [1.0, 4.0]);
        let clip = synthesizer.fit("short line", "fr", 2.0, None).await.unwrap();

        // Already fits: single call, rate 1.0, bytes untouched.
        assert_eq!(clip.speaking_rate, 1.0);
        assert_eq!(clip.audio, expected);
        assert!(!clip.overflow);
        assert!((clip.duration_secs - 1.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_overflowing_clip_resynthesized_at_rounded_ratio() {
        let mut speaker = MockSpeaker::new();
        speaker
            .expect_synthesize()
            .withf(|_, _, voice, rate| voice.is_none() && *rate == 1.0)
            .times(1)
            .returning(|_, _, _, _| Ok(wav_of_secs(5.0)));
        speaker
            .expect_synthesize()
            .withf(|_, _, _, rate| *rate == 2.5)
            .times(1)
            .returning(|_, _, _, _| Ok(wav_of_secs(2.0)));

        let synthesizer = RateFittingSynthesizer::new(Box::new(speaker), [1.0, 4.0]);
        let clip = synthesizer.fit("line", "fr", 2.0, None).await.unwrap();

        assert_eq!(clip.speaking_rate, 2.5);
        assert!(!clip.overflow);
    }

    #[tokio::test]
    async fn test_rate_clamped_at_maximum() {
        let mut speaker = MockSpeaker::new();
        speaker
            .expect_synthesize()
            .withf(|_, _, _, rate| *rate == 1.0)
            .times(1)
            .returning(|_, _, _, _| Ok(wav_of_secs(4.5)));
        // ratio 4.5 must clamp to exactly 4.0
        speaker
            .expect_synthesize()
            .withf(|_, _, _, rate| *rate == 4.0)
            .times(1)
            .returning(|_, _, _, _| Ok(wav_of_secs(1.125)));

        let synthesizer = RateFittingSynthesizer::new(Box::new(speaker), [1.0, 4.0]);
        let clip = synthesizer.fit("long line", "de", 1.0, None).await.unwrap();

        assert_eq!(clip.speaking_rate, 4.0);
        assert!(clip.overflow);
        assert!(clip.duration_secs > 1.0);
    }

    #[tokio::test]
    async fn test_exact_fit_boundary() {
        let speaker = fake_speaker(2.0);
        let synthesizer = RateFittingSynthesizer::new(Box::new(speaker), [1.0, 4.0]);

        let clip = synthesizer.fit("text", "es", 2.0, None).await.unwrap();

        assert_eq!(clip.speaking_rate, 1.0);
        assert!(!clip.overflow);
    }

    #[tokio::test]
    async fn test_empty_baseline_fails() {
        let mut speaker = MockSpeaker::new();
        speaker
            .expect_synthesize()
            .returning(|_, _, _, _| Ok(Vec::new()));

        let synthesizer = RateFittingSynthesizer::new(Box::new(speaker), [1.0, 4.0]);
        let result = synthesizer.fit("text", "es", 2.0, None).await;

        assert!(matches!(result, Err(DubError::Synthesis(_))));
    }

    #[tokio::test]
    async fn test_speaker_error_propagates() {
        let mut speaker = MockSpeaker::new();
        speaker
            .expect_synthesize()
            .returning(|_, _, _, _| Err(DubError::Synthesis("boom".to_string())));

        let synthesizer = RateFittingSynthesizer::new(Box::new(speaker), [1.0, 4.0]);
        let result = synthesizer.fit("text", "es", 2.0, None).await;

        assert!(matches!(result, Err(DubError::Synthesis(_))));
    }

    #[tokio::test]
    async fn test_non_positive_target_rejected() {
        let speaker = MockSpeaker::new();
        let synthesizer = RateFittingSynthesizer::new(Box::new(speaker), [1.0, 4.0]);

        let result = synthesizer.fit("text", "es", 0.0, None).await;

        assert!(matches!(result, Err(DubError::Synthesis(_))));
    }

    #[tokio::test]
    async fn test_lower_configured_maximum_clamps_earlier() {
        let mut speaker = MockSpeaker::new();
        speaker
            .expect_synthesize()
            .withf(|_, _, _, rate| *rate == 1.0)
            .returning(|_, _, _, _| Ok(wav_of_secs(6.0)));
        speaker
            .expect_synthesize()
            .withf(|_, _, _, rate| *rate == 2.0)
            .returning(|_, _, _, _| Ok(wav_of_secs(3.0)));

        let synthesizer = RateFittingSynthesizer::new(Box::new(speaker), [1.0, 2.0]);
        let clip = synthesizer.fit("t", "es", 2.0, None).await.unwrap();

        assert_eq!(clip.speaking_rate, 2.0);
        assert!(clip.overflow);
    }
}
