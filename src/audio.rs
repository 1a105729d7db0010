use std::io::Cursor;

use crate::error::{DubError, Result};

/// Mono 16-bit PCM audio buffer, the working representation for every
/// intermediate track and clip in the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl PcmAudio {
    pub fn silence(duration_secs: f64, sample_rate: u32) -> Self {
        let len = (duration_secs * sample_rate as f64).round() as usize;
        Self {
            samples: vec![0; len],
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Decode WAV bytes. Stereo input is downmixed to mono.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| DubError::Audio(format!("Failed to parse WAV data: {}", e)))?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(DubError::Audio(format!(
                "Unsupported WAV format: {} bits per sample",
                spec.bits_per_sample
            )));
        }

        let raw: Vec<i16> = reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DubError::Audio(format!("Failed to read WAV samples: {}", e)))?;

        let samples = match spec.channels {
            1 => raw,
            2 => raw
                .chunks_exact(2)
                .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
                .collect(),
            n => {
                return Err(DubError::Audio(format!(
                    "Unsupported channel count: {}",
                    n
                )))
            }
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Encode to 16-bit mono WAV bytes.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| DubError::Audio(format!("Failed to create WAV writer: {}", e)))?;
            for &sample in &self.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| DubError::Audio(format!("Failed to write WAV sample: {}", e)))?;
            }
            writer
                .finalize()
                .map_err(|e| DubError::Audio(format!("Failed to finalize WAV data: {}", e)))?;
        }
        Ok(cursor.into_inner())
    }

    /// Resample with linear interpolation to the target rate.
    pub fn resampled(&self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate {
            return self.clone();
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let output_len = (self.samples.len() as f64 / ratio).ceil() as usize;

        let samples = (0..output_len)
            .map(|i| {
                let source_pos = i as f64 * ratio;
                let source_idx = source_pos.floor() as usize;
                let fraction = source_pos - source_idx as f64;

                if source_idx + 1 >= self.samples.len() {
                    *self.samples.last().unwrap_or(&0)
                } else {
                    let left = self.samples[source_idx] as f64;
                    let right = self.samples[source_idx + 1] as f64;
                    (left + (right - left) * fraction) as i16
                }
            })
            .collect();

        Self {
            samples,
            sample_rate: target_rate,
        }
    }

    /// Overlay `clip` starting at `offset_secs`: the base samples under the
    /// clip window are attenuated by `gain_db`, then the clip samples are
    /// added with saturation. A clip running past the end of the base is
    /// truncated at the base boundary; the track duration never changes.
    pub fn overlay(&mut self, clip: &PcmAudio, offset_secs: f64, gain_db: f64) {
        let clip = clip.resampled(self.sample_rate);
        let offset = (offset_secs * self.sample_rate as f64).round() as usize;
        if offset >= self.samples.len() {
            return;
        }

        let window = (self.samples.len() - offset).min(clip.samples.len());
        let attenuation = db_to_amplitude(gain_db);

        for i in 0..window {
            let base = (self.samples[offset + i] as f64 * attenuation) as i32;
            let mixed = base + clip.samples[i] as i32;
            self.samples[offset + i] = mixed.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }
    }
}

/// Duration in seconds of a WAV byte buffer.
pub fn wav_duration_secs(bytes: &[u8]) -> Result<f64> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| DubError::Audio(format!("Failed to parse WAV data: {}", e)))?;
    let spec = reader.spec();
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Convert a decibel gain to a linear amplitude factor.
pub fn db_to_amplitude(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(value: i16, len: usize, rate: u32) -> PcmAudio {
        PcmAudio {
            samples: vec![value; len],
            sample_rate: rate,
        }
    }

    #[test]
    fn test_wav_roundtrip() {
        let audio = PcmAudio {
            samples: vec![0, 1000, -1000, 32767, -32768],
            sample_rate: 24000,
        };

        let bytes = audio.to_wav_bytes().unwrap();
        let decoded = PcmAudio::from_wav_bytes(&bytes).unwrap();

        assert_eq!(decoded, audio);
    }

    #[test]
    fn test_stereo_downmix() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in &[100i16, 200, 300, 400] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = PcmAudio::from_wav_bytes(&cursor.into_inner()).unwrap();

        assert_eq!(decoded.samples, vec![150, 350]);
    }

    #[test]
    fn test_wav_duration() {
        let audio = tone(0, 24000, 24000);
        let bytes = audio.to_wav_bytes().unwrap();

        assert!((wav_duration_secs(&bytes).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_wav_rejected() {
        let result = PcmAudio::from_wav_bytes(&[0u8, 1, 2, 3]);
        assert!(matches!(result, Err(DubError::Audio(_))));
    }

    #[test]
    fn test_db_to_amplitude() {
        assert!((db_to_amplitude(0.0) - 1.0).abs() < 1e-9);
        assert!((db_to_amplitude(-20.0) - 0.1).abs() < 1e-9);
        // -30 dB leaves ~3.2% of the original amplitude
        assert!((db_to_amplitude(-30.0) - 0.0316).abs() < 1e-3);
    }

    #[test]
    fn test_overlay_attenuates_base_and_adds_clip() {
        let mut base = tone(10000, 8, 1000);
        let clip = tone(500, 4, 1000);

        base.overlay(&clip, 0.002, -20.0);

        // Outside the window the base is untouched.
        assert_eq!(base.samples[0], 10000);
        assert_eq!(base.samples[1], 10000);
        assert_eq!(base.samples[6], 10000);
        // Inside: base * 0.1 + clip
        assert_eq!(base.samples[2], 1500);
        assert_eq!(base.samples[5], 1500);
    }

    #[test]
    fn test_overlay_truncates_at_track_end() {
        let mut base = tone(0, 4, 1000);
        let clip = tone(1000, 10, 1000);

        base.overlay(&clip, 0.002, -30.0);

        assert_eq!(base.samples.len(), 4);
        assert_eq!(base.samples, vec![0, 0, 1000, 1000]);
    }

    #[test]
    fn test_overlay_past_end_is_noop() {
        let mut base = tone(42, 4, 1000);
        let clip = tone(1000, 2, 1000);

        base.overlay(&clip, 1.0, -30.0);

        assert_eq!(base.samples, vec![42; 4]);
    }

    #[test]
    fn test_overlay_saturates() {
        let mut base = tone(30000, 2, 1000);
        let clip = tone(32000, 2, 1000);

        base.overlay(&clip, 0.0, 0.0);

        assert_eq!(base.samples, vec![32767, 32767]);
    }

    #[test]
    fn test_overlay_resamples_clip() {
        let mut base = tone(0, 2000, 2000);
        // 1 second of clip at half the base rate
        let clip = tone(1000, 1000, 1000);

        base.overlay(&clip, 0.0, -30.0);

        // Resampled clip should cover ~2000 base samples
        assert!(base.samples[0] != 0);
        assert!(base.samples[1900] != 0);
    }

    #[test]
    fn test_silence_duration() {
        let silence = PcmAudio::silence(2.5, 16000);
        assert_eq!(silence.samples.len(), 40000);
        assert!((silence.duration_secs() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_resample_halves_length() {
        let audio = tone(500, 2000, 2000);
        let resampled = audio.resampled(1000);
        assert_eq!(resampled.sample_rate, 1000);
        assert_eq!(resampled.samples.len(), 1000);
        assert!(resampled.samples.iter().all(|&s| (499..=501).contains(&s)));
    }
}
