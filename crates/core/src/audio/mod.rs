use std::path::Path;

use crate::{CameliaError, Result};

/// Decoded song: interleaved samples plus the rate they were decoded at.
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    waveform: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl Song {
    pub fn new(waveform: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(CameliaError::invalid("song sample rate must be non-zero"));
        }
        if channels == 0 {
            return Err(CameliaError::invalid("song channel count must be non-zero"));
        }
        if waveform.len() % channels as usize != 0 {
            return Err(CameliaError::invalid(format!(
                "waveform of {} samples is not aligned to {channels} channels",
                waveform.len()
            )));
        }

        Ok(Self {
            waveform,
            sample_rate,
            channels,
        })
    }

    /// Interleaved samples.
    pub fn waveform(&self) -> &[f32] {
        &self.waveform
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.waveform.len() / self.channels as usize
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Averages all channels into a single mono buffer.
    pub fn mono(&self) -> Vec<f32> {
        let channels = self.channels as usize;
        if channels == 1 {
            return self.waveform.clone();
        }

        self.waveform
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Writes the waveform as raw little-endian `f32` PCM, the format the
    /// encoder reads back with `-f f32le`.
    pub fn write_f32le(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut bytes = Vec::<u8>::with_capacity(self.waveform.len() * 4);
        for &sample in &self.waveform {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_counts_frames_not_samples() {
        let song = Song::new(vec![0.0; 88_200], 44_100, 2).unwrap();
        assert_eq!(song.frames(), 44_100);
        assert!((song.duration() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mono_averages_channels() {
        let song = Song::new(vec![1.0, 0.0, 0.5, 0.5], 10, 2).unwrap();
        assert_eq!(song.mono(), vec![0.5, 0.5]);
    }

    #[test]
    fn rejects_misaligned_waveform() {
        let err = Song::new(vec![0.0; 3], 44_100, 2).unwrap_err();
        assert!(matches!(err, CameliaError::InvalidArgument(_)));
        assert!(Song::new(Vec::new(), 0, 1).is_err());
    }

    #[test]
    fn writes_raw_pcm() {
        let dir = std::env::temp_dir().join(format!("camelia-audio-{}", std::process::id()));
        let path = dir.join("song.f32");
        let song = Song::new(vec![0.25, -0.5], 8_000, 1).unwrap();

        song.write_f32le(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(bytes.len(), 8);
        assert_eq!(f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), -0.5);
    }
}
