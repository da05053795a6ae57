use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{CameliaError, Result, Song};

pub const WINDOW_SIZE: usize = 1024;
pub const HOP_SIZE: usize = 512;

const MIN_TEMPO_BPM: f32 = 60.0;
const MAX_TEMPO_BPM: f32 = 200.0;

/// Summary of the analysis metadata accumulated so far.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisSummary {
    pub sample_rate: u32,
    pub channels: u16,
    pub tempo_bpm: Option<f32>,
    pub duration_seconds: Option<f32>,
    pub peak_rms: f32,
}

/// Representation of the feature set for a single analysis window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisFrame {
    /// Centre of the window in seconds.
    pub time: f32,
    pub rms: f32,
    /// Half-wave rectified increase of the magnitude spectrum since the
    /// previous window. Peaks mark note onsets.
    pub spectral_flux: f32,
}

/// Streaming onset analyser. Samples are buffered and analysed in
/// overlapping Hann windows of [`WINDOW_SIZE`] samples every [`HOP_SIZE`]
/// samples; the tempo is read from the periodicity of the onset envelope.
pub struct AnalysisEngine {
    sample_rate: u32,
    pending: Vec<f32>,
    consumed_samples: usize,
    total_samples: usize,
    frames: Vec<AnalysisFrame>,
    previous_magnitudes: Vec<f32>,
    hann: Vec<f32>,
    fft: FftResources,
}

impl AnalysisEngine {
    pub fn new(sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(CameliaError::invalid("analysis sample rate must be non-zero"));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(WINDOW_SIZE);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        Ok(Self {
            sample_rate,
            pending: Vec::with_capacity(WINDOW_SIZE * 2),
            consumed_samples: 0,
            total_samples: 0,
            frames: Vec::new(),
            previous_magnitudes: vec![0.0; WINDOW_SIZE / 2 + 1],
            hann: (0..WINDOW_SIZE).map(|i| hann_value(i, WINDOW_SIZE)).collect(),
            fft,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns all recorded frames.
    pub fn frames(&self) -> &[AnalysisFrame] {
        &self.frames
    }

    /// Consumes mono samples, analysing every complete window.
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<()> {
        self.pending.extend_from_slice(samples);
        self.total_samples += samples.len();

        let mut offset = 0;
        while self.pending.len() - offset >= WINDOW_SIZE {
            let frame = self.analyse_window(offset)?;
            self.frames.push(frame);
            offset += HOP_SIZE;
        }

        self.pending.drain(..offset);
        self.consumed_samples += offset;
        Ok(())
    }

    /// Returns metadata collected so far about the analysed stream.
    pub fn summary(&self) -> AnalysisSummary {
        let duration = self.total_samples as f32 / self.sample_rate as f32;
        AnalysisSummary {
            sample_rate: self.sample_rate,
            channels: 1,
            tempo_bpm: self.estimate_tempo(),
            duration_seconds: (self.total_samples > 0).then_some(duration),
            peak_rms: self.frames.iter().map(|f| f.rms).fold(0.0, f32::max),
        }
    }

    /// Estimates the tempo from the autocorrelation of the onset envelope.
    /// Returns `None` when the envelope carries no periodic onsets.
    pub fn estimate_tempo(&self) -> Option<f32> {
        let envelope: Vec<f32> = self.frames.iter().map(|f| f.spectral_flux).collect();
        let frame_rate = self.sample_rate as f32 / HOP_SIZE as f32;

        let min_lag = ((frame_rate * 60.0 / MAX_TEMPO_BPM).floor() as usize).max(1);
        let max_lag = ((frame_rate * 60.0 / MIN_TEMPO_BPM).ceil() as usize)
            .min(envelope.len().saturating_sub(1));
        if min_lag >= max_lag {
            return None;
        }

        let mut best_lag = min_lag;
        let mut best_score = autocorrelation(&envelope, min_lag);
        for lag in min_lag + 1..=max_lag {
            let score = autocorrelation(&envelope, lag);
            if score > best_score {
                best_lag = lag;
                best_score = score;
            }
        }
        if best_score <= f32::EPSILON {
            return None;
        }

        let before = autocorrelation(&envelope, best_lag - 1);
        let after = autocorrelation(&envelope, best_lag + 1);
        let denom = before - 2.0 * best_score + after;
        let shift = if denom.abs() > f32::EPSILON {
            (0.5 * (before - after) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };

        let lag = best_lag as f32 + shift;
        Some(60.0 * frame_rate / lag)
    }

    fn analyse_window(&mut self, offset: usize) -> Result<AnalysisFrame> {
        let window = &self.pending[offset..offset + WINDOW_SIZE];
        let rms = compute_rms(window);

        for (index, value) in window.iter().enumerate() {
            self.fft.input[index] = *value * self.hann[index];
        }

        self.fft
            .plan
            .process_with_scratch(
                &mut self.fft.input,
                &mut self.fft.spectrum,
                &mut self.fft.scratch,
            )
            .map_err(|e| CameliaError::msg(format!("spectrum computation failed: {e}")))?;

        let mut flux = 0.0;
        for (bin, previous) in self
            .fft
            .spectrum
            .iter()
            .zip(self.previous_magnitudes.iter_mut())
        {
            let magnitude = bin.norm();
            flux += (magnitude - *previous).max(0.0);
            *previous = magnitude;
        }

        let centre = self.consumed_samples + offset + WINDOW_SIZE / 2;
        Ok(AnalysisFrame {
            time: centre as f32 / self.sample_rate as f32,
            rms,
            spectral_flux: flux,
        })
    }
}

/// Runs the onset analysis over a whole song.
pub fn analyze_song(song: &Song) -> Result<AnalysisSummary> {
    let mut engine = AnalysisEngine::new(song.sample_rate())?;
    engine.push_samples(&song.mono())?;

    let summary = AnalysisSummary {
        channels: song.channels(),
        ..engine.summary()
    };
    tracing::debug!(
        tempo = ?summary.tempo_bpm,
        frames = engine.frames().len(),
        "song analysed"
    );
    Ok(summary)
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("sample_rate", &self.sample_rate)
            .field("pending", &self.pending.len())
            .field("total_samples", &self.total_samples)
            .field("frames", &self.frames.len())
            .finish()
    }
}

fn autocorrelation(envelope: &[f32], lag: usize) -> f32 {
    if lag >= envelope.len() {
        return 0.0;
    }
    envelope
        .iter()
        .zip(&envelope[lag..])
        .map(|(a, b)| a * b)
        .sum()
}

fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 24576 Hz with a 512 hop gives 48 analysis frames per second, so a
    // 120 BPM click lands exactly every 24 frames.
    const CLICK_RATE: u32 = 24_576;

    fn click_track(sample_rate: u32, bpm: f32, seconds: f32) -> Vec<f32> {
        let len = (sample_rate as f32 * seconds) as usize;
        let period = (sample_rate as f32 * 60.0 / bpm) as usize;
        let mut samples = vec![0.0; len];
        let mut start = period;
        while start + 64 < len {
            for sample in &mut samples[start..start + 64] {
                *sample = 1.0;
            }
            start += period;
        }
        samples
    }

    #[test]
    fn silence_has_no_tempo() {
        let mut engine = AnalysisEngine::new(CLICK_RATE).unwrap();
        engine.push_samples(&vec![0.0; CLICK_RATE as usize * 4]).unwrap();

        let summary = engine.summary();
        assert!(summary.tempo_bpm.is_none());
        assert_eq!(summary.peak_rms, 0.0);
        assert!((summary.duration_seconds.unwrap() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn detects_click_track_tempo() {
        let mut engine = AnalysisEngine::new(CLICK_RATE).unwrap();
        engine
            .push_samples(&click_track(CLICK_RATE, 120.0, 10.0))
            .unwrap();

        let tempo = engine.estimate_tempo().expect("tempo should be detected");
        assert!((tempo - 120.0).abs() < 1.0, "detected {tempo}");
    }

    #[test]
    fn streaming_matches_single_push() {
        let samples = click_track(CLICK_RATE, 120.0, 3.0);
        let mut whole = AnalysisEngine::new(CLICK_RATE).unwrap();
        whole.push_samples(&samples).unwrap();

        let mut chunked = AnalysisEngine::new(CLICK_RATE).unwrap();
        for chunk in samples.chunks(700) {
            chunked.push_samples(chunk).unwrap();
        }

        assert_eq!(whole.frames().len(), chunked.frames().len());
        let last_whole = whole.frames().last().unwrap();
        let last_chunked = chunked.frames().last().unwrap();
        assert_eq!(last_whole.time, last_chunked.time);
    }

    #[test]
    fn frames_are_spaced_by_hop() {
        let mut engine = AnalysisEngine::new(CLICK_RATE).unwrap();
        engine.push_samples(&vec![0.1; WINDOW_SIZE + HOP_SIZE]).unwrap();

        let frames = engine.frames();
        assert_eq!(frames.len(), 2);
        let spacing = frames[1].time - frames[0].time;
        assert!((spacing - HOP_SIZE as f32 / CLICK_RATE as f32).abs() < 1e-6);
    }

    #[test]
    fn analyses_stereo_song() {
        let mono = click_track(CLICK_RATE, 120.0, 6.0);
        let stereo: Vec<f32> = mono.iter().flat_map(|s| [*s, *s]).collect();
        let song = Song::new(stereo, CLICK_RATE, 2).unwrap();

        let summary = analyze_song(&song).unwrap();
        assert_eq!(summary.channels, 2);
        assert!((summary.duration_seconds.unwrap() - 6.0).abs() < 1e-3);
        assert!((summary.tempo_bpm.unwrap() - 120.0).abs() < 1.0);
    }
}
