//! Tempo alignment between a looping clip and the song.
//!
//! A clip with tempo `video_bpm` is sped up (or slowed down) so that
//! `loops` of its native loops last exactly one musical beat grid step:
//! `speed_factor * video_bpm * loops == music_bpm`.

use serde::{Deserialize, Serialize};

use crate::{CameliaError, Result};

const LOOP_EPSILON: f64 = 1e-9;

/// Seconds per beat at `bpm`.
pub fn beat_duration(bpm: f64) -> f64 {
    60.0 / bpm
}

/// Tempo of a clip that is a single perfect loop: `round(60 / duration)`.
pub fn infer_video_bpm(duration: f64) -> Result<f64> {
    ensure_positive("clip duration", duration)?;
    let bpm = (60.0 / duration).round();
    if bpm < 1.0 {
        return Err(CameliaError::invalid(format!(
            "cannot infer a tempo for a {duration:.3}s clip; pass its video BPM explicitly"
        )));
    }
    Ok(bpm)
}

/// Number of clip loops that fit in one music beat. Always at least 1.
pub fn loop_count(music_bpm: f64, video_bpm: f64, optimize_loop: bool) -> u32 {
    if !optimize_loop {
        return 1;
    }
    ((music_bpm / video_bpm).floor() as u32).max(1)
}

pub fn speed_factor(music_bpm: f64, video_bpm: f64, loops: u32) -> f64 {
    music_bpm / (video_bpm * loops as f64)
}

/// Drops any partial trailing loop. Clips shorter than one loop are kept
/// whole. Truncating an already truncated duration is a no-op.
pub fn truncate_to_loops(duration: f64, loop_duration: f64) -> f64 {
    let whole = (duration / loop_duration + LOOP_EPSILON).floor();
    if whole < 1.0 {
        duration
    } else {
        whole * loop_duration
    }
}

/// Outcome of aligning one clip to the song tempo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmSync {
    pub music_bpm: f64,
    pub video_bpm: f64,
    /// `true` when `video_bpm` was derived from the clip duration.
    pub inferred: bool,
    pub loops: u32,
    pub speed_factor: f64,
    /// Native length of one loop, before the speed change.
    pub loop_duration: f64,
    /// Source seconds kept after dropping the partial trailing loop.
    pub truncated_duration: f64,
}

impl BpmSync {
    pub fn compute(
        music_bpm: f64,
        video_bpm: Option<f64>,
        clip_duration: f64,
        optimize_loop: bool,
    ) -> Result<Self> {
        ensure_positive("music BPM", music_bpm)?;
        ensure_positive("clip duration", clip_duration)?;

        let (video_bpm, inferred, loop_duration, truncated_duration) = match video_bpm {
            Some(bpm) => {
                ensure_positive("video BPM", bpm)?;
                let loop_duration = beat_duration(bpm);
                if clip_duration + LOOP_EPSILON < loop_duration {
                    return Err(CameliaError::invalid(format!(
                        "clip of {clip_duration:.3}s is shorter than one beat at {bpm} BPM"
                    )));
                }
                let truncated = truncate_to_loops(clip_duration, loop_duration);
                (bpm, false, loop_duration, truncated)
            }
            None => (infer_video_bpm(clip_duration)?, true, clip_duration, clip_duration),
        };

        let loops = loop_count(music_bpm, video_bpm, optimize_loop);
        let sync = Self {
            music_bpm,
            video_bpm,
            inferred,
            loops,
            speed_factor: speed_factor(music_bpm, video_bpm, loops),
            loop_duration,
            truncated_duration,
        };
        tracing::debug!(
            music_bpm,
            video_bpm,
            inferred,
            loops,
            speed_factor = sync.speed_factor,
            truncated_duration,
            "computed bpm sync"
        );
        Ok(sync)
    }

    /// Length of the truncated clip once played at `speed_factor`.
    pub fn synced_duration(&self) -> f64 {
        self.truncated_duration / self.speed_factor
    }
}

fn ensure_positive(what: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CameliaError::invalid(format!(
            "{what} must be a positive number, got {value}"
        )))
    }
}
