use serde::{Deserialize, Serialize};

use crate::{BpmSync, CameliaError, ClipInfo, FrameSize, Result};

/// Interval a layer occupies on the master timeline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub start: f64,
    pub duration: f64,
}

impl Placement {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, duration }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Restricts the interval to `[0, total]`.
    pub fn clamped(self, total: f64) -> Self {
        let start = self.start.clamp(0.0, total);
        let end = self.end().clamp(start, total);
        Self {
            start,
            duration: end - start,
        }
    }
}

/// Top-left corner of a layer in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Position that centres a `width` x `height` box in `frame`.
    pub fn centered(frame: FrameSize, width: f64, height: f64) -> Self {
        Self {
            x: frame.width as f64 / 2.0 - width / 2.0,
            y: frame.height as f64 / 2.0 - height / 2.0,
        }
    }
}

/// Source-space crop rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Centred square of side `min(width, height)`.
    pub fn square(width: u32, height: u32) -> Self {
        let side = width.min(height);
        Self {
            x: (width - side) / 2,
            y: (height - side) / 2,
            width: side,
            height: side,
        }
    }

    /// Centred crop with the aspect ratio of `frame`, so that scaling it to
    /// `frame` fills the frame without distortion.
    pub fn cover(width: u32, height: u32, frame: FrameSize) -> Self {
        let source_ratio = width as f64 / height as f64;
        let frame_ratio = frame.width as f64 / frame.height as f64;
        let (crop_width, crop_height) = if source_ratio > frame_ratio {
            (((height as f64 * frame_ratio).round() as u32).clamp(1, width), height)
        } else {
            (width, ((width as f64 / frame_ratio).round() as u32).clamp(1, height))
        };
        Self {
            x: (width - crop_width) / 2,
            y: (height - crop_height) / 2,
            width: crop_width,
            height: crop_height,
        }
    }
}

/// Makes pixels close to `color` transparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMask {
    pub color: [u8; 3],
    /// Distance from `color` still keyed out, 0..=255.
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    /// Width of the soft edge, 0..=100.
    #[serde(default)]
    pub softness: u8,
}

fn default_threshold() -> u8 {
    20
}

impl ColorMask {
    pub fn hex(&self) -> String {
        let [r, g, b] = self.color;
        format!("0x{r:02X}{g:02X}{b:02X}")
    }

    pub fn similarity(&self) -> f64 {
        (self.threshold as f64 / 255.0).clamp(0.01, 1.0)
    }

    pub fn blend(&self) -> f64 {
        (self.softness as f64 / 100.0).clamp(0.0, 1.0)
    }
}

/// Back-to-back repetition of a clip segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopExpansion {
    pub repeats: u32,
    /// Overlap between consecutive repetitions in seconds.
    pub crossfade: f64,
    pub segment_duration: f64,
    pub total_duration: f64,
}

impl LoopExpansion {
    pub fn new(segment_duration: f64, repeats: u32, crossfade: f64) -> Result<Self> {
        if repeats == 0 {
            return Err(CameliaError::invalid("a loop needs at least one repetition"));
        }
        if !(crossfade >= 0.0) {
            return Err(CameliaError::invalid("loop crossfade must be non-negative"));
        }
        if repeats > 1 && crossfade >= segment_duration {
            return Err(CameliaError::invalid(format!(
                "crossfade of {crossfade:.3}s must be shorter than the {segment_duration:.3}s loop"
            )));
        }

        Ok(Self {
            repeats,
            crossfade,
            segment_duration,
            total_duration: expanded_duration(segment_duration, repeats, crossfade),
        })
    }
}

/// Repetitions needed to cover `audio_duration`. One more than strictly
/// needed; the excess is cut when the composite is trimmed.
pub fn loop_repeats(audio_duration: f64, clip_duration: f64) -> Result<u32> {
    if !(clip_duration.is_finite() && clip_duration > 0.0) {
        return Err(CameliaError::invalid("clip duration must be positive"));
    }
    if !(audio_duration.is_finite() && audio_duration >= 0.0) {
        return Err(CameliaError::invalid("audio duration must be non-negative"));
    }
    let whole = (audio_duration / clip_duration).floor();
    if whole >= f64::from(u32::MAX) {
        return Err(CameliaError::invalid(format!(
            "a {clip_duration}s clip would need more than {} repeats to cover {audio_duration}s",
            u32::MAX
        )));
    }
    Ok(whole as u32 + 1)
}

/// Length of `repeats` segments where each boundary overlaps by `crossfade`.
pub fn expanded_duration(segment_duration: f64, repeats: u32, crossfade: f64) -> f64 {
    let repeats = repeats as f64;
    repeats * segment_duration - (repeats - 1.0).max(0.0) * crossfade
}

/// Lead-in before the drop. A negative crossfade `c` starts the clip
/// `c * clip_duration` seconds early; other values start on the drop.
pub fn start_offset(crossfade: f64, clip_duration: f64) -> f64 {
    if crossfade < 0.0 {
        crossfade * clip_duration
    } else {
        0.0
    }
}

/// Timeline start of the main clip, never before zero.
pub fn drop_start(drop_beats: Option<u32>, beat_duration: f64, start_offset: f64) -> f64 {
    match drop_beats {
        Some(beats) => (beats as f64 * beat_duration + start_offset).max(0.0),
        None => 0.0,
    }
}

/// Every transform applied to one source clip, as a value. Each step
/// returns a new record; nothing is mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipTimeline {
    pub source: ClipInfo,
    /// Source seconds used, starting at the first frame.
    pub trim: f64,
    pub crop: Option<CropRect>,
    pub size: Option<FrameSize>,
    pub mask: Option<ColorMask>,
    /// Playback rate relative to the source.
    pub speed: f64,
    pub expansion: Option<LoopExpansion>,
    pub start: f64,
    pub position: Position,
}

impl ClipTimeline {
    pub fn new(source: ClipInfo) -> Self {
        Self {
            trim: source.duration,
            source,
            crop: None,
            size: None,
            mask: None,
            speed: 1.0,
            expansion: None,
            start: 0.0,
            position: Position::default(),
        }
    }

    pub fn cropped(self, crop: CropRect) -> Self {
        Self {
            crop: Some(crop),
            ..self
        }
    }

    pub fn resized(self, size: FrameSize) -> Self {
        Self {
            size: Some(size),
            ..self
        }
    }

    pub fn masked(self, mask: ColorMask) -> Self {
        Self {
            mask: Some(mask),
            ..self
        }
    }

    /// Applies the truncation and speed change of `sync`.
    pub fn synced(self, sync: &BpmSync) -> Self {
        Self {
            trim: sync.truncated_duration.min(self.trim),
            speed: self.speed * sync.speed_factor,
            ..self
        }
    }

    pub fn looped(self, repeats: u32, crossfade: f64) -> Result<Self> {
        let expansion = LoopExpansion::new(self.segment_duration(), repeats, crossfade)?;
        Ok(Self {
            expansion: Some(expansion),
            ..self
        })
    }

    pub fn starting_at(self, start: f64) -> Self {
        Self {
            start: start.max(0.0),
            ..self
        }
    }

    pub fn positioned(self, position: Position) -> Self {
        Self { position, ..self }
    }

    /// Duration of one pass over the trimmed source at the current speed.
    pub fn segment_duration(&self) -> f64 {
        self.trim / self.speed
    }

    pub fn duration(&self) -> f64 {
        self.expansion
            .map(|e| e.total_duration)
            .unwrap_or_else(|| self.segment_duration())
    }

    pub fn placement(&self) -> Placement {
        Placement::new(self.start, self.duration())
    }

    /// On-screen size after crop and resize.
    pub fn display_size(&self) -> FrameSize {
        match (self.size, self.crop) {
            (Some(size), _) => size,
            (None, Some(crop)) => FrameSize::new(crop.width, crop.height),
            (None, None) => FrameSize::new(self.source.width, self.source.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn clip(width: u32, height: u32, duration: f64) -> ClipInfo {
        ClipInfo {
            path: PathBuf::from("loop.mp4"),
            width,
            height,
            duration,
        }
    }

    #[test]
    fn repeats_always_cover_audio() {
        assert_eq!(loop_repeats(10.0, 2.0).unwrap(), 6);
        assert_eq!(loop_repeats(9.5, 2.0).unwrap(), 5);
        assert_eq!(loop_repeats(0.0, 2.0).unwrap(), 1);
        assert!(loop_repeats(10.0, 0.0).is_err());
        let err = loop_repeats(180.0, 1e-8).unwrap_err();
        assert!(matches!(err, CameliaError::InvalidArgument(_)));
        assert_eq!(loop_repeats(f64::from(u32::MAX - 1), 1.0).unwrap(), u32::MAX);
    }

    #[test]
    fn crossfade_shortens_expansion() {
        let expansion = LoopExpansion::new(2.0, 4, 0.5).unwrap();
        assert!((expansion.total_duration - 6.5).abs() < 1e-12);
        assert_eq!(expanded_duration(2.0, 1, 0.5), 2.0);
    }

    #[test]
    fn crossfade_longer_than_loop_is_rejected() {
        let err = LoopExpansion::new(1.0, 3, 1.0).unwrap_err();
        assert!(matches!(err, CameliaError::InvalidArgument(_)));
        assert!(LoopExpansion::new(1.0, 1, 1.0).is_ok());
    }

    #[test]
    fn no_drop_means_zero_start() {
        let offset = start_offset(-0.5, 2.0);
        assert_eq!(drop_start(Some(0), 0.5, offset), 0.0);
        assert_eq!(drop_start(None, 0.5, offset), 0.0);
    }

    #[test]
    fn negative_crossfade_leads_into_drop() {
        let offset = start_offset(-0.25, 2.0);
        assert_eq!(offset, -0.5);
        let beat = 60.0 / 120.0;
        assert!((drop_start(Some(4), beat, offset) - 1.5).abs() < 1e-12);
        assert_eq!(drop_start(Some(1), beat, start_offset(-1.0, 2.0)), 0.0);
    }

    #[test]
    fn positive_crossfade_starts_on_drop() {
        assert_eq!(start_offset(0.5, 2.0), 0.0);
        let beat = 60.0 / 91.0;
        assert!((drop_start(Some(14), beat, 0.0) - 14.0 * beat).abs() < 1e-12);
    }

    #[test]
    fn placement_clamps_to_total() {
        let placement = Placement::new(8.0, 5.0).clamped(10.0);
        assert_eq!(placement, Placement::new(8.0, 2.0));
        let late = Placement::new(12.0, 1.0).clamped(10.0);
        assert_eq!(late.duration, 0.0);
        assert_eq!(late.start, 10.0);
    }

    #[test]
    fn square_crop_is_centered() {
        assert_eq!(
            CropRect::square(1920, 1080),
            CropRect {
                x: 420,
                y: 0,
                width: 1080,
                height: 1080
            }
        );
        assert_eq!(CropRect::square(500, 500).x, 0);
    }

    #[test]
    fn cover_crop_matches_frame_aspect() {
        let crop = CropRect::cover(1920, 1080, FrameSize::new(1080, 1920));
        assert_eq!(crop.height, 1080);
        assert_eq!(crop.width, 608);
        assert_eq!(crop.x, (1920 - 608) / 2);

        let wide = CropRect::cover(400, 400, FrameSize::new(1920, 1080));
        assert_eq!(wide.width, 400);
        assert_eq!(wide.height, 225);
    }

    #[test]
    fn mask_formats_for_colorkey() {
        let mask = ColorMask {
            color: [235, 238, 231],
            threshold: 20,
            softness: 10,
        };
        assert_eq!(mask.hex(), "0xEBEEE7");
        assert!((mask.similarity() - 20.0 / 255.0).abs() < 1e-12);
        assert!((mask.blend() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn transforms_return_new_records() {
        let base = ClipTimeline::new(clip(1920, 1080, 2.0));
        let sync = BpmSync::compute(120.0, None, base.trim, false).unwrap();
        let synced = base.clone().synced(&sync);

        assert_eq!(base.speed, 1.0);
        assert_eq!(synced.speed, 4.0);
        assert!((synced.segment_duration() - 0.5).abs() < 1e-12);

        let looped = synced.looped(5, 0.0).unwrap().starting_at(-3.0);
        assert!((looped.duration() - 2.5).abs() < 1e-12);
        assert_eq!(looped.placement().start, 0.0);
    }

    #[test]
    fn display_size_prefers_resize_then_crop() {
        let base = ClipTimeline::new(clip(1920, 1080, 2.0));
        assert_eq!(base.display_size(), FrameSize::new(1920, 1080));
        let cropped = base.cropped(CropRect::square(1920, 1080));
        assert_eq!(cropped.display_size(), FrameSize::new(1080, 1080));
        let resized = cropped.resized(FrameSize::new(540, 540));
        assert_eq!(resized.display_size(), FrameSize::new(540, 540));
    }
}
