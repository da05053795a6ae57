use std::{fmt, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::error::Category;

use crate::{CameliaError, ColorMask, OutputSettings, Result, TextTiming};

/// Output frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Platforms with a known, optimised frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Platform {
    #[default]
    Instagram,
    Story,
    Youtube,
    Twitter,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Instagram,
        Platform::Story,
        Platform::Youtube,
        Platform::Twitter,
    ];

    pub fn frame_size(self) -> FrameSize {
        match self {
            Platform::Instagram => FrameSize::new(1080, 1080),
            Platform::Story => FrameSize::new(1080, 1920),
            Platform::Youtube => FrameSize::new(1920, 1080),
            Platform::Twitter => FrameSize::new(1280, 720),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Story => "story",
            Platform::Youtube => "youtube",
            Platform::Twitter => "twitter",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = CameliaError;

    fn from_str(value: &str) -> Result<Self> {
        Platform::ALL
            .into_iter()
            .find(|platform| platform.name() == value)
            .ok_or_else(|| CameliaError::invalid(format!("the platform `{value}` does not exist")))
    }
}

impl TryFrom<String> for Platform {
    type Error = CameliaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Colour and font used to draw one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    pub color: String,
    pub font: String,
}

impl TextStyle {
    fn new(color: &str, font: &str) -> Self {
        Self {
            color: color.to_string(),
            font: font.to_string(),
        }
    }
}

/// Styles for the artist and track labels of a preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelStyles {
    pub artist: TextStyle,
    pub track: TextStyle,
}

/// Named graphic charts for the text overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum TextPreset {
    #[default]
    Fancy,
    Minimal,
    Neon,
}

impl TextPreset {
    pub const ALL: [TextPreset; 3] = [TextPreset::Fancy, TextPreset::Minimal, TextPreset::Neon];

    pub fn styles(self) -> LabelStyles {
        match self {
            TextPreset::Fancy => LabelStyles {
                artist: TextStyle::new("white", "Helvetica"),
                track: TextStyle::new("white", "Helvetica-Bold"),
            },
            TextPreset::Minimal => LabelStyles {
                artist: TextStyle::new("white", "DejaVu Sans"),
                track: TextStyle::new("white", "DejaVu Sans"),
            },
            TextPreset::Neon => LabelStyles {
                artist: TextStyle::new("cyan", "DejaVu Sans Bold"),
                track: TextStyle::new("magenta", "DejaVu Sans Bold"),
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TextPreset::Fancy => "fancy",
            TextPreset::Minimal => "minimal",
            TextPreset::Neon => "neon",
        }
    }
}

impl fmt::Display for TextPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextPreset {
    type Err = CameliaError;

    fn from_str(value: &str) -> Result<Self> {
        TextPreset::ALL
            .into_iter()
            .find(|preset| preset.name() == value)
            .ok_or_else(|| {
                CameliaError::invalid(format!("the text preset `{value}` does not exist"))
            })
    }
}

impl TryFrom<String> for TextPreset {
    type Error = CameliaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Look and timing settings shared by every layer of a render job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub platform: Platform,
    pub fps: u32,
    pub text_preset: TextPreset,
    pub text_timing: TextTiming,
    /// Label width as a proportion of the frame width.
    pub text_width_prop: f64,
    /// Side of the square-cropped main clip as a proportion of the
    /// shortest frame side.
    pub square_prop: f64,
    /// Seconds of crossfade at each loop boundary. A negative value also
    /// starts the main clip ahead of the drop by `crossfade * loop length`.
    pub crossfade: f64,
    pub optimize_loop: bool,
    pub watermark: bool,
    pub watermark_text: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            fps: 30,
            text_preset: TextPreset::default(),
            text_timing: TextTiming::default(),
            text_width_prop: 0.5,
            square_prop: 1.0,
            crossfade: 0.0,
            optimize_loop: true,
            watermark: false,
            watermark_text: "camelia".to_string(),
        }
    }
}

impl VideoConfig {
    pub fn frame_size(&self) -> FrameSize {
        self.platform.frame_size()
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(CameliaError::invalid("fps must be non-zero"));
        }
        if !(self.text_width_prop > 0.0 && self.text_width_prop <= 1.0) {
            return Err(CameliaError::invalid(
                "text width proportion must be in (0, 1]",
            ));
        }
        if !(self.square_prop > 0.0 && self.square_prop <= 1.0) {
            return Err(CameliaError::invalid("square proportion must be in (0, 1]"));
        }
        if !self.crossfade.is_finite() {
            return Err(CameliaError::invalid("crossfade must be finite"));
        }
        Ok(())
    }
}

/// The main looping clip of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainClipSpec {
    pub path: PathBuf,
    /// Tempo of the footage. When absent the clip is treated as a single
    /// perfect loop and its tempo is inferred from its duration.
    #[serde(default)]
    pub video_bpm: Option<f64>,
    #[serde(default)]
    pub mask: Option<ColorMask>,
}

/// A clip looped behind the main clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub sync: bool,
}

/// Complete description of one render, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub audio: PathBuf,
    #[serde(default)]
    pub music_bpm: Option<f64>,
    pub main_clip: MainClipSpec,
    #[serde(default)]
    pub backgrounds: Vec<BackgroundSpec>,
    pub artist: String,
    pub track: String,
    #[serde(default)]
    pub drop_beats: Option<u32>,
    #[serde(default)]
    pub cut: Option<f64>,
    #[serde(default)]
    pub video: VideoConfig,
    pub output: OutputSettings,
}

impl RenderJob {
    /// Parses a job. Well-formed JSON carrying an unknown mode, a missing
    /// field or a value of the wrong type is an `InvalidArgument`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let job: RenderJob = serde_json::from_str(json).map_err(|err| match err.classify() {
            Category::Data => CameliaError::invalid(format!("invalid render job: {err}")),
            _ => CameliaError::Json(err),
        })?;
        job.video.validate()?;
        Ok(job)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platforms_map_to_frame_sizes() {
        assert_eq!(Platform::Instagram.frame_size(), FrameSize::new(1080, 1080));
        assert_eq!(Platform::Story.frame_size(), FrameSize::new(1080, 1920));
        assert_eq!("youtube".parse::<Platform>().unwrap(), Platform::Youtube);
    }

    #[test]
    fn unknown_platform_is_invalid_argument() {
        let err = "myspace".parse::<Platform>().unwrap_err();
        assert!(matches!(err, CameliaError::InvalidArgument(_)));
    }

    #[test]
    fn fancy_preset_uses_bold_track_font() {
        let styles = TextPreset::Fancy.styles();
        assert_eq!(styles.artist.font, "Helvetica");
        assert_eq!(styles.track.font, "Helvetica-Bold");
        assert_eq!(styles.track.color, "white");
        assert_eq!("neon".parse::<TextPreset>().unwrap(), TextPreset::Neon);
    }

    #[test]
    fn default_config_is_valid() {
        let config = VideoConfig::default();
        config.validate().unwrap();
        assert!(config.optimize_loop);
        assert_eq!(config.frame_size(), FrameSize::new(1080, 1080));
    }

    #[test]
    fn rejects_out_of_range_proportions() {
        let config = VideoConfig {
            square_prop: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_minimal_job_with_defaults() {
        let job = RenderJob::from_json_str(
            r#"{
                "audio": "assets/chiptune.mp3",
                "music_bpm": 95.5,
                "main_clip": { "path": "assets/loops/loop.mp4" },
                "backgrounds": [{ "path": "assets/loops/boreal_static.gif", "sync": true }],
                "artist": "Tices",
                "track": "Chiptune",
                "drop_beats": 4,
                "cut": 10.0,
                "video": { "crossfade": 0.5, "optimize_loop": false },
                "output": { "path": "results/test.mp4" }
            }"#,
        )
        .unwrap();

        assert_eq!(job.music_bpm, Some(95.5));
        assert_eq!(job.drop_beats, Some(4));
        assert!(job.main_clip.video_bpm.is_none());
        assert!(job.backgrounds[0].sync);
        assert!(!job.video.optimize_loop);
        assert_eq!(job.video.fps, 30);
        assert_eq!(job.video.text_timing, TextTiming::BeforeDrop);
        assert_eq!(job.output.codec, "libx264");
        assert_eq!(job.output.audio_codec, "aac");
    }

    #[test]
    fn rejects_unknown_timing_mode_in_job() {
        let err = RenderJob::from_json_str(
            r#"{
                "audio": "a.mp3",
                "main_clip": { "path": "loop.mp4" },
                "artist": "A",
                "track": "B",
                "video": { "text_timing": "sideways" },
                "output": { "path": "out.mp4" }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CameliaError::InvalidArgument(_)));
        assert!(err.to_string().contains("the text timing mode `sideways` does not exist"));
    }

    #[test]
    fn rejects_unknown_platform_and_preset_in_job() {
        for video in [r#"{ "platform": "myspace" }"#, r#"{ "text_preset": "gothic" }"#] {
            let json = format!(
                r#"{{
                    "audio": "a.mp3",
                    "main_clip": {{ "path": "loop.mp4" }},
                    "artist": "A",
                    "track": "B",
                    "video": {video},
                    "output": {{ "path": "out.mp4" }}
                }}"#
            );
            let err = RenderJob::from_json_str(&json).unwrap_err();
            assert!(matches!(err, CameliaError::InvalidArgument(_)), "{err}");
        }
    }

    #[test]
    fn named_modes_round_trip_through_json() {
        let config = VideoConfig {
            platform: Platform::Story,
            text_preset: TextPreset::Neon,
            text_timing: TextTiming::Full,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""platform":"story""#));
        let back: VideoConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.platform, Platform::Story);
        assert_eq!(back.text_preset, TextPreset::Neon);
        assert_eq!(back.text_timing, TextTiming::Full);
    }

    #[test]
    fn malformed_json_stays_a_json_error() {
        let err = RenderJob::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, CameliaError::Json(_)));
    }
}
