use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{CameliaError, FrameSize, LabelStyles, Placement, Position, Result, TextStyle};

/// Beats the labels stay on screen in [`TextTiming::BeforeDrop`] mode.
pub const INTRO_BEATS: f64 = 4.0;
/// Gap in pixels between the artist and track labels.
pub const LABEL_MARGIN: f64 = 20.0;
/// Top of the artist label as a proportion of the frame height.
pub const LABEL_TOP: f64 = 0.1;

/// When the labels are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum TextTiming {
    /// The first [`INTRO_BEATS`] beats of the video.
    #[default]
    BeforeDrop,
    /// The whole video.
    Full,
}

impl TextTiming {
    pub fn name(self) -> &'static str {
        match self {
            TextTiming::BeforeDrop => "before_drop",
            TextTiming::Full => "full",
        }
    }

    pub fn placement(self, beat_duration: f64, video_duration: f64) -> Placement {
        match self {
            TextTiming::BeforeDrop => {
                Placement::new(0.0, INTRO_BEATS * beat_duration).clamped(video_duration)
            }
            TextTiming::Full => Placement::new(0.0, video_duration),
        }
    }
}

impl fmt::Display for TextTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextTiming {
    type Err = CameliaError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "before_drop" => Ok(TextTiming::BeforeDrop),
            "full" => Ok(TextTiming::Full),
            other => Err(CameliaError::invalid(format!(
                "the text timing mode `{other}` does not exist"
            ))),
        }
    }
}

impl TryFrom<String> for TextTiming {
    type Error = CameliaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Rendered extent of a label in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub width: f64,
    pub height: f64,
}

/// Font measurement used to size and stack labels.
pub trait TextMetrics {
    fn measure(&self, text: &str, font: &str, font_size: f64) -> TextBox;

    /// Font size at which `text` is exactly `target_width` wide.
    fn fit_width(&self, text: &str, font: &str, target_width: f64) -> f64 {
        let unit = self.measure(text, font, 1.0);
        if unit.width <= 0.0 {
            return 0.0;
        }
        target_width / unit.width
    }
}

/// Fixed-advance approximation of a proportional font.
#[derive(Debug, Clone, Copy)]
pub struct ApproxMetrics {
    pub advance_em: f64,
    pub line_height_em: f64,
}

impl Default for ApproxMetrics {
    fn default() -> Self {
        Self {
            advance_em: 0.6,
            line_height_em: 1.2,
        }
    }
}

impl TextMetrics for ApproxMetrics {
    fn measure(&self, text: &str, _font: &str, font_size: f64) -> TextBox {
        let chars = text.chars().count() as f64;
        TextBox {
            width: chars * self.advance_em * font_size,
            height: self.line_height_em * font_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextRole {
    Artist,
    Track,
    Watermark,
}

/// A positioned, timed label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub role: TextRole,
    pub text: String,
    pub style: TextStyle,
    pub font_size: f64,
    pub size: TextBox,
    pub position: Position,
    pub placement: Placement,
}

impl TextOverlay {
    pub fn with_placement(self, placement: Placement) -> Self {
        Self { placement, ..self }
    }
}

fn fitted_label(
    role: TextRole,
    text: &str,
    style: &TextStyle,
    target_width: f64,
    metrics: &dyn TextMetrics,
) -> Result<TextOverlay> {
    if text.trim().is_empty() {
        return Err(CameliaError::invalid(format!(
            "the {role:?} label must not be empty"
        )));
    }

    let font_size = metrics.fit_width(text, &style.font, target_width);
    let size = metrics.measure(text, &style.font, font_size);
    Ok(TextOverlay {
        role,
        text: text.to_string(),
        style: style.clone(),
        font_size,
        size,
        position: Position::default(),
        placement: Placement::new(0.0, 0.0),
    })
}

/// Lays out the artist label at the top of the frame and the track label
/// right below it, both centred and fitted to `width_prop` of the frame.
/// The returned overlays are not timed yet.
pub fn layout_labels(
    frame: FrameSize,
    width_prop: f64,
    artist: &str,
    track: &str,
    styles: &LabelStyles,
    metrics: &dyn TextMetrics,
) -> Result<[TextOverlay; 2]> {
    let target_width = width_prop * frame.width as f64;
    let centre_x = frame.width as f64 / 2.0;

    let artist = fitted_label(TextRole::Artist, artist, &styles.artist, target_width, metrics)?;
    let artist_y = LABEL_TOP * frame.height as f64;
    let artist = TextOverlay {
        position: Position::new(centre_x - artist.size.width / 2.0, artist_y),
        ..artist
    };

    let track = fitted_label(TextRole::Track, track, &styles.track, target_width, metrics)?;
    let track_y = artist_y + artist.size.height + LABEL_MARGIN;
    let track = TextOverlay {
        position: Position::new(centre_x - track.size.width / 2.0, track_y),
        ..track
    };

    Ok([artist, track])
}

/// Small translucent label in the bottom-right corner for the whole video.
pub fn watermark_overlay(
    frame: FrameSize,
    text: &str,
    duration: f64,
    metrics: &dyn TextMetrics,
) -> Result<TextOverlay> {
    if text.trim().is_empty() {
        return Err(CameliaError::invalid("the watermark text must not be empty"));
    }

    let style = TextStyle {
        color: "white@0.6".to_string(),
        font: "DejaVu Sans".to_string(),
    };
    let font_size = 0.03 * frame.height as f64;
    let size = metrics.measure(text, &style.font, font_size);
    let position = Position::new(
        frame.width as f64 - size.width - LABEL_MARGIN,
        frame.height as f64 - size.height - LABEL_MARGIN,
    );

    Ok(TextOverlay {
        role: TextRole::Watermark,
        text: text.to_string(),
        style,
        font_size,
        size,
        position,
        placement: Placement::new(0.0, duration),
    })
}
