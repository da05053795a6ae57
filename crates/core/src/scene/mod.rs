use serde::{Deserialize, Serialize};

use crate::{ClipTimeline, Placement, TextOverlay};

/// Stacking slot of a layer, bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Background,
    Main,
    Text,
    Watermark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerContent {
    Clip(ClipTimeline),
    Text(TextOverlay),
}

/// One entry of the ordered layer list handed to composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub kind: LayerKind,
    pub content: LayerContent,
}

impl Layer {
    pub fn background(clip: ClipTimeline) -> Self {
        Self {
            kind: LayerKind::Background,
            content: LayerContent::Clip(clip),
        }
    }

    pub fn main(clip: ClipTimeline) -> Self {
        Self {
            kind: LayerKind::Main,
            content: LayerContent::Clip(clip),
        }
    }

    pub fn text(overlay: TextOverlay) -> Self {
        Self {
            kind: LayerKind::Text,
            content: LayerContent::Text(overlay),
        }
    }

    pub fn watermark(overlay: TextOverlay) -> Self {
        Self {
            kind: LayerKind::Watermark,
            content: LayerContent::Text(overlay),
        }
    }

    pub fn placement(&self) -> Placement {
        match &self.content {
            LayerContent::Clip(clip) => clip.placement(),
            LayerContent::Text(overlay) => overlay.placement,
        }
    }

    /// Returns the layer with its timeline interval limited to `[0, total]`.
    pub fn clamped(self, total: f64) -> Self {
        let content = match self.content {
            LayerContent::Clip(clip) => {
                let start = clip.start.min(total);
                LayerContent::Clip(clip.starting_at(start))
            }
            LayerContent::Text(overlay) => {
                let placement = overlay.placement.clamped(total);
                LayerContent::Text(overlay.with_placement(placement))
            }
        };
        Self {
            kind: self.kind,
            content,
        }
    }
}

/// Stable sort into stacking order; layers of one kind keep their
/// relative order.
pub fn stack_layers(mut layers: Vec<Layer>) -> Vec<Layer> {
    layers.sort_by_key(|layer| layer.kind);
    layers
}
