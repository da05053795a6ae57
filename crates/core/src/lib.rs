//! Core library for Camelia, a generator of short music videos.
//!
//! A looping clip is sped up so its loops sit on the song's beat grid,
//! repeated over the whole song, revealed on the drop and stacked with
//! background loops and text labels. Decoding, compositing and encoding
//! are delegated to `ffmpeg`; this crate computes the timeline and drives
//! the tools.

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod config;
pub mod error;
pub mod media;
pub mod record;
pub mod render;
pub mod scene;
pub mod sync;
pub mod text;
pub mod timeline;
pub mod video;

pub use analysis::{analyze_song, AnalysisEngine, AnalysisFrame, AnalysisSummary};
pub use assets::AssetStore;
pub use audio::Song;
pub use config::{
    BackgroundSpec, FrameSize, LabelStyles, MainClipSpec, Platform, RenderJob, TextPreset,
    TextStyle, VideoConfig,
};
pub use error::{CameliaError, Result};
pub use media::{ClipInfo, Ffmpeg, MediaBackend};
pub use record::{OutputSettings, Recorder};
pub use render::{compose, Composition, FilterGraph, OUTPUT_LABEL};
pub use scene::{Layer, LayerContent, LayerKind};
pub use sync::{beat_duration, infer_video_bpm, loop_count, speed_factor, truncate_to_loops, BpmSync};
pub use text::{
    layout_labels, watermark_overlay, ApproxMetrics, TextBox, TextMetrics, TextOverlay, TextRole,
    TextTiming,
};
pub use timeline::{
    drop_start, expanded_duration, loop_repeats, start_offset, ClipTimeline, ColorMask, CropRect,
    LoopExpansion, Placement, Position,
};
pub use video::MusicVideo;
