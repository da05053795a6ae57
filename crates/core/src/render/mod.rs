use std::path::{Path, PathBuf};

use crate::{
    scene::stack_layers, CameliaError, ClipTimeline, FrameSize, Layer, LayerContent, Result, Song,
    TextOverlay,
};

/// Label of the final video stream in the filter graph.
pub const OUTPUT_LABEL: &str = "vout";

/// Ordered layers bound to the audio track, ready to be encoded.
#[derive(Debug, Clone)]
pub struct Composition<'a> {
    pub frame: FrameSize,
    pub fps: u32,
    pub layers: Vec<Layer>,
    pub audio: &'a Song,
    /// Final length in seconds: the audio duration, or the cut if shorter.
    pub duration: f64,
}

impl Composition<'_> {
    /// Source files of the clip layers in stacking order.
    pub fn clip_inputs(&self) -> Vec<&Path> {
        self.layers
            .iter()
            .filter_map(|layer| match &layer.content {
                LayerContent::Clip(clip) => Some(clip.source.path.as_path()),
                LayerContent::Text(_) => None,
            })
            .collect()
    }
}

/// Stacks `layers` bottom to top (background, main, text, watermark), binds
/// them to `audio` and optionally cuts the result to `cut` seconds.
pub fn compose<'a>(
    frame: FrameSize,
    fps: u32,
    layers: Vec<Layer>,
    audio: &'a Song,
    cut: Option<f64>,
) -> Result<Composition<'a>> {
    if fps == 0 {
        return Err(CameliaError::invalid("fps must be non-zero"));
    }
    if frame.width == 0 || frame.height == 0 {
        return Err(CameliaError::invalid("frame width/height must be non-zero"));
    }

    let audio_duration = audio.duration();
    let duration = match cut {
        Some(cut) if cut.is_finite() && cut > 0.0 => cut.min(audio_duration),
        Some(cut) => {
            return Err(CameliaError::invalid(format!(
                "cut must be a positive number of seconds, got {cut}"
            )))
        }
        None => audio_duration,
    };
    if duration <= 0.0 {
        return Err(CameliaError::invalid("the audio track is empty"));
    }

    let layers: Vec<Layer> = stack_layers(layers)
        .into_iter()
        .map(|layer| layer.clamped(duration))
        .collect();
    tracing::info!(
        layers = layers.len(),
        duration,
        width = frame.width,
        height = frame.height,
        "composed video"
    );

    Ok(Composition {
        frame,
        fps,
        layers,
        audio,
        duration,
    })
}

/// `-filter_complex` graph for a composition. Input 0 is the audio track;
/// clip inputs follow in the order of [`FilterGraph::inputs`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    pub inputs: Vec<PathBuf>,
    pub graph: String,
}

impl FilterGraph {
    pub fn build(composition: &Composition<'_>) -> Self {
        let FrameSize { width, height } = composition.frame;
        let fps = composition.fps;
        let total = composition.duration;

        let mut inputs = Vec::new();
        let mut chains = vec![format!(
            "color=c=black:s={width}x{height}:r={fps}:d={total:.6}[base0]"
        )];
        let mut base = 0;

        for layer in &composition.layers {
            let placement = layer.placement().clamped(total);
            if placement.duration <= 0.0 {
                tracing::debug!(kind = ?layer.kind, "skipping layer outside the video");
                continue;
            }
            let (start, end) = (placement.start, placement.end());

            match &layer.content {
                LayerContent::Clip(clip) => {
                    inputs.push(clip.source.path.clone());
                    let label = format!("l{}", inputs.len());
                    clip_chains(&mut chains, clip, inputs.len(), &label, fps);
                    chains.push(format!(
                        "[base{base}][{label}]overlay=x={x:.0}:y={y:.0}:eof_action=pass:enable='between(t,{start:.6},{end:.6})'[base{next}]",
                        x = clip.position.x,
                        y = clip.position.y,
                        next = base + 1,
                    ));
                }
                LayerContent::Text(overlay) => {
                    chains.push(format!(
                        "[base{base}]{}[base{next}]",
                        drawtext(overlay, start, end),
                        next = base + 1,
                    ));
                }
            }
            base += 1;
        }

        chains.push(format!("[base{base}]format=yuv420p[{OUTPUT_LABEL}]"));
        Self {
            inputs,
            graph: chains.join(";"),
        }
    }
}

fn clip_chains(chains: &mut Vec<String>, clip: &ClipTimeline, input: usize, label: &str, fps: u32) {
    let mut filters = vec![
        format!("trim=duration={:.6}", clip.trim),
        "setpts=PTS-STARTPTS".to_string(),
    ];
    if let Some(crop) = clip.crop {
        filters.push(format!(
            "crop={}:{}:{}:{}",
            crop.width, crop.height, crop.x, crop.y
        ));
    }
    if let Some(size) = clip.size {
        filters.push(format!("scale={}:{}", size.width, size.height));
    }
    if let Some(mask) = clip.mask {
        filters.push("format=rgba".to_string());
        filters.push(format!(
            "colorkey={}:{:.4}:{:.4}",
            mask.hex(),
            mask.similarity(),
            mask.blend()
        ));
    }
    if (clip.speed - 1.0).abs() > 1e-9 {
        filters.push(format!("setpts=PTS/{:.6}", clip.speed));
    }
    filters.push(format!("fps={fps}"));
    let head = format!("[{input}:v]{}", filters.join(","));
    let start = clip.start;

    match clip.expansion {
        Some(expansion) if expansion.repeats > 1 && expansion.crossfade > 0.0 => {
            let copies: String = (0..expansion.repeats)
                .map(|i| format!("[{label}c{i}]"))
                .collect();
            chains.push(format!("{head},split={}{copies}", expansion.repeats));

            let mut previous = format!("{label}c0");
            for k in 1..expansion.repeats {
                let faded = format!("{label}x{k}");
                let offset = k as f64 * (expansion.segment_duration - expansion.crossfade);
                chains.push(format!(
                    "[{previous}][{label}c{k}]xfade=transition=fade:duration={:.6}:offset={offset:.6}[{faded}]",
                    expansion.crossfade
                ));
                previous = faded;
            }
            chains.push(format!("[{previous}]setpts=PTS+{start:.6}/TB[{label}]"));
        }
        Some(expansion) if expansion.repeats > 1 => {
            let frames = (expansion.segment_duration * fps as f64).round().max(1.0) as u64;
            chains.push(format!(
                "{head},loop=loop={}:size={frames}:start=0,setpts=N/({fps}*TB)+{start:.6}/TB[{label}]",
                expansion.repeats - 1
            ));
        }
        _ => chains.push(format!("{head},setpts=PTS+{start:.6}/TB[{label}]")),
    }
}

fn drawtext(overlay: &TextOverlay, start: f64, end: f64) -> String {
    format!(
        "drawtext=expansion=none:text={}:font={}:fontcolor={}:fontsize={:.0}:x={:.0}:y={:.0}:enable='between(t,{start:.6},{end:.6})'",
        escape_filter_value(&overlay.text),
        escape_filter_value(&overlay.style.font),
        overlay.style.color,
        overlay.font_size,
        overlay.position.x,
        overlay.position.y,
    )
}

/// Escapes a filter option value so it survives both unescaping passes
/// ffmpeg applies: the option string first, then the whole graph.
pub fn escape_filter_value(value: &str) -> String {
    let mut option = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option.push('\\');
        }
        option.push(c);
    }

    let mut graph = String::with_capacity(option.len());
    for c in option.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph.push('\\');
        }
        graph.push(c);
    }
    graph
}
