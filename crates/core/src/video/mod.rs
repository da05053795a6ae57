use crate::{
    analyze_song, beat_duration, compose, drop_start, layout_labels, loop_repeats, start_offset,
    watermark_overlay, AssetStore, BpmSync, CameliaError, ClipInfo, ClipTimeline, ColorMask,
    Composition, CropRect, FrameSize, Layer, MediaBackend, Position, RenderJob, Result, Song,
    TextMetrics, TextOverlay, VideoConfig,
};

/// One render job: the song, its tempo grid, the labels and the look.
///
/// Every step returns a new [`ClipTimeline`] or overlay instead of mutating
/// the video, and [`MusicVideo::compose`] consumes the final layer list.
#[derive(Debug, Clone)]
pub struct MusicVideo {
    config: VideoConfig,
    frame: FrameSize,
    song: Song,
    artist: String,
    track: String,
    music_bpm: f64,
    beat_duration: f64,
    drop_beats: Option<u32>,
}

impl MusicVideo {
    pub fn new(
        song: Song,
        artist: impl Into<String>,
        track: impl Into<String>,
        music_bpm: f64,
        drop_beats: Option<u32>,
        config: VideoConfig,
    ) -> Result<Self> {
        if !(music_bpm.is_finite() && music_bpm > 0.0) {
            return Err(CameliaError::invalid(format!(
                "music BPM must be a positive number, got {music_bpm}"
            )));
        }
        config.validate()?;

        Ok(Self {
            frame: config.frame_size(),
            config,
            song,
            artist: artist.into(),
            track: track.into(),
            music_bpm,
            beat_duration: beat_duration(music_bpm),
            drop_beats,
        })
    }

    /// Decodes the job's song and, when the job carries no tempo, detects it.
    pub fn from_job(job: &RenderJob, backend: &dyn MediaBackend) -> Result<Self> {
        let song = backend.decode_song(&job.audio)?;
        let music_bpm = match job.music_bpm {
            Some(bpm) => bpm,
            None => {
                let summary = analyze_song(&song)?;
                let bpm = summary.tempo_bpm.ok_or_else(|| {
                    CameliaError::invalid(format!(
                        "could not detect a tempo in '{}'; pass the music BPM explicitly",
                        job.audio.display()
                    ))
                })?;
                tracing::info!(bpm, "detected music tempo");
                bpm as f64
            }
        };

        Self::new(
            song,
            job.artist.clone(),
            job.track.clone(),
            music_bpm,
            job.drop_beats,
            job.video.clone(),
        )
    }

    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    pub fn frame(&self) -> FrameSize {
        self.frame
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn music_bpm(&self) -> f64 {
        self.music_bpm
    }

    pub fn beat_duration(&self) -> f64 {
        self.beat_duration
    }

    pub fn drop_beats(&self) -> Option<u32> {
        self.drop_beats
    }

    pub fn audio_duration(&self) -> f64 {
        self.song.duration()
    }

    /// Centre-square crop of `info`, scaled to `square_prop` of the shortest
    /// frame side and centred in the frame.
    pub fn main_clip(&self, info: ClipInfo, mask: Option<ColorMask>) -> ClipTimeline {
        let shortest = self.frame.width.min(self.frame.height) as f64;
        let side = even((self.config.square_prop * shortest).round() as u32);
        let crop = CropRect::square(info.width, info.height);

        let clip = ClipTimeline::new(info)
            .cropped(crop)
            .resized(FrameSize::new(side, side))
            .positioned(Position::centered(self.frame, side as f64, side as f64));
        match mask {
            Some(mask) => clip.masked(mask),
            None => clip,
        }
    }

    /// Truncates `clip` to whole loops and changes its speed so its loops
    /// land on the music beat grid.
    pub fn sync_bpm_clip(
        &self,
        clip: ClipTimeline,
        video_bpm: Option<f64>,
        optimize_loop: bool,
    ) -> Result<ClipTimeline> {
        let sync = BpmSync::compute(self.music_bpm, video_bpm, clip.trim, optimize_loop)?;
        Ok(clip.synced(&sync))
    }

    /// Repeats `clip` over the whole song and delays it to the drop.
    ///
    /// `crossfade` seconds overlap each loop boundary; a negative value also
    /// starts the clip `crossfade * loop length` before the drop.
    pub fn loop_clip(&self, clip: ClipTimeline, crossfade: f64) -> Result<ClipTimeline> {
        let segment = clip.segment_duration();
        let repeats = loop_repeats(self.audio_duration(), segment)?;
        let start = drop_start(
            self.drop_beats,
            self.beat_duration,
            start_offset(crossfade, segment),
        );
        let looped = clip.looped(repeats, crossfade.abs())?.starting_at(start);

        let end = looped.placement().end();
        if end < self.audio_duration() {
            tracing::warn!(
                end,
                audio_duration = self.audio_duration(),
                repeats,
                crossfade,
                "looped clip ends before the song; crossfade is large relative to the loop"
            );
        }
        tracing::debug!(repeats, start, segment, "looped clip");
        Ok(looped)
    }

    /// Clip stretched to fill the frame and looped from time zero. With
    /// `sync` it is first treated as a one-loop clip and aligned to the beat,
    /// packing loops per beat like the main clip does.
    pub fn background_clip(&self, info: ClipInfo, sync: bool) -> Result<ClipTimeline> {
        let crop = CropRect::cover(info.width, info.height, self.frame);
        let clip = ClipTimeline::new(info).cropped(crop).resized(self.frame);
        let clip = if sync {
            self.sync_bpm_clip(clip, None, self.config.optimize_loop)?
        } else {
            clip
        };

        let repeats = loop_repeats(self.audio_duration(), clip.segment_duration())?;
        clip.looped(repeats, 0.0)
    }

    /// Artist and track labels, timed by the configured mode.
    pub fn text_overlays(&self, metrics: &dyn TextMetrics) -> Result<Vec<TextOverlay>> {
        let [artist, track] = layout_labels(
            self.frame,
            self.config.text_width_prop,
            &self.artist,
            &self.track,
            &self.config.text_preset.styles(),
            metrics,
        )?;
        let placement = self
            .config
            .text_timing
            .placement(self.beat_duration, self.audio_duration());

        Ok(vec![
            artist.with_placement(placement),
            track.with_placement(placement),
        ])
    }

    pub fn watermark(&self, metrics: &dyn TextMetrics) -> Result<Option<TextOverlay>> {
        if !self.config.watermark {
            return Ok(None);
        }
        watermark_overlay(
            self.frame,
            &self.config.watermark_text,
            self.audio_duration(),
            metrics,
        )
        .map(Some)
    }

    /// Builds every layer a job describes: backgrounds, the synced and looped
    /// main clip, labels and the optional watermark.
    pub fn plan_layers(
        &self,
        job: &RenderJob,
        assets: &mut AssetStore,
        backend: &dyn MediaBackend,
        metrics: &dyn TextMetrics,
    ) -> Result<Vec<Layer>> {
        let mut layers = Vec::new();

        for background in &job.backgrounds {
            let info = assets.load_clip(backend, &background.path)?;
            layers.push(Layer::background(
                self.background_clip(info, background.sync)?,
            ));
        }

        let info = assets.load_clip(backend, &job.main_clip.path)?;
        let main = self.main_clip(info, job.main_clip.mask);
        let main = self.sync_bpm_clip(main, job.main_clip.video_bpm, self.config.optimize_loop)?;
        let main = self.loop_clip(main, self.config.crossfade)?;
        layers.push(Layer::main(main));

        layers.extend(self.text_overlays(metrics)?.into_iter().map(Layer::text));
        if let Some(watermark) = self.watermark(metrics)? {
            layers.push(Layer::watermark(watermark));
        }

        tracing::info!(
            layers = layers.len(),
            music_bpm = self.music_bpm,
            drop_beats = ?self.drop_beats,
            "planned layers"
        );
        Ok(layers)
    }

    pub fn compose(&self, layers: Vec<Layer>, cut: Option<f64>) -> Result<Composition<'_>> {
        compose(self.frame, self.config.fps, layers, &self.song, cut)
    }
}

fn even(value: u32) -> u32 {
    (value - value % 2).max(2)
}
