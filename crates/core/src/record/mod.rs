use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use serde::{Deserialize, Serialize};

use crate::{CameliaError, Composition, FilterGraph, Result, OUTPUT_LABEL};

/// Where and how the final video is encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    pub path: PathBuf,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
    /// Keep the raw audio handed to the encoder next to the output.
    #[serde(default)]
    pub keep_temp_audio: bool,
}

fn default_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_overwrite() -> bool {
    true
}

impl OutputSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            codec: default_codec(),
            audio_codec: default_audio_codec(),
            overwrite: default_overwrite(),
            keep_temp_audio: false,
        }
    }

    /// Raw audio file written beside the output for the duration of a render.
    pub fn temp_audio_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        self.path.with_file_name(format!("{stem}.temp-audio.f32"))
    }
}

/// Pipes a [`Composition`] through the system `ffmpeg`.
#[derive(Debug, Clone)]
pub struct Recorder {
    settings: OutputSettings,
    ffmpeg: PathBuf,
}

impl Recorder {
    pub fn new(settings: OutputSettings) -> Self {
        Self::with_ffmpeg(settings, "ffmpeg")
    }

    pub fn with_ffmpeg(settings: OutputSettings, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn settings(&self) -> &OutputSettings {
        &self.settings
    }

    /// Full ffmpeg argument list, reading the song from `audio_path` as raw
    /// little-endian `f32` PCM.
    pub fn command_args(&self, composition: &Composition<'_>, audio_path: &Path) -> Vec<OsString> {
        let graph = FilterGraph::build(composition);
        let audio = composition.audio;

        let mut args: Vec<OsString> = Vec::new();
        let overwrite = if self.settings.overwrite { "-y" } else { "-n" };
        args.push(overwrite.into());
        for value in ["-loglevel", "error", "-f", "f32le"] {
            args.push(value.into());
        }
        args.push("-ar".into());
        args.push(audio.sample_rate().to_string().into());
        args.push("-ac".into());
        args.push(audio.channels().to_string().into());

        args.push("-i".into());
        args.push(audio_path.as_os_str().to_os_string());
        for input in &graph.inputs {
            args.push("-i".into());
            args.push(input.as_os_str().to_os_string());
        }

        for value in [
            "-filter_complex".to_string(),
            graph.graph,
            "-map".to_string(),
            format!("[{OUTPUT_LABEL}]"),
            "-map".to_string(),
            "0:a".to_string(),
            "-c:v".to_string(),
            self.settings.codec.clone(),
            "-c:a".to_string(),
            self.settings.audio_codec.clone(),
            "-t".to_string(),
            format!("{:.6}", composition.duration),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ] {
            args.push(value.into());
        }
        args.push(self.settings.path.as_os_str().to_os_string());
        args
    }

    /// Encodes `composition` to the configured output path.
    pub fn record(&self, composition: &Composition<'_>) -> Result<()> {
        let output = &self.settings.path;
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !self.settings.overwrite && output.exists() {
            return Err(CameliaError::invalid(format!(
                "output file '{}' already exists",
                output.display()
            )));
        }

        let audio_path = self.settings.temp_audio_path();
        composition.audio.write_f32le(&audio_path)?;

        let args = self.command_args(composition, &audio_path);
        tracing::info!(
            output = %output.display(),
            codec = %self.settings.codec,
            audio_codec = %self.settings.audio_codec,
            "encoding video"
        );
        let result = Command::new(&self.ffmpeg).args(&args).output();

        if !self.settings.keep_temp_audio {
            if let Err(err) = std::fs::remove_file(&audio_path) {
                tracing::warn!(path = %audio_path.display(), %err, "could not remove temporary audio");
            }
        }

        let out = result.map_err(|e| {
            CameliaError::media(format!("failed to spawn ffmpeg (is it installed and on PATH?): {e}"))
        })?;
        if !out.status.success() {
            return Err(CameliaError::media(format!(
                "ffmpeg exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        tracing::info!(output = %output.display(), "video written");
        Ok(())
    }
}
