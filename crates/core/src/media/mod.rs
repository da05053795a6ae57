use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use serde::{Deserialize, Serialize};

use crate::{CameliaError, Result, Song};

/// Sample rate songs are decoded at.
pub const DECODE_SAMPLE_RATE: u32 = 44_100;

/// Basic metadata about a source video clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Native duration in seconds.
    pub duration: f64,
}

/// The external media collaborator: everything that needs real decoding.
pub trait MediaBackend {
    fn probe_clip(&self, path: &Path) -> Result<ClipInfo>;

    fn decode_song(&self, path: &Path) -> Result<Song>;
}

/// [`MediaBackend`] backed by the system `ffprobe` and `ffmpeg` binaries.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub sample_rate: u32,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            sample_rate: DECODE_SAMPLE_RATE,
        }
    }
}

impl Ffmpeg {
    /// Returns `true` when the configured `ffmpeg` can be invoked.
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Fails early with a readable error when `ffmpeg` cannot be run.
    pub fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(CameliaError::media(format!(
                "could not run '{}'; is ffmpeg installed and on PATH?",
                self.ffmpeg.display()
            )))
        }
    }
}

impl MediaBackend for Ffmpeg {
    fn probe_clip(&self, path: &Path) -> Result<ClipInfo> {
        let out = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .output()
            .map_err(|e| CameliaError::media(format!("failed to run ffprobe: {e}")))?;
        if !out.status.success() {
            return Err(CameliaError::media(format!(
                "ffprobe failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        let info = parse_probe_output(path, &out.stdout)?;
        tracing::debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            duration = info.duration,
            "probed clip"
        );
        Ok(info)
    }

    fn decode_song(&self, path: &Path) -> Result<Song> {
        let out = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(path)
            .args([
                "-vn",
                "-f",
                "f32le",
                "-acodec",
                "pcm_f32le",
                "-ac",
                "2",
                "-ar",
                &self.sample_rate.to_string(),
                "pipe:1",
            ])
            .output()
            .map_err(|e| CameliaError::media(format!("failed to run ffmpeg for audio decode: {e}")))?;
        if !out.status.success() {
            return Err(CameliaError::media(format!(
                "ffmpeg audio decode failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        let waveform = decode_f32le(&out.stdout)?;
        let song = Song::new(waveform, self.sample_rate, 2)?;
        tracing::info!(
            path = %path.display(),
            duration = song.duration(),
            "decoded song"
        );
        Ok(song)
    }
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Reads the first video stream of an `ffprobe -print_format json` dump.
/// The container duration wins over the stream duration when both exist.
pub fn parse_probe_output(path: &Path, json: &[u8]) -> Result<ClipInfo> {
    let parsed: ProbeOut = serde_json::from_slice(json)?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| CameliaError::media(format!("no video stream in '{}'", path.display())))?;

    let width = video
        .width
        .filter(|&w| w > 0)
        .ok_or_else(|| CameliaError::media("missing video width from ffprobe"))?;
    let height = video
        .height
        .filter(|&h| h > 0)
        .ok_or_else(|| CameliaError::media("missing video height from ffprobe"))?;
    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| {
            CameliaError::media(format!("could not read a duration for '{}'", path.display()))
        })?;

    Ok(ClipInfo {
        path: path.to_path_buf(),
        width,
        height,
        duration,
    })
}

fn decode_f32le(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(CameliaError::media(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "streams": [
            { "codec_type": "audio", "duration": "9.0" },
            { "codec_type": "video", "width": 1920, "height": 1080, "duration": "8.0" }
        ],
        "format": { "duration": "8.008" }
    }"#;

    #[test]
    fn parses_video_stream_and_container_duration() {
        let info = parse_probe_output(Path::new("loop.mp4"), PROBE_JSON.as_bytes()).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!((info.duration - 8.008).abs() < 1e-12);
        assert_eq!(info.path, PathBuf::from("loop.mp4"));
    }

    #[test]
    fn falls_back_to_stream_duration() {
        let json = r#"{ "streams": [{ "codec_type": "video", "width": 480, "height": 270, "duration": "2.5" }] }"#;
        let info = parse_probe_output(Path::new("static.gif"), json.as_bytes()).unwrap();
        assert!((info.duration - 2.5).abs() < 1e-12);
    }

    #[test]
    fn audio_only_file_is_media_error() {
        let json = r#"{ "streams": [{ "codec_type": "audio" }], "format": { "duration": "3.0" } }"#;
        let err = parse_probe_output(Path::new("song.mp3"), json.as_bytes()).unwrap_err();
        assert!(matches!(err, CameliaError::Media(_)));
    }

    #[test]
    fn zero_sized_video_is_media_error() {
        let json = r#"{ "streams": [{ "codec_type": "video", "width": 0, "height": 1080, "duration": "2.0" }] }"#;
        let err = parse_probe_output(Path::new("broken.mp4"), json.as_bytes()).unwrap_err();
        assert!(matches!(err, CameliaError::Media(_)));
    }

    #[test]
    fn missing_binary_is_not_available() {
        let ffmpeg = Ffmpeg {
            ffmpeg: PathBuf::from("/nonexistent/camelia/ffmpeg"),
            ..Ffmpeg::default()
        };
        assert!(!ffmpeg.is_available());
        assert!(matches!(ffmpeg.ensure_available(), Err(CameliaError::Media(_))));
    }

    #[test]
    fn decodes_little_endian_floats() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-0.25f32).to_le_bytes());
        assert_eq!(decode_f32le(&bytes).unwrap(), vec![1.5, -0.25]);
        assert!(decode_f32le(&bytes[..5]).is_err());
    }
}
