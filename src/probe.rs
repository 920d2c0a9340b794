//! # Probe Adapter
//!
//! Extracts duration and stream metadata from an audio/video blob.
//!
//! ## Strategy:
//! 1. Write the blob to a scoped temp file (removed on every exit path)
//! 2. `ffprobe -print_format json -show_format -show_streams` when ffprobe exists
//! 3. Otherwise (or if ffprobe exits non-zero) `ffmpeg -i` and regex the
//!    `Duration: HH:MM:SS.ff` line out of stderr. This path yields no streams.
//!
//! A timeout or unparseable ffprobe JSON is a failure, not a reason to fall back.

use crate::config::Config;
use crate::error::{CompressError, CompressResult};
use crate::platform::PlatformCommands;
use crate::process::run_tool;
use crate::types::{CodecType, MediaProbe, StreamInfo};
use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Capability: turn raw media bytes into container metadata
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, bytes: &[u8]) -> CompressResult<MediaProbe>;
}

/// ffprobe-backed prober with an `ffmpeg -i` fallback
pub struct FfprobeProber {
    /// None when ffprobe is not installed; the fallback is used directly
    ffprobe: Option<PathBuf>,
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(config: &Config) -> Self {
        let platform = PlatformCommands::instance();
        let ffprobe = config
            .ffprobe_path
            .clone()
            .or_else(|| platform.get_tool_path("ffprobe"));
        if ffprobe.is_none() {
            debug!("ffprobe not found, probing will parse ffmpeg diagnostics");
        }

        Self {
            ffprobe,
            ffmpeg: platform.command_path("ffmpeg", config.ffmpeg_path.as_deref()),
            timeout: config.probe_timeout(),
        }
    }

    async fn probe_structured(&self, ffprobe: &Path, input: &str) -> CompressResult<Option<MediaProbe>> {
        let args = crate::args![
            "-v", "quiet",
            "-print_format", "json",
            "-show_format", "-show_streams",
            input,
        ];

        let output = match run_tool(ffprobe, &args, self.timeout).await {
            Ok(output) => output,
            Err(CompressError::MissingDependency(msg)) => {
                debug!("{}, falling back to ffmpeg -i", msg);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !output.status.success() {
            warn!("ffprobe exited with {:?}, falling back to ffmpeg -i", output.status.code());
            return Ok(None);
        }

        parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout)).map(Some)
    }

    async fn probe_diagnostics(&self, input: &str) -> CompressResult<MediaProbe> {
        // ffmpeg -i without an output exits non-zero but still prints the header
        let args = crate::args!["-hide_banner", "-i", input];
        let output = run_tool(&self.ffmpeg, &args, self.timeout).await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let duration_seconds = parse_duration_text(&stderr)
            .ok_or_else(|| CompressError::Probe("no Duration in ffmpeg output".to_string()))?;

        Ok(MediaProbe {
            duration_seconds,
            streams: Vec::new(),
        })
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, bytes: &[u8]) -> CompressResult<MediaProbe> {
        let temp_file = NamedTempFile::with_prefix("squish-probe-")?;
        tokio::fs::write(temp_file.path(), bytes).await?;
        let input = temp_file.path().to_string_lossy().to_string();

        if let Some(ref ffprobe) = self.ffprobe {
            if let Some(probe) = self.probe_structured(ffprobe, &input).await? {
                debug!("Probed {} bytes: {:.2}s, {} streams", bytes.len(), probe.duration_seconds, probe.streams.len());
                return Ok(probe);
            }
        }

        let probe = self.probe_diagnostics(&input).await?;
        debug!("Probed {} bytes via ffmpeg -i: {:.2}s", bytes.len(), probe.duration_seconds);
        Ok(probe)
    }
}

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize, Default)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
///
/// A missing or unparseable duration becomes 0.0; the targeters treat that as a skip.
pub fn parse_ffprobe_json(json: &str) -> CompressResult<MediaProbe> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| CompressError::Probe(format!("invalid ffprobe output: {}", e)))?;

    let duration_seconds = output
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let streams = output
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            codec_type: CodecType::from_ffprobe(&s.codec_type),
            width: s.width,
            height: s.height,
        })
        .collect();

    Ok(MediaProbe {
        duration_seconds,
        streams,
    })
}

/// Pull `Duration: HH:MM:SS.ff` out of ffmpeg's diagnostic output
pub fn parse_duration_text(text: &str) -> Option<f64> {
    static DURATION: OnceLock<Option<Regex>> = OnceLock::new();
    let re = DURATION
        .get_or_init(|| Regex::new(r"Duration:\s*(\d+):(\d+):(\d+)(?:\.(\d+))?").ok())
        .as_ref()?;
    let caps = re.captures(text)?;

    let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
    let fraction: f64 = caps
        .get(4)
        .and_then(|m| format!("0.{}", m.as_str()).parse().ok())
        .unwrap_or(0.0);

    Some(hours * 3600.0 + minutes * 60.0 + seconds + fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFPROBE_JSON: &str = r#"{
        "streams": [
            { "index": 0, "codec_name": "h264", "codec_type": "video", "width": 1920, "height": 1080 },
            { "index": 1, "codec_name": "aac", "codec_type": "audio", "sample_rate": "48000" },
            { "index": 2, "codec_type": "data" }
        ],
        "format": { "filename": "in.mp4", "duration": "12.480000", "size": "123456" }
    }"#;

    #[test]
    fn test_parse_ffprobe_json() {
        let probe = parse_ffprobe_json(FFPROBE_JSON).unwrap();
        assert!((probe.duration_seconds - 12.48).abs() < 1e-9);
        assert_eq!(probe.streams.len(), 3);
        assert_eq!(probe.streams[0].codec_type, CodecType::Video);
        assert_eq!(probe.streams[1].codec_type, CodecType::Audio);
        assert_eq!(probe.streams[2].codec_type, CodecType::Other);
        assert_eq!(probe.video_resolution(), Some((1920, 1080)));
    }

    #[test]
    fn test_parse_ffprobe_json_without_duration() {
        let probe = parse_ffprobe_json(r#"{ "format": {}, "streams": [] }"#).unwrap();
        assert_eq!(probe.duration_seconds, 0.0);

        let probe = parse_ffprobe_json(r#"{ "format": { "duration": "N/A" } }"#).unwrap();
        assert_eq!(probe.duration_seconds, 0.0);
        assert!(probe.streams.is_empty());
    }

    #[test]
    fn test_parse_ffprobe_json_garbage_fails() {
        let result = parse_ffprobe_json("not json at all");
        assert!(matches!(result, Err(CompressError::Probe(_))));
    }

    #[test]
    fn test_parse_duration_text() {
        let stderr = "Input #0, wav, from 'x.wav':\n  Duration: 00:01:02.50, bitrate: 1411 kb/s\n";
        assert_eq!(parse_duration_text(stderr), Some(62.5));

        let stderr = "  Duration: 01:00:00.00, start: 0.000000";
        assert_eq!(parse_duration_text(stderr), Some(3600.0));
    }

    #[test]
    fn test_parse_duration_text_missing() {
        assert_eq!(parse_duration_text("Duration: N/A, bitrate: N/A"), None);
        assert_eq!(parse_duration_text("x.bin: Invalid data found when processing input"), None);
    }

    #[test]
    fn test_duration_regex_is_reused() {
        assert_eq!(parse_duration_text("Duration: 00:00:01.5"), Some(1.5));
        assert_eq!(parse_duration_text("Duration: 00:00:02.25"), Some(2.25));
    }
}
