//! # Audio Processing Module
//!
//! Single-pass MP3 encode at the bitrate that fits the target size over the
//! probed duration, clamped to `[32, 320]` kbps.
//!
//! There is no fallback when the clamped bitrate still overshoots the
//! target: the result is best effort and the engine reports the shortfall.

use crate::encoder::{AudioJob, MediaEncoder};
use crate::probe::Prober;
use crate::types::{Encoded, Outcome, SkipReason};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const MIN_AUDIO_BITRATE_KBPS: u32 = 32;
pub const MAX_AUDIO_BITRATE_KBPS: u32 = 320;

/// `clamp(round(target*8/duration/1000), 32, 320)`
pub fn audio_bitrate_kbps(target_size: u64, duration_seconds: f64) -> u32 {
    let kbps = (target_size as f64 * 8.0 / duration_seconds / 1000.0).round();
    kbps.clamp(MIN_AUDIO_BITRATE_KBPS as f64, MAX_AUDIO_BITRATE_KBPS as f64) as u32
}

pub fn input_extension(mime: &str) -> &'static str {
    match mime {
        "audio/mpeg" => ".mp3",
        "audio/wav" | "audio/x-wav" => ".wav",
        "audio/mp4" => ".m4a",
        "audio/ogg" => ".ogg",
        "audio/flac" => ".flac",
        "audio/aac" => ".aac",
        _ => ".bin",
    }
}

#[derive(Clone)]
pub struct AudioCompressor {
    prober: Arc<dyn Prober>,
    encoder: Arc<dyn MediaEncoder>,
}

impl AudioCompressor {
    pub fn new(prober: Arc<dyn Prober>, encoder: Arc<dyn MediaEncoder>) -> Self {
        Self { prober, encoder }
    }

    pub async fn compress_audio(&self, bytes: &[u8], mime: &str, target_size: u64) -> Outcome {
        if bytes.len() as u64 <= target_size {
            return Outcome::Skipped(SkipReason::AlreadyUnderTarget);
        }

        let probe = match self.prober.probe(bytes).await {
            Ok(probe) => probe,
            Err(e) => {
                warn!("Audio probe failed: {}", e);
                return Outcome::Skipped(SkipReason::ProbeFailure("Could not probe audio file".to_string()));
            }
        };
        if probe.duration_seconds <= 0.0 {
            return Outcome::Skipped(SkipReason::ProbeFailure("Could not determine audio duration".to_string()));
        }

        let bitrate_kbps = audio_bitrate_kbps(target_size, probe.duration_seconds);
        info!("Audio: {:.2}s, {} kbps", probe.duration_seconds, bitrate_kbps);

        match self.encode(bytes, mime, bitrate_kbps).await {
            Ok(encoded) => Outcome::Compressed(encoded),
            Err(skip) => Outcome::Skipped(skip),
        }
    }

    async fn encode(&self, bytes: &[u8], mime: &str, bitrate_kbps: u32) -> Result<Encoded, SkipReason> {
        let input = NamedTempFile::with_suffix(input_extension(mime)).map_err(io_skip)?;
        let output = NamedTempFile::with_suffix(".mp3").map_err(io_skip)?;
        tokio::fs::write(input.path(), bytes).await.map_err(io_skip)?;

        let job = AudioJob {
            input: input.path().to_path_buf(),
            output: output.path().to_path_buf(),
            bitrate_kbps,
        };

        if let Err(e) = self.encoder.encode_audio(&job).await {
            warn!("Audio encode failed: {}", e);
            return Err(if e.is_timeout() {
                SkipReason::Timeout("Audio compression timed out".to_string())
            } else {
                SkipReason::EncodeFailure("FFmpeg encoding failed".to_string())
            });
        }

        let compressed = tokio::fs::read(output.path()).await.map_err(io_skip)?;
        debug!("Audio encode: {} -> {} bytes", bytes.len(), compressed.len());
        Ok(Encoded::converted(compressed, "audio/mpeg", ".mp3"))
    }
}

fn io_skip(error: std::io::Error) -> SkipReason {
    warn!("Audio scratch file error: {}", error);
    SkipReason::EncodeFailure(format!("Audio compression failed: {}", error))
}
