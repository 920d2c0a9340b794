//! # Video Processing Module
//!
//! Questo modulo porta un video sotto una dimensione target con un encode
//! H.264 a due pass a bitrate costante.
//!
//! ## Responsabilità:
//! - Ricava il bitrate video da dimensione target e durata (probe)
//! - Riserva 128 kbps per l'audio, minimo 100 kbps per il video
//! - Sceglie un gradino di downscale (720p → 480p → 360p) quando il bitrate
//!   non clampato scende sotto il minimo
//! - Guida i due pass tramite `MediaEncoder`
//!
//! ## Pipeline:
//! 1. Short-circuit se già sotto target
//! 2. Probe: serve `duration > 0`, altrimenti skipped con messaggio
//! 3. `video_bits = target*8/durata - 128_000`
//! 4. Pass 1 (statistiche, output scartato), pass 2 (mp4 con audio AAC)
//! 5. Qualsiasi errore o timeout → skipped, byte originali invariati
//!
//! File temporanei e directory dei passlog vengono rimossi su ogni percorso
//! di uscita (guard `tempfile`).

use crate::encoder::{MediaEncoder, VideoPass, VIDEO_AUDIO_BITRATE_KBPS};
use crate::error::CompressError;
use crate::probe::Prober;
use crate::types::{Encoded, MediaProbe, Outcome, SkipReason};
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, warn};

pub const MIN_VIDEO_BITRATE_KBPS: u32 = 100;

/// Resolution ceilings tried in order when the bitrate is too low
pub const DOWNSCALE_LADDER: [(u32, u32); 3] = [(1280, 720), (854, 480), (640, 360)];

/// Derived bitrates for one encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitratePlan {
    /// Bitrate actually passed to the encoder
    pub video_kbps: u32,
    /// Budget before the floor was applied; may be negative
    pub unclamped_kbps: i64,
}

impl BitratePlan {
    pub fn for_target(target_size: u64, duration_seconds: f64) -> Self {
        let audio_bits = VIDEO_AUDIO_BITRATE_KBPS as f64 * 1000.0;
        let video_bits = target_size as f64 * 8.0 / duration_seconds - audio_bits;
        let unclamped_kbps = (video_bits / 1000.0).floor() as i64;

        let video_kbps = if unclamped_kbps < MIN_VIDEO_BITRATE_KBPS as i64 {
            MIN_VIDEO_BITRATE_KBPS
        } else {
            u32::try_from(unclamped_kbps).unwrap_or(u32::MAX)
        };

        Self {
            video_kbps,
            unclamped_kbps,
        }
    }

    pub fn needs_downscale(&self) -> bool {
        self.unclamped_kbps < MIN_VIDEO_BITRATE_KBPS as i64
    }
}

/// `scale+pad` filter for the first ladder step smaller than the source in
/// at least one axis. None when the source already fits every step.
pub fn downscale_filter(source_width: u32, source_height: u32) -> Option<String> {
    DOWNSCALE_LADDER
        .iter()
        .find(|(w, h)| source_width > *w || source_height > *h)
        .map(|(w, h)| {
            format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
                w = w,
                h = h
            )
        })
}

/// Downscale decision for a probe. Unknown resolution means no downscale.
pub fn choose_scale_filter(plan: &BitratePlan, probe: &MediaProbe) -> Option<String> {
    if !plan.needs_downscale() {
        return None;
    }
    match probe.video_resolution() {
        Some((width, height)) => downscale_filter(width, height),
        None => {
            debug!("Bitrate below floor but source resolution unknown, not downscaling");
            None
        }
    }
}

/// Temp-file suffix so ffmpeg can pick a demuxer by extension
pub fn input_extension(mime: &str) -> &'static str {
    match mime {
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "video/quicktime" => ".mov",
        "video/x-matroska" => ".mkv",
        "video/x-msvideo" => ".avi",
        _ => ".bin",
    }
}

/// Two-pass size-targeting video compressor
#[derive(Clone)]
pub struct VideoCompressor {
    prober: Arc<dyn Prober>,
    encoder: Arc<dyn MediaEncoder>,
}

impl VideoCompressor {
    pub fn new(prober: Arc<dyn Prober>, encoder: Arc<dyn MediaEncoder>) -> Self {
        Self { prober, encoder }
    }

    pub async fn compress_video(&self, bytes: &[u8], mime: &str, target_size: u64) -> Outcome {
        if bytes.len() as u64 <= target_size {
            return Outcome::Skipped(SkipReason::AlreadyUnderTarget);
        }

        let probe = match self.prober.probe(bytes).await {
            Ok(probe) => probe,
            Err(e) => {
                warn!("Video probe failed: {}", e);
                return Outcome::Skipped(SkipReason::ProbeFailure("Could not probe video file".to_string()));
            }
        };
        if probe.duration_seconds <= 0.0 {
            return Outcome::Skipped(SkipReason::ProbeFailure("Could not determine video duration".to_string()));
        }

        let plan = BitratePlan::for_target(target_size, probe.duration_seconds);
        let scale_filter = choose_scale_filter(&plan, &probe);
        info!(
            "Video: {:.2}s, {} kbps (unclamped {}), downscale: {}",
            probe.duration_seconds,
            plan.video_kbps,
            plan.unclamped_kbps,
            scale_filter.is_some()
        );

        match self.two_pass(bytes, mime, plan.video_kbps, scale_filter).await {
            Ok(encoded) => Outcome::Compressed(encoded),
            Err(skip) => Outcome::Skipped(skip),
        }
    }

    async fn two_pass(
        &self,
        bytes: &[u8],
        mime: &str,
        bitrate_kbps: u32,
        scale_filter: Option<String>,
    ) -> Result<Encoded, SkipReason> {
        let input = NamedTempFile::with_suffix(input_extension(mime)).map_err(io_skip)?;
        let output = NamedTempFile::with_suffix(".mp4").map_err(io_skip)?;
        let passlog_dir = TempDir::with_prefix("ffmpeg2pass_").map_err(io_skip)?;
        tokio::fs::write(input.path(), bytes).await.map_err(io_skip)?;

        let mut job = VideoPass {
            input: input.path().to_path_buf(),
            output: None,
            pass: 1,
            bitrate_kbps,
            scale_filter,
            passlog_prefix: passlog_dir.path().join("passlog"),
        };

        self.encoder
            .encode_video_pass(&job)
            .await
            .map_err(|e| pass_failure(1, e))?;

        job.pass = 2;
        job.output = Some(output.path().to_path_buf());
        self.encoder
            .encode_video_pass(&job)
            .await
            .map_err(|e| pass_failure(2, e))?;

        let compressed = tokio::fs::read(output.path()).await.map_err(io_skip)?;
        debug!("Two-pass encode: {} -> {} bytes", bytes.len(), compressed.len());
        Ok(Encoded::converted(compressed, "video/mp4", ".mp4"))
    }
}

fn pass_failure(pass: u8, error: CompressError) -> SkipReason {
    warn!("Video pass {} failed: {}", pass, error);
    if error.is_timeout() {
        SkipReason::Timeout("Video compression timed out".to_string())
    } else {
        SkipReason::EncodeFailure(format!("FFmpeg pass {} failed", pass))
    }
}

fn io_skip(error: std::io::Error) -> SkipReason {
    warn!("Video scratch file error: {}", error);
    SkipReason::EncodeFailure(format!("Video compression failed: {}", error))
}
