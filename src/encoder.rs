//! # Encoder Module
//!
//! Questo modulo incapsula le invocazioni di ffmpeg usate dai targeter
//! audio e video.
//!
//! ## Responsabilità:
//! - Definisce il trait `MediaEncoder` (sostituibile con un fake nei test)
//! - Costruisce gli argomenti ffmpeg per i due pass video e per l'audio
//! - Applica i timeout configurati e converte gli exit code non zero in errori
//!
//! ## Comandi:
//! - Pass 1: `libx264 -b:v Nk [-vf scale] -pass 1 -an -f null <sink>`
//! - Pass 2: `libx264 -b:v Nk [-vf scale] -pass 2 -c:a aac -b:a 128k out.mp4`
//! - Audio: `libmp3lame -b:a Nk out.mp3`

use crate::args;
use crate::config::Config;
use crate::error::{CompressError, CompressResult};
use crate::platform::PlatformCommands;
use crate::process::{run_tool, stderr_tail};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Bitrate of the re-encoded audio track in video output
pub const VIDEO_AUDIO_BITRATE_KBPS: u32 = 128;

/// One pass of a two-pass video encode
#[derive(Debug, Clone, PartialEq)]
pub struct VideoPass {
    pub input: PathBuf,
    /// Final container; None for the statistics-only first pass
    pub output: Option<PathBuf>,
    pub pass: u8,
    pub bitrate_kbps: u32,
    /// `-vf` expression, when downscaling
    pub scale_filter: Option<String>,
    /// Prefix for the pass statistics files shared by both passes
    pub passlog_prefix: PathBuf,
}

/// Single-pass audio encode
#[derive(Debug, Clone, PartialEq)]
pub struct AudioJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub bitrate_kbps: u32,
}

/// Capability: run the external encoder
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    async fn encode_video_pass(&self, job: &VideoPass) -> CompressResult<()>;
    async fn encode_audio(&self, job: &AudioJob) -> CompressResult<()>;
}

/// ffmpeg-backed encoder
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    preset: String,
    log_level: String,
    video_pass_timeout: Duration,
    audio_timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(config: &Config) -> Self {
        let platform = PlatformCommands::instance();
        Self {
            ffmpeg: platform.command_path("ffmpeg", config.ffmpeg_path.as_deref()),
            preset: config.video_preset.clone(),
            log_level: config.ffmpeg_log_level.clone(),
            video_pass_timeout: config.video_pass_timeout(),
            audio_timeout: config.audio_timeout(),
        }
    }

    /// Arguments for one video pass
    pub fn video_pass_args(&self, job: &VideoPass) -> Vec<String> {
        let mut cmd = args![
            "-hide_banner",
            "-loglevel", &self.log_level,
            "-y",
            "-i", job.input.to_string_lossy(),
            "-c:v", "libx264",
            "-preset", &self.preset,
            "-b:v", format!("{}k", job.bitrate_kbps),
        ];

        if let Some(ref filter) = job.scale_filter {
            cmd.extend(args!["-vf", filter]);
        }

        cmd.extend(args![
            "-pass", job.pass,
            "-passlogfile", job.passlog_prefix.to_string_lossy(),
        ]);

        match job.output {
            Some(ref output) => cmd.extend(args![
                "-c:a", "aac",
                "-b:a", format!("{}k", VIDEO_AUDIO_BITRATE_KBPS),
                output.to_string_lossy(),
            ]),
            None => cmd.extend(args![
                "-an",
                "-f", "null",
                PlatformCommands::instance().null_sink(),
            ]),
        }

        cmd
    }

    /// Arguments for the audio encode
    pub fn audio_args(&self, job: &AudioJob) -> Vec<String> {
        args![
            "-hide_banner",
            "-loglevel", &self.log_level,
            "-y",
            "-i", job.input.to_string_lossy(),
            "-c:a", "libmp3lame",
            "-b:a", format!("{}k", job.bitrate_kbps),
            job.output.to_string_lossy(),
        ]
    }

    async fn run(&self, args: &[String], limit: Duration, what: &str) -> CompressResult<()> {
        let output = run_tool(&self.ffmpeg, args, limit).await?;
        if output.status.success() {
            return Ok(());
        }

        let tail = stderr_tail(&output, 5);
        debug!("{} failed ({:?}): {}", what, output.status.code(), tail);
        Err(CompressError::FFmpeg(tail))
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn encode_video_pass(&self, job: &VideoPass) -> CompressResult<()> {
        debug!("Video pass {} at {} kbps (filter: {:?})", job.pass, job.bitrate_kbps, job.scale_filter);
        let args = self.video_pass_args(job);
        self.run(&args, self.video_pass_timeout, "video pass").await
    }

    async fn encode_audio(&self, job: &AudioJob) -> CompressResult<()> {
        debug!("Audio encode at {} kbps", job.bitrate_kbps);
        let args = self.audio_args(job);
        self.run(&args, self.audio_timeout, "audio encode").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> FfmpegEncoder {
        FfmpegEncoder::new(&Config::default())
    }

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn test_first_pass_discards_output() {
        let job = VideoPass {
            input: PathBuf::from("/tmp/in.mp4"),
            output: None,
            pass: 1,
            bitrate_kbps: 480,
            scale_filter: None,
            passlog_prefix: PathBuf::from("/tmp/log/ffmpeg2pass"),
        };
        let args = encoder().video_pass_args(&job);

        assert_eq!(args[position(&args, "-b:v") + 1], "480k");
        assert_eq!(args[position(&args, "-pass") + 1], "1");
        assert_eq!(args[position(&args, "-passlogfile") + 1], "/tmp/log/ffmpeg2pass");
        assert_eq!(args[position(&args, "-preset") + 1], "medium");
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args[position(&args, "-f") + 1], "null");
        assert!(!args.contains(&"-vf".to_string()));
        assert_eq!(args.last().unwrap(), PlatformCommands::instance().null_sink());
    }

    #[test]
    fn test_second_pass_muxes_audio() {
        let job = VideoPass {
            input: PathBuf::from("/tmp/in.mov"),
            output: Some(PathBuf::from("/tmp/out.mp4")),
            pass: 2,
            bitrate_kbps: 100,
            scale_filter: Some("scale=640:360".to_string()),
            passlog_prefix: PathBuf::from("/tmp/log/ffmpeg2pass"),
        };
        let args = encoder().video_pass_args(&job);

        assert_eq!(args[position(&args, "-vf") + 1], "scale=640:360");
        assert_eq!(args[position(&args, "-pass") + 1], "2");
        assert_eq!(args[position(&args, "-c:a") + 1], "aac");
        assert_eq!(args[position(&args, "-b:a") + 1], "128k");
        assert!(!args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn test_audio_args() {
        let job = AudioJob {
            input: PathBuf::from("/tmp/in.wav"),
            output: PathBuf::from("/tmp/out.mp3"),
            bitrate_kbps: 64,
        };
        let args = encoder().audio_args(&job);

        assert_eq!(args[position(&args, "-c:a") + 1], "libmp3lame");
        assert_eq!(args[position(&args, "-b:a") + 1], "64k");
        assert_eq!(args[position(&args, "-i") + 1], "/tmp/in.wav");
        assert_eq!(args.last().unwrap(), "/tmp/out.mp3");
    }
}
