//! # Squishfile Library
//!
//! Compressione di file (immagini, PDF, video, audio) verso una dimensione
//! target in byte.
//!
//! ## Architettura dei moduli:
//! - `types`: Request/result condivisi e union `Outcome` dei targeter
//! - `error`: Errori interni (`CompressError`)
//! - `config`: Configurazione e validazione
//! - `platform` / `tool_resolver` / `process`: Risoluzione ed esecuzione dei tool esterni
//! - `probe` / `encoder`: Capability `Prober` e `MediaEncoder` (ffprobe / ffmpeg)
//! - `image_processor`: Binary search sulla qualità + fallback di resize
//! - `document_processor`: Ricompressione delle immagini incorporate nei PDF
//! - `video_processor`: Two-pass con ladder di downscale
//! - `audio_processor`: MP3 a bitrate calcolato
//! - `predictor`: Stima advisory della qualità JPEG
//! - `optimizer`: Engine di dispatch e runner batch
//! - `file_manager` / `progress` / `json_output`: Supporto al CLI
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use squishfile::{Category, CompressionEngine, CompressionRequest, Config};
//!
//! let engine = CompressionEngine::from_config(&Config::default());
//! let request = CompressionRequest::new(bytes, "image/jpeg", Category::Image, 200 * 1024);
//! let result = engine.compress(request).await;
//! ```

pub mod audio_processor;
pub mod config;
pub mod document_processor;
pub mod encoder;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod optimizer;
pub mod platform;
pub mod predictor;
pub mod probe;
pub mod process;
pub mod progress;
pub mod tool_resolver;
pub mod types;
pub mod utils;
pub mod video_processor;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use encoder::{AudioJob, FfmpegEncoder, MediaEncoder, VideoPass};
pub use error::{CompressError, CompressResult};
pub use optimizer::{BatchRunner, CompressionEngine};
pub use predictor::QualityPredictor;
pub use probe::{FfprobeProber, Prober};
pub use types::{Category, CompressionRequest, CompressionResult, MediaProbe};
