//! # Compression Engine
//!
//! Punto di ingresso unico per una singola compressione: instrada la
//! richiesta al targeter della categoria e normalizza il risultato.
//!
//! ## Responsabilità:
//! - Short-circuit uniforme: input già sotto target → skipped
//! - Dispatch per categoria (image, document, video, audio)
//! - Lavoro CPU bound (immagini, PDF) su `spawn_blocking`; un panic del
//!   job diventa uno skip con messaggio
//! - Messaggio "best effort" quando il risultato supera il target del 5%
//!
//! L'engine non restituisce mai errori: il chiamante riceve sempre byte
//! utilizzabili (originali o migliorati) più un eventuale messaggio.

use crate::audio_processor::AudioCompressor;
use crate::config::Config;
use crate::document_processor::DocumentCompressor;
use crate::encoder::{FfmpegEncoder, MediaEncoder};
use crate::image_processor::{ImageCompressor, TOLERANCE};
use crate::predictor::QualityPredictor;
use crate::probe::{FfprobeProber, Prober};
use crate::types::{Category, CompressionRequest, CompressionResult, Outcome, SkipReason};
use crate::utils::whole_kb;
use crate::video_processor::VideoCompressor;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ALREADY_SMALLER_MESSAGE: &str = "File is already smaller than target!";

/// Dimensions assumed for the advisory prediction when the caller has none
const DEFAULT_WIDTH: u32 = 1920;
const DEFAULT_HEIGHT: u32 = 1080;

/// Routes requests to the per-modality targeters. Cheap to clone.
#[derive(Clone)]
pub struct CompressionEngine {
    images: ImageCompressor,
    documents: DocumentCompressor,
    video: VideoCompressor,
    audio: AudioCompressor,
    predictor: Option<Arc<QualityPredictor>>,
}

impl CompressionEngine {
    /// Engine over explicit probe/encode capabilities
    pub fn new(config: &Config, prober: Arc<dyn Prober>, encoder: Arc<dyn MediaEncoder>) -> Self {
        let images = ImageCompressor::new(config);
        Self {
            documents: DocumentCompressor::new(images.clone()),
            images,
            video: VideoCompressor::new(prober.clone(), encoder.clone()),
            audio: AudioCompressor::new(prober, encoder),
            predictor: None,
        }
    }

    /// Engine backed by the system ffmpeg / ffprobe
    pub fn from_config(config: &Config) -> Self {
        let prober: Arc<dyn Prober> = Arc::new(FfprobeProber::new(config));
        let encoder: Arc<dyn MediaEncoder> = Arc::new(FfmpegEncoder::new(config));
        Self::new(config, prober, encoder)
    }

    /// Attach an advisory predictor; its estimate is logged for images only
    pub fn with_predictor(mut self, predictor: Arc<QualityPredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub async fn compress(&self, request: CompressionRequest) -> CompressionResult {
        let CompressionRequest {
            bytes,
            declared_mime,
            category,
            target_size,
            width,
            height,
        } = request;
        let original_size = bytes.len() as u64;

        if original_size <= target_size {
            debug!("{} bytes already under target {}", original_size, target_size);
            return CompressionResult::skipped(bytes, Some(ALREADY_SMALLER_MESSAGE.to_string()));
        }

        info!(
            "Compressing {} ({}): {} -> {} bytes",
            category, declared_mime, original_size, target_size
        );

        if category == Category::Image {
            if let Some(ref predictor) = self.predictor {
                let predicted = predictor.predict(
                    original_size,
                    target_size,
                    width.unwrap_or(DEFAULT_WIDTH),
                    height.unwrap_or(DEFAULT_HEIGHT),
                );
                debug!("Predicted quality: {}", predicted);
            }
        }

        let bytes = Arc::new(bytes);
        let outcome = match category {
            Category::Image => {
                let images = self.images.clone();
                let input = bytes.clone();
                run_blocking(category, move || images.compress_image(&input, &declared_mime, target_size)).await
            }
            Category::Document => {
                let documents = self.documents.clone();
                let input = bytes.clone();
                run_blocking(category, move || documents.compress_document(&input, target_size)).await
            }
            Category::Video => self.video.compress_video(&bytes, &declared_mime, target_size).await,
            Category::Audio => self.audio.compress_audio(&bytes, &declared_mime, target_size).await,
            Category::Unsupported => Outcome::Skipped(SkipReason::UnsupportedModality),
        };

        let original = Arc::try_unwrap(bytes).unwrap_or_else(|shared| shared.as_ref().clone());
        normalize(outcome, original, target_size)
    }
}

/// Run a CPU-bound targeter off the async workers. A panic becomes a skip.
async fn run_blocking<F>(category: Category, job: F) -> Outcome
where
    F: FnOnce() -> Outcome + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("{} compression task failed: {}", category, e);
            Outcome::Skipped(SkipReason::EncodeFailure(format!("{} compression crashed", category)))
        }
    }
}

/// Common result shape, with the best-effort note when over tolerance
pub fn normalize(outcome: Outcome, original: Vec<u8>, target_size: u64) -> CompressionResult {
    let mut result = outcome.into_result(original);

    if !result.skipped && result.size as f64 > target_size as f64 * (1.0 + TOLERANCE) {
        result.message = Some(format!(
            "Best we could do: {}KB (target was {}KB)",
            whole_kb(result.size),
            whole_kb(target_size)
        ));
    }

    if let Some(ref message) = result.message {
        debug!("Result: {} bytes, skipped={}, {}", result.size, result.skipped, message);
    }
    result
}
