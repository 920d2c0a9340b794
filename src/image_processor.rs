//! # Image Processing Module
//!
//! Questo modulo porta un'immagine sotto una dimensione target in byte
//! cercando il parametro di qualità del codec lossy.
//!
//! ## Formati Supportati
//!
//! | Formato | Input | Output | Strategia |
//! |---------|-------|--------|-----------|
//! | JPEG    | ✅    | JPEG   | Ricerca binaria sulla qualità (`image` crate) |
//! | WebP    | ✅    | WebP   | Ricerca binaria sulla qualità (`cwebp`), JPEG se cwebp manca |
//! | PNG     | ✅    | JPEG   | Alpha composto su bianco, poi ricerca su JPEG |
//! | GIF     | ✅    | JPEG   | Primo frame, poi come PNG |
//! | Altri   | ✅    | ❌     | Passthrough (skipped) |
//!
//! ## Pipeline
//!
//! 1. **Short-circuit**: input già sotto target → skipped
//! 2. **Seed**: `clamp(round(target/originale * 85), 5, 95)`
//! 3. **Ricerca binaria** in `[5, 95]`, max 10 iterazioni, accetta subito
//!    se la dimensione è entro il 5% dal target; tiene il risultato più
//!    grande che non supera il target
//! 4. **Fallback resize**: se nessun encode è finito sotto target, scala al
//!    90% e poi ×0.8 a ogni round (max 10) a qualità 60, Lanczos3
//!
//! Il modulo è sincrono (CPU bound): l'engine lo esegue su `spawn_blocking`.

use crate::args;
use crate::config::Config;
use crate::error::{CompressError, CompressResult};
use crate::platform::PlatformCommands;
use crate::process::run_tool_blocking;
use crate::types::{Encoded, Outcome, SkipReason};
use crate::utils::within_tolerance;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, warn};

pub const MIN_QUALITY: u8 = 5;
pub const MAX_QUALITY: u8 = 95;
const SEED_SCALE: f64 = 85.0;
/// Accepted distance from target, as a fraction of target
pub const TOLERANCE: f64 = 0.05;
const MAX_SEARCH_ITERATIONS: usize = 10;

const RESIZE_START_SCALE: f64 = 0.9;
const RESIZE_DECAY: f64 = 0.8;
const RESIZE_QUALITY: u8 = 60;
const MAX_RESIZE_ROUNDS: usize = 10;

/// Quality of the intermediate JPEG produced from PNG/GIF input
const CONVERSION_QUALITY: u8 = 95;
const CWEBP_TIMEOUT: Duration = Duration::from_secs(60);

/// Lossy codec the search runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossyFormat {
    Jpeg,
    WebP,
}

impl LossyFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::WebP => ".webp",
        }
    }
}

/// How a declared MIME type is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// Quality-adjustable, stays in its own format
    Quality(LossyFormat),
    /// No quality knob: convert to JPEG first
    Convert,
    Passthrough,
}

fn route_for(mime: &str) -> Route {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Route::Quality(LossyFormat::Jpeg),
        "image/webp" => Route::Quality(LossyFormat::WebP),
        "image/png" | "image/gif" => Route::Convert,
        _ => Route::Passthrough,
    }
}

/// Binary search bounds plus the best under-target payload seen so far
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    pub lo: u8,
    pub hi: u8,
    pub best: Option<Vec<u8>>,
    pub best_size: u64,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            lo: MIN_QUALITY,
            hi: MAX_QUALITY,
            best: None,
            best_size: 0,
        }
    }
}

impl SearchState {
    /// Record one encode and narrow the bounds. Returns the next quality to
    /// try, or None once the bounds have crossed.
    pub fn advance(&mut self, quality: u8, data: Vec<u8>, target: u64) -> Option<u8> {
        let size = data.len() as u64;
        if size <= target && (self.best.is_none() || size > self.best_size) {
            self.best_size = size;
            self.best = Some(data);
        }

        if size > target {
            self.hi = quality.saturating_sub(1);
        } else {
            self.lo = quality.saturating_add(1);
        }

        if self.lo > self.hi {
            None
        } else {
            Some(((self.lo as u16 + self.hi as u16) / 2) as u8)
        }
    }
}

/// Starting quality estimate from the size ratio
pub fn seed_quality(original_size: u64, target_size: u64) -> u8 {
    if original_size == 0 {
        return MAX_QUALITY;
    }
    let ratio = target_size as f64 / original_size as f64;
    (ratio * SEED_SCALE)
        .round()
        .clamp(MIN_QUALITY as f64, MAX_QUALITY as f64) as u8
}

/// Binary search over quality. `encode` produces the payload for one quality.
///
/// Returns the first encode within tolerance, otherwise the largest encode
/// not exceeding `target`, otherwise None.
pub fn quality_search<F>(original_size: u64, target: u64, mut encode: F) -> CompressResult<Option<Vec<u8>>>
where
    F: FnMut(u8) -> CompressResult<Vec<u8>>,
{
    let mut state = SearchState::default();
    let mut quality = seed_quality(original_size, target);
    debug!("Quality search: {} -> {} bytes, seed q{}", original_size, target, quality);

    for iteration in 0..MAX_SEARCH_ITERATIONS {
        let data = encode(quality)?;
        let size = data.len() as u64;
        debug!("  iteration {}: q{} -> {} bytes", iteration + 1, quality, size);

        if within_tolerance(size, target, TOLERANCE) {
            return Ok(Some(data));
        }

        match state.advance(quality, data, target) {
            Some(next) => quality = next,
            None => break,
        }
    }

    Ok(state.best)
}

/// Iterative downscale at fixed quality. Never fails for lack of progress:
/// the last attempt is returned when no round lands within tolerance.
pub fn resize_fallback<F>(width: u32, height: u32, target: u64, mut encode: F) -> CompressResult<Vec<u8>>
where
    F: FnMut(u32, u32) -> CompressResult<Vec<u8>>,
{
    let limit = target as f64 * (1.0 + TOLERANCE);
    let mut scale = RESIZE_START_SCALE;
    let mut last = Vec::new();

    for round in 0..MAX_RESIZE_ROUNDS {
        let new_width = ((width as f64 * scale) as u32).max(1);
        let new_height = ((height as f64 * scale) as u32).max(1);
        let data = encode(new_width, new_height)?;
        debug!("  resize round {}: {}x{} -> {} bytes", round + 1, new_width, new_height, data.len());

        if data.len() as f64 <= limit {
            return Ok(data);
        }

        last = data;
        scale *= RESIZE_DECAY;
    }

    warn!("Resize fallback exhausted, returning best effort of {} bytes", last.len());
    Ok(last)
}

/// Composite any alpha channel onto white, yielding an opaque RGB image
pub fn flatten_onto_white(img: &DynamicImage) -> DynamicImage {
    if !img.color().has_alpha() {
        return DynamicImage::ImageRgb8(img.to_rgb8());
    }

    let rgba = img.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (dst, src) in rgb.pixels_mut().zip(rgba.pixels()) {
        let alpha = src[3] as u32;
        for c in 0..3 {
            dst[c] = ((src[c] as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> CompressResult<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
    Ok(buf)
}

/// Size-targeting image compressor
#[derive(Debug, Clone, Default)]
pub struct ImageCompressor {
    /// None disables WebP output; WebP input is then retargeted to JPEG
    cwebp: Option<PathBuf>,
}

impl ImageCompressor {
    pub fn new(config: &Config) -> Self {
        let cwebp = config
            .cwebp_path
            .clone()
            .or_else(|| PlatformCommands::instance().get_tool_path("cwebp"));
        if cwebp.is_none() {
            debug!("cwebp not found, WebP images will be re-encoded as JPEG");
        }
        Self { cwebp }
    }

    /// Compressor without external tools (JPEG output only)
    pub fn jpeg_only() -> Self {
        Self { cwebp: None }
    }

    /// Compress `bytes` towards `target_size`. Never fails: errors become a skip.
    pub fn compress_image(&self, bytes: &[u8], mime: &str, target_size: u64) -> Outcome {
        if bytes.len() as u64 <= target_size {
            return Outcome::Skipped(SkipReason::AlreadyUnderTarget);
        }

        match self.try_compress(bytes, mime, target_size) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Image compression failed for {}: {}", mime, e);
                Outcome::Skipped(SkipReason::EncodeFailure(format!("Image compression failed: {}", e)))
            }
        }
    }

    fn try_compress(&self, bytes: &[u8], mime: &str, target_size: u64) -> CompressResult<Outcome> {
        match route_for(mime) {
            Route::Quality(LossyFormat::Jpeg) => {
                let img = image::load_from_memory(bytes)?;
                let data = self.compress_decoded(&img, LossyFormat::Jpeg, bytes.len() as u64, target_size)?;
                Ok(Outcome::Compressed(Encoded::same_format(data)))
            }
            Route::Quality(LossyFormat::WebP) => {
                let img = image::load_from_memory_with_format(bytes, ImageFormat::WebP)?;
                if self.cwebp.is_some() {
                    let data = self.compress_decoded(&img, LossyFormat::WebP, bytes.len() as u64, target_size)?;
                    return Ok(Outcome::Compressed(Encoded::same_format(data)));
                }
                let img = flatten_onto_white(&img);
                let data = self.compress_decoded(&img, LossyFormat::Jpeg, bytes.len() as u64, target_size)?;
                Ok(Outcome::Compressed(Encoded::converted(data, LossyFormat::Jpeg.mime(), LossyFormat::Jpeg.extension())))
            }
            Route::Convert => {
                // GIF decodes to its first frame
                let img = flatten_onto_white(&image::load_from_memory(bytes)?);
                let converted = encode_jpeg(&img, CONVERSION_QUALITY)?;
                debug!("Converted {} to JPEG: {} -> {} bytes", mime, bytes.len(), converted.len());

                let img = image::load_from_memory_with_format(&converted, ImageFormat::Jpeg)?;
                let data = self.compress_decoded(&img, LossyFormat::Jpeg, converted.len() as u64, target_size)?;
                Ok(Outcome::Compressed(Encoded::converted(data, LossyFormat::Jpeg.mime(), LossyFormat::Jpeg.extension())))
            }
            Route::Passthrough => {
                debug!("No recompression path for {}", mime);
                Ok(Outcome::Skipped(SkipReason::Passthrough))
            }
        }
    }

    /// Quality search, then resize fallback when nothing landed under target
    fn compress_decoded(
        &self,
        img: &DynamicImage,
        format: LossyFormat,
        original_size: u64,
        target_size: u64,
    ) -> CompressResult<Vec<u8>> {
        let scratch = match format {
            LossyFormat::WebP => Some(TempDir::with_prefix("squish-webp-")?),
            LossyFormat::Jpeg => None,
        };
        let encode = |img: &DynamicImage, quality: u8| self.encode(img, format, quality, scratch.as_ref());

        if let Some(data) = quality_search(original_size, target_size, |q| encode(img, q))? {
            return Ok(data);
        }

        let (width, height) = img.dimensions();
        debug!("Quality alone cannot reach {} bytes, downscaling {}x{}", target_size, width, height);
        resize_fallback(width, height, target_size, |w, h| {
            let resized = img.resize_exact(w, h, FilterType::Lanczos3);
            encode(&resized, RESIZE_QUALITY)
        })
    }

    fn encode(&self, img: &DynamicImage, format: LossyFormat, quality: u8, scratch: Option<&TempDir>) -> CompressResult<Vec<u8>> {
        match (format, &self.cwebp, scratch) {
            (LossyFormat::WebP, Some(cwebp), Some(dir)) => encode_webp(cwebp, dir.path(), img, quality),
            (LossyFormat::WebP, _, _) => Err(CompressError::MissingDependency("cwebp".to_string())),
            (LossyFormat::Jpeg, _, _) => encode_jpeg(img, quality),
        }
    }
}

/// Encode through cwebp: lossless PNG in, lossy WebP out
fn encode_webp(cwebp: &Path, dir: &Path, img: &DynamicImage, quality: u8) -> CompressResult<Vec<u8>> {
    let input = dir.join("frame.png");
    let output = dir.join("frame.webp");

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    std::fs::write(&input, png)?;

    let args = args![
        "-quiet",
        "-q", quality,
        "-m", "4",
        input.to_string_lossy(),
        "-o", output.to_string_lossy(),
    ];
    let status = run_tool_blocking(cwebp, &args, CWEBP_TIMEOUT)?;
    if !status.success() {
        return Err(CompressError::FFmpeg(format!("cwebp exited with {:?}", status.code())));
    }

    Ok(std::fs::read(&output)?)
}
