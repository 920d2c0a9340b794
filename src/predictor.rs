//! # Quality Predictor
//!
//! Advisory estimate of the JPEG quality that will hit a target size. The
//! engine only logs it; the image targeter converges by measurement.
//!
//! A model file is a JSON linear regression over
//! `[original_size, target_size, pixel_count, size_ratio]`:
//!
//! ```json
//! { "coefficients": [0.0, 0.0, 0.0, 85.0], "intercept": 0.0 }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::image_processor::{MAX_QUALITY, MIN_QUALITY};

const HEURISTIC_SCALE: f64 = 85.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: [f64; 4],
    pub intercept: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum Strategy {
    Heuristic,
    Linear(LinearModel),
}

/// Immutable once built; share it behind an `Arc`
#[derive(Debug, Clone, PartialEq)]
pub struct QualityPredictor {
    strategy: Strategy,
}

impl QualityPredictor {
    /// `size_ratio * 85`
    pub fn heuristic() -> Self {
        Self { strategy: Strategy::Heuristic }
    }

    pub fn from_model(model: LinearModel) -> Self {
        Self { strategy: Strategy::Linear(model) }
    }

    /// Load a model file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read predictor model {}", path.display()))?;
        let model: LinearModel = serde_json::from_str(&content)
            .with_context(|| format!("Invalid predictor model {}", path.display()))?;
        Ok(Self::from_model(model))
    }

    pub fn is_heuristic(&self) -> bool {
        self.strategy == Strategy::Heuristic
    }

    /// Predicted quality in `[5, 95]`
    pub fn predict(&self, original_size: u64, target_size: u64, width: u32, height: u32) -> u8 {
        let size_ratio = if original_size > 0 {
            target_size as f64 / original_size as f64
        } else {
            1.0
        };

        let raw = match &self.strategy {
            Strategy::Heuristic => size_ratio * HEURISTIC_SCALE,
            Strategy::Linear(model) => {
                let features = [
                    original_size as f64,
                    target_size as f64,
                    width as f64 * height as f64,
                    size_ratio,
                ];
                model.intercept
                    + model
                        .coefficients
                        .iter()
                        .zip(features.iter())
                        .map(|(c, f)| c * f)
                        .sum::<f64>()
            }
        };

        if !raw.is_finite() {
            return MIN_QUALITY;
        }
        raw.trunc().clamp(MIN_QUALITY as f64, MAX_QUALITY as f64) as u8
    }
}

impl Default for QualityPredictor {
    fn default() -> Self {
        Self::heuristic()
    }
}
