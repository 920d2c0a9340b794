//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione operativa dell'engine.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con timeout, tool esterni e opzioni batch
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `probe_timeout_secs`: Timeout per ffprobe / ffmpeg -i (default: 30)
//! - `audio_timeout_secs`: Timeout encoding audio (default: 120)
//! - `video_pass_timeout_secs`: Timeout per ogni pass video (default: 300)
//! - `video_preset`: Preset x264 (default: "medium")
//! - `ffmpeg_log_level`: Log level passato a ffmpeg (default: "error")
//! - `ffmpeg_path` / `ffprobe_path` / `cwebp_path`: Path espliciti dei tool (default: auto)
//! - `workers`: Numero di file compressi in parallelo nel batch (default: 4)
//! - `output_path`: Directory di output (default: None = accanto all'originale)
//! - `dry_run`: Comprime ma non scrive nulla (default: false)
//! - `json_output`: Eventi JSON invece della progress bar (default: false)
//! - `model_path`: File coefficienti del predictor (default: None = euristica)
//!
//! Le costanti dell'algoritmo (bound di qualità, tolleranza 5%, ladder di
//! downscale, bitrate) NON sono configurabili: vivono nei rispettivi processor.
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     workers: 8,
//!     video_preset: "slow".to_string(),
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::CompressError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the compression engine and the batch runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Timeout for a single probe invocation
    pub probe_timeout_secs: u64,
    /// Timeout for the single-pass audio encode
    pub audio_timeout_secs: u64,
    /// Timeout for each of the two video passes
    pub video_pass_timeout_secs: u64,
    /// x264 preset used by both video passes
    pub video_preset: String,
    /// ffmpeg `-loglevel`
    pub ffmpeg_log_level: String,
    /// Explicit ffmpeg binary (None = resolve from tools dir / PATH)
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit ffprobe binary (None = resolve from tools dir / PATH)
    pub ffprobe_path: Option<PathBuf>,
    /// Explicit cwebp binary (None = resolve from tools dir / PATH)
    pub cwebp_path: Option<PathBuf>,
    /// Number of files compressed concurrently by the batch runner
    pub workers: usize,
    /// Output directory for compressed files (None = next to the input)
    pub output_path: Option<PathBuf>,
    /// Dry run - compress but don't write anything
    pub dry_run: bool,
    /// Output progress and results as JSON for programmatic use
    pub json_output: bool,
    /// Coefficients file for the advisory quality predictor
    pub model_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 30,
            audio_timeout_secs: 120,
            video_pass_timeout_secs: 300,
            video_preset: "medium".to_string(),
            ffmpeg_log_level: "error".to_string(),
            ffmpeg_path: None,
            ffprobe_path: None,
            cwebp_path: None,
            workers: 4,
            output_path: None,
            dry_run: false,
            json_output: false,
            model_path: None,
        }
    }
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    CompressError::Validation(message.into()).into()
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout_secs == 0 || self.audio_timeout_secs == 0 || self.video_pass_timeout_secs == 0 {
            return Err(invalid("Timeouts must be greater than 0 seconds"));
        }

        if self.video_preset.trim().is_empty() {
            return Err(invalid("Video preset must not be empty"));
        }

        if self.workers == 0 {
            return Err(invalid("Number of workers must be greater than 0"));
        }

        // Validate output path if specified
        if let Some(ref output_path) = self.output_path {
            if !output_path.exists() {
                return Err(invalid(format!("Output path does not exist: {}", output_path.display())));
            }
            if !output_path.is_dir() {
                return Err(invalid(format!("Output path is not a directory: {}", output_path.display())));
            }
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn audio_timeout(&self) -> Duration {
        Duration::from_secs(self.audio_timeout_secs)
    }

    pub fn video_pass_timeout(&self) -> Duration {
        Duration::from_secs(self.video_pass_timeout_secs)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.workers = 0;
        assert!(config.validate().is_err());

        config.workers = 4;
        config.audio_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.audio_timeout_secs = 120;
        config.video_preset = "  ".to_string();
        assert!(config.validate().is_err());

        config.video_preset = "medium".to_string();
        config.output_path = Some(PathBuf::from("/definitely/not/here"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.probe_timeout(), Duration::from_secs(30));
        assert_eq!(config.audio_timeout(), Duration::from_secs(120));
        assert_eq!(config.video_pass_timeout(), Duration::from_secs(300));
        assert_eq!(config.video_preset, "medium");
        assert_eq!(config.workers, 4);
        assert!(!config.dry_run);
        assert!(config.output_path.is_none());
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = Config {
            video_pass_timeout_secs: 600,
            video_preset: "slow".to_string(),
            workers: 8,
            dry_run: true,
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.video_pass_timeout_secs, 600);
        assert_eq!(loaded_config.video_preset, "slow");
        assert_eq!(loaded_config.workers, 8);
        assert!(loaded_config.dry_run);
        assert_eq!(loaded_config.probe_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_partial_config_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "workers": 2 }"#).await.unwrap();

        let config = Config::from_file(&config_path).await.unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.audio_timeout_secs, 120);
    }

    #[tokio::test]
    async fn test_missing_config_file_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("nope.json")).await.unwrap();
        assert_eq!(config.workers, 4);
    }
}
