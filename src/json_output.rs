//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso
//! programmatico del CLI (una riga JSON per evento su stdout).
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del batch
//! - `file_start`: Inizio elaborazione di un file
//! - `file_complete`: Fine elaborazione di un file (anche skip ed errori)
//! - `progress`: Contatori correnti
//! - `complete`: Fine del batch con statistiche finali
//! - `error`: Errore generale

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::Config;
use crate::file_manager::FileManager;
use crate::progress::CompressionStats;

/// Tipo di messaggio JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        inputs: Vec<PathBuf>,
        output_dir: Option<PathBuf>,
        total_files: usize,
        target_size: u64,
        config: JsonConfig,
    },

    Progress {
        current: usize,
        total: usize,
        percentage: f64,
        files_compressed: usize,
        files_skipped: usize,
        errors: usize,
        bytes_saved: u64,
    },

    FileStart {
        path: PathBuf,
        size: u64,
        index: usize,
        total: usize,
    },

    FileComplete(FileReport),

    Complete {
        files_processed: usize,
        files_compressed: usize,
        files_skipped: usize,
        files_over_target: usize,
        errors: usize,
        total_bytes_saved: u64,
        average_reduction: f64,
        duration_seconds: f64,
    },

    Error {
        message: String,
        details: Option<String>,
    },
}

/// Esito di un singolo file del batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: PathBuf,
    /// None when skipped, failed or in dry-run mode
    pub output_path: Option<PathBuf>,
    pub original_size: u64,
    pub compressed_size: u64,
    pub reduction_percent: f64,
    pub skipped: bool,
    pub over_target: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl FileReport {
    pub fn failed(path: PathBuf, original_size: u64, error: String) -> Self {
        Self {
            path,
            output_path: None,
            original_size,
            compressed_size: original_size,
            reduction_percent: 0.0,
            skipped: false,
            over_target: false,
            message: None,
            error: Some(error),
        }
    }

    pub fn reduction(original_size: u64, compressed_size: u64) -> f64 {
        FileManager::calculate_reduction(original_size, compressed_size)
    }
}

/// Parametri del batch riportati nel messaggio `start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonConfig {
    pub workers: usize,
    pub dry_run: bool,
    pub video_preset: String,
}

impl From<&Config> for JsonConfig {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.workers,
            dry_run: config.dry_run,
            video_preset: config.video_preset.clone(),
        }
    }
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn progress(current: usize, total: usize, stats: &CompressionStats) -> Self {
        let percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Self::Progress {
            current,
            total,
            percentage,
            files_compressed: stats.files_compressed,
            files_skipped: stats.files_skipped,
            errors: stats.errors,
            bytes_saved: stats.total_bytes_saved,
        }
    }

    pub fn complete(stats: &CompressionStats, duration_seconds: f64) -> Self {
        Self::Complete {
            files_processed: stats.files_processed,
            files_compressed: stats.files_compressed,
            files_skipped: stats.files_skipped,
            files_over_target: stats.files_over_target,
            errors: stats.errors,
            total_bytes_saved: stats.total_bytes_saved,
            average_reduction: stats.overall_reduction_percent(),
            duration_seconds,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}
