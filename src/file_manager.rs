//! # File Management Module
//!
//! Questo modulo gestisce la discovery dei file e le utilità sui path per il
//! runner batch.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di file supportati (file singoli o directory)
//! - Categoria e MIME dall'estensione (nessuno sniffing del contenuto)
//! - Parsing della dimensione target (`500KB`, `1.5MB`, `2048B`)
//! - Path di output: `<stem>.min.<ext>` accanto all'originale o nella
//!   directory di output
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati supportati:
//! - **Immagini**: JPG, JPEG, PNG, WebP, GIF
//! - **Documenti**: PDF
//! - **Video**: MP4, M4V, MOV, WebM, MKV, AVI
//! - **Audio**: MP3, WAV, M4A, OGG, FLAC, AAC

use crate::types::Category;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Infix marking files written by the batch runner
const OUTPUT_MARKER: &str = ".min";

/// Manages file discovery and path utilities
pub struct FileManager;

impl FileManager {
    /// Find all supported files under `input` (a file or a directory).
    ///
    /// Previous outputs (`*.min.*`) are not picked up again.
    pub fn find_media_files(input: &Path) -> Result<Vec<PathBuf>> {
        if !input.exists() {
            return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(input)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if Self::is_supported_format(path) && !Self::is_compressed_output(path) {
                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }

    /// Check if a file format is supported
    pub fn is_supported_format(path: &Path) -> bool {
        Self::classify(path).is_some()
    }

    fn extension_lower(path: &Path) -> Option<String> {
        path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Category and MIME type from the file extension
    pub fn classify(path: &Path) -> Option<(Category, &'static str)> {
        let classified = match Self::extension_lower(path)?.as_str() {
            "jpg" | "jpeg" => (Category::Image, "image/jpeg"),
            "png" => (Category::Image, "image/png"),
            "webp" => (Category::Image, "image/webp"),
            "gif" => (Category::Image, "image/gif"),
            "pdf" => (Category::Document, "application/pdf"),
            "mp4" | "m4v" => (Category::Video, "video/mp4"),
            "mov" => (Category::Video, "video/quicktime"),
            "webm" => (Category::Video, "video/webm"),
            "mkv" => (Category::Video, "video/x-matroska"),
            "avi" => (Category::Video, "video/x-msvideo"),
            "mp3" => (Category::Audio, "audio/mpeg"),
            "wav" => (Category::Audio, "audio/wav"),
            "m4a" => (Category::Audio, "audio/mp4"),
            "ogg" => (Category::Audio, "audio/ogg"),
            "flac" => (Category::Audio, "audio/flac"),
            "aac" => (Category::Audio, "audio/aac"),
            _ => return None,
        };
        Some(classified)
    }

    /// Whether the file looks like something this tool wrote
    pub fn is_compressed_output(path: &Path) -> bool {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().ends_with(OUTPUT_MARKER))
            .unwrap_or(false)
    }

    /// Pixel dimensions of an image file, read from its header
    pub fn image_dimensions(path: &Path) -> Option<(u32, u32)> {
        image::image_dimensions(path).ok()
    }

    /// Where the compressed version of `input` is written.
    ///
    /// `extension` (with leading dot) overrides the input's extension when
    /// the compressor changed the format.
    pub fn output_path(input: &Path, output_dir: Option<&Path>, extension: Option<&str>) -> PathBuf {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let extension = match extension {
            Some(ext) => ext.to_string(),
            None => input
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default(),
        };
        let file_name = format!("{}{}{}", stem, OUTPUT_MARKER, extension);

        match output_dir {
            Some(dir) => dir.join(file_name),
            None => input.with_file_name(file_name),
        }
    }

    /// Parse a human size such as `500KB`, `1.5 MB` or `2048B` (1024-based).
    /// A bare number is taken as kilobytes.
    pub fn parse_size(input: &str) -> Result<u64> {
        let trimmed = input.trim();
        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);

        let value: f64 = number
            .parse()
            .with_context(|| format!("Invalid size: {:?}", input))?;
        let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
            "B" => 1,
            "" | "K" | "KB" | "KIB" => 1024,
            "M" | "MB" | "MIB" => 1024 * 1024,
            "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
            other => return Err(anyhow::anyhow!("Unknown size unit {:?} in {:?}", other, input)),
        };

        let bytes = (value * multiplier as f64).round() as u64;
        if bytes == 0 {
            return Err(anyhow::anyhow!("Target size must be greater than zero"));
        }
        Ok(bytes)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
