//! # Progress Tracking Module
//!
//! Tracker thread-safe condiviso dai task del batch: aggiorna le statistiche
//! e produce la progress bar oppure gli eventi JSON.

use crate::{
    file_manager::FileManager,
    json_output::{FileReport, JsonMessage},
    progress::{CompressionStats, ProgressManager},
};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct ProgressTracker {
    pub total_files: usize,
    json_output: bool,
    current_file: Arc<Mutex<usize>>,
    stats: Arc<Mutex<CompressionStats>>,
    progress_manager: ProgressManager,
}

impl ProgressTracker {
    pub fn new(total_files: usize, json_output: bool) -> Self {
        let progress_manager = if json_output {
            ProgressManager::hidden(total_files as u64)
        } else {
            ProgressManager::new(total_files as u64)
        };

        Self {
            total_files,
            json_output,
            current_file: Arc::new(Mutex::new(0)),
            stats: Arc::new(Mutex::new(CompressionStats::new())),
            progress_manager,
        }
    }

    /// Evento `file_start` (solo in modalità JSON)
    pub fn file_started(&self, path: &std::path::Path, size: u64, index: usize) {
        if self.json_output {
            JsonMessage::FileStart {
                path: path.to_path_buf(),
                size,
                index,
                total: self.total_files,
            }
            .emit();
        }
    }

    /// Registra l'esito di un file ed emette gli eventi corrispondenti
    pub async fn handle_file_completion(&self, report: &FileReport) {
        let current = {
            let mut current = self.current_file.lock().await;
            *current += 1;
            *current
        };

        let snapshot = {
            let mut stats = self.stats.lock().await;
            if report.error.is_some() {
                stats.add_error();
            } else if report.skipped {
                stats.add_skipped(report.original_size);
            } else {
                stats.add_compressed(report.original_size, report.compressed_size, report.over_target);
            }
            stats.clone()
        };

        if self.json_output {
            JsonMessage::FileComplete(report.clone()).emit();
            JsonMessage::progress(current, self.total_files, &snapshot).emit();
        }

        self.progress_manager.update(&Self::status_line(report));
    }

    fn status_line(report: &FileReport) -> String {
        let name = report.path.file_name().unwrap_or_default().to_string_lossy();
        if let Some(ref error) = report.error {
            format!("[ERROR] {}: {}", name, error)
        } else if report.skipped {
            format!("[SKIP] {}: {}", name, report.message.as_deref().unwrap_or("skipped"))
        } else {
            format!(
                "[OK] {}: {} -> {}",
                name,
                FileManager::format_size(report.original_size),
                FileManager::format_size(report.compressed_size)
            )
        }
    }

    pub fn finish(&self, summary: &str) {
        self.progress_manager.finish(summary);
    }

    pub async fn get_stats(&self) -> CompressionStats {
        self.stats.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn report(skipped: bool, error: Option<&str>) -> FileReport {
        FileReport {
            path: PathBuf::from("/media/file.jpg"),
            output_path: None,
            original_size: 1000,
            compressed_size: if skipped { 1000 } else { 400 },
            reduction_percent: 0.0,
            skipped,
            over_target: false,
            message: None,
            error: error.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_tracker_counts_outcomes() {
        let tracker = ProgressTracker::new(3, false);
        tracker.handle_file_completion(&report(false, None)).await;
        tracker.handle_file_completion(&report(true, None)).await;
        tracker.handle_file_completion(&report(false, Some("read failed"))).await;

        let stats = tracker.get_stats().await;
        assert_eq!(stats.files_processed, 3);
        assert_eq!(stats.files_compressed, 1);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.total_bytes_saved, 600);
    }

    #[test]
    fn test_status_line() {
        assert_eq!(ProgressTracker::status_line(&report(true, None)), "[SKIP] file.jpg: skipped");
        assert_eq!(
            ProgressTracker::status_line(&report(false, Some("boom"))),
            "[ERROR] file.jpg: boom"
        );
        assert!(ProgressTracker::status_line(&report(false, None)).starts_with("[OK] file.jpg"));
    }
}
