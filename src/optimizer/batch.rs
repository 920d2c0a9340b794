//! # Batch Runner
//!
//! Orchestratore del CLI: scopre i file, li comprime in parallelo con un
//! pool di worker limitato da semaforo e scrive gli output.
//!
//! ## Flusso:
//! 1. Discovery dei file supportati da tutti gli input
//! 2. Messaggio `start` / log della configurazione
//! 3. Un task tokio per file, al massimo `workers` contemporanei
//! 4. Ogni task: lettura → `CompressionEngine::compress` → scrittura
//!    `<stem>.min.<ext>` (saltata in dry-run o se il file è stato skippato)
//! 5. Statistiche finali
//!
//! Gli errori del singolo file (lettura/scrittura) vengono contati e
//! riportati, non interrompono il batch.

use crate::{
    config::Config,
    file_manager::FileManager,
    image_processor::TOLERANCE,
    json_output::{FileReport, JsonConfig, JsonMessage},
    optimizer::{engine::CompressionEngine, progress_tracker::ProgressTracker},
    platform::PlatformCommands,
    progress::CompressionStats,
    types::{Category, CompressionRequest},
};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

const FALLBACK_MIME: &str = "application/octet-stream";

pub struct BatchRunner {
    config: Arc<Config>,
    engine: CompressionEngine,
    target_size: u64,
}

impl BatchRunner {
    pub fn new(config: Config, engine: CompressionEngine, target_size: u64) -> Result<Self> {
        config.validate()?;
        if target_size == 0 {
            return Err(anyhow::anyhow!("Target size must be greater than zero"));
        }

        Ok(Self {
            config: Arc::new(config),
            engine,
            target_size,
        })
    }

    /// Compress every supported file under `inputs`
    pub async fn run(&self, inputs: &[PathBuf]) -> Result<CompressionStats> {
        let start_time = std::time::Instant::now();

        let mut files = Vec::new();
        for input in inputs {
            files.extend(FileManager::find_media_files(input)?);
        }
        files.sort();
        files.dedup();

        self.emit_start_message(inputs, &files);
        self.log_configuration(&files);
        self.check_dependencies(&files);

        if files.is_empty() {
            let stats = CompressionStats::new();
            self.print_final_stats(&stats, start_time.elapsed().as_secs_f64());
            return Ok(stats);
        }

        let progress_tracker = ProgressTracker::new(files.len(), self.config.json_output);
        self.process_files_concurrently(files, progress_tracker.clone()).await?;

        let stats = progress_tracker.get_stats().await;
        progress_tracker.finish(&stats.format_summary());
        self.print_final_stats(&stats, start_time.elapsed().as_secs_f64());

        Ok(stats)
    }

    async fn process_files_concurrently(&self, files: Vec<PathBuf>, progress_tracker: ProgressTracker) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks = Vec::with_capacity(files.len());

        for (index, file_path) in files.into_iter().enumerate() {
            let permit = semaphore.clone().acquire_owned().await?;
            let engine = self.engine.clone();
            let config = self.config.clone();
            let target_size = self.target_size;
            let tracker = progress_tracker.clone();
            let path = file_path.clone();

            let task = tokio::spawn(async move {
                let _permit = permit;
                let report = Self::compress_file(&engine, &config, target_size, &path, index, &tracker).await;
                tracker.handle_file_completion(&report).await;
            });
            tasks.push((file_path, task));
        }

        for (file_path, task) in tasks {
            if let Err(e) = task.await {
                error!("Task for {} failed: {}", file_path.display(), e);
                let report = FileReport::failed(file_path, 0, format!("Task failed: {}", e));
                progress_tracker.handle_file_completion(&report).await;
            }
        }

        Ok(())
    }

    /// Compress a single file and write its output
    async fn compress_file(
        engine: &CompressionEngine,
        config: &Config,
        target_size: u64,
        path: &Path,
        index: usize,
        tracker: &ProgressTracker,
    ) -> FileReport {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return FileReport::failed(path.to_path_buf(), 0, format!("Failed to read file: {}", e));
            }
        };
        let original_size = bytes.len() as u64;
        tracker.file_started(path, original_size, index);

        let (category, mime) = FileManager::classify(path).unwrap_or((Category::Unsupported, FALLBACK_MIME));
        let mut request = CompressionRequest::new(bytes, mime, category, target_size);
        if category == Category::Image {
            if let Some((width, height)) = FileManager::image_dimensions(path) {
                request = request.with_dimensions(width, height);
            }
        }

        let result = engine.compress(request).await;
        let over_target = !result.skipped && result.size as f64 > target_size as f64 * (1.0 + TOLERANCE);

        let mut report = FileReport {
            path: path.to_path_buf(),
            output_path: None,
            original_size,
            compressed_size: result.size,
            reduction_percent: FileReport::reduction(original_size, result.size),
            skipped: result.skipped,
            over_target,
            message: result.message.clone(),
            error: None,
        };

        if result.skipped || config.dry_run {
            debug!("Not writing {} (skipped={}, dry_run={})", path.display(), result.skipped, config.dry_run);
            return report;
        }

        let output_path = FileManager::output_path(
            path,
            config.output_path.as_deref(),
            result.output_extension.as_deref(),
        );
        if let Err(e) = Self::write_output(&output_path, &result.bytes).await {
            warn!("Failed to write {}: {}", output_path.display(), e);
            return FileReport::failed(path.to_path_buf(), original_size, format!("Failed to write output: {}", e));
        }

        report.output_path = Some(output_path);
        report
    }

    async fn write_output(output_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output_path, bytes).await
    }

    fn emit_start_message(&self, inputs: &[PathBuf], files: &[PathBuf]) {
        if self.config.json_output {
            JsonMessage::Start {
                inputs: inputs.to_vec(),
                output_dir: self.config.output_path.clone(),
                total_files: files.len(),
                target_size: self.target_size,
                config: JsonConfig::from(self.config.as_ref()),
            }
            .emit();
        } else {
            info!("Compressing {} input(s) to {}", inputs.len(), FileManager::format_size(self.target_size));
        }
    }

    fn log_configuration(&self, files: &[PathBuf]) {
        if self.config.json_output {
            return;
        }

        match self.config.output_path {
            Some(ref output_path) => info!("Output directory: {}", output_path.display()),
            None => info!("Outputs are written next to the originals as <name>.min.<ext>"),
        }
        if self.config.dry_run {
            info!("Dry run mode: No files will be written");
        }
        info!("Workers: {}", self.config.workers);
        info!("Found {} files to process", files.len());
    }

    /// Missing tools only degrade affected files to skips
    fn check_dependencies(&self, files: &[PathBuf]) {
        let platform = PlatformCommands::instance();
        debug!("{}", platform.get_tools_report());

        let needs_ffmpeg = files.iter().any(|f| {
            matches!(FileManager::classify(f), Some((Category::Video | Category::Audio, _)))
        });
        if !needs_ffmpeg {
            return;
        }
        for tool in ["ffmpeg", "ffprobe"] {
            let explicit = match tool {
                "ffmpeg" => self.config.ffmpeg_path.is_some(),
                _ => self.config.ffprobe_path.is_some(),
            };
            if !explicit && !platform.is_command_available(tool) {
                warn!("{} not found: video and audio files will be skipped", tool);
            }
        }
    }

    fn print_final_stats(&self, stats: &CompressionStats, duration: f64) {
        if self.config.json_output {
            JsonMessage::complete(stats, duration).emit();
        } else {
            info!("=== Compression Complete ===");
            info!("Files processed: {}", stats.files_processed);
            info!("Files compressed: {}", stats.files_compressed);
            info!("Files over target: {}", stats.files_over_target);
            info!("Files skipped: {}", stats.files_skipped);
            info!("Errors: {}", stats.errors);
            info!("Bytes saved: {}", FileManager::format_size(stats.total_bytes_saved));
            info!("Average reduction: {:.2}%", stats.overall_reduction_percent());
            info!("Elapsed: {:.1}s", duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEncoder, FakeProber};
    use crate::types::MediaProbe;
    use tempfile::TempDir;

    fn engine(config: &Config) -> CompressionEngine {
        let prober = FakeProber::returning(MediaProbe {
            duration_seconds: 10.0,
            streams: Vec::new(),
        });
        CompressionEngine::new(config, Arc::new(prober), Arc::new(FakeEncoder::producing(100)))
    }

    fn runner(config: Config) -> BatchRunner {
        let engine = engine(&config);
        BatchRunner::new(config, engine, 2000).unwrap()
    }

    fn populate(dir: &Path) {
        std::fs::write(dir.join("song.wav"), vec![7u8; 10_000]).unwrap();
        std::fs::write(dir.join("short.mp3"), vec![7u8; 500]).unwrap();
        std::fs::write(dir.join("readme.txt"), b"ignored").unwrap();
    }

    #[tokio::test]
    async fn test_batch_writes_next_to_input() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());

        let config = Config { json_output: true, ..Default::default() };
        let stats = runner(config).run(&[dir.path().to_path_buf()]).await.unwrap();

        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.files_compressed, 1);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.total_bytes_saved, 9_900);

        let written = std::fs::read(dir.path().join("song.min.mp3")).unwrap();
        assert_eq!(written.len(), 100);
        assert!(!dir.path().join("short.min.mp3").exists());
    }

    #[tokio::test]
    async fn test_batch_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());

        let config = Config { dry_run: true, json_output: true, ..Default::default() };
        let stats = runner(config).run(&[dir.path().to_path_buf()]).await.unwrap();

        assert_eq!(stats.files_compressed, 1);
        assert!(!dir.path().join("song.min.mp3").exists());
    }

    #[tokio::test]
    async fn test_batch_output_directory() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        populate(dir.path());

        let config = Config {
            output_path: Some(out.path().to_path_buf()),
            workers: 1,
            json_output: true,
            ..Default::default()
        };
        runner(config).run(&[dir.path().join("song.wav")]).await.unwrap();

        assert!(out.path().join("song.min.mp3").exists());
        assert!(!dir.path().join("song.min.mp3").exists());
    }

    #[tokio::test]
    async fn test_batch_empty_and_invalid() {
        let dir = TempDir::new().unwrap();
        let config = Config { json_output: true, ..Default::default() };
        let stats = runner(config.clone()).run(&[dir.path().to_path_buf()]).await.unwrap();
        assert_eq!(stats, CompressionStats::new());

        assert!(BatchRunner::new(config.clone(), engine(&config), 0).is_err());
        assert!(runner(config).run(&[dir.path().join("missing")]).await.is_err());
    }
}
