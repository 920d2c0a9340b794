//! # Squish - Main Entry Point
//!
//! Questo è il punto di ingresso del CLI `squish`.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del logging con `tracing-subscriber` (`RUST_LOG` o `--verbose`)
//! - Caricamento della configurazione (file JSON + override da CLI)
//! - Creazione dell'engine (con predictor opzionale) e avvio del batch
//!
//! ## Esempio di utilizzo:
//! ```bash
//! squish ./photos report.pdf --target 500KB --workers 8 --output ./small
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use squishfile::{
    file_manager::FileManager, json_output::JsonMessage, BatchRunner, CompressionEngine, Config,
    QualityPredictor,
};

#[derive(Parser)]
#[command(name = "squish")]
#[command(about = "Compress images, PDFs, video and audio to a target file size")]
struct Args {
    /// Files or directories to compress
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Target size per file, e.g. 500KB, 1.5MB, 2048B (a bare number means KB)
    #[arg(short, long)]
    target: String,

    /// Output directory (default: next to each input as <name>.min.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of files compressed in parallel
    #[arg(short, long)]
    workers: Option<usize>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Quality predictor coefficients (JSON)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Compress but don't write any output
    #[arg(long)]
    dry_run: bool,

    /// Emit JSON events on stdout instead of a progress bar
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json = args.json;
    if let Err(e) = run(args).await {
        if json {
            JsonMessage::error(e.to_string(), Some(format!("{:?}", e))).emit();
        }
        return Err(e);
    }

    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let target_size = FileManager::parse_size(&args.target)?;

    let mut config = match args.config {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };

    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(output_dir) = args.output {
        if !output_dir.exists() {
            std::fs::create_dir_all(&output_dir)?;
            info!("Created output directory: {}", output_dir.display());
        }
        config.output_path = Some(output_dir);
    }
    if args.model.is_some() {
        config.model_path = args.model;
    }
    config.dry_run |= args.dry_run;
    config.json_output |= args.json;
    config.validate()?;

    let predictor = match config.model_path {
        Some(ref model_path) => {
            let predictor = QualityPredictor::from_file(model_path)?;
            info!("Loaded quality predictor from {}", model_path.display());
            predictor
        }
        None => QualityPredictor::heuristic(),
    };
    let engine = CompressionEngine::from_config(&config).with_predictor(Arc::new(predictor));

    let runner = BatchRunner::new(config, engine, target_size)?;
    runner.run(&args.inputs).await?;

    Ok(())
}
