//! # Optimizer Module
//!
//! Sottomoduli:
//! - `engine`: Dispatch di una singola compressione e normalizzazione
//! - `batch`: Runner del CLI su molti file con concorrenza limitata
//! - `progress_tracker`: Progress bar / eventi JSON del batch

pub mod batch;
pub mod engine;
pub mod progress_tracker;

pub use batch::BatchRunner;
pub use engine::CompressionEngine;
pub use progress_tracker::ProgressTracker;
