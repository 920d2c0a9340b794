//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - Definisce `CompressError` enum per categorizzare gli errori interni
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file temporanei, permessi, etc.)
//! - `Image`: Errori di decodifica/codifica immagini
//! - `Pdf`: Errori di parsing o serializzazione PDF
//! - `FFmpeg`: Processo esterno terminato con exit code non zero
//! - `Probe`: Metadati non disponibili o non parsabili
//! - `Timeout`: Processo esterno oltre il limite di tempo
//! - `UnsupportedFormat`: Formato senza percorso di ricompressione
//! - `MissingDependency`: Tool esterno mancante (ffmpeg, ffprobe, cwebp)
//! - `Validation`: Errori di validazione configurazione
//!
//! ## Nota:
//! Questi errori non escono mai dall'engine: ogni targeter li converte in
//! un risultato `skipped` con un messaggio diagnostico (vedi `types::SkipReason`).

/// Custom error types for size-targeted compression
#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("External process timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl CompressError {
    /// Whether the error came from an external process exceeding its bound
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type CompressResult<T> = std::result::Result<T, CompressError>;
