//! # Core Types
//!
//! Request/result shapes shared by every targeter, plus the internal
//! `Outcome` union each targeter returns before the engine normalizes it
//! into a [`CompressionResult`].

use serde::{Deserialize, Serialize};

/// Modality routed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    #[serde(alias = "pdf")]
    Document,
    Video,
    Audio,
    /// Anything the engine has no targeter for
    #[serde(other)]
    Unsupported,
}

impl Category {
    /// Parse a category name, mapping anything unknown to `Unsupported`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "image" => Self::Image,
            "document" | "pdf" => Self::Document,
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single compression call
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    pub bytes: Vec<u8>,
    pub declared_mime: String,
    pub category: Category,
    /// Byte budget; always > 0
    pub target_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl CompressionRequest {
    pub fn new(bytes: Vec<u8>, declared_mime: impl Into<String>, category: Category, target_size: u64) -> Self {
        Self {
            bytes,
            declared_mime: declared_mime.into(),
            category,
            target_size,
            width: None,
            height: None,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

/// Normalized result handed back to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionResult {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Always `bytes.len()`
    pub size: u64,
    pub original_size: u64,
    pub skipped: bool,
    pub message: Option<String>,
    pub output_mime: Option<String>,
    pub output_extension: Option<String>,
}

impl CompressionResult {
    /// Skip result carrying the untouched input
    pub fn skipped(original: Vec<u8>, message: Option<String>) -> Self {
        let size = original.len() as u64;
        Self {
            bytes: original,
            size,
            original_size: size,
            skipped: true,
            message,
            output_mime: None,
            output_extension: None,
        }
    }

    /// Bytes saved relative to the input, saturating at zero
    pub fn bytes_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.size)
    }
}

/// Stream kind reported by the prober
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecType {
    Video,
    Audio,
    Other,
}

impl CodecType {
    pub fn from_ffprobe(codec_type: &str) -> Self {
        match codec_type {
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub codec_type: CodecType,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Container metadata for one audio/video blob. Lives for a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    pub duration_seconds: f64,
    /// Empty when the text fallback was used
    pub streams: Vec<StreamInfo>,
}

impl MediaProbe {
    /// Resolution of the first video stream, if it declares one
    pub fn video_resolution(&self) -> Option<(u32, u32)> {
        let stream = self.streams.iter().find(|s| s.codec_type == CodecType::Video)?;
        Some((stream.width?, stream.height?))
    }
}

/// Why a targeter handed the input back unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyUnderTarget,
    ProbeFailure(String),
    EncodeFailure(String),
    Timeout(String),
    UnsupportedModality,
    /// Format with no recompression path
    Passthrough,
}

impl SkipReason {
    pub fn message(&self) -> Option<String> {
        match self {
            Self::AlreadyUnderTarget | Self::Passthrough => None,
            Self::ProbeFailure(msg) | Self::EncodeFailure(msg) | Self::Timeout(msg) => Some(msg.clone()),
            Self::UnsupportedModality => Some("Unsupported file type".to_string()),
        }
    }
}

/// Freshly encoded payload, possibly in a different format than the input
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub output_mime: Option<String>,
    pub output_extension: Option<String>,
}

impl Encoded {
    pub fn same_format(bytes: Vec<u8>) -> Self {
        Self { bytes, output_mime: None, output_extension: None }
    }

    pub fn converted(bytes: Vec<u8>, mime: &str, extension: &str) -> Self {
        Self {
            bytes,
            output_mime: Some(mime.to_string()),
            output_extension: Some(extension.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What a targeter produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Compressed(Encoded),
    Skipped(SkipReason),
}

impl Outcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Normalize into the common result shape. `original` is returned as-is on skip.
    pub fn into_result(self, original: Vec<u8>) -> CompressionResult {
        let original_size = original.len() as u64;
        match self {
            Self::Compressed(encoded) => CompressionResult {
                size: encoded.bytes.len() as u64,
                bytes: encoded.bytes,
                original_size,
                skipped: false,
                message: None,
                output_mime: encoded.output_mime,
                output_extension: encoded.output_extension,
            },
            Self::Skipped(reason) => CompressionResult::skipped(original, reason.message()),
        }
    }
}
