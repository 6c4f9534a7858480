//! Shared types for the land-record digitization pipeline.
//!
//! Every stage crate speaks in terms of the types defined here: detected
//! table cells, extracted field maps and the [`ProcessingError`] taxonomy
//! used to report per-file failures back to the operator.

pub mod levels;
pub mod record;
pub mod table;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use record::{DocumentCategory, ExtractedData, FieldKind, FieldMap, LanguageConfidence};
pub use table::{
    BoundingBox, CellData, CellId, TableStructure, DEFAULT_REVIEW_THRESHOLD, MAX_CONFIDENCE,
};

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Admission,
    Preprocessing,
    Recognition,
    Extraction,
    Commit,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineStage::Admission => "admission",
            PipelineStage::Preprocessing => "preprocessing",
            PipelineStage::Recognition => "recognition",
            PipelineStage::Extraction => "extraction",
            PipelineStage::Commit => "commit",
        };
        f.write_str(label)
    }
}

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File too small: {size} bytes (min: {min})")]
    FileTooSmall { size: u64, min: u64 },

    #[error("File too large: {size} bytes (max: {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Transform backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Recognition pool unavailable: {0}")]
    PoolUnavailable(String),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{file}: {stage} failed: {source}")]
    InFile {
        file: String,
        stage: PipelineStage,
        #[source]
        source: Box<ProcessingError>,
    },

    #[error("Other error: {0}")]
    Other(String),
}

impl ProcessingError {
    /// Attach the file name and stage the error occurred in
    #[must_use]
    pub fn in_file(self, file: impl Into<String>, stage: PipelineStage) -> Self {
        ProcessingError::InFile {
            file: file.into(),
            stage,
            source: Box::new(self),
        }
    }

    /// True for failures that must stop the whole run rather than one file
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            ProcessingError::PoolUnavailable(_) => true,
            ProcessingError::InFile { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    #[must_use]
    pub fn file(&self) -> Option<&str> {
        match self {
            ProcessingError::InFile { file, .. } => Some(file),
            _ => None,
        }
    }

    #[must_use]
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            ProcessingError::InFile { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<image::ImageError> for ProcessingError {
    fn from(err: image::ImageError) -> Self {
        ProcessingError::ImageError(err.to_string())
    }
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;
