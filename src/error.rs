//! Error types for ingest operations

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for provisioning and upload
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("No files found in {}/*{extension}", dir.display())]
    NoMatchingFiles { dir: PathBuf, extension: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Data type mismatch: expected {expected}, got {actual}")]
    DataTypeMismatch { expected: String, actual: String },

    #[error("Failed to read slab {z_start}..{z_end}: {source}")]
    SlabRead {
        z_start: usize,
        z_end: usize,
        #[source]
        source: Box<IngestError>,
    },

    #[error("Failed to write slab {z_start}..{z_end} after {attempts} attempts: {source}")]
    SlabWrite {
        z_start: usize,
        z_end: usize,
        attempts: u32,
        #[source]
        source: Box<IngestError>,
    },

    #[error("Upload cancelled before slab at z={0}")]
    Cancelled(usize),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl IngestError {
    /// Whether this error means the remote object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, IngestError::NotFound(_))
    }

    /// Whether this error was raised before any remote interaction
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            IngestError::Configuration(_)
                | IngestError::InvalidGeometry(_)
                | IngestError::InvalidUri(_)
                | IngestError::NoMatchingFiles { .. }
        )
    }
}

/// Specialized Result type for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for IngestError {
    fn from(err: image::ImageError) -> Self {
        IngestError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(IngestError::NotFound("collection/x".into()).is_not_found());
        assert!(!IngestError::Remote("500".into()).is_not_found());

        let empty = IngestError::NoMatchingFiles {
            dir: PathBuf::from("/data"),
            extension: ".tif".into(),
        };
        assert!(empty.is_configuration());
        assert_eq!(empty.to_string(), "No files found in /data/*.tif");
        assert!(!IngestError::Cancelled(16).is_configuration());
    }

    #[test]
    fn test_slab_write_message_keeps_cause() {
        let err = IngestError::SlabWrite {
            z_start: 32,
            z_end: 40,
            attempts: 4,
            source: Box::new(IngestError::Remote("HTTP 503".into())),
        };
        assert_eq!(
            err.to_string(),
            "Failed to write slab 32..40 after 4 attempts: Remote store error: HTTP 503"
        );
    }
}
