//! Error types for data preparation and training.

use std::path::PathBuf;

use mseg_core::TransformError;
use thiserror::Error;

/// Main error type for the segmentation workflow.
#[derive(Error, Debug)]
pub enum SegmentationError {
    /// A required dataset directory does not exist.
    #[error("Missing directory: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// Training images and labels could not be paired by file name.
    #[error("Unmatched files: images without label {images:?}, labels without image {labels:?}")]
    UnmatchedFiles {
        images: Vec<String>,
        labels: Vec<String>,
    },

    /// A data-module hook ran before the one it depends on.
    #[error("Not prepared: {0}")]
    NotPrepared(String),

    /// A dataset or split has no subjects.
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Numerical instability detected.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// A subject transform failed.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// File or network input/output failed.
    #[error("I/O error: {0:#}")]
    Io(#[from] anyhow::Error),

    /// Saving or loading a model checkpoint failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

/// Result type for segmentation operations.
pub type Result<T> = std::result::Result<T, SegmentationError>;

impl SegmentationError {
    /// Create a not-prepared error.
    pub fn not_prepared(msg: impl Into<String>) -> Self {
        Self::NotPrepared(msg.into())
    }

    /// Create an empty dataset error.
    pub fn empty_dataset(msg: impl Into<String>) -> Self {
        Self::EmptyDataset(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a numerical instability error.
    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }

    /// Create a checkpoint error.
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }
}

impl From<std::io::Error> for SegmentationError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SegmentationError::invalid_configuration("ratio must lie in (0, 1)");
        assert!(matches!(err, SegmentationError::InvalidConfiguration(_)));
        assert_eq!(err.to_string(), "Invalid configuration: ratio must lie in (0, 1)");
    }

    #[test]
    fn test_unmatched_lists_names() {
        let err = SegmentationError::UnmatchedFiles {
            images: vec!["hippocampus_002".into()],
            labels: vec![],
        };
        assert!(err.to_string().contains("hippocampus_002"));
    }

    #[test]
    fn test_from_transform_error() {
        let err: SegmentationError = TransformError::invalid_parameter("p").into();
        assert!(matches!(err, SegmentationError::Transform(_)));
    }

    #[test]
    fn test_shape_mismatch() {
        let err = SegmentationError::ShapeMismatch {
            expected: vec![1, 8, 8, 8],
            actual: vec![1, 8, 8, 16],
        };
        let err_str = err.to_string();
        assert!(err_str.contains("expected"));
        assert!(err_str.contains("got"));
    }
}
