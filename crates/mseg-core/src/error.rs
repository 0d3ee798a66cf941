//! Error types for volume and transform operations.

use thiserror::Error;

/// Error raised while building or applying a transform.
#[derive(Error, Debug)]
pub enum TransformError {
    /// A subject lacks an image the transform needs.
    #[error("Missing image: subject '{subject}' has no '{role}' image")]
    MissingImage { subject: String, role: String },

    /// A label map holds a value that is not a valid class index.
    #[error("Invalid label value {value} (expected an integer in 0..{num_classes})")]
    InvalidLabel { value: f32, num_classes: usize },

    /// A transform parameter is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Tensor data could not be read back to host memory.
    #[error("Tensor data error: {0}")]
    Data(String),
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

impl TransformError {
    /// Create an invalid parameter error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}
