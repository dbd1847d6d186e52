//! Error types for plasmo_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors raised while decoding images and assembling batches.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The input bytes could not be decoded as a raster image.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Invalid array or tensor shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Shape mismatch between items that must agree.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An image could not be encoded.
    #[error("Encoding error: {0}")]
    EncodeError(String),

    /// Tensor data could not be read back.
    #[error("Tensor data error: {0}")]
    DataError(String),
}
