//! Error types for explanations.

use thiserror::Error;

/// Result type alias for explanation operations.
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while computing or rendering an importance map.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// The requested output channel does not exist.
    #[error("Invalid output channel {channel}: classifier has {n_outputs} outputs")]
    InvalidChannel {
        /// Requested channel.
        channel: usize,
        /// Number of classifier outputs.
        n_outputs: usize,
    },

    /// The gradient was missing or numerically degenerate.
    #[error("Gradient computation failed: {0}")]
    GradientComputationFailed(String),

    /// Invalid overlay parameters.
    #[error("Invalid overlay configuration: {0}")]
    InvalidConfig(String),

    /// Graph lookup or forward error.
    #[error("Model error: {0}")]
    Model(#[from] plasmo_models::ModelError),

    /// Tensor conversion or image encoding error.
    #[error("Core error: {0}")]
    Core(#[from] plasmo_core::CoreError),
}
