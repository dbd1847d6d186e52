//! Error types for the prediction pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Decoding, shape or encoding error.
    #[error("{0}")]
    Core(#[from] plasmo_core::CoreError),

    /// Graph construction, lookup or forward error.
    #[error("Model error: {0}")]
    Model(#[from] plasmo_models::ModelError),

    /// Weight loading error.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] plasmo_models::CheckpointError),

    /// Explanation error.
    #[error("Explanation error: {0}")]
    Explain(#[from] plasmo_explain::ExplainError),

    /// Calibration error.
    #[error("Calibration error: {0}")]
    Calibration(#[from] plasmo_analysis::CalibrationError),

    /// The worker pool could not be created.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// The classifier returned no score for an image.
    #[error("Classifier returned {got} scores for {expected} images")]
    MissingScore {
        /// Images in the forward pass.
        expected: usize,
        /// Scores returned.
        got: usize,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
