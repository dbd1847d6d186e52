//! Error types for classifier graphs.

use thiserror::Error;

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building, searching or running a classifier graph.
#[derive(Error, Debug)]
pub enum ModelError {
    /// No node with this name exists at any nesting level.
    #[error("Layer '{0}' not found in model")]
    LayerNotFound(String),

    /// The node exists but does not produce a spatial feature map.
    #[error("Layer '{0}' does not produce a spatial feature map")]
    NotSpatial(String),

    /// A layer received activations of the wrong rank or size.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A node failed during the forward pass.
    #[error("Forward pass failed at '{node}': {source}")]
    Forward {
        /// Name of the failing node.
        node: String,
        /// Underlying error.
        #[source]
        source: Box<ModelError>,
    },

    /// A node path does not address a node of this graph.
    #[error("Invalid node path: {0}")]
    InvalidPath(String),

    /// The graph structure is invalid.
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Invalid model configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] plasmo_core::CoreError),
}
