//! Model weight checkpoints.
//!
//! Weights are stored with Burn's named MessagePack recorder at full
//! precision (`*.mpk`). A checkpoint only carries weights; the matching
//! [`VggConfig`](crate::VggConfig) comes from configuration.
//!
//! # Example
//!
//! ```rust,ignore
//! use plasmo_models::checkpoint::{load_model, save_model};
//!
//! let config = VggConfig::vgg19();
//! save_model(&config.init::<Backend>(&device), "weights.mpk")?;
//! let model = load_model(config.init::<Backend>(&device), "weights.mpk", &device)?;
//! ```

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint '{path}': {message}")]
    Load {
        /// File that was read.
        path: PathBuf,
        /// Recorder message.
        message: String,
    },

    /// The checkpoint file does not exist.
    #[error("Checkpoint not found: {0}")]
    NotFound(PathBuf),
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Save a model's weights.
///
/// The recorder sets the `.mpk` extension on `path`.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder())
        .map_err(|e| CheckpointError::Save(e.to_string()))?;
    tracing::info!(path = %path.display(), "saved checkpoint");
    Ok(())
}

/// Load weights from `path` into `model`.
///
/// `model` provides the structure; its current weights are replaced.
pub fn load_model<B, M>(model: M, path: impl AsRef<Path>, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref().with_extension("mpk");
    if !path.exists() {
        return Err(CheckpointError::NotFound(path));
    }
    let model = model
        .load_file(path.clone(), &recorder(), device)
        .map_err(|e| CheckpointError::Load {
            path: path.clone(),
            message: e.to_string(),
        })?;
    tracing::info!(path = %path.display(), "loaded checkpoint");
    Ok(model)
}
