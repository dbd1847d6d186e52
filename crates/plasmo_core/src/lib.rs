//! # plasmo_core
//!
//! Core types for plasmo-rs blood-smear classification and explanation.
//!
//! This crate provides:
//! - [`ImageCodec`] to decode raw bytes into fixed-size `[0, 1]` arrays
//! - [`ImageShape`] for decoded image shape metadata
//! - [`ImageBatch`] to stack decoded arrays into one channel-first tensor
//! - Error types and backend aliases
//!
//! ## Layout Convention
//!
//! Decoded arrays follow `(H, W, C)`; model tensors follow `(N, C, H, W)`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use plasmo_core::{CodecConfig, ImageBatch, ImageCodec};
//!
//! let codec = ImageCodec::new(CodecConfig::default()); // 256x256
//! let array = codec.decode(&bytes)?;
//! let batch = ImageBatch::<Backend>::from_array(&array, &device)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
mod error;
mod shape;
mod tensor;

pub use codec::{encode_jpeg, encode_png, CodecConfig, DecodedImage, ImageCodec, ResizeFilter};
pub use error::{CoreError, Result};
pub use shape::ImageShape;
pub use tensor::{stack_batch, tensor_to_vec, ImageBatch};

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_autodiff::Autodiff;

    /// CPU backend with gradient recording, used for explanations.
    #[cfg(feature = "backend-ndarray")]
    pub type DefaultBackend = Autodiff<NdArray>;
}
