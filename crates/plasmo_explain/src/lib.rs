//! # plasmo_explain
//!
//! Explanations for plasmo-rs classifiers.
//!
//! This crate provides:
//! - [`FeatureCapture`] - feature map at a target node plus the final scores,
//!   with the gradient of a selected score
//! - [`Explainer`] / [`explain`] - gradient-weighted importance maps in
//!   [`ExplanationMode::Presence`] and [`ExplanationMode::Absence`] modes
//! - [`overlay`] - thresholding, resizing, JET colorizing and alpha blending
//!   onto the original image
//!
//! ## Example
//!
//! ```rust,ignore
//! use plasmo_explain::{composite, Explainer, ExplanationMode, OverlayConfig};
//!
//! let explainer = Explainer::new(classifier.explanation_ready(), "block5_conv3")?;
//! let map = explainer.explain(input, ExplanationMode::Presence, None)?;
//! let overlay = composite(&original, &map, &OverlayConfig::default())?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod capture;
mod engine;
mod error;
pub mod overlay;

pub use capture::FeatureCapture;
pub use engine::{
    absence_map, explain, presence_map, select_channel, ExplanationMode, Explainer, ImportanceMap,
};
pub use error::{ExplainError, Result};
pub use overlay::{composite, OverlayArtifact, OverlayConfig, OverlayFormat};
