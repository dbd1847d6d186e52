//! # plasmo_models
//!
//! Classifier graphs for plasmo-rs.
//!
//! This crate provides:
//! - [`Graph`] - ordered, possibly nested graphs of named [`Node`]s
//! - [`layers`] - convolution, pooling and dense layers built on `burn::nn`
//! - [`locate`] - breadth-first lookup of a named node and its containing sub-graph
//! - [`Classifier`] / [`ExplainableClassifier`] - inference-ready and
//!   explanation-ready handles
//! - [`VggConfig`] / [`VggNet`] - VGG-style reference classifier with
//!   `blockN_convM` layer names
//! - [`checkpoint`] - named MessagePack weight files

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
mod classifier;
mod error;
pub mod graph;
pub mod layers;
pub mod locate;
pub mod vgg;

pub use checkpoint::{load_model, save_model, CheckpointError};
pub use classifier::{Classifier, ExplainableClassifier};
pub use error::{ModelError, Result};
pub use graph::{Activations, Graph, Layer, Node, NodeKind};
pub use layers::OutputActivation;
pub use locate::{locate, GraphScope, Location, NodePath};
pub use vgg::{VggBlockConfig, VggConfig, VggNet};
