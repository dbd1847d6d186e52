//! Gradient-weighted importance maps.
//!
//! Two modes reduce a captured feature map to a 2-D map in `[0, 1]`:
//!
//! - [`ExplanationMode::Presence`]: Grad-CAM. Spatially averaged gradients
//!   weight the feature channels; the weighted sum is clipped at zero and
//!   scaled by its maximum. Highlights regions that pushed the score up.
//! - [`ExplanationMode::Absence`]: ignores the gradient. The mean absolute
//!   activation per location is inverted against its global maximum, so
//!   regions with the least distinguishing activation score highest.

use std::fmt;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use ndarray::Array2;
use plasmo_core::{tensor_to_vec, CoreError};
use plasmo_models::{ExplainableClassifier, NodePath};
use serde::{Deserialize, Serialize};

use crate::capture::FeatureCapture;
use crate::error::{ExplainError, Result};

const PRESENCE_EPSILON: f32 = 1e-8;

/// How an importance map is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationMode {
    /// Evidence for the selected output (gradient-weighted).
    Presence,
    /// Inverted activation magnitude, used for negative predictions.
    Absence,
}

impl fmt::Display for ExplanationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presence => f.write_str("presence"),
            Self::Absence => f.write_str("absence"),
        }
    }
}

/// Single-channel 2-D importance map of shape `(h, w)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceMap {
    values: Array2<f32>,
}

impl ImportanceMap {
    /// Wrap an array.
    pub fn new(values: Array2<f32>) -> Self {
        Self { values }
    }

    /// The map values.
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Consume and return the array.
    pub fn into_inner(self) -> Array2<f32> {
        self.values
    }

    /// Height of the map.
    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// Width of the map.
    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    /// Largest value, or 0 for an empty map.
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0_f32, f32::max)
    }

    /// Smallest value, or 0 for an empty map.
    pub fn min(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Check if every value is zero.
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }
}

fn to_map<B: Backend>(map: Tensor<B, 4>) -> Result<ImportanceMap> {
    let [_, _, h, w] = map.dims();
    let data = tensor_to_vec(map)?;
    let values = Array2::from_shape_vec((h, w), data)
        .map_err(|e| CoreError::ShapeMismatch(e.to_string()))?;
    Ok(ImportanceMap::new(values))
}

fn check_single<B: Backend>(tensor: &Tensor<B, 4>) -> Result<()> {
    let batch = tensor.dims()[0];
    if batch != 1 {
        return Err(CoreError::InvalidShape {
            expected: "a single feature map".to_string(),
            got: format!("batch of {batch}"),
        }
        .into());
    }
    Ok(())
}

/// Presence-mode map from a `(1, C, H, W)` feature map and its gradient.
///
/// # Errors
///
/// Returns an error if the shapes disagree or the batch size is not 1.
pub fn presence_map<B: Backend>(
    activations: Tensor<B, 4>,
    gradients: Tensor<B, 4>,
) -> Result<ImportanceMap> {
    check_single(&activations)?;
    if activations.dims() != gradients.dims() {
        return Err(CoreError::ShapeMismatch(format!(
            "activations {:?} vs gradients {:?}",
            activations.dims(),
            gradients.dims()
        ))
        .into());
    }

    // (1, C, H, W) -> (1, C, 1, 1)
    let weights = gradients.mean_dim(3).mean_dim(2);
    let cam = (activations * weights).sum_dim(1).clamp_min(0.0);

    let max: f32 = cam.clone().max().into_scalar().elem();
    to_map(cam / (max + PRESENCE_EPSILON))
}

/// Absence-mode map from a `(1, C, H, W)` feature map.
///
/// A constant map inverts to all zeros and is returned unscaled.
pub fn absence_map<B: Backend>(activations: Tensor<B, 4>) -> Result<ImportanceMap> {
    check_single(&activations)?;

    let magnitude = activations.abs().mean_dim(1);
    let global_max: f32 = magnitude.clone().max().into_scalar().elem();
    let inverted = magnitude.neg().add_scalar(global_max);

    let inverted_max: f32 = inverted.clone().max().into_scalar().elem();
    if inverted_max > 0.0 {
        to_map(inverted / inverted_max)
    } else {
        to_map(inverted)
    }
}

/// Pick the output channel to explain from batch element 0's scores.
///
/// A single-output classifier always uses channel 0. Otherwise `requested`
/// is used if given, else the arg-max score.
///
/// # Errors
///
/// Returns [`ExplainError::InvalidChannel`] if `requested` is out of range.
pub fn select_channel(scores: &[f32], requested: Option<usize>) -> Result<usize> {
    let n_outputs = scores.len();
    if n_outputs == 1 {
        return Ok(0);
    }
    match requested {
        Some(channel) if channel >= n_outputs => {
            Err(ExplainError::InvalidChannel { channel, n_outputs })
        }
        Some(channel) => Ok(channel),
        None => scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .ok_or(ExplainError::InvalidChannel {
                channel: 0,
                n_outputs,
            }),
    }
}

/// Importance map generator bound to one target layer.
///
/// The layer is located once at construction; the classifier handle is
/// shared read-only between calls.
#[derive(Debug, Clone)]
pub struct Explainer<B: AutodiffBackend> {
    classifier: ExplainableClassifier<B>,
    layer: String,
    path: NodePath,
}

impl<B: AutodiffBackend> Explainer<B> {
    /// Bind `classifier` to the node called `layer`.
    ///
    /// # Errors
    ///
    /// Returns [`plasmo_models::ModelError::LayerNotFound`] if absent.
    pub fn new(classifier: ExplainableClassifier<B>, layer: impl Into<String>) -> Result<Self> {
        let layer = layer.into();
        let location = classifier.locate(&layer)?;
        tracing::info!(
            layer = %layer,
            container = location.container.name(),
            path = %location.path,
            "explanation target resolved"
        );
        let path = location.path;
        Ok(Self {
            classifier,
            layer,
            path,
        })
    }

    /// Target layer name.
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Path of the target layer.
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The explanation-ready classifier.
    pub fn classifier(&self) -> &ExplainableClassifier<B> {
        &self.classifier
    }

    /// Compute the importance map of batch element 0 of `input`.
    ///
    /// `channel` selects the output to explain on multi-output classifiers.
    pub fn explain(
        &self,
        input: Tensor<B, 4>,
        mode: ExplanationMode,
        channel: Option<usize>,
    ) -> Result<ImportanceMap> {
        let input = input.narrow(0, 0, 1);
        let capture = FeatureCapture::run(&self.classifier, &self.path, &self.layer, input)?;
        let channel = select_channel(&capture.first_scores()?, channel)?;

        let map = match mode {
            ExplanationMode::Presence => {
                let (activations, gradients) = capture.gradient(channel)?;
                presence_map(activations, gradients)?
            }
            // no backward pass: the absence map reads activations only
            ExplanationMode::Absence => absence_map(capture.activations())?,
        };
        tracing::debug!(
            layer = %self.layer,
            %mode,
            channel,
            height = map.height(),
            width = map.width(),
            "importance map computed"
        );
        Ok(map)
    }
}

/// One-shot explanation: locate `layer` in `classifier`, then explain.
///
/// # Errors
///
/// Returns [`plasmo_models::ModelError::LayerNotFound`] if the layer is
/// absent, [`ExplainError::InvalidChannel`] for a bad channel and
/// [`ExplainError::GradientComputationFailed`] for degenerate gradients in
/// Presence mode.
pub fn explain<B: AutodiffBackend>(
    input: Tensor<B, 4>,
    classifier: &ExplainableClassifier<B>,
    layer: &str,
    mode: ExplanationMode,
    channel: Option<usize>,
) -> Result<ImportanceMap> {
    Explainer::new(classifier.clone(), layer)?.explain(input, mode, channel)
}
