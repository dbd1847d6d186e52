//! Feature map and gradient capture.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use plasmo_core::tensor_to_vec;
use plasmo_models::{Activations, ExplainableClassifier, ModelError, NodePath};

use crate::error::{ExplainError, Result};

/// Feature map at a target node together with the final scores it produced.
///
/// The feature map is a gradient-tracked leaf, so gradients of any score
/// can be taken with respect to it.
#[derive(Debug, Clone)]
pub struct FeatureCapture<B: AutodiffBackend> {
    feature: Tensor<B, 4>,
    logits: Tensor<B, 2>,
}

impl<B: AutodiffBackend> FeatureCapture<B> {
    /// Run `input` through `classifier`, splitting at the node at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotSpatial`] if the node's output is not a
    /// spatial map, or any forward error.
    pub fn run(
        classifier: &ExplainableClassifier<B>,
        path: &NodePath,
        layer: &str,
        input: Tensor<B, 4>,
    ) -> Result<Self> {
        let feature = match classifier.forward_to(path, input)? {
            Activations::Spatial(t) => t.detach().require_grad(),
            Activations::Flat(_) => return Err(ModelError::NotSpatial(layer.to_string()).into()),
        };
        let logits = classifier.forward_from(path, Activations::Spatial(feature.clone()))?;
        Ok(Self { feature, logits })
    }

    /// Captured feature map `(N, C, H, W)`.
    pub fn feature(&self) -> &Tensor<B, 4> {
        &self.feature
    }

    /// Final scores `(N, K)`.
    pub fn logits(&self) -> &Tensor<B, 2> {
        &self.logits
    }

    /// Number of output units.
    pub fn n_outputs(&self) -> usize {
        self.logits.dims()[1]
    }

    /// Captured feature map, detached from the autodiff graph.
    pub fn activations(&self) -> Tensor<B::InnerBackend, 4> {
        self.feature.clone().inner()
    }

    /// Scores of batch element 0.
    pub fn first_scores(&self) -> Result<Vec<f32>> {
        Ok(tensor_to_vec(self.logits.clone().narrow(0, 0, 1))?)
    }

    /// Back-propagate score `channel` of batch element 0.
    ///
    /// Returns the feature map and its gradient, both detached from the
    /// autodiff graph.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::GradientComputationFailed`] if no gradient
    /// reaches the feature map or it contains non-finite values.
    pub fn gradient(
        self,
        channel: usize,
    ) -> Result<(Tensor<B::InnerBackend, 4>, Tensor<B::InnerBackend, 4>)> {
        let n_outputs = self.n_outputs();
        if channel >= n_outputs {
            return Err(ExplainError::InvalidChannel { channel, n_outputs });
        }

        let target = self.logits.slice([0..1, channel..channel + 1]).sum();
        let grads = target.backward();
        let gradient = self.feature.grad(&grads).ok_or_else(|| {
            ExplainError::GradientComputationFailed(
                "no gradient reached the feature map".to_string(),
            )
        })?;

        if tensor_to_vec(gradient.clone())?.iter().any(|g| !g.is_finite()) {
            return Err(ExplainError::GradientComputationFailed(
                "gradient contains non-finite values".to_string(),
            ));
        }
        Ok((self.feature.inner(), gradient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasmo_core::backend::{Autodiff, NdArray};
    use plasmo_models::layers::{DenseLayer, GlobalAvgPoolLayer, OutputActivation, ScaleLayer};
    use plasmo_models::{Classifier, Graph};

    type TestBackend = Autodiff<NdArray>;

    fn explainable(n_outputs: usize) -> ExplainableClassifier<TestBackend> {
        let device = Default::default();
        let graph = Graph::new("model")
            .with_layer("features", ScaleLayer::new(2.0))
            .with_layer("gap", GlobalAvgPoolLayer::new())
            .with_layer("dense", DenseLayer::new(3, n_outputs, OutputActivation::Sigmoid, &device));
        Classifier::new(graph, "test").unwrap().explanation_ready()
    }

    #[test]
    fn test_capture_shapes() {
        let classifier = explainable(2);
        let path = classifier.locate("features").unwrap().path;
        let input = Tensor::ones([1, 3, 4, 4], &Default::default());

        let capture = FeatureCapture::run(&classifier, &path, "features", input).unwrap();
        assert_eq!(capture.feature().dims(), [1, 3, 4, 4]);
        assert_eq!(capture.n_outputs(), 2);
        assert_eq!(capture.first_scores().unwrap().len(), 2);
    }

    #[test]
    fn test_gradient_shape_matches_feature() {
        let classifier = explainable(1);
        let path = classifier.locate("features").unwrap().path;
        let input = Tensor::ones([1, 3, 4, 4], &Default::default());

        let capture = FeatureCapture::run(&classifier, &path, "features", input).unwrap();
        let (feature, gradient) = capture.gradient(0).unwrap();
        assert_eq!(feature.dims(), gradient.dims());
    }

    #[test]
    fn test_activations_without_backward() {
        let classifier = explainable(1);
        let path = classifier.locate("features").unwrap().path;
        let input = Tensor::ones([1, 3, 4, 4], &Default::default());

        let capture = FeatureCapture::run(&classifier, &path, "features", input).unwrap();
        let activations = capture.activations();
        assert_eq!(activations.dims(), [1, 3, 4, 4]);
        assert!(tensor_to_vec(activations).unwrap().iter().all(|v| (v - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_flat_target_is_rejected() {
        let classifier = explainable(1);
        let path = classifier.locate("gap").unwrap().path;
        let input = Tensor::ones([1, 3, 4, 4], &Default::default());

        let err = FeatureCapture::run(&classifier, &path, "gap", input).unwrap_err();
        assert!(matches!(err, ExplainError::Model(ModelError::NotSpatial(_))));
    }

    #[test]
    fn test_channel_out_of_range() {
        let classifier = explainable(2);
        let path = classifier.locate("features").unwrap().path;
        let input = Tensor::ones([1, 3, 4, 4], &Default::default());

        let capture = FeatureCapture::run(&classifier, &path, "features", input).unwrap();
        assert!(matches!(
            capture.gradient(2),
            Err(ExplainError::InvalidChannel { channel: 2, n_outputs: 2 })
        ));
    }
}
