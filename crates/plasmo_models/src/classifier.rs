//! Inference and explanation handles over a classifier graph.

use burn::prelude::*;
use plasmo_core::{tensor_to_vec, ImageBatch};

use crate::error::Result;
use crate::graph::{Activations, Graph};
use crate::layers::OutputActivation;
use crate::locate::{locate, Location, NodePath};

/// Inference-ready classifier: the graph exactly as supplied.
///
/// The graph maps an `(N, C, H, W)` image batch to `(N, K)` scores. Binary
/// classifiers use a single output unit whose value is the raw score.
#[derive(Debug, Clone)]
pub struct Classifier<B: Backend> {
    graph: Graph<B>,
    model_type: String,
}

impl<B: Backend> Classifier<B> {
    /// Wrap a graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph structure is invalid.
    pub fn new(graph: Graph<B>, model_type: impl Into<String>) -> Result<Self> {
        graph.validate()?;
        Ok(Self {
            graph,
            model_type: model_type.into(),
        })
    }

    /// The underlying graph.
    pub fn graph(&self) -> &Graph<B> {
        &self.graph
    }

    /// Architecture label, e.g. `vgg19`.
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Resolve `name` to its path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ModelError::LayerNotFound`] if no node has that name.
    pub fn locate(&self, name: &str) -> Result<NodePath> {
        Ok(locate(&self.graph, name)?.path)
    }

    /// Run the full graph.
    pub fn forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        self.graph.forward(Activations::Spatial(input))?.into_flat()
    }

    /// Raw score (output unit 0) of every image in the batch, in order.
    pub fn raw_scores(&self, batch: &ImageBatch<B>) -> Result<Vec<f32>> {
        let output = self.forward(batch.inner().clone())?;
        let [n, _] = output.dims();
        Ok(tensor_to_vec(output.slice([0..n, 0..1]))?)
    }

    /// Derive the explanation-ready handle.
    ///
    /// The copy has its final activation replaced by identity so gradients
    /// are taken on pre-activation scores. `self` is left unchanged.
    pub fn explanation_ready(&self) -> ExplainableClassifier<B> {
        let (graph, replaced) = self.graph.with_output_activation(OutputActivation::Identity);
        match replaced {
            Some(activation) => tracing::info!(
                model = %self.model_type,
                %activation,
                "final activation removed for explanation"
            ),
            None => tracing::debug!(
                model = %self.model_type,
                "final layer has no configurable activation"
            ),
        }
        ExplainableClassifier {
            graph,
            model_type: self.model_type.clone(),
            replaced,
        }
    }
}

/// Explanation-ready classifier with the final activation stripped.
///
/// Built once through [`Classifier::explanation_ready`] and shared read-only.
/// Cloning is cheap in the sense that weights are reference-counted tensors.
#[derive(Debug, Clone)]
pub struct ExplainableClassifier<B: Backend> {
    graph: Graph<B>,
    model_type: String,
    replaced: Option<OutputActivation>,
}

impl<B: Backend> ExplainableClassifier<B> {
    /// The stripped graph.
    pub fn graph(&self) -> &Graph<B> {
        &self.graph
    }

    /// Architecture label.
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Activation that was replaced, if the final layer had one.
    pub fn replaced_activation(&self) -> Option<OutputActivation> {
        self.replaced
    }

    /// Find a node and its containing sub-graph.
    pub fn locate(&self, name: &str) -> Result<Location<'_, Graph<B>>> {
        locate(&self.graph, name)
    }

    /// Run the input through the node at `path` (first stage).
    pub fn forward_to(&self, path: &NodePath, input: Tensor<B, 4>) -> Result<Activations<B>> {
        self.graph.forward_to(path.indices(), Activations::Spatial(input))
    }

    /// Continue from the node at `path` to the final scores (second stage).
    pub fn forward_from(&self, path: &NodePath, feature: Activations<B>) -> Result<Tensor<B, 2>> {
        self.graph.forward_from(path.indices(), feature)?.into_flat()
    }

    /// Run the full stripped graph.
    pub fn forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        self.graph.forward(Activations::Spatial(input))?.into_flat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::layers::{Conv2dLayer, DenseLayer, GlobalAvgPoolLayer, MaxPool2dLayer};
    use ndarray::Array3;
    use plasmo_core::backend::NdArray;

    type TestBackend = NdArray;

    fn small_classifier() -> Classifier<TestBackend> {
        let device = Default::default();
        let backbone = Graph::new("features")
            .with_layer("conv1", Conv2dLayer::new(3, 4, OutputActivation::Relu, &device))
            .with_layer("pool1", MaxPool2dLayer::new())
            .with_layer("conv2", Conv2dLayer::new(4, 4, OutputActivation::Relu, &device));
        let graph = Graph::new("model")
            .with_subgraph(backbone)
            .with_layer("gap", GlobalAvgPoolLayer::new())
            .with_layer("dense", DenseLayer::new(4, 1, OutputActivation::Sigmoid, &device));
        Classifier::new(graph, "test").unwrap()
    }

    fn batch(n: usize) -> ImageBatch<TestBackend> {
        let arrays: Vec<_> = (0..n)
            .map(|i| Array3::from_shape_fn((8, 8, 3), |(y, x, c)| ((y + x + c + i) % 5) as f32 / 4.0))
            .collect();
        ImageBatch::from_arrays(&arrays, &Default::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_graph() {
        let result = Classifier::new(Graph::<TestBackend>::new("empty"), "test");
        assert!(matches!(result, Err(ModelError::InvalidGraph(_))));
    }

    #[test]
    fn test_raw_scores_per_item() {
        let classifier = small_classifier();
        let scores = classifier.raw_scores(&batch(3)).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_batch_scores_match_single() {
        let classifier = small_classifier();
        let all = classifier.raw_scores(&batch(2)).unwrap();
        let single = classifier.raw_scores(&batch(1)).unwrap();
        assert!((all[0] - single[0]).abs() < 1e-5);
    }

    #[test]
    fn test_explanation_ready_leaves_source_untouched() {
        let classifier = small_classifier();
        let explainable = classifier.explanation_ready();

        assert_eq!(explainable.replaced_activation(), Some(OutputActivation::Sigmoid));
        assert_eq!(
            classifier.graph().output_layer().unwrap().1.output_activation(),
            OutputActivation::Sigmoid
        );
        assert_eq!(
            explainable.graph().output_layer().unwrap().1.output_activation(),
            OutputActivation::Identity
        );
    }

    #[test]
    fn test_stripped_output_is_logit_of_scores() {
        let classifier = small_classifier();
        let explainable = classifier.explanation_ready();
        let input = batch(1).into_inner();

        let prob: f32 = classifier.forward(input.clone()).unwrap().into_scalar().elem();
        let logit: f32 = explainable.forward(input).unwrap().into_scalar().elem();
        let sigmoid = 1.0 / (1.0 + (-logit).exp());
        assert!((prob - sigmoid).abs() < 1e-5);
    }

    #[test]
    fn test_two_stage_forward_matches_full() {
        let explainable = small_classifier().explanation_ready();
        let location = explainable.locate("conv2").unwrap();
        assert_eq!(location.container.name(), "features");
        let path = location.path;
        let input = batch(1).into_inner();

        let feature = explainable.forward_to(&path, input.clone()).unwrap();
        assert_eq!(feature.clone().into_spatial().unwrap().dims(), [1, 4, 4, 4]);

        let staged: f32 = explainable.forward_from(&path, feature).unwrap().into_scalar().elem();
        let full: f32 = explainable.forward(input).unwrap().into_scalar().elem();
        assert!((staged - full).abs() < 1e-5);
    }

    #[test]
    fn test_locate_missing() {
        let classifier = small_classifier();
        assert!(matches!(classifier.locate("nope"), Err(ModelError::LayerNotFound(_))));
    }
}
