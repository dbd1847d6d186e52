//! Nested classifier graphs.
//!
//! A [`Graph`] is an ordered list of named [`Node`]s executed in declaration
//! order. A node is either a leaf [`Layer`] or a nested sub-graph, so a
//! feature extractor can live inside a wrapper graph that adds the
//! classification head.

use std::fmt;
use std::ops::Range;

use burn::prelude::*;

use crate::error::{ModelError, Result};
use crate::layers::OutputActivation;

/// Values flowing between graph nodes.
#[derive(Debug, Clone)]
pub enum Activations<B: Backend> {
    /// Spatial feature map of shape `(N, C, H, W)`.
    Spatial(Tensor<B, 4>),
    /// Flat features of shape `(N, K)`.
    Flat(Tensor<B, 2>),
}

impl<B: Backend> Activations<B> {
    /// Batch size of the activations.
    pub fn batch_size(&self) -> usize {
        match self {
            Self::Spatial(t) => t.dims()[0],
            Self::Flat(t) => t.dims()[0],
        }
    }

    /// Short description of the activation kind and shape.
    pub fn describe(&self) -> String {
        match self {
            Self::Spatial(t) => format!("spatial {:?}", t.dims()),
            Self::Flat(t) => format!("flat {:?}", t.dims()),
        }
    }

    /// Unwrap a spatial map.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ShapeMismatch`] for flat activations.
    pub fn into_spatial(self) -> Result<Tensor<B, 4>> {
        match self {
            Self::Spatial(t) => Ok(t),
            Self::Flat(t) => Err(ModelError::ShapeMismatch(format!(
                "expected spatial activations, got flat {:?}",
                t.dims()
            ))),
        }
    }

    /// Unwrap flat features.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ShapeMismatch`] for spatial activations.
    pub fn into_flat(self) -> Result<Tensor<B, 2>> {
        match self {
            Self::Flat(t) => Ok(t),
            Self::Spatial(t) => Err(ModelError::ShapeMismatch(format!(
                "expected flat activations, got spatial {:?}",
                t.dims()
            ))),
        }
    }
}

/// A leaf computation inside a [`Graph`].
///
/// Layers are immutable once built; variants with a different output
/// activation are produced as new boxed layers.
pub trait Layer<B: Backend>: Send + fmt::Debug {
    /// Run the layer.
    fn forward(&self, input: Activations<B>) -> Result<Activations<B>>;

    /// Human-readable layer type, e.g. `Conv2d(64->128, 3x3)`.
    fn describe(&self) -> String;

    /// Activation applied to the layer output.
    fn output_activation(&self) -> OutputActivation {
        OutputActivation::Identity
    }

    /// A copy of this layer using `activation` as its output activation.
    ///
    /// Returns `None` for layers without a configurable activation.
    fn with_output_activation(&self, _activation: OutputActivation) -> Option<Box<dyn Layer<B>>> {
        None
    }

    /// Clone into a new box.
    fn boxed_clone(&self) -> Box<dyn Layer<B>>;
}

impl<B: Backend> Clone for Box<dyn Layer<B>> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// What a node holds.
#[derive(Debug, Clone)]
pub enum NodeKind<B: Backend> {
    /// A leaf layer.
    Layer(Box<dyn Layer<B>>),
    /// A nested sub-graph.
    Graph(Graph<B>),
}

/// A named node of a [`Graph`].
#[derive(Debug, Clone)]
pub struct Node<B: Backend> {
    name: String,
    kind: NodeKind<B>,
}

impl<B: Backend> Node<B> {
    /// Create a leaf node.
    pub fn layer(name: impl Into<String>, layer: impl Layer<B> + 'static) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Layer(Box::new(layer)),
        }
    }

    /// Create a sub-graph node named after the graph.
    pub fn graph(graph: Graph<B>) -> Self {
        Self {
            name: graph.name.clone(),
            kind: NodeKind::Graph(graph),
        }
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node contents.
    pub fn kind(&self) -> &NodeKind<B> {
        &self.kind
    }

    /// The nested graph, if this node is one.
    pub fn as_graph(&self) -> Option<&Graph<B>> {
        match &self.kind {
            NodeKind::Graph(g) => Some(g),
            NodeKind::Layer(_) => None,
        }
    }

    /// Check if this node is a nested graph.
    pub fn is_graph(&self) -> bool {
        matches!(self.kind, NodeKind::Graph(_))
    }

    /// Run the node.
    pub fn forward(&self, input: Activations<B>) -> Result<Activations<B>> {
        let output = match &self.kind {
            NodeKind::Layer(layer) => layer.forward(input),
            NodeKind::Graph(graph) => graph.forward(input),
        };
        output.map_err(|e| match e {
            // keep the innermost node name
            ModelError::Forward { .. } => e,
            other => ModelError::Forward {
                node: self.name.clone(),
                source: Box::new(other),
            },
        })
    }
}

/// An ordered, possibly nested computation graph.
///
/// # Example
///
/// ```rust,ignore
/// use plasmo_models::{Graph, layers::*};
///
/// let backbone = Graph::new("features")
///     .with_layer("conv1", Conv2dLayer::new(3, 8, OutputActivation::Relu, &device))
///     .with_layer("pool1", MaxPool2dLayer::new());
/// let model = Graph::new("classifier")
///     .with_subgraph(backbone)
///     .with_layer("gap", GlobalAvgPoolLayer::new())
///     .with_layer("dense", DenseLayer::new(8, 1, OutputActivation::Sigmoid, &device));
/// ```
#[derive(Debug, Clone)]
pub struct Graph<B: Backend> {
    name: String,
    nodes: Vec<Node<B>>,
}

impl<B: Backend> Graph<B> {
    /// Create an empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    /// Append a leaf layer.
    #[must_use]
    pub fn with_layer(mut self, name: impl Into<String>, layer: impl Layer<B> + 'static) -> Self {
        self.nodes.push(Node::layer(name, layer));
        self
    }

    /// Append a nested sub-graph.
    #[must_use]
    pub fn with_subgraph(mut self, graph: Graph<B>) -> Self {
        self.nodes.push(Node::graph(graph));
        self
    }

    /// Graph name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[Node<B>] {
        &self.nodes
    }

    /// Number of direct nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check the structure: every graph non-empty, names unique per level.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidGraph`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidGraph(format!(
                "graph '{}' has no nodes",
                self.name
            )));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if self.nodes[..i].iter().any(|n| n.name == node.name) {
                return Err(ModelError::InvalidGraph(format!(
                    "duplicate node name '{}' in graph '{}'",
                    node.name, self.name
                )));
            }
            if let Some(sub) = node.as_graph() {
                sub.validate()?;
            }
        }
        Ok(())
    }

    /// Run every node in order.
    pub fn forward(&self, input: Activations<B>) -> Result<Activations<B>> {
        self.forward_range(0..self.nodes.len(), input)
    }

    /// Run the nodes in `range`, in order.
    pub fn forward_range(&self, range: Range<usize>, input: Activations<B>) -> Result<Activations<B>> {
        let nodes = self.nodes.get(range.clone()).ok_or_else(|| {
            ModelError::InvalidPath(format!(
                "range {range:?} out of bounds for graph '{}' with {} nodes",
                self.name,
                self.nodes.len()
            ))
        })?;
        nodes.iter().try_fold(input, |x, node| node.forward(x))
    }

    /// Run from the graph input up to and including the node at `path`.
    ///
    /// `path` holds one node index per nesting level, outermost first.
    /// Enclosing graphs run only the nodes declared before the sub-graph
    /// that leads to the target.
    pub fn forward_to(&self, path: &[usize], input: Activations<B>) -> Result<Activations<B>> {
        let (index, node, rest) = self.split_path(path)?;
        let x = self.forward_range(0..index, input)?;
        if rest.is_empty() {
            node.forward(x)
        } else {
            self.subgraph_at(node)?.forward_to(rest, x)
        }
    }

    /// Continue from the output of the node at `path` to the graph output.
    ///
    /// Runs the rest of the innermost graph, then every node of each
    /// enclosing graph that follows the sub-graph on the path.
    pub fn forward_from(&self, path: &[usize], input: Activations<B>) -> Result<Activations<B>> {
        let (index, node, rest) = self.split_path(path)?;
        let x = if rest.is_empty() {
            input
        } else {
            self.subgraph_at(node)?.forward_from(rest, input)?
        };
        self.forward_range(index + 1..self.nodes.len(), x)
    }

    /// The node addressed by `path`.
    pub fn node_at(&self, path: &[usize]) -> Result<&Node<B>> {
        let (_, node, rest) = self.split_path(path)?;
        if rest.is_empty() {
            Ok(node)
        } else {
            self.subgraph_at(node)?.node_at(rest)
        }
    }

    /// The final leaf layer, descending into a trailing sub-graph.
    pub fn output_layer(&self) -> Option<(&str, &dyn Layer<B>)> {
        match self.nodes.last().map(|n| (n.name.as_str(), &n.kind)) {
            Some((name, NodeKind::Layer(layer))) => Some((name, layer.as_ref())),
            Some((_, NodeKind::Graph(graph))) => graph.output_layer(),
            None => None,
        }
    }

    /// A copy of this graph whose final leaf layer uses `activation`.
    ///
    /// Returns the copy and the activation that was replaced, or `None`
    /// when the final layer has no configurable activation (the copy is
    /// then identical).
    pub fn with_output_activation(&self, activation: OutputActivation) -> (Self, Option<OutputActivation>) {
        let mut graph = self.clone();
        let replaced = graph.replace_output_activation(activation);
        (graph, replaced)
    }

    fn replace_output_activation(&mut self, activation: OutputActivation) -> Option<OutputActivation> {
        let last = self.nodes.last_mut()?;
        match &mut last.kind {
            NodeKind::Graph(graph) => graph.replace_output_activation(activation),
            NodeKind::Layer(layer) => {
                let previous = layer.output_activation();
                let replacement = layer.with_output_activation(activation)?;
                *layer = replacement;
                Some(previous)
            }
        }
    }

    /// Indented tree of node names and layer descriptions.
    pub fn summary(&self) -> String {
        let mut output = String::new();
        self.write_summary(&mut output, 0);
        output
    }

    fn write_summary(&self, output: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        output.push_str(&format!("{indent}{} [graph, {} nodes]\n", self.name, self.nodes.len()));
        for node in &self.nodes {
            match &node.kind {
                NodeKind::Layer(layer) => {
                    output.push_str(&format!("{indent}  {}: {}\n", node.name, layer.describe()));
                }
                NodeKind::Graph(graph) => graph.write_summary(output, depth + 1),
            }
        }
    }

    fn split_path<'a>(&self, path: &'a [usize]) -> Result<(usize, &Node<B>, &'a [usize])> {
        let (&index, rest) = path
            .split_first()
            .ok_or_else(|| ModelError::InvalidPath("empty path".to_string()))?;
        let node = self.nodes.get(index).ok_or_else(|| {
            ModelError::InvalidPath(format!(
                "index {index} out of bounds for graph '{}' with {} nodes",
                self.name,
                self.nodes.len()
            ))
        })?;
        Ok((index, node, rest))
    }

    fn subgraph_at<'n>(&self, node: &'n Node<B>) -> Result<&'n Graph<B>> {
        node.as_graph().ok_or_else(|| {
            ModelError::InvalidPath(format!(
                "node '{}' in graph '{}' is not a sub-graph",
                node.name, self.name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{DenseLayer, FlattenLayer, GlobalAvgPoolLayer, ScaleLayer};
    use plasmo_core::backend::NdArray;

    type TestBackend = NdArray;

    fn scale_chain(name: &str, factors: &[(&str, f32)]) -> Graph<TestBackend> {
        factors
            .iter()
            .fold(Graph::new(name), |g, (n, f)| g.with_layer(*n, ScaleLayer::new(*f)))
    }

    fn spatial_ones() -> Activations<TestBackend> {
        Activations::Spatial(Tensor::ones([1, 2, 2, 2], &Default::default()))
    }

    fn total(x: Activations<TestBackend>) -> f32 {
        x.into_spatial().unwrap().sum().into_scalar().elem()
    }

    #[test]
    fn test_forward_runs_in_order() {
        let graph = scale_chain("g", &[("a", 2.0), ("b", 3.0)]);
        assert!((total(graph.forward(spatial_ones()).unwrap()) - 48.0).abs() < 1e-5);
    }

    #[test]
    fn test_nested_split_equals_full_forward() {
        let inner = scale_chain("inner", &[("a", 2.0), ("b", 3.0), ("c", 5.0)]);
        let graph = Graph::new("outer")
            .with_layer("pre", ScaleLayer::new(7.0))
            .with_subgraph(inner)
            .with_layer("post", ScaleLayer::new(11.0));

        let path = [1, 1]; // outer.inner.b
        assert_eq!(graph.node_at(&path).unwrap().name(), "b");

        let feature = graph.forward_to(&path, spatial_ones()).unwrap();
        assert!((total(feature.clone()) - 8.0 * 42.0).abs() < 1e-3);

        let output = graph.forward_from(&path, feature).unwrap();
        let full = graph.forward(spatial_ones()).unwrap();
        assert!((total(output) - total(full)).abs() < 1e-2);
    }

    #[test]
    fn test_top_level_split() {
        let graph = scale_chain("g", &[("a", 2.0), ("b", 3.0), ("c", 5.0)]);
        let feature = graph.forward_to(&[0], spatial_ones()).unwrap();
        assert!((total(feature.clone()) - 16.0).abs() < 1e-5);
        let output = graph.forward_from(&[0], feature).unwrap();
        assert!((total(output) - 240.0).abs() < 1e-3);
    }

    #[test]
    fn test_invalid_paths() {
        let graph = scale_chain("g", &[("a", 2.0)]);
        assert!(matches!(graph.forward_to(&[], spatial_ones()), Err(ModelError::InvalidPath(_))));
        assert!(matches!(graph.forward_to(&[3], spatial_ones()), Err(ModelError::InvalidPath(_))));
        assert!(matches!(graph.node_at(&[0, 0]), Err(ModelError::InvalidPath(_))));
    }

    #[test]
    fn test_validate() {
        assert!(scale_chain("g", &[("a", 1.0), ("b", 1.0)]).validate().is_ok());

        let dup = scale_chain("g", &[("a", 1.0), ("a", 1.0)]);
        assert!(matches!(dup.validate(), Err(ModelError::InvalidGraph(_))));

        let empty_inner = Graph::new("g").with_subgraph(Graph::<TestBackend>::new("inner"));
        assert!(matches!(empty_inner.validate(), Err(ModelError::InvalidGraph(_))));
    }

    #[test]
    fn test_forward_error_names_failing_node() {
        let device = Default::default();
        let graph = Graph::<TestBackend>::new("g")
            .with_layer("dense", DenseLayer::new(8, 1, OutputActivation::Identity, &device));

        let err = graph.forward(spatial_ones()).unwrap_err();
        match err {
            ModelError::Forward { node, .. } => assert_eq!(node, "dense"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_output_activation_replacement() {
        let device = Default::default();
        let head = Graph::<TestBackend>::new("head")
            .with_layer("flatten", FlattenLayer::new())
            .with_layer("out", DenseLayer::new(8, 1, OutputActivation::Sigmoid, &device));
        let graph = Graph::new("model")
            .with_layer("gap", GlobalAvgPoolLayer::new())
            .with_subgraph(head);

        let (stripped, replaced) = graph.with_output_activation(OutputActivation::Identity);

        assert_eq!(replaced, Some(OutputActivation::Sigmoid));
        let (name, layer) = stripped.output_layer().unwrap();
        assert_eq!(name, "out");
        assert_eq!(layer.output_activation(), OutputActivation::Identity);
        // the source graph is untouched
        assert_eq!(graph.output_layer().unwrap().1.output_activation(), OutputActivation::Sigmoid);
    }

    #[test]
    fn test_summary_lists_nested_nodes() {
        let graph = Graph::new("outer")
            .with_subgraph(scale_chain("inner", &[("a", 1.0)]))
            .with_layer("b", ScaleLayer::new(1.0));
        let summary = graph.summary();
        assert!(summary.contains("outer [graph, 2 nodes]"));
        assert!(summary.contains("  inner [graph, 1 nodes]"));
        assert!(summary.contains("a: Scale(1)"));
    }
}
