//! Named-node lookup across nested graphs.
//!
//! [`locate`] is a breadth-first search over the [`GraphScope`] capability:
//! the top level first, then each direct sub-graph in declaration order,
//! then their sub-graphs, and so on.

use std::collections::VecDeque;
use std::fmt;

use burn::prelude::*;

use crate::error::{ModelError, Result};
use crate::graph::{Graph, Node};

/// One level of a nested graph that can be searched by name.
pub trait GraphScope {
    /// Node type stored at this level.
    type Node;

    /// Name of this level.
    fn scope_name(&self) -> &str;

    /// Find a direct node by name, with its index.
    fn lookup(&self, name: &str) -> Option<(usize, &Self::Node)>;

    /// Direct sub-scopes in declaration order, with their node indices.
    fn children(&self) -> Vec<(usize, &Self)>;
}

impl<B: Backend> GraphScope for Graph<B> {
    type Node = Node<B>;

    fn scope_name(&self) -> &str {
        self.name()
    }

    fn lookup(&self, name: &str) -> Option<(usize, &Node<B>)> {
        self.nodes().iter().enumerate().find(|(_, n)| n.name() == name)
    }

    fn children(&self) -> Vec<(usize, &Self)> {
        self.nodes()
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_graph().map(|g| (i, g)))
            .collect()
    }
}

/// Node indices from the outermost graph down to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// Create a path from indices.
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    /// Indices, outermost first.
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Nesting depth; 1 for a top-level node.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join("/"))
    }
}

/// Result of [`locate`].
pub struct Location<'a, S: GraphScope> {
    /// The matched node.
    pub node: &'a S::Node,
    /// The graph level that directly contains the node.
    pub container: &'a S,
    /// Path from the searched graph to the node.
    pub path: NodePath,
}

impl<S: GraphScope> Location<'_, S> {
    /// Check if the node sits directly in the searched graph.
    pub fn is_top_level(&self) -> bool {
        self.path.depth() == 1
    }
}

/// Find the node called `name` and the graph level that contains it.
///
/// # Errors
///
/// Returns [`ModelError::LayerNotFound`] if no level contains `name`.
pub fn locate<'a, S: GraphScope>(graph: &'a S, name: &str) -> Result<Location<'a, S>> {
    let mut queue = VecDeque::from([(graph, NodePath::default())]);

    while let Some((scope, prefix)) = queue.pop_front() {
        if let Some((index, node)) = scope.lookup(name) {
            let path = prefix.child(index);
            tracing::debug!(
                layer = name,
                container = scope.scope_name(),
                path = %path,
                "located layer"
            );
            return Ok(Location {
                node,
                container: scope,
                path,
            });
        }
        queue.extend(
            scope
                .children()
                .into_iter()
                .map(|(index, child)| (child, prefix.child(index))),
        );
    }

    Err(ModelError::LayerNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::ScaleLayer;
    use plasmo_core::backend::NdArray;
    use pretty_assertions::assert_eq;

    type TestBackend = NdArray;

    fn nested() -> Graph<TestBackend> {
        let deep = Graph::new("deep").with_layer("shared", ScaleLayer::new(3.0));
        let backbone = Graph::new("backbone")
            .with_layer("conv_a", ScaleLayer::new(1.0))
            .with_subgraph(deep)
            .with_layer("conv_b", ScaleLayer::new(1.0));
        let other = Graph::new("other").with_layer("shared", ScaleLayer::new(2.0));
        Graph::new("model")
            .with_layer("input_scale", ScaleLayer::new(1.0))
            .with_subgraph(backbone)
            .with_subgraph(other)
            .with_layer("head", ScaleLayer::new(1.0))
    }

    #[test]
    fn test_top_level_lookup() {
        let graph = nested();
        let location = locate(&graph, "head").unwrap();
        assert_eq!(location.container.name(), "model");
        assert_eq!(location.path, NodePath::new(vec![3]));
        assert!(location.is_top_level());
    }

    #[test]
    fn test_nested_name_returns_subgraph_container() {
        let graph = nested();
        let location = locate(&graph, "conv_b").unwrap();
        assert_eq!(location.node.name(), "conv_b");
        assert_eq!(location.container.name(), "backbone");
        assert_eq!(location.path.to_string(), "1/2");
        assert!(!location.is_top_level());
    }

    #[test]
    fn test_breadth_first_prefers_shallower_match() {
        // "shared" exists at depth 3 (backbone/deep) and depth 2 (other)
        let graph = nested();
        let location = locate(&graph, "shared").unwrap();
        assert_eq!(location.container.name(), "other");
        assert_eq!(location.path.indices(), &[2, 0]);
    }

    #[test]
    fn test_subgraph_node_can_be_located() {
        let graph = nested();
        let location = locate(&graph, "backbone").unwrap();
        assert!(location.node.is_graph());
        assert_eq!(location.container.name(), "model");
    }

    #[test]
    fn test_path_addresses_located_node() {
        let graph = nested();
        let location = locate(&graph, "shared").unwrap();
        let node = graph.node_at(location.path.indices()).unwrap();
        assert_eq!(node.name(), "shared");
    }

    #[test]
    fn test_missing_layer() {
        let graph = nested();
        match locate(&graph, "block5_conv3") {
            Err(ModelError::LayerNotFound(name)) => assert_eq!(name, "block5_conv3"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(location) => panic!("unexpectedly found at {}", location.path),
        }
    }
}
