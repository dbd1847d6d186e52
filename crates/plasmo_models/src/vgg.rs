//! VGG-style reference classifier.
//!
//! A stack of 3x3 convolution blocks, each closed by 2x2 max pooling,
//! followed by global average pooling and a dense head. Node names follow
//! the conventional `blockN_convM` / `blockN_pool` scheme so pre-trained
//! deployments can target e.g. `block5_conv3` for explanations.
//!
//! By default the convolution blocks form a nested feature-extractor
//! sub-graph inside a wrapper graph that adds the classification head.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::graph::Graph;
use crate::layers::{Conv2dLayer, DenseLayer, GlobalAvgPoolLayer, MaxPool2dLayer, OutputActivation};

/// One convolution block: `convs` 3x3 convolutions with `channels` filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VggBlockConfig {
    /// Number of convolutions in the block.
    pub convs: usize,
    /// Output channels of every convolution in the block.
    pub channels: usize,
}

impl VggBlockConfig {
    /// Create a block config.
    pub const fn new(convs: usize, channels: usize) -> Self {
        Self { convs, channels }
    }
}

/// Configuration for the VGG reference classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VggConfig {
    /// Input image channels.
    pub in_channels: usize,
    /// Convolution blocks, in order.
    pub blocks: Vec<VggBlockConfig>,
    /// Hidden dense layer widths (ReLU).
    pub hidden_units: Vec<usize>,
    /// Number of output units.
    pub n_outputs: usize,
    /// Activation of the output layer.
    pub output_activation: OutputActivation,
    /// Place the convolution blocks in their own sub-graph.
    pub nested_backbone: bool,
    /// Name of the backbone sub-graph.
    pub backbone_name: String,
}

impl Default for VggConfig {
    fn default() -> Self {
        Self::vgg19()
    }
}

impl VggConfig {
    /// VGG16 backbone: 2-2-3-3-3 convolutions.
    pub fn vgg16() -> Self {
        Self::from_blocks(
            "vgg16",
            vec![
                VggBlockConfig::new(2, 64),
                VggBlockConfig::new(2, 128),
                VggBlockConfig::new(3, 256),
                VggBlockConfig::new(3, 512),
                VggBlockConfig::new(3, 512),
            ],
        )
    }

    /// VGG19 backbone: 2-2-4-4-4 convolutions.
    pub fn vgg19() -> Self {
        Self::from_blocks(
            "vgg19",
            vec![
                VggBlockConfig::new(2, 64),
                VggBlockConfig::new(2, 128),
                VggBlockConfig::new(4, 256),
                VggBlockConfig::new(4, 512),
                VggBlockConfig::new(4, 512),
            ],
        )
    }

    /// Narrow five-block network with the same layer names as VGG16.
    ///
    /// Small enough for tests and CPU smoke runs; accepts inputs down to 32x32.
    pub fn tiny() -> Self {
        let mut config = Self::from_blocks(
            "vgg_tiny",
            vec![
                VggBlockConfig::new(1, 4),
                VggBlockConfig::new(1, 8),
                VggBlockConfig::new(1, 8),
                VggBlockConfig::new(1, 8),
                VggBlockConfig::new(3, 8),
            ],
        );
        config.hidden_units = vec![8];
        config
    }

    fn from_blocks(name: &str, blocks: Vec<VggBlockConfig>) -> Self {
        Self {
            in_channels: 3,
            blocks,
            hidden_units: vec![256],
            n_outputs: 1,
            output_activation: OutputActivation::Sigmoid,
            nested_backbone: true,
            backbone_name: name.to_string(),
        }
    }

    /// Look up a preset by name (`vgg16`, `vgg19`, `tiny`).
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "vgg16" => Some(Self::vgg16()),
            "vgg19" => Some(Self::vgg19()),
            "tiny" | "vgg_tiny" => Some(Self::tiny()),
            _ => None,
        }
    }

    /// Set whether the backbone is a nested sub-graph.
    #[must_use]
    pub fn with_nested_backbone(mut self, nested: bool) -> Self {
        self.nested_backbone = nested;
        self
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] for zero-sized parts.
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 || self.n_outputs == 0 {
            return Err(ModelError::InvalidConfig(
                "in_channels and n_outputs must be positive".to_string(),
            ));
        }
        if self.blocks.is_empty() {
            return Err(ModelError::InvalidConfig("at least one block is required".to_string()));
        }
        if self.blocks.iter().any(|b| b.convs == 0 || b.channels == 0) {
            return Err(ModelError::InvalidConfig(
                "every block needs at least one convolution and one channel".to_string(),
            ));
        }
        if self.hidden_units.contains(&0) {
            return Err(ModelError::InvalidConfig("hidden layer width must be positive".to_string()));
        }
        if self.nested_backbone && self.backbone_name.is_empty() {
            return Err(ModelError::InvalidConfig("backbone_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Smallest input side the network accepts.
    pub fn min_input_size(&self) -> usize {
        1 << self.blocks.len()
    }

    /// Initialize the model with fresh weights.
    pub fn init<B: Backend>(&self, device: &B::Device) -> VggNet<B> {
        VggNet::new(self, device)
    }
}

/// Convolutions of one block.
#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
}

/// VGG weights as a burn module, so they can be saved and loaded as a record.
#[derive(Module, Debug)]
pub struct VggNet<B: Backend> {
    blocks: Vec<VggBlock<B>>,
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> VggNet<B> {
    /// Create a model with fresh weights.
    pub fn new(config: &VggConfig, device: &B::Device) -> Self {
        let mut in_channels = config.in_channels;
        let blocks = config
            .blocks
            .iter()
            .map(|block| {
                let convs = (0..block.convs)
                    .map(|_| {
                        let conv = Conv2dConfig::new([in_channels, block.channels], [3, 3])
                            .with_padding(PaddingConfig2d::Same)
                            .init(device);
                        in_channels = block.channels;
                        conv
                    })
                    .collect();
                VggBlock { convs }
            })
            .collect();

        let mut in_features = in_channels;
        let hidden = config
            .hidden_units
            .iter()
            .map(|&units| {
                let linear = LinearConfig::new(in_features, units).init(device);
                in_features = units;
                linear
            })
            .collect();
        let output = LinearConfig::new(in_features, config.n_outputs).init(device);

        Self {
            blocks,
            hidden,
            output,
        }
    }

    /// Convert into a named graph.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] if `config` does not describe
    /// this model's structure.
    pub fn into_graph(self, config: &VggConfig) -> Result<Graph<B>> {
        config.validate()?;
        let matches_config = self.blocks.len() == config.blocks.len()
            && self
                .blocks
                .iter()
                .zip(&config.blocks)
                .all(|(b, c)| b.convs.len() == c.convs)
            && self.hidden.len() == config.hidden_units.len();
        if !matches_config {
            return Err(ModelError::InvalidConfig(
                "weights do not match the configured architecture".to_string(),
            ));
        }

        let mut backbone = Graph::new(config.backbone_name.clone());
        let mut in_channels = config.in_channels;
        for (b, (block, block_config)) in self.blocks.into_iter().zip(&config.blocks).enumerate() {
            for (c, conv) in block.convs.into_iter().enumerate() {
                let layer = Conv2dLayer::from_module(
                    conv,
                    [in_channels, block_config.channels],
                    3,
                    OutputActivation::Relu,
                );
                backbone = backbone.with_layer(format!("block{}_conv{}", b + 1, c + 1), layer);
                in_channels = block_config.channels;
            }
            backbone = backbone.with_layer(format!("block{}_pool", b + 1), MaxPool2dLayer::new());
        }

        let mut graph = if config.nested_backbone {
            Graph::new("model").with_subgraph(backbone)
        } else {
            backbone
        };
        graph = graph.with_layer("global_average_pooling2d", GlobalAvgPoolLayer::new());

        // dense, dense_1, dense_2, ...
        let dense_name = |i: usize| if i == 0 { "dense".to_string() } else { format!("dense_{i}") };
        let mut in_features = in_channels;
        for (i, (linear, &units)) in self.hidden.into_iter().zip(&config.hidden_units).enumerate() {
            let layer = DenseLayer::from_module(linear, [in_features, units], OutputActivation::Relu);
            graph = graph.with_layer(dense_name(i), layer);
            in_features = units;
        }
        let output = DenseLayer::from_module(
            self.output,
            [in_features, config.n_outputs],
            config.output_activation,
        );
        graph = graph.with_layer(dense_name(config.hidden_units.len()), output);

        graph.validate()?;
        Ok(graph)
    }
}
