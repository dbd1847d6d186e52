//! Built-in graph layers backed by `burn` modules.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid, softmax};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::graph::{Activations, Layer};

/// Activation applied to a layer's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputActivation {
    /// No activation.
    #[default]
    Identity,
    /// Rectified linear unit.
    Relu,
    /// Logistic sigmoid.
    Sigmoid,
    /// Softmax over the channel/feature dimension.
    Softmax,
}

impl OutputActivation {
    /// Apply the activation.
    pub fn apply<B: Backend>(self, x: Activations<B>) -> Activations<B> {
        match x {
            Activations::Spatial(t) => Activations::Spatial(self.apply_tensor(t)),
            Activations::Flat(t) => Activations::Flat(self.apply_tensor(t)),
        }
    }

    fn apply_tensor<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Identity => x,
            Self::Relu => relu(x),
            Self::Sigmoid => sigmoid(x),
            Self::Softmax => softmax(x, 1),
        }
    }
}

impl std::fmt::Display for OutputActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Identity => "identity",
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Softmax => "softmax",
        };
        f.write_str(name)
    }
}

/// 2-D convolution with same padding followed by an activation.
#[derive(Debug, Clone)]
pub struct Conv2dLayer<B: Backend> {
    conv: Conv2d<B>,
    channels: [usize; 2],
    kernel_size: usize,
    activation: OutputActivation,
}

impl<B: Backend> Conv2dLayer<B> {
    /// Create a 3x3 convolution layer with fresh weights.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        activation: OutputActivation,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        Self::from_module(conv, [in_channels, out_channels], 3, activation)
    }

    /// Wrap an existing convolution module.
    pub fn from_module(
        conv: Conv2d<B>,
        channels: [usize; 2],
        kernel_size: usize,
        activation: OutputActivation,
    ) -> Self {
        Self {
            conv,
            channels,
            kernel_size,
            activation,
        }
    }
}

impl<B: Backend> Layer<B> for Conv2dLayer<B> {
    fn forward(&self, input: Activations<B>) -> Result<Activations<B>> {
        let x = input.into_spatial()?;
        let in_channels = x.dims()[1];
        if in_channels != self.channels[0] {
            return Err(ModelError::ShapeMismatch(format!(
                "conv expects {} input channels, got {in_channels}",
                self.channels[0]
            )));
        }
        let out = Activations::Spatial(self.conv.forward(x));
        Ok(self.activation.apply(out))
    }

    fn describe(&self) -> String {
        format!(
            "Conv2d({}->{}, {k}x{k}, {})",
            self.channels[0],
            self.channels[1],
            self.activation,
            k = self.kernel_size
        )
    }

    fn output_activation(&self) -> OutputActivation {
        self.activation
    }

    fn with_output_activation(&self, activation: OutputActivation) -> Option<Box<dyn Layer<B>>> {
        let mut layer = self.clone();
        layer.activation = activation;
        Some(Box::new(layer))
    }

    fn boxed_clone(&self) -> Box<dyn Layer<B>> {
        Box::new(self.clone())
    }
}

/// 2x2 max pooling with stride 2.
#[derive(Debug, Clone)]
pub struct MaxPool2dLayer {
    pool: MaxPool2d,
}

impl MaxPool2dLayer {
    /// Create a 2x2/2 max pooling layer.
    pub fn new() -> Self {
        Self {
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

impl Default for MaxPool2dLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Layer<B> for MaxPool2dLayer {
    fn forward(&self, input: Activations<B>) -> Result<Activations<B>> {
        let x = input.into_spatial()?;
        let [_, _, h, w] = x.dims();
        if h < 2 || w < 2 {
            return Err(ModelError::ShapeMismatch(format!(
                "max pooling needs at least 2x2 input, got {h}x{w}"
            )));
        }
        Ok(Activations::Spatial(self.pool.forward(x)))
    }

    fn describe(&self) -> String {
        "MaxPool2d(2x2, stride 2)".to_string()
    }

    fn boxed_clone(&self) -> Box<dyn Layer<B>> {
        Box::new(self.clone())
    }
}

/// Global average pooling from `(N, C, H, W)` to `(N, C)`.
#[derive(Debug, Clone)]
pub struct GlobalAvgPoolLayer {
    pool: AdaptiveAvgPool2d,
}

impl GlobalAvgPoolLayer {
    /// Create a global average pooling layer.
    pub fn new() -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }
}

impl Default for GlobalAvgPoolLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Layer<B> for GlobalAvgPoolLayer {
    fn forward(&self, input: Activations<B>) -> Result<Activations<B>> {
        let pooled = self.pool.forward(input.into_spatial()?);
        Ok(Activations::Flat(pooled.flatten(1, 3)))
    }

    fn describe(&self) -> String {
        "GlobalAvgPool2d".to_string()
    }

    fn boxed_clone(&self) -> Box<dyn Layer<B>> {
        Box::new(self.clone())
    }
}

/// Flattens `(N, C, H, W)` into `(N, C*H*W)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenLayer;

impl FlattenLayer {
    /// Create a flatten layer.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Layer<B> for FlattenLayer {
    fn forward(&self, input: Activations<B>) -> Result<Activations<B>> {
        match input {
            Activations::Spatial(t) => Ok(Activations::Flat(t.flatten(1, 3))),
            flat @ Activations::Flat(_) => Ok(flat),
        }
    }

    fn describe(&self) -> String {
        "Flatten".to_string()
    }

    fn boxed_clone(&self) -> Box<dyn Layer<B>> {
        Box::new(*self)
    }
}

/// Multiplies activations by a constant, e.g. `1/255` input rescaling.
#[derive(Debug, Clone, Copy)]
pub struct ScaleLayer {
    factor: f32,
}

impl ScaleLayer {
    /// Create a rescaling layer.
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }
}

impl<B: Backend> Layer<B> for ScaleLayer {
    fn forward(&self, input: Activations<B>) -> Result<Activations<B>> {
        Ok(match input {
            Activations::Spatial(t) => Activations::Spatial(t * self.factor),
            Activations::Flat(t) => Activations::Flat(t * self.factor),
        })
    }

    fn describe(&self) -> String {
        format!("Scale({})", self.factor)
    }

    fn boxed_clone(&self) -> Box<dyn Layer<B>> {
        Box::new(*self)
    }
}

/// Fully connected layer followed by an activation.
#[derive(Debug, Clone)]
pub struct DenseLayer<B: Backend> {
    linear: Linear<B>,
    features: [usize; 2],
    activation: OutputActivation,
}

impl<B: Backend> DenseLayer<B> {
    /// Create a dense layer with fresh weights.
    pub fn new(
        in_features: usize,
        out_features: usize,
        activation: OutputActivation,
        device: &B::Device,
    ) -> Self {
        let linear = LinearConfig::new(in_features, out_features).init(device);
        Self::from_module(linear, [in_features, out_features], activation)
    }

    /// Wrap an existing linear module.
    pub fn from_module(linear: Linear<B>, features: [usize; 2], activation: OutputActivation) -> Self {
        Self {
            linear,
            features,
            activation,
        }
    }
}

impl<B: Backend> Layer<B> for DenseLayer<B> {
    fn forward(&self, input: Activations<B>) -> Result<Activations<B>> {
        let x = input.into_flat()?;
        let in_features = x.dims()[1];
        if in_features != self.features[0] {
            return Err(ModelError::ShapeMismatch(format!(
                "dense expects {} input features, got {in_features}",
                self.features[0]
            )));
        }
        let out = Activations::Flat(self.linear.forward(x));
        Ok(self.activation.apply(out))
    }

    fn describe(&self) -> String {
        format!(
            "Dense({}->{}, {})",
            self.features[0], self.features[1], self.activation
        )
    }

    fn output_activation(&self) -> OutputActivation {
        self.activation
    }

    fn with_output_activation(&self, activation: OutputActivation) -> Option<Box<dyn Layer<B>>> {
        let mut layer = self.clone();
        layer.activation = activation;
        Some(Box::new(layer))
    }

    fn boxed_clone(&self) -> Box<dyn Layer<B>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasmo_core::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_conv_keeps_spatial_size() {
        let device = Default::default();
        let layer = Conv2dLayer::<TestBackend>::new(3, 4, OutputActivation::Relu, &device);
        let x = Activations::Spatial(Tensor::ones([2, 3, 8, 8], &device));

        let out = layer.forward(x).unwrap().into_spatial().unwrap();
        assert_eq!(out.dims(), [2, 4, 8, 8]);
        let min: f32 = out.min().into_scalar().elem();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_conv_rejects_wrong_channels() {
        let device = Default::default();
        let layer = Conv2dLayer::<TestBackend>::new(3, 4, OutputActivation::Relu, &device);
        let x = Activations::Spatial(Tensor::ones([1, 5, 8, 8], &device));
        assert!(matches!(layer.forward(x), Err(ModelError::ShapeMismatch(_))));
    }

    #[test]
    fn test_pooling_shapes() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([2, 3, 8, 6], &device);

        let pooled = Layer::<TestBackend>::forward(&MaxPool2dLayer::new(), Activations::Spatial(x.clone()))
            .unwrap()
            .into_spatial()
            .unwrap();
        assert_eq!(pooled.dims(), [2, 3, 4, 3]);

        let gap = Layer::<TestBackend>::forward(&GlobalAvgPoolLayer::new(), Activations::Spatial(x))
            .unwrap()
            .into_flat()
            .unwrap();
        assert_eq!(gap.dims(), [2, 3]);
    }

    #[test]
    fn test_max_pool_rejects_tiny_input() {
        let x = Activations::Spatial(Tensor::<TestBackend, 4>::ones([1, 1, 1, 1], &Default::default()));
        assert!(Layer::<TestBackend>::forward(&MaxPool2dLayer::new(), x).is_err());
    }

    #[test]
    fn test_flatten() {
        let x = Activations::Spatial(Tensor::<TestBackend, 4>::ones([2, 3, 2, 2], &Default::default()));
        let flat = Layer::<TestBackend>::forward(&FlattenLayer::new(), x)
            .unwrap()
            .into_flat()
            .unwrap();
        assert_eq!(flat.dims(), [2, 12]);
    }

    #[test]
    fn test_dense_sigmoid_range() {
        let device = Default::default();
        let layer = DenseLayer::<TestBackend>::new(4, 1, OutputActivation::Sigmoid, &device);
        let x = Activations::Flat(Tensor::ones([3, 4], &device) * 10.0);

        let out = layer.forward(x).unwrap().into_flat().unwrap();
        assert_eq!(out.dims(), [3, 1]);
        let max: f32 = out.clone().max().into_scalar().elem();
        let min: f32 = out.min().into_scalar().elem();
        assert!(max <= 1.0 && min >= 0.0);
    }

    #[test]
    fn test_dense_activation_swap() {
        let device = Default::default();
        let layer = DenseLayer::<TestBackend>::new(4, 2, OutputActivation::Softmax, &device);
        let identity = layer.with_output_activation(OutputActivation::Identity).unwrap();

        assert_eq!(layer.output_activation(), OutputActivation::Softmax);
        assert_eq!(identity.output_activation(), OutputActivation::Identity);
        assert_eq!(identity.describe(), "Dense(4->2, identity)");
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let x = Activations::Flat(Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0]], &device));
        let out = OutputActivation::Softmax.apply(x).into_flat().unwrap();
        let sum: f32 = out.sum().into_scalar().elem();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_activation_serde() {
        let json = serde_json::to_string(&OutputActivation::Sigmoid).unwrap();
        assert_eq!(json, "\"sigmoid\"");
        let parsed: OutputActivation = serde_json::from_str("\"relu\"").unwrap();
        assert_eq!(parsed, OutputActivation::Relu);
    }
}
