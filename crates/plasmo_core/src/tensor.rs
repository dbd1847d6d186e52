//! Image batch tensors.

use burn::prelude::*;
use burn::tensor::TensorData;
use ndarray::Array3;

use crate::error::{CoreError, Result};
use crate::shape::ImageShape;

/// A batch of images stacked into one channel-first tensor.
///
/// Wraps a Burn tensor of shape `(N, C, H, W)` together with the per-image
/// [`ImageShape`] it was built from.
///
/// # Example
///
/// ```rust,ignore
/// use plasmo_core::ImageBatch;
///
/// let arrays = vec![codec.decode(&bytes_a)?, codec.decode(&bytes_b)?];
/// let batch = ImageBatch::<Backend>::from_arrays(&arrays, &device)?;
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    inner: Tensor<B, 4>,
    shape: ImageShape,
}

impl<B: Backend> ImageBatch<B> {
    /// Stack `[H, W, C]` arrays into one `(N, C, H, W)` tensor.
    ///
    /// # Errors
    ///
    /// Returns an error if `arrays` is empty or the arrays disagree in shape.
    pub fn from_arrays(arrays: &[Array3<f32>], device: &B::Device) -> Result<Self> {
        let first = arrays.first().ok_or_else(|| CoreError::InvalidShape {
            expected: "at least one image".to_string(),
            got: "empty batch".to_string(),
        })?;
        let shape = ImageShape::from_dims(first.shape())?;
        if shape.is_empty() {
            return Err(CoreError::InvalidShape {
                expected: "non-empty image".to_string(),
                got: shape.to_string(),
            });
        }

        let mut data = Vec::with_capacity(arrays.len() * shape.numel());
        for (i, array) in arrays.iter().enumerate() {
            if array.shape() != first.shape() {
                return Err(CoreError::ShapeMismatch(format!(
                    "image {i} has shape {:?}, expected {:?}",
                    array.shape(),
                    first.shape()
                )));
            }
            // HWC -> CHW
            data.extend(array.view().permuted_axes([2, 0, 1]).iter().copied());
        }

        let dims = shape.as_nchw(arrays.len());
        let inner = Tensor::from_data(TensorData::new(data, dims), device);
        Ok(Self { inner, shape })
    }

    /// Build a single-image batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the array is not `[H, W, C]` with non-zero dims.
    pub fn from_array(array: &Array3<f32>, device: &B::Device) -> Result<Self> {
        Self::from_arrays(std::slice::from_ref(array), device)
    }

    /// Number of images in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.dims()[0]
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-image shape.
    #[must_use]
    pub const fn image_shape(&self) -> ImageShape {
        self.shape
    }

    /// Get a reference to the underlying tensor.
    #[must_use]
    pub const fn inner(&self) -> &Tensor<B, 4> {
        &self.inner
    }

    /// Consume self and return the underlying tensor.
    #[must_use]
    pub fn into_inner(self) -> Tensor<B, 4> {
        self.inner
    }

    /// Extract image `index` as a `(1, C, H, W)` tensor.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range.
    pub fn item(&self, index: usize) -> Result<Tensor<B, 4>> {
        let len = self.len();
        if index >= len {
            return Err(CoreError::InvalidShape {
                expected: format!("index < {len}"),
                got: index.to_string(),
            });
        }
        Ok(self.inner.clone().narrow(0, index, 1))
    }

    /// Get the device the tensor is on.
    pub fn device(&self) -> B::Device {
        self.inner.device()
    }
}

/// Stack `[H, W, C]` arrays into a bare `(N, C, H, W)` tensor.
///
/// # Errors
///
/// Returns [`CoreError::ShapeMismatch`] if the arrays disagree in shape.
pub fn stack_batch<B: Backend>(arrays: &[Array3<f32>], device: &B::Device) -> Result<Tensor<B, 4>> {
    Ok(ImageBatch::from_arrays(arrays, device)?.into_inner())
}

/// Read a float tensor back into a flat `Vec<f32>` (row-major).
///
/// # Errors
///
/// Returns [`CoreError::DataError`] if the tensor data cannot be converted.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::DataError(format!("{e:?}")))
}
