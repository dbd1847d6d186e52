//! Image shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape of a decoded image array.
///
/// Follows the convention `(H, W, C)` used by the codec:
/// - `H`: Height in pixels
/// - `W`: Width in pixels
/// - `C`: Colour channels (3 for RGB)
///
/// Model tensors use the channel-first layout `(N, C, H, W)`; see
/// [`ImageShape::as_nchw`].
///
/// # Example
///
/// ```rust
/// use plasmo_core::ImageShape;
///
/// let shape = ImageShape::rgb(256, 256);
/// assert_eq!(shape.height(), 256);
/// assert_eq!(shape.channels(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    height: usize,
    width: usize,
    channels: usize,
}

impl ImageShape {
    /// Create a new shape with the specified dimensions.
    #[must_use]
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Create a three-channel shape.
    #[must_use]
    pub const fn rgb(height: usize, width: usize) -> Self {
        Self::new(height, width, 3)
    }

    /// Create a shape from a slice of `[H, W, C]` dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice doesn't contain exactly 3 elements.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match dims {
            [h, w, c] => Ok(Self::new(*h, *w, *c)),
            _ => Err(CoreError::InvalidShape {
                expected: "[height, width, channels]".to_string(),
                got: format!("{dims:?}"),
            }),
        }
    }

    /// Get the height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Get the width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Get the number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Check if any dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0 || self.channels == 0
    }

    /// Total number of elements.
    #[must_use]
    pub const fn numel(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// Convert to `[H, W, C]`.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    /// Channel-first tensor dimensions for a batch of `batch` images.
    #[must_use]
    pub const fn as_nchw(&self, batch: usize) -> [usize; 4] {
        [batch, self.channels, self.height, self.width]
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(H={}, W={}, C={})", self.height, self.width, self.channels)
    }
}

impl From<[usize; 3]> for ImageShape {
    fn from([height, width, channels]: [usize; 3]) -> Self {
        Self::new(height, width, channels)
    }
}
