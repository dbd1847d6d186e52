//! Image codec adapter.
//!
//! Decodes raw image bytes into the fixed-size, `[0, 1]`-scaled arrays the
//! classifier consumes. Source images of any size are resized to the
//! configured target size with a fixed interpolation policy.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::shape::ImageShape;

/// Interpolation used when resizing decoded images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    /// Nearest-neighbour sampling.
    #[default]
    Nearest,
    /// Bilinear interpolation.
    Bilinear,
    /// Bicubic (Catmull-Rom) interpolation.
    Bicubic,
    /// Lanczos with window 3.
    Lanczos3,
}

impl ResizeFilter {
    /// The corresponding `image` filter.
    #[must_use]
    pub const fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Configuration for the image codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Target height in pixels.
    pub height: u32,
    /// Target width in pixels.
    pub width: u32,
    /// Resize interpolation.
    pub filter: ResizeFilter,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            height: 256,
            width: 256,
            filter: ResizeFilter::Nearest,
        }
    }
}

impl CodecConfig {
    /// Create a config for a square target size.
    #[must_use]
    pub fn square(size: u32) -> Self {
        Self {
            height: size,
            width: size,
            ..Default::default()
        }
    }

    /// Set the resize filter.
    #[must_use]
    pub fn with_filter(mut self, filter: ResizeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Shape of the arrays produced with this config.
    #[must_use]
    pub const fn shape(&self) -> ImageShape {
        ImageShape::rgb(self.height as usize, self.width as usize)
    }
}

/// A decoded image: the original pixels plus the model-ready array.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Original image at its source resolution, RGB.
    pub original: RgbImage,
    /// Resized, `[0, 1]`-scaled array of shape `[H, W, 3]`.
    pub array: Array3<f32>,
}

impl DecodedImage {
    /// Shape of the model-ready array.
    #[must_use]
    pub fn shape(&self) -> ImageShape {
        let (h, w, c) = self.array.dim();
        ImageShape::new(h, w, c)
    }
}

/// Decodes raw image bytes into model-ready arrays.
#[derive(Debug, Clone, Default)]
pub struct ImageCodec {
    config: CodecConfig,
}

impl ImageCodec {
    /// Create a codec from config.
    #[must_use]
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// The codec configuration.
    #[must_use]
    pub const fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Shape of every array this codec produces.
    #[must_use]
    pub const fn output_shape(&self) -> ImageShape {
        self.config.shape()
    }

    /// Decode bytes into a `[H, W, 3]` array with values in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidImage`] if the bytes are not a decodable
    /// raster image.
    pub fn decode(&self, bytes: &[u8]) -> Result<Array3<f32>> {
        let original = decode_rgb(bytes)?;
        Ok(self.to_array(&original))
    }

    /// Decode bytes, keeping the original image next to the array.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidImage`] if the bytes are not a decodable
    /// raster image.
    pub fn load(&self, bytes: &[u8]) -> Result<DecodedImage> {
        let original = decode_rgb(bytes)?;
        let array = self.to_array(&original);
        Ok(DecodedImage { original, array })
    }

    /// Resize an RGB image to the target size and rescale to `[0, 1]`.
    #[must_use]
    pub fn to_array(&self, image: &RgbImage) -> Array3<f32> {
        let (width, height) = (self.config.width, self.config.height);
        let resized = if image.dimensions() == (width, height) {
            image.clone()
        } else {
            imageops::resize(image, width, height, self.config.filter.filter_type())
        };

        Array3::from_shape_fn(
            (height as usize, width as usize, 3),
            |(y, x, c)| f32::from(resized.get_pixel(x as u32, y as u32).0[c]) / 255.0,
        )
    }
}

fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(CoreError::InvalidImage("empty input".to_string()));
    }
    let image =
        image::load_from_memory(bytes).map_err(|e| CoreError::InvalidImage(e.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(CoreError::InvalidImage("image has no pixels".to_string()));
    }
    tracing::trace!(
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "decoded image"
    );
    Ok(image.to_rgb8())
}

/// Encode an RGB image as PNG bytes.
///
/// # Errors
///
/// Returns [`CoreError::EncodeError`] if encoding fails.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    encode(image, image::ImageFormat::Png)
}

/// Encode an RGB image as JPEG bytes.
///
/// # Errors
///
/// Returns [`CoreError::EncodeError`] if encoding fails.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    encode(image, image::ImageFormat::Jpeg)
}

fn encode(image: &RgbImage, format: image::ImageFormat) -> Result<Vec<u8>> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, format)
        .map_err(|e| CoreError::EncodeError(e.to_string()))?;
    Ok(bytes.into_inner())
}
