//! Heatmap post-processing and compositing.
//!
//! Turns an [`ImportanceMap`] into a displayable overlay on the original
//! image: threshold, renormalize, bilinear resize to the image size, JET
//! colormap, alpha blend, encode.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::Array2;
use plasmo_core::{encode_jpeg, encode_png};
use serde::{Deserialize, Serialize};

use crate::engine::ImportanceMap;
use crate::error::{ExplainError, Result};

/// Encoded format of overlay artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayFormat {
    /// Lossless PNG.
    #[default]
    Png,
    /// JPEG.
    Jpeg,
}

impl OverlayFormat {
    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Overlay parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Importance values below this are zeroed.
    pub threshold: f32,
    /// Weight of the colormap in the blend.
    pub alpha: f32,
    /// Encoded format.
    pub format: OverlayFormat,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            alpha: 0.3,
            format: OverlayFormat::Png,
        }
    }
}

impl OverlayConfig {
    /// Set the blend weight.
    #[must_use]
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the encoded format.
    #[must_use]
    pub fn with_format(mut self, format: OverlayFormat) -> Self {
        self.format = format;
        self
    }

    /// Check that threshold and alpha lie in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::InvalidConfig`] otherwise.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ExplainError::InvalidConfig(format!(
                "threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ExplainError::InvalidConfig(format!(
                "alpha must be in [0, 1], got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Composited overlay and its encoded bytes.
#[derive(Debug, Clone)]
pub struct OverlayArtifact {
    image: RgbImage,
    bytes: Vec<u8>,
    format: OverlayFormat,
}

impl OverlayArtifact {
    /// The composited image, same size as the original.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Encoded format.
    pub fn format(&self) -> OverlayFormat {
        self.format
    }
}

/// Zero values below `threshold`, then rescale so the maximum is 1.
///
/// An all-zero result is returned as is.
pub fn threshold_map(map: &ImportanceMap, threshold: f32) -> ImportanceMap {
    let mut values = map.values().mapv(|v| if v < threshold { 0.0 } else { v });
    let max = values.iter().copied().fold(0.0_f32, f32::max);
    if max > 0.0 {
        values.mapv_inplace(|v| v / max);
    }
    ImportanceMap::new(values)
}

/// Bilinear resize of a map to `width` x `height`.
///
/// # Errors
///
/// Returns an error for an empty map or target size.
pub fn resize_map(map: &ImportanceMap, width: u32, height: u32) -> Result<Array2<f32>> {
    if map.height() == 0 || map.width() == 0 || width == 0 || height == 0 {
        return Err(ExplainError::InvalidConfig(format!(
            "cannot resize {}x{} map to {width}x{height}",
            map.width(),
            map.height()
        )));
    }
    let data: Vec<f32> = map.values().iter().copied().collect();
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(map.width() as u32, map.height() as u32, data).ok_or_else(|| {
            ExplainError::InvalidConfig("importance map buffer size mismatch".to_string())
        })?;

    let resized = imageops::resize(&buffer, width, height, FilterType::Triangle);
    Array2::from_shape_vec((height as usize, width as usize), resized.into_raw())
        .map_err(|e| ExplainError::InvalidConfig(e.to_string()))
}

/// JET colormap: 0 is dark blue, 255 is dark red.
pub fn jet(value: u8) -> Rgb<u8> {
    let x = f32::from(value) / 255.0;
    let channel = |center: f32| {
        let c = (1.5 - (4.0 * x - center).abs()).clamp(0.0, 1.0);
        (c * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Composite `map` onto `original` and encode the result.
///
/// # Errors
///
/// Returns an error for invalid parameters, an empty map or if encoding fails.
pub fn composite(
    original: &RgbImage,
    map: &ImportanceMap,
    config: &OverlayConfig,
) -> Result<OverlayArtifact> {
    config.validate()?;
    let (width, height) = original.dimensions();

    let heat = resize_map(&threshold_map(map, config.threshold), width, height)?;
    let alpha = config.alpha;

    let image = RgbImage::from_fn(width, height, |x, y| {
        // truncation to 8 bits
        let level = (255.0 * heat[[y as usize, x as usize]]) as u8;
        let color = jet(level);
        let base = original.get_pixel(x, y);
        let mut out = [0u8; 3];
        for (c, value) in out.iter_mut().enumerate() {
            let blended = alpha * f32::from(color[c]) + (1.0 - alpha) * f32::from(base[c]);
            *value = blended.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    });

    let bytes = match config.format {
        OverlayFormat::Png => encode_png(&image)?,
        OverlayFormat::Jpeg => encode_jpeg(&image)?,
    };
    Ok(OverlayArtifact {
        image,
        bytes,
        format: config.format,
    })
}
