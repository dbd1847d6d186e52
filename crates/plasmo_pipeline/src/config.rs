//! Pipeline configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! {
//!   "model": { "blocks": [{ "convs": 2, "channels": 64 }] },
//!   "weights": "weights/vgg19.mpk",
//!   "calibration": { "profile": "linear" },
//!   "overlay": { "alpha": 0.4, "format": "jpeg" }
//! }
//! ```

use std::path::{Path, PathBuf};

use plasmo_analysis::{CalibrationProfile, Calibrator};
use plasmo_core::CodecConfig;
use plasmo_explain::OverlayConfig;
use plasmo_models::VggConfig;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Name of the feature map explained by default.
pub const DEFAULT_TARGET_LAYER: &str = "block5_conv3";

/// Calibration profile and optional threshold override.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Confidence curve.
    pub profile: CalibrationProfile,
    /// Decision threshold; the profile's default when unset.
    pub threshold: Option<f64>,
}

impl CalibrationConfig {
    /// Threshold in effect.
    #[must_use]
    pub fn effective_threshold(&self) -> f64 {
        self.threshold
            .unwrap_or_else(|| self.profile.default_threshold())
    }

    /// Build the calibrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the threshold is outside `[0, 1)`.
    pub fn calibrator(&self) -> Result<Calibrator> {
        Ok(Calibrator::new(self.profile, self.effective_threshold())?)
    }
}

/// Configuration for [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Decoding and resizing of input images.
    pub codec: CodecConfig,
    /// Reference classifier architecture.
    pub model: VggConfig,
    /// Trained weights (`.mpk`). Random initialization when unset.
    pub weights: Option<PathBuf>,
    /// Name of the layer whose feature map is explained.
    pub target_layer: String,
    /// Decision threshold and confidence curve.
    pub calibration: CalibrationConfig,
    /// Heatmap post-processing.
    pub overlay: OverlayConfig,
    /// Explanation worker threads; available parallelism when unset.
    pub workers: Option<usize>,
    /// Produce overlays at all.
    pub explain: bool,
    /// Seed for weight initialization.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            codec: CodecConfig::default(),
            model: VggConfig::default(),
            weights: None,
            target_layer: DEFAULT_TARGET_LAYER.to_string(),
            calibration: CalibrationConfig::default(),
            overlay: OverlayConfig::default(),
            workers: None,
            explain: true,
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Create a default configuration for `model`.
    pub fn new(model: VggConfig) -> Self {
        Self {
            model,
            ..Default::default()
        }
    }

    /// Read a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Parse a JSON config.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or unknown enum values.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Set the codec.
    #[must_use]
    pub fn with_codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    /// Set the weights file.
    #[must_use]
    pub fn with_weights(mut self, path: impl Into<PathBuf>) -> Self {
        self.weights = Some(path.into());
        self
    }

    /// Set the explained layer.
    #[must_use]
    pub fn with_target_layer(mut self, layer: impl Into<String>) -> Self {
        self.target_layer = layer.into();
        self
    }

    /// Set the calibration profile, keeping any threshold override.
    #[must_use]
    pub fn with_profile(mut self, profile: CalibrationProfile) -> Self {
        self.calibration.profile = profile;
        self
    }

    /// Override the decision threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.calibration.threshold = Some(threshold);
        self
    }

    /// Set the overlay parameters.
    #[must_use]
    pub fn with_overlay(mut self, overlay: OverlayConfig) -> Self {
        self.overlay = overlay;
        self
    }

    /// Set the number of explanation workers.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Enable or disable overlays.
    #[must_use]
    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }

    /// Set the initialization seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of explanation workers in effect.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for inconsistent sizes, an empty
    /// target layer or zero workers, and the section's own error otherwise.
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.overlay.validate()?;
        self.calibration.calibrator()?;

        let min = self.model.min_input_size();
        let (height, width) = (self.codec.height as usize, self.codec.width as usize);
        if height < min || width < min {
            return Err(PipelineError::Config(format!(
                "codec size {width}x{height} is below the model minimum of {min}x{min}"
            )));
        }
        if self.target_layer.trim().is_empty() {
            return Err(PipelineError::Config("target_layer must not be empty".to_string()));
        }
        if self.workers == Some(0) {
            return Err(PipelineError::Config("workers must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasmo_analysis::CalibrationError;
    use plasmo_core::ResizeFilter;
    use plasmo_explain::OverlayFormat;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.target_layer, "block5_conv3");
        assert_eq!(config.codec.height, 256);
        assert_eq!(config.codec.filter, ResizeFilter::Nearest);
        assert_eq!(config.model, VggConfig::vgg19());
        assert_eq!(config.calibration.effective_threshold(), 0.001);
        assert!(config.explain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = PipelineConfig::from_json(
            r#"{
                "calibration": { "profile": "linear" },
                "overlay": { "format": "jpeg" },
                "workers": 2
            }"#,
        )
        .unwrap();
        assert_eq!(config.calibration.profile, CalibrationProfile::Linear);
        assert_eq!(config.calibration.effective_threshold(), 0.5);
        assert_eq!(config.overlay.format, OverlayFormat::Jpeg);
        assert_eq!(config.overlay.alpha, 0.3);
        assert_eq!(config.worker_count(), 2);
        assert_eq!(config.target_layer, DEFAULT_TARGET_LAYER);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = PipelineConfig::new(VggConfig::tiny()).with_seed(7);
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(PipelineConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_threshold_override_is_validated() {
        let config = PipelineConfig::default().with_threshold(1.0);
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Calibration(CalibrationError::InvalidThreshold(_)))
        ));
    }

    #[test]
    fn test_codec_smaller_than_model() {
        let config = PipelineConfig::default().with_codec(CodecConfig::square(16));
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_zero_workers() {
        let config = PipelineConfig::default().with_workers(0);
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_unknown_profile_is_rejected() {
        let err = PipelineConfig::from_json(r#"{ "calibration": { "profile": "sigmoid" } }"#);
        assert!(matches!(err, Err(PipelineError::Json(_))));
    }
}
