//! Single-image prediction.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use image::RgbImage;
use plasmo_analysis::{Decision, PredictionRecord};
use plasmo_core::ImageBatch;
use plasmo_explain::{composite, ExplanationMode, Explainer, OverlayArtifact, OverlayConfig};

use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;

/// Calibrated prediction with its overlay, if one could be produced.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Score, decision and confidence.
    pub record: PredictionRecord,
    /// Composited heatmap; `None` when explanation failed or is disabled.
    pub overlay: Option<OverlayArtifact>,
}

/// Explanation mode matching a decision.
pub fn mode_for(decision: Decision) -> ExplanationMode {
    match decision {
        Decision::Positive => ExplanationMode::Presence,
        Decision::Negative => ExplanationMode::Absence,
    }
}

/// Explain `input` for `decision` and composite onto `original`.
pub(crate) fn render_overlay<B: AutodiffBackend>(
    explainer: &Explainer<B>,
    config: &OverlayConfig,
    original: &RgbImage,
    input: Tensor<B, 4>,
    decision: Decision,
) -> plasmo_explain::Result<OverlayArtifact> {
    let map = explainer.explain(input, mode_for(decision), None)?;
    composite(original, &map, config)
}

impl<B: AutodiffBackend> Pipeline<B> {
    /// Classify one encoded image and explain the decision.
    ///
    /// # Errors
    ///
    /// Returns [`plasmo_core::CoreError::InvalidImage`] for undecodable
    /// bytes and any forward or calibration error. Explanation errors are
    /// logged and leave `overlay` empty.
    pub fn predict(&self, bytes: &[u8]) -> Result<Prediction> {
        let decoded = self.codec.load(bytes)?;
        let batch = ImageBatch::<B>::from_array(&decoded.array, &self.device)?;
        let scores = self.classifier.raw_scores(&batch)?;
        let raw = *scores.first().ok_or(PipelineError::MissingScore {
            expected: 1,
            got: 0,
        })?;
        let record = self.calibrator.calibrate(f64::from(raw))?;
        tracing::debug!(
            raw_score = record.raw_score,
            decision = %record.decision,
            confidence = record.confidence,
            "image classified"
        );

        let overlay = if self.config.explain {
            match render_overlay(
                &self.explainer,
                &self.config.overlay,
                &decoded.original,
                batch.into_inner(),
                record.decision,
            ) {
                Ok(artifact) => Some(artifact),
                Err(e) => {
                    tracing::warn!(error = %e, "explanation failed, returning prediction without overlay");
                    None
                }
            }
        } else {
            None
        };

        Ok(Prediction { record, overlay })
    }
}
