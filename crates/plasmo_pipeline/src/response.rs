//! JSON response shapes.
//!
//! Rounding happens here and nowhere else: confidence to 2 decimals, raw
//! score to 6. Overlays are base64-encoded raster bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use plasmo_analysis::PredictionRecord;
use plasmo_explain::OverlayArtifact;
use serde::{Deserialize, Serialize};

use crate::batch::{AggregateSummary, BatchResult, ItemOutcome};
use crate::predictor::Prediction;

/// Round `value` to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn encode_overlay(overlay: Option<&OverlayArtifact>) -> Option<String> {
    overlay.map(|artifact| STANDARD.encode(artifact.bytes()))
}

/// Decision details of a single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    /// Decision is positive.
    pub parasitized: bool,
    /// `Parasitized` or `Uninfected`.
    pub class: String,
}

/// Response for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// `Positive - Parasitized` or `Negative - Uninfected`.
    pub result: String,
    /// Confidence percentage, 2 decimals.
    pub confidence: f64,
    /// Classifier score, 6 decimals.
    pub raw_score: f64,
    /// Decision details.
    pub interpretation: Interpretation,
    /// Base64 overlay, or null.
    pub gradcam: Option<String>,
}

impl PredictionResponse {
    fn from_parts(record: &PredictionRecord, overlay: Option<&OverlayArtifact>) -> Self {
        Self {
            result: record.decision.result_label().to_string(),
            confidence: round_to(record.confidence, 2),
            raw_score: round_to(record.raw_score, 6),
            interpretation: Interpretation {
                parasitized: record.decision.is_positive(),
                class: record.decision.class_label().to_string(),
            },
            gradcam: encode_overlay(overlay),
        }
    }
}

impl From<&Prediction> for PredictionResponse {
    fn from(prediction: &Prediction) -> Self {
        Self::from_parts(&prediction.record, prediction.overlay.as_ref())
    }
}

/// One entry of a batch response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItemResponse {
    /// Classified item.
    Success {
        /// Position in the input.
        index: usize,
        /// Caller-supplied name.
        filename: String,
        /// Result label.
        result: String,
        /// Confidence percentage, 2 decimals.
        confidence: f64,
        /// Classifier score, 6 decimals.
        raw_score: f64,
        /// Base64 overlay, or null.
        gradcam: Option<String>,
    },
    /// Failed item.
    Failed {
        /// Position in the input.
        index: usize,
        /// Caller-supplied name.
        filename: String,
        /// Error message.
        error: String,
    },
}

impl From<&ItemOutcome> for BatchItemResponse {
    fn from(outcome: &ItemOutcome) -> Self {
        match outcome {
            ItemOutcome::Success {
                index,
                filename,
                record,
                overlay,
            } => Self::Success {
                index: *index,
                filename: filename.clone(),
                result: record.decision.result_label().to_string(),
                confidence: round_to(record.confidence, 2),
                raw_score: round_to(record.raw_score, 6),
                gradcam: encode_overlay(overlay.as_ref()),
            },
            ItemOutcome::Failed {
                index,
                filename,
                error,
            } => Self::Failed {
                index: *index,
                filename: filename.clone(),
                error: error.clone(),
            },
        }
    }
}

/// Batch statistics. Without successful items only the counts are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResponse {
    /// Items submitted.
    pub total_images: usize,
    /// Items classified.
    pub successful: usize,
    /// Items that failed.
    pub failed: usize,
    /// Positive items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parasitized_count: Option<usize>,
    /// Negative items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninfected_count: Option<usize>,
    /// Mean confidence, 2 decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_confidence: Option<f64>,
    /// Majority result label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_result: Option<String>,
}

impl From<&AggregateSummary> for AggregateResponse {
    fn from(summary: &AggregateSummary) -> Self {
        let has_results = summary.successful > 0;
        Self {
            total_images: summary.total_images,
            successful: summary.successful,
            failed: summary.failed,
            parasitized_count: has_results.then_some(summary.parasitized_count),
            uninfected_count: has_results.then_some(summary.uninfected_count),
            average_confidence: summary.average_confidence.map(|c| round_to(c, 2)),
            overall_result: summary
                .overall_result
                .map(|d| d.result_label().to_string()),
        }
    }
}

/// Response for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Items in input order.
    pub results: Vec<BatchItemResponse>,
    /// Batch statistics.
    pub aggregate: AggregateResponse,
}

impl From<&BatchResult> for BatchResponse {
    fn from(result: &BatchResult) -> Self {
        Self {
            results: result.items.iter().map(BatchItemResponse::from).collect(),
            aggregate: AggregateResponse::from(&result.aggregate),
        }
    }
}
