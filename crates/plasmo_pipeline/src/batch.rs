//! Batch prediction with per-item failure isolation.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use image::RgbImage;
use ndarray::Array3;
use plasmo_analysis::{Decision, PredictionRecord};
use plasmo_core::ImageBatch;
use plasmo_explain::OverlayArtifact;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::predictor::render_overlay;
use crate::response::round_to;

/// Outcome of one batch item.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    /// The image was classified.
    Success {
        /// Position in the input.
        index: usize,
        /// Caller-supplied name.
        filename: String,
        /// Score, decision and confidence.
        record: PredictionRecord,
        /// Composited heatmap, if explanation succeeded.
        overlay: Option<OverlayArtifact>,
    },
    /// The image could not be classified.
    Failed {
        /// Position in the input.
        index: usize,
        /// Caller-supplied name.
        filename: String,
        /// Error message.
        error: String,
    },
}

impl ItemOutcome {
    /// Position in the input.
    pub fn index(&self) -> usize {
        match self {
            Self::Success { index, .. } | Self::Failed { index, .. } => *index,
        }
    }

    /// Caller-supplied name.
    pub fn filename(&self) -> &str {
        match self {
            Self::Success { filename, .. } | Self::Failed { filename, .. } => filename,
        }
    }

    /// Check if the item was classified.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Prediction record of a successful item.
    pub fn record(&self) -> Option<&PredictionRecord> {
        match self {
            Self::Success { record, .. } => Some(record),
            Self::Failed { .. } => None,
        }
    }

    /// Overlay of a successful item.
    pub fn overlay(&self) -> Option<&OverlayArtifact> {
        match self {
            Self::Success { overlay, .. } => overlay.as_ref(),
            Self::Failed { .. } => None,
        }
    }
}

/// Statistics over a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    /// Items submitted.
    pub total_images: usize,
    /// Items classified.
    pub successful: usize,
    /// Items that failed.
    pub failed: usize,
    /// Successful items decided positive.
    pub parasitized_count: usize,
    /// Successful items decided negative.
    pub uninfected_count: usize,
    /// Mean of the per-item confidences as reported, i.e. rounded to two
    /// decimals.
    pub average_confidence: Option<f64>,
    /// Positive iff more than half of the successful items are positive.
    pub overall_result: Option<Decision>,
}

impl AggregateSummary {
    /// Summarize `outcomes`.
    pub fn from_outcomes(outcomes: &[ItemOutcome]) -> Self {
        let records: Vec<&PredictionRecord> = outcomes.iter().filter_map(ItemOutcome::record).collect();
        let successful = records.len();
        let parasitized_count = records.iter().filter(|r| r.decision.is_positive()).count();

        let (average_confidence, overall_result) = if successful == 0 {
            (None, None)
        } else {
            let mean =
                records.iter().map(|r| round_to(r.confidence, 2)).sum::<f64>() / successful as f64;
            let overall = if 2 * parasitized_count > successful {
                Decision::Positive
            } else {
                Decision::Negative
            };
            (Some(mean), Some(overall))
        };

        Self {
            total_images: outcomes.len(),
            successful,
            failed: outcomes.len() - successful,
            parasitized_count,
            uninfected_count: successful - parasitized_count,
            average_confidence,
            overall_result,
        }
    }
}

/// Per-item outcomes in input order plus their summary.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// One outcome per input item, ordered by index.
    pub items: Vec<ItemOutcome>,
    /// Batch statistics.
    pub aggregate: AggregateSummary,
}

struct Decoded {
    index: usize,
    original: RgbImage,
    array: Array3<f32>,
}

struct ExplainJob<B: Backend> {
    slot: usize,
    index: usize,
    filename: String,
    input: Tensor<B, 4>,
    original: RgbImage,
    decision: Decision,
}

impl<B: AutodiffBackend> Pipeline<B> {
    /// Classify and explain a batch of `(filename, bytes)` pairs.
    ///
    /// Never fails as a whole: undecodable images, a failed forward pass
    /// or a failed calibration mark the affected items as failed, and
    /// explanation failures only drop the item's overlay.
    pub fn run_batch<N, D>(&self, images: &[(N, D)]) -> BatchResult
    where
        N: AsRef<str>,
        D: AsRef<[u8]>,
    {
        let filename = |index: usize| images[index].0.as_ref().to_string();
        let mut slots: Vec<Option<ItemOutcome>> = (0..images.len()).map(|_| None).collect();

        let mut decoded = Vec::with_capacity(images.len());
        for (index, (name, bytes)) in images.iter().enumerate() {
            match self.codec.load(bytes.as_ref()) {
                Ok(image) => decoded.push(Decoded {
                    index,
                    original: image.original,
                    array: image.array,
                }),
                Err(e) => {
                    tracing::warn!(index, filename = name.as_ref(), error = %e, "image could not be decoded");
                    slots[index] = Some(ItemOutcome::Failed {
                        index,
                        filename: filename(index),
                        error: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(total = images.len(), decoded = decoded.len(), "batch started");

        if !decoded.is_empty() {
            match self.score(&decoded) {
                Ok((batch, scores)) => {
                    let mut jobs = Vec::new();
                    let mut successes = Vec::new();
                    for (k, (item, raw)) in decoded.into_iter().zip(scores).enumerate() {
                        let name = filename(item.index);
                        let record = match self.calibrator.calibrate(f64::from(raw)) {
                            Ok(record) => record,
                            Err(e) => {
                                tracing::warn!(index = item.index, filename = %name, error = %e, "calibration failed");
                                slots[item.index] = Some(ItemOutcome::Failed {
                                    index: item.index,
                                    filename: name,
                                    error: e.to_string(),
                                });
                                continue;
                            }
                        };

                        let slot = successes.len();
                        if self.config.explain {
                            match batch.item(k) {
                                Ok(input) => jobs.push(ExplainJob {
                                    slot,
                                    index: item.index,
                                    filename: name.clone(),
                                    input,
                                    original: item.original,
                                    decision: record.decision,
                                }),
                                Err(e) => tracing::warn!(index = item.index, error = %e, "batch item unavailable for explanation"),
                            }
                        }
                        successes.push((item.index, name, record));
                    }

                    let mut overlays: Vec<Option<OverlayArtifact>> =
                        (0..successes.len()).map(|_| None).collect();
                    for (slot, overlay) in self.explain_all(jobs) {
                        overlays[slot] = overlay;
                    }

                    for ((index, filename, record), overlay) in successes.into_iter().zip(overlays) {
                        slots[index] = Some(ItemOutcome::Success {
                            index,
                            filename,
                            record,
                            overlay,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, items = decoded.len(), "batch forward pass failed");
                    let message = e.to_string();
                    for item in decoded {
                        slots[item.index] = Some(ItemOutcome::Failed {
                            index: item.index,
                            filename: filename(item.index),
                            error: message.clone(),
                        });
                    }
                }
            }
        }

        let items: Vec<ItemOutcome> = slots.into_iter().flatten().collect();
        let aggregate = AggregateSummary::from_outcomes(&items);
        tracing::info!(
            successful = aggregate.successful,
            failed = aggregate.failed,
            parasitized = aggregate.parasitized_count,
            "batch finished"
        );
        BatchResult { items, aggregate }
    }

    /// One forward pass over every decoded image.
    fn score(&self, decoded: &[Decoded]) -> Result<(ImageBatch<B>, Vec<f32>)> {
        let arrays: Vec<Array3<f32>> = decoded.iter().map(|d| d.array.clone()).collect();
        let batch = ImageBatch::<B>::from_arrays(&arrays, &self.device)?;
        let scores = self.classifier.raw_scores(&batch)?;
        if scores.len() != decoded.len() {
            return Err(PipelineError::MissingScore {
                expected: decoded.len(),
                got: scores.len(),
            });
        }
        Ok((batch, scores))
    }

    fn explain_all(&self, jobs: Vec<ExplainJob<B>>) -> Vec<(usize, Option<OverlayArtifact>)> {
        let overlay_config = &self.config.overlay;
        self.pool.fan_out(&self.explainer, jobs, |explainer, job| {
            let overlay = match render_overlay(
                explainer,
                overlay_config,
                &job.original,
                job.input,
                job.decision,
            ) {
                Ok(artifact) => Some(artifact),
                Err(e) => {
                    tracing::warn!(
                        index = job.index,
                        filename = %job.filename,
                        error = %e,
                        "explanation failed, item kept without overlay"
                    );
                    None
                }
            };
            (job.slot, overlay)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use image::Rgb;
    use plasmo_core::backend::{Autodiff, NdArray};
    use plasmo_core::{encode_png, CodecConfig};
    use plasmo_models::VggConfig;
    use pretty_assertions::assert_eq;

    type TestBackend = Autodiff<NdArray>;

    fn pipeline() -> Pipeline<TestBackend> {
        let config = PipelineConfig::new(VggConfig::tiny())
            .with_codec(CodecConfig::square(32))
            .with_workers(2)
            .with_seed(11);
        Pipeline::new(config, Default::default()).unwrap()
    }

    fn png(level: u8, size: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(size, size, |x, y| {
            Rgb([level, level.wrapping_add((x * 3) as u8), level.wrapping_add((y * 5) as u8)])
        });
        encode_png(&image).unwrap()
    }

    fn record(decision: Decision, confidence: f64) -> ItemOutcome {
        ItemOutcome::Success {
            index: 0,
            filename: String::new(),
            record: PredictionRecord {
                raw_score: 0.5,
                decision,
                confidence,
            },
            overlay: None,
        }
    }

    fn failed() -> ItemOutcome {
        ItemOutcome::Failed {
            index: 0,
            filename: String::new(),
            error: "bad".to_string(),
        }
    }

    #[test]
    fn test_aggregate_majority() {
        let outcomes = vec![
            record(Decision::Positive, 90.0),
            record(Decision::Positive, 80.0),
            record(Decision::Negative, 100.0),
            failed(),
        ];
        let summary = AggregateSummary::from_outcomes(&outcomes);
        assert_eq!(summary.total_images, 4);
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.parasitized_count, 2);
        assert_eq!(summary.uninfected_count, 1);
        assert_eq!(summary.average_confidence, Some(90.0));
        assert_eq!(summary.overall_result, Some(Decision::Positive));
    }

    #[test]
    fn test_average_uses_reported_confidences() {
        let outcomes = vec![
            record(Decision::Positive, 33.334),
            record(Decision::Positive, 33.334),
            record(Decision::Negative, 33.338),
        ];
        let summary = AggregateSummary::from_outcomes(&outcomes);
        // 33.33, 33.33 and 33.34 as displayed
        let average = summary.average_confidence.unwrap();
        assert!((average - 100.0 / 3.0).abs() < 1e-9, "{average}");
        assert_eq!(round_to(average, 2), 33.33);
    }

    #[test]
    fn test_aggregate_tie_is_negative() {
        let outcomes = vec![record(Decision::Positive, 70.0), record(Decision::Negative, 96.0)];
        let summary = AggregateSummary::from_outcomes(&outcomes);
        assert_eq!(summary.overall_result, Some(Decision::Negative));
    }

    #[test]
    fn test_aggregate_without_successes() {
        let summary = AggregateSummary::from_outcomes(&[failed(), failed()]);
        assert_eq!(summary.successful, 0);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.average_confidence, None);
        assert_eq!(summary.overall_result, None);
    }

    #[test]
    fn test_corrupt_item_is_isolated() {
        let pipeline = pipeline();
        let images = vec![
            ("a.png", png(200, 40)),
            ("broken.png", b"garbage".to_vec()),
            ("c.png", png(90, 36)),
        ];
        let result = pipeline.run_batch(&images);

        assert_eq!(result.items.len(), 3);
        assert_eq!(
            result.items.iter().map(ItemOutcome::index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(result.items[0].is_success());
        assert!(!result.items[1].is_success());
        assert_eq!(result.items[1].filename(), "broken.png");
        assert!(result.items[2].is_success());
        assert_eq!(result.aggregate.successful, 2);
        assert_eq!(result.aggregate.failed, 1);

        let overlay = result.items[2].overlay().unwrap();
        assert_eq!(overlay.image().dimensions(), (36, 36));
    }

    #[test]
    fn test_empty_batch() {
        let pipeline = pipeline();
        let images: Vec<(String, Vec<u8>)> = Vec::new();
        let result = pipeline.run_batch(&images);
        assert!(result.items.is_empty());
        assert_eq!(result.aggregate.total_images, 0);
        assert_eq!(result.aggregate.overall_result, None);
    }

    #[test]
    fn test_batch_of_one_matches_predict() {
        let pipeline = pipeline();
        let bytes = png(150, 32);
        let single = pipeline.predict(&bytes).unwrap();
        let batch = pipeline.run_batch(&[("x.png", bytes)]);

        let record = batch.items[0].record().unwrap();
        assert_eq!(record, &single.record);
        assert_eq!(
            batch.items[0].overlay().unwrap().image(),
            single.overlay.unwrap().image()
        );
    }
}
