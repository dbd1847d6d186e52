//! # plasmo_pipeline
//!
//! Single-image and batch prediction with explanations for plasmo-rs.
//!
//! This crate provides:
//! - [`PipelineConfig`] loaded from JSON with defaults for every field
//! - [`Pipeline`] wiring codec, classifier, explainer and calibrator
//! - [`Pipeline::predict`] and [`Pipeline::run_batch`]
//! - [`WorkerPool`] fanning explanations out over a thread pool
//! - Serializable response and health types
//!
//! ## Example
//!
//! ```rust,ignore
//! use plasmo_pipeline::{BatchResponse, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_file("plasmo.json")?;
//! let pipeline = Pipeline::<DefaultBackend>::new(config, device)?;
//!
//! let result = pipeline.run_batch(&[("a.png", bytes_a), ("b.png", bytes_b)]);
//! println!("{}", serde_json::to_string(&BatchResponse::from(&result))?);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod config;
mod error;
mod pipeline;
pub mod pool;
pub mod predictor;
pub mod response;
mod status;

pub use batch::{AggregateSummary, BatchResult, ItemOutcome};
pub use config::{CalibrationConfig, PipelineConfig, DEFAULT_TARGET_LAYER};
pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
pub use pool::WorkerPool;
pub use predictor::{mode_for, Prediction};
pub use response::{
    AggregateResponse, BatchItemResponse, BatchResponse, Interpretation, PredictionResponse,
};
pub use status::StatusReport;
