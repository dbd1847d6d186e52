//! # plasmo_analysis
//!
//! Confidence calibration for plasmo-rs predictions.
//!
//! This crate provides:
//! - [`Calibrator`] - raw score to decision and confidence percentage
//! - [`CalibrationProfile`] - the heuristic (threshold 0.001) and linear
//!   (threshold 0.5) confidence curves
//! - [`PredictionRecord`] - immutable per-image result

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod calibration;

pub use calibration::{
    calibrate, CalibrationError, CalibrationProfile, Calibrator, Decision, PredictionRecord, Result,
};
