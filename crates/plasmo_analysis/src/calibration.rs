//! Confidence calibration for binary predictions.
//!
//! A raw classifier score is turned into a decision and a human-facing
//! confidence percentage. The percentage is a tuned heuristic, not a
//! probability. Two profiles are supported:
//!
//! - [`CalibrationProfile::Heuristic`] (threshold 0.001): piecewise curve
//!   tuned for a highly skewed score distribution.
//! - [`CalibrationProfile::Linear`] (threshold 0.5): `score * 100` for
//!   positives, `(1 - score) * 100` for negatives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for calibration.
pub type Result<T> = std::result::Result<T, CalibrationError>;

/// Calibration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Threshold outside `[0, 1)`.
    #[error("Invalid threshold {0}: must be in [0, 1)")]
    InvalidThreshold(f64),

    /// Profile name not recognised.
    #[error("Unknown calibration profile '{0}' (expected 'heuristic' or 'linear')")]
    UnknownProfile(String),

    /// Raw score is NaN or infinite.
    #[error("Raw score is not finite: {0}")]
    NonFiniteScore(f64),
}

/// Binary decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Parasitized.
    Positive,
    /// Uninfected.
    Negative,
}

impl Decision {
    /// Check if the decision is positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        matches!(self, Self::Positive)
    }

    /// Result label, e.g. `Positive - Parasitized`.
    #[must_use]
    pub const fn result_label(self) -> &'static str {
        match self {
            Self::Positive => "Positive - Parasitized",
            Self::Negative => "Negative - Uninfected",
        }
    }

    /// Class label, e.g. `Parasitized`.
    #[must_use]
    pub const fn class_label(self) -> &'static str {
        match self {
            Self::Positive => "Parasitized",
            Self::Negative => "Uninfected",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.result_label())
    }
}

/// Named pair of default threshold and confidence curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationProfile {
    /// Piecewise heuristic curve.
    #[default]
    Heuristic,
    /// Linear curve.
    Linear,
}

impl CalibrationProfile {
    /// Profile identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Linear => "linear",
        }
    }

    /// Decision threshold the profile was tuned for.
    #[must_use]
    pub const fn default_threshold(self) -> f64 {
        match self {
            Self::Heuristic => 0.001,
            Self::Linear => 0.5,
        }
    }

    /// Lowest confidence the profile can return at `threshold`.
    #[must_use]
    pub fn confidence_floor(self, threshold: f64) -> f64 {
        match self {
            Self::Heuristic => 70.0,
            Self::Linear => 100.0 * threshold.min(1.0 - threshold),
        }
    }

    /// Confidence percentage for `raw` given `decision`.
    #[must_use]
    pub fn confidence(self, raw: f64, threshold: f64, decision: Decision) -> f64 {
        match self {
            Self::Heuristic => heuristic_confidence(raw, threshold, decision),
            Self::Linear => linear_confidence(raw, decision),
        }
    }
}

impl fmt::Display for CalibrationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CalibrationProfile {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "linear" => Ok(Self::Linear),
            _ => Err(CalibrationError::UnknownProfile(s.to_string())),
        }
    }
}

fn heuristic_confidence(raw: f64, threshold: f64, decision: Decision) -> f64 {
    match decision {
        Decision::Positive => {
            let confidence = if raw >= 0.5 {
                95.0 + (raw - 0.5) * 10.0
            } else if raw >= 0.01 {
                80.0 + (raw - 0.01) * 30.0
            } else {
                70.0 + (raw - threshold) * 1000.0
            };
            confidence.clamp(70.0, 100.0)
        }
        Decision::Negative => (95.0 + (threshold - raw) * 5000.0).min(100.0),
    }
}

fn linear_confidence(raw: f64, decision: Decision) -> f64 {
    let confidence = match decision {
        Decision::Positive => raw * 100.0,
        Decision::Negative => (1.0 - raw) * 100.0,
    };
    confidence.clamp(0.0, 100.0)
}

/// Heuristic-profile calibration of `raw` against `threshold`.
///
/// `Positive` iff `raw > threshold`.
#[must_use]
pub fn calibrate(raw: f64, threshold: f64) -> (Decision, f64) {
    let decision = if raw > threshold {
        Decision::Positive
    } else {
        Decision::Negative
    };
    (decision, heuristic_confidence(raw, threshold, decision))
}

/// Calibrated result for one image. Values are unrounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Classifier score.
    pub raw_score: f64,
    /// Decision against the threshold.
    pub decision: Decision,
    /// Confidence percentage in `[floor, 100]`.
    pub confidence: f64,
}

/// Calibrator bound to a profile and threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibrator {
    profile: CalibrationProfile,
    threshold: f64,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::from_profile(CalibrationProfile::default())
    }
}

impl Calibrator {
    /// Create a calibrator with an explicit threshold.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidThreshold`] unless
    /// `0 <= threshold < 1`.
    pub fn new(profile: CalibrationProfile, threshold: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&threshold) {
            return Err(CalibrationError::InvalidThreshold(threshold));
        }
        Ok(Self { profile, threshold })
    }

    /// Create a calibrator with the profile's default threshold.
    #[must_use]
    pub fn from_profile(profile: CalibrationProfile) -> Self {
        Self {
            profile,
            threshold: profile.default_threshold(),
        }
    }

    /// Active profile.
    #[must_use]
    pub const fn profile(&self) -> CalibrationProfile {
        self.profile
    }

    /// Decision threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Lowest confidence this calibrator returns.
    #[must_use]
    pub fn confidence_floor(&self) -> f64 {
        self.profile.confidence_floor(self.threshold)
    }

    /// Calibrate one raw score.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::NonFiniteScore`] for NaN or infinite scores.
    pub fn calibrate(&self, raw: f64) -> Result<PredictionRecord> {
        if !raw.is_finite() {
            return Err(CalibrationError::NonFiniteScore(raw));
        }
        let decision = if raw > self.threshold {
            Decision::Positive
        } else {
            Decision::Negative
        };
        Ok(PredictionRecord {
            raw_score: raw,
            decision,
            confidence: self.profile.confidence(raw, self.threshold, decision),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_strong_positive() {
        let (decision, confidence) = calibrate(0.6, 0.001);
        assert_eq!(decision, Decision::Positive);
        assert!(approx(confidence, 96.0), "{confidence}");
    }

    #[test]
    fn test_negative() {
        let (decision, confidence) = calibrate(0.0005, 0.001);
        assert_eq!(decision, Decision::Negative);
        assert!(approx(confidence, 97.5), "{confidence}");
    }

    #[test]
    fn test_heuristic_branches() {
        // 0.01 <= raw < 0.5
        assert!(approx(calibrate(0.11, 0.001).1, 83.0));
        // raw < 0.01
        assert!(approx(calibrate(0.006, 0.001).1, 75.0));
        // raw at threshold is negative
        assert_eq!(calibrate(0.001, 0.001), (Decision::Negative, 95.0));
        // capped at 100
        assert!(approx(calibrate(0.0, 0.5).1, 100.0));
        assert!(approx(calibrate(1.0, 0.001).1, 100.0));
    }

    #[test]
    fn test_linear_profile() {
        let calibrator = Calibrator::from_profile(CalibrationProfile::Linear);
        assert_eq!(calibrator.threshold(), 0.5);

        let positive = calibrator.calibrate(0.8).unwrap();
        assert_eq!(positive.decision, Decision::Positive);
        assert!(approx(positive.confidence, 80.0));

        let negative = calibrator.calibrate(0.3).unwrap();
        assert_eq!(negative.decision, Decision::Negative);
        assert!(approx(negative.confidence, 70.0));
        assert!(approx(calibrator.confidence_floor(), 50.0));
    }

    #[test]
    fn test_threshold_validation() {
        assert!(Calibrator::new(CalibrationProfile::Heuristic, 0.0).is_ok());
        assert_eq!(
            Calibrator::new(CalibrationProfile::Heuristic, 1.0),
            Err(CalibrationError::InvalidThreshold(1.0))
        );
        assert!(Calibrator::new(CalibrationProfile::Linear, -0.1).is_err());
        assert!(Calibrator::new(CalibrationProfile::Linear, f64::NAN).is_err());
    }

    #[test]
    fn test_non_finite_score() {
        let calibrator = Calibrator::default();
        assert!(matches!(
            calibrator.calibrate(f64::NAN),
            Err(CalibrationError::NonFiniteScore(_))
        ));
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("linear".parse::<CalibrationProfile>().unwrap(), CalibrationProfile::Linear);
        assert_eq!("Heuristic".parse::<CalibrationProfile>().unwrap(), CalibrationProfile::Heuristic);
        assert!("sigmoid".parse::<CalibrationProfile>().is_err());
        assert_eq!(CalibrationProfile::Heuristic.to_string(), "heuristic");
    }

    #[test]
    fn test_labels() {
        assert_eq!(Decision::Positive.result_label(), "Positive - Parasitized");
        assert_eq!(Decision::Negative.class_label(), "Uninfected");
        assert!(!Decision::Negative.is_positive());
    }

    #[test]
    fn test_record_serde() {
        let record = Calibrator::default().calibrate(0.6).unwrap();
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["decision"], "positive");
    }

    fn profile_strategy() -> impl Strategy<Value = CalibrationProfile> {
        prop_oneof![Just(CalibrationProfile::Heuristic), Just(CalibrationProfile::Linear)]
    }

    proptest! {
        #[test]
        fn prop_confidence_within_floor_and_100(
            profile in profile_strategy(),
            threshold in 0.0f64..0.99,
            raw in 0.0f64..=1.0,
        ) {
            let calibrator = Calibrator::new(profile, threshold).unwrap();
            let record = calibrator.calibrate(raw).unwrap();
            prop_assert!(record.confidence <= 100.0);
            prop_assert!(record.confidence >= calibrator.confidence_floor() - 1e-9);
        }

        #[test]
        fn prop_positive_monotonic_in_score(
            profile in profile_strategy(),
            threshold in 0.0f64..0.99,
            a in 0.0f64..=1.0,
            b in 0.0f64..=1.0,
        ) {
            let calibrator = Calibrator::new(profile, threshold).unwrap();
            // map [0, 1] onto (threshold, 1]
            let score = |u: f64| threshold + (1.0 - threshold) * (0.001 + 0.999 * u);
            let lo = calibrator.calibrate(score(a.min(b))).unwrap();
            let hi = calibrator.calibrate(score(a.max(b))).unwrap();
            prop_assert_eq!(lo.decision, Decision::Positive);
            prop_assert!(hi.confidence >= lo.confidence - 1e-9);
        }

        #[test]
        fn prop_negative_monotonic_in_margin(
            profile in profile_strategy(),
            threshold in 0.0f64..0.99,
            a in 0.0f64..=1.0,
            b in 0.0f64..=1.0,
        ) {
            let calibrator = Calibrator::new(profile, threshold).unwrap();
            // map [0, 1] onto [0, threshold]
            let near = calibrator.calibrate(threshold * a.max(b)).unwrap();
            let far = calibrator.calibrate(threshold * a.min(b)).unwrap();
            prop_assert_eq!(near.decision, Decision::Negative);
            prop_assert!(far.confidence >= near.confidence - 1e-9);
        }
    }
}
