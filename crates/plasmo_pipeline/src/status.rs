//! Health report.

use plasmo_analysis::CalibrationProfile;
use serde::{Deserialize, Serialize};

/// Snapshot of a pipeline's configuration, for health checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Always `healthy` for a constructed pipeline.
    pub status: String,
    /// A classifier is in place.
    pub model_loaded: bool,
    /// Trained weights were loaded rather than randomly initialized.
    pub weights_loaded: bool,
    /// Architecture label.
    pub model_type: String,
    /// Explained layer.
    pub target_layer: String,
    /// Index path of the explained layer, e.g. `0/15`.
    pub target_path: String,
    /// Active calibration profile.
    pub calibration_profile: CalibrationProfile,
    /// Decision threshold.
    pub threshold: f64,
    /// Explanation worker threads.
    pub workers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_fields() {
        let report = StatusReport {
            status: "healthy".to_string(),
            model_loaded: true,
            weights_loaded: false,
            model_type: "vgg19".to_string(),
            target_layer: "block5_conv3".to_string(),
            target_path: "0/18".to_string(),
            calibration_profile: CalibrationProfile::Heuristic,
            threshold: 0.001,
            workers: 4,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["calibration_profile"], "heuristic");
        assert_eq!(json["threshold"], 0.001);
        assert_eq!(json["target_layer"], "block5_conv3");
    }
}
