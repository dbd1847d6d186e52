//! # plasmo
//!
//! Malaria blood-smear classification with gradient-weighted explanations.
//!
//! plasmo-rs classifies thin-smear cell images as parasitized or uninfected
//! and shows where the evidence for each decision lies:
//!
//! - **Codec**: decode any raster image into a fixed-size `[0, 1]` array
//! - **Models**: nested named graphs over Burn, a VGG-style reference
//!   classifier, weight checkpoints
//! - **Explain**: feature capture, Presence/Absence importance maps, JET
//!   heatmap overlays
//! - **Analysis**: confidence calibration with selectable profiles
//! - **Pipeline**: single and batch prediction with per-item failure
//!   isolation, JSON response shapes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plasmo::prelude::*;
//!
//! let config = PipelineConfig::default().with_weights("weights/vgg19.mpk");
//! let pipeline = Pipeline::<DefaultBackend>::new(config, Default::default())?;
//!
//! let prediction = pipeline.predict(&std::fs::read("cell.png")?)?;
//! println!("{}", prediction.record.decision);
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray, with autodiff

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub use plasmo_analysis as analysis;
pub use plasmo_core as core;
pub use plasmo_explain as explain;
pub use plasmo_models as models;
pub use plasmo_pipeline as pipeline;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use plasmo::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use plasmo_core::{CodecConfig, CoreError, DecodedImage, ImageBatch, ImageCodec};

    // Models
    pub use plasmo_models::{Classifier, Graph, ModelError, OutputActivation, VggConfig};

    // Explain
    pub use plasmo_explain::{ExplanationMode, Explainer, ImportanceMap, OverlayConfig};

    // Analysis
    pub use plasmo_analysis::{CalibrationProfile, Calibrator, Decision, PredictionRecord};

    // Pipeline
    pub use plasmo_pipeline::{
        BatchResponse, BatchResult, Pipeline, PipelineConfig, PipelineError, Prediction,
        PredictionResponse,
    };

    #[cfg(feature = "backend-ndarray")]
    pub use plasmo_core::backend::DefaultBackend;
}

/// All module for importing everything.
pub mod all {
    pub use super::prelude::*;

    pub use plasmo_core::backend;
    pub use plasmo_explain::{composite, explain, FeatureCapture, OverlayArtifact, OverlayFormat};
    pub use plasmo_models::{
        load_model, locate, save_model, Activations, ExplainableClassifier, GraphScope, Layer,
        Location, NodePath, VggNet,
    };
    pub use plasmo_pipeline::{AggregateSummary, ItemOutcome, StatusReport, WorkerPool};
}
