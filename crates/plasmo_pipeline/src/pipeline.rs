//! Pipeline construction and shared state.

use burn::module::Module;
use burn::tensor::backend::AutodiffBackend;
use plasmo_analysis::Calibrator;
use plasmo_core::ImageCodec;
use plasmo_explain::Explainer;
use plasmo_models::{load_model, Classifier};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pool::WorkerPool;
use crate::status::StatusReport;

/// Classifier, explainer and calibrator wired together.
///
/// Construction resolves the target layer once; a missing layer is a
/// startup error. After construction every handle is read-only, so one
/// pipeline serves any number of [`predict`](Pipeline::predict) and
/// [`run_batch`](Pipeline::run_batch) calls.
#[derive(Debug)]
pub struct Pipeline<B: AutodiffBackend> {
    pub(crate) config: PipelineConfig,
    pub(crate) codec: ImageCodec,
    pub(crate) classifier: Classifier<B>,
    pub(crate) explainer: Explainer<B>,
    pub(crate) calibrator: Calibrator,
    pub(crate) pool: WorkerPool,
    pub(crate) device: B::Device,
    weights_loaded: bool,
}

impl<B: AutodiffBackend> Pipeline<B> {
    /// Build the reference classifier described by `config`.
    ///
    /// Loads `config.weights` when set; otherwise the classifier keeps its
    /// random initialization (seeded by `config.seed`).
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid config, unreadable weights or a
    /// target layer the classifier does not contain.
    pub fn new(config: PipelineConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        if let Some(seed) = config.seed {
            B::seed(seed);
        }

        let model = config.model.init::<B>(&device);
        let (model, weights_loaded) = match &config.weights {
            Some(path) => (load_model(model, path, &device)?, true),
            None => {
                tracing::warn!("no weights configured, classifier is randomly initialized");
                (model, false)
            }
        };

        let graph = model.no_grad().into_graph(&config.model)?;
        let classifier = Classifier::new(graph, config.model.backbone_name.clone())?;
        Self::assemble(config, classifier, weights_loaded, device)
    }

    /// Wrap an already-built classifier.
    ///
    /// `config.model` and `config.weights` are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid config or a missing target layer.
    pub fn from_classifier(
        config: PipelineConfig,
        classifier: Classifier<B>,
        device: B::Device,
    ) -> Result<Self> {
        config.overlay.validate()?;
        Self::assemble(config, classifier, true, device)
    }

    fn assemble(
        config: PipelineConfig,
        classifier: Classifier<B>,
        weights_loaded: bool,
        device: B::Device,
    ) -> Result<Self> {
        let calibrator = config.calibration.calibrator()?;
        let explainer = Explainer::new(classifier.explanation_ready(), config.target_layer.clone())?;
        let pool = WorkerPool::new(config.worker_count())?;

        tracing::info!(
            model = classifier.model_type(),
            target_layer = %config.target_layer,
            path = %explainer.path(),
            profile = %calibrator.profile(),
            threshold = calibrator.threshold(),
            workers = pool.workers(),
            "pipeline ready"
        );

        Ok(Self {
            codec: ImageCodec::new(config.codec.clone()),
            config,
            classifier,
            explainer,
            calibrator,
            pool,
            device,
            weights_loaded,
        })
    }

    /// Configuration the pipeline was built from.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Inference-ready classifier.
    pub fn classifier(&self) -> &Classifier<B> {
        &self.classifier
    }

    /// Explainer bound to the target layer.
    pub fn explainer(&self) -> &Explainer<B> {
        &self.explainer
    }

    /// Active calibrator.
    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    /// Image codec.
    pub fn codec(&self) -> &ImageCodec {
        &self.codec
    }

    /// Check if trained weights were loaded.
    pub fn weights_loaded(&self) -> bool {
        self.weights_loaded
    }

    /// Health report.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            status: "healthy".to_string(),
            model_loaded: true,
            weights_loaded: self.weights_loaded,
            model_type: self.classifier.model_type().to_string(),
            target_layer: self.explainer.layer().to_string(),
            target_path: self.explainer.path().to_string(),
            calibration_profile: self.calibrator.profile(),
            threshold: self.calibrator.threshold(),
            workers: self.pool.workers(),
        }
    }
}
