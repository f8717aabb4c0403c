//! ONNX Runtime backed classifier.

use crate::config::ClassifierConfig;
use crate::engine::{Candidate, Classifier, LabelCodes, candidates_from_scores, check_input_shape};
use crate::error::ClassifyError;
use crate::prepare::PreparedImage;
use ndarray::CowArray;
use once_cell::sync::Lazy;
use ort::{
    GraphOptimizationLevel, SessionBuilder, environment::Environment, session::Session,
    tensor::OrtOwnedTensor, value::Value,
};
use std::sync::{Arc, Mutex, PoisonError};

static ORT_ENV: Lazy<Result<Arc<Environment>, String>> = Lazy::new(|| {
    Environment::builder()
        .with_name("flowerscan")
        .build()
        .map(|env| env.into_arc())
        .map_err(|e| format!("failed to initialize ONNX Runtime environment: {e}"))
});

/// Process-wide ONNX Runtime environment, shared by every model load.
fn ort_environment() -> Result<Arc<Environment>, ClassifyError> {
    ORT_ENV.clone().map_err(ClassifyError::ModelLoad)
}

/// Classifier backed by an ONNX model, loaded on first use.
///
/// The session is cached after a successful load and shared read-only by
/// every later prediction. A failed load is retried on the next call.
pub struct OnnxClassifier {
    config: ClassifierConfig,
    model: Mutex<Option<Arc<OnnxModel>>>,
}

struct OnnxModel {
    session: Session,
    codes: LabelCodes,
    input_dims: Vec<Option<u32>>,
}

impl OnnxClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            model: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Load the model now instead of on the first prediction.
    pub fn warm_up(&self) -> Result<(), ClassifyError> {
        self.model().map(|_| ())
    }

    fn model(&self) -> Result<Arc<OnnxModel>, ClassifyError> {
        let mut slot = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        let model = Arc::new(OnnxModel::load(&self.config)?);
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }
}

impl OnnxModel {
    fn load(cfg: &ClassifierConfig) -> Result<Self, ClassifyError> {
        if !cfg.model_path.exists() {
            return Err(ClassifyError::ModelLoad(format!(
                "model file missing: {}",
                cfg.model_path.display()
            )));
        }
        let codes = match &cfg.labels_path {
            Some(path) => LabelCodes::from_file(path)
                .map_err(|e| ClassifyError::ModelLoad(format!("{e:#}")))?,
            None => LabelCodes::Sequential {
                first: cfg.first_label_code,
            },
        };
        let load_err = |e: ort::OrtError| ClassifyError::ModelLoad(e.to_string());
        let env = ort_environment()?;
        let session = SessionBuilder::new(&env)
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .map_err(load_err)?
            .with_model_from_file(&cfg.model_path)
            .map_err(load_err)?;
        let input_dims = session
            .inputs
            .first()
            .map(|input| input.dimensions.clone())
            .ok_or_else(|| ClassifyError::ModelLoad("model declares no inputs".into()))?;
        tracing::info!(
            model = %cfg.model_path.display(),
            inputs = ?input_dims,
            "flower classifier loaded"
        );
        Ok(Self {
            session,
            codes,
            input_dims,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, image: &PreparedImage) -> Result<Vec<Candidate>, ClassifyError> {
        let model = self.model()?;
        check_input_shape(&model.input_dims, image.shape())?;

        let run_err = |e: ort::OrtError| ClassifyError::Inference(e.to_string());
        let cow = CowArray::from(image.tensor().view().into_dyn());
        let input = Value::from_array(model.session.allocator(), &cow)
            .map_err(|e| {
                ClassifyError::Inference(format!("could not build input tensor: {e}"))
            })?;
        let outputs: Vec<Value> = model.session.run(vec![input]).map_err(run_err)?;
        let first = outputs.first().ok_or(ClassifyError::NoResults)?;
        let logits: OrtOwnedTensor<f32, _> = first.try_extract().map_err(run_err)?;
        let scores: Vec<f32> = logits.view().iter().cloned().collect();
        candidates_from_scores(&scores, &model.codes, self.config.apply_softmax)
    }
}
