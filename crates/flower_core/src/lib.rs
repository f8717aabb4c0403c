//! Flower photo classification core.
//!
//! Encoded image bytes are prepared into a classifier tensor, run through a
//! black-box [`Classifier`] on a worker thread, mapped to a species name via
//! the [`LabelCatalog`], and published to observers through [`ResultState`].
//! Only the most recent submission's outcome is ever observable.

pub mod catalog;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
#[cfg(feature = "ort")]
pub mod onnx;
pub mod orchestrator;
pub mod prepare;
pub mod state;

pub use catalog::{LabelCatalog, UNKNOWN_LABEL};
pub use config::{AppConfig, ClassifierConfig};
pub use engine::{Candidate, Classifier, InferenceEngine, LabelCodes};
pub use error::{ClassifyError, ErrorKind};
#[cfg(feature = "ort")]
pub use onnx::OnnxClassifier;
pub use orchestrator::{Orchestrator, Prediction};
pub use prepare::{ImagePreparer, PrepareConfig, PreparedImage};
pub use state::{ClassificationOutcome, ResultState, SubmissionId};
