use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure category published with a `Failed` outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The submitted bytes are not a decodable image.
    DecodeFailure,
    /// The classifier model could not be constructed or loaded.
    ModelLoadFailure,
    /// The forward pass failed or produced no usable result.
    InferenceFailure,
}

/// Error raised by a single classification attempt.
///
/// The `Display` text is what observers show to the user.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Could not create image for analysis: {0}")]
    Decode(String),

    #[error("Could not load the flower classifier: {0}")]
    ModelLoad(String),

    #[error("Classification failed: {0}")]
    Inference(String),

    #[error("Could not get classification results.")]
    NoResults,
}

impl ClassifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassifyError::Decode(_) => ErrorKind::DecodeFailure,
            ClassifyError::ModelLoad(_) => ErrorKind::ModelLoadFailure,
            ClassifyError::Inference(_) | ClassifyError::NoResults => ErrorKind::InferenceFailure,
        }
    }
}

impl From<image::ImageError> for ClassifyError {
    fn from(e: image::ImageError) -> Self {
        ClassifyError::Decode(e.to_string())
    }
}
