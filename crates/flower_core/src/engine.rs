//! Black-box classifier seam plus ranking of its output.

use crate::error::ClassifyError;
use crate::prepare::PreparedImage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// One `(label code, confidence)` pair produced by inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub label_code: String,
    /// Model confidence in [0,1].
    pub confidence: f32,
}

impl Candidate {
    pub fn new(label_code: impl Into<String>, confidence: f32) -> Self {
        Self {
            label_code: label_code.into(),
            confidence,
        }
    }
}

/// A trained image classifier.
///
/// Implementations only need to honour the input tensor contract and return
/// one candidate per class they scored; ordering is not required.
pub trait Classifier: Send + Sync {
    fn predict(&self, image: &PreparedImage) -> Result<Vec<Candidate>, ClassifyError>;
}

/// Wraps a [`Classifier`] and guarantees a non-empty, ranked result.
#[derive(Clone)]
pub struct InferenceEngine {
    classifier: Arc<dyn Classifier>,
}

impl InferenceEngine {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    /// Run the classifier and rank its candidates, best first.
    pub fn classify(&self, image: &PreparedImage) -> Result<Vec<Candidate>, ClassifyError> {
        let candidates = self.classifier.predict(image)?;
        rank(candidates)
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine").finish_non_exhaustive()
    }
}

/// Sort by descending confidence, ties by ascending label code.
///
/// Confidences are clamped to [0,1]; an empty list or a non-finite
/// confidence is an inference failure.
pub fn rank(mut candidates: Vec<Candidate>) -> Result<Vec<Candidate>, ClassifyError> {
    if candidates.is_empty() {
        return Err(ClassifyError::NoResults);
    }
    if let Some(bad) = candidates.iter().find(|c| !c.confidence.is_finite()) {
        return Err(ClassifyError::Inference(format!(
            "non-finite confidence for label {}",
            bad.label_code
        )));
    }
    for c in &mut candidates {
        c.confidence = c.confidence.clamp(0.0, 1.0);
    }
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| compare_codes(&a.label_code, &b.label_code))
    });
    Ok(candidates)
}

/// Catalog-key order: numeric when both codes are integers, else lexicographic.
pub fn compare_codes(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Maps a model output index to its label code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelCodes {
    /// Output `i` has code `first + i`.
    Sequential { first: u32 },
    /// Output `i` has the `i`-th listed code.
    Listed(Vec<String>),
}

impl Default for LabelCodes {
    fn default() -> Self {
        LabelCodes::Sequential { first: 1 }
    }
}

impl LabelCodes {
    /// Read one code per line; blank lines are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read labels: {}", path.display()))?;
        let codes: Vec<String> = raw
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect();
        if codes.is_empty() {
            anyhow::bail!("labels file contains no labels: {}", path.display());
        }
        Ok(LabelCodes::Listed(codes))
    }

    pub fn code_for(&self, index: usize) -> Option<String> {
        match self {
            LabelCodes::Sequential { first } => {
                u64::try_from(index).ok().map(|i| (u64::from(*first) + i).to_string())
            }
            LabelCodes::Listed(codes) => codes.get(index).cloned(),
        }
    }

    /// Number of outputs the codes cover, `None` when unbounded.
    pub fn len(&self) -> Option<usize> {
        match self {
            LabelCodes::Sequential { .. } => None,
            LabelCodes::Listed(codes) => Some(codes.len()),
        }
    }
}

/// Turn a raw per-class score vector into (unranked) candidates.
pub fn candidates_from_scores(
    scores: &[f32],
    codes: &LabelCodes,
    apply_softmax: bool,
) -> Result<Vec<Candidate>, ClassifyError> {
    if scores.is_empty() {
        return Err(ClassifyError::NoResults);
    }
    if let Some(expected) = codes.len()
        && expected != scores.len()
    {
        return Err(ClassifyError::Inference(format!(
            "model produced {} scores but {expected} labels are configured",
            scores.len()
        )));
    }
    let probs = if apply_softmax {
        softmax(scores)
    } else {
        scores.to_vec()
    };
    probs
        .into_iter()
        .enumerate()
        .map(|(idx, p)| {
            codes
                .code_for(idx)
                .map(|code| Candidate::new(code, p))
                .ok_or_else(|| ClassifyError::Inference(format!("no label code for output {idx}")))
        })
        .collect()
}

/// Validate a model's declared input dimensions against a prepared tensor.
/// `None` entries are dynamic and match anything.
pub fn check_input_shape(declared: &[Option<u32>], actual: &[usize]) -> Result<(), ClassifyError> {
    let mismatch = declared.len() != actual.len()
        || declared
            .iter()
            .zip(actual)
            .any(|(d, &a)| matches!(d, Some(d) if *d as usize != a));
    if mismatch {
        let declared: Vec<String> = declared
            .iter()
            .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
            .collect();
        return Err(ClassifyError::Inference(format!(
            "incompatible input shape: model expects [{}], got {actual:?}",
            declared.join(", ")
        )));
    }
    Ok(())
}

pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|x| x / sum).collect()
}
