//! Runs preparation and inference off the caller's thread and publishes the
//! outcome of the most recent submission.

use crate::catalog::LabelCatalog;
use crate::engine::{Classifier, InferenceEngine};
use crate::error::ClassifyError;
use crate::prepare::ImagePreparer;
use crate::state::{ClassificationOutcome, ResultState, SubmissionId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Best guess for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub display_label: String,
    pub confidence: f32,
}

impl From<Result<Prediction, ClassifyError>> for ClassificationOutcome {
    fn from(result: Result<Prediction, ClassifyError>) -> Self {
        match result {
            Ok(p) => ClassificationOutcome::Succeeded {
                display_label: p.display_label,
                confidence: p.confidence,
            },
            Err(e) => ClassificationOutcome::Failed {
                reason: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

struct Pipeline {
    preparer: ImagePreparer,
    engine: InferenceEngine,
    catalog: LabelCatalog,
}

impl Pipeline {
    fn run(&self, bytes: &[u8]) -> Result<Prediction, ClassifyError> {
        let image = self.preparer.prepare(bytes)?;
        let candidates = self.engine.classify(&image)?;
        let top = candidates.first().ok_or(ClassifyError::NoResults)?;
        Ok(Prediction {
            display_label: self.catalog.lookup(&top.label_code).to_string(),
            confidence: top.confidence,
        })
    }
}

/// Decrements the in-flight counter when the worker finishes.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Accepts image submissions and drives them to a published outcome.
pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    state: ResultState,
    in_flight: Arc<AtomicUsize>,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        catalog: LabelCatalog,
        preparer: ImagePreparer,
    ) -> Self {
        Self::with_state(classifier, catalog, preparer, ResultState::new())
    }

    /// Publish into an existing, possibly already observed, state.
    pub fn with_state(
        classifier: Arc<dyn Classifier>,
        catalog: LabelCatalog,
        preparer: ImagePreparer,
        state: ResultState,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                preparer,
                engine: InferenceEngine::new(classifier),
                catalog,
            }),
            state,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> &ResultState {
        &self.state
    }

    /// Workers that have not finished yet, superseded ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Classify `bytes` in the background.
    ///
    /// The state is `Running` when this returns. Exactly one terminal
    /// outcome follows, unless a later `submit` or `clear` supersedes it.
    pub fn submit(&self, bytes: impl Into<Vec<u8>>) -> SubmissionId {
        let bytes = bytes.into();
        let id = self.state.begin();
        let guard = InFlight::enter(&self.in_flight);
        let pipeline = Arc::clone(&self.pipeline);
        let state = self.state.clone();

        let spawned = thread::Builder::new()
            .name(format!("flower-classify-{}", id.0))
            .spawn(move || {
                let _guard = guard;
                let result = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&bytes)))
                    .unwrap_or_else(|_| {
                        Err(ClassifyError::Inference("classifier panicked".into()))
                    });
                finish(&state, id, result);
            });

        if let Err(e) = spawned {
            tracing::error!(submission = %id, "could not start classification worker: {e}");
            finish(
                &self.state,
                id,
                Err(ClassifyError::Inference(format!(
                    "could not start classification worker: {e}"
                ))),
            );
        }
        id
    }

    /// Explicit user reset back to `Idle`.
    pub fn clear(&self) {
        self.state.reset();
    }
}

/// Settle `id` and log the outcome only if it was actually published.
fn finish(
    state: &ResultState,
    id: SubmissionId,
    result: Result<Prediction, ClassifyError>,
) -> bool {
    let summary = match &result {
        Ok(p) => format!("{} ({:.3})", p.display_label, p.confidence),
        Err(e) => format!("{:?}: {e}", e.kind()),
    };
    let succeeded = result.is_ok();
    let published = state.settle(id, result.into());
    match (published, succeeded) {
        (false, _) => {}
        (true, true) => {
            tracing::info!(submission = %id, result = %summary, "classification succeeded")
        }
        (true, false) => {
            tracing::warn!(submission = %id, result = %summary, "classification failed")
        }
    }
    published
}
