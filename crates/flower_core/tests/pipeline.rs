use anyhow::{Result, anyhow};
use flower_core::{
    Candidate, ClassificationOutcome, Classifier, ClassifyError, ErrorKind, ImagePreparer,
    InferenceEngine, LabelCatalog, Orchestrator, PrepareConfig, PreparedImage, ResultState,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Axis;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

const RED: [u8; 3] = [255, 0, 0];
const GREEN: [u8; 3] = [0, 255, 0];
const BLUE: [u8; 3] = [0, 0, 255];

fn photo(rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(16, 16, Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("in-memory encode");
    out.into_inner()
}

fn catalog() -> LabelCatalog {
    LabelCatalog::from_pairs([("1", "daisy"), ("2", "tulip"), ("74", "rose")])
}

fn preparer() -> ImagePreparer {
    ImagePreparer::new(PrepareConfig {
        input_size: 8,
        ..PrepareConfig::default()
    })
}

/// Index of the colour channel with the highest mean.
fn dominant_channel(image: &PreparedImage) -> usize {
    let tensor = image.tensor();
    (0..3)
        .map(|c| {
            let mean = tensor.index_axis(Axis(1), c).mean().unwrap_or(f32::MIN);
            (c, mean)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c)
        .unwrap_or(0)
}

type Predicted = std::result::Result<Vec<Candidate>, ClassifyError>;
type Reply = std::result::Result<Vec<Candidate>, fn() -> ClassifyError>;

/// Answers by dominant colour; a gated colour blocks until released.
#[derive(Default)]
struct ScriptedClassifier {
    replies: HashMap<usize, Reply>,
    gates: HashMap<usize, Mutex<Receiver<()>>>,
}

impl ScriptedClassifier {
    fn reply(mut self, channel: usize, candidates: Vec<Candidate>) -> Self {
        self.replies.insert(channel, Ok(candidates));
        self
    }

    fn fail(mut self, channel: usize, err: fn() -> ClassifyError) -> Self {
        self.replies.insert(channel, Err(err));
        self
    }

    fn gate(mut self, channel: usize) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gates.insert(channel, Mutex::new(rx));
        (self, tx)
    }
}

impl Classifier for ScriptedClassifier {
    fn predict(&self, image: &PreparedImage) -> Predicted {
        let channel = dominant_channel(image);
        if let Some(gate) = self.gates.get(&channel) {
            let rx = gate.lock().map_err(|_| ClassifyError::Inference("gate".into()))?;
            rx.recv_timeout(TIMEOUT)
                .map_err(|_| ClassifyError::Inference("gate never released".into()))?;
        }
        match self.replies.get(&channel) {
            Some(Ok(candidates)) => Ok(candidates.clone()),
            Some(Err(make)) => Err(make()),
            None => Ok(Vec::new()),
        }
    }
}

struct Panicky;

impl Classifier for Panicky {
    fn predict(&self, _image: &PreparedImage) -> Predicted {
        panic!("model exploded");
    }
}

fn orchestrator(classifier: impl Classifier + 'static) -> Orchestrator {
    Orchestrator::new(Arc::new(classifier), catalog(), preparer())
}

/// Receive outcomes until one matches, failing after `TIMEOUT`.
fn wait_for(
    rx: &Receiver<ClassificationOutcome>,
    pred: impl Fn(&ClassificationOutcome) -> bool,
) -> Result<ClassificationOutcome> {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let outcome = rx
            .recv_timeout(left)
            .map_err(|e| anyhow!("no matching outcome: {e}"))?;
        if pred(&outcome) {
            return Ok(outcome);
        }
    }
}

fn wait_idle(orch: &Orchestrator) -> Result<()> {
    wait_in_flight(orch, 0)
}

/// Poll until at most `workers` submissions are still running.
fn wait_in_flight(orch: &Orchestrator, workers: usize) -> Result<()> {
    let deadline = Instant::now() + TIMEOUT;
    while orch.in_flight() > workers {
        if Instant::now() > deadline {
            anyhow::bail!("workers still running");
        }
        thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

fn succeeded(label: &str, confidence: f32) -> ClassificationOutcome {
    ClassificationOutcome::Succeeded {
        display_label: label.into(),
        confidence,
    }
}

#[test]
fn rose_photo_succeeds_with_raw_confidence() -> Result<()> {
    let orch = orchestrator(ScriptedClassifier::default().reply(
        0,
        vec![Candidate::new("1", 0.05), Candidate::new("74", 0.87)],
    ));
    let rx = orch.state().subscribe();
    orch.submit(photo(RED));
    assert_eq!(rx.recv_timeout(TIMEOUT)?, ClassificationOutcome::Running);
    let outcome = wait_for(&rx, ClassificationOutcome::is_terminal)?;
    assert_eq!(outcome, succeeded("rose", 0.87));
    assert_eq!(orch.state().current(), succeeded("rose", 0.87));
    Ok(())
}

#[test]
fn submit_sets_running_before_returning() -> Result<()> {
    let (classifier, release) = ScriptedClassifier::default()
        .reply(0, vec![Candidate::new("74", 0.9)])
        .gate(0);
    let orch = orchestrator(classifier);
    let id = orch.submit(photo(RED));
    assert_eq!(orch.state().current(), ClassificationOutcome::Running);
    assert_eq!(orch.state().latest(), Some(id));
    release.send(())?;
    wait_idle(&orch)?;
    assert_eq!(orch.state().current(), succeeded("rose", 0.9));
    Ok(())
}

#[test]
fn empty_buffer_fails_with_decode_failure() -> Result<()> {
    let orch = orchestrator(ScriptedClassifier::default());
    let rx = orch.state().subscribe();
    orch.submit(Vec::new());
    let outcome = wait_for(&rx, ClassificationOutcome::is_terminal)?;
    match outcome {
        ClassificationOutcome::Failed { reason, message } => {
            assert_eq!(reason, ErrorKind::DecodeFailure);
            assert!(message.starts_with("Could not create image for analysis"));
        }
        other => anyhow::bail!("expected failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn undecodable_bytes_never_succeed() -> Result<()> {
    let orch =
        orchestrator(ScriptedClassifier::default().reply(0, vec![Candidate::new("1", 1.0)]));
    let rx = orch.state().subscribe();
    let mut truncated = photo(RED);
    truncated.truncate(truncated.len() / 3);
    for bytes in [b"GIF89a nonsense".to_vec(), truncated, vec![0u8; 64]] {
        orch.submit(bytes);
        let outcome = wait_for(&rx, ClassificationOutcome::is_terminal)?;
        assert!(matches!(
            outcome,
            ClassificationOutcome::Failed {
                reason: ErrorKind::DecodeFailure,
                ..
            }
        ));
    }
    Ok(())
}

#[test]
fn later_submission_wins_when_earlier_finishes_last() -> Result<()> {
    let (classifier, release_a) = ScriptedClassifier::default()
        .reply(0, vec![Candidate::new("1", 0.9)])
        .reply(1, vec![Candidate::new("2", 0.7)])
        .gate(0);
    let orch = orchestrator(classifier);
    let rx = orch.state().subscribe();

    let a = orch.submit(photo(RED));
    let b = orch.submit(photo(GREEN));
    assert!(b > a);

    wait_for(&rx, |o| *o == succeeded("tulip", 0.7))?;
    release_a.send(())?;
    wait_idle(&orch)?;

    assert_eq!(orch.state().current(), succeeded("tulip", 0.7));
    let late: Vec<_> = rx.try_iter().collect();
    assert!(late.is_empty(), "stale outcome leaked: {late:?}");
    Ok(())
}

#[test]
fn later_submission_wins_when_earlier_finishes_first() -> Result<()> {
    let (classifier, release_a) = ScriptedClassifier::default()
        .reply(0, vec![Candidate::new("1", 0.9)])
        .reply(1, vec![Candidate::new("2", 0.7)])
        .gate(0);
    let (classifier, release_b) = classifier.gate(1);
    let orch = orchestrator(classifier);

    orch.submit(photo(RED));
    orch.submit(photo(GREEN));
    let rx = orch.state().subscribe();

    release_a.send(())?;
    wait_in_flight(&orch, 1)?;
    assert_eq!(orch.state().current(), ClassificationOutcome::Running);
    let early: Vec<_> = rx.try_iter().collect();
    assert!(early.is_empty(), "superseded outcome published: {early:?}");

    release_b.send(())?;
    let outcome = wait_for(&rx, ClassificationOutcome::is_terminal)?;
    assert_eq!(outcome, succeeded("tulip", 0.7));
    wait_idle(&orch)?;
    assert_eq!(orch.state().current(), succeeded("tulip", 0.7));
    Ok(())
}

#[test]
fn orchestrator_publishes_into_pre_observed_state() -> Result<()> {
    let state = ResultState::new();
    let rx = state.subscribe();
    let orch = Orchestrator::with_state(
        Arc::new(ScriptedClassifier::default().reply(0, vec![Candidate::new("74", 0.87)])),
        catalog(),
        preparer(),
        state.clone(),
    );
    orch.submit(photo(RED));
    assert_eq!(rx.recv_timeout(TIMEOUT)?, ClassificationOutcome::Running);
    let outcome = wait_for(&rx, ClassificationOutcome::is_terminal)?;
    assert_eq!(outcome, succeeded("rose", 0.87));
    assert_eq!(state.current(), succeeded("rose", 0.87));
    Ok(())
}

#[test]
fn unknown_code_degrades_to_unknown_label() -> Result<()> {
    let orch = orchestrator(ScriptedClassifier::default().reply(
        2,
        vec![Candidate::new("999", 0.64), Candidate::new("74", 0.2)],
    ));
    let rx = orch.state().subscribe();
    orch.submit(photo(BLUE));
    let outcome = wait_for(&rx, ClassificationOutcome::is_terminal)?;
    assert_eq!(outcome, succeeded("Unknown", 0.64));
    Ok(())
}

#[test]
fn zero_candidates_is_inference_failure() -> Result<()> {
    let orch = orchestrator(ScriptedClassifier::default());
    let rx = orch.state().subscribe();
    orch.submit(photo(RED));
    let outcome = wait_for(&rx, ClassificationOutcome::is_terminal)?;
    assert_eq!(
        outcome,
        ClassificationOutcome::Failed {
            reason: ErrorKind::InferenceFailure,
            message: "Could not get classification results.".into(),
        }
    );
    Ok(())
}

#[test]
fn model_errors_fail_only_the_current_submission() -> Result<()> {
    let orch = orchestrator(
        ScriptedClassifier::default()
            .fail(0, || ClassifyError::ModelLoad("model file missing".into()))
            .reply(1, vec![Candidate::new("2", 0.55)]),
    );
    let rx = orch.state().subscribe();

    orch.submit(photo(RED));
    let outcome = wait_for(&rx, ClassificationOutcome::is_terminal)?;
    assert!(matches!(
        outcome,
        ClassificationOutcome::Failed {
            reason: ErrorKind::ModelLoadFailure,
            ..
        }
    ));

    orch.submit(photo(GREEN));
    let outcome = wait_for(&rx, ClassificationOutcome::is_terminal)?;
    assert_eq!(outcome, succeeded("tulip", 0.55));
    Ok(())
}

#[test]
fn panicking_classifier_is_reported_as_inference_failure() -> Result<()> {
    let orch = orchestrator(Panicky);
    let rx = orch.state().subscribe();
    orch.submit(photo(RED));
    let outcome = wait_for(&rx, ClassificationOutcome::is_terminal)?;
    assert!(matches!(
        outcome,
        ClassificationOutcome::Failed {
            reason: ErrorKind::InferenceFailure,
            ..
        }
    ));
    wait_idle(&orch)?;
    Ok(())
}

#[test]
fn clear_returns_to_idle_and_drops_in_flight_result() -> Result<()> {
    let (classifier, release) = ScriptedClassifier::default()
        .reply(0, vec![Candidate::new("74", 0.9)])
        .gate(0);
    let orch = orchestrator(classifier);
    orch.submit(photo(RED));
    orch.clear();
    assert_eq!(orch.state().current(), ClassificationOutcome::Idle);
    release.send(())?;
    wait_idle(&orch)?;
    assert_eq!(orch.state().current(), ClassificationOutcome::Idle);
    Ok(())
}

#[test]
fn prepared_images_rank_non_empty_and_descending() -> Result<()> {
    let classifier = ScriptedClassifier::default().reply(
        0,
        vec![
            Candidate::new("3", 0.2),
            Candidate::new("1", 0.5),
            Candidate::new("2", 0.3),
        ],
    );
    let engine = InferenceEngine::new(Arc::new(classifier));
    let image = preparer().prepare(&photo(RED))?;
    let ranked = engine.classify(&image)?;
    assert!(!ranked.is_empty());
    assert!(ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    assert_eq!(ranked[0].label_code, "1");
    Ok(())
}
