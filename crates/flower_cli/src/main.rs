use anyhow::{Context, Result};
use clap::Parser;
use flower_core::display::render;
use flower_core::{AppConfig, ClassificationOutcome, ImagePreparer, OnnxClassifier, Orchestrator};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Identify the flower in a photo.
#[derive(Debug, Parser)]
#[command(name = "flowerscan", version = env!("FLOWERSCAN_VERSION"), about)]
struct Cli {
    /// Photo to classify (any format the decoder recognises).
    image: PathBuf,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// ONNX model, overriding the configured path.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Print each outcome as a JSON line.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("flowerscan: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Classify one image and print every observed outcome. Returns whether
/// classification succeeded.
fn run(cli: &Cli) -> Result<bool> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(model) = &cli.model {
        config.classifier.model_path = model.clone();
    }
    let catalog = config.catalog()?;
    let preparer = ImagePreparer::new(config.classifier.prepare_config());
    let classifier = OnnxClassifier::new(config.classifier);
    let orchestrator = Orchestrator::new(Arc::new(classifier), catalog, preparer);

    let updates = orchestrator.state().subscribe();
    let bytes = fs::read(&cli.image)
        .with_context(|| format!("cannot read image: {}", cli.image.display()))?;
    let id = orchestrator.submit(bytes);
    tracing::debug!(submission = %id, image = %cli.image.display(), "submitted");

    for outcome in updates.iter() {
        print_outcome(&outcome, cli.json)?;
        if outcome.is_terminal() {
            return Ok(matches!(outcome, ClassificationOutcome::Succeeded { .. }));
        }
    }
    anyhow::bail!("classification state closed before a result was published")
}

fn print_outcome(outcome: &ClassificationOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(outcome)?);
    } else {
        println!("{}", render(outcome));
    }
    Ok(())
}
