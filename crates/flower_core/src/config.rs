use crate::catalog::LabelCatalog;
use crate::prepare::PrepareConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level settings, read from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// JSON code->name catalog; the builtin catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
    pub classifier: ClassifierConfig,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read config: {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&raw).with_context(|| format!("invalid config: {}", path.display()))?;
        config.classifier.validate()?;
        Ok(config)
    }

    pub fn catalog(&self) -> Result<LabelCatalog> {
        match &self.catalog_path {
            Some(path) => LabelCatalog::from_json_file(path),
            None => Ok(LabelCatalog::builtin()),
        }
    }
}

/// Configuration for the image classifier and its input pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    /// One label code per model output; codes count up from
    /// `first_label_code` when unset.
    pub labels_path: Option<PathBuf>,
    pub first_label_code: u32,
    /// Set to false when the model already emits probabilities.
    pub apply_softmax: bool,
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let prepare = PrepareConfig::default();
        Self {
            model_path: PathBuf::from("models/flower_classifier.onnx"),
            labels_path: None,
            first_label_code: 1,
            apply_softmax: true,
            input_size: prepare.input_size,
            mean: prepare.mean,
            std: prepare.std,
        }
    }
}

impl ClassifierConfig {
    pub fn prepare_config(&self) -> PrepareConfig {
        PrepareConfig {
            input_size: self.input_size,
            mean: self.mean,
            std: self.std,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            anyhow::bail!("classifier.input_size must be positive");
        }
        if self.std.iter().any(|s| *s <= 0.0 || !s.is_finite()) {
            anyhow::bail!("classifier.std entries must be positive: {:?}", self.std);
        }
        Ok(())
    }
}
