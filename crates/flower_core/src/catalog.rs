//! Mapping from classifier label codes to species names.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Name returned for codes the catalog does not know.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Oxford 102 flower categories, keyed by the 1-based class code.
const OXFORD_FLOWERS: &[(&str, &str)] = &[
    ("1", "pink primrose"),
    ("2", "hard-leaved pocket orchid"),
    ("3", "canterbury bells"),
    ("4", "sweet pea"),
    ("5", "english marigold"),
    ("6", "tiger lily"),
    ("7", "moon orchid"),
    ("8", "bird of paradise"),
    ("9", "monkshood"),
    ("10", "globe thistle"),
    ("11", "snapdragon"),
    ("12", "colt's foot"),
    ("13", "king protea"),
    ("14", "spear thistle"),
    ("15", "yellow iris"),
    ("16", "globe-flower"),
    ("17", "purple coneflower"),
    ("18", "peruvian lily"),
    ("19", "balloon flower"),
    ("20", "giant white arum lily"),
    ("21", "fire lily"),
    ("22", "pincushion flower"),
    ("23", "fritillary"),
    ("24", "red ginger"),
    ("25", "grape hyacinth"),
    ("26", "corn poppy"),
    ("27", "prince of wales feathers"),
    ("28", "stemless gentian"),
    ("29", "artichoke"),
    ("30", "sweet william"),
    ("31", "carnation"),
    ("32", "garden phlox"),
    ("33", "love in the mist"),
    ("34", "mexican aster"),
    ("35", "alpine sea holly"),
    ("36", "ruby-lipped cattleya"),
    ("37", "cape flower"),
    ("38", "great masterwort"),
    ("39", "siam tulip"),
    ("40", "lenten rose"),
    ("41", "barbeton daisy"),
    ("42", "daffodil"),
    ("43", "sword lily"),
    ("44", "poinsettia"),
    ("45", "bolero deep blue"),
    ("46", "wallflower"),
    ("47", "marigold"),
    ("48", "buttercup"),
    ("49", "oxeye daisy"),
    ("50", "common dandelion"),
    ("51", "petunia"),
    ("52", "wild pansy"),
    ("53", "primula"),
    ("54", "sunflower"),
    ("55", "pelargonium"),
    ("56", "bishop of llandaff"),
    ("57", "gaura"),
    ("58", "geranium"),
    ("59", "orange dahlia"),
    ("60", "pink-yellow dahlia"),
    ("61", "cautleya spicata"),
    ("62", "japanese anemone"),
    ("63", "black-eyed susan"),
    ("64", "silverbush"),
    ("65", "californian poppy"),
    ("66", "osteospermum"),
    ("67", "spring crocus"),
    ("68", "bearded iris"),
    ("69", "windflower"),
    ("70", "tree poppy"),
    ("71", "gazania"),
    ("72", "azalea"),
    ("73", "water lily"),
    ("74", "rose"),
    ("75", "thorn apple"),
    ("76", "morning glory"),
    ("77", "passion flower"),
    ("78", "lotus"),
    ("79", "toad lily"),
    ("80", "anthurium"),
    ("81", "frangipani"),
    ("82", "clematis"),
    ("83", "hibiscus"),
    ("84", "columbine"),
    ("85", "desert-rose"),
    ("86", "tree mallow"),
    ("87", "magnolia"),
    ("88", "cyclamen"),
    ("89", "watercress"),
    ("90", "canna lily"),
    ("91", "hippeastrum"),
    ("92", "bee balm"),
    ("93", "ball moss"),
    ("94", "foxglove"),
    ("95", "bougainvillea"),
    ("96", "camellia"),
    ("97", "mallow"),
    ("98", "mexican petunia"),
    ("99", "bromelia"),
    ("100", "blanket flower"),
    ("101", "trumpet creeper"),
    ("102", "blackberry lily"),
];

static BUILTIN: Lazy<LabelCatalog> =
    Lazy::new(|| LabelCatalog::from_pairs(OXFORD_FLOWERS.iter().copied()));

/// Static lookup table from label code to canonical species name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelCatalog {
    names: HashMap<String, String>,
}

impl LabelCatalog {
    /// The 102-species catalog shipped with the app.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Build a catalog from `(code, name)` pairs. Later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let names = pairs
            .into_iter()
            .map(|(k, v)| (k.into().trim().to_string(), v.into()))
            .collect();
        Self { names }
    }

    /// Load a JSON object of the form `{"74": "rose", ...}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read catalog: {}", path.display()))?;
        let names: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("catalog is not a code->name JSON object: {}", path.display()))?;
        if names.is_empty() {
            anyhow::bail!("catalog contains no labels: {}", path.display());
        }
        Ok(Self::from_pairs(names))
    }

    /// Species name for `code`, or [`UNKNOWN_LABEL`] when absent.
    pub fn lookup(&self, code: &str) -> &str {
        self.names
            .get(code.trim())
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.names.contains_key(code.trim())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
