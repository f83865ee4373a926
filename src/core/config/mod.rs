pub mod builder;
mod templates;

pub use builder::PretrainedConfigBuilder;

use crate::core::Family;
use crate::error::{Error, Result};
use crate::infra::storage::{Artifact, WeightStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Family-specific document field names and the attribute each one stands for.
/// When both spellings appear the canonical one wins.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("n_embd", "hidden_size"),
    ("d_model", "hidden_size"),
    ("dim", "hidden_size"),
    ("emb_dim", "hidden_size"),
    ("n_layer", "num_hidden_layers"),
    ("n_layers", "num_hidden_layers"),
    ("num_layers", "num_hidden_layers"),
    ("n_head", "num_attention_heads"),
    ("n_heads", "num_attention_heads"),
    ("num_heads", "num_attention_heads"),
    ("d_inner", "intermediate_size"),
    ("d_ff", "intermediate_size"),
    ("hidden_dim", "intermediate_size"),
    ("dff", "intermediate_size"),
    ("n_inner", "intermediate_size"),
    ("n_positions", "max_position_embeddings"),
    ("layer_norm_epsilon", "layer_norm_eps"),
    ("activation_function", "hidden_act"),
    ("ff_activation", "hidden_act"),
    ("activation", "hidden_act"),
    ("afn", "hidden_act"),
    ("resid_pdrop", "hidden_dropout_prob"),
    ("dropout", "hidden_dropout_prob"),
    ("dropout_rate", "hidden_dropout_prob"),
    ("attn_pdrop", "attention_probs_dropout_prob"),
    ("attention_dropout", "attention_probs_dropout_prob"),
    ("dropatt", "attention_probs_dropout_prob"),
    ("init_std", "initializer_range"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activation {
    /// Exact (erf) gelu.
    #[serde(rename = "gelu")]
    Gelu,
    /// Tanh approximation used by the GPT family.
    #[serde(rename = "gelu_new")]
    GeluNew,
    #[serde(rename = "relu")]
    Relu,
    #[serde(rename = "tanh")]
    Tanh,
    #[serde(rename = "silu", alias = "swish")]
    Silu,
}

/// How a sequence is reduced to one vector before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SummaryType {
    #[serde(rename = "first")]
    First,
    #[serde(rename = "last")]
    Last,
    #[serde(rename = "mean")]
    Mean,
    /// Token at a caller-supplied index, the last token when none is given.
    #[serde(rename = "cls_index")]
    ClsIndex,
}

/// What happens to override keys that are not attributes of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnusedKeys {
    #[default]
    Reject,
    Return,
}

/// Hyperparameters of one family. The family tag is serialized as `model_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainedConfig {
    #[serde(rename = "model_type")]
    pub family: Family,
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub hidden_act: Activation,
    pub hidden_dropout_prob: f32,
    pub attention_probs_dropout_prob: f32,
    pub max_position_embeddings: usize,
    pub type_vocab_size: usize,
    pub initializer_range: f32,
    pub layer_norm_eps: f64,
    pub pad_token_id: Option<u32>,
    pub mem_len: Option<usize>,
    pub tie_word_embeddings: bool,
    pub num_labels: usize,
    pub id2label: BTreeMap<usize, String>,
    pub output_hidden_states: bool,
    pub output_attentions: bool,
    pub torchscript: bool,
    pub summary_type: SummaryType,
    pub summary_use_proj: bool,
    pub summary_activation: Option<Activation>,
    pub summary_proj_to_labels: bool,
    pub summary_first_dropout: f32,
    pub summary_last_dropout: f32,
    pub architectures: Option<Vec<String>>,
    /// Document fields with no matching attribute, kept only on request.
    #[serde(skip)]
    pub extra: BTreeMap<String, Value>,
}

/// Caller knobs for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub overrides: Map<String, Value>,
    pub unused: UnusedKeys,
    pub keep_unknown_fields: bool,
}

impl ConfigOptions {
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    pub fn returning_unused(mut self) -> Self {
        self.unused = UnusedKeys::Return;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: PretrainedConfig,
    /// Overrides that matched no attribute. Always empty under `UnusedKeys::Reject`.
    pub unused: Map<String, Value>,
}

impl PretrainedConfig {
    pub fn new(family: Family) -> Self {
        family.template()
    }

    pub fn builder(family: Family) -> PretrainedConfigBuilder {
        PretrainedConfigBuilder::new(family)
    }

    pub fn default_labels(num_labels: usize) -> BTreeMap<usize, String> {
        (0..num_labels).map(|i| (i, format!("LABEL_{}", i))).collect()
    }

    /// Serialized document, unknown fields included.
    pub fn to_value(&self) -> Result<Value> {
        let mut doc = object(serde_json::to_value(self)?)?;
        for (key, value) in &self.extra {
            doc.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Ok(Value::Object(doc))
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value()?)?)
    }

    /// Merge a configuration document over the family defaults.
    pub fn from_document(family: Family, document: Value, keep_unknown_fields: bool) -> Result<Self> {
        let document = normalize_aliases(object(document)?);
        let has_id2label = document.contains_key("id2label");

        let mut known = object(serde_json::to_value(family.template())?)?;
        let mut extra = BTreeMap::new();
        for (key, value) in document {
            if key == "model_type" {
                continue;
            }
            if known.contains_key(&key) {
                known.insert(key, value);
            } else if keep_unknown_fields {
                extra.insert(key, value);
            } else {
                debug!(key = %key, "dropping unknown configuration field");
            }
        }

        let mut config: PretrainedConfig = serde_json::from_value(Value::Object(known))?;
        config.family = family;
        config.extra = extra;
        config.sync_labels(has_id2label);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(family: Family, path: P, keep_unknown_fields: bool) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let document: Value = serde_json::from_str(&text)?;
        Self::from_document(family, document, keep_unknown_fields)
    }

    pub fn from_pretrained(family: Family, identifier: &str, options: &ConfigOptions) -> Result<ResolvedConfig> {
        Self::from_pretrained_with(crate::auto::default_store()?, family, identifier, options)
    }

    /// Load the configuration document of `identifier` for an already-selected family,
    /// then apply the caller's overrides.
    pub fn from_pretrained_with(
        store: &dyn WeightStore,
        family: Family,
        identifier: &str,
        options: &ConfigOptions,
    ) -> Result<ResolvedConfig> {
        let path = store.resolve(identifier, Artifact::Config)?;
        let mut config = Self::from_file(family, &path, options.keep_unknown_fields)?;
        let unused = config.apply_overrides(options.overrides.clone(), options.unused)?;
        info!(identifier, family = family.marker(), path = %path.display(), "loaded configuration");
        Ok(ResolvedConfig { config, unused })
    }

    /// Apply overrides to attributes that already exist. Everything else is either
    /// rejected or handed back, depending on `policy`.
    pub fn apply_overrides(&mut self, overrides: Map<String, Value>, policy: UnusedKeys) -> Result<Map<String, Value>> {
        if overrides.is_empty() {
            return Ok(Map::new());
        }

        let overrides = normalize_aliases(overrides);
        let has_id2label = overrides.contains_key("id2label");

        let mut known = object(serde_json::to_value(&*self)?)?;
        let mut extra = self.extra.clone();
        let mut unused = Map::new();
        for (key, value) in overrides {
            if key != "model_type" && known.contains_key(&key) {
                known.insert(key, value);
            } else if extra.contains_key(&key) {
                extra.insert(key, value);
            } else {
                unused.insert(key, value);
            }
        }

        if !unused.is_empty() {
            let keys: Vec<String> = unused.keys().cloned().collect();
            match policy {
                UnusedKeys::Reject => return Err(Error::UnknownOverrides(keys)),
                UnusedKeys::Return => warn!(keys = ?keys, "configuration overrides matched no attribute"),
            }
        }

        let mut next: PretrainedConfig = serde_json::from_value(Value::Object(known))?;
        next.family = self.family;
        next.extra = extra;
        next.sync_labels(has_id2label);
        next.validate()?;
        *self = next;
        Ok(unused)
    }

    /// A given label map decides `num_labels`; otherwise a stale map is regenerated.
    fn sync_labels(&mut self, id2label_given: bool) {
        if id2label_given {
            self.num_labels = self.id2label.len();
        } else if self.id2label.len() != self.num_labels {
            self.id2label = Self::default_labels(self.num_labels);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("vocab_size", self.vocab_size),
            ("hidden_size", self.hidden_size),
            ("num_hidden_layers", self.num_hidden_layers),
            ("intermediate_size", self.intermediate_size),
            ("num_labels", self.num_labels),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("{} must be positive", name)));
        }
        for (name, p) in [
            ("hidden_dropout_prob", self.hidden_dropout_prob),
            ("attention_probs_dropout_prob", self.attention_probs_dropout_prob),
            ("summary_first_dropout", self.summary_first_dropout),
            ("summary_last_dropout", self.summary_last_dropout),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(Error::InvalidConfig(format!("{} must be in [0, 1), got {}", name, p)));
            }
        }
        Ok(())
    }
}

/// Read the `model_type` tag of a local configuration document, if any.
pub fn document_family(path: &Path) -> Option<Family> {
    let file = if path.is_dir() { path.join(Artifact::Config.file_name()) } else { path.to_path_buf() };
    let text = std::fs::read_to_string(file).ok()?;
    let document: Value = serde_json::from_str(&text).ok()?;
    document.get("model_type")?.as_str()?.parse().ok()
}

fn normalize_aliases(mut document: Map<String, Value>) -> Map<String, Value> {
    for (alias, canonical) in FIELD_ALIASES {
        if let Some(value) = document.remove(*alias) {
            if value.is_null() {
                continue;
            }
            document.entry(canonical.to_string()).or_insert(value);
        }
    }
    document
}

fn object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidConfig(format!("expected a JSON object, found {}", other))),
    }
}
