use super::heads::build;
use super::traits::{ClassInfo, PreTrainedModel};
use crate::core::backend::Backend;
use crate::core::config::{document_family, PretrainedConfig, UnusedKeys};
use crate::error::{Error, Result};
use crate::infra::storage::{Artifact, LocalStore, WeightStore};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Caller knobs for loading a pretrained model.
pub struct LoadOptions<T> {
    /// Use this configuration instead of resolving one from the identifier.
    pub config: Option<PretrainedConfig>,
    pub overrides: Map<String, Value>,
    /// Use these parameters instead of reading a weights file.
    pub state_dict: Option<BTreeMap<String, T>>,
    /// Read the other backend's weights file.
    pub from_alternate: bool,
    /// Fail on any missing, unexpected or mismatched key.
    pub strict: bool,
    pub output_loading_info: bool,
    pub keep_unknown_fields: bool,
}

impl<T> Default for LoadOptions<T> {
    fn default() -> Self {
        Self {
            config: None,
            overrides: Map::new(),
            state_dict: None,
            from_alternate: false,
            strict: false,
            output_loading_info: false,
            keep_unknown_fields: false,
        }
    }
}

impl<T> LoadOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: PretrainedConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_state_dict(mut self, state: BTreeMap<String, T>) -> Self {
        self.state_dict = Some(state);
        self
    }

    pub fn from_alternate(mut self) -> Self {
        self.from_alternate = true;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn with_loading_info(mut self) -> Self {
        self.output_loading_info = true;
        self
    }

    pub fn keeping_unknown_fields(mut self) -> Self {
        self.keep_unknown_fields = true;
        self
    }
}

/// Outcome of reconciling a checkpoint with a freshly built model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadingInfo {
    pub missing_keys: Vec<String>,
    pub unexpected_keys: Vec<String>,
    pub error_msgs: Vec<String>,
}

impl LoadingInfo {
    pub fn is_clean(&self) -> bool {
        self.missing_keys.is_empty() && self.unexpected_keys.is_empty() && self.error_msgs.is_empty()
    }
}

#[derive(Debug)]
pub struct Loaded<B: Backend> {
    pub model: Box<dyn PreTrainedModel<B>>,
    /// Present only when requested.
    pub loading_info: Option<LoadingInfo>,
    /// Overrides that matched no configuration attribute.
    pub unused: Map<String, Value>,
}

fn legacy_name(key: &str) -> String {
    match key.rsplit_once('.') {
        Some((module, "gamma")) => format!("{}.weight", module),
        Some((module, "beta")) => format!("{}.bias", module),
        _ => key.to_string(),
    }
}

/// Copy `state` into `model`, best effort.
///
/// Checkpoints of a bare body load into head models and the other way round.
/// In the second direction only keys under the body prefix are considered, so
/// head-only keys are dropped without being reported as unexpected.
/// Parameters with a different shape are skipped and reported. With `strict`, any
/// remaining discrepancy fails the call before the model is touched.
pub fn load_state_dict<B: Backend>(
    model: &mut dyn PreTrainedModel<B>,
    state: BTreeMap<String, B::Tensor>,
    strict: bool,
) -> Result<LoadingInfo> {
    let state: BTreeMap<String, B::Tensor> = state.into_iter().map(|(k, v)| (legacy_name(&k), v)).collect();

    let body_prefix = model.core().body.prefix().to_string();
    let family_prefix = format!("{}.", model.info().family.base_prefix());
    let state_is_prefixed = state.keys().any(|k| k.starts_with(&family_prefix));

    let state: BTreeMap<String, B::Tensor> = if !body_prefix.is_empty() && !state_is_prefixed {
        debug!(prefix = %body_prefix, "loading body checkpoint into head model");
        state
            .into_iter()
            .map(|(k, v)| {
                if model.params().contains(&k) {
                    (k, v)
                } else {
                    (format!("{}.{}", body_prefix, k), v)
                }
            })
            .collect()
    } else if body_prefix.is_empty() && state_is_prefixed {
        debug!(prefix = %family_prefix, "loading head checkpoint into body");
        state
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(&family_prefix).map(|rest| (rest.to_string(), v)))
            .collect()
    } else {
        state
    };

    let tied: BTreeSet<String> = model.tied_keys().into_iter().collect();
    let mut report = LoadingInfo::default();
    let mut accepted = Vec::new();
    let mut seen = BTreeSet::new();
    for (key, tensor) in state {
        match model.params().get_opt(&key) {
            None => report.unexpected_keys.push(key),
            Some(current) if B::dims(current) != B::dims(&tensor) => {
                report.error_msgs.push(format!(
                    "size mismatch for {}: copying a param with shape {:?} from checkpoint, the shape in current model is {:?}.",
                    key,
                    B::dims(&tensor),
                    B::dims(current)
                ));
                seen.insert(key);
            }
            Some(_) => {
                seen.insert(key.clone());
                accepted.push((key, tensor));
            }
        }
    }
    report.missing_keys = model
        .params()
        .keys()
        .filter(|k| !seen.contains(*k) && !tied.contains(*k))
        .cloned()
        .collect();

    if strict && !report.is_clean() {
        return Err(Error::StrictLoad {
            missing: report.missing_keys,
            unexpected: report.unexpected_keys,
            errors: report.error_msgs,
        });
    }

    for (key, tensor) in accepted {
        model.params_mut().insert(key, tensor);
    }

    if !report.missing_keys.is_empty() {
        info!(class = model.class_name(), keys = ?report.missing_keys, "weights not initialized from pretrained model");
    }
    if !report.unexpected_keys.is_empty() {
        info!(class = model.class_name(), keys = ?report.unexpected_keys, "weights from pretrained model not used");
    }
    for msg in &report.error_msgs {
        warn!(class = model.class_name(), "{}", msg);
    }
    Ok(report)
}

/// Weights file for `identifier`, refusing the other backend's file unless asked for.
fn weights_path<B: Backend>(store: &dyn WeightStore, identifier: &str, local: Option<&Path>, from_alternate: bool) -> Result<PathBuf> {
    let alternate = B::KIND.alternate();

    if let Some(path) = local.filter(|p| p.is_file()) {
        let holds_alternate = path.file_name().and_then(|n| n.to_str()) == Some(alternate.weights_file());
        if holds_alternate && !from_alternate {
            return Err(Error::AlternateWeights {
                path: path.to_path_buf(),
                backend: alternate.to_string(),
            });
        }
        return Ok(path.to_path_buf());
    }

    let kind = if from_alternate { alternate } else { B::KIND };
    match store.resolve(identifier, Artifact::Weights(kind)) {
        Err(Error::ArtifactNotFound { .. }) if !from_alternate => {
            let other = local.map(|dir| dir.join(alternate.weights_file())).filter(|p| p.is_file());
            match other {
                Some(path) => Err(Error::AlternateWeights {
                    path,
                    backend: alternate.to_string(),
                }),
                None => Err(Error::ArtifactNotFound {
                    identifier: identifier.to_string(),
                    file: kind.weights_file().to_string(),
                }),
            }
        }
        other => other,
    }
}

/// Resolve the configuration, build the class, then load and reconcile its weights.
///
/// A file identifier is a bare weights file: it needs an explicit configuration.
/// The returned model is tied and in evaluation mode.
pub fn load_pretrained<B: Backend>(
    store: &dyn WeightStore,
    info: ClassInfo,
    identifier: &str,
    options: LoadOptions<B::Tensor>,
) -> Result<Loaded<B>> {
    let LoadOptions {
        config,
        overrides,
        state_dict,
        from_alternate,
        strict,
        output_loading_info,
        keep_unknown_fields,
    } = options;
    let local = LocalStore::new().locate(identifier);
    let is_file = local.as_deref().is_some_and(Path::is_file);

    let (config, unused) = match config {
        Some(mut config) => {
            let unused = config.apply_overrides(overrides, UnusedKeys::Return)?;
            (config, unused)
        }
        None if is_file => return Err(Error::ConfigurationRequired(identifier.to_string())),
        None => {
            let path = store.resolve(identifier, Artifact::Config)?;
            let family = document_family(&path)
                .filter(|f| f.is_subtype_of(info.family))
                .unwrap_or(info.family);
            let mut config = PretrainedConfig::from_file(family, &path, keep_unknown_fields)?;
            let unused = config.apply_overrides(overrides, UnusedKeys::Return)?;
            (config, unused)
        }
    };

    let mut model = build::<B>(info, config)?;
    let state = match state_dict {
        Some(state) => state,
        None => {
            let path = weights_path::<B>(store, identifier, local.as_deref(), from_alternate)?;
            info!(class = info.name, path = %path.display(), "loading weights");
            B::load(&path)?
        }
    };

    let report = load_state_dict(model.as_mut(), state, strict)?;
    model.tie_weights()?;
    model.eval();

    Ok(Loaded {
        model,
        loading_info: output_loading_info.then_some(report),
        unused,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::{BackendKind, ReferenceBackend};
    use crate::core::family::Family;
    use crate::core::model::traits::Head;
    use crate::core::tensor::{Shape, Tensor};

    fn config() -> PretrainedConfig {
        PretrainedConfig::builder(Family::Bert)
            .vocab_size(16)
            .hidden_size(4)
            .intermediate_size(8)
            .num_hidden_layers(1)
            .num_attention_heads(1)
            .max_position_embeddings(8)
            .build()
            .unwrap()
    }

    fn model(name: &'static str, head: Head) -> Box<dyn PreTrainedModel<ReferenceBackend>> {
        build::<ReferenceBackend>(ClassInfo::new(name, Family::Bert, head, BackendKind::Reference), config()).unwrap()
    }

    #[test]
    fn test_body_checkpoint_into_head_model() {
        let base = model("BertModel", Head::Base);
        let state = base.params().as_map().clone();
        let mut head = model("BertForTokenClassification", Head::TokenClassification);
        let report = load_state_dict(head.as_mut(), state, false).unwrap();
        assert!(report.unexpected_keys.is_empty());
        assert_eq!(report.missing_keys, vec!["classifier.bias".to_string(), "classifier.weight".to_string()]);
    }

    #[test]
    fn test_head_checkpoint_into_body() {
        let head = model("BertForMaskedLM", Head::MaskedLm);
        let mut state = head.params().as_map().clone();
        state.insert("cls.seq_relationship.weight".to_string(), Tensor::zeros(Shape::new(vec![2, 4])));
        assert!(state.contains_key("lm_head.weight"));

        let mut base = model("BertModel", Head::Base);
        let report = load_state_dict(base.as_mut(), state, true).unwrap();
        assert!(report.is_clean());
        assert!(!base.params().contains("lm_head.weight"));
        assert!(!base.params().contains("cls.seq_relationship.weight"));
    }

    #[test]
    fn test_legacy_names_and_tied_keys() {
        let mut lm = model("BertForMaskedLM", Head::MaskedLm);
        let mut state: BTreeMap<String, Tensor> = lm
            .params()
            .iter()
            .filter(|(k, _)| k.as_str() != "lm_head.weight")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let norm = state.remove("bert.embeddings.LayerNorm.weight").unwrap();
        state.insert("bert.embeddings.LayerNorm.gamma".to_string(), norm);
        let report = load_state_dict(lm.as_mut(), state, true).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_size_mismatch_is_reported_or_fatal() {
        let mut base = model("BertModel", Head::Base);
        let mut state = base.params().as_map().clone();
        state.insert("embeddings.word_embeddings.weight".to_string(), Tensor::zeros(Shape::new(vec![3, 4])));
        state.insert("pooler.dense.weight".to_string(), Tensor::zeros(Shape::new(vec![4, 4])));

        let err = load_state_dict(base.as_mut(), state.clone(), true).unwrap_err();
        assert!(matches!(err, Error::StrictLoad { .. }));

        let report = load_state_dict(base.as_mut(), state, false).unwrap();
        assert_eq!(report.unexpected_keys, vec!["pooler.dense.weight".to_string()]);
        assert_eq!(report.error_msgs.len(), 1);
        assert!(report.error_msgs[0].starts_with("size mismatch for embeddings.word_embeddings.weight"));
        assert!(report.missing_keys.is_empty());
        assert_eq!(base.input_embeddings().unwrap().dims(), &[16, 4]);
    }
}
