//! Registry tables mapping configuration families to concrete model classes.
//!
//! One immutable [`Registry`] exists per backend, built on first use from
//! [`TABLE_SPECS`].

pub mod tables;

pub use tables::{TableSpec, TABLE_SPECS};

use crate::core::backend::{Backend, BackendKind, CandleBackend, ReferenceBackend};
use crate::core::config::{ConfigOptions, PretrainedConfig, UnusedKeys};
use crate::core::family::Family;
use crate::core::model::{build, load_pretrained, ClassInfo, LoadOptions, Loaded, PreTrainedModel};
use crate::error::{Error, Result};
use crate::infra::storage::{LocalStore, WeightStore};
use once_cell::sync::Lazy;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use tracing::{debug, warn};

/// Task category of a registry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Base,
    PreTraining,
    /// Deprecated catch-all for every kind of language-modelling head.
    WithLmHead,
    CausalLm,
    MaskedLm,
    Seq2SeqLm,
    SequenceClassification,
    QuestionAnswering,
    TokenClassification,
    MultipleChoice,
}

impl Task {
    pub const ALL: [Task; 10] = [
        Task::Base,
        Task::PreTraining,
        Task::WithLmHead,
        Task::CausalLm,
        Task::MaskedLm,
        Task::Seq2SeqLm,
        Task::SequenceClassification,
        Task::QuestionAnswering,
        Task::TokenClassification,
        Task::MultipleChoice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Task::Base => "base",
            Task::PreTraining => "pretraining",
            Task::WithLmHead => "with-lm-head",
            Task::CausalLm => "causal-lm",
            Task::MaskedLm => "masked-lm",
            Task::Seq2SeqLm => "seq2seq-lm",
            Task::SequenceClassification => "sequence-classification",
            Task::QuestionAnswering => "question-answering",
            Task::TokenClassification => "token-classification",
            Task::MultipleChoice => "multiple-choice",
        }
    }

    /// Name of the auto class dispatching this table.
    pub fn auto_name(self) -> &'static str {
        match self {
            Task::Base => "AutoModel",
            Task::PreTraining => "AutoModelForPreTraining",
            Task::WithLmHead => "AutoModelWithLMHead",
            Task::CausalLm => "AutoModelForCausalLM",
            Task::MaskedLm => "AutoModelForMaskedLM",
            Task::Seq2SeqLm => "AutoModelForSeq2SeqLM",
            Task::SequenceClassification => "AutoModelForSequenceClassification",
            Task::QuestionAnswering => "AutoModelForQuestionAnswering",
            Task::TokenClassification => "AutoModelForTokenClassification",
            Task::MultipleChoice => "AutoModelForMultipleChoice",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Task::ALL.into_iter().find(|t| t.as_str() == s).ok_or_else(|| {
            let names: Vec<&str> = Task::ALL.iter().map(|t| t.as_str()).collect();
            format!("unknown task {} (expected one of {})", s, names.join(", "))
        })
    }
}

/// How a configuration family is matched against table keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDiscipline {
    /// The family or any of its ancestors; first hit in table order wins.
    Compatible,
    /// The family itself only.
    Exact,
}

/// A concrete model class bound to one backend.
pub struct ModelClass<B: Backend> {
    info: ClassInfo,
    _backend: PhantomData<fn() -> B>,
}

impl<B: Backend> Clone for ModelClass<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for ModelClass<B> {}

impl<B: Backend> fmt::Debug for ModelClass<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelClass").field(&self.info.name).finish()
    }
}

impl<B: Backend> ModelClass<B> {
    fn new(info: ClassInfo) -> Self {
        Self {
            info,
            _backend: PhantomData,
        }
    }

    pub fn info(&self) -> ClassInfo {
        self.info
    }

    pub fn name(&self) -> &'static str {
        self.info.name
    }

    /// Fresh, randomly initialized instance. No weights are loaded.
    pub fn from_config(&self, config: PretrainedConfig) -> Result<Box<dyn PreTrainedModel<B>>> {
        build::<B>(self.info, config)
    }

    pub fn from_pretrained(&self, identifier: &str, options: LoadOptions<B::Tensor>) -> Result<Loaded<B>> {
        self.from_pretrained_with(crate::auto::default_store()?, identifier, options)
    }

    pub fn from_pretrained_with(
        &self,
        store: &dyn WeightStore,
        identifier: &str,
        options: LoadOptions<B::Tensor>,
    ) -> Result<Loaded<B>> {
        load_pretrained::<B>(store, self.info, identifier, options)
    }
}

/// Ordered family-to-class mapping for one task on one backend.
pub struct RegistryTable<B: Backend> {
    task: Task,
    discipline: MatchDiscipline,
    entries: Vec<(Family, ModelClass<B>)>,
}

impl<B: Backend> RegistryTable<B> {
    fn from_spec(spec: &TableSpec) -> Self {
        let entries = spec
            .entries
            .iter()
            .filter(|(family, _, _)| B::KIND != BackendKind::Reference || !family.is_encoder_decoder())
            .map(|&(family, head, name)| (family, ModelClass::new(ClassInfo::new(name, family, head, B::KIND))))
            .collect();
        Self {
            task: spec.task,
            discipline: spec.discipline,
            entries,
        }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn discipline(&self) -> MatchDiscipline {
        self.discipline
    }

    pub fn entries(&self) -> &[(Family, ModelClass<B>)] {
        &self.entries
    }

    pub fn families(&self) -> Vec<Family> {
        self.entries.iter().map(|(family, _)| *family).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unrecognized(&self, family: Family) -> Error {
        Error::UnrecognizedConfiguration {
            family: family.to_string(),
            task: self.task.auto_name().to_string(),
            backend: B::KIND.to_string(),
            expected: self.entries.iter().map(|(key, _)| key.to_string()).collect(),
        }
    }

    /// First entry whose key is `family` or one of its ancestors.
    pub fn resolve_by_compatible_type(&self, family: Family) -> Result<&ModelClass<B>> {
        self.entries
            .iter()
            .find(|(key, _)| family.is_subtype_of(*key))
            .map(|(_, class)| class)
            .ok_or_else(|| self.unrecognized(family))
    }

    /// The entry keyed by exactly `family`.
    pub fn resolve_by_exact_type(&self, family: Family) -> Result<&ModelClass<B>> {
        self.entries
            .iter()
            .find(|(key, _)| *key == family)
            .map(|(_, class)| class)
            .ok_or_else(|| self.unrecognized(family))
    }

    /// Resolve with this table's own discipline.
    pub fn resolve(&self, family: Family) -> Result<&ModelClass<B>> {
        if self.task == Task::WithLmHead {
            warn!(
                "{} is deprecated; use {}, {} or {} instead",
                Task::WithLmHead.auto_name(),
                Task::CausalLm.auto_name(),
                Task::MaskedLm.auto_name(),
                Task::Seq2SeqLm.auto_name()
            );
        }
        let class = match self.discipline {
            MatchDiscipline::Compatible => self.resolve_by_compatible_type(family),
            MatchDiscipline::Exact => self.resolve_by_exact_type(family),
        }?;
        debug!(task = %self.task, family = family.marker(), class = class.name(), "resolved model class");
        Ok(class)
    }

    pub fn from_config(&self, config: &PretrainedConfig) -> Result<Box<dyn PreTrainedModel<B>>> {
        self.resolve(config.family)?.from_config(config.clone())
    }

    pub fn from_pretrained(&self, identifier: &str, options: LoadOptions<B::Tensor>) -> Result<Loaded<B>> {
        self.from_pretrained_with(crate::auto::default_store()?, identifier, options)
    }

    /// Resolve the configuration when none is given, pick the class for its family,
    /// then load the weights.
    pub fn from_pretrained_with(
        &self,
        store: &dyn WeightStore,
        identifier: &str,
        mut options: LoadOptions<B::Tensor>,
    ) -> Result<Loaded<B>> {
        let mut unused = serde_json::Map::new();
        let config = match options.config.take() {
            Some(config) => config,
            None => {
                if LocalStore::new().locate(identifier).is_some_and(|p| p.is_file()) {
                    return Err(Error::ConfigurationRequired(identifier.to_string()));
                }
                let config_options = ConfigOptions {
                    overrides: std::mem::take(&mut options.overrides),
                    unused: UnusedKeys::Return,
                    keep_unknown_fields: options.keep_unknown_fields,
                };
                let resolved = crate::auto::config_from_pretrained_with(store, identifier, &config_options)?;
                unused = resolved.unused;
                resolved.config
            }
        };

        let class = *self.resolve(config.family)?;
        let mut loaded = class.from_pretrained_with(store, identifier, options.with_config(config))?;
        for (key, value) in unused {
            loaded.unused.entry(key).or_insert(value);
        }
        Ok(loaded)
    }
}

/// Every task table for one backend.
pub struct Registry<B: Backend> {
    tables: Vec<RegistryTable<B>>,
}

impl<B: Backend> Registry<B> {
    /// One table per task, in [`Task::ALL`] order. Tasks with no table entries get an empty table.
    pub fn from_specs(specs: &[TableSpec]) -> Self {
        let tables = Task::ALL
            .iter()
            .map(|&task| match specs.iter().find(|spec| spec.task == task) {
                Some(spec) => RegistryTable::from_spec(spec),
                None => RegistryTable {
                    task,
                    discipline: MatchDiscipline::Compatible,
                    entries: Vec::new(),
                },
            })
            .collect();
        Self { tables }
    }

    pub fn table(&self, task: Task) -> &RegistryTable<B> {
        &self.tables[task as usize]
    }

    pub fn tables(&self) -> &[RegistryTable<B>] {
        &self.tables
    }
}

pub static CANDLE_REGISTRY: Lazy<Registry<CandleBackend>> = Lazy::new(|| Registry::from_specs(TABLE_SPECS));

pub static REFERENCE_REGISTRY: Lazy<Registry<ReferenceBackend>> = Lazy::new(|| Registry::from_specs(TABLE_SPECS));
