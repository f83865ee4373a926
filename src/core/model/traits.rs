use super::body::{BodyOutput, TransformerBody};
use super::outputs::{ModelInput, ModelOutputs};
use super::params::{resize_rows, Init, ParamSpec, ParamStore};
use crate::core::backend::{Backend, BackendKind};
use crate::core::config::PretrainedConfig;
use crate::core::family::Family;
use crate::error::{Error, Result};
use crate::infra::storage::write_config;
use crate::rng::INIT_SEED;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// The task-specific output layer a class puts on top of the shared body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Head {
    Base,
    MaskedLm,
    CausalLm,
    Seq2SeqLm,
    SequenceClassification,
    TokenClassification,
    QuestionAnswering,
    MultipleChoice,
}

impl Head {
    pub fn as_str(self) -> &'static str {
        match self {
            Head::Base => "base",
            Head::MaskedLm => "masked-lm",
            Head::CausalLm => "causal-lm",
            Head::Seq2SeqLm => "seq2seq-lm",
            Head::SequenceClassification => "sequence-classification",
            Head::TokenClassification => "token-classification",
            Head::QuestionAnswering => "question-answering",
            Head::MultipleChoice => "multiple-choice",
        }
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one concrete model class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassInfo {
    pub name: &'static str,
    pub family: Family,
    pub head: Head,
    pub backend: BackendKind,
}

impl ClassInfo {
    pub const fn new(name: &'static str, family: Family, head: Head, backend: BackendKind) -> Self {
        Self {
            name,
            family,
            head,
            backend,
        }
    }
}

impl fmt::Display for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    CrossEntropy,
    MeanSquaredError,
}

/// State every model class owns: its configuration, body and parameters.
pub struct ModelCore<B: Backend> {
    pub info: ClassInfo,
    pub config: PretrainedConfig,
    pub body: TransformerBody,
    pub params: ParamStore<B>,
    pub training: bool,
}

impl<B: Backend> ModelCore<B> {
    /// Fresh, deterministically initialized state in evaluation mode.
    ///
    /// The configuration must belong to the class family or one of its subtypes.
    pub fn new(info: ClassInfo, config: PretrainedConfig, head_params: Vec<ParamSpec>) -> Result<Self> {
        if !config.family.is_subtype_of(info.family) {
            return Err(Error::UnrecognizedConfiguration {
                family: config.family.to_string(),
                task: info.head.to_string(),
                backend: info.backend.to_string(),
                expected: vec![info.family.to_string()],
            });
        }
        config.validate()?;

        let body = TransformerBody::new(info.family, info.head != Head::Base);
        let mut specs = body.parameters(&config);
        specs.extend(head_params);
        let params = ParamStore::init(&specs)?;
        debug!(class = info.name, parameters = params.num_parameters(), "initialized model");

        Ok(Self {
            info,
            config,
            body,
            params,
            training: false,
        })
    }

    pub fn run_body(&self, input: &ModelInput<B::Tensor>) -> Result<BodyOutput<B::Tensor>> {
        self.body.forward::<B>(
            &self.config,
            &self.params,
            &input.input_ids,
            input.token_type_ids.as_deref(),
            input.memory.as_deref(),
            self.training,
        )
    }
}

/// Uniform contract of every concrete model class.
pub trait PreTrainedModel<B: Backend>: Send + Sync {
    fn core(&self) -> &ModelCore<B>;
    fn core_mut(&mut self) -> &mut ModelCore<B>;

    /// Outputs start with the loss when labels are given.
    fn forward(&self, input: &ModelInput<B::Tensor>) -> Result<ModelOutputs<B::Tensor>>;

    /// Parameter holding the output projection over the vocabulary, if any.
    fn output_embeddings_key(&self) -> Option<String> {
        None
    }

    fn loss_kind(&self) -> Option<LossKind> {
        None
    }

    fn info(&self) -> ClassInfo {
        self.core().info
    }

    fn class_name(&self) -> &'static str {
        self.core().info.name
    }

    fn config(&self) -> &PretrainedConfig {
        &self.core().config
    }

    fn params(&self) -> &ParamStore<B> {
        &self.core().params
    }

    fn params_mut(&mut self) -> &mut ParamStore<B> {
        &mut self.core_mut().params
    }

    fn num_parameters(&self) -> usize {
        self.params().num_parameters()
    }

    fn input_embeddings_key(&self) -> String {
        self.core().body.word_embeddings_key()
    }

    fn input_embeddings(&self) -> Result<&B::Tensor> {
        self.params().get(&self.input_embeddings_key())
    }

    fn output_embeddings(&self) -> Option<&B::Tensor> {
        self.output_embeddings_key().and_then(|key| self.params().get_opt(&key))
    }

    /// Keys whose values are derived from another parameter rather than loaded.
    fn tied_keys(&self) -> Vec<String> {
        match self.output_embeddings_key() {
            Some(key) if self.config().tie_word_embeddings => vec![key],
            _ => Vec::new(),
        }
    }

    /// Make the output projection equal to the input embeddings.
    ///
    /// The two share storage when the backend can alias tensors and the configuration
    /// is not marked for export; otherwise the values are copied.
    fn tie_weights(&mut self) -> Result<()> {
        let Some(key) = self.output_embeddings_key() else {
            return Ok(());
        };
        if !self.config().tie_word_embeddings {
            return Ok(());
        }
        let input = self.input_embeddings()?;
        let tied = if B::SUPPORTS_ALIASING && !self.config().torchscript {
            input.clone()
        } else {
            B::deep_copy(input)?
        };
        self.params_mut().insert(key, tied);
        Ok(())
    }

    /// Change the vocabulary size. Existing rows are kept, new rows are freshly
    /// initialized and the output layer follows. `None` leaves the model unchanged.
    fn resize_token_embeddings(&mut self, new_num_tokens: Option<usize>) -> Result<&B::Tensor> {
        let Some(new_num_tokens) = new_num_tokens else {
            return self.input_embeddings();
        };
        if new_num_tokens == 0 {
            return Err(Error::InvalidConfig("vocabulary size must be positive".to_string()));
        }

        let std = self.config().initializer_range;
        let seed = INIT_SEED ^ new_num_tokens as u64;
        let input_key = self.input_embeddings_key();
        let resized = resize_rows::<B>(self.input_embeddings()?, new_num_tokens, Init::Normal(std), seed)?;
        self.params_mut().insert(input_key, resized);

        if let Some(key) = self.output_embeddings_key() {
            let bias_key = key.replace(".weight", ".bias");
            if let Some(bias) = self.params().get_opt(&bias_key) {
                let bias = resize_rows::<B>(bias, new_num_tokens, Init::Zeros, seed)?;
                self.params_mut().insert(bias_key, bias);
            }
            if !self.config().tie_word_embeddings {
                let weight = resize_rows::<B>(self.params().get(&key)?, new_num_tokens, Init::Normal(std), seed.rotate_left(1))?;
                self.params_mut().insert(key, weight);
            }
        }

        self.core_mut().config.vocab_size = new_num_tokens;
        self.tie_weights()?;
        info!(class = self.class_name(), vocab_size = new_num_tokens, "resized token embeddings");
        self.input_embeddings()
    }

    fn train(&mut self) {
        self.core_mut().training = true;
    }

    fn eval(&mut self) {
        self.core_mut().training = false;
    }

    fn is_training(&self) -> bool {
        self.core().training
    }

    /// Write `config.json` and this backend's weights file into `dir`.
    fn save_pretrained(&self, dir: &Path) -> Result<()> {
        let mut config = self.config().clone();
        config.architectures = Some(vec![self.class_name().to_string()]);
        write_config(dir, &config.to_value()?)?;

        let path = dir.join(B::KIND.weights_file());
        B::save(self.params().as_map(), &path)?;
        info!(class = self.class_name(), path = %path.display(), "saved model");
        Ok(())
    }
}

impl<B: Backend> fmt::Debug for dyn PreTrainedModel<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreTrainedModel")
            .field("class", &self.class_name())
            .field("family", &self.config().family)
            .field("parameters", &self.num_parameters())
            .finish()
    }
}
