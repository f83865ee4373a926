//! Concrete model classes: the shared body plus one task head each.

use super::outputs::{ModelInput, ModelOutputs, OutputKind};
use super::params::{Init, ParamSpec};
use super::summary::SequenceSummary;
use super::traits::{ClassInfo, Head, LossKind, ModelCore, PreTrainedModel};
use crate::core::backend::Backend;
use crate::core::config::PretrainedConfig;
use crate::error::{Error, Result};

/// Label value excluded from categorical losses.
pub const IGNORE_INDEX: i64 = -100;

/// Instantiate the class described by `info` with freshly initialized parameters.
pub fn build<B: Backend>(info: ClassInfo, config: PretrainedConfig) -> Result<Box<dyn PreTrainedModel<B>>> {
    Ok(match info.head {
        Head::Base => Box::new(BaseModel::<B>::new(info, config)?),
        Head::MaskedLm | Head::CausalLm | Head::Seq2SeqLm => Box::new(LmHeadModel::<B>::new(info, config)?),
        Head::SequenceClassification => Box::new(SequenceClassificationModel::<B>::new(info, config)?),
        Head::TokenClassification => Box::new(TokenClassificationModel::<B>::new(info, config)?),
        Head::QuestionAnswering => Box::new(QuestionAnsweringModel::<B>::new(info, config)?),
        Head::MultipleChoice => Box::new(MultipleChoiceModel::<B>::new(info, config)?),
    })
}

fn param<'a, B: Backend>(core: &'a ModelCore<B>, name: &str) -> Result<&'a B::Tensor> {
    core.params.get(name)
}

fn flatten_rows<B: Backend>(t: &B::Tensor) -> Result<B::Tensor> {
    let dims = B::dims(t);
    let width = *dims.last().unwrap_or(&1);
    let rows = dims.iter().product::<usize>() / width.max(1);
    B::reshape(t, &[rows, width])
}

pub struct BaseModel<B: Backend> {
    core: ModelCore<B>,
}

impl<B: Backend> BaseModel<B> {
    pub fn new(info: ClassInfo, config: PretrainedConfig) -> Result<Self> {
        Ok(Self {
            core: ModelCore::new(info, config, Vec::new())?,
        })
    }
}

impl<B: Backend> PreTrainedModel<B> for BaseModel<B> {
    fn core(&self) -> &ModelCore<B> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore<B> {
        &mut self.core
    }

    fn forward(&self, input: &ModelInput<B::Tensor>) -> Result<ModelOutputs<B::Tensor>> {
        if input.labels.is_some() {
            return Err(Error::LabelMismatch(format!("{} has no head to score labels against", self.core.info)));
        }
        let body = self.core.run_body(input)?;
        let last = body.last_hidden_state.clone();
        Ok(body.into_outputs(vec![(OutputKind::LastHiddenState, last)]))
    }
}

/// Vocabulary projection for masked, causal and sequence-to-sequence language modelling.
///
/// Causal heads score position `t` against the label at `t + 1`.
pub struct LmHeadModel<B: Backend> {
    core: ModelCore<B>,
    shift_labels: bool,
}

impl<B: Backend> LmHeadModel<B> {
    pub fn new(info: ClassInfo, config: PretrainedConfig) -> Result<Self> {
        let head = ParamSpec::linear("lm_head", config.vocab_size, config.hidden_size, config.initializer_range).to_vec();
        let mut model = Self {
            core: ModelCore::new(info, config, head)?,
            shift_labels: info.head == Head::CausalLm,
        };
        model.tie_weights()?;
        Ok(model)
    }

    fn targets(&self, labels: &[i64], batch: usize, seq: usize) -> Vec<i64> {
        if !self.shift_labels {
            return labels.to_vec();
        }
        labels
            .chunks(seq)
            .take(batch)
            .flat_map(|row| row[1..].iter().copied().chain(std::iter::once(IGNORE_INDEX)))
            .collect()
    }
}

impl<B: Backend> PreTrainedModel<B> for LmHeadModel<B> {
    fn core(&self) -> &ModelCore<B> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore<B> {
        &mut self.core
    }

    fn output_embeddings_key(&self) -> Option<String> {
        Some("lm_head.weight".to_string())
    }

    fn loss_kind(&self) -> Option<LossKind> {
        Some(LossKind::CrossEntropy)
    }

    fn forward(&self, input: &ModelInput<B::Tensor>) -> Result<ModelOutputs<B::Tensor>> {
        let body = self.core.run_body(input)?;
        let logits = B::linear(
            &body.last_hidden_state,
            param(&self.core, "lm_head.weight")?,
            Some(param(&self.core, "lm_head.bias")?),
        )?;

        let loss = match &input.labels {
            Some(labels) => {
                let (batch, seq) = (input.input_ids.len(), input.seq_len());
                let targets = self.targets(labels.classes(batch * seq)?, batch, seq);
                Some(B::cross_entropy(&flatten_rows::<B>(&logits)?, &targets, IGNORE_INDEX)?)
            }
            None => None,
        };

        let mut outputs = body.into_outputs(vec![(OutputKind::Logits, logits)]);
        if let Some(loss) = loss {
            outputs.prepend_loss(loss);
        }
        Ok(outputs)
    }
}

/// Sequence summary, an optional classifier, and a regression or categorical loss.
///
/// A single label means regression.
pub struct SequenceClassificationModel<B: Backend> {
    core: ModelCore<B>,
    summary: SequenceSummary,
    classifier: bool,
}

impl<B: Backend> SequenceClassificationModel<B> {
    pub fn new(info: ClassInfo, config: PretrainedConfig) -> Result<Self> {
        let summary = SequenceSummary::new(&config, config.num_labels);
        let classifier = summary.out_dim() != config.num_labels;
        let mut head = summary.parameters(&config);
        if classifier {
            head.extend(ParamSpec::linear("classifier", config.num_labels, summary.out_dim(), config.initializer_range));
        }
        Ok(Self {
            core: ModelCore::new(info, config, head)?,
            summary,
            classifier,
        })
    }
}

impl<B: Backend> PreTrainedModel<B> for SequenceClassificationModel<B> {
    fn core(&self) -> &ModelCore<B> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore<B> {
        &mut self.core
    }

    fn loss_kind(&self) -> Option<LossKind> {
        Some(if self.core.config.num_labels == 1 {
            LossKind::MeanSquaredError
        } else {
            LossKind::CrossEntropy
        })
    }

    fn forward(&self, input: &ModelInput<B::Tensor>) -> Result<ModelOutputs<B::Tensor>> {
        let body = self.core.run_body(input)?;
        let mut logits = self.summary.forward::<B>(
            &self.core.config,
            &self.core.params,
            &body.last_hidden_state,
            input.cls_index.as_deref(),
            self.core.training,
        )?;
        if self.classifier {
            logits = B::linear(
                &logits,
                param(&self.core, "classifier.weight")?,
                Some(param(&self.core, "classifier.bias")?),
            )?;
        }

        let batch = input.input_ids.len();
        let loss = match (&input.labels, self.loss_kind()) {
            (Some(labels), Some(LossKind::MeanSquaredError)) => Some(B::mse(&logits, labels.values(batch)?)?),
            (Some(labels), _) => Some(B::cross_entropy(&logits, labels.classes(batch)?, IGNORE_INDEX)?),
            (None, _) => None,
        };

        let mut outputs = body.into_outputs(vec![(OutputKind::Logits, logits)]);
        if let Some(loss) = loss {
            outputs.prepend_loss(loss);
        }
        Ok(outputs)
    }
}

pub struct TokenClassificationModel<B: Backend> {
    core: ModelCore<B>,
}

impl<B: Backend> TokenClassificationModel<B> {
    pub fn new(info: ClassInfo, config: PretrainedConfig) -> Result<Self> {
        let head = ParamSpec::linear("classifier", config.num_labels, config.hidden_size, config.initializer_range).to_vec();
        Ok(Self {
            core: ModelCore::new(info, config, head)?,
        })
    }
}

impl<B: Backend> PreTrainedModel<B> for TokenClassificationModel<B> {
    fn core(&self) -> &ModelCore<B> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore<B> {
        &mut self.core
    }

    fn loss_kind(&self) -> Option<LossKind> {
        Some(LossKind::CrossEntropy)
    }

    fn forward(&self, input: &ModelInput<B::Tensor>) -> Result<ModelOutputs<B::Tensor>> {
        let body = self.core.run_body(input)?;
        let mut hidden = body.last_hidden_state.clone();
        if self.core.training {
            hidden = B::dropout(&hidden, self.core.config.hidden_dropout_prob)?;
        }
        let logits = B::linear(
            &hidden,
            param(&self.core, "classifier.weight")?,
            Some(param(&self.core, "classifier.bias")?),
        )?;

        let loss = match &input.labels {
            Some(labels) => {
                let tokens = input.input_ids.len() * input.seq_len();
                Some(B::cross_entropy(&flatten_rows::<B>(&logits)?, labels.classes(tokens)?, IGNORE_INDEX)?)
            }
            None => None,
        };

        let mut outputs = body.into_outputs(vec![(OutputKind::Logits, logits)]);
        if let Some(loss) = loss {
            outputs.prepend_loss(loss);
        }
        Ok(outputs)
    }
}

/// Start and end logits over the sequence for extractive answers.
///
/// Span labels outside the sequence are clamped to its length and then ignored.
pub struct QuestionAnsweringModel<B: Backend> {
    core: ModelCore<B>,
}

impl<B: Backend> QuestionAnsweringModel<B> {
    pub fn new(info: ClassInfo, config: PretrainedConfig) -> Result<Self> {
        let head = ParamSpec::linear("qa_outputs", 2, config.hidden_size, config.initializer_range).to_vec();
        Ok(Self {
            core: ModelCore::new(info, config, head)?,
        })
    }
}

impl<B: Backend> PreTrainedModel<B> for QuestionAnsweringModel<B> {
    fn core(&self) -> &ModelCore<B> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore<B> {
        &mut self.core
    }

    fn loss_kind(&self) -> Option<LossKind> {
        Some(LossKind::CrossEntropy)
    }

    fn forward(&self, input: &ModelInput<B::Tensor>) -> Result<ModelOutputs<B::Tensor>> {
        let body = self.core.run_body(input)?;
        let logits = B::linear(
            &body.last_hidden_state,
            param(&self.core, "qa_outputs.weight")?,
            Some(param(&self.core, "qa_outputs.bias")?),
        )?;
        let (batch, seq) = (input.input_ids.len(), input.seq_len());
        let start = B::reshape(&B::narrow(&logits, 2, 0, 1)?, &[batch, seq])?;
        let end = B::reshape(&B::narrow(&logits, 2, 1, 1)?, &[batch, seq])?;

        let loss = match &input.labels {
            Some(labels) => {
                let (starts, ends) = labels.spans(batch)?;
                let ignored = seq as i64;
                let clamp = |v: &[i64]| v.iter().map(|&p| p.clamp(0, ignored)).collect::<Vec<_>>();
                let start_loss = B::cross_entropy(&start, &clamp(starts), ignored)?;
                let end_loss = B::cross_entropy(&end, &clamp(ends), ignored)?;
                Some(B::scale(&B::add(&start_loss, &end_loss)?, 0.5)?)
            }
            None => None,
        };

        let mut outputs = body.into_outputs(vec![(OutputKind::StartLogits, start), (OutputKind::EndLogits, end)]);
        if let Some(loss) = loss {
            outputs.prepend_loss(loss);
        }
        Ok(outputs)
    }
}

/// Scores each of `num_choices` candidate sequences and normalizes across them.
pub struct MultipleChoiceModel<B: Backend> {
    core: ModelCore<B>,
    summary: SequenceSummary,
    classifier: bool,
}

impl<B: Backend> MultipleChoiceModel<B> {
    pub fn new(info: ClassInfo, config: PretrainedConfig) -> Result<Self> {
        let summary = SequenceSummary::new(&config, 1);
        let classifier = summary.out_dim() != 1;
        let mut head = summary.parameters(&config);
        if classifier {
            head.extend(ParamSpec::linear("classifier", 1, summary.out_dim(), config.initializer_range));
        }
        Ok(Self {
            core: ModelCore::new(info, config, head)?,
            summary,
            classifier,
        })
    }
}

impl<B: Backend> PreTrainedModel<B> for MultipleChoiceModel<B> {
    fn core(&self) -> &ModelCore<B> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore<B> {
        &mut self.core
    }

    fn loss_kind(&self) -> Option<LossKind> {
        Some(LossKind::CrossEntropy)
    }

    fn forward(&self, input: &ModelInput<B::Tensor>) -> Result<ModelOutputs<B::Tensor>> {
        let choices = input
            .num_choices
            .filter(|&c| c > 0 && input.input_ids.len() % c == 0)
            .ok_or_else(|| Error::ShapeMismatch(format!("{} needs input grouped into choices", self.core.info)))?;
        let batch = input.input_ids.len() / choices;

        let body = self.core.run_body(input)?;
        let mut scores = self.summary.forward::<B>(
            &self.core.config,
            &self.core.params,
            &body.last_hidden_state,
            input.cls_index.as_deref(),
            self.core.training,
        )?;
        if self.classifier {
            scores = B::linear(
                &scores,
                param(&self.core, "classifier.weight")?,
                Some(param(&self.core, "classifier.bias")?),
            )?;
        }
        let logits = B::reshape(&scores, &[batch, choices])?;

        let loss = match &input.labels {
            Some(labels) => Some(B::cross_entropy(&logits, labels.classes(batch)?, IGNORE_INDEX)?),
            None => None,
        };

        let mut outputs = body.into_outputs(vec![(OutputKind::Logits, logits)]);
        if let Some(loss) = loss {
            outputs.prepend_loss(loss);
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::{BackendKind, CandleBackend, ReferenceBackend};
    use crate::core::family::Family;
    use crate::core::model::outputs::Labels;
    use crate::core::tensor::Tensor;

    fn config(family: Family, num_labels: usize) -> PretrainedConfig {
        PretrainedConfig::builder(family)
            .vocab_size(24)
            .hidden_size(8)
            .intermediate_size(16)
            .num_hidden_layers(2)
            .num_attention_heads(2)
            .max_position_embeddings(32)
            .num_labels(num_labels)
            .build()
            .unwrap()
    }

    fn info(name: &'static str, family: Family, head: Head) -> ClassInfo {
        ClassInfo::new(name, family, head, BackendKind::Reference)
    }

    fn ids() -> Vec<Vec<u32>> {
        vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]
    }

    #[test]
    fn test_lm_head_is_tied_on_construction() {
        let model = build::<ReferenceBackend>(info("BertForMaskedLM", Family::Bert, Head::MaskedLm), config(Family::Bert, 2)).unwrap();
        assert_eq!(model.output_embeddings().unwrap(), model.input_embeddings().unwrap());

        let candle = LmHeadModel::<CandleBackend>::new(
            ClassInfo::new("GPT2LMHeadModel", Family::Gpt2, Head::CausalLm, BackendKind::Candle),
            config(Family::Gpt2, 2),
        )
        .unwrap();
        assert!(CandleBackend::same_storage(
            candle.output_embeddings().unwrap(),
            candle.input_embeddings().unwrap()
        ));
    }

    #[test]
    fn test_output_count_grows_with_labels() {
        let model = build::<ReferenceBackend>(info("BertForMaskedLM", Family::Bert, Head::MaskedLm), config(Family::Bert, 2)).unwrap();
        let plain = model.forward(&ModelInput::new(ids())).unwrap();
        assert_eq!(plain.kinds(), vec![OutputKind::Logits]);
        assert_eq!(plain.tensor(OutputKind::Logits).unwrap().dims(), &[2, 4, 24]);

        let labels = Labels::Classes(vec![1, -100, 3, 4, 5, 6, -100, 8]);
        let scored = model.forward(&ModelInput::new(ids()).with_labels(labels)).unwrap();
        assert_eq!(scored.len(), plain.len() + 1);
        assert!(ReferenceBackend::scalar(scored.loss().unwrap()).unwrap() > 0.0);
    }

    #[test]
    fn test_causal_shift_ignores_final_position() {
        let model = build::<ReferenceBackend>(info("GPT2LMHeadModel", Family::Gpt2, Head::CausalLm), config(Family::Gpt2, 2)).unwrap();
        let single = ModelInput::new(vec![vec![3]]).with_labels(Labels::Classes(vec![3]));
        let out = model.forward(&single).unwrap();
        assert_eq!(ReferenceBackend::scalar(out.loss().unwrap()).unwrap(), 0.0);
        assert_eq!(out.kinds(), vec![OutputKind::Loss, OutputKind::Logits, OutputKind::Memory]);
    }

    #[test]
    fn test_single_label_is_regression() {
        let regression =
            build::<ReferenceBackend>(info("BertForSequenceClassification", Family::Bert, Head::SequenceClassification), config(Family::Bert, 1)).unwrap();
        assert_eq!(regression.loss_kind(), Some(LossKind::MeanSquaredError));
        let out = regression
            .forward(&ModelInput::new(ids()).with_labels(Labels::Values(vec![0.5, -1.0])))
            .unwrap();
        assert!(out.loss().is_some());
        assert!(matches!(
            regression.forward(&ModelInput::new(ids()).with_labels(Labels::Classes(vec![0, 1]))),
            Err(Error::LabelMismatch(_))
        ));

        let classes =
            build::<ReferenceBackend>(info("BertForSequenceClassification", Family::Bert, Head::SequenceClassification), config(Family::Bert, 3)).unwrap();
        assert_eq!(classes.loss_kind(), Some(LossKind::CrossEntropy));
        let out = classes.forward(&ModelInput::new(ids()).with_labels(Labels::Classes(vec![2, 0]))).unwrap();
        assert_eq!(out.tensor(OutputKind::Logits).unwrap().dims(), &[2, 3]);
    }

    #[test]
    fn test_token_classification_shapes() {
        let model =
            build::<ReferenceBackend>(info("BertForTokenClassification", Family::Bert, Head::TokenClassification), config(Family::Bert, 5)).unwrap();
        let labels = Labels::Classes(vec![0, 1, 2, 3, 4, 0, 1, -100]);
        let out = model.forward(&ModelInput::new(ids()).with_labels(labels)).unwrap();
        assert_eq!(out.tensor(OutputKind::Logits).unwrap().dims(), &[2, 4, 5]);
        assert!(model.forward(&ModelInput::new(ids()).with_labels(Labels::Classes(vec![0, 1]))).is_err());
    }

    #[test]
    fn test_question_answering_clamps_spans() {
        let model =
            build::<ReferenceBackend>(info("BertForQuestionAnswering", Family::Bert, Head::QuestionAnswering), config(Family::Bert, 2)).unwrap();
        let out = model.forward(&ModelInput::new(ids())).unwrap();
        assert_eq!(out.kinds(), vec![OutputKind::StartLogits, OutputKind::EndLogits]);

        let all_out_of_range = Labels::Spans {
            start: vec![40, 99],
            end: vec![-3, 50],
        };
        let scored = model.forward(&ModelInput::new(ids()).with_labels(all_out_of_range)).unwrap();
        let loss: &Tensor = scored.loss().unwrap();
        assert!(loss.data()[0].is_finite());
    }

    #[test]
    fn test_multiple_choice_groups_choices() {
        let model =
            build::<ReferenceBackend>(info("BertForMultipleChoice", Family::Bert, Head::MultipleChoice), config(Family::Bert, 2)).unwrap();
        let input = ModelInput::choices(vec![
            vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]],
            vec![vec![1, 1, 1], vec![2, 2, 2], vec![3, 3, 3]],
        ])
        .unwrap()
        .with_labels(Labels::Classes(vec![2, 0]));
        let out = model.forward(&input).unwrap();
        assert_eq!(out.tensor(OutputKind::Logits).unwrap().dims(), &[2, 3]);
        assert!(model.forward(&ModelInput::new(vec![vec![1, 2, 3]])).is_err());
    }

    #[test]
    fn test_base_model_rejects_labels_and_foreign_configs() {
        let model = build::<ReferenceBackend>(info("BertModel", Family::Bert, Head::Base), config(Family::Bert, 2)).unwrap();
        assert!(model.forward(&ModelInput::new(ids()).with_labels(Labels::Classes(vec![0, 1]))).is_err());

        let foreign = build::<ReferenceBackend>(info("BertModel", Family::Bert, Head::Base), config(Family::Gpt2, 2));
        assert!(matches!(foreign, Err(Error::UnrecognizedConfiguration { .. })));

        let subtype = build::<ReferenceBackend>(info("BertModel", Family::Bert, Head::Base), config(Family::Roberta, 2));
        assert!(subtype.is_ok());
    }

    #[test]
    fn test_resize_keeps_tie() {
        let mut model = build::<ReferenceBackend>(info("BertForMaskedLM", Family::Bert, Head::MaskedLm), config(Family::Bert, 2)).unwrap();
        let before = model.input_embeddings().unwrap().clone();
        model.resize_token_embeddings(Some(30)).unwrap();
        let after = model.input_embeddings().unwrap();
        assert_eq!(after.dims(), &[30, 8]);
        assert_eq!(&after.data()[..24 * 8], before.data());
        assert_eq!(model.config().vocab_size, 30);
        assert_eq!(model.output_embeddings().unwrap(), model.input_embeddings().unwrap());
        assert_eq!(model.params().get("lm_head.bias").unwrap().dims(), &[30]);
    }
}
