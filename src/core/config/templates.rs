use super::{Activation, PretrainedConfig, SummaryType};
use crate::core::Family;
use std::collections::BTreeMap;

impl Family {
    /// Default configuration for the family. Child families start from a copy of their
    /// parent's template and override what differs.
    pub fn template(self) -> PretrainedConfig {
        match self {
            Family::Bert => bert(),
            Family::Roberta => PretrainedConfig {
                family: Family::Roberta,
                vocab_size: 50265,
                max_position_embeddings: 514,
                type_vocab_size: 1,
                layer_norm_eps: 1e-5,
                pad_token_id: Some(1),
                ..Family::Bert.template()
            },
            Family::Camembert => PretrainedConfig {
                family: Family::Camembert,
                vocab_size: 32005,
                ..Family::Roberta.template()
            },
            Family::XlmRoberta => PretrainedConfig {
                family: Family::XlmRoberta,
                vocab_size: 250002,
                ..Family::Roberta.template()
            },
            Family::DistilBert => PretrainedConfig {
                family: Family::DistilBert,
                num_hidden_layers: 6,
                type_vocab_size: 0,
                ..bert()
            },
            Family::Albert => PretrainedConfig {
                family: Family::Albert,
                vocab_size: 30000,
                hidden_size: 4096,
                num_attention_heads: 64,
                intermediate_size: 16384,
                hidden_act: Activation::GeluNew,
                hidden_dropout_prob: 0.0,
                attention_probs_dropout_prob: 0.0,
                ..bert()
            },
            Family::Electra => PretrainedConfig {
                family: Family::Electra,
                hidden_size: 256,
                num_attention_heads: 4,
                intermediate_size: 1024,
                ..bert()
            },
            Family::MobileBert => PretrainedConfig {
                family: Family::MobileBert,
                hidden_size: 512,
                num_hidden_layers: 24,
                num_attention_heads: 4,
                intermediate_size: 512,
                hidden_act: Activation::Relu,
                hidden_dropout_prob: 0.0,
                ..bert()
            },
            Family::OpenAiGpt => PretrainedConfig {
                family: Family::OpenAiGpt,
                vocab_size: 40478,
                hidden_act: Activation::GeluNew,
                type_vocab_size: 0,
                layer_norm_eps: 1e-5,
                pad_token_id: None,
                summary_type: SummaryType::ClsIndex,
                ..bert()
            },
            Family::Gpt2 => PretrainedConfig {
                family: Family::Gpt2,
                vocab_size: 50257,
                max_position_embeddings: 1024,
                ..Family::OpenAiGpt.template()
            },
            Family::Ctrl => PretrainedConfig {
                family: Family::Ctrl,
                vocab_size: 246534,
                hidden_size: 1280,
                num_hidden_layers: 48,
                num_attention_heads: 16,
                intermediate_size: 8192,
                hidden_act: Activation::Relu,
                max_position_embeddings: 256,
                layer_norm_eps: 1e-6,
                ..Family::OpenAiGpt.template()
            },
            Family::TransfoXl => PretrainedConfig {
                family: Family::TransfoXl,
                vocab_size: 267735,
                hidden_size: 1024,
                num_hidden_layers: 18,
                num_attention_heads: 16,
                intermediate_size: 4096,
                hidden_act: Activation::Relu,
                type_vocab_size: 0,
                layer_norm_eps: 1e-5,
                pad_token_id: None,
                mem_len: Some(1600),
                tie_word_embeddings: true,
                summary_type: SummaryType::Last,
                ..bert()
            },
            Family::XlNet => PretrainedConfig {
                family: Family::XlNet,
                vocab_size: 32000,
                hidden_size: 1024,
                num_hidden_layers: 24,
                num_attention_heads: 16,
                intermediate_size: 4096,
                type_vocab_size: 0,
                pad_token_id: Some(5),
                summary_type: SummaryType::Last,
                summary_last_dropout: 0.1,
                ..bert()
            },
            Family::Xlm => PretrainedConfig {
                family: Family::Xlm,
                vocab_size: 30145,
                hidden_size: 2048,
                num_attention_heads: 16,
                intermediate_size: 8192,
                type_vocab_size: 0,
                initializer_range: 2048f32.powf(-0.5),
                pad_token_id: Some(2),
                ..bert()
            },
            Family::Flaubert => PretrainedConfig {
                family: Family::Flaubert,
                vocab_size: 68729,
                ..Family::Xlm.template()
            },
            Family::T5 => PretrainedConfig {
                family: Family::T5,
                vocab_size: 32128,
                hidden_size: 512,
                num_hidden_layers: 6,
                num_attention_heads: 8,
                intermediate_size: 2048,
                hidden_act: Activation::Relu,
                type_vocab_size: 0,
                layer_norm_eps: 1e-6,
                initializer_range: 0.05,
                ..bert()
            },
        }
    }
}

fn bert() -> PretrainedConfig {
    PretrainedConfig {
        family: Family::Bert,
        vocab_size: 30522,
        hidden_size: 768,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        intermediate_size: 3072,
        hidden_act: Activation::Gelu,
        hidden_dropout_prob: 0.1,
        attention_probs_dropout_prob: 0.1,
        max_position_embeddings: 512,
        type_vocab_size: 2,
        initializer_range: 0.02,
        layer_norm_eps: 1e-12,
        pad_token_id: Some(0),
        mem_len: None,
        tie_word_embeddings: true,
        num_labels: 2,
        id2label: PretrainedConfig::default_labels(2),
        output_hidden_states: false,
        output_attentions: false,
        torchscript: false,
        summary_type: SummaryType::First,
        summary_use_proj: true,
        summary_activation: None,
        summary_proj_to_labels: true,
        summary_first_dropout: 0.1,
        summary_last_dropout: 0.0,
        architectures: None,
        extra: BTreeMap::new(),
    }
}
