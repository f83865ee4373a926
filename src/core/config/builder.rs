use super::{Activation, PretrainedConfig, SummaryType};
use crate::core::Family;
use crate::error::Result;
use serde_json::Value;

pub struct PretrainedConfigBuilder {
    config: PretrainedConfig,
}

impl PretrainedConfigBuilder {
    pub fn new(family: Family) -> Self {
        Self {
            config: family.template(),
        }
    }

    pub fn vocab_size(mut self, size: usize) -> Self {
        self.config.vocab_size = size;
        self
    }

    pub fn hidden_size(mut self, size: usize) -> Self {
        self.config.hidden_size = size;
        self
    }

    pub fn intermediate_size(mut self, size: usize) -> Self {
        self.config.intermediate_size = size;
        self
    }

    pub fn num_hidden_layers(mut self, n: usize) -> Self {
        self.config.num_hidden_layers = n;
        self
    }

    pub fn num_attention_heads(mut self, n: usize) -> Self {
        self.config.num_attention_heads = n;
        self
    }

    pub fn max_position_embeddings(mut self, len: usize) -> Self {
        self.config.max_position_embeddings = len;
        self
    }

    pub fn type_vocab_size(mut self, size: usize) -> Self {
        self.config.type_vocab_size = size;
        self
    }

    pub fn hidden_act(mut self, act: Activation) -> Self {
        self.config.hidden_act = act;
        self
    }

    pub fn dropout(mut self, p: f32) -> Self {
        self.config.hidden_dropout_prob = p;
        self.config.attention_probs_dropout_prob = p;
        self
    }

    pub fn mem_len(mut self, len: usize) -> Self {
        self.config.mem_len = Some(len);
        self
    }

    pub fn num_labels(mut self, n: usize) -> Self {
        self.config.num_labels = n;
        self.config.id2label = PretrainedConfig::default_labels(n);
        self
    }

    pub fn tie_word_embeddings(mut self, tie: bool) -> Self {
        self.config.tie_word_embeddings = tie;
        self
    }

    pub fn output_hidden_states(mut self, enabled: bool) -> Self {
        self.config.output_hidden_states = enabled;
        self
    }

    pub fn summary_type(mut self, summary: SummaryType) -> Self {
        self.config.summary_type = summary;
        self
    }

    pub fn summary_activation(mut self, act: Option<Activation>) -> Self {
        self.config.summary_activation = act;
        self
    }

    pub fn extra<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.config.extra.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<PretrainedConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = PretrainedConfig::builder(Family::XlNet)
            .vocab_size(99)
            .hidden_size(32)
            .num_hidden_layers(2)
            .mem_len(8)
            .num_labels(3)
            .extra("untie_r", true)
            .build()
            .unwrap();

        assert_eq!(config.family, Family::XlNet);
        assert_eq!(config.hidden_size, 32);
        assert_eq!(config.mem_len, Some(8));
        assert_eq!(config.id2label.len(), 3);
        assert_eq!(config.extra.get("untie_r"), Some(&Value::Bool(true)));
        assert_eq!(config.summary_type, SummaryType::Last);
    }

    #[test]
    fn test_builder_rejects_zero_layers() {
        assert!(PretrainedConfig::builder(Family::Bert).num_hidden_layers(0).build().is_err());
    }
}
