//! Shared encoder body: embeddings followed by a stack of residual feed-forward blocks.
//!
//! Every family uses the same computation with its own parameter names, so a
//! checkpoint written for a family keeps the key layout callers expect. Attention
//! kernels are not modelled: memory and key/value state are accepted and advanced
//! but not attended over.

use super::outputs::{ModelOutputs, OutputKind, OutputValue};
use super::params::{Init, ParamSpec, ParamStore};
use crate::core::backend::Backend;
use crate::core::config::PretrainedConfig;
use crate::core::family::{Family, MemoryKind};
use crate::error::{Error, Result};

/// Module paths of the body parameters for one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub word: &'static str,
    pub position: Option<&'static str>,
    pub token_type: Option<&'static str>,
    pub embed_norm: Option<&'static str>,
    pub layers: &'static str,
    pub final_norm: Option<&'static str>,
}

impl Layout {
    pub fn of(family: Family) -> Self {
        const BERT: Layout = Layout {
            word: "embeddings.word_embeddings",
            position: Some("embeddings.position_embeddings"),
            token_type: Some("embeddings.token_type_embeddings"),
            embed_norm: Some("embeddings.LayerNorm"),
            layers: "encoder.layer",
            final_norm: None,
        };
        const XLM: Layout = Layout {
            word: "embeddings",
            position: Some("position_embeddings"),
            token_type: None,
            embed_norm: Some("layer_norm_emb"),
            layers: "layers",
            final_norm: None,
        };
        let bare = |word: &'static str, layers: &'static str| Layout {
            word,
            position: None,
            token_type: None,
            embed_norm: None,
            layers,
            final_norm: None,
        };

        match family {
            Family::Bert
            | Family::Roberta
            | Family::Camembert
            | Family::XlmRoberta
            | Family::Albert
            | Family::Electra
            | Family::MobileBert => BERT,
            Family::DistilBert => Layout {
                token_type: None,
                layers: "transformer.layer",
                ..BERT
            },
            Family::Xlm | Family::Flaubert => XLM,
            Family::OpenAiGpt => Layout {
                position: Some("positions_embed"),
                ..bare("tokens_embed", "h")
            },
            Family::Gpt2 => Layout {
                position: Some("wpe"),
                final_norm: Some("ln_f"),
                ..bare("wte", "h")
            },
            Family::Ctrl => Layout {
                final_norm: Some("layernorm"),
                ..bare("w", "h")
            },
            Family::TransfoXl => bare("word_emb", "layers"),
            Family::XlNet => bare("word_embedding", "layer"),
            Family::T5 => Layout {
                final_norm: Some("encoder.final_layer_norm"),
                ..bare("shared", "encoder.block")
            },
        }
    }
}

/// Result of one body pass.
#[derive(Debug, Clone)]
pub struct BodyOutput<T> {
    pub last_hidden_state: T,
    /// Per-layer state to feed into the next call.
    pub memory: Option<Vec<T>>,
    /// Embedding output followed by every layer's output.
    pub hidden_states: Option<Vec<T>>,
}

impl<T> BodyOutput<T> {
    /// Task outputs in order, followed by memory and hidden states when present.
    pub fn into_outputs(self, primary: Vec<(OutputKind, T)>) -> ModelOutputs<T> {
        let mut outputs = ModelOutputs::new();
        for (kind, tensor) in primary {
            outputs.push_tensor(kind, tensor);
        }
        if let Some(memory) = self.memory {
            outputs.push(OutputKind::Memory, OutputValue::Sequence(memory));
        }
        if let Some(states) = self.hidden_states {
            outputs.push(OutputKind::HiddenStates, OutputValue::Sequence(states));
        }
        outputs
    }
}

pub struct TransformerBody {
    family: Family,
    prefix: String,
    layout: Layout,
}

impl TransformerBody {
    /// Body of `family`'s classes. Head models nest it under the family's base prefix.
    pub fn new(family: Family, nested: bool) -> Self {
        Self {
            family,
            prefix: if nested { family.base_prefix().to_string() } else { String::new() },
            layout: Layout::of(family),
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn key(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }

    pub fn word_embeddings_key(&self) -> String {
        self.key(&format!("{}.weight", self.layout.word))
    }

    fn uses_token_types(&self, config: &PretrainedConfig) -> bool {
        self.layout.token_type.is_some() && config.type_vocab_size > 0
    }

    pub fn parameters(&self, config: &PretrainedConfig) -> Vec<ParamSpec> {
        let h = config.hidden_size;
        let std = config.initializer_range;
        let mut specs = vec![ParamSpec::new(self.word_embeddings_key(), vec![config.vocab_size, h], Init::Normal(std))];

        if let Some(pos) = self.layout.position {
            specs.push(ParamSpec::new(
                self.key(&format!("{}.weight", pos)),
                vec![config.max_position_embeddings, h],
                Init::Normal(std),
            ));
        }
        if let Some(tt) = self.layout.token_type.filter(|_| self.uses_token_types(config)) {
            specs.push(ParamSpec::new(
                self.key(&format!("{}.weight", tt)),
                vec![config.type_vocab_size, h],
                Init::Normal(std),
            ));
        }
        if let Some(norm) = self.layout.embed_norm {
            specs.extend(ParamSpec::layer_norm(&self.key(norm), h));
        }
        for i in 0..config.num_hidden_layers {
            let layer = self.key(&format!("{}.{}", self.layout.layers, i));
            specs.extend(ParamSpec::linear(&format!("{}.ffn.in", layer), config.intermediate_size, h, std));
            specs.extend(ParamSpec::linear(&format!("{}.ffn.out", layer), h, config.intermediate_size, std));
            specs.extend(ParamSpec::layer_norm(&format!("{}.norm", layer), h));
        }
        if let Some(norm) = self.layout.final_norm {
            specs.extend(ParamSpec::layer_norm(&self.key(norm), h));
        }
        specs
    }

    pub fn forward<B: Backend>(
        &self,
        config: &PretrainedConfig,
        params: &ParamStore<B>,
        input_ids: &[Vec<u32>],
        token_type_ids: Option<&[Vec<u32>]>,
        memory: Option<&[B::Tensor]>,
        training: bool,
    ) -> Result<BodyOutput<B::Tensor>> {
        let (batch, seq) = self.check_ids(config, input_ids)?;
        let memory = self.check_memory::<B>(config, memory, batch)?;
        let offset = match (self.family.memory_kind(), memory) {
            (MemoryKind::KeyValue, Some(past)) => past.first().map(|m| B::dims(m)[1]).unwrap_or(0),
            _ => 0,
        };

        let ids: Vec<u32> = input_ids.iter().flatten().copied().collect();
        let mut h = B::embedding(params.get(&self.word_embeddings_key())?, &ids, &[batch, seq])?;

        if let Some(pos) = self.layout.position {
            if offset + seq > config.max_position_embeddings {
                return Err(Error::ShapeMismatch(format!(
                    "sequence of {} positions exceeds max_position_embeddings {}",
                    offset + seq,
                    config.max_position_embeddings
                )));
            }
            let positions: Vec<u32> = (0..batch)
                .flat_map(|_| (offset..offset + seq).map(|p| p as u32))
                .collect();
            let table = params.get(&self.key(&format!("{}.weight", pos)))?;
            h = B::add(&h, &B::embedding(table, &positions, &[batch, seq])?)?;
        }

        match (self.layout.token_type.filter(|_| self.uses_token_types(config)), token_type_ids) {
            (Some(tt), types) => {
                let types: Vec<u32> = match types {
                    Some(rows) => self.check_token_types(config, rows, batch, seq)?,
                    None => vec![0; batch * seq],
                };
                let table = params.get(&self.key(&format!("{}.weight", tt)))?;
                h = B::add(&h, &B::embedding(table, &types, &[batch, seq])?)?;
            }
            (None, Some(_)) => {
                return Err(Error::ShapeMismatch(format!("{} takes no token type ids", self.family)));
            }
            (None, None) => {}
        }

        if let Some(norm) = self.layout.embed_norm {
            h = self.norm::<B>(config, params, &self.key(norm), &h)?;
        }
        if training {
            h = B::dropout(&h, config.hidden_dropout_prob)?;
        }

        let mut hidden_states = config.output_hidden_states.then(Vec::new);
        let mut next_memory = self.emits_memory(config).then(Vec::new);
        for i in 0..config.num_hidden_layers {
            if let Some(states) = hidden_states.as_mut() {
                states.push(h.clone());
            }
            if let Some(next) = next_memory.as_mut() {
                next.push(self.advance_memory::<B>(config, memory.map(|m| &m[i]), &h, batch)?);
            }
            h = self.layer::<B>(config, params, i, &h, training)?;
        }

        if let Some(norm) = self.layout.final_norm {
            h = self.norm::<B>(config, params, &self.key(norm), &h)?;
        }
        if let Some(states) = hidden_states.as_mut() {
            states.push(h.clone());
        }

        Ok(BodyOutput {
            last_hidden_state: h,
            memory: next_memory,
            hidden_states,
        })
    }

    fn layer<B: Backend>(
        &self,
        config: &PretrainedConfig,
        params: &ParamStore<B>,
        index: usize,
        h: &B::Tensor,
        training: bool,
    ) -> Result<B::Tensor> {
        let layer = self.key(&format!("{}.{}", self.layout.layers, index));
        let p = |name: &str| params.get(&format!("{}.{}", layer, name));

        let x = B::linear(h, p("ffn.in.weight")?, Some(p("ffn.in.bias")?))?;
        let x = B::activate(&x, config.hidden_act)?;
        let mut x = B::linear(&x, p("ffn.out.weight")?, Some(p("ffn.out.bias")?))?;
        if training {
            x = B::dropout(&x, config.hidden_dropout_prob)?;
        }
        B::layer_norm(&B::add(h, &x)?, p("norm.weight")?, p("norm.bias")?, config.layer_norm_eps)
    }

    fn norm<B: Backend>(&self, config: &PretrainedConfig, params: &ParamStore<B>, prefix: &str, h: &B::Tensor) -> Result<B::Tensor> {
        B::layer_norm(
            h,
            params.get(&format!("{}.weight", prefix))?,
            params.get(&format!("{}.bias", prefix))?,
            config.layer_norm_eps,
        )
    }

    fn emits_memory(&self, config: &PretrainedConfig) -> bool {
        match self.family.memory_kind() {
            MemoryKind::None => false,
            MemoryKind::Recurrent => config.mem_len.unwrap_or(0) > 0,
            MemoryKind::KeyValue => true,
        }
    }

    fn advance_memory<B: Backend>(
        &self,
        config: &PretrainedConfig,
        previous: Option<&B::Tensor>,
        layer_input: &B::Tensor,
        batch: usize,
    ) -> Result<B::Tensor> {
        match self.family.memory_kind() {
            MemoryKind::Recurrent => {
                let mem_len = config.mem_len.unwrap_or(0);
                let previous = match previous {
                    Some(m) => m.clone(),
                    None => B::zeros(&[batch, mem_len, config.hidden_size])?,
                };
                let joined = B::cat(&[&previous, layer_input], 1)?;
                let total = B::dims(&joined)[1];
                B::narrow(&joined, 1, total.saturating_sub(mem_len), mem_len.min(total))
            }
            _ => match previous {
                Some(past) => B::cat(&[past, layer_input], 1),
                None => Ok(layer_input.clone()),
            },
        }
    }

    fn check_ids(&self, config: &PretrainedConfig, input_ids: &[Vec<u32>]) -> Result<(usize, usize)> {
        let batch = input_ids.len();
        let seq = input_ids.first().map(Vec::len).unwrap_or(0);
        if batch == 0 || seq == 0 {
            return Err(Error::ShapeMismatch("input_ids must hold at least one token".to_string()));
        }
        if input_ids.iter().any(|row| row.len() != seq) {
            return Err(Error::ShapeMismatch("all input_ids rows must have the same length".to_string()));
        }
        if let Some(&bad) = input_ids.iter().flatten().find(|&&id| id as usize >= config.vocab_size) {
            return Err(Error::ShapeMismatch(format!("token id {} outside vocabulary of {}", bad, config.vocab_size)));
        }
        Ok((batch, seq))
    }

    fn check_token_types(&self, config: &PretrainedConfig, rows: &[Vec<u32>], batch: usize, seq: usize) -> Result<Vec<u32>> {
        if rows.len() != batch || rows.iter().any(|r| r.len() != seq) {
            return Err(Error::ShapeMismatch("token_type_ids must match input_ids".to_string()));
        }
        let flat: Vec<u32> = rows.iter().flatten().copied().collect();
        if let Some(&bad) = flat.iter().find(|&&t| t as usize >= config.type_vocab_size) {
            return Err(Error::ShapeMismatch(format!("token type {} outside 0..{}", bad, config.type_vocab_size)));
        }
        Ok(flat)
    }

    fn check_memory<'m, B: Backend>(
        &self,
        config: &PretrainedConfig,
        memory: Option<&'m [B::Tensor]>,
        batch: usize,
    ) -> Result<Option<&'m [B::Tensor]>> {
        let Some(memory) = memory else {
            return Ok(None);
        };
        if !self.emits_memory(config) {
            return Err(Error::ShapeMismatch(format!("{} takes no memory", self.family)));
        }
        if memory.len() != config.num_hidden_layers {
            return Err(Error::ShapeMismatch(format!(
                "memory holds {} layers, model has {}",
                memory.len(),
                config.num_hidden_layers
            )));
        }
        for m in memory {
            let dims = B::dims(m);
            if dims.len() != 3 || dims[0] != batch || dims[2] != config.hidden_size {
                return Err(Error::ShapeMismatch(format!(
                    "memory entries must be [{}, len, {}], got {:?}",
                    batch, config.hidden_size, dims
                )));
            }
        }
        Ok(Some(memory))
    }
}
