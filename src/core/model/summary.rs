use super::params::{ParamSpec, ParamStore};
use crate::core::backend::Backend;
use crate::core::config::{PretrainedConfig, SummaryType};
use crate::error::{Error, Result};

const PREFIX: &str = "sequence_summary.summary";

/// Reduces `[batch, seq, hidden]` states to one vector per sequence.
#[derive(Debug, Clone)]
pub struct SequenceSummary {
    summary_type: SummaryType,
    projection: Option<usize>,
    out_dim: usize,
}

impl SequenceSummary {
    pub fn new(config: &PretrainedConfig, num_outputs: usize) -> Self {
        let projection = config.summary_use_proj.then(|| {
            if config.summary_proj_to_labels && num_outputs > 0 {
                num_outputs
            } else {
                config.hidden_size
            }
        });
        Self {
            summary_type: config.summary_type,
            projection,
            out_dim: projection.unwrap_or(config.hidden_size),
        }
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn parameters(&self, config: &PretrainedConfig) -> Vec<ParamSpec> {
        match self.projection {
            Some(out) => ParamSpec::linear(PREFIX, out, config.hidden_size, config.initializer_range).to_vec(),
            None => Vec::new(),
        }
    }

    pub fn forward<B: Backend>(
        &self,
        config: &PretrainedConfig,
        params: &ParamStore<B>,
        hidden: &B::Tensor,
        cls_index: Option<&[usize]>,
        training: bool,
    ) -> Result<B::Tensor> {
        let dims = B::dims(hidden);
        let (batch, seq, width) = match dims.as_slice() {
            &[b, s, h] => (b, s, h),
            other => return Err(Error::ShapeMismatch(format!("summary expects [batch, seq, hidden], got {:?}", other))),
        };

        let pooled = match (self.summary_type, cls_index) {
            (SummaryType::First, _) => B::reshape(&B::narrow(hidden, 1, 0, 1)?, &[batch, width])?,
            (SummaryType::Mean, _) => B::mean_dim(hidden, 1)?,
            (SummaryType::ClsIndex, Some(index)) => gather_positions::<B>(hidden, index, batch, seq, width)?,
            (SummaryType::Last, _) | (SummaryType::ClsIndex, None) => {
                B::reshape(&B::narrow(hidden, 1, seq - 1, 1)?, &[batch, width])?
            }
        };

        let mut x = pooled;
        if training {
            x = B::dropout(&x, config.summary_first_dropout)?;
        }
        if self.projection.is_some() {
            let weight = params.get(&format!("{}.weight", PREFIX))?;
            let bias = params.get(&format!("{}.bias", PREFIX))?;
            x = B::linear(&x, weight, Some(bias))?;
        }
        if let Some(act) = config.summary_activation {
            x = B::activate(&x, act)?;
        }
        if training {
            x = B::dropout(&x, config.summary_last_dropout)?;
        }
        Ok(x)
    }
}

fn gather_positions<B: Backend>(hidden: &B::Tensor, index: &[usize], batch: usize, seq: usize, width: usize) -> Result<B::Tensor> {
    if index.len() != batch {
        return Err(Error::ShapeMismatch(format!("{} cls indices for a batch of {}", index.len(), batch)));
    }
    let rows = index
        .iter()
        .enumerate()
        .map(|(row, &pos)| {
            if pos >= seq {
                return Err(Error::ShapeMismatch(format!("cls index {} outside sequence of {}", pos, seq)));
            }
            B::narrow(&B::narrow(hidden, 0, row, 1)?, 1, pos, 1)
        })
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&B::Tensor> = rows.iter().collect();
    B::reshape(&B::cat(&refs, 0)?, &[batch, width])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::ReferenceBackend;
    use crate::core::family::Family;
    use crate::core::tensor::{Shape, Tensor};

    fn states() -> Tensor {
        // [2, 3, 2]: row r, position p holds (10r + p, -(10r + p))
        let data = (0..2)
            .flat_map(|r| (0..3).flat_map(move |p| {
                let v = (10 * r + p) as f32;
                [v, -v]
            }))
            .collect();
        Tensor::new(data, Shape::new(vec![2, 3, 2])).unwrap()
    }

    fn summarize(summary_type: SummaryType, cls: Option<&[usize]>) -> Vec<f32> {
        let mut config = PretrainedConfig::builder(Family::XlNet).hidden_size(2).num_attention_heads(1).build().unwrap();
        config.summary_type = summary_type;
        config.summary_use_proj = false;
        config.summary_activation = None;
        let summary = SequenceSummary::new(&config, 2);
        let params = ParamStore::<ReferenceBackend>::new();
        summary
            .forward::<ReferenceBackend>(&config, &params, &states(), cls, false)
            .unwrap()
            .data()
            .to_vec()
    }

    #[test]
    fn test_summary_types() {
        assert_eq!(summarize(SummaryType::First, None), vec![0.0, -0.0, 10.0, -10.0]);
        assert_eq!(summarize(SummaryType::Last, None), vec![2.0, -2.0, 12.0, -12.0]);
        assert_eq!(summarize(SummaryType::Mean, None), vec![1.0, -1.0, 11.0, -11.0]);
        assert_eq!(summarize(SummaryType::ClsIndex, Some(&[1, 0])), vec![1.0, -1.0, 10.0, -10.0]);
        assert_eq!(summarize(SummaryType::ClsIndex, None), summarize(SummaryType::Last, None));
    }

    #[test]
    fn test_projection_width() {
        let mut config = PretrainedConfig::new(Family::XlNet);
        config.summary_use_proj = true;
        config.summary_proj_to_labels = true;
        assert_eq!(SequenceSummary::new(&config, 3).out_dim(), 3);
        config.summary_proj_to_labels = false;
        assert_eq!(SequenceSummary::new(&config, 3).out_dim(), config.hidden_size);
        config.summary_use_proj = false;
        assert!(SequenceSummary::new(&config, 3).parameters(&config).is_empty());
    }
}
