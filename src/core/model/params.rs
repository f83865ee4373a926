use crate::core::backend::Backend;
use crate::error::{Error, Result};
use crate::rng::{SeededRng, INIT_SEED};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    Normal(f32),
    Zeros,
    Ones,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub dims: Vec<usize>,
    pub init: Init,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, dims: Vec<usize>, init: Init) -> Self {
        Self {
            name: name.into(),
            dims,
            init,
        }
    }

    /// Weight and bias of a `[out, in]` projection under `prefix`.
    pub fn linear(prefix: &str, out_features: usize, in_features: usize, std: f32) -> [ParamSpec; 2] {
        [
            ParamSpec::new(format!("{}.weight", prefix), vec![out_features, in_features], Init::Normal(std)),
            ParamSpec::new(format!("{}.bias", prefix), vec![out_features], Init::Zeros),
        ]
    }

    pub fn layer_norm(prefix: &str, width: usize) -> [ParamSpec; 2] {
        [
            ParamSpec::new(format!("{}.weight", prefix), vec![width], Init::Ones),
            ParamSpec::new(format!("{}.bias", prefix), vec![width], Init::Zeros),
        ]
    }
}

/// Named learned parameters of one model instance.
pub struct ParamStore<B: Backend> {
    tensors: BTreeMap<String, B::Tensor>,
}

impl<B: Backend> ParamStore<B> {
    pub fn new() -> Self {
        Self {
            tensors: BTreeMap::new(),
        }
    }

    /// Fresh parameters, drawn in declaration order from a fixed seed.
    pub fn init(specs: &[ParamSpec]) -> Result<Self> {
        let mut rng = SeededRng::new(INIT_SEED);
        let mut store = Self::new();
        for spec in specs {
            let numel = spec.dims.iter().product();
            let data = match spec.init {
                Init::Normal(std) => rng.normal_vec(numel, std)?,
                Init::Zeros => vec![0.0; numel],
                Init::Ones => vec![1.0; numel],
            };
            store.insert(spec.name.clone(), B::from_vec(data, &spec.dims)?);
        }
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Result<&B::Tensor> {
        self.tensors
            .get(name)
            .ok_or_else(|| Error::MissingParameter(name.to_string()))
    }

    pub fn get_opt(&self, name: &str) -> Option<&B::Tensor> {
        self.tensors.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: B::Tensor) -> Option<B::Tensor> {
        self.tensors.insert(name.into(), tensor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.tensors.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &B::Tensor)> {
        self.tensors.iter()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, B::Tensor> {
        &self.tensors
    }

    pub fn num_parameters(&self) -> usize {
        self.tensors
            .values()
            .map(|t| B::dims(t).iter().product::<usize>())
            .sum()
    }
}

impl<B: Backend> Default for ParamStore<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Grow or shrink the leading dimension of `t`, keeping existing rows.
pub(crate) fn resize_rows<B: Backend>(t: &B::Tensor, rows: usize, fill: Init, seed: u64) -> Result<B::Tensor> {
    let mut dims = B::dims(t);
    let old_rows = *dims
        .first()
        .ok_or_else(|| Error::ShapeMismatch("cannot resize a scalar".to_string()))?;
    let width: usize = dims[1..].iter().product();
    let keep = old_rows.min(rows);

    let mut data = B::to_vec(t)?;
    data.truncate(keep * width);
    let added = (rows - keep) * width;
    match fill {
        Init::Normal(std) => data.extend(SeededRng::new(seed).normal_vec(added, std)?),
        Init::Zeros => data.resize(keep * width + added, 0.0),
        Init::Ones => data.resize(keep * width + added, 1.0),
    }
    dims[0] = rows;
    B::from_vec(data, &dims)
}
