pub mod candle;
pub mod reference;

pub use self::candle::CandleBackend;
pub use self::reference::ReferenceBackend;

use crate::core::config::Activation;
use crate::core::registry::Registry;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The two numeric backends a model class can be instantiated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Candle,
    Reference,
}

impl BackendKind {
    pub fn weights_file(self) -> &'static str {
        match self {
            BackendKind::Candle => "model.safetensors",
            BackendKind::Reference => "reference_model.safetensors",
        }
    }

    pub fn alternate(self) -> BackendKind {
        match self {
            BackendKind::Candle => BackendKind::Reference,
            BackendKind::Reference => BackendKind::Candle,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Candle => write!(f, "candle"),
            BackendKind::Reference => write!(f, "reference"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "candle" => Ok(BackendKind::Candle),
            "reference" => Ok(BackendKind::Reference),
            other => Err(format!("unknown backend {} (expected candle or reference)", other)),
        }
    }
}

/// Tensor operations the model bodies and task heads are written against.
///
/// Shapes follow the `[batch, seq, hidden]` convention. Linear weights are `[out, in]`.
pub trait Backend: Sized + Send + Sync + 'static {
    type Tensor: Clone + fmt::Debug + Send + Sync;

    const KIND: BackendKind;
    /// Whether two parameters can share one storage. Without it, tying copies values.
    const SUPPORTS_ALIASING: bool;

    fn registry() -> &'static Registry<Self>;

    fn from_vec(data: Vec<f32>, dims: &[usize]) -> Result<Self::Tensor>;
    fn zeros(dims: &[usize]) -> Result<Self::Tensor>;
    fn to_vec(t: &Self::Tensor) -> Result<Vec<f32>>;
    fn dims(t: &Self::Tensor) -> Vec<usize>;
    fn same_storage(a: &Self::Tensor, b: &Self::Tensor) -> bool;
    fn deep_copy(t: &Self::Tensor) -> Result<Self::Tensor>;

    /// Look up `ids` in a `[vocab, hidden]` table; the result has shape `dims + [hidden]`.
    fn embedding(table: &Self::Tensor, ids: &[u32], dims: &[usize]) -> Result<Self::Tensor>;
    fn linear(x: &Self::Tensor, weight: &Self::Tensor, bias: Option<&Self::Tensor>) -> Result<Self::Tensor>;
    fn add(a: &Self::Tensor, b: &Self::Tensor) -> Result<Self::Tensor>;
    fn scale(t: &Self::Tensor, factor: f32) -> Result<Self::Tensor>;
    fn layer_norm(x: &Self::Tensor, weight: &Self::Tensor, bias: &Self::Tensor, eps: f64) -> Result<Self::Tensor>;
    fn activate(x: &Self::Tensor, act: Activation) -> Result<Self::Tensor>;
    fn dropout(x: &Self::Tensor, p: f32) -> Result<Self::Tensor>;

    fn narrow(t: &Self::Tensor, dim: usize, start: usize, len: usize) -> Result<Self::Tensor>;
    fn cat(ts: &[&Self::Tensor], dim: usize) -> Result<Self::Tensor>;
    fn reshape(t: &Self::Tensor, dims: &[usize]) -> Result<Self::Tensor>;
    fn mean_dim(t: &Self::Tensor, dim: usize) -> Result<Self::Tensor>;

    /// Mean categorical loss of `[n, classes]` logits; rows whose target equals
    /// `ignore_index` are excluded. Zero when no row is scored.
    fn cross_entropy(logits: &Self::Tensor, targets: &[i64], ignore_index: i64) -> Result<Self::Tensor>;
    /// Mean squared error of `predictions` against `targets` of the same element count.
    fn mse(predictions: &Self::Tensor, targets: &[f32]) -> Result<Self::Tensor>;

    fn load(path: &Path) -> Result<BTreeMap<String, Self::Tensor>>;
    fn save(tensors: &BTreeMap<String, Self::Tensor>, path: &Path) -> Result<()>;

    fn scalar(t: &Self::Tensor) -> Result<f32> {
        Self::to_vec(t)?
            .first()
            .copied()
            .ok_or_else(|| crate::error::Error::ShapeMismatch("empty tensor has no scalar value".to_string()))
    }
}

/// Targets of a categorical loss, checked against the class count.
pub(crate) fn check_targets(targets: &[i64], rows: usize, classes: usize, ignore_index: i64) -> Result<()> {
    use crate::error::Error;
    if targets.len() != rows {
        return Err(Error::LabelMismatch(format!("{} targets for {} scored rows", targets.len(), rows)));
    }
    if let Some(bad) = targets
        .iter()
        .find(|&&t| t != ignore_index && (t < 0 || t as usize >= classes))
    {
        return Err(Error::LabelMismatch(format!("target {} outside 0..{}", bad, classes)));
    }
    Ok(())
}
