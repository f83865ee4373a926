//! Backend over `candle-core` tensors and `candle-nn` layers.

use super::{check_targets, Backend, BackendKind};
use crate::core::config::Activation;
use crate::core::registry::{self, Registry};
use crate::error::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{LayerNorm, Linear, Module};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

static DEVICE: Lazy<Device> = Lazy::new(|| Device::cuda_if_available(0).unwrap_or(Device::Cpu));

pub fn device() -> &'static Device {
    &DEVICE
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CandleBackend;

impl Backend for CandleBackend {
    type Tensor = Tensor;

    const KIND: BackendKind = BackendKind::Candle;
    const SUPPORTS_ALIASING: bool = true;

    fn registry() -> &'static Registry<Self> {
        &registry::CANDLE_REGISTRY
    }

    fn from_vec(data: Vec<f32>, dims: &[usize]) -> Result<Tensor> {
        Ok(Tensor::from_vec(data, dims, device())?)
    }

    fn zeros(dims: &[usize]) -> Result<Tensor> {
        Ok(Tensor::zeros(dims, DType::F32, device())?)
    }

    fn to_vec(t: &Tensor) -> Result<Vec<f32>> {
        Ok(t.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
    }

    fn dims(t: &Tensor) -> Vec<usize> {
        t.dims().to_vec()
    }

    fn same_storage(a: &Tensor, b: &Tensor) -> bool {
        a.id() == b.id()
    }

    fn deep_copy(t: &Tensor) -> Result<Tensor> {
        Ok(t.copy()?)
    }

    fn embedding(table: &Tensor, ids: &[u32], dims: &[usize]) -> Result<Tensor> {
        let index = Tensor::new(ids, device())?;
        let rows = table.index_select(&index, 0)?;
        let mut out_dims = dims.to_vec();
        out_dims.push(table.dim(1)?);
        Ok(rows.reshape(out_dims)?)
    }

    fn linear(x: &Tensor, weight: &Tensor, bias: Option<&Tensor>) -> Result<Tensor> {
        let layer = Linear::new(weight.clone(), bias.cloned());
        Ok(layer.forward(x)?)
    }

    fn add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
        Ok(a.broadcast_add(b)?)
    }

    fn scale(t: &Tensor, factor: f32) -> Result<Tensor> {
        Ok(t.affine(factor as f64, 0.0)?)
    }

    fn layer_norm(x: &Tensor, weight: &Tensor, bias: &Tensor, eps: f64) -> Result<Tensor> {
        let norm = LayerNorm::new(weight.clone(), bias.clone(), eps);
        Ok(norm.forward(x)?)
    }

    fn activate(x: &Tensor, act: Activation) -> Result<Tensor> {
        let y = match act {
            Activation::Gelu => x.gelu_erf()?,
            Activation::GeluNew => x.gelu()?,
            Activation::Relu => x.relu()?,
            Activation::Tanh => x.tanh()?,
            Activation::Silu => candle_nn::ops::silu(x)?,
        };
        Ok(y)
    }

    fn dropout(x: &Tensor, p: f32) -> Result<Tensor> {
        if p <= 0.0 {
            return Ok(x.clone());
        }
        Ok(candle_nn::ops::dropout(x, p)?)
    }

    fn narrow(t: &Tensor, dim: usize, start: usize, len: usize) -> Result<Tensor> {
        Ok(t.narrow(dim, start, len)?)
    }

    fn cat(ts: &[&Tensor], dim: usize) -> Result<Tensor> {
        Ok(Tensor::cat(ts, dim)?)
    }

    fn reshape(t: &Tensor, dims: &[usize]) -> Result<Tensor> {
        Ok(t.reshape(dims)?)
    }

    fn mean_dim(t: &Tensor, dim: usize) -> Result<Tensor> {
        Ok(t.mean(dim)?)
    }

    fn cross_entropy(logits: &Tensor, targets: &[i64], ignore_index: i64) -> Result<Tensor> {
        let (rows, classes) = logits.dims2()?;
        check_targets(targets, rows, classes, ignore_index)?;

        let (kept_rows, kept_targets): (Vec<u32>, Vec<u32>) = targets
            .iter()
            .enumerate()
            .filter(|(_, t)| **t != ignore_index)
            .map(|(row, &t)| (row as u32, t as u32))
            .unzip();
        if kept_rows.is_empty() {
            return Ok(Tensor::zeros((), DType::F32, device())?);
        }

        let rows = Tensor::new(kept_rows.as_slice(), device())?;
        let scored = logits.index_select(&rows, 0)?;
        let target = Tensor::new(kept_targets.as_slice(), device())?;
        Ok(candle_nn::loss::cross_entropy(&scored, &target)?)
    }

    fn mse(predictions: &Tensor, targets: &[f32]) -> Result<Tensor> {
        let target = Tensor::from_vec(targets.to_vec(), predictions.dims(), device())?;
        Ok(candle_nn::loss::mse(predictions, &target)?)
    }

    fn load(path: &Path) -> Result<BTreeMap<String, Tensor>> {
        candle_core::safetensors::load(path, device())?
            .into_iter()
            .map(|(name, t)| Ok((name, t.to_dtype(DType::F32)?)))
            .collect()
    }

    fn save(tensors: &BTreeMap<String, Tensor>, path: &Path) -> Result<()> {
        let tensors: HashMap<&str, Tensor> = tensors
            .iter()
            .map(|(name, t)| (name.as_str(), t.clone()))
            .collect();
        candle_core::safetensors::save(&tensors, path)?;
        Ok(())
    }
}
