//! Host-only backend over the crate's own dense tensor.
//!
//! Tensors are plain values here: cloning copies data, so there is no parameter
//! aliasing and tied weights are kept as exact numeric copies.

use super::{check_targets, Backend, BackendKind};
use crate::core::config::Activation;
use crate::core::registry::{self, Registry};
use crate::core::tensor::{Shape, Tensor, TensorOps};
use crate::error::{Error, Result};
use crate::rng::SeededRng;
use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

static DROPOUT_RNG: Lazy<Mutex<SeededRng>> = Lazy::new(|| Mutex::new(SeededRng::new(0x0d20_9f11)));

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceBackend;

impl Backend for ReferenceBackend {
    type Tensor = Tensor;

    const KIND: BackendKind = BackendKind::Reference;
    const SUPPORTS_ALIASING: bool = false;

    fn registry() -> &'static Registry<Self> {
        &registry::REFERENCE_REGISTRY
    }

    fn from_vec(data: Vec<f32>, dims: &[usize]) -> Result<Tensor> {
        Tensor::new(data, Shape::from_slice(dims))
    }

    fn zeros(dims: &[usize]) -> Result<Tensor> {
        Ok(Tensor::zeros(Shape::from_slice(dims)))
    }

    fn to_vec(t: &Tensor) -> Result<Vec<f32>> {
        Ok(t.data().to_vec())
    }

    fn dims(t: &Tensor) -> Vec<usize> {
        t.dims().to_vec()
    }

    fn same_storage(_a: &Tensor, _b: &Tensor) -> bool {
        false
    }

    fn deep_copy(t: &Tensor) -> Result<Tensor> {
        Ok(t.clone())
    }

    fn embedding(table: &Tensor, ids: &[u32], dims: &[usize]) -> Result<Tensor> {
        let rows = table.index_select_rows(ids)?;
        let mut out_dims = dims.to_vec();
        out_dims.push(table.dims().get(1).copied().unwrap_or(0));
        rows.reshape(Shape::new(out_dims))
    }

    fn linear(x: &Tensor, weight: &Tensor, bias: Option<&Tensor>) -> Result<Tensor> {
        x.linear(weight, bias)
    }

    fn add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
        a.broadcast_add(b)
    }

    fn scale(t: &Tensor, factor: f32) -> Result<Tensor> {
        Ok(t.scale(factor))
    }

    fn layer_norm(x: &Tensor, weight: &Tensor, bias: &Tensor, eps: f64) -> Result<Tensor> {
        x.layer_norm(weight, bias, eps)
    }

    fn activate(x: &Tensor, act: Activation) -> Result<Tensor> {
        Ok(match act {
            Activation::Gelu => x.gelu(),
            Activation::GeluNew => x.gelu_tanh(),
            Activation::Relu => x.relu(),
            Activation::Tanh => TensorOps::tanh(x),
            Activation::Silu => x.silu(),
        })
    }

    fn dropout(x: &Tensor, p: f32) -> Result<Tensor> {
        if p <= 0.0 {
            return Ok(x.clone());
        }
        let mask = DROPOUT_RNG.lock().dropout_mask(x.numel(), p)?;
        x.mul_elementwise(&mask)
    }

    fn narrow(t: &Tensor, dim: usize, start: usize, len: usize) -> Result<Tensor> {
        t.narrow(dim, start, len)
    }

    fn cat(ts: &[&Tensor], dim: usize) -> Result<Tensor> {
        Tensor::cat(ts, dim)
    }

    fn reshape(t: &Tensor, dims: &[usize]) -> Result<Tensor> {
        t.reshape(Shape::from_slice(dims))
    }

    fn mean_dim(t: &Tensor, dim: usize) -> Result<Tensor> {
        t.mean_dim(dim)
    }

    fn cross_entropy(logits: &Tensor, targets: &[i64], ignore_index: i64) -> Result<Tensor> {
        let [rows, classes] = logits.dims() else {
            return Err(Error::ShapeMismatch(format!("cross entropy needs [n, classes] logits, got {:?}", logits.dims())));
        };
        let (rows, classes) = (*rows, *classes);
        check_targets(targets, rows, classes, ignore_index)?;

        let log_probs = logits.log_softmax()?;
        let (total, count) = targets
            .iter()
            .enumerate()
            .filter(|(_, t)| **t != ignore_index)
            .fold((0.0f32, 0usize), |(total, count), (row, &t)| {
                (total - log_probs.data()[row * classes + t as usize], count + 1)
            });
        let loss = if count == 0 { 0.0 } else { total / count as f32 };
        Ok(Tensor::scalar(loss))
    }

    fn mse(predictions: &Tensor, targets: &[f32]) -> Result<Tensor> {
        if predictions.numel() != targets.len() {
            return Err(Error::LabelMismatch(format!(
                "{} regression targets for {} predictions",
                targets.len(),
                predictions.numel()
            )));
        }
        let sum: f32 = predictions
            .data()
            .iter()
            .zip(targets)
            .map(|(p, t)| (p - t).powi(2))
            .sum();
        Ok(Tensor::scalar(sum / targets.len().max(1) as f32))
    }

    fn load(path: &Path) -> Result<BTreeMap<String, Tensor>> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and dropped before this function returns.
        let mmap = unsafe { Mmap::map(&file)? };
        let tensors = SafeTensors::deserialize(&mmap)?;

        let mut out = BTreeMap::new();
        for (name, view) in tensors.tensors() {
            let data = decode(view.dtype(), view.data())?;
            out.insert(name, Tensor::new(data, Shape::from_slice(view.shape()))?);
        }
        Ok(out)
    }

    fn save(tensors: &BTreeMap<String, Tensor>, path: &Path) -> Result<()> {
        let bytes: Vec<(&str, Vec<u8>)> = tensors
            .iter()
            .map(|(name, t)| (name.as_str(), t.data().iter().flat_map(|x| x.to_le_bytes()).collect()))
            .collect();
        let mut views = Vec::with_capacity(bytes.len());
        for ((name, data), t) in bytes.iter().zip(tensors.values()) {
            views.push((*name, TensorView::new(Dtype::F32, t.dims().to_vec(), data)?));
        }
        let metadata = HashMap::from([("format".to_string(), "pt".to_string())]);
        safetensors::serialize_to_file(views, Some(metadata), path)?;
        Ok(())
    }
}

fn decode(dtype: Dtype, bytes: &[u8]) -> Result<Vec<f32>> {
    let width = match dtype {
        Dtype::F64 => 8,
        Dtype::F32 => 4,
        Dtype::F16 | Dtype::BF16 => 2,
        other => return Err(Error::UnsupportedDtype(format!("{:?}", other))),
    };
    if bytes.len() % width != 0 {
        return Err(Error::ShapeMismatch(format!("{} bytes is not a whole number of {:?} values", bytes.len(), dtype)));
    }

    let n = bytes.len() / width;
    let data = match dtype {
        Dtype::F32 => {
            let mut out = vec![0f32; n];
            LittleEndian::read_f32_into(bytes, &mut out);
            out
        }
        Dtype::F64 => {
            let mut wide = vec![0f64; n];
            LittleEndian::read_f64_into(bytes, &mut wide);
            wide.into_iter().map(|x| x as f32).collect()
        }
        Dtype::F16 => bytes
            .chunks_exact(2)
            .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        _ => bytes
            .chunks_exact(2)
            .map(|b| half::bf16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
    };
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        let mut tensors = BTreeMap::new();
        tensors.insert("a.weight".to_string(), ReferenceBackend::from_vec(vec![1.0, -2.0, 3.5, 0.25], &[2, 2]).unwrap());
        tensors.insert("b".to_string(), ReferenceBackend::from_vec(vec![7.0], &[1]).unwrap());
        ReferenceBackend::save(&tensors, &path).unwrap();

        let loaded = ReferenceBackend::load(&path).unwrap();
        assert_eq!(loaded, tensors);

        let bytes = std::fs::read(&path).unwrap();
        let (_, header) = SafeTensors::read_metadata(&bytes).unwrap();
        assert_eq!(header.metadata().as_ref().unwrap()["format"], "pt");
    }

    #[test]
    fn test_half_precision_decode() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&half::f16::from_f32(1.5).to_le_bytes());
        bytes.extend_from_slice(&half::f16::from_f32(-2.0).to_le_bytes());
        assert_eq!(decode(Dtype::F16, &bytes).unwrap(), vec![1.5, -2.0]);
        assert!(decode(Dtype::I64, &[0; 8]).is_err());
    }

    #[test]
    fn test_cross_entropy_matches_log_softmax() {
        let logits = ReferenceBackend::from_vec(vec![0.0, 0.0], &[1, 2]).unwrap();
        let loss = ReferenceBackend::cross_entropy(&logits, &[1], -100).unwrap();
        assert!((ReferenceBackend::scalar(&loss).unwrap() - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn test_dropout_keeps_expectation_shape() {
        let x = Tensor::ones(Shape::new(vec![4, 8]));
        let y = ReferenceBackend::dropout(&x, 0.5).unwrap();
        assert_eq!(y.dims(), x.dims());
        assert!(y.data().iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
    }
}
