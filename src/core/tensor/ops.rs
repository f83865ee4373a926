use super::{Shape, Tensor};
use crate::error::{Error, Result};
use rayon::prelude::*;

pub trait TensorOps {
    /// `x @ weight^T + bias` over the last dimension, `weight` is `[out, in]`.
    fn linear(&self, weight: &Tensor, bias: Option<&Tensor>) -> Result<Tensor>;
    /// Elementwise add with `other` broadcast over the leading dimensions.
    fn broadcast_add(&self, other: &Tensor) -> Result<Tensor>;
    fn scale(&self, factor: f32) -> Tensor;
    fn mul_elementwise(&self, mask: &[f32]) -> Result<Tensor>;
    fn layer_norm(&self, weight: &Tensor, bias: &Tensor, eps: f64) -> Result<Tensor>;
    fn log_softmax(&self) -> Result<Tensor>;
    fn gelu(&self) -> Tensor;
    fn gelu_tanh(&self) -> Tensor;
    fn relu(&self) -> Tensor;
    fn tanh(&self) -> Tensor;
    fn silu(&self) -> Tensor;
}

impl Tensor {
    fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            data: self.data.iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
        }
    }

    fn last_dim(&self) -> Result<usize> {
        self.shape
            .last()
            .copied()
            .filter(|&n| n > 0)
            .ok_or_else(|| Error::ShapeMismatch(format!("expected a non-empty last dimension, got {:?}", self.dims())))
    }
}

impl TensorOps for Tensor {
    fn linear(&self, weight: &Tensor, bias: Option<&Tensor>) -> Result<Tensor> {
        let k = self.last_dim()?;
        let [n, k2] = weight.dims() else {
            return Err(Error::ShapeMismatch(format!("linear weight must be 2-D, got {:?}", weight.dims())));
        };
        let (n, k2) = (*n, *k2);
        if k != k2 {
            return Err(Error::ShapeMismatch(format!("linear: input has {} features, weight expects {}", k, k2)));
        }
        if let Some(b) = bias {
            if b.numel() != n {
                return Err(Error::ShapeMismatch(format!("linear: bias has {} elements, expected {}", b.numel(), n)));
            }
        }

        let rows = self.numel() / k;
        let mut out = vec![0.0; rows * n];
        out.par_chunks_mut(n).enumerate().for_each(|(r, row_out)| {
            let x = &self.data[r * k..(r + 1) * k];
            for (j, o) in row_out.iter_mut().enumerate() {
                let w = &weight.data[j * k..(j + 1) * k];
                let dot: f32 = x.iter().zip(w).map(|(a, b)| a * b).sum();
                *o = dot + bias.map(|b| b.data[j]).unwrap_or(0.0);
            }
        });

        let mut dims = self.dims().to_vec();
        if let Some(last) = dims.last_mut() {
            *last = n;
        }
        Tensor::new(out, Shape::new(dims))
    }

    fn broadcast_add(&self, other: &Tensor) -> Result<Tensor> {
        let dims = self.dims();
        let tail = other.dims();
        if tail.len() > dims.len() || dims[dims.len() - tail.len()..] != *tail {
            return Err(Error::ShapeMismatch(format!("cannot broadcast {:?} onto {:?}", tail, dims)));
        }
        let m = other.numel().max(1);
        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, &x)| x + other.data[i % m])
            .collect();
        Tensor::new(data, self.shape.clone())
    }

    fn scale(&self, factor: f32) -> Tensor {
        self.map(|x| x * factor)
    }

    fn mul_elementwise(&self, mask: &[f32]) -> Result<Tensor> {
        if mask.len() != self.numel() {
            return Err(Error::ShapeMismatch(format!("mask of {} for {} elements", mask.len(), self.numel())));
        }
        let data = self.data.iter().zip(mask).map(|(x, m)| x * m).collect();
        Tensor::new(data, self.shape.clone())
    }

    fn layer_norm(&self, weight: &Tensor, bias: &Tensor, eps: f64) -> Result<Tensor> {
        let n = self.last_dim()?;
        if weight.numel() != n || bias.numel() != n {
            return Err(Error::ShapeMismatch(format!("layer norm parameters do not match width {}", n)));
        }
        let mut data = self.data.clone();
        data.par_chunks_mut(n).for_each(|row| {
            let mean = row.iter().sum::<f32>() / n as f32;
            let var = row.iter().map(|&x| (x - mean).powi(2)).sum::<f32>() / n as f32;
            let inv = 1.0 / (var as f64 + eps).sqrt() as f32;
            for (i, x) in row.iter_mut().enumerate() {
                *x = (*x - mean) * inv * weight.data[i] + bias.data[i];
            }
        });
        Tensor::new(data, self.shape.clone())
    }

    fn log_softmax(&self) -> Result<Tensor> {
        let n = self.last_dim()?;
        let mut data = self.data.clone();
        data.par_chunks_mut(n).for_each(|row| {
            let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let log_sum = row.iter().map(|&x| (x - max).exp()).sum::<f32>().ln() + max;
            row.iter_mut().for_each(|x| *x -= log_sum);
        });
        Tensor::new(data, self.shape.clone())
    }

    fn gelu(&self) -> Tensor {
        self.map(|x| 0.5 * x * (1.0 + erf(x / std::f32::consts::SQRT_2)))
    }

    fn gelu_tanh(&self) -> Tensor {
        self.map(|x| 0.5 * x * (1.0 + (0.797_884_6 * (x + 0.044_715 * x * x * x)).tanh()))
    }

    fn relu(&self) -> Tensor {
        self.map(|x| x.max(0.0))
    }

    fn tanh(&self) -> Tensor {
        self.map(f32::tanh)
    }

    fn silu(&self) -> Tensor {
        self.map(|x| x / (1.0 + (-x).exp()))
    }
}

// Abramowitz and Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f32) -> f32 {
    let sign = x.signum();
    let x = x.abs() as f64;
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t * (0.254_829_592 + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(data: Vec<f32>, dims: &[usize]) -> Tensor {
        Tensor::new(data, Shape::from_slice(dims)).unwrap()
    }

    #[test]
    fn test_linear() {
        let x = tensor(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let w = tensor(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], &[3, 2]);
        let b = tensor(vec![0.5, 0.5, 0.5], &[3]);
        let y = x.linear(&w, Some(&b)).unwrap();
        assert_eq!(y.dims(), &[2, 3]);
        assert_eq!(y.data(), &[1.5, 2.5, 3.5, 3.5, 4.5, 7.5]);
    }

    #[test]
    fn test_layer_norm_is_per_row() {
        let x = tensor(vec![1.0, 3.0, 10.0, 30.0], &[2, 2]);
        let w = Tensor::ones(Shape::new(vec![2]));
        let b = Tensor::zeros(Shape::new(vec![2]));
        let y = x.layer_norm(&w, &b, 1e-12).unwrap();
        for row in y.data().chunks(2) {
            assert!((row[0] + 1.0).abs() < 1e-4);
            assert!((row[1] - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_log_softmax_normalizes() {
        let x = tensor(vec![1.0, 2.0, 3.0], &[1, 3]);
        let y = x.log_softmax().unwrap();
        let total: f32 = y.data().iter().map(|v| v.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_gelu_matches_known_values() {
        let y = tensor(vec![0.0, 1.0, -1.0], &[3]).gelu();
        assert!(y.data()[0].abs() < 1e-6);
        assert!((y.data()[1] - 0.841_344_7).abs() < 1e-4);
        assert!((y.data()[2] + 0.158_655_3).abs() < 1e-4);
    }

    #[test]
    fn test_broadcast_add() {
        let x = tensor(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let b = tensor(vec![10.0, 20.0], &[2]);
        assert_eq!(x.broadcast_add(&b).unwrap().data(), &[11.0, 22.0, 13.0, 24.0]);
        assert!(x.broadcast_add(&tensor(vec![1.0, 2.0, 3.0], &[3])).is_err());
    }
}
