pub mod ops;

pub use ops::TensorOps;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Self { dims: dims.to_vec() }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn last(&self) -> Option<&usize> {
        self.dims.last()
    }

    pub fn dim(&self, idx: usize) -> Option<usize> {
        self.dims.get(idx).copied()
    }

    /// Split around `dim` into (outer, size, inner) element counts.
    fn split(&self, dim: usize) -> Result<(usize, usize, usize)> {
        let size = self.dim(dim).ok_or_else(|| {
            Error::ShapeMismatch(format!("dimension {} out of range for {:?}", dim, self.dims))
        })?;
        let outer = self.dims[..dim].iter().product();
        let inner = self.dims[dim + 1..].iter().product();
        Ok((outer, size, inner))
    }
}

/// Dense row-major `f32` tensor on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Shape,
}

impl Tensor {
    pub fn new(data: Vec<f32>, shape: Shape) -> Result<Self> {
        if data.len() != shape.numel() {
            return Err(Error::ShapeMismatch(format!(
                "{} elements do not fill shape {:?}",
                data.len(),
                shape.dims()
            )));
        }
        Ok(Self { data, shape })
    }

    pub fn zeros(shape: Shape) -> Self {
        Self::filled(shape, 0.0)
    }

    pub fn ones(shape: Shape) -> Self {
        Self::filled(shape, 1.0)
    }

    pub fn filled(shape: Shape, value: f32) -> Self {
        let numel = shape.numel();
        Self {
            data: vec![value; numel],
            shape,
        }
    }

    pub fn scalar(value: f32) -> Self {
        Self {
            data: vec![value],
            shape: Shape::new(Vec::new()),
        }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn reshape(&self, shape: Shape) -> Result<Self> {
        if self.shape.numel() != shape.numel() {
            return Err(Error::ShapeMismatch(format!(
                "cannot reshape {:?} into {:?}",
                self.dims(),
                shape.dims()
            )));
        }
        Ok(Self {
            data: self.data.clone(),
            shape,
        })
    }

    /// Rows of a 2-D table, e.g. an embedding lookup. Result is `[ids.len(), cols]`.
    pub fn index_select_rows(&self, ids: &[u32]) -> Result<Self> {
        let [rows, cols] = self.dims() else {
            return Err(Error::ShapeMismatch(format!("row lookup needs a 2-D table, got {:?}", self.dims())));
        };
        let (rows, cols) = (*rows, *cols);
        let mut data = Vec::with_capacity(ids.len() * cols);
        for &id in ids {
            let id = id as usize;
            if id >= rows {
                return Err(Error::ShapeMismatch(format!("row {} out of range for {} rows", id, rows)));
            }
            data.extend_from_slice(&self.data[id * cols..(id + 1) * cols]);
        }
        Ok(Self {
            data,
            shape: Shape::new(vec![ids.len(), cols]),
        })
    }

    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Self> {
        let (outer, size, inner) = self.shape.split(dim)?;
        if start + len > size {
            return Err(Error::ShapeMismatch(format!(
                "narrow {}..{} exceeds dimension {} of size {}",
                start,
                start + len,
                dim,
                size
            )));
        }
        let mut data = Vec::with_capacity(outer * len * inner);
        for o in 0..outer {
            let base = o * size * inner + start * inner;
            data.extend_from_slice(&self.data[base..base + len * inner]);
        }
        let mut dims = self.dims().to_vec();
        dims[dim] = len;
        Ok(Self {
            data,
            shape: Shape::new(dims),
        })
    }

    pub fn cat(tensors: &[&Tensor], dim: usize) -> Result<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| Error::ShapeMismatch("cat of no tensors".to_string()))?;
        let (outer, _, inner) = first.shape.split(dim)?;
        let mut dims = first.dims().to_vec();
        dims[dim] = 0;
        for t in tensors {
            let (o, size, i) = t.shape.split(dim)?;
            if o != outer || i != inner || t.shape.rank() != first.shape.rank() {
                return Err(Error::ShapeMismatch(format!(
                    "cannot cat {:?} with {:?} along {}",
                    first.dims(),
                    t.dims(),
                    dim
                )));
            }
            dims[dim] += size;
        }
        let mut data = Vec::with_capacity(dims.iter().product());
        for o in 0..outer {
            for t in tensors {
                let chunk = t.dims()[dim] * inner;
                data.extend_from_slice(&t.data[o * chunk..(o + 1) * chunk]);
            }
        }
        Ok(Self {
            data,
            shape: Shape::new(dims),
        })
    }

    /// Mean over `dim`, which is removed from the shape.
    pub fn mean_dim(&self, dim: usize) -> Result<Self> {
        let (outer, size, inner) = self.shape.split(dim)?;
        let mut data = vec![0.0; outer * inner];
        for o in 0..outer {
            for d in 0..size {
                let row = &self.data[(o * size + d) * inner..(o * size + d + 1) * inner];
                for (acc, &x) in data[o * inner..(o + 1) * inner].iter_mut().zip(row) {
                    *acc += x;
                }
            }
        }
        let scale = 1.0 / size.max(1) as f32;
        data.iter_mut().for_each(|x| *x *= scale);
        let mut dims = self.dims().to_vec();
        dims.remove(dim);
        Ok(Self {
            data,
            shape: Shape::new(dims),
        })
    }
}
