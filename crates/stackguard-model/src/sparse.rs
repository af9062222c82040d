//! Sparse feature vectors produced by the encoder.

use stackguard_core::{Result, StackGuardError};

/// A fixed-dimension sparse vector with strictly ascending indices.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    dim: usize,
    indices: Vec<usize>,
    values: Vec<f32>,
}

impl SparseVector {
    /// An all-zero vector of dimension `dim`.
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build a vector from `(index, value)` entries.
    ///
    /// Entries are sorted; duplicate indices are summed and explicit zeros
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::ShapeMismatch`] if an index is out of range.
    pub fn from_entries(dim: usize, mut entries: Vec<(usize, f32)>) -> Result<Self> {
        if let Some(&(index, _)) = entries.iter().find(|(i, _)| *i >= dim) {
            return Err(StackGuardError::shape_mismatch(
                "sparse vector index bound",
                dim,
                index + 1,
            ));
        }
        entries.sort_by_key(|(i, _)| *i);

        let mut indices: Vec<usize> = Vec::with_capacity(entries.len());
        let mut values: Vec<f32> = Vec::with_capacity(entries.len());
        for (index, value) in entries {
            if indices.last() == Some(&index) {
                if let Some(last) = values.last_mut() {
                    *last += value;
                }
            } else {
                indices.push(index);
                values.push(value);
            }
        }

        let (indices, values) = indices
            .into_iter()
            .zip(values)
            .filter(|(_, v)| *v != 0.0)
            .unzip();
        Ok(Self {
            dim,
            indices,
            values,
        })
    }

    /// Build from entries with strictly ascending indices below `dim`.
    pub(crate) fn from_sorted(dim: usize, entries: Vec<(usize, f32)>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        debug_assert!(entries.last().map_or(true, |(i, _)| *i < dim));
        let (indices, values) = entries.into_iter().filter(|(_, v)| *v != 0.0).unzip();
        Self {
            dim,
            indices,
            values,
        }
    }

    /// Build a sparse vector from a dense slice.
    pub fn from_dense(dense: &[f32]) -> Self {
        let (indices, values) = dense
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, v)| (i, *v))
            .unzip();
        Self {
            dim: dense.len(),
            indices,
            values,
        }
    }

    /// Declared dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored non-zero entries.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Value at `index`; absent entries are zero.
    pub fn get(&self, index: usize) -> f32 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    /// Iterate over stored `(index, value)` pairs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Dot product with a dense weight row of the same dimension.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::ShapeMismatch`] when the widths differ.
    pub fn dot(&self, dense: &[f32]) -> Result<f32> {
        if dense.len() != self.dim {
            return Err(StackGuardError::shape_mismatch(
                "sparse dot product",
                self.dim,
                dense.len(),
            ));
        }
        Ok(self.iter().map(|(i, v)| v * dense[i]).sum())
    }

    /// Materialize as a dense vector.
    pub fn to_dense(&self) -> Vec<f32> {
        let mut dense = vec![0.0_f32; self.dim];
        for (i, v) in self.iter() {
            dense[i] = v;
        }
        dense
    }

    /// Euclidean norm.
    pub fn l2_norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}
