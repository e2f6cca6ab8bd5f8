// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Pure Rust row-major tensor used by the module stack.
//!
//! Everything here is forward-only and single threaded. Tensors are 2-D
//! `(rows, cols)` buffers of `f32`; sequence models lay timesteps along the row
//! axis and features along the column axis.

use core::fmt;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use spiral_config::determinism;
use std::error::Error;

/// Result alias used throughout the pure module.
pub type PureResult<T> = Result<T, TensorError>;

/// Errors emitted by tensor utilities and the layers built on them.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorError {
    /// A tensor constructor received an invalid shape.
    InvalidDimensions { rows: usize, cols: usize },
    /// Data provided to a constructor or operator does not match the tensor shape.
    DataLength { expected: usize, got: usize },
    /// An operator was asked to combine tensors of incompatible shapes.
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// Computation received an empty input which would otherwise trigger a panic.
    EmptyInput(&'static str),
    /// A slice or lookup reached past the end of an axis.
    IndexOutOfRange {
        label: &'static str,
        index: usize,
        len: usize,
    },
    /// Generic configuration violation.
    InvalidValue { label: &'static str },
    /// Numeric guard detected a non-finite value that would otherwise propagate NaNs.
    NonFiniteValue { label: &'static str, value: f32 },
    /// Attempted to read a parameter that was missing from a state dict.
    MissingParameter { name: String },
    /// The receiver does not implement the requested operation.
    UnsupportedOperation { label: &'static str },
}

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorError::InvalidDimensions { rows, cols } => {
                write!(
                    f,
                    "invalid tensor dimensions ({rows} x {cols}); both axes must be non-zero"
                )
            }
            TensorError::DataLength { expected, got } => {
                write!(f, "data length mismatch: expected {expected}, got {got}")
            }
            TensorError::ShapeMismatch { left, right } => {
                write!(
                    f,
                    "shape mismatch: left={:?}, right={:?} cannot be combined",
                    left, right
                )
            }
            TensorError::EmptyInput(label) => {
                write!(f, "{label} must not be empty for this computation")
            }
            TensorError::IndexOutOfRange { label, index, len } => {
                write!(f, "{label}: index {index} is out of range for length {len}")
            }
            TensorError::InvalidValue { label } => {
                write!(f, "invalid value: {label}")
            }
            TensorError::NonFiniteValue { label, value } => {
                write!(f, "non-finite value detected for {label}: {value}")
            }
            TensorError::MissingParameter { name } => {
                write!(f, "missing parameter '{name}' while loading module state")
            }
            TensorError::UnsupportedOperation { label } => {
                write!(f, "operation not supported: {label}")
            }
        }
    }
}

impl Error for TensorError {}

/// A simple 2D row-major tensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Tensor {
    fn seedable_rng(seed: Option<u64>, label: &str) -> StdRng {
        determinism::rng_from_optional(seed, label)
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> PureResult<Self> {
        Self::from_vec(rows, cols, vec![0.0; rows * cols])
    }

    /// Create a tensor filled with `value`.
    pub fn full(rows: usize, cols: usize, value: f32) -> PureResult<Self> {
        Self::from_vec(rows, cols, vec![value; rows * cols])
    }

    /// Create a tensor from raw data. The provided vector must match
    /// `rows * cols` elements.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let expected = rows * cols;
        if expected != data.len() {
            return Err(TensorError::DataLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// Construct a tensor by sampling a uniform distribution in `[min, max)`.
    ///
    /// When `seed` is provided the RNG becomes deterministic which makes tests
    /// reproducible. Otherwise the process determinism policy decides.
    pub fn random_uniform(
        rows: usize,
        cols: usize,
        min: f32,
        max: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        if !(min < max) {
            return Err(TensorError::InvalidValue {
                label: "random_uniform_bounds",
            });
        }
        let mut rng = Self::seedable_rng(seed, "st-tensor/tensor/uniform");
        let distribution = Uniform::new(min, max);
        let data = (0..rows * cols)
            .map(|_| distribution.sample(&mut rng))
            .collect();
        Self::from_vec(rows, cols, data)
    }

    /// Construct a tensor by applying a generator function to each coordinate.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> PureResult<Self>
    where
        F: FnMut(usize, usize) -> f32,
    {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self::from_vec(rows, cols, data)
    }

    /// Returns the `(rows, cols)` pair of the tensor.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of elements stored in the tensor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Tensors always hold at least one element; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Borrow a single row.
    pub fn row(&self, index: usize) -> PureResult<&[f32]> {
        if index >= self.rows {
            return Err(TensorError::IndexOutOfRange {
                label: "Tensor::row",
                index,
                len: self.rows,
            });
        }
        let start = index * self.cols;
        Ok(&self.data[start..start + self.cols])
    }

    fn guard_same_shape(&self, other: &Tensor) -> PureResult<()> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    fn zip_with(&self, other: &Tensor, op: impl Fn(f32, f32) -> f32) -> PureResult<Tensor> {
        self.guard_same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| op(*a, *b))
            .collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Applies `f` to every element.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            data: self.data.iter().map(|v| f(*v)).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Matrix product `self (m x k) · other (k x n)`.
    pub fn matmul(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.cols != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let (m, k, n) = (self.rows, self.cols, other.cols);
        let mut out = vec![0.0f32; m * n];
        for i in 0..m {
            let lhs = &self.data[i * k..(i + 1) * k];
            let dst = &mut out[i * n..(i + 1) * n];
            for (p, &a) in lhs.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                let rhs = &other.data[p * n..(p + 1) * n];
                for (d, &b) in dst.iter_mut().zip(rhs.iter()) {
                    *d += a * b;
                }
            }
        }
        Tensor::from_vec(m, n, out)
    }

    /// Element-wise addition.
    pub fn add(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Element-wise subtraction.
    pub fn sub(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Element-wise product (Hadamard) between two tensors of identical shape.
    pub fn hadamard(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Returns a new tensor where every element is scaled by `value`.
    pub fn scale(&self, value: f32) -> PureResult<Tensor> {
        if !value.is_finite() {
            return Err(TensorError::NonFiniteValue {
                label: "Tensor::scale",
                value,
            });
        }
        Ok(self.map(|a| a * value))
    }

    /// Returns a new tensor with `value` added to every element.
    pub fn add_scalar(&self, value: f32) -> PureResult<Tensor> {
        if !value.is_finite() {
            return Err(TensorError::NonFiniteValue {
                label: "Tensor::add_scalar",
                value,
            });
        }
        Ok(self.map(|a| a + value))
    }

    /// Add a scaled tensor to this tensor (`self += scale * other`).
    pub fn add_scaled(&mut self, other: &Tensor, scale: f32) -> PureResult<()> {
        self.guard_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += scale * b;
        }
        Ok(())
    }

    /// Add the provided row vector to every row (`self[row] += bias`).
    pub fn add_row_inplace(&mut self, bias: &[f32]) -> PureResult<()> {
        if bias.len() != self.cols {
            return Err(TensorError::DataLength {
                expected: self.cols,
                got: bias.len(),
            });
        }
        for row in self.data.chunks_mut(self.cols) {
            for (value, b) in row.iter_mut().zip(bias.iter()) {
                *value += b;
            }
        }
        Ok(())
    }

    /// Apply the ReLU activation in-place.
    pub fn relu_inplace(&mut self) {
        for value in self.data.iter_mut() {
            if *value < 0.0 {
                *value = 0.0;
            }
        }
    }

    /// Apply the GELU activation in-place (tanh approximation).
    pub fn gelu_inplace(&mut self) {
        for value in self.data.iter_mut() {
            *value = gelu(*value);
        }
    }

    /// Numerically stable softmax over every row.
    pub fn row_softmax(&self) -> PureResult<Tensor> {
        let mut data = Vec::with_capacity(self.len());
        for row in self.data.chunks(self.cols) {
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = row.iter().map(|v| (v - max).exp()).collect();
            let total: f32 = exps.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                return Err(TensorError::NonFiniteValue {
                    label: "Tensor::row_softmax",
                    value: total,
                });
            }
            data.extend(exps.into_iter().map(|v| v / total));
        }
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Returns the transpose of the tensor.
    pub fn transpose(&self) -> Tensor {
        let mut data = vec![0.0f32; self.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Tensor {
            data,
            rows: self.cols,
            cols: self.rows,
        }
    }

    /// Returns a reshaped copy of the tensor when the requested dimensions are compatible.
    pub fn reshape(&self, rows: usize, cols: usize) -> PureResult<Tensor> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        if rows * cols != self.len() {
            return Err(TensorError::DataLength {
                expected: rows * cols,
                got: self.len(),
            });
        }
        Tensor::from_vec(rows, cols, self.data.clone())
    }

    /// Copies the column band `[start, start + width)`.
    pub fn narrow_cols(&self, start: usize, width: usize) -> PureResult<Tensor> {
        if width == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: self.rows,
                cols: width,
            });
        }
        if start + width > self.cols {
            return Err(TensorError::IndexOutOfRange {
                label: "Tensor::narrow_cols",
                index: start + width - 1,
                len: self.cols,
            });
        }
        let mut data = Vec::with_capacity(self.rows * width);
        for row in self.data.chunks(self.cols) {
            data.extend_from_slice(&row[start..start + width]);
        }
        Tensor::from_vec(self.rows, width, data)
    }

    /// Concatenates tensors column-wise. Every input must share the row count.
    pub fn cat_cols(tensors: &[Tensor]) -> PureResult<Tensor> {
        let Some(first) = tensors.first() else {
            return Err(TensorError::EmptyInput("Tensor::cat_cols"));
        };
        let rows = first.rows;
        let mut total_cols = 0usize;
        for tensor in tensors {
            if tensor.rows != rows {
                return Err(TensorError::ShapeMismatch {
                    left: tensor.shape(),
                    right: (rows, tensor.cols),
                });
            }
            total_cols += tensor.cols;
        }
        let mut data = Vec::with_capacity(rows * total_cols);
        for r in 0..rows {
            for tensor in tensors {
                let start = r * tensor.cols;
                data.extend_from_slice(&tensor.data[start..start + tensor.cols]);
            }
        }
        Tensor::from_vec(rows, total_cols, data)
    }

    /// Concatenates tensors row-wise. Every input must share the column count.
    pub fn cat_rows(tensors: &[Tensor]) -> PureResult<Tensor> {
        let Some(first) = tensors.first() else {
            return Err(TensorError::EmptyInput("Tensor::cat_rows"));
        };
        let cols = first.cols;
        let mut total_rows = 0usize;
        for tensor in tensors {
            if tensor.cols != cols {
                return Err(TensorError::ShapeMismatch {
                    left: tensor.shape(),
                    right: (tensor.rows, cols),
                });
            }
            total_rows += tensor.rows;
        }
        let mut data = Vec::with_capacity(total_rows * cols);
        for tensor in tensors {
            data.extend_from_slice(&tensor.data);
        }
        Tensor::from_vec(total_rows, cols, data)
    }

    /// Returns the sum over rows for each column.
    pub fn sum_axis0(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.cols];
        for row in self.data.chunks(self.cols) {
            for (sum, value) in sums.iter_mut().zip(row.iter()) {
                *sum += value;
            }
        }
        sums
    }

    /// Computes the squared L2 norm of the tensor.
    pub fn squared_l2_norm(&self) -> f32 {
        self.data.iter().map(|v| v * v).sum()
    }

    /// Largest absolute element-wise difference between two tensors.
    pub fn max_abs_diff(&self, other: &Tensor) -> PureResult<f32> {
        self.guard_same_shape(other)?;
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max))
    }

    /// Shape-aware closeness check used by equivalence tests.
    pub fn allclose(&self, other: &Tensor, tolerance: f32) -> bool {
        matches!(self.max_abs_diff(other), Ok(diff) if diff <= tolerance)
    }
}

fn gelu(x: f32) -> f32 {
    const COEFF: f32 = 0.044_715;
    const SQRT_2_OVER_PI: f32 = 0.797_884_6;
    let x_cubed = x * x * x;
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + COEFF * x_cubed)).tanh())
}
