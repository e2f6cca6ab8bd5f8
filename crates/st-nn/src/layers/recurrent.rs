// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Single-layer recurrent cells over sequences laid out along the row axis.
//!
//! Every forward call starts from a zero hidden state, so repeated calls with
//! the same input produce the same output.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor};
use st_tensor::TensorError;

fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

/// Input/recurrent weights shared by the three cell flavours. `gates` is the
/// number of stacked gate blocks (1 for Elman, 3 for GRU, 4 for LSTM).
#[derive(Debug)]
struct RecurrentWeights {
    input_dim: usize,
    hidden_dim: usize,
    gates: usize,
    weight_ih: Parameter,
    weight_hh: Parameter,
    bias_ih: Parameter,
    bias_hh: Parameter,
}

impl RecurrentWeights {
    fn new(name: String, input_dim: usize, hidden_dim: usize, gates: usize) -> PureResult<Self> {
        if input_dim == 0 || hidden_dim == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: input_dim,
                cols: hidden_dim,
            });
        }
        let width = gates * hidden_dim;
        let weight_ih = Tensor::from_fn(input_dim, width, |row, col| {
            (((row * 13 + col * 7) % 17) as f32 + 1.0) * 0.01
        })?;
        let weight_hh = Tensor::from_fn(hidden_dim, width, |row, col| {
            (((row * 11 + col * 5) % 23) as f32 + 1.0) * 0.01
        })?;
        Ok(Self {
            input_dim,
            hidden_dim,
            gates,
            weight_ih: Parameter::new(format!("{name}::weight_ih"), weight_ih),
            weight_hh: Parameter::new(format!("{name}::weight_hh"), weight_hh),
            bias_ih: Parameter::new(format!("{name}::bias_ih"), Tensor::zeros(1, width)?),
            bias_hh: Parameter::new(format!("{name}::bias_hh"), Tensor::zeros(1, width)?),
        })
    }

    fn guard_input(&self, input: &Tensor, label: &'static str) -> PureResult<usize> {
        let (rows, cols) = input.shape();
        if cols != self.input_dim {
            return Err(TensorError::ShapeMismatch {
                left: (rows, cols),
                right: (rows, self.input_dim),
            });
        }
        if rows == 0 {
            return Err(TensorError::EmptyInput(label));
        }
        Ok(rows)
    }

    /// Input and recurrent projections for one step, kept separate because
    /// the GRU candidate gate scales only the recurrent half.
    fn project(&self, x: &[f32], hidden: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let width = self.gates * self.hidden_dim;
        let w_ih = self.weight_ih.value().data();
        let w_hh = self.weight_hh.value().data();
        let mut from_input = self.bias_ih.value().data().to_vec();
        let mut from_hidden = self.bias_hh.value().data().to_vec();
        for (idx, value) in x.iter().enumerate() {
            let row = &w_ih[idx * width..(idx + 1) * width];
            for (acc, w) in from_input.iter_mut().zip(row.iter()) {
                *acc += value * w;
            }
        }
        for (idx, value) in hidden.iter().enumerate() {
            let row = &w_hh[idx * width..(idx + 1) * width];
            for (acc, w) in from_hidden.iter_mut().zip(row.iter()) {
                *acc += value * w;
            }
        }
        (from_input, from_hidden)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        vec![
            ("weight_ih", &self.weight_ih),
            ("weight_hh", &self.weight_hh),
            ("bias_ih", &self.bias_ih),
            ("bias_hh", &self.bias_hh),
        ]
    }
}

/// Elman RNN with a tanh non-linearity.
#[derive(Debug)]
pub struct Rnn {
    weights: RecurrentWeights,
}

impl Rnn {
    pub fn new(name: impl Into<String>, input_dim: usize, hidden_dim: usize) -> PureResult<Self> {
        Ok(Self {
            weights: RecurrentWeights::new(name.into(), input_dim, hidden_dim, 1)?,
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.weights.hidden_dim
    }
}

impl Module for Rnn {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let timesteps = self.weights.guard_input(input, "rnn_forward")?;
        let hidden_dim = self.weights.hidden_dim;
        let mut hidden = vec![0.0f32; hidden_dim];
        let mut output = Vec::with_capacity(timesteps * hidden_dim);
        for t in 0..timesteps {
            let (a, b) = self.weights.project(input.row(t)?, &hidden);
            for unit in 0..hidden_dim {
                hidden[unit] = (a[unit] + b[unit]).tanh();
            }
            output.extend_from_slice(&hidden);
        }
        Tensor::from_vec(timesteps, hidden_dim, output)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        self.weights.named_parameters()
    }
}

/// Gated recurrent unit (reset, update, candidate gate order).
#[derive(Debug)]
pub struct Gru {
    weights: RecurrentWeights,
}

impl Gru {
    pub fn new(name: impl Into<String>, input_dim: usize, hidden_dim: usize) -> PureResult<Self> {
        Ok(Self {
            weights: RecurrentWeights::new(name.into(), input_dim, hidden_dim, 3)?,
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.weights.hidden_dim
    }
}

impl Module for Gru {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let timesteps = self.weights.guard_input(input, "gru_forward")?;
        let h = self.weights.hidden_dim;
        let mut hidden = vec![0.0f32; h];
        let mut output = Vec::with_capacity(timesteps * h);
        for t in 0..timesteps {
            let (a, b) = self.weights.project(input.row(t)?, &hidden);
            for unit in 0..h {
                let reset = sigmoid(a[unit] + b[unit]);
                let update = sigmoid(a[h + unit] + b[h + unit]);
                let candidate = (a[2 * h + unit] + reset * b[2 * h + unit]).tanh();
                hidden[unit] = (1.0 - update) * candidate + update * hidden[unit];
            }
            output.extend_from_slice(&hidden);
        }
        Tensor::from_vec(timesteps, h, output)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        self.weights.named_parameters()
    }
}

/// Long short-term memory cell (input, forget, cell, output gate order).
#[derive(Debug)]
pub struct Lstm {
    weights: RecurrentWeights,
}

impl Lstm {
    /// Creates a new LSTM layer with small deterministic parameters.
    pub fn new(name: impl Into<String>, input_dim: usize, hidden_dim: usize) -> PureResult<Self> {
        Ok(Self {
            weights: RecurrentWeights::new(name.into(), input_dim, hidden_dim, 4)?,
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.weights.hidden_dim
    }
}

impl Module for Lstm {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let timesteps = self.weights.guard_input(input, "lstm_forward")?;
        let h = self.weights.hidden_dim;
        let mut hidden = vec![0.0f32; h];
        let mut cell = vec![0.0f32; h];
        let mut output = Vec::with_capacity(timesteps * h);
        for t in 0..timesteps {
            let (a, b) = self.weights.project(input.row(t)?, &hidden);
            for unit in 0..h {
                let gi = sigmoid(a[unit] + b[unit]);
                let gf = sigmoid(a[h + unit] + b[h + unit]);
                let gg = (a[2 * h + unit] + b[2 * h + unit]).tanh();
                let go = sigmoid(a[3 * h + unit] + b[3 * h + unit]);
                cell[unit] = gf * cell[unit] + gi * gg;
                hidden[unit] = go * cell[unit].tanh();
            }
            output.extend_from_slice(&hidden);
        }
        Tensor::from_vec(timesteps, h, output)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        self.weights.named_parameters()
    }
}
