// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

fn token_to_index(value: f32, vocab_size: usize) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value.round() as usize).min(vocab_size.saturating_sub(1))
}

/// Embedding lookup table.
///
/// Inputs are integer token IDs stored as floats. Every element of the input
/// is looked up in row-major order, so a `(1, steps)` sequence yields a
/// `(steps, embed_dim)` matrix that sequence modules consume directly.
/// Out-of-range IDs are clamped into the vocabulary.
#[derive(Debug)]
pub struct Embedding {
    weight: Parameter,
    vocab_size: usize,
    embed_dim: usize,
}

impl Embedding {
    pub fn new(name: impl Into<String>, vocab_size: usize, embed_dim: usize) -> PureResult<Self> {
        if vocab_size == 0 || embed_dim == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: vocab_size.max(1),
                cols: embed_dim.max(1),
            });
        }
        let name = name.into();
        let weight = Tensor::from_fn(vocab_size, embed_dim, |r, c| {
            (((r * 7 + c * 3) % 19) as f32 - 9.0) * 0.02
        })?;
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weight),
            vocab_size,
            embed_dim,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }
}

impl Module for Embedding {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let weights = self.weight.value().data();
        let tokens = input.len();
        let mut out = Vec::with_capacity(tokens * self.embed_dim);
        for token in input.data() {
            let start = token_to_index(*token, self.vocab_size) * self.embed_dim;
            out.extend_from_slice(&weights[start..start + self.embed_dim]);
        }
        Tensor::from_vec(tokens, self.embed_dim, out)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        vec![("weight", &self.weight)]
    }
}
