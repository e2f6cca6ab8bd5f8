// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::Module;
use crate::{PureResult, Tensor};

/// Stateless ReLU activation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Relu;

impl Relu {
    /// Creates a new ReLU layer.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Relu {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let mut out = input.clone();
        out.relu_inplace();
        Ok(out)
    }
}

/// Gaussian Error Linear Unit using the tanh approximation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Gelu;

impl Gelu {
    /// Creates a new GELU activation.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Gelu {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let mut out = input.clone();
        out.gelu_inplace();
        Ok(out)
    }
}

/// Silu (`x * sigmoid(x)`), the gate activation of SwiGLU feed-forward blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silu;

impl Silu {
    pub fn new() -> Self {
        Self
    }
}

impl Module for Silu {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        Ok(input.map(|x| x / (1.0 + (-x).exp())))
    }
}
