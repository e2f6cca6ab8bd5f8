// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::Module;
use crate::{PureResult, Tensor};

/// Stateless identity layer that forwards its input unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl Identity {
    /// Creates a new identity layer.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Identity {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        Ok(input.clone())
    }
}
