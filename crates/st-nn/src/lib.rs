// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Neural module API built on top of the SpiralTorch tensor.
//!
//! This crate offers a lightweight `nn.Module` style surface: a [`Module`]
//! trait that reports its parameters and children by name, a handful of
//! forward-only layers, and [`ModuleContainer`] for sequential, list and dict
//! collections.

pub mod layers;
pub mod module;

pub use layers::{
    BatchNorm1d, ContainerKind, Conv1d, Conv2d, Embedding, Gelu, Gru, Identity, LayerNorm,
    Linear, Lstm, ModuleContainer, Relu, RmsNorm, Rnn, Silu,
};
pub use module::{AsAny, Module, Parameter};

pub use st_tensor::{PureResult, Tensor, TensorError};
