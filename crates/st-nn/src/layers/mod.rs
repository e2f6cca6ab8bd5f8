// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

pub mod activation;
pub mod container;
pub mod conv;
pub mod embedding;
pub mod identity;
pub mod linear;
pub mod normalization;
pub mod recurrent;

pub use activation::{Gelu, Relu, Silu};
pub use container::{ContainerKind, ModuleContainer};
pub use conv::{Conv1d, Conv2d};
pub use embedding::Embedding;
pub use identity::Identity;
pub use linear::Linear;
pub use normalization::{BatchNorm1d, LayerNorm, RmsNorm};
pub use recurrent::{Gru, Lstm, Rnn};
