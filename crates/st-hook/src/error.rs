// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use st_tensor::TensorError;
use thiserror::Error;

/// Result alias for hook construction and queries.
pub type HookResult<T> = Result<T, HookError>;

/// Errors raised while wrapping, querying or validating hooked trees.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("{type_name} is already hooked; unwrap it before hooking again")]
    AlreadyWrapped { type_name: String },
    #[error("cannot auto-hook values of type {type_name}; expected a boxed module, a parameter or a tensor")]
    UnsupportedType { type_name: String },
    #[error("path '{path}' appears more than once in the hooked tree")]
    DuplicatePath { path: String },
    #[error("child '{child}' of {parent} cannot be replaced and would stay unhooked")]
    UnreplaceableChild { parent: String, child: String },
    #[error("no hook point registered under '{path}'")]
    UnknownHookPoint { path: String },
    #[error("hook paths differ from expectation: missing {missing:?}, unexpected {unexpected:?}")]
    StructuralMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("{stage} forward diverged by {max_abs_diff} (tolerance {tolerance})")]
    ForwardMismatch {
        stage: String,
        max_abs_diff: f32,
        tolerance: f32,
    },
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
