// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use st_nn::{
    BatchNorm1d, Conv1d, Conv2d, Embedding, Gru, LayerNorm, Linear, Lstm, Module, Rnn,
};
use std::any::{Any, TypeId};

/// Module kinds treated as atomic for parameter-level instrumentation.
///
/// Opaque modules still receive an output hook point; only the per-parameter
/// hook points are suppressed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpaqueRegistry {
    entries: Vec<(TypeId, &'static str)>,
}

impl OpaqueRegistry {
    /// A registry with no opaque kinds: every parameter gets a hook point.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The dense, convolutional, normalisation, embedding and recurrent
    /// primitives shipped by `st-nn`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry
            .register::<Linear>()
            .register::<Conv1d>()
            .register::<Conv2d>()
            .register::<BatchNorm1d>()
            .register::<LayerNorm>()
            .register::<Embedding>()
            .register::<Rnn>()
            .register::<Lstm>()
            .register::<Gru>();
        registry
    }

    pub fn register<T: Module>(&mut self) -> &mut Self {
        let id = TypeId::of::<T>();
        if !self.entries.iter().any(|(existing, _)| *existing == id) {
            self.entries.push((id, std::any::type_name::<T>()));
        }
        self
    }

    /// Builder-style [`OpaqueRegistry::register`].
    pub fn with<T: Module>(mut self) -> Self {
        self.register::<T>();
        self
    }

    /// Returns `true` when `T` was registered.
    pub fn unregister<T: Module>(&mut self) -> bool {
        let id = TypeId::of::<T>();
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub fn contains_type<T: Module>(&self) -> bool {
        self.contains_id(TypeId::of::<T>())
    }

    /// Membership of a module's concrete type. Hooked modules are looked
    /// through to the instance they wrap.
    pub fn contains(&self, module: &dyn Module) -> bool {
        let target = module.wrapped().unwrap_or(module);
        self.contains_id(Any::type_id(target.as_any()))
    }

    fn contains_id(&self, id: TypeId) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }

    /// Type names of the registered kinds in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(_, name)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
