// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::Module;
use crate::{PureResult, Tensor, TensorError};

/// Flavour of a [`ModuleContainer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Ordered chain; forward pipes the input through every entry.
    Sequential,
    /// Ordered collection without its own forward.
    List,
    /// Keyed collection without its own forward. Insertion order is kept.
    Dict,
}

impl ContainerKind {
    pub fn label(&self) -> &'static str {
        match self {
            ContainerKind::Sequential => "Sequential",
            ContainerKind::List => "ModuleList",
            ContainerKind::Dict => "ModuleDict",
        }
    }

    fn is_indexed(&self) -> bool {
        !matches!(self, ContainerKind::Dict)
    }
}

/// Container of boxed modules mirroring `nn.Sequential`, `nn.ModuleList` and
/// `nn.ModuleDict`.
///
/// Sequential and list entries are keyed by their position (`"0"`, `"1"`, ...);
/// dict entries by their insertion key.
pub struct ModuleContainer {
    kind: ContainerKind,
    entries: Vec<(String, Box<dyn Module>)>,
}

impl core::fmt::Debug for ModuleContainer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}(keys=[{}])",
            self.kind.label(),
            self.entries
                .iter()
                .map(|(key, _)| key.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl ModuleContainer {
    /// Creates an empty container of the requested kind.
    pub fn new(kind: ContainerKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn sequential() -> Self {
        Self::new(ContainerKind::Sequential)
    }

    pub fn list() -> Self {
        Self::new(ContainerKind::List)
    }

    pub fn dict() -> Self {
        Self::new(ContainerKind::Dict)
    }

    /// Rebuilds a container from raw entries.
    ///
    /// Indexed kinds require keys `"0".."n-1"` in order; dict keys must be unique.
    pub fn from_entries(
        kind: ContainerKind,
        entries: Vec<(String, Box<dyn Module>)>,
    ) -> PureResult<Self> {
        let mut container = Self::new(kind);
        for (idx, (key, module)) in entries.into_iter().enumerate() {
            if kind.is_indexed() {
                if key != idx.to_string() {
                    return Err(TensorError::InvalidValue {
                        label: "container_index_key",
                    });
                }
                container.entries.push((key, module));
            } else {
                container.insert_boxed(key, module)?;
            }
        }
        Ok(container)
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Appends a module to an indexed container.
    pub fn push<M: Module>(&mut self, module: M) -> PureResult<()> {
        self.push_boxed(Box::new(module))
    }

    /// Appends a pre-boxed module to an indexed container.
    pub fn push_boxed(&mut self, module: Box<dyn Module>) -> PureResult<()> {
        if !self.kind.is_indexed() {
            return Err(TensorError::UnsupportedOperation {
                label: "ModuleDict::push",
            });
        }
        let key = self.entries.len().to_string();
        self.entries.push((key, module));
        Ok(())
    }

    /// Inserts a keyed module into a dict container.
    pub fn insert<M: Module>(&mut self, key: impl Into<String>, module: M) -> PureResult<()> {
        self.insert_boxed(key.into(), Box::new(module))
    }

    pub fn insert_boxed(&mut self, key: String, module: Box<dyn Module>) -> PureResult<()> {
        if self.kind.is_indexed() {
            return Err(TensorError::UnsupportedOperation {
                label: "indexed container insert",
            });
        }
        if key.is_empty() || key.contains('.') {
            return Err(TensorError::InvalidValue {
                label: "container_key",
            });
        }
        if self.entries.iter().any(|(existing, _)| *existing == key) {
            return Err(TensorError::InvalidValue {
                label: "duplicate_container_key",
            });
        }
        self.entries.push((key, module));
        Ok(())
    }

    /// Builder-style push for indexed containers and insert for dicts keyed by
    /// position.
    pub fn with<M: Module>(mut self, module: M) -> PureResult<Self> {
        if self.kind.is_indexed() {
            self.push(module)?;
        } else {
            let key = self.entries.len().to_string();
            self.insert(key, module)?;
        }
        Ok(self)
    }

    /// Builder-style keyed insert for dicts.
    pub fn with_entry<M: Module>(mut self, key: impl Into<String>, module: M) -> PureResult<Self> {
        self.insert(key, module)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&dyn Module> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, module)| &**module)
    }

    pub fn get_index(&self, index: usize) -> Option<&dyn Module> {
        self.entries.get(index).map(|(_, module)| &**module)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Module)> {
        self.entries
            .iter()
            .map(|(key, module)| (key.as_str(), &**module))
    }

    pub fn into_entries(self) -> Vec<(String, Box<dyn Module>)> {
        self.entries
    }

    /// Consumes the container and builds a new one of the same kind whose
    /// entries are `f(key, entry)`, keeping keys and order.
    pub fn rebuild<E, F>(self, mut f: F) -> Result<Self, E>
    where
        F: FnMut(&str, Box<dyn Module>) -> Result<Box<dyn Module>, E>,
    {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (key, module) in self.entries {
            let module = f(&key, module)?;
            entries.push((key, module));
        }
        Ok(Self {
            kind: self.kind,
            entries,
        })
    }
}

impl Module for ModuleContainer {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        match self.kind {
            ContainerKind::Sequential => {
                let mut activ = input.clone();
                for (_, layer) in &self.entries {
                    activ = layer.forward(&activ)?;
                }
                Ok(activ)
            }
            ContainerKind::List => Err(TensorError::UnsupportedOperation {
                label: "ModuleList::forward",
            }),
            ContainerKind::Dict => Err(TensorError::UnsupportedOperation {
                label: "ModuleDict::forward",
            }),
        }
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        self.iter().collect()
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        self.entries
            .iter_mut()
            .map(|(key, module)| (key.as_str(), module))
            .collect()
    }
}
