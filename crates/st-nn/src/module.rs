// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use st_tensor::{PureResult, Tensor, TensorError};
use std::any::Any;
use std::collections::HashMap;

/// Learnable value owned by a module.
#[derive(Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: Tensor,
}

impl core::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (rows, cols) = self.value.shape();
        write!(f, "Parameter(name={},shape=({},{}))", self.name, rows, cols)
    }
}

impl Parameter {
    /// Creates a new parameter with the provided tensor value.
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Returns the identifier assigned to the parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overrides the parameter name.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Provides an immutable view into the underlying tensor value.
    pub fn value(&self) -> &Tensor {
        &self.value
    }

    /// Provides a mutable view into the underlying tensor value.
    pub fn value_mut(&mut self) -> &mut Tensor {
        &mut self.value
    }

    pub fn shape(&self) -> (usize, usize) {
        self.value.shape()
    }

    /// Replaces the stored value, keeping the original shape.
    pub fn load_value(&mut self, value: &Tensor) -> PureResult<()> {
        if self.value.shape() != value.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.value.shape(),
                right: value.shape(),
            });
        }
        self.value = value.clone();
        Ok(())
    }

    /// Consumes the parameter and returns its tensor.
    pub fn into_value(self) -> Tensor {
        self.value
    }
}

/// Upcasting helpers so trait objects can be inspected by concrete type.
///
/// Call these through `&dyn Module` (or the inherent helpers on `dyn Module`).
/// On a `Box<dyn Module>` the blanket impl resolves to the box itself.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Composable unit of computation.
///
/// Only `forward` is required. Modules with parameters report them through
/// [`Module::named_parameters`]; modules that hold other modules report them
/// through [`Module::named_children`]. Children stored as `Box<dyn Module>`
/// should also be exposed through [`Module::named_children_mut`] so tree
/// rewriters (such as the auto-hook wrapper) can swap them in place. Children
/// held as concrete typed fields cannot be swapped and are only enumerated.
pub trait Module: AsAny + 'static {
    /// Runs a forward pass.
    fn forward(&self, input: &Tensor) -> PureResult<Tensor>;

    /// Direct learnable values in declaration order, keyed by local name.
    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        Vec::new()
    }

    /// Direct child modules in declaration order.
    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        Vec::new()
    }

    /// Replaceable child slots in declaration order.
    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        Vec::new()
    }

    /// Inner instance for transparent proxies, `None` for ordinary modules.
    fn wrapped(&self) -> Option<&dyn Module> {
        None
    }

    /// Visits every parameter in the subtree, own parameters first.
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        for (_, param) in self.named_parameters() {
            visitor(param)?;
        }
        for (_, child) in self.named_children() {
            child.visit_parameters(visitor)?;
        }
        Ok(())
    }

    /// Total number of scalar values stored across the subtree.
    fn parameter_count(&self) -> usize {
        let mut total = 0usize;
        // The counting visitor never fails.
        let visited = self.visit_parameters(&mut |param| {
            total += param.value().len();
            Ok(())
        });
        debug_assert!(visited.is_ok());
        total
    }

    /// Captures a copy of every parameter tensor keyed by its canonical name.
    fn state_dict(&self) -> PureResult<HashMap<String, Tensor>> {
        let mut state = HashMap::new();
        self.visit_parameters(&mut |param| {
            state.insert(param.name().to_string(), param.value().clone());
            Ok(())
        })?;
        Ok(state)
    }

    /// Fully qualified Rust type name of the concrete module.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl dyn Module {
    /// Returns `true` when the concrete type behind the object is `T`.
    pub fn is<T: Module>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Module>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Module>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Moves the object out as a concrete box, or hands it back untouched.
    pub fn downcast_box<T: Module>(self: Box<Self>) -> Result<Box<T>, Box<dyn Module>> {
        if !self.is::<T>() {
            return Err(self);
        }
        match self.into_any().downcast::<T>() {
            Ok(concrete) => Ok(concrete),
            Err(_) => unreachable!("concrete type checked before downcast"),
        }
    }

    /// Identity of the object's data, used to detect aliasing during walks.
    pub fn data_address(&self) -> usize {
        self as *const dyn Module as *const () as usize
    }
}
