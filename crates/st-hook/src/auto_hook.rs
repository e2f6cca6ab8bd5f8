// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Entry points that turn plain modules and parameters into hooked ones.

use crate::config::HookConfig;
use crate::error::{HookError, HookResult};
use crate::hooked_module::HookedModule;
use crate::hooked_parameter::HookedParameter;
use st_nn::{Module, Parameter};
use st_tensor::Tensor;
use std::any::{type_name, Any};
use tracing::info;

/// Result of [`auto_hook_value`].
#[derive(Debug)]
pub enum Hooked {
    Module(HookedModule),
    Parameter(HookedParameter),
}

impl Hooked {
    pub fn into_module(self) -> Option<HookedModule> {
        match self {
            Hooked::Module(module) => Some(module),
            Hooked::Parameter(_) => None,
        }
    }

    pub fn into_parameter(self) -> Option<HookedParameter> {
        match self {
            Hooked::Parameter(param) => Some(param),
            Hooked::Module(_) => None,
        }
    }
}

/// Wraps `module` with [`HookConfig::from_env`].
pub fn auto_hook<M: Module>(module: M) -> HookResult<HookedModule<M>> {
    auto_hook_with(module, &HookConfig::from_env())
}

pub fn auto_hook_with<M: Module>(module: M, config: &HookConfig) -> HookResult<HookedModule<M>> {
    let hooked = HookedModule::build(Box::new(module), config)?;
    info!(
        module = hooked.inner().type_name(),
        hook_points = hooked.address_table().hooks().len(),
        "auto-hooked module"
    );
    Ok(hooked)
}

/// Wraps a type-erased module.
pub fn auto_hook_boxed(module: Box<dyn Module>, config: &HookConfig) -> HookResult<HookedModule> {
    let hooked = HookedModule::<dyn Module>::build(module, config)?;
    info!(
        module = hooked.inner().type_name(),
        hook_points = hooked.address_table().hooks().len(),
        "auto-hooked module"
    );
    Ok(hooked)
}

pub fn auto_hook_parameter(param: Parameter) -> HookedParameter {
    HookedParameter::new(param)
}

/// Dispatches on the runtime type of `value`.
///
/// Accepts a `Box<dyn Module>`, a [`Parameter`] or a bare [`Tensor`] (wrapped
/// as an unnamed parameter). Hooked inputs are rejected with
/// [`HookError::AlreadyWrapped`], anything else with
/// [`HookError::UnsupportedType`].
pub fn auto_hook_value<T: Any>(value: T, config: &HookConfig) -> HookResult<Hooked> {
    let boxed: Box<dyn Any> = Box::new(value);
    let boxed = match boxed.downcast::<Box<dyn Module>>() {
        Ok(module) => return auto_hook_boxed(*module, config).map(Hooked::Module),
        Err(other) => other,
    };
    let boxed = match boxed.downcast::<Parameter>() {
        Ok(param) => return Ok(Hooked::Parameter(HookedParameter::new(*param))),
        Err(other) => other,
    };
    let boxed = match boxed.downcast::<Tensor>() {
        Ok(tensor) => return Ok(Hooked::Parameter(HookedParameter::from_tensor("", *tensor))),
        Err(other) => other,
    };
    if boxed.is::<HookedParameter>() || boxed.is::<HookedModule>() || boxed.is::<Hooked>() {
        return Err(HookError::AlreadyWrapped {
            type_name: type_name::<T>().to_string(),
        });
    }
    Err(HookError::UnsupportedType {
        type_name: type_name::<T>().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use st_nn::{Linear, Relu};

    #[test]
    fn typed_entry_point_keeps_the_concrete_type() {
        let hooked = auto_hook_with(Linear::new("fc", 2, 3).unwrap(), &HookConfig::default())
            .unwrap();
        assert_eq!(hooked.output_dim(), 3);
        let linear: Box<Linear> = hooked.unwrap();
        assert_eq!(linear.input_dim(), 2);
    }

    #[test]
    fn value_dispatch_accepts_modules_parameters_and_tensors() {
        let config = HookConfig::default();
        let module: Box<dyn Module> = Box::new(Relu::new());
        assert!(matches!(auto_hook_value(module, &config), Ok(Hooked::Module(_))));

        let param = Parameter::new("gain", Tensor::full(1, 2, 1.0).unwrap());
        let hooked = auto_hook_value(param, &config).unwrap().into_parameter().unwrap();
        assert_eq!(hooked.parameter().name(), "gain");

        let tensor = Tensor::zeros(2, 2).unwrap();
        assert!(auto_hook_value(tensor, &config).unwrap().into_parameter().is_some());
    }

    #[test]
    fn value_dispatch_rejects_hooked_and_foreign_values() {
        let config = HookConfig::default();
        let hooked = auto_hook_parameter(Parameter::new("p", Tensor::zeros(1, 1).unwrap()));
        match auto_hook_value(hooked, &config) {
            Err(HookError::AlreadyWrapped { type_name }) => {
                assert!(type_name.ends_with("HookedParameter"))
            }
            other => panic!("expected AlreadyWrapped, got {other:?}"),
        }
        match auto_hook_value(42u32, &config) {
            Err(HookError::UnsupportedType { type_name }) => assert_eq!(type_name, "u32"),
            other => panic!("expected UnsupportedType, got {other:?}"),
        }
    }
}
