// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Recursive instrumentation proxy around a module tree.
//!
//! Wrapping moves the module into a [`HookedModule`], replaces every boxed
//! child slot with a hooked child (containers are rebuilt with hooked
//! elements) and pipes the wrapped forward through an output hook point.
//! Children reported by `named_children` but absent from `named_children_mut`
//! cannot be swapped; they are logged, or rejected under
//! [`HookConfig::strict_children`]. [`HookedModule::unwrap`] performs the
//! inverse rewrite.

use crate::address::{self, AddressTable};
use crate::config::HookConfig;
use crate::error::{HookError, HookResult};
use crate::hook_point::{HookFn, HookHandle, HookPoint};
use st_nn::{Module, ModuleContainer, Parameter};
use st_tensor::{PureResult, Tensor, TensorError};
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::ops::Deref;
use tracing::{debug, debug_span, trace, warn};

/// Name of the output hook point every hooked node exposes.
pub const HOOK_POINT: &str = "hook_point";

/// Borrows a possibly unsized module as a trait object.
pub trait AsDynModule {
    fn as_dyn_module(&self) -> &dyn Module;
    fn as_dyn_module_mut(&mut self) -> &mut dyn Module;
}

impl<M: Module> AsDynModule for M {
    fn as_dyn_module(&self) -> &dyn Module {
        self
    }

    fn as_dyn_module_mut(&mut self) -> &mut dyn Module {
        self
    }
}

impl AsDynModule for dyn Module {
    fn as_dyn_module(&self) -> &dyn Module {
        self
    }

    fn as_dyn_module_mut(&mut self) -> &mut dyn Module {
        self
    }
}

/// Placeholder left in a slot while its module is moved out for rewriting.
struct Detached;

impl Module for Detached {
    fn forward(&self, _input: &Tensor) -> PureResult<Tensor> {
        Err(TensorError::UnsupportedOperation {
            label: "detached module slot",
        })
    }
}

/// Instrumented proxy owning exactly one wrapped module.
///
/// The proxy reports the wrapped instance's parameters and children as its
/// own, followed by the hook points it injected:
/// `<param>.hook_point` for each direct parameter of a non-opaque module, then
/// its output `hook_point`. When the wrapped module already exposes a
/// `hook_point` child that point is reused as the output hook instead; the
/// module routes through it itself, so the node does not run it again.
pub struct HookedModule<M: ?Sized + Module + AsDynModule = dyn Module> {
    module: Box<M>,
    hook_point: HookPoint,
    owns_hook_point: bool,
    parameter_hooks: Vec<(String, HookPoint)>,
    address: AddressTable,
}

impl<M: ?Sized + Module + AsDynModule> core::fmt::Debug for HookedModule<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "HookedModule(module={},hook_points={})",
            self.module.type_name(),
            self.address.hooks().len()
        )
    }
}

impl<M: ?Sized + Module + AsDynModule> HookedModule<M> {
    pub(crate) fn build(mut module: Box<M>, config: &HookConfig) -> HookResult<Self> {
        let span = debug_span!("hooked_module", module = module.type_name());
        let _entered = span.enter();

        if module.wrapped().is_some() {
            return Err(HookError::AlreadyWrapped {
                type_name: module.type_name().to_string(),
            });
        }

        let existing = module.named_children().into_iter().find_map(|(name, child)| {
            if name == HOOK_POINT {
                child.downcast_ref::<HookPoint>().cloned()
            } else {
                None
            }
        });

        let parameter_hooks: Vec<(String, HookPoint)> = if config.instrument_parameters
            && !config.registry.contains(module.as_dyn_module())
        {
            module
                .named_parameters()
                .into_iter()
                .map(|(name, _)| (format!("{name}.{HOOK_POINT}"), HookPoint::new()))
                .collect()
        } else {
            Vec::new()
        };

        let replaceable: HashSet<String> = module
            .named_children_mut()
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect();
        let fixed: Vec<String> = module
            .named_children()
            .into_iter()
            .filter(|(name, child)| !child.is::<HookPoint>() && !replaceable.contains(*name))
            .map(|(name, _)| name.to_string())
            .collect();
        for child in fixed {
            if config.strict_children {
                return Err(HookError::UnreplaceableChild {
                    parent: module.type_name().to_string(),
                    child,
                });
            }
            warn!(child = child.as_str(), "child is not replaceable and stays unhooked");
        }

        for (name, slot) in module.named_children_mut() {
            debug!(child = name, "wrapping child");
            wrap_slot(slot, config)?;
        }

        let (hook_point, owns_hook_point) = match existing {
            Some(point) => {
                trace!("reusing existing hook point");
                (point, false)
            }
            None => (HookPoint::new(), true),
        };

        let mut node = Self {
            module,
            hook_point,
            owns_hook_point,
            parameter_hooks,
            address: AddressTable::default(),
        };
        node.address = AddressTable::build(&node)?;
        Ok(node)
    }

    /// Returns the wrapped instance as-is. Its children stay hooked.
    pub fn into_inner(self) -> Box<M> {
        self.module
    }

    /// Rewrites the tree back to plain modules and returns the wrapped
    /// instance. Hooked children are replaced by their unwrapped instances,
    /// containers are rebuilt with unwrapped elements, and every hook point
    /// injected by wrapping is dropped.
    pub fn unwrap(self) -> Box<M> {
        let mut module = self.module;
        for (_, slot) in module.named_children_mut() {
            let child = std::mem::replace(slot, Box::new(Detached));
            *slot = unwrap_child(child);
        }
        module
    }

    pub fn inner(&self) -> &M {
        &self.module
    }

    /// The hook point for the node's output: owned and applied to the wrapped
    /// forward output, or the reused point the module runs itself.
    pub fn output_hook(&self) -> &HookPoint {
        &self.hook_point
    }

    /// Per-parameter hook points keyed `<param>.hook_point`.
    pub fn parameter_hooks(&self) -> &[(String, HookPoint)] {
        &self.parameter_hooks
    }

    pub fn address_table(&self) -> &AddressTable {
        &self.address
    }

    /// Every object in the tree with its dotted path, the node itself first
    /// under the empty path.
    pub fn named_modules(&self) -> Vec<(String, &dyn Module)> {
        address::walk_named(self, "")
    }

    pub fn modules(&self) -> Vec<&dyn Module> {
        self.named_modules()
            .into_iter()
            .map(|(_, module)| module)
            .collect()
    }

    /// Path to hook point mapping.
    pub fn hook_dict(&self) -> HashMap<&str, &HookPoint> {
        self.address
            .hooks()
            .iter()
            .map(|(path, point)| (path.as_str(), point))
            .collect()
    }

    /// Hook points in traversal order.
    pub fn list_all_hooks(&self) -> Vec<(&str, &HookPoint)> {
        self.address
            .hooks()
            .iter()
            .map(|(path, point)| (path.as_str(), point))
            .collect()
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.address
            .hooks()
            .iter()
            .map(|(path, _)| path.as_str())
            .collect()
    }

    pub fn hook_point(&self, path: &str) -> HookResult<&HookPoint> {
        self.address
            .hook(path)
            .ok_or_else(|| HookError::UnknownHookPoint {
                path: path.to_string(),
            })
    }

    /// Every non-root module path in traversal order.
    pub fn mod_names(&self) -> &[String] {
        self.address.module_paths()
    }

    /// Looks up any object in the tree by dotted path.
    pub fn module(&self, path: &str) -> Option<&dyn Module> {
        if path.is_empty() {
            return Some(self);
        }
        if !self.address.contains(path) {
            return None;
        }
        address::resolve(self, path)
    }

    pub fn add_hook<F>(&self, path: &str, hook: F) -> HookResult<HookHandle>
    where
        F: Fn(&Tensor, &HookPoint) -> PureResult<Option<Tensor>> + 'static,
    {
        Ok(self.hook_point(path)?.add_hook(hook))
    }

    pub fn add_hook_fn(&self, path: &str, hook: HookFn) -> HookResult<HookHandle> {
        Ok(self.hook_point(path)?.add_hook_fn(hook))
    }

    /// Detaches a hook added anywhere in the tree.
    pub fn remove_hook(&self, handle: HookHandle) -> bool {
        self.address
            .hooks()
            .iter()
            .find(|(_, point)| point.id() == handle.point_id())
            .is_some_and(|(_, point)| point.remove_hook(handle))
    }

    /// Removes every hook registered on any hook point of the tree.
    pub fn reset_hooks(&self) {
        for (_, point) in self.address.hooks() {
            point.remove_hooks();
        }
    }

    /// Total number of hooks currently attached across the tree.
    pub fn num_hooks(&self) -> usize {
        self.address
            .hooks()
            .iter()
            .map(|(_, point)| point.num_hooks())
            .sum()
    }

    /// Runs forward with temporary hooks. The hooks are detached again
    /// before returning, also when registration or forward fails.
    pub fn run_with_hooks<I, S>(&self, input: &Tensor, hooks: I) -> HookResult<Tensor>
    where
        I: IntoIterator<Item = (S, HookFn)>,
        S: AsRef<str>,
    {
        let mut handles = Vec::new();
        let mut registration = Ok(());
        for (path, hook) in hooks {
            match self.add_hook_fn(path.as_ref(), hook) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    registration = Err(err);
                    break;
                }
            }
        }
        let result = registration.and_then(|()| self.forward(input).map_err(HookError::from));
        for handle in handles {
            self.remove_hook(handle);
        }
        result
    }
}

impl<M: ?Sized + Module + AsDynModule> Deref for HookedModule<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.module
    }
}

impl<M: ?Sized + Module + AsDynModule> Module for HookedModule<M> {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let output = self.module.forward(input)?;
        if self.owns_hook_point {
            self.hook_point.run(output)
        } else {
            Ok(output)
        }
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        self.module.named_parameters()
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        let mut children = self.module.named_children();
        for (name, point) in &self.parameter_hooks {
            children.push((name.as_str(), point as &dyn Module));
        }
        if self.owns_hook_point {
            children.push((HOOK_POINT, &self.hook_point as &dyn Module));
        }
        children
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        self.module.named_children_mut()
    }

    fn wrapped(&self) -> Option<&dyn Module> {
        Some(self.module.as_dyn_module())
    }
}

fn wrap_slot(slot: &mut Box<dyn Module>, config: &HookConfig) -> HookResult<()> {
    let child = std::mem::replace(slot, Box::new(Detached));
    *slot = wrap_child(child, config)?;
    Ok(())
}

/// Wraps one child the way a parent node does: hook points are kept,
/// containers are rebuilt with wrapped elements, everything else becomes a
/// hooked node.
pub(crate) fn wrap_child(child: Box<dyn Module>, config: &HookConfig) -> HookResult<Box<dyn Module>> {
    if child.is::<HookPoint>() {
        trace!("skipping hook point child");
        return Ok(child);
    }
    let child = match child.downcast_box::<ModuleContainer>() {
        Ok(container) => {
            debug!(kind = container.kind().label(), len = container.len(), "rebuilding container");
            let rebuilt = (*container).rebuild(|_, element| wrap_child(element, config))?;
            return Ok(Box::new(rebuilt));
        }
        Err(child) => child,
    };
    if child.wrapped().is_some() {
        return Err(HookError::AlreadyWrapped {
            type_name: child.type_name().to_string(),
        });
    }
    Ok(Box::new(HookedModule::<dyn Module>::build(child, config)?))
}

fn unwrap_child(child: Box<dyn Module>) -> Box<dyn Module> {
    let child = match child.downcast_box::<ModuleContainer>() {
        Ok(container) => {
            return match (*container).rebuild(|_, element| Ok::<_, Infallible>(unwrap_child(element))) {
                Ok(rebuilt) => Box::new(rebuilt),
                Err(never) => match never {},
            };
        }
        Err(child) => child,
    };
    match child.downcast_box::<HookedModule<dyn Module>>() {
        Ok(hooked) => hooked.unwrap(),
        Err(child) => child,
    }
}
