// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Identity pass-through points that callers attach interception callbacks to.

use st_nn::Module;
use st_tensor::{PureResult, Tensor};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// Callback attached to a [`HookPoint`].
///
/// Receives the activation flowing through the point and the point itself.
/// Returning `Some(tensor)` replaces the activation for the rest of the
/// forward pass; `None` leaves it untouched.
pub type HookFn = Rc<dyn Fn(&Tensor, &HookPoint) -> PureResult<Option<Tensor>>>;

/// Boxes a closure into a [`HookFn`].
pub fn hook_fn<F>(hook: F) -> HookFn
where
    F: Fn(&Tensor, &HookPoint) -> PureResult<Option<Tensor>> + 'static,
{
    Rc::new(hook)
}

/// Token returned by [`HookPoint::add_hook`], used to detach that hook again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookHandle {
    point: usize,
    id: u64,
}

impl HookHandle {
    /// Identity of the hook point the handle belongs to.
    pub fn point_id(&self) -> usize {
        self.point
    }
}

#[derive(Default)]
struct HookPointState {
    name: String,
    hooks: Vec<(u64, HookFn)>,
    next_id: u64,
}

/// Shared handle to an instrumentation point.
///
/// Clones alias the same point: hooks added through one clone fire for all of
/// them. The handle is single-threaded.
#[derive(Clone, Default)]
pub struct HookPoint {
    state: Rc<RefCell<HookPointState>>,
}

impl core::fmt::Debug for HookPoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.borrow();
        write!(f, "HookPoint(name={:?},hooks={})", state.name, state.hooks.len())
    }
}

impl HookPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        let point = Self::new();
        point.set_name(name);
        point
    }

    /// Dotted path assigned by the enclosing address table, empty until set.
    pub fn name(&self) -> String {
        self.state.borrow().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.state.borrow_mut().name = name.into();
    }

    /// Identity shared by every clone of this point.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.state) as *const () as usize
    }

    /// Returns `true` when both handles alias the same point.
    pub fn same_point(&self, other: &HookPoint) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Registers a callback. Hooks run in registration order.
    pub fn add_hook<F>(&self, hook: F) -> HookHandle
    where
        F: Fn(&Tensor, &HookPoint) -> PureResult<Option<Tensor>> + 'static,
    {
        self.add_hook_fn(Rc::new(hook))
    }

    pub fn add_hook_fn(&self, hook: HookFn) -> HookHandle {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.hooks.push((id, hook));
        HookHandle {
            point: self.id(),
            id,
        }
    }

    /// Detaches the hook behind `handle`. Returns `false` when the handle
    /// belongs to another point or was already removed.
    pub fn remove_hook(&self, handle: HookHandle) -> bool {
        if handle.point != self.id() {
            return false;
        }
        let mut state = self.state.borrow_mut();
        let before = state.hooks.len();
        state.hooks.retain(|(id, _)| *id != handle.id);
        state.hooks.len() != before
    }

    pub fn remove_hooks(&self) {
        self.state.borrow_mut().hooks.clear();
    }

    pub fn num_hooks(&self) -> usize {
        self.state.borrow().hooks.len()
    }

    /// Pipes an activation through every registered hook.
    pub fn run(&self, activation: Tensor) -> PureResult<Tensor> {
        // Snapshot so hooks may add or remove hooks on this point while running.
        let hooks: Vec<HookFn> = self
            .state
            .borrow()
            .hooks
            .iter()
            .map(|(_, hook)| Rc::clone(hook))
            .collect();
        if hooks.is_empty() {
            return Ok(activation);
        }
        trace!(hook_point = %self.name(), hooks = hooks.len(), "running hooks");
        let mut current = activation;
        for hook in hooks {
            if let Some(replaced) = hook(&current, self)? {
                current = replaced;
            }
        }
        Ok(current)
    }
}

impl Module for HookPoint {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        self.run(input.clone())
    }
}
