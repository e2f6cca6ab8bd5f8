// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Automatic hook-point instrumentation for `st-nn` module trees.
//!
//! [`auto_hook`] takes ownership of a module and rebuilds it as a
//! [`HookedModule`]: every boxed child is recursively wrapped, containers are
//! rebuilt with wrapped elements, and each node's forward output flows through
//! a [`HookPoint`] addressable by its dotted path (`blocks.0.attn.hook_point`).
//! Callbacks registered on those points can observe or replace activations.
//! Non-opaque modules additionally receive one placeholder hook point per
//! direct parameter; [`OpaqueRegistry`] lists the primitives that do not.
//! [`HookedModule::unwrap`] restores the plain tree, and
//! [`diagnostics::check_auto_hook`] validates the whole round trip.

pub mod address;
pub mod auto_hook;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod hook_point;
pub mod hooked_module;
pub mod hooked_parameter;
pub mod registry;
mod trace_init;

pub use address::{AddressTable, Visited};
pub use auto_hook::{
    auto_hook, auto_hook_boxed, auto_hook_parameter, auto_hook_value, auto_hook_with, Hooked,
};
pub use cache::ActivationCache;
pub use config::HookConfig;
pub use diagnostics::{
    check_auto_hook, generate_expected_hookpoints, module_signature, AutoHookReport, CheckOptions,
};
pub use error::{HookError, HookResult};
pub use hook_point::{hook_fn, HookFn, HookHandle, HookPoint};
pub use hooked_module::{AsDynModule, HookedModule, HOOK_POINT};
pub use hooked_parameter::HookedParameter;
pub use registry::OpaqueRegistry;
pub use trace_init::init_tracing;
