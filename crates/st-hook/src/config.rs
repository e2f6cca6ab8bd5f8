// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::registry::OpaqueRegistry;

/// Options consulted while wrapping a module tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookConfig {
    /// Module kinds that do not receive per-parameter hook points.
    pub registry: OpaqueRegistry,
    /// Whether non-opaque modules get a `<param>.hook_point` per direct parameter.
    pub instrument_parameters: bool,
    /// Fail instead of warning when a child is reported by `named_children`
    /// but cannot be swapped through `named_children_mut`.
    pub strict_children: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            registry: OpaqueRegistry::builtin(),
            instrument_parameters: true,
            strict_children: false,
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| !matches!(v.trim(), "0" | "false" | "False" | "off" | "OFF"))
}

impl HookConfig {
    /// Defaults, with `SPIRAL_HOOK_PARAMETERS=0|false|off` disabling
    /// parameter hook points and `SPIRAL_HOOK_STRICT=1` rejecting children
    /// that cannot be replaced.
    pub fn from_env() -> Self {
        Self {
            registry: OpaqueRegistry::builtin(),
            instrument_parameters: env_flag("SPIRAL_HOOK_PARAMETERS").unwrap_or(true),
            strict_children: env_flag("SPIRAL_HOOK_STRICT").unwrap_or(false),
        }
    }

    pub fn with_registry(mut self, registry: OpaqueRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_parameter_hooks(mut self, enabled: bool) -> Self {
        self.instrument_parameters = enabled;
        self
    }

    pub fn with_strict_children(mut self, strict: bool) -> Self {
        self.strict_children = strict;
        self
    }
}
