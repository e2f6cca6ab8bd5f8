// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Dotted-path traversal of module trees and the address table built from it.

use crate::error::{HookError, HookResult};
use crate::hook_point::HookPoint;
use st_nn::Module;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};

/// Joins a parent path and a child name with `.`; the root path is empty.
pub fn compose(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Objects already yielded during one walk, keyed by identity.
///
/// Hook points are keyed by their shared state so clones collapse onto one
/// entry. Zero-sized modules have no distinct address and are never tracked.
#[derive(Debug, Default)]
pub struct Visited {
    seen: HashSet<(usize, TypeId)>,
}

impl Visited {
    fn key(module: &dyn Module) -> Option<(usize, TypeId)> {
        if let Some(point) = module.downcast_ref::<HookPoint>() {
            return Some((point.id(), TypeId::of::<HookPoint>()));
        }
        if std::mem::size_of_val(module) == 0 {
            return None;
        }
        Some((module.data_address(), Any::type_id(module.as_any())))
    }

    /// Records `module`; returns `false` when it was already visited.
    pub fn insert(&mut self, module: &dyn Module) -> bool {
        match Self::key(module) {
            Some(key) => self.seen.insert(key),
            None => true,
        }
    }

    pub fn contains(&self, module: &dyn Module) -> bool {
        Self::key(module).is_some_and(|key| self.seen.contains(&key))
    }
}

/// Depth-first, parent-first walk yielding `(path, module)` for every object
/// reachable through `named_children`, each at most once.
///
/// Hooked nodes report their injected hook points after the wrapped
/// instance's children, so they come out last within each node.
pub fn walk_named<'a>(root: &'a dyn Module, prefix: &str) -> Vec<(String, &'a dyn Module)> {
    let mut visited = Visited::default();
    let mut out = Vec::new();
    walk_into(root, prefix.to_string(), &mut visited, &mut out);
    out
}

/// Same walk threading a caller-owned visited set.
pub fn walk_named_with<'a>(
    root: &'a dyn Module,
    prefix: &str,
    visited: &mut Visited,
) -> Vec<(String, &'a dyn Module)> {
    let mut out = Vec::new();
    walk_into(root, prefix.to_string(), visited, &mut out);
    out
}

fn walk_into<'a>(
    node: &'a dyn Module,
    path: String,
    visited: &mut Visited,
    out: &mut Vec<(String, &'a dyn Module)>,
) {
    if !visited.insert(node) {
        return;
    }
    let children = node.named_children();
    out.push((path.clone(), node));
    for (name, child) in children {
        walk_into(child, compose(&path, name), visited, out);
    }
}

/// Follows `path` down `named_children`, trying every child whose name is a
/// dotted prefix of the remaining path.
pub fn resolve<'a>(root: &'a dyn Module, path: &str) -> Option<&'a dyn Module> {
    if path.is_empty() {
        return Some(root);
    }
    root.named_children()
        .into_iter()
        .find_map(|(name, child)| match path.strip_prefix(name)? {
            "" => Some(child),
            rest => resolve(child, rest.strip_prefix('.')?),
        })
}

/// Path index over a hooked tree, excluding the root itself.
#[derive(Clone, Debug, Default)]
pub struct AddressTable {
    modules: Vec<String>,
    hooks: Vec<(String, HookPoint)>,
    index: HashMap<String, usize>,
    hook_index: HashMap<String, usize>,
}

impl AddressTable {
    /// Walks `root`, names every hook point after its path and indexes the
    /// result. A path reached twice is a construction error.
    pub fn build(root: &dyn Module) -> HookResult<Self> {
        let mut table = Self::default();
        for (path, module) in walk_named(root, "") {
            if path.is_empty() {
                continue;
            }
            if table.index.contains_key(&path) {
                return Err(HookError::DuplicatePath { path });
            }
            table.index.insert(path.clone(), table.modules.len());
            if let Some(point) = module.downcast_ref::<HookPoint>() {
                point.set_name(path.as_str());
                table.hook_index.insert(path.clone(), table.hooks.len());
                table.hooks.push((path.clone(), point.clone()));
            }
            table.modules.push(path);
        }
        Ok(table)
    }

    /// Every non-root path in traversal order.
    pub fn module_paths(&self) -> &[String] {
        &self.modules
    }

    /// Hook points in traversal order.
    pub fn hooks(&self) -> &[(String, HookPoint)] {
        &self.hooks
    }

    pub fn hook(&self, path: &str) -> Option<&HookPoint> {
        self.hook_index.get(path).map(|&at| &self.hooks[at].1)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
