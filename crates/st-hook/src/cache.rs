// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::HookResult;
use crate::hook_point::{hook_fn, HookFn};
use crate::hooked_module::{AsDynModule, HookedModule};
use st_nn::Module;
use st_tensor::Tensor;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Activations captured during one forward pass, in execution order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivationCache {
    entries: Vec<(String, Tensor)>,
}

impl ActivationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, path: impl Into<String>, activation: Tensor) {
        self.entries.push((path.into(), activation));
    }

    /// Latest activation seen at `path`.
    pub fn get(&self, path: &str) -> Option<&Tensor> {
        self.entries
            .iter()
            .rev()
            .find(|(name, _)| name == path)
            .map(|(_, tensor)| tensor)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries
            .iter()
            .map(|(name, tensor)| (name.as_str(), tensor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<M: ?Sized + Module + AsDynModule> HookedModule<M> {
    /// Runs forward while recording the activation at every hook point.
    pub fn run_with_cache(&self, input: &Tensor) -> HookResult<(Tensor, ActivationCache)> {
        self.run_with_cache_filtered(input, |_| true)
    }

    /// Runs forward while recording the activations at hook points whose path
    /// passes `filter`.
    pub fn run_with_cache_filtered<F>(
        &self,
        input: &Tensor,
        filter: F,
    ) -> HookResult<(Tensor, ActivationCache)>
    where
        F: Fn(&str) -> bool,
    {
        let cache = Rc::new(RefCell::new(ActivationCache::new()));
        let hooks: Vec<(String, HookFn)> = self
            .hook_names()
            .into_iter()
            .filter(|path| filter(*path))
            .map(|path| {
                let sink = Rc::clone(&cache);
                let recorded = path.to_string();
                let hook = hook_fn(move |activation, _| {
                    sink.borrow_mut().record(recorded.as_str(), activation.clone());
                    Ok(None)
                });
                (path.to_string(), hook)
            })
            .collect();
        debug!(hook_points = hooks.len(), "caching activations");
        let output = self.run_with_hooks(input, hooks)?;
        let cache = match Rc::try_unwrap(cache) {
            Ok(cell) => cell.into_inner(),
            Err(shared) => shared.borrow().clone(),
        };
        Ok((output, cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_the_latest_entry() {
        let mut cache = ActivationCache::new();
        cache.record("blocks.0.hook_point", Tensor::zeros(1, 2).unwrap());
        cache.record("blocks.0.hook_point", Tensor::full(1, 2, 1.0).unwrap());
        cache.record("hook_point", Tensor::zeros(1, 1).unwrap());
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("blocks.0.hook_point").unwrap().data(), &[1.0, 1.0]);
        assert!(cache.contains("hook_point"));
        assert!(!cache.contains("missing"));
        assert_eq!(
            cache.names(),
            vec!["blocks.0.hook_point", "blocks.0.hook_point", "hook_point"]
        );
    }
}
