// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Structural and numerical validation of the auto-hook round trip.
//!
//! [`generate_expected_hookpoints`] predicts the hook paths a model should
//! receive from its plain structure alone; [`check_auto_hook`] wraps the
//! model, compares the prediction with the paths actually registered, checks
//! that the wrapped and unwrapped forwards agree with the plain one, and
//! packages the findings into a serialisable [`AutoHookReport`].

use crate::address::{compose, walk_named};
use crate::auto_hook::auto_hook_boxed;
use crate::config::HookConfig;
use crate::error::{HookError, HookResult};
use crate::hook_point::HookPoint;
use crate::hooked_module::HOOK_POINT;
use crate::registry::OpaqueRegistry;
use serde::Serialize;
use st_nn::{Module, ModuleContainer};
use st_tensor::Tensor;
use std::collections::{BTreeSet, HashSet};
use tracing::{info, info_span, warn};

/// Hook paths auto-hooking should register below the root of `model`, with
/// parameter hook points enabled. The root's own `hook_point` is not
/// included.
pub fn generate_expected_hookpoints(model: &dyn Module, registry: &OpaqueRegistry) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    expect_node(model, "", registry, true, &mut out);
    out
}

fn expected_hookpoints(model: &dyn Module, config: &HookConfig) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    expect_node(
        model,
        "",
        &config.registry,
        config.instrument_parameters,
        &mut out,
    );
    out
}

fn expect_node(
    model: &dyn Module,
    prefix: &str,
    registry: &OpaqueRegistry,
    parameters: bool,
    out: &mut BTreeSet<String>,
) {
    let target = model.wrapped().unwrap_or(model);
    for (name, child) in target.named_children() {
        if child.is::<HookPoint>() {
            continue;
        }
        expect_child(child, compose(prefix, name), registry, parameters, out);
    }
    if parameters && !registry.contains(target) {
        for (name, _) in target.named_parameters() {
            out.insert(compose(prefix, &format!("{name}.{HOOK_POINT}")));
        }
    }
}

fn expect_child(
    child: &dyn Module,
    path: String,
    registry: &OpaqueRegistry,
    parameters: bool,
    out: &mut BTreeSet<String>,
) {
    let target = child.wrapped().unwrap_or(child);
    if let Some(container) = target.downcast_ref::<ModuleContainer>() {
        for (key, element) in container.iter() {
            if element.is::<HookPoint>() {
                continue;
            }
            expect_child(element, compose(&path, key), registry, parameters, out);
        }
        return;
    }
    out.insert(compose(&path, HOOK_POINT));
    if !registry.contains(target) {
        expect_node(target, &path, registry, parameters, out);
    }
}

/// `(path, type name)` for every object reachable from `model`, root first.
pub fn module_signature(model: &dyn Module) -> Vec<(String, &'static str)> {
    walk_named(model, "")
        .into_iter()
        .map(|(path, module)| (path, module.type_name()))
        .collect()
}

/// Knobs for [`check_auto_hook`].
#[derive(Clone, Debug)]
pub struct CheckOptions {
    /// Turn structural and numerical findings into errors.
    pub strict: bool,
    /// Largest tolerated element-wise forward difference.
    pub tolerance: f32,
    pub config: HookConfig,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            strict: false,
            tolerance: 1e-5,
            config: HookConfig::default(),
        }
    }
}

impl CheckOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_config(mut self, config: HookConfig) -> Self {
        self.config = config;
        self
    }
}

/// Findings of one [`check_auto_hook`] run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AutoHookReport {
    pub model: String,
    pub expected: Vec<String>,
    pub actual: Vec<String>,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub duplicate_paths: Vec<String>,
    pub hooked_max_abs_diff: f32,
    pub unwrapped_max_abs_diff: f32,
    pub unwrap_clean: bool,
    pub signature_preserved: bool,
    pub tolerance: f32,
}

impl AutoHookReport {
    pub fn structure_matches(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.duplicate_paths.is_empty()
    }

    pub fn forward_matches(&self) -> bool {
        self.hooked_max_abs_diff <= self.tolerance && self.unwrapped_max_abs_diff <= self.tolerance
    }

    pub fn passed(&self) -> bool {
        self.structure_matches() && self.forward_matches() && self.unwrap_clean && self.signature_preserved
    }
}

/// Wraps `model`, validates the hooked tree against its plain structure and
/// forward output, unwraps it again and validates the round trip.
///
/// `input` must be accepted by the model's forward.
pub fn check_auto_hook(
    model: Box<dyn Module>,
    input: &Tensor,
    options: &CheckOptions,
) -> HookResult<AutoHookReport> {
    let model_name = model.type_name().to_string();
    let span = info_span!("check_auto_hook", model = %model_name);
    let _entered = span.enter();

    let plain = model.forward(input)?;
    let mut expected = expected_hookpoints(&*model, &options.config);
    expected.insert(HOOK_POINT.to_string());
    let signature_before = module_signature(&*model);

    let hooked = auto_hook_boxed(model, &options.config)?;
    let actual: BTreeSet<String> = hooked.hook_names().into_iter().map(str::to_string).collect();
    let missing: Vec<String> = expected.difference(&actual).cloned().collect();
    let unexpected: Vec<String> = actual.difference(&expected).cloned().collect();
    let mut seen = HashSet::new();
    let duplicate_paths: Vec<String> = hooked
        .named_modules()
        .into_iter()
        .filter_map(|(path, _)| (!seen.insert(path.clone())).then_some(path))
        .collect();
    let hooked_out = hooked.forward(input)?;
    let hooked_max_abs_diff = plain.max_abs_diff(&hooked_out)?;

    let unwrapped = hooked.unwrap();
    let unwrap_clean = walk_named(&*unwrapped, "")
        .iter()
        .all(|(_, module)| module.wrapped().is_none());
    let signature_after = module_signature(&*unwrapped);
    let signature_preserved = signature_before == signature_after;
    let unwrapped_out = unwrapped.forward(input)?;
    let unwrapped_max_abs_diff = plain.max_abs_diff(&unwrapped_out)?;

    let report = AutoHookReport {
        model: model_name,
        expected: expected.into_iter().collect(),
        actual: actual.into_iter().collect(),
        missing,
        unexpected,
        duplicate_paths,
        hooked_max_abs_diff,
        unwrapped_max_abs_diff,
        unwrap_clean,
        signature_preserved,
        tolerance: options.tolerance,
    };

    if report.passed() {
        info!(hook_points = report.actual.len(), "auto-hook check passed");
    } else {
        warn!(
            missing = ?report.missing,
            unexpected = ?report.unexpected,
            hooked_diff = report.hooked_max_abs_diff,
            unwrapped_diff = report.unwrapped_max_abs_diff,
            "auto-hook check found discrepancies"
        );
    }

    if options.strict {
        enforce(&report, &signature_before, &signature_after)?;
    }
    Ok(report)
}

fn enforce(
    report: &AutoHookReport,
    before: &[(String, &'static str)],
    after: &[(String, &'static str)],
) -> HookResult<()> {
    if !report.structure_matches() {
        let mut unexpected = report.unexpected.clone();
        unexpected.extend(report.duplicate_paths.iter().cloned());
        return Err(HookError::StructuralMismatch {
            missing: report.missing.clone(),
            unexpected,
        });
    }
    if report.hooked_max_abs_diff > report.tolerance {
        return Err(HookError::ForwardMismatch {
            stage: "hooked".to_string(),
            max_abs_diff: report.hooked_max_abs_diff,
            tolerance: report.tolerance,
        });
    }
    if !report.unwrap_clean || !report.signature_preserved {
        let describe = |entries: &[(String, &'static str)]| -> BTreeSet<String> {
            entries
                .iter()
                .map(|(path, kind)| format!("{path}: {kind}"))
                .collect()
        };
        let before = describe(before);
        let after = describe(after);
        return Err(HookError::StructuralMismatch {
            missing: before.difference(&after).cloned().collect(),
            unexpected: after.difference(&before).cloned().collect(),
        });
    }
    if report.unwrapped_max_abs_diff > report.tolerance {
        return Err(HookError::ForwardMismatch {
            stage: "unwrapped".to_string(),
            max_abs_diff: report.unwrapped_max_abs_diff,
            tolerance: report.tolerance,
        });
    }
    Ok(())
}
