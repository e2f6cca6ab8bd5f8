// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

mod common;

use common::{
    features, single_linear, token_ids, two_layer_sequential, CausalDecoder, ComplexNestedModule,
    ModuleDictModel, NestedListModel, SimpleModule,
};
use st_hook::{
    auto_hook, check_auto_hook, generate_expected_hookpoints, module_signature, CheckOptions,
    HookConfig, HookError, HookPoint, OpaqueRegistry,
};
use st_nn::{Gru, Linear, Module, ModuleContainer, PureResult, Tensor};

fn strict_check(model: Box<dyn Module>, input: &Tensor) {
    let report = check_auto_hook(model, input, &CheckOptions::strict()).unwrap();
    assert!(report.passed(), "{report:?}");
    assert!(report.missing.is_empty());
    assert!(report.unexpected.is_empty());
    assert!(report.duplicate_paths.is_empty());
}

#[test]
fn single_linear_layer() {
    strict_check(single_linear(), &features(2, 4));
}

#[test]
fn module_with_dict_container() {
    strict_check(Box::new(ModuleDictModel::new()), &features(3, 4));
}

#[test]
fn nested_list_containers() {
    strict_check(Box::new(NestedListModel::new()), &features(3, 4));
}

#[test]
fn attention_feed_forward_and_norm_branches() {
    strict_check(Box::new(ComplexNestedModule::new(4)), &features(3, 4));
}

#[test]
fn llama_style_decoder() {
    strict_check(Box::new(CausalDecoder::tiny_llama()), &token_ids());
}

#[test]
fn mixtral_style_decoder() {
    strict_check(Box::new(CausalDecoder::tiny_mixtral()), &token_ids());
}

#[test]
fn module_with_direct_parameters() {
    strict_check(Box::new(SimpleModule::new()), &features(2, 4));
}

#[test]
fn recurrent_encoder() {
    let encoder = ModuleContainer::sequential()
        .with(Gru::new("encoder", 4, 6).unwrap())
        .unwrap()
        .with(Linear::new("head", 6, 2).unwrap())
        .unwrap();
    strict_check(Box::new(encoder), &features(5, 4));
}

#[test]
fn expectations_cover_llama_blocks() {
    let model = CausalDecoder::tiny_llama();
    let expected = generate_expected_hookpoints(&model, &OpaqueRegistry::builtin());
    for path in [
        "embed_tokens.hook_point",
        "layers.0.hook_point",
        "layers.0.self_attn.hook_point",
        "layers.0.self_attn.o_proj.hook_point",
        "layers.1.mlp.act_fn.hook_point",
        "layers.1.post_attention_layernorm.weight.hook_point",
        "norm.weight.hook_point",
        "lm_head.hook_point",
    ] {
        assert!(expected.contains(path), "missing {path}");
    }
    assert!(!expected.contains("layers.hook_point"));
    assert!(!expected.contains("lm_head.weight.hook_point"));
    assert!(!expected.contains("hook_point"));
}

#[test]
fn expectations_match_a_hooked_model() {
    let model = CausalDecoder::tiny_mixtral();
    let expected = generate_expected_hookpoints(&model, &OpaqueRegistry::builtin());
    let hooked = auto_hook(CausalDecoder::tiny_mixtral()).unwrap();
    let seen_through = generate_expected_hookpoints(&hooked, &OpaqueRegistry::builtin());
    assert_eq!(expected, seen_through);
    assert!(expected.contains("layers.1.block_sparse_moe.experts.3.up_proj.hook_point"));
}

#[test]
fn disabled_parameter_hooks_are_honoured() {
    let options = CheckOptions::strict()
        .with_config(HookConfig::default().with_parameter_hooks(false));
    let report =
        check_auto_hook(Box::new(CausalDecoder::tiny_llama()), &token_ids(), &options).unwrap();
    assert!(report.passed());
    assert!(report.actual.iter().all(|path| !path.contains("weight")));
}

#[test]
fn signatures_survive_the_round_trip() {
    let model = ComplexNestedModule::new(4);
    let before = module_signature(&model);
    let hooked = auto_hook(model).unwrap();
    let after = module_signature(&*hooked.unwrap());
    assert_eq!(before, after);
    assert_eq!(before[0].0, "");
    assert!(before[0].1.ends_with("ComplexNestedModule"));
}

/// Holds its projection in a typed field, which the wrapper cannot swap.
struct TypedChild {
    proj: Linear,
}

impl Module for TypedChild {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        self.proj.forward(input)
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        vec![("proj", &self.proj)]
    }
}

#[test]
fn typed_children_are_reported_missing() {
    let model = TypedChild {
        proj: Linear::new("proj", 4, 2).unwrap(),
    };
    let input = features(2, 4);
    let report = check_auto_hook(Box::new(model), &input, &CheckOptions::default()).unwrap();
    assert!(!report.passed());
    assert_eq!(report.missing, vec!["proj.hook_point"]);
    assert!(report.forward_matches());

    let strict = check_auto_hook(
        Box::new(TypedChild {
            proj: Linear::new("proj", 4, 2).unwrap(),
        }),
        &input,
        &CheckOptions::strict(),
    );
    match strict {
        Err(HookError::StructuralMismatch { missing, unexpected }) => {
            assert_eq!(missing, vec!["proj.hook_point"]);
            assert!(unexpected.is_empty());
        }
        other => panic!("expected a structural mismatch, got {other:?}"),
    }
}

/// Exposes a user-declared output hook point that auto-hooking reuses.
struct PreInstrumented {
    hook_point: HookPoint,
    body: Box<dyn Module>,
}

impl Module for PreInstrumented {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        self.hook_point.forward(&self.body.forward(input)?)
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        vec![("hook_point", &self.hook_point), ("body", &*self.body)]
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        vec![("body", &mut self.body)]
    }
}

#[test]
fn reused_hook_points_are_not_duplicated() {
    let model = PreInstrumented {
        hook_point: HookPoint::new(),
        body: Box::new(two_layer_sequential()),
    };
    let report =
        check_auto_hook(Box::new(model), &features(2, 4), &CheckOptions::strict()).unwrap();
    assert_eq!(
        report.actual,
        vec!["body.0.hook_point", "body.1.hook_point", "hook_point"]
    );
}

#[test]
fn reports_serialise_to_json() {
    let report = check_auto_hook(
        Box::new(two_layer_sequential()),
        &features(2, 4),
        &CheckOptions::default(),
    )
    .unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["unwrap_clean"], serde_json::Value::Bool(true));
    assert_eq!(json["actual"].as_array().unwrap().len(), 3);
    assert!(json["missing"].as_array().unwrap().is_empty());
}
