// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Model fixtures shared by the integration tests.

#![allow(dead_code)]

use st_nn::{
    Embedding, Gelu, LayerNorm, Linear, Module, ModuleContainer, Parameter, PureResult, Relu,
    RmsNorm, Silu, Tensor, TensorError,
};

fn as_container(module: &dyn Module) -> PureResult<&ModuleContainer> {
    module
        .downcast_ref::<ModuleContainer>()
        .ok_or(TensorError::UnsupportedOperation {
            label: "expected a module container",
        })
}

fn entry<'a>(container: &'a ModuleContainer, key: &str) -> PureResult<&'a dyn Module> {
    container.get(key).ok_or(TensorError::MissingParameter {
        name: key.to_string(),
    })
}

/// Token ids for the decoder fixtures.
pub fn token_ids() -> Tensor {
    Tensor::from_vec(1, 5, vec![1.0, 7.0, 3.0, 12.0, 5.0]).unwrap()
}

/// Dense features for the non-token fixtures.
pub fn features(rows: usize, cols: usize) -> Tensor {
    Tensor::from_fn(rows, cols, |r, c| ((r * cols + c) as f32 * 0.41).sin()).unwrap()
}

pub fn single_linear() -> Box<dyn Module> {
    Box::new(Linear::new("fc", 4, 3).unwrap())
}

pub fn two_layer_sequential() -> ModuleContainer {
    ModuleContainer::sequential()
        .with(Linear::new("l0", 4, 6).unwrap())
        .unwrap()
        .with(Linear::new("l1", 6, 2).unwrap())
        .unwrap()
}

/// A projection followed by a learnt shift owned by the module itself.
pub struct SimpleModule {
    fc: Box<dyn Module>,
    shift: Parameter,
}

impl SimpleModule {
    pub fn new() -> Self {
        Self {
            fc: Box::new(Linear::new("simple.fc", 4, 3).unwrap()),
            shift: Parameter::new("simple::shift", Tensor::full(1, 3, 0.5).unwrap()),
        }
    }
}

impl Module for SimpleModule {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let mut out = self.fc.forward(input)?;
        out.add_row_inplace(self.shift.value().data())?;
        Ok(out)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        vec![("shift", &self.shift)]
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        vec![("fc", &*self.fc)]
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        vec![("fc", &mut self.fc)]
    }
}

/// Keyed heads combined as `out(silu(proj(x)))`.
pub struct ModuleDictModel {
    heads: Box<dyn Module>,
}

impl ModuleDictModel {
    pub fn new() -> Self {
        let heads = ModuleContainer::dict()
            .with_entry("proj", Linear::new("heads.proj", 4, 4).unwrap())
            .unwrap()
            .with_entry("gate", Silu::new())
            .unwrap()
            .with_entry("out", Linear::new("heads.out", 4, 2).unwrap())
            .unwrap();
        Self {
            heads: Box::new(heads),
        }
    }
}

impl Module for ModuleDictModel {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let heads = as_container(&*self.heads)?;
        let hidden = entry(heads, "proj")?.forward(input)?;
        let hidden = entry(heads, "gate")?.forward(&hidden)?;
        entry(heads, "out")?.forward(&hidden)
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        vec![("heads", &*self.heads)]
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        vec![("heads", &mut self.heads)]
    }
}

/// Lists of lists run stage by stage.
pub struct NestedListModel {
    stages: Box<dyn Module>,
}

impl NestedListModel {
    pub fn new() -> Self {
        let first = ModuleContainer::list()
            .with(Linear::new("stages.0.0", 4, 4).unwrap())
            .unwrap()
            .with(Relu::new())
            .unwrap();
        let second = ModuleContainer::list()
            .with(Linear::new("stages.1.0", 4, 4).unwrap())
            .unwrap()
            .with(Gelu::new())
            .unwrap();
        let stages = ModuleContainer::list()
            .with(first)
            .unwrap()
            .with(second)
            .unwrap();
        Self {
            stages: Box::new(stages),
        }
    }
}

impl Module for NestedListModel {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let mut hidden = input.clone();
        for (_, stage) in as_container(&*self.stages)?.iter() {
            for (_, layer) in as_container(stage)?.iter() {
                hidden = layer.forward(&hidden)?;
            }
        }
        Ok(hidden)
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        vec![("stages", &*self.stages)]
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        vec![("stages", &mut self.stages)]
    }
}

/// Single-head causal-free self attention with separate projections.
pub struct Attention {
    q_proj: Box<dyn Module>,
    k_proj: Box<dyn Module>,
    v_proj: Box<dyn Module>,
    o_proj: Box<dyn Module>,
    dim: usize,
}

impl Attention {
    pub fn new(name: &str, dim: usize, bias: bool) -> Self {
        let proj = |suffix: &str| -> Box<dyn Module> {
            let name = format!("{name}.{suffix}");
            if bias {
                Box::new(Linear::new(name, dim, dim).unwrap())
            } else {
                Box::new(Linear::without_bias(name, dim, dim).unwrap())
            }
        };
        Self {
            q_proj: proj("q_proj"),
            k_proj: proj("k_proj"),
            v_proj: proj("v_proj"),
            o_proj: proj("o_proj"),
            dim,
        }
    }
}

impl Module for Attention {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let q = self.q_proj.forward(input)?;
        let k = self.k_proj.forward(input)?;
        let v = self.v_proj.forward(input)?;
        let scores = q.matmul(&k.transpose())?.scale(1.0 / (self.dim as f32).sqrt())?;
        let mixed = scores.row_softmax()?.matmul(&v)?;
        self.o_proj.forward(&mixed)
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        vec![
            ("q_proj", &*self.q_proj),
            ("k_proj", &*self.k_proj),
            ("v_proj", &*self.v_proj),
            ("o_proj", &*self.o_proj),
        ]
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        vec![
            ("q_proj", &mut self.q_proj),
            ("k_proj", &mut self.k_proj),
            ("v_proj", &mut self.v_proj),
            ("o_proj", &mut self.o_proj),
        ]
    }
}

/// Attention, feed-forward and normalisation branches with residuals.
pub struct ComplexNestedModule {
    attention: Box<dyn Module>,
    ffn: Box<dyn Module>,
    norm: Box<dyn Module>,
}

impl ComplexNestedModule {
    pub fn new(dim: usize) -> Self {
        let ffn = ModuleContainer::sequential()
            .with(Linear::new("ffn.0", dim, 2 * dim).unwrap())
            .unwrap()
            .with(Gelu::new())
            .unwrap()
            .with(Linear::new("ffn.2", 2 * dim, dim).unwrap())
            .unwrap();
        Self {
            attention: Box::new(Attention::new("attention", dim, true)),
            ffn: Box::new(ffn),
            norm: Box::new(LayerNorm::new("norm", dim, 1e-5).unwrap()),
        }
    }
}

impl Module for ComplexNestedModule {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let attended = input.add(&self.attention.forward(input)?)?;
        let normed = self.norm.forward(&attended)?;
        normed.add(&self.ffn.forward(&normed)?)
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        vec![
            ("attention", &*self.attention),
            ("ffn", &*self.ffn),
            ("norm", &*self.norm),
        ]
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        vec![
            ("attention", &mut self.attention),
            ("ffn", &mut self.ffn),
            ("norm", &mut self.norm),
        ]
    }
}

/// Gated feed-forward: `down(act(gate(x)) * up(x))`.
pub struct GatedMlp {
    gate_proj: Box<dyn Module>,
    up_proj: Box<dyn Module>,
    down_proj: Box<dyn Module>,
    act_fn: Box<dyn Module>,
}

impl GatedMlp {
    pub fn new(name: &str, dim: usize, hidden: usize) -> Self {
        Self {
            gate_proj: Box::new(Linear::without_bias(format!("{name}.gate_proj"), dim, hidden).unwrap()),
            up_proj: Box::new(Linear::without_bias(format!("{name}.up_proj"), dim, hidden).unwrap()),
            down_proj: Box::new(Linear::without_bias(format!("{name}.down_proj"), hidden, dim).unwrap()),
            act_fn: Box::new(Silu::new()),
        }
    }
}

impl Module for GatedMlp {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let gate = self.act_fn.forward(&self.gate_proj.forward(input)?)?;
        let up = self.up_proj.forward(input)?;
        self.down_proj.forward(&gate.hadamard(&up)?)
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        vec![
            ("gate_proj", &*self.gate_proj),
            ("up_proj", &*self.up_proj),
            ("down_proj", &*self.down_proj),
            ("act_fn", &*self.act_fn),
        ]
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        vec![
            ("gate_proj", &mut self.gate_proj),
            ("up_proj", &mut self.up_proj),
            ("down_proj", &mut self.down_proj),
            ("act_fn", &mut self.act_fn),
        ]
    }
}

/// Top-k routed mixture of gated experts.
pub struct SparseMoe {
    gate: Box<dyn Module>,
    experts: Box<dyn Module>,
    top_k: usize,
}

impl SparseMoe {
    pub fn new(name: &str, dim: usize, hidden: usize, num_experts: usize, top_k: usize) -> Self {
        let mut experts = ModuleContainer::list();
        for idx in 0..num_experts {
            experts
                .push(GatedMlp::new(&format!("{name}.experts.{idx}"), dim, hidden))
                .unwrap();
        }
        Self {
            gate: Box::new(Linear::without_bias(format!("{name}.gate"), dim, num_experts).unwrap()),
            experts: Box::new(experts),
            top_k,
        }
    }
}

impl Module for SparseMoe {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let routing = self.gate.forward(input)?.row_softmax()?;
        let experts = as_container(&*self.experts)?;
        let outputs = experts
            .iter()
            .map(|(_, expert)| expert.forward(input))
            .collect::<PureResult<Vec<_>>>()?;
        let (rows, cols) = input.shape();
        let mut mixed = Tensor::zeros(rows, cols)?;
        for row in 0..rows {
            let weights = routing.row(row)?;
            let mut ranked: Vec<usize> = (0..weights.len()).collect();
            ranked.sort_by(|a, b| weights[*b].total_cmp(&weights[*a]).then(a.cmp(b)));
            ranked.truncate(self.top_k);
            let norm: f32 = ranked.iter().map(|idx| weights[*idx]).sum();
            for idx in ranked {
                let weight = weights[idx] / norm;
                let expert_row = outputs[idx].row(row)?;
                let target = &mut mixed.data_mut()[row * cols..(row + 1) * cols];
                for (acc, value) in target.iter_mut().zip(expert_row.iter()) {
                    *acc += weight * value;
                }
            }
        }
        Ok(mixed)
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        vec![("gate", &*self.gate), ("experts", &*self.experts)]
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        vec![("gate", &mut self.gate), ("experts", &mut self.experts)]
    }
}

/// Pre-norm decoder block; the feed-forward half is either dense or routed.
pub struct DecoderLayer {
    input_layernorm: Box<dyn Module>,
    self_attn: Box<dyn Module>,
    post_attention_layernorm: Box<dyn Module>,
    feed_forward_name: &'static str,
    feed_forward: Box<dyn Module>,
}

impl DecoderLayer {
    pub fn llama(name: &str, dim: usize) -> Self {
        Self {
            input_layernorm: Box::new(RmsNorm::new(format!("{name}.input_layernorm"), dim, 1e-6).unwrap()),
            self_attn: Box::new(Attention::new(&format!("{name}.self_attn"), dim, false)),
            post_attention_layernorm: Box::new(
                RmsNorm::new(format!("{name}.post_attention_layernorm"), dim, 1e-6).unwrap(),
            ),
            feed_forward_name: "mlp",
            feed_forward: Box::new(GatedMlp::new(&format!("{name}.mlp"), dim, 2 * dim)),
        }
    }

    pub fn mixtral(name: &str, dim: usize, num_experts: usize) -> Self {
        Self {
            input_layernorm: Box::new(RmsNorm::new(format!("{name}.input_layernorm"), dim, 1e-6).unwrap()),
            self_attn: Box::new(Attention::new(&format!("{name}.self_attn"), dim, false)),
            post_attention_layernorm: Box::new(
                RmsNorm::new(format!("{name}.post_attention_layernorm"), dim, 1e-6).unwrap(),
            ),
            feed_forward_name: "block_sparse_moe",
            feed_forward: Box::new(SparseMoe::new(
                &format!("{name}.block_sparse_moe"),
                dim,
                dim,
                num_experts,
                2,
            )),
        }
    }
}

impl Module for DecoderLayer {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let attended = self.self_attn.forward(&self.input_layernorm.forward(input)?)?;
        let hidden = input.add(&attended)?;
        let fed = self
            .feed_forward
            .forward(&self.post_attention_layernorm.forward(&hidden)?)?;
        hidden.add(&fed)
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        vec![
            ("input_layernorm", &*self.input_layernorm),
            ("self_attn", &*self.self_attn),
            ("post_attention_layernorm", &*self.post_attention_layernorm),
            (self.feed_forward_name, &*self.feed_forward),
        ]
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        vec![
            ("input_layernorm", &mut self.input_layernorm),
            ("self_attn", &mut self.self_attn),
            ("post_attention_layernorm", &mut self.post_attention_layernorm),
            (self.feed_forward_name, &mut self.feed_forward),
        ]
    }
}

/// Embedding, a list of decoder blocks, a final norm and the vocabulary head.
pub struct CausalDecoder {
    embed_tokens: Box<dyn Module>,
    layers: Box<dyn Module>,
    norm: Box<dyn Module>,
    lm_head: Box<dyn Module>,
}

impl CausalDecoder {
    fn assemble(vocab: usize, dim: usize, blocks: Vec<DecoderLayer>) -> Self {
        let mut layers = ModuleContainer::list();
        for block in blocks {
            layers.push(block).unwrap();
        }
        Self {
            embed_tokens: Box::new(Embedding::new("embed_tokens", vocab, dim).unwrap()),
            layers: Box::new(layers),
            norm: Box::new(RmsNorm::new("norm", dim, 1e-6).unwrap()),
            lm_head: Box::new(Linear::without_bias("lm_head", dim, vocab).unwrap()),
        }
    }

    /// Two Llama-style blocks over a 16 token vocabulary.
    pub fn tiny_llama() -> Self {
        let blocks = (0..2)
            .map(|idx| DecoderLayer::llama(&format!("layers.{idx}"), 8))
            .collect();
        Self::assemble(16, 8, blocks)
    }

    /// Two Mixtral-style blocks routing over four experts.
    pub fn tiny_mixtral() -> Self {
        let blocks = (0..2)
            .map(|idx| DecoderLayer::mixtral(&format!("layers.{idx}"), 8, 4))
            .collect();
        Self::assemble(16, 8, blocks)
    }
}

impl Module for CausalDecoder {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let mut hidden = self.embed_tokens.forward(input)?;
        for (_, layer) in as_container(&*self.layers)?.iter() {
            hidden = layer.forward(&hidden)?;
        }
        self.lm_head.forward(&self.norm.forward(&hidden)?)
    }

    fn named_children(&self) -> Vec<(&str, &dyn Module)> {
        vec![
            ("embed_tokens", &*self.embed_tokens),
            ("layers", &*self.layers),
            ("norm", &*self.norm),
            ("lm_head", &*self.lm_head),
        ]
    }

    fn named_children_mut(&mut self) -> Vec<(&str, &mut Box<dyn Module>)> {
        vec![
            ("embed_tokens", &mut self.embed_tokens),
            ("layers", &mut self.layers),
            ("norm", &mut self.norm),
            ("lm_head", &mut self.lm_head),
        ]
    }
}
