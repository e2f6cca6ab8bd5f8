// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

/// Fully-connected layer computing `input · weight + bias`.
#[derive(Debug)]
pub struct Linear {
    weight: Parameter,
    bias: Option<Parameter>,
}

impl Linear {
    /// Creates a new linear layer with deterministic small parameters.
    pub fn new(name: impl Into<String>, input_dim: usize, output_dim: usize) -> PureResult<Self> {
        let mut layer = Self::without_bias(name, input_dim, output_dim)?;
        let name = layer.weight.name().trim_end_matches("::weight").to_string();
        layer.bias = Some(Parameter::new(
            format!("{name}::bias"),
            Tensor::zeros(1, output_dim)?,
        ));
        Ok(layer)
    }

    /// Creates a projection without the additive bias term.
    pub fn without_bias(
        name: impl Into<String>,
        input_dim: usize,
        output_dim: usize,
    ) -> PureResult<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: input_dim,
                cols: output_dim,
            });
        }
        let name = name.into();
        let mut scale = 0.01f32;
        let weights = Tensor::from_fn(input_dim, output_dim, |_r, _c| {
            let value = scale;
            scale = (scale + 0.01).rem_euclid(0.1).max(1e-3);
            value
        })?;
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weights),
            bias: None,
        })
    }

    /// Creates a layer with uniformly sampled weights in `[-bound, bound)`.
    pub fn random(
        name: impl Into<String>,
        input_dim: usize,
        output_dim: usize,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        let mut layer = Self::new(name, input_dim, output_dim)?;
        let bound = 1.0 / (input_dim as f32).sqrt();
        let weights = Tensor::random_uniform(input_dim, output_dim, -bound, bound, seed)?;
        layer.weight.load_value(&weights)?;
        Ok(layer)
    }

    /// Returns a reference to the weight parameter.
    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    /// Returns a reference to the bias parameter, when present.
    pub fn bias(&self) -> Option<&Parameter> {
        self.bias.as_ref()
    }

    pub fn input_dim(&self) -> usize {
        self.weight.shape().0
    }

    pub fn output_dim(&self) -> usize {
        self.weight.shape().1
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        if input.shape().1 != self.weight.value().shape().0 {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: self.weight.value().shape(),
            });
        }
        let mut out = input.matmul(self.weight.value())?;
        if let Some(bias) = &self.bias {
            out.add_row_inplace(bias.value().data())?;
        }
        Ok(out)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        let mut params = vec![("weight", &self.weight)];
        if let Some(bias) = &self.bias {
            params.push(("bias", bias));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_forward_matches_manual() {
        let layer = Linear::new("fc", 3, 2).unwrap();
        let input = Tensor::from_vec(1, 3, vec![1.0, -2.0, 0.5]).unwrap();
        let output = layer.forward(&input).unwrap();
        let mut expected = input.matmul(layer.weight().value()).unwrap();
        expected
            .add_row_inplace(layer.bias().unwrap().value().data())
            .unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn linear_rejects_mismatched_inputs() {
        let layer = Linear::new("fc", 3, 2).unwrap();
        let input = Tensor::zeros(1, 4).unwrap();
        assert!(matches!(
            layer.forward(&input),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn parameter_names_follow_declaration_order() {
        let layer = Linear::new("proj", 2, 2).unwrap();
        let names: Vec<_> = layer.named_parameters().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["weight", "bias"]);
        assert_eq!(layer.weight().name(), "proj::weight");
        assert_eq!(layer.bias().unwrap().name(), "proj::bias");

        let bare = Linear::without_bias("proj", 2, 2).unwrap();
        assert_eq!(bare.named_parameters().len(), 1);
    }

    #[test]
    fn seeded_random_layers_are_reproducible() {
        let a = Linear::random("fc", 4, 3, Some(5)).unwrap();
        let b = Linear::random("fc", 4, 3, Some(5)).unwrap();
        assert_eq!(a.weight().value(), b.weight().value());
    }
}
