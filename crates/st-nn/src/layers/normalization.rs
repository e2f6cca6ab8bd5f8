// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor};
use st_tensor::TensorError;

fn validate_epsilon(epsilon: f32, label: &'static str) -> PureResult<()> {
    if epsilon <= 0.0 || !epsilon.is_finite() {
        return Err(TensorError::NonFiniteValue {
            label,
            value: epsilon,
        });
    }
    Ok(())
}

fn guard_features(input: &Tensor, features: usize) -> PureResult<()> {
    let (rows, cols) = input.shape();
    if cols != features {
        return Err(TensorError::ShapeMismatch {
            left: (rows, cols),
            right: (rows, features),
        });
    }
    Ok(())
}

/// Layer normalisation over the feature axis of every row.
#[derive(Debug)]
pub struct LayerNorm {
    features: usize,
    epsilon: f32,
    weight: Parameter,
    bias: Parameter,
}

impl LayerNorm {
    /// Builds a new layer normalisation module with unit scale and zero shift.
    pub fn new(name: impl Into<String>, features: usize, epsilon: f32) -> PureResult<Self> {
        if features == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: 1,
                cols: features,
            });
        }
        validate_epsilon(epsilon, "layernorm_epsilon")?;
        let name = name.into();
        Ok(Self {
            features,
            epsilon,
            weight: Parameter::new(format!("{name}::weight"), Tensor::full(1, features, 1.0)?),
            bias: Parameter::new(format!("{name}::bias"), Tensor::zeros(1, features)?),
        })
    }

    /// Returns the number of features normalised per row.
    pub fn features(&self) -> usize {
        self.features
    }

    /// Returns the epsilon used for stabilisation.
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
}

impl Module for LayerNorm {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        guard_features(input, self.features)?;
        let gamma = self.weight.value().data();
        let beta = self.bias.value().data();
        let mut output = Vec::with_capacity(input.len());
        for row in input.data().chunks(self.features) {
            let mean = row.iter().sum::<f32>() / self.features as f32;
            let variance =
                row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / self.features as f32;
            let inv_std = 1.0 / (variance + self.epsilon).sqrt();
            for (idx, value) in row.iter().enumerate() {
                output.push((value - mean) * inv_std * gamma[idx] + beta[idx]);
            }
        }
        let (rows, cols) = input.shape();
        Tensor::from_vec(rows, cols, output)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        vec![("weight", &self.weight), ("bias", &self.bias)]
    }
}

/// Root-mean-square normalisation with a learnable scale, as used by
/// Llama-style decoders. Not an opaque primitive: its scale is instrumented.
#[derive(Debug)]
pub struct RmsNorm {
    features: usize,
    epsilon: f32,
    weight: Parameter,
}

impl RmsNorm {
    pub fn new(name: impl Into<String>, features: usize, epsilon: f32) -> PureResult<Self> {
        if features == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: 1,
                cols: features,
            });
        }
        validate_epsilon(epsilon, "rmsnorm_epsilon")?;
        let name = name.into();
        Ok(Self {
            features,
            epsilon,
            weight: Parameter::new(format!("{name}::weight"), Tensor::full(1, features, 1.0)?),
        })
    }
}

impl Module for RmsNorm {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        guard_features(input, self.features)?;
        let gamma = self.weight.value().data();
        let mut output = Vec::with_capacity(input.len());
        for row in input.data().chunks(self.features) {
            let mean_sq = row.iter().map(|v| v * v).sum::<f32>() / self.features as f32;
            let inv_rms = 1.0 / (mean_sq + self.epsilon).sqrt();
            output.extend(row.iter().zip(gamma.iter()).map(|(v, g)| v * inv_rms * g));
        }
        let (rows, cols) = input.shape();
        Tensor::from_vec(rows, cols, output)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        vec![("weight", &self.weight)]
    }
}

/// Batch normalisation evaluated with its running statistics.
#[derive(Debug)]
pub struct BatchNorm1d {
    features: usize,
    epsilon: f32,
    weight: Parameter,
    bias: Parameter,
    running_mean: Tensor,
    running_var: Tensor,
}

impl BatchNorm1d {
    pub fn new(name: impl Into<String>, features: usize, epsilon: f32) -> PureResult<Self> {
        if features == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: 1,
                cols: features,
            });
        }
        validate_epsilon(epsilon, "batchnorm_epsilon")?;
        let name = name.into();
        Ok(Self {
            features,
            epsilon,
            weight: Parameter::new(format!("{name}::weight"), Tensor::full(1, features, 1.0)?),
            bias: Parameter::new(format!("{name}::bias"), Tensor::zeros(1, features)?),
            running_mean: Tensor::zeros(1, features)?,
            running_var: Tensor::full(1, features, 1.0)?,
        })
    }

    /// Installs running statistics gathered elsewhere.
    pub fn set_running_stats(&mut self, mean: &Tensor, var: &Tensor) -> PureResult<()> {
        for stat in [mean, var] {
            if stat.shape() != (1, self.features) {
                return Err(TensorError::ShapeMismatch {
                    left: stat.shape(),
                    right: (1, self.features),
                });
            }
        }
        if var.data().iter().any(|v| *v < 0.0) {
            return Err(TensorError::InvalidValue {
                label: "batchnorm_running_var",
            });
        }
        self.running_mean = mean.clone();
        self.running_var = var.clone();
        Ok(())
    }
}

impl Module for BatchNorm1d {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        guard_features(input, self.features)?;
        let gamma = self.weight.value().data();
        let beta = self.bias.value().data();
        let mean = self.running_mean.data();
        let inv_std: Vec<f32> = self
            .running_var
            .data()
            .iter()
            .map(|v| 1.0 / (v + self.epsilon).sqrt())
            .collect();
        let mut output = Vec::with_capacity(input.len());
        for row in input.data().chunks(self.features) {
            for (idx, value) in row.iter().enumerate() {
                output.push((value - mean[idx]) * inv_std[idx] * gamma[idx] + beta[idx]);
            }
        }
        let (rows, cols) = input.shape();
        Tensor::from_vec(rows, cols, output)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        vec![("weight", &self.weight), ("bias", &self.bias)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_norm_centres_rows() {
        let layer = LayerNorm::new("ln", 4, 1e-5).unwrap();
        let input = Tensor::from_vec(2, 4, vec![1.0, 2.0, 3.0, 4.0, -2.0, 0.0, 2.0, 8.0]).unwrap();
        let output = layer.forward(&input).unwrap();
        for r in 0..2 {
            let row = output.row(r).unwrap();
            let mean: f32 = row.iter().sum::<f32>() / 4.0;
            assert!(mean.abs() < 1e-5);
        }
    }

    #[test]
    fn rms_norm_produces_unit_rms() {
        let layer = RmsNorm::new("rms", 3, 1e-6).unwrap();
        let input = Tensor::from_vec(1, 3, vec![3.0, -4.0, 12.0]).unwrap();
        let output = layer.forward(&input).unwrap();
        let rms = (output.squared_l2_norm() / 3.0).sqrt();
        assert!((rms - 1.0).abs() < 1e-4);
    }

    #[test]
    fn batch_norm_uses_running_statistics() {
        let mut layer = BatchNorm1d::new("bn", 2, 1e-5).unwrap();
        let mean = Tensor::from_vec(1, 2, vec![1.0, -1.0]).unwrap();
        let var = Tensor::from_vec(1, 2, vec![4.0, 1.0]).unwrap();
        layer.set_running_stats(&mean, &var).unwrap();
        let input = Tensor::from_vec(1, 2, vec![3.0, 0.0]).unwrap();
        let output = layer.forward(&input).unwrap();
        assert!((output.data()[0] - 1.0).abs() < 1e-4);
        assert!((output.data()[1] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn normalisers_reject_bad_epsilon() {
        assert!(LayerNorm::new("ln", 2, 0.0).is_err());
        assert!(BatchNorm1d::new("bn", 2, f32::NAN).is_err());
    }
}
