// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

fn validate_positive(value: usize) -> PureResult<()> {
    if value == 0 {
        return Err(TensorError::InvalidDimensions {
            rows: 1,
            cols: value,
        });
    }
    Ok(())
}

fn dilated_extent(size: usize, dilation: usize) -> PureResult<usize> {
    size.checked_sub(1)
        .and_then(|value| value.checked_mul(dilation))
        .and_then(|value| value.checked_add(1))
        .ok_or(TensorError::InvalidDimensions {
            rows: size,
            cols: dilation,
        })
}

fn output_extent(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> PureResult<usize> {
    let numer = input + 2 * padding;
    let eff_kernel = dilated_extent(kernel, dilation)?;
    if numer < eff_kernel {
        return Err(TensorError::InvalidDimensions {
            rows: input,
            cols: eff_kernel,
        });
    }
    Ok((numer - eff_kernel) / stride + 1)
}

/// One-dimensional convolution over `(batch, channels * width)` tensors.
#[derive(Debug)]
pub struct Conv1d {
    weight: Parameter,
    bias: Parameter,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
}

impl Conv1d {
    pub fn new(
        name: impl Into<String>,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> PureResult<Self> {
        validate_positive(in_channels)?;
        validate_positive(out_channels)?;
        validate_positive(kernel_size)?;
        validate_positive(stride)?;
        let name = name.into();
        let span = in_channels * kernel_size;
        let mut seed = 0.01f32;
        let weight = Tensor::from_fn(out_channels, span, |_r, _c| {
            let value = seed;
            seed = (seed * 1.37).rem_euclid(0.1).max(1e-3);
            value
        })?;
        let bias = Tensor::zeros(1, out_channels)?;
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weight),
            bias: Parameter::new(format!("{name}::bias"), bias),
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            dilation: 1,
        })
    }

    /// Builder-style helper returning a new instance configured with dilation.
    pub fn with_dilation(mut self, dilation: usize) -> PureResult<Self> {
        validate_positive(dilation)?;
        self.dilation = dilation;
        Ok(self)
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    fn infer_width(&self, cols: usize) -> PureResult<usize> {
        if cols % self.in_channels != 0 {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.in_channels),
            });
        }
        Ok(cols / self.in_channels)
    }
}

impl Module for Conv1d {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let (batch, cols) = input.shape();
        let width = self.infer_width(cols)?;
        let out_width = output_extent(
            width,
            self.kernel_size,
            self.stride,
            self.padding,
            self.dilation,
        )?;
        let mut out = Tensor::zeros(batch, self.out_channels * out_width)?;
        let weight_data = self.weight.value().data();
        let bias_data = self.bias.value().data();
        let span = self.in_channels * self.kernel_size;
        let out_cols = out.shape().1;
        let out_data = out.data_mut();
        for b in 0..batch {
            let row = &input.data()[b * cols..(b + 1) * cols];
            let out_row = &mut out_data[b * out_cols..(b + 1) * out_cols];
            for oc in 0..self.out_channels {
                let weight_row = &weight_data[oc * span..(oc + 1) * span];
                for ow in 0..out_width {
                    let mut acc = bias_data[oc];
                    for ic in 0..self.in_channels {
                        let channel_offset = ic * width;
                        for k in 0..self.kernel_size {
                            let pos = ow * self.stride + k * self.dilation;
                            if pos < self.padding || pos - self.padding >= width {
                                continue;
                            }
                            let idx = pos - self.padding;
                            acc += row[channel_offset + idx] * weight_row[ic * self.kernel_size + k];
                        }
                    }
                    out_row[oc * out_width + ow] = acc;
                }
            }
        }
        Ok(out)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        vec![("weight", &self.weight), ("bias", &self.bias)]
    }
}

/// Two-dimensional convolution operating on `(batch, channels * height * width)` tensors.
#[derive(Debug)]
pub struct Conv2d {
    weight: Parameter,
    bias: Parameter,
    in_channels: usize,
    out_channels: usize,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
    input_hw: (usize, usize),
}

impl Conv2d {
    pub fn new(
        name: impl Into<String>,
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        input_hw: (usize, usize),
    ) -> PureResult<Self> {
        validate_positive(in_channels)?;
        validate_positive(out_channels)?;
        validate_positive(kernel.0)?;
        validate_positive(kernel.1)?;
        validate_positive(stride.0)?;
        validate_positive(stride.1)?;
        validate_positive(input_hw.0)?;
        validate_positive(input_hw.1)?;
        let name = name.into();
        let span = in_channels * kernel.0 * kernel.1;
        let mut seed = 0.02f32;
        let weight = Tensor::from_fn(out_channels, span, |_r, _c| {
            let value = seed;
            seed = (seed * 1.57).rem_euclid(0.15).max(5e-3);
            value
        })?;
        let bias = Tensor::zeros(1, out_channels)?;
        let conv = Self {
            weight: Parameter::new(format!("{name}::weight"), weight),
            bias: Parameter::new(format!("{name}::bias"), bias),
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
            input_hw,
        };
        conv.output_hw()?;
        Ok(conv)
    }

    /// Spatial size of the output feature map.
    pub fn output_hw(&self) -> PureResult<(usize, usize)> {
        let oh = output_extent(self.input_hw.0, self.kernel.0, self.stride.0, self.padding.0, 1)?;
        let ow = output_extent(self.input_hw.1, self.kernel.1, self.stride.1, self.padding.1, 1)?;
        Ok((oh, ow))
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let (batch, cols) = input.shape();
        let (height, width) = self.input_hw;
        let expected_cols = self.in_channels * height * width;
        if cols != expected_cols {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, expected_cols),
            });
        }
        let (oh, ow) = self.output_hw()?;
        let (kh, kw) = self.kernel;
        let span = self.in_channels * kh * kw;
        let mut out = Tensor::zeros(batch, self.out_channels * oh * ow)?;
        let weight_data = self.weight.value().data();
        let bias_data = self.bias.value().data();
        let out_cols = out.shape().1;
        let out_data = out.data_mut();
        for b in 0..batch {
            let row = &input.data()[b * cols..(b + 1) * cols];
            let out_row = &mut out_data[b * out_cols..(b + 1) * out_cols];
            for oc in 0..self.out_channels {
                let weight_row = &weight_data[oc * span..(oc + 1) * span];
                for y in 0..oh {
                    for x in 0..ow {
                        let mut acc = bias_data[oc];
                        for ic in 0..self.in_channels {
                            for ky in 0..kh {
                                let py = y * self.stride.0 + ky;
                                if py < self.padding.0 || py - self.padding.0 >= height {
                                    continue;
                                }
                                let iy = py - self.padding.0;
                                for kx in 0..kw {
                                    let px = x * self.stride.1 + kx;
                                    if px < self.padding.1 || px - self.padding.1 >= width {
                                        continue;
                                    }
                                    let ix = px - self.padding.1;
                                    let input_val = row[(ic * height + iy) * width + ix];
                                    acc += input_val * weight_row[(ic * kh + ky) * kw + kx];
                                }
                            }
                        }
                        out_row[(oc * oh + y) * ow + x] = acc;
                    }
                }
            }
        }
        Ok(out)
    }

    fn named_parameters(&self) -> Vec<(&str, &Parameter)> {
        vec![("weight", &self.weight), ("bias", &self.bias)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv1d_output_width_respects_padding() {
        let conv = Conv1d::new("conv", 2, 3, 3, 1, 1).unwrap();
        let input = Tensor::from_fn(2, 2 * 5, |r, c| (r + c) as f32 * 0.1).unwrap();
        let output = conv.forward(&input).unwrap();
        assert_eq!(output.shape(), (2, 3 * 5));
    }

    #[test]
    fn conv1d_with_unit_kernel_is_channel_mix() {
        let conv = Conv1d::new("mix", 1, 1, 1, 1, 0).unwrap();
        let input = Tensor::from_vec(1, 3, vec![1.0, 2.0, 3.0]).unwrap();
        let output = conv.forward(&input).unwrap();
        let w = conv.weight().value().data()[0];
        assert_eq!(output.data(), &[w, 2.0 * w, 3.0 * w]);
    }

    #[test]
    fn conv2d_rejects_wrong_feature_width() {
        let conv = Conv2d::new("conv", 1, 2, (2, 2), (1, 1), (0, 0), (3, 3)).unwrap();
        assert_eq!(conv.output_hw().unwrap(), (2, 2));
        let good = Tensor::zeros(1, 9).unwrap();
        assert_eq!(conv.forward(&good).unwrap().shape(), (1, 2 * 2 * 2));
        let bad = Tensor::zeros(1, 8).unwrap();
        assert!(conv.forward(&bad).is_err());
    }
}
