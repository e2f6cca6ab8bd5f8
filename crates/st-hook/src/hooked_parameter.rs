// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Parameter proxy whose arithmetic results flow through a hook point.

use crate::hook_point::HookPoint;
use crate::hooked_module::HOOK_POINT;
use st_nn::Parameter;
use st_tensor::{PureResult, Tensor};
use std::collections::HashMap;
use std::ops::{Add, Deref, Mul, Sub};

/// Wraps one [`Parameter`]. Addition, subtraction and element-wise
/// multiplication (tensor-wise, scalar and reflected) return the ordinary
/// result piped through `hook_point`; everything else reads the raw value.
#[derive(Debug)]
pub struct HookedParameter {
    param: Parameter,
    hook_point: HookPoint,
}

impl HookedParameter {
    pub fn new(param: Parameter) -> Self {
        Self {
            param,
            hook_point: HookPoint::named(HOOK_POINT),
        }
    }

    pub fn from_tensor(name: impl Into<String>, value: Tensor) -> Self {
        Self::new(Parameter::new(name, value))
    }

    /// Raw tensor, bypassing the hook point.
    pub fn value(&self) -> &Tensor {
        self.param.value()
    }

    pub fn parameter(&self) -> &Parameter {
        &self.param
    }

    pub fn hook_point(&self) -> &HookPoint {
        &self.hook_point
    }

    pub fn hook_names(&self) -> Vec<&str> {
        vec![HOOK_POINT]
    }

    pub fn hook_dict(&self) -> HashMap<&str, &HookPoint> {
        HashMap::from([(HOOK_POINT, &self.hook_point)])
    }

    /// Returns the wrapped parameter; the hook point is dropped.
    pub fn unwrap(self) -> Parameter {
        self.param
    }

    fn hooked(&self, result: PureResult<Tensor>) -> PureResult<Tensor> {
        self.hook_point.run(result?)
    }

    /// `param + other`
    pub fn add(&self, other: &Tensor) -> PureResult<Tensor> {
        self.hooked(self.value().add(other))
    }

    /// `param - other`
    pub fn sub(&self, other: &Tensor) -> PureResult<Tensor> {
        self.hooked(self.value().sub(other))
    }

    /// `param * other`, element-wise.
    pub fn mul(&self, other: &Tensor) -> PureResult<Tensor> {
        self.hooked(self.value().hadamard(other))
    }

    /// `other + param`
    pub fn radd(&self, other: &Tensor) -> PureResult<Tensor> {
        self.hooked(other.add(self.value()))
    }

    /// `other - param`
    pub fn rsub(&self, other: &Tensor) -> PureResult<Tensor> {
        self.hooked(other.sub(self.value()))
    }

    /// `other * param`, element-wise.
    pub fn rmul(&self, other: &Tensor) -> PureResult<Tensor> {
        self.hooked(other.hadamard(self.value()))
    }

    pub fn add_scalar(&self, value: f32) -> PureResult<Tensor> {
        self.hooked(self.value().add_scalar(value))
    }

    pub fn sub_scalar(&self, value: f32) -> PureResult<Tensor> {
        self.hooked(self.value().add_scalar(-value))
    }

    pub fn mul_scalar(&self, value: f32) -> PureResult<Tensor> {
        self.hooked(self.value().scale(value))
    }

    /// `value - param`
    pub fn rsub_scalar(&self, value: f32) -> PureResult<Tensor> {
        self.hooked(self.value().scale(-1.0).and_then(|neg| neg.add_scalar(value)))
    }
}

impl Deref for HookedParameter {
    type Target = Tensor;

    fn deref(&self) -> &Tensor {
        self.param.value()
    }
}

impl Add<&Tensor> for &HookedParameter {
    type Output = PureResult<Tensor>;

    fn add(self, rhs: &Tensor) -> Self::Output {
        HookedParameter::add(self, rhs)
    }
}

impl Add<&HookedParameter> for &Tensor {
    type Output = PureResult<Tensor>;

    fn add(self, rhs: &HookedParameter) -> Self::Output {
        rhs.radd(self)
    }
}

impl Sub<&Tensor> for &HookedParameter {
    type Output = PureResult<Tensor>;

    fn sub(self, rhs: &Tensor) -> Self::Output {
        HookedParameter::sub(self, rhs)
    }
}

impl Sub<&HookedParameter> for &Tensor {
    type Output = PureResult<Tensor>;

    fn sub(self, rhs: &HookedParameter) -> Self::Output {
        rhs.rsub(self)
    }
}

impl Mul<&Tensor> for &HookedParameter {
    type Output = PureResult<Tensor>;

    fn mul(self, rhs: &Tensor) -> Self::Output {
        HookedParameter::mul(self, rhs)
    }
}

impl Mul<&HookedParameter> for &Tensor {
    type Output = PureResult<Tensor>;

    fn mul(self, rhs: &HookedParameter) -> Self::Output {
        rhs.rmul(self)
    }
}

impl Add<f32> for &HookedParameter {
    type Output = PureResult<Tensor>;

    fn add(self, rhs: f32) -> Self::Output {
        self.add_scalar(rhs)
    }
}

impl Add<&HookedParameter> for f32 {
    type Output = PureResult<Tensor>;

    fn add(self, rhs: &HookedParameter) -> Self::Output {
        rhs.add_scalar(self)
    }
}

impl Sub<f32> for &HookedParameter {
    type Output = PureResult<Tensor>;

    fn sub(self, rhs: f32) -> Self::Output {
        self.sub_scalar(rhs)
    }
}

impl Sub<&HookedParameter> for f32 {
    type Output = PureResult<Tensor>;

    fn sub(self, rhs: &HookedParameter) -> Self::Output {
        rhs.rsub_scalar(self)
    }
}

impl Mul<f32> for &HookedParameter {
    type Output = PureResult<Tensor>;

    fn mul(self, rhs: f32) -> Self::Output {
        self.mul_scalar(rhs)
    }
}

impl Mul<&HookedParameter> for f32 {
    type Output = PureResult<Tensor>;

    fn mul(self, rhs: &HookedParameter) -> Self::Output {
        rhs.mul_scalar(self)
    }
}
