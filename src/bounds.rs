//! Input bounds of a model and the attack-space re-parameterisation
use crate::error::ModelError;
use crate::AdvFloat;
use ndarray::{Array, ArrayView, Dimension};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Keeps `atanh` finite for inputs that sit exactly on a bound.
const ATANH_SHRINK: AdvFloat = 0.999_999;

/// Closed interval every input feature of a model lives in.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RawBounds")]
pub struct InputBounds {
    lower: AdvFloat,
    upper: AdvFloat,
}

#[derive(Deserialize)]
struct RawBounds {
    lower: AdvFloat,
    upper: AdvFloat,
}

impl TryFrom<RawBounds> for InputBounds {
    type Error = ModelError;

    fn try_from(raw: RawBounds) -> Result<Self, ModelError> {
        Self::new(raw.lower, raw.upper)
    }
}

impl Default for InputBounds {
    fn default() -> Self {
        Self {
            lower: 0.,
            upper: 1.,
        }
    }
}

impl InputBounds {
    /// # Errors
    /// If the interval is empty or either end is not finite.
    pub fn new(lower: AdvFloat, upper: AdvFloat) -> Result<Self, ModelError> {
        if !(lower.is_finite() && upper.is_finite() && lower < upper) {
            return Err(ModelError::InvalidBounds { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub const fn lower(&self) -> AdvFloat {
        self.lower
    }

    pub const fn upper(&self) -> AdvFloat {
        self.upper
    }

    fn center(&self) -> AdvFloat {
        (self.lower + self.upper) / 2.
    }

    fn half_width(&self) -> AdvFloat {
        (self.upper - self.lower) / 2.
    }

    /// Maps model inputs in `[lower, upper]` onto the unconstrained attack space.
    pub fn to_attack_space<D: Dimension>(&self, x: &ArrayView<AdvFloat, D>) -> Array<AdvFloat, D> {
        let (a, b) = (self.center(), self.half_width());
        x.mapv(|v| (((v - a) / b) * ATANH_SHRINK).atanh())
    }

    /// Inverse of [`Self::to_attack_space`] up to the shrink factor.
    pub fn to_model_space<D: Dimension>(&self, w: &ArrayView<AdvFloat, D>) -> Array<AdvFloat, D> {
        let (a, b) = (self.center(), self.half_width());
        w.mapv(|v| v.tanh() * b + a)
    }

    /// Elementwise derivative of [`Self::to_model_space`] at `w`.
    pub fn model_space_jacobian<D: Dimension>(
        &self,
        w: &ArrayView<AdvFloat, D>,
    ) -> Array<AdvFloat, D> {
        let b = self.half_width();
        w.mapv(|v| {
            let t = v.tanh();
            b * (1. - t * t)
        })
    }
}

impl Display for InputBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}
