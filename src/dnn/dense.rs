use crate::affine::Affine2;
use crate::dnn::layer::Operation;
use crate::error::ModelError;
use crate::AdvFloat;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Dense {
    aff: Affine2,
}

impl Dense {
    pub const fn new(aff: Affine2) -> Self {
        Self { aff }
    }

    /// # Errors
    /// If `mul` does not have one row per entry of `add`.
    pub fn from_parts(mul: Array2<AdvFloat>, add: Array1<AdvFloat>) -> Result<Self, ModelError> {
        if mul.nrows() != add.len() {
            return Err(ModelError::ShiftMismatch {
                rows: mul.nrows(),
                shift: add.len(),
            });
        }
        Ok(Self {
            aff: Affine2::new(mul, add),
        })
    }

    pub const fn affine(&self) -> &Affine2 {
        &self.aff
    }
}

impl Operation for Dense {
    fn input_dim(&self) -> usize {
        self.aff.input_dim()
    }

    fn output_dim(&self) -> usize {
        self.aff.output_dim()
    }

    fn forward(&self, input: &ArrayView2<AdvFloat>) -> Array2<AdvFloat> {
        debug_assert_eq!(input.ncols(), self.input_dim());
        self.aff.apply_rows(input)
    }

    fn backward(
        &self,
        _input: &ArrayView2<AdvFloat>,
        grad_output: &ArrayView2<AdvFloat>,
    ) -> Array2<AdvFloat> {
        self.aff.pullback_rows(grad_output)
    }
}

impl fmt::Display for Dense {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dense {}", self.aff.output_dim())
    }
}
