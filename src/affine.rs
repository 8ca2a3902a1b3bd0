//! Representation of affine transformations
use crate::AdvFloat;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Affine map data structure, `f(x) = Ax + b`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Affine2 {
    basis: Array2<AdvFloat>,
    shift: Array1<AdvFloat>,
}

impl Display for Affine2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        write!(
            f,
            "Basis {:?} Shift {:?}",
            self.basis.shape(),
            self.shift.shape()
        )
    }
}

impl Affine2 {
    /// Shapes are checked by the layers that own an affine map; see `Dense::new`.
    pub fn new(basis: Array2<AdvFloat>, shift: Array1<AdvFloat>) -> Self {
        debug_assert_eq!(basis.nrows(), shift.len());
        Self { basis, shift }
    }

    pub fn basis(&self) -> ArrayView2<AdvFloat> {
        self.basis.view()
    }

    pub fn shift(&self) -> ArrayView1<AdvFloat> {
        self.shift.view()
    }

    pub fn input_dim(&self) -> usize {
        self.basis.ncols()
    }

    pub fn output_dim(&self) -> usize {
        self.shift.len()
    }

    /// Applies the map to every row of `x`.
    pub fn apply_rows(&self, x: &ArrayView2<AdvFloat>) -> Array2<AdvFloat> {
        x.dot(&self.basis.t()) + &self.shift
    }

    /// Pulls a row-wise output cotangent back through the map.
    pub fn pullback_rows(&self, grad_out: &ArrayView2<AdvFloat>) -> Array2<AdvFloat> {
        grad_out.dot(&self.basis)
    }
}
