use crate::dnn::{Dense, ReLU};
use crate::AdvFloat;
use enum_dispatch::enum_dispatch;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// Operations may not be stateful. I.e., they must deterministically produce identical outputs from identical inputs.
/// All representations are batches with one sample per row.
#[enum_dispatch]
pub trait Operation: Clone + Debug + Display {
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;

    fn forward(&self, input: &ArrayView2<AdvFloat>) -> Array2<AdvFloat>;

    /// Vector-Jacobian product of the operation.
    ///
    /// # Arguments
    ///
    /// * `input` - The representation the operation saw on the forward pass.
    /// * `grad_output` - Cotangent of the operation's output.
    fn backward(
        &self,
        input: &ArrayView2<AdvFloat>,
        grad_output: &ArrayView2<AdvFloat>,
    ) -> Array2<AdvFloat>;
}

#[enum_dispatch(Operation)]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub enum Layer {
    Dense(Dense),
    ReLU(ReLU),
}

impl Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dense(x) => write!(f, "{}", x),
            Self::ReLU(x) => write!(f, "{}", x),
        }
    }
}
