use crate::dnn::layer::Operation;
use crate::AdvFloat;
use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ReLU {
    ndims: usize,
}

impl ReLU {
    pub const fn new(ndims: usize) -> Self {
        Self { ndims }
    }
}

impl Display for ReLU {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "ReLU")
    }
}

impl Operation for ReLU {
    fn input_dim(&self) -> usize {
        self.ndims
    }

    fn output_dim(&self) -> usize {
        self.ndims
    }

    fn forward(&self, input: &ArrayView2<AdvFloat>) -> Array2<AdvFloat> {
        input.mapv(|x| if x.lt(&0.) { 0. } else { x })
    }

    fn backward(
        &self,
        input: &ArrayView2<AdvFloat>,
        grad_output: &ArrayView2<AdvFloat>,
    ) -> Array2<AdvFloat> {
        // Subgradient 0 at the kink
        Zip::from(input)
            .and(grad_output)
            .map_collect(|&x, &g| if x > 0. { g } else { 0. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_relu_backward_masks_inactive_units() {
        let relu = ReLU::new(3);
        let input = arr2(&[[-1., 0., 2.]]);
        let grad = arr2(&[[5., 5., 5.]]);
        assert_eq!(relu.forward(&input.view()), arr2(&[[0., 0., 2.]]));
        assert_eq!(
            relu.backward(&input.view(), &grad.view()),
            arr2(&[[0., 0., 5.]])
        );
    }
}
