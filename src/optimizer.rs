//! First-order optimiser used by the inner minimisation
use crate::AdvFloat;
use ndarray::{Array, Dimension, Zip};

/// Adam with bias-corrected first and second raw moments.
///
/// A fresh optimiser is created for every binary search round, so the
/// moments never leak between rounds.
#[derive(Clone, Debug)]
pub struct Adam<D: Dimension> {
    m: Array<AdvFloat, D>,
    v: Array<AdvFloat, D>,
    t: i32,
    beta1: AdvFloat,
    beta2: AdvFloat,
    epsilon: AdvFloat,
}

impl<D: Dimension> Adam<D> {
    pub fn new(shape: D) -> Self {
        Self::with_params(shape, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(shape: D, beta1: AdvFloat, beta2: AdvFloat, epsilon: AdvFloat) -> Self {
        Self {
            m: Array::zeros(shape.clone()),
            v: Array::zeros(shape),
            t: 0,
            beta1,
            beta2,
            epsilon,
        }
    }

    /// Returns the update to add to the parameters for a gradient of the loss.
    pub fn step(
        &mut self,
        gradient: &Array<AdvFloat, D>,
        stepsize: AdvFloat,
    ) -> Array<AdvFloat, D> {
        debug_assert_eq!(gradient.shape(), self.m.shape());
        self.t += 1;
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        Zip::from(&mut self.m)
            .and(&mut self.v)
            .and(gradient)
            .for_each(|m, v, &g| {
                *m = beta1 * *m + (1. - beta1) * g;
                *v = beta2 * *v + (1. - beta2) * g * g;
            });
        let bias_correction_1 = 1. - beta1.powi(self.t);
        let bias_correction_2 = 1. - beta2.powi(self.t);
        Zip::from(&self.m).and(&self.v).map_collect(|&m, &v| {
            let m_hat = m / bias_correction_1;
            let v_hat = v / bias_correction_2;
            -stepsize * m_hat / (v_hat.sqrt() + epsilon)
        })
    }
}
