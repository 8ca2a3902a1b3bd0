//! The model oracle the attacks query
use crate::bounds::InputBounds;
use crate::util::argmax_rows;
use crate::AdvFloat;
use ndarray::{Array1, Array2, ArrayView2};

/// A differentiable classifier over batches of flattened inputs.
///
/// Rows of every batch are samples. Implementations must be deterministic:
/// the attacks call `forward` and `backward` on the same batch and expect
/// the two to describe the same function.
pub trait Classifier {
    fn bounds(&self) -> InputBounds;

    fn num_features(&self) -> usize;

    fn num_classes(&self) -> usize;

    /// Returns logits of shape `[batch, num_classes]`.
    fn forward(&self, inputs: &ArrayView2<AdvFloat>) -> Array2<AdvFloat>;

    /// Gradient with respect to `inputs` of `sum(grad_logits * forward(inputs))`.
    fn backward(
        &self,
        inputs: &ArrayView2<AdvFloat>,
        grad_logits: &ArrayView2<AdvFloat>,
    ) -> Array2<AdvFloat>;

    fn predict(&self, inputs: &ArrayView2<AdvFloat>) -> Array1<usize> {
        argmax_rows(&self.forward(inputs).view())
    }
}

impl<C: Classifier + ?Sized> Classifier for &C {
    fn bounds(&self) -> InputBounds {
        (**self).bounds()
    }

    fn num_features(&self) -> usize {
        (**self).num_features()
    }

    fn num_classes(&self) -> usize {
        (**self).num_classes()
    }

    fn forward(&self, inputs: &ArrayView2<AdvFloat>) -> Array2<AdvFloat> {
        (**self).forward(inputs)
    }

    fn backward(
        &self,
        inputs: &ArrayView2<AdvFloat>,
        grad_logits: &ArrayView2<AdvFloat>,
    ) -> Array2<AdvFloat> {
        (**self).backward(inputs, grad_logits)
    }
}
