//! What counts as adversarial
use crate::error::{AttackError, Result};
use crate::util::{argmax_rows, best_other_class};
use crate::AdvFloat;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Misclassification criterion, one class per sample of the batch.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum Criterion {
    /// Any class other than the given ground-truth label.
    Untargeted(Array1<usize>),
    /// Exactly the given target class.
    Targeted(Array1<usize>),
}

impl Criterion {
    /// Builds a criterion from its configuration name.
    ///
    /// # Errors
    /// `AttackError::UnsupportedCriterion` for names other than
    /// `misclassification` and `targeted`.
    pub fn from_name(name: &str, classes: Array1<usize>) -> Result<Self> {
        match name {
            "misclassification" | "untargeted" => Ok(Self::Untargeted(classes)),
            "targeted" | "targeted_misclassification" => Ok(Self::Targeted(classes)),
            other => Err(AttackError::UnsupportedCriterion(other.to_string())),
        }
    }

    pub const fn classes(&self) -> &Array1<usize> {
        match self {
            Self::Untargeted(classes) | Self::Targeted(classes) => classes,
        }
    }

    pub fn len(&self) -> usize {
        self.classes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes().is_empty()
    }

    const fn is_targeted(&self) -> bool {
        matches!(self, Self::Targeted(_))
    }

    /// The same criterion restricted to the samples at `indices`.
    pub fn select(&self, indices: &[usize]) -> Self {
        let classes = self.classes().select(Axis(0), indices);
        match self {
            Self::Untargeted(_) => Self::Untargeted(classes),
            Self::Targeted(_) => Self::Targeted(classes),
        }
    }

    /// Checks the criterion against a batch and fixes the margin formula.
    ///
    /// # Errors
    /// If the number of classes differs from `batch` or a class index is out of range.
    pub fn resolve(
        &self,
        batch: usize,
        num_classes: usize,
        confidence: AdvFloat,
    ) -> Result<Margin<'_>> {
        let classes = self.classes();
        if classes.len() != batch {
            return Err(AttackError::LabelShapeMismatch {
                name: if self.is_targeted() {
                    "target_classes"
                } else {
                    "labels"
                },
                expected: batch,
                given: classes.len(),
            });
        }
        if let Some(&class) = classes.iter().find(|&&c| c >= num_classes) {
            return Err(AttackError::ClassOutOfRange { class, num_classes });
        }
        Ok(Margin {
            classes: classes.view(),
            targeted: self.is_targeted(),
            confidence,
        })
    }
}

/// A criterion bound to a batch: `max(0, logit[minimize] - logit[maximize] + confidence)`.
#[derive(Clone, Debug)]
pub struct Margin<'a> {
    classes: ArrayView1<'a, usize>,
    targeted: bool,
    confidence: AdvFloat,
}

impl<'a> Margin<'a> {
    /// Logit indices (to push down, to push up) for sample `i`.
    fn pair(&self, i: usize, logits: ArrayView1<AdvFloat>) -> (usize, usize) {
        let class = self.classes[i];
        let other = best_other_class(logits, class);
        if self.targeted {
            (other, class)
        } else {
            (class, other)
        }
    }

    /// Per-sample margin loss scaled by `consts`, and its gradient with respect to the logits.
    pub fn loss_and_grad(
        &self,
        logits: &ArrayView2<AdvFloat>,
        consts: &ArrayView1<AdvFloat>,
    ) -> (Array1<AdvFloat>, Array2<AdvFloat>) {
        let mut losses = Array1::zeros(logits.nrows());
        let mut grad = Array2::zeros(logits.raw_dim());
        for (i, row) in logits.axis_iter(Axis(0)).enumerate() {
            let (minimize, maximize) = self.pair(i, row);
            let margin = row[minimize] - row[maximize] + self.confidence;
            if margin > 0. {
                losses[i] = margin * consts[i];
                grad[[i, minimize]] += consts[i];
                grad[[i, maximize]] -= consts[i];
            }
        }
        (losses, grad)
    }

    /// Whether each row satisfies the criterion once the confidence margin is folded into its logits.
    pub fn is_adversarial(&self, logits: &ArrayView2<AdvFloat>) -> Array1<bool> {
        let shift = if self.targeted {
            -self.confidence
        } else {
            self.confidence
        };
        let mut shifted = logits.to_owned();
        for (i, &class) in self.classes.iter().enumerate() {
            shifted[[i, class]] += shift;
        }
        let predicted = argmax_rows(&shifted.view());
        predicted
            .iter()
            .zip(self.classes.iter())
            .map(|(&p, &c)| if self.targeted { p == c } else { p != c })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_resolve_checks_shapes() {
        let criterion = Criterion::Untargeted(arr1(&[0, 1]));
        assert!(matches!(
            criterion.resolve(3, 2, 0.),
            Err(AttackError::LabelShapeMismatch { name: "labels", expected: 3, given: 2 })
        ));
        assert!(matches!(
            Criterion::Targeted(arr1(&[4])).resolve(1, 3, 0.),
            Err(AttackError::ClassOutOfRange { class: 4, num_classes: 3 })
        ));
        assert!(matches!(
            Criterion::from_name("top_k", arr1(&[0])),
            Err(AttackError::UnsupportedCriterion(_))
        ));
    }

    #[test]
    fn test_untargeted_margin() {
        let criterion = Criterion::Untargeted(arr1(&[0, 0]));
        let margin = criterion.resolve(2, 3, 0.).unwrap();
        let logits = arr2(&[[2., 1., 0.5], [0., 3., 1.]]);
        let (losses, grad) = margin.loss_and_grad(&logits.view(), &arr1(&[2., 2.]).view());
        assert_eq!(losses, arr1(&[2., 0.]));
        assert_eq!(grad, arr2(&[[2., -2., 0.], [0., 0., 0.]]));
        assert_eq!(margin.is_adversarial(&logits.view()), arr1(&[false, true]));
    }

    #[test]
    fn test_targeted_margin_with_confidence() {
        let criterion = Criterion::Targeted(arr1(&[1]));
        let logits = arr2(&[[1., 1.5, 0.]]);
        let loose = criterion.resolve(1, 3, 0.).unwrap();
        assert_eq!(loose.is_adversarial(&logits.view()), arr1(&[true]));
        let strict = criterion.resolve(1, 3, 1.).unwrap();
        assert_eq!(strict.is_adversarial(&logits.view()), arr1(&[false]));
        let (losses, grad) = strict.loss_and_grad(&logits.view(), &arr1(&[1.]).view());
        assert!((losses[0] - 0.5).abs() < 1e-12);
        assert_eq!(grad, arr2(&[[1., -1., 0.]]));
    }
}
