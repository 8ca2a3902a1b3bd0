//! Bookkeeping of accepted adversarial directions
//!
//! A [`DirectionSet`] is the canonical, growing store of one sample. The
//! optimiser never sees it directly: each call receives a
//! [`PriorDirections`] snapshot copied out of the stores beforehand.
use crate::error::{AttackError, Result};
use crate::util::l2_norm;
use crate::AdvFloat;
use itertools::izip;
use more_asserts::{assert_le, debug_assert_le};
use ndarray::{stack, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// What happened to a perturbation offered to a [`DirectionSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    /// Stored at `rank`; every entry that was at or after `rank` is dropped.
    Accepted { rank: usize },
    /// At least `quota` shorter perturbations are already stored.
    QuotaReached,
    /// Non-finite or below the minimum length; there is no direction to store.
    Degenerate,
}

/// Accepted perturbations of one sample, ordered by non-decreasing length.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DirectionSet {
    quota: usize,
    #[serde(default)]
    min_length: AdvFloat,
    advs: Vec<Array1<AdvFloat>>,
    directions: Vec<Array1<AdvFloat>>,
    lengths: Vec<AdvFloat>,
    classes: Vec<usize>,
}

impl DirectionSet {
    pub const fn new(quota: usize) -> Self {
        Self::with_min_length(quota, 0.)
    }

    /// A set that treats perturbations shorter than `min_length` as degenerate.
    pub const fn with_min_length(quota: usize, min_length: AdvFloat) -> Self {
        Self {
            quota,
            min_length,
            advs: Vec::new(),
            directions: Vec::new(),
            lengths: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// Offers the adversarial `perturbed` of `original`, classified as `class`.
    ///
    /// The new entry goes after every stored entry that is strictly shorter;
    /// longer or equally long entries are discarded so the order stays sorted.
    pub fn offer(
        &mut self,
        original: ArrayView1<AdvFloat>,
        perturbed: ArrayView1<AdvFloat>,
        class: usize,
    ) -> Offer {
        let perturbation = &perturbed - &original;
        let length = l2_norm(perturbation.view());
        if !(length.is_finite() && length > 0. && length >= self.min_length) {
            return Offer::Degenerate;
        }
        let rank = self.lengths.iter().filter(|&&l| l < length).count();
        if rank >= self.quota {
            return Offer::QuotaReached;
        }
        self.advs.truncate(rank);
        self.directions.truncate(rank);
        self.lengths.truncate(rank);
        self.classes.truncate(rank);

        self.advs.push(perturbed.to_owned());
        self.directions.push(perturbation / length);
        self.lengths.push(length);
        self.classes.push(class);

        debug_assert_le!(self.len(), self.quota);
        debug_assert!(self.lengths.windows(2).all(|w| w[0] <= w[1]));
        Offer::Accepted { rank }
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.quota
    }

    pub const fn quota(&self) -> usize {
        self.quota
    }

    pub fn advs(&self) -> &[Array1<AdvFloat>] {
        &self.advs
    }

    pub fn directions(&self) -> &[Array1<AdvFloat>] {
        &self.directions
    }

    pub fn lengths(&self) -> &[AdvFloat] {
        &self.lengths
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&Array1<AdvFloat>, &Array1<AdvFloat>, AdvFloat, usize)> {
        izip!(
            self.advs.iter(),
            self.directions.iter(),
            self.lengths.iter().copied(),
            self.classes.iter().copied()
        )
    }

    /// Directions stacked into a `[len, features]` array.
    pub fn snapshot(&self, features: usize) -> Array2<AdvFloat> {
        if self.directions.is_empty() {
            return Array2::zeros((0, features));
        }
        let views: Vec<ArrayView1<AdvFloat>> = self.directions.iter().map(Array1::view).collect();
        stack(Axis(0), &views).unwrap_or_else(|_| Array2::zeros((0, features)))
    }
}

/// Frozen per-sample directions a perturbation should stay orthogonal to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriorDirections {
    per_sample: Vec<Array2<AdvFloat>>,
}

impl PriorDirections {
    /// No constraint for any sample.
    pub const fn none() -> Self {
        Self {
            per_sample: Vec::new(),
        }
    }

    /// One `[k_i, features]` array per sample of the batch; `k_i` may differ.
    pub fn new(per_sample: Vec<Array2<AdvFloat>>) -> Self {
        Self { per_sample }
    }

    pub fn from_sets(sets: &[DirectionSet], features: usize) -> Self {
        Self::new(sets.iter().map(|set| set.snapshot(features)).collect())
    }

    /// True when no sample carries a direction.
    pub fn is_empty(&self) -> bool {
        self.per_sample.iter().all(|dirs| dirs.nrows() == 0)
    }

    pub fn get(&self, sample: usize) -> Option<ArrayView2<AdvFloat>> {
        self.per_sample.get(sample).map(Array2::view)
    }

    pub fn num_directions(&self, sample: usize) -> usize {
        self.per_sample.get(sample).map_or(0, Array2::nrows)
    }

    /// # Errors
    /// If the snapshot does not cover `batch` samples of `features` features.
    pub fn validate(&self, batch: usize, features: usize) -> Result<()> {
        if self.per_sample.is_empty() {
            return Ok(());
        }
        if self.per_sample.len() != batch {
            return Err(AttackError::DirectionBatchMismatch {
                expected: batch,
                given: self.per_sample.len(),
            });
        }
        for (sample, dirs) in self.per_sample.iter().enumerate() {
            if dirs.nrows() > 0 && dirs.ncols() != features {
                return Err(AttackError::DirectionShapeMismatch {
                    sample,
                    expected: features,
                    given: dirs.ncols(),
                });
            }
        }
        Ok(())
    }
}
