//! Binary search over the trade-off constant
//!
//! Every sample keeps its own `[lower, upper]` bracket. A round that finds
//! an adversarial moves `upper` down to the constant it used, a round that
//! does not moves `lower` up. Until the first success the constant grows
//! tenfold per round, afterwards it bisects the bracket.
use crate::carlini_wagner::{CWOutcome, ConstrainedCW};
use crate::classifier::Classifier;
use crate::config::{AttackConfig, MAX_CONST};
use crate::criterion::Criterion;
use crate::directions::PriorDirections;
use crate::error::Result;
use crate::AdvFloat;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView2, Zip};
use rand::Rng;

/// Best adversarials over all rounds of one search.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    /// Smallest adversarial per sample; the unperturbed input where none was found.
    pub best_perturbed: Array2<AdvFloat>,
    /// Distance of `best_perturbed` to the input, infinite where none was found.
    pub best_norms: Array1<AdvFloat>,
    pub best_classes: Array1<usize>,
    pub found: Array1<bool>,
    /// Constant of the round that produced each sample's best adversarial.
    pub best_consts: Vec<Option<AdvFloat>>,
    pub best_rounds: Vec<Option<usize>>,
    /// Largest constant known to fail, 0 if none failed.
    pub lower_bounds: Array1<AdvFloat>,
    /// Smallest constant known to succeed, infinite if none succeeded.
    pub upper_bounds: Array1<AdvFloat>,
    /// Per-step loss of the last round that improved any sample, if recorded.
    pub loss_trace: Vec<AdvFloat>,
    pub orth_trace: Vec<AdvFloat>,
}

impl SearchOutcome {
    /// The tightest successful constant of every sample that succeeded.
    pub fn accepted_consts(&self) -> Vec<Option<AdvFloat>> {
        self.upper_bounds
            .iter()
            .map(|&u| if u.is_finite() { Some(u) } else { None })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct BinarySearch<'a, C: Classifier + ?Sized> {
    cw: ConstrainedCW<'a, C>,
}

impl<'a, C: Classifier + ?Sized> BinarySearch<'a, C> {
    pub const fn new(model: &'a C, config: AttackConfig, orth_const: AdvFloat) -> Self {
        Self {
            cw: ConstrainedCW::new(model, config, orth_const),
        }
    }

    pub const fn inner(&self) -> &ConstrainedCW<'a, C> {
        &self.cw
    }

    fn initial_const(&self) -> AdvFloat {
        let initial = self.cw.config().initial_const;
        if initial > MAX_CONST {
            warn!("initial_const {} exceeds {}, clamping", initial, MAX_CONST);
            MAX_CONST
        } else {
            initial
        }
    }

    /// Searches every sample for the smallest constant that still yields an adversarial.
    ///
    /// # Errors
    /// On shape mismatches between inputs, criterion, directions and model.
    pub fn search<R: Rng + ?Sized>(
        &self,
        inputs: &ArrayView2<AdvFloat>,
        criterion: &Criterion,
        prior: &PriorDirections,
        rng: &mut R,
    ) -> Result<SearchOutcome> {
        self.cw.check(inputs, criterion, prior)?;
        let n = inputs.nrows();
        let binary_search_steps = self.cw.config().binary_search_steps;

        let mut consts = Array1::from_elem(n, self.initial_const());
        let mut lower_bounds: Array1<AdvFloat> = Array1::zeros(n);
        let mut upper_bounds = Array1::from_elem(n, AdvFloat::INFINITY);

        let mut best_perturbed = inputs.to_owned();
        let mut best_norms = Array1::from_elem(n, AdvFloat::INFINITY);
        let mut best_classes = Array1::zeros(n);
        let mut best_consts = vec![None; n];
        let mut best_rounds = vec![None; n];
        let mut loss_trace = vec![];
        let mut orth_trace = vec![];

        for round in 0..binary_search_steps {
            if round == binary_search_steps - 1 && binary_search_steps >= 10 {
                // in the last round, retry once at the tightest known bound
                consts = upper_bounds.mapv(|u| u.min(MAX_CONST));
            }

            let outcome: CWOutcome = self.cw.run(inputs, criterion, &consts.view(), prior, rng)?;

            let mut improved = 0;
            for i in 0..n {
                if outcome.best_norms[i] < best_norms[i] {
                    best_norms[i] = outcome.best_norms[i];
                    best_classes[i] = outcome.best_classes[i];
                    best_perturbed
                        .row_mut(i)
                        .assign(&outcome.best_perturbed.row(i));
                    best_consts[i] = Some(consts[i]);
                    best_rounds[i] = Some(round);
                    improved += 1;
                }
            }
            if improved > 0 {
                loss_trace = outcome.loss_trace;
                orth_trace = outcome.orth_trace;
            }

            Zip::from(&mut upper_bounds)
                .and(&mut lower_bounds)
                .and(&outcome.found)
                .and(&consts)
                .for_each(|upper, lower, &found, &c| {
                    if found {
                        *upper = c;
                    } else {
                        *lower = c;
                    }
                });
            consts = Zip::from(&consts)
                .and(&lower_bounds)
                .and(&upper_bounds)
                .map_collect(|&c, &lower, &upper| {
                    if upper.is_infinite() {
                        (c * 10.).min(MAX_CONST)
                    } else {
                        (lower + upper) / 2.
                    }
                });

            debug!(
                "binary search round {} of {}: {} of {} samples adversarial, {} improved",
                round + 1,
                binary_search_steps,
                outcome.found.iter().filter(|&&f| f).count(),
                n,
                improved
            );
        }

        let found = best_norms.mapv(AdvFloat::is_finite);
        if let Some(round) = best_rounds.iter().flatten().max() {
            debug!("best binary search round {}, consts {:?}", round, best_consts);
        }
        Ok(SearchOutcome {
            best_perturbed,
            best_norms,
            best_classes,
            found,
            best_consts,
            best_rounds,
            lower_bounds,
            upper_bounds,
            loss_trace,
            orth_trace,
        })
    }
}
