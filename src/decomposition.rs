//! Accumulation of near-orthogonal adversarial directions
//!
//! Both entry points repeat the binary search, each time passing the
//! directions accepted so far as the orthogonality constraint, and offer
//! every new adversarial to the sample's [`DirectionSet`].
//!
//! * [`decompose_sequential`] works on one row at a time and runs at most
//!   `n_adv_dims` searches per row.
//! * [`decompose_batched`] attacks the whole batch at once until every
//!   sample is full or `max_runs` searches have been run.
//!
//! Both give up after `early_stop` consecutive searches in which no sample
//! produced a usable adversarial.
use crate::binary_search::{BinarySearch, SearchOutcome};
use crate::classifier::Classifier;
use crate::config::DecompositionConfig;
use crate::criterion::Criterion;
use crate::directions::{DirectionSet, Offer, PriorDirections};
use crate::error::Result;
use crate::util::max_pairwise_overlap;
use crate::AdvFloat;
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, Array3, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

/// Accepted directions of every sample of a batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecompositionResult {
    pub samples: Vec<DirectionSet>,
    /// Number of binary searches run, summed over samples in sequential mode.
    pub runs: usize,
    /// Per sample, whether the failure limit ended its loop.
    pub early_stopped: Vec<bool>,
    features: usize,
    n_adv_dims: usize,
}

/// Zero-padded, array-shaped view of a [`DecompositionResult`].
///
/// Only the first `counts[i]` entries of sample `i` are accepted entries.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecompositionArtifact {
    /// `[n, n_adv_dims, features]` adversarial inputs.
    pub advs: Array3<AdvFloat>,
    /// `[n, n_adv_dims, features]` unit directions.
    pub directions: Array3<AdvFloat>,
    /// `[n, n_adv_dims]` predicted classes at the adversarials.
    pub classes: Array2<usize>,
    /// `[n, n_adv_dims]` perturbation lengths.
    pub lengths: Array2<AdvFloat>,
    pub counts: Array1<usize>,
}

impl DecompositionResult {
    fn new(n: usize, features: usize, config: &DecompositionConfig) -> Self {
        Self {
            samples: vec![DirectionSet::with_min_length(config.n_adv_dims, config.min_length); n],
            runs: 0,
            early_stopped: vec![false; n],
            features,
            n_adv_dims: config.n_adv_dims,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn counts(&self) -> Array1<usize> {
        self.samples.iter().map(DirectionSet::len).collect()
    }

    /// Largest `|d_i . d_j|` between distinct accepted directions, per sample.
    pub fn max_overlaps(&self) -> Array1<AdvFloat> {
        self.samples
            .iter()
            .map(|set| max_pairwise_overlap(&set.snapshot(self.features).view()))
            .collect()
    }

    pub fn to_artifact(&self) -> DecompositionArtifact {
        let n = self.samples.len();
        let (quota, features) = (self.n_adv_dims, self.features);
        let mut advs = Array3::zeros((n, quota, features));
        let mut directions = Array3::zeros((n, quota, features));
        let mut classes = Array2::zeros((n, quota));
        let mut lengths = Array2::zeros((n, quota));
        for (i, set) in self.samples.iter().enumerate() {
            for (j, (adv, dir, length, class)) in set.iter().enumerate() {
                advs.slice_mut(s![i, j, ..]).assign(adv);
                directions.slice_mut(s![i, j, ..]).assign(dir);
                lengths[[i, j]] = length;
                classes[[i, j]] = class;
            }
        }
        DecompositionArtifact {
            advs,
            directions,
            classes,
            lengths,
            counts: self.counts(),
        }
    }
}

/// Offers every found adversarial of `outcome` and returns how many samples
/// produced a usable one. `rows[k]` is the result index of outcome row `k`.
fn accept(
    samples: &mut [DirectionSet],
    rows: &[usize],
    inputs: &ArrayView2<AdvFloat>,
    outcome: &SearchOutcome,
) -> usize {
    let mut successes = 0;
    for (k, &i) in rows.iter().enumerate() {
        if !outcome.found[k] {
            continue;
        }
        match samples[i].offer(
            inputs.row(k),
            outcome.best_perturbed.row(k),
            outcome.best_classes[k],
        ) {
            Offer::Accepted { rank } => {
                debug!(
                    "sample {}: accepted length {} at rank {}",
                    i, outcome.best_norms[k], rank
                );
                successes += 1;
            }
            Offer::QuotaReached => {
                debug!(
                    "sample {}: discarded length {}, quota of {} reached",
                    i,
                    outcome.best_norms[k],
                    samples[i].quota()
                );
                successes += 1;
            }
            Offer::Degenerate => {
                warn!("sample {}: degenerate perturbation treated as not found", i);
            }
        }
    }
    successes
}

fn prepare<'a, C: Classifier + ?Sized>(
    model: &'a C,
    inputs: &ArrayView2<AdvFloat>,
    criterion: &Criterion,
    config: &DecompositionConfig,
) -> Result<BinarySearch<'a, C>> {
    config.validate()?;
    let search = BinarySearch::new(model, config.attack.clone(), config.orth_const);
    search
        .inner()
        .check(inputs, criterion, &PriorDirections::none())?;
    Ok(search)
}

/// Decomposes every row of `inputs` on its own, in row order.
///
/// # Errors
/// On an invalid configuration or shape mismatches between inputs,
/// criterion and model, before any optimisation runs.
pub fn decompose_sequential<C: Classifier + ?Sized>(
    model: &C,
    inputs: &ArrayView2<AdvFloat>,
    criterion: &Criterion,
    config: &DecompositionConfig,
) -> Result<DecompositionResult> {
    let search = prepare(model, inputs, criterion, config)?;
    let mut rng = StdRng::seed_from_u64(config.attack.seed);
    let mut result = DecompositionResult::new(inputs.nrows(), inputs.ncols(), config);

    for i in 0..inputs.nrows() {
        let sample = inputs.slice(s![i..=i, ..]);
        let sample_criterion = criterion.select(&[i]);
        let mut failures = 0;
        for run in 0..config.n_adv_dims {
            let prior = PriorDirections::from_sets(&result.samples[i..=i], inputs.ncols());
            let outcome = search.search(&sample, &sample_criterion, &prior, &mut rng)?;
            result.runs += 1;
            if accept(&mut result.samples, &[i], &sample, &outcome) == 0 {
                failures += 1;
                warn!(
                    "sample {}, run {}: no adversarial found ({} in a row)",
                    i, run, failures
                );
                if failures >= config.early_stop {
                    info!("sample {}: early stop after {} runs", i, run + 1);
                    result.early_stopped[i] = true;
                    break;
                }
            } else {
                failures = 0;
                info!(
                    "sample {}, run {}: {} of {} directions",
                    i,
                    run,
                    result.samples[i].len(),
                    config.n_adv_dims
                );
            }
        }
    }
    Ok(result)
}

/// Decomposes all rows of `inputs` together, one batched search per run.
///
/// # Errors
/// On an invalid configuration or shape mismatches between inputs,
/// criterion and model, before any optimisation runs.
pub fn decompose_batched<C: Classifier + ?Sized>(
    model: &C,
    inputs: &ArrayView2<AdvFloat>,
    criterion: &Criterion,
    config: &DecompositionConfig,
) -> Result<DecompositionResult> {
    let search = prepare(model, inputs, criterion, config)?;
    let mut rng = StdRng::seed_from_u64(config.attack.seed);
    let n = inputs.nrows();
    let mut result = DecompositionResult::new(n, inputs.ncols(), config);
    let rows: Vec<usize> = (0..n).collect();

    let mut failures = 0;
    for run in 0..config.max_runs {
        let prior = PriorDirections::from_sets(&result.samples, inputs.ncols());
        let outcome = search.search(inputs, criterion, &prior, &mut rng)?;
        result.runs += 1;
        let successes = accept(&mut result.samples, &rows, inputs, &outcome);
        if successes == 0 {
            failures += 1;
            warn!("run {}: no adversarial found ({} in a row)", run, failures);
            if failures >= config.early_stop {
                info!("early stop after {} runs", run + 1);
                result.early_stopped = vec![true; n];
                break;
            }
            continue;
        }
        failures = 0;

        let min_dim = result
            .samples
            .iter()
            .map(DirectionSet::len)
            .min()
            .unwrap_or(config.n_adv_dims);
        info!(
            "run {}: {} of {} samples improved, min_dim {} of {}",
            run, successes, n, min_dim, config.n_adv_dims
        );
        if min_dim >= config.n_adv_dims {
            info!("every sample holds {} directions after {} runs", min_dim, run + 1);
            break;
        }
    }
    Ok(result)
}
