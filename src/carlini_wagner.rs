//! Carlini-Wagner L2 minimisation under an orthogonality penalty
//!
//! One call to [`ConstrainedCW::run`] is one binary search round: with the
//! trade-off constants fixed it minimises, over a perturbation `delta` in
//! attack space,
//!
//! ```text
//! c * max(0, margin + confidence) + |adv - x|^2 + orth_const * c * sum_k (d_k . (adv - x))^2
//! ```
//!
//! and reports the smallest adversarial seen at any step. The adversarial
//! check looks at the raw logits only; the penalty never decides success.
use crate::bounds::InputBounds;
use crate::classifier::Classifier;
use crate::config::AttackConfig;
use crate::criterion::Criterion;
use crate::directions::PriorDirections;
use crate::error::{AttackError, Result};
use crate::optimizer::Adam;
use crate::util::{argmax_rows, row_norms};
use crate::AdvFloat;
use log::{debug, trace};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

/// Result of one constrained minimisation.
#[derive(Clone, Debug)]
pub struct CWOutcome {
    /// Smallest adversarial per sample; the unperturbed input where none was found.
    pub best_perturbed: Array2<AdvFloat>,
    /// L2 distance of `best_perturbed` to the input, infinite where none was found.
    pub best_norms: Array1<AdvFloat>,
    /// Model prediction at `best_perturbed`.
    pub best_classes: Array1<usize>,
    /// Whether the criterion held at any step.
    pub found: Array1<bool>,
    pub steps_run: usize,
    /// Total loss per step, filled when `record_loss` is set.
    pub loss_trace: Vec<AdvFloat>,
    /// Orthogonality penalty per step, filled when `record_loss` is set.
    pub orth_trace: Vec<AdvFloat>,
}

/// The inner optimiser, bound to a model and an attack configuration.
#[derive(Clone, Debug)]
pub struct ConstrainedCW<'a, C: Classifier + ?Sized> {
    model: &'a C,
    config: AttackConfig,
    orth_const: AdvFloat,
}

impl<'a, C: Classifier + ?Sized> ConstrainedCW<'a, C> {
    pub const fn new(model: &'a C, config: AttackConfig, orth_const: AdvFloat) -> Self {
        Self {
            model,
            config,
            orth_const,
        }
    }

    pub const fn config(&self) -> &AttackConfig {
        &self.config
    }

    pub const fn model(&self) -> &'a C {
        self.model
    }

    /// Fails fast on everything that can be checked without running the model.
    ///
    /// # Errors
    /// On input, criterion or direction shape mismatches.
    pub fn check(
        &self,
        inputs: &ArrayView2<AdvFloat>,
        criterion: &Criterion,
        prior: &PriorDirections,
    ) -> Result<()> {
        let features = self.model.num_features();
        if inputs.ncols() != features {
            return Err(AttackError::InputShapeMismatch {
                expected: features,
                given: inputs.ncols(),
            });
        }
        criterion.resolve(inputs.nrows(), self.model.num_classes(), self.config.confidence)?;
        prior.validate(inputs.nrows(), features)
    }

    /// Runs one round with per-sample trade-off constants `consts`.
    ///
    /// # Errors
    /// On shape mismatches between inputs, criterion, directions and model
    /// outputs, or non-positive constants. Failing to find an adversarial is
    /// not an error.
    pub fn run<R: Rng + ?Sized>(
        &self,
        inputs: &ArrayView2<AdvFloat>,
        criterion: &Criterion,
        consts: &ArrayView1<AdvFloat>,
        prior: &PriorDirections,
        rng: &mut R,
    ) -> Result<CWOutcome> {
        self.check(inputs, criterion, prior)?;
        let n = inputs.nrows();
        let num_classes = self.model.num_classes();
        let margin = criterion.resolve(n, num_classes, self.config.confidence)?;
        if consts.len() != n || consts.iter().any(|c| !(c.is_finite() && *c > 0.)) {
            return Err(AttackError::InvalidConfig(format!(
                "trade-off constants must be {} positive finite values, got {}",
                n, consts
            )));
        }

        let bounds: InputBounds = self.model.bounds();
        let x_attack = bounds.to_attack_space(inputs);
        let reconstructed = bounds.to_model_space(&x_attack.view());

        let mut delta = if self.config.random_start {
            let r = self.config.random_start_radius;
            Array2::random_using(x_attack.raw_dim(), Uniform::new_inclusive(-r, r), rng)
        } else {
            Array2::zeros(x_attack.raw_dim())
        };
        let mut optimizer = Adam::new(delta.raw_dim());

        let mut best_perturbed = inputs.to_owned();
        let mut best_norms = Array1::from_elem(n, AdvFloat::INFINITY);
        let mut best_classes = Array1::zeros(n);
        let mut found = Array1::from_elem(n, false);
        let mut loss_trace = vec![];
        let mut orth_trace = vec![];

        let steps = self.config.steps;
        let check_every = (steps + 9) / 10;
        let mut loss_at_previous_check = AdvFloat::INFINITY;
        let mut steps_run = 0;

        for step in 0..steps {
            steps_run = step + 1;
            let w = &x_attack + &delta;
            let adv = bounds.to_model_space(&w.view());
            let logits = self.model.forward(&adv.view());
            if logits.dim() != (n, num_classes) {
                return Err(AttackError::LogitsShapeMismatch {
                    expected: (n, num_classes),
                    given: logits.dim(),
                });
            }

            let (margin_losses, grad_logits) = margin.loss_and_grad(&logits.view(), consts);
            let from_reconstructed = &adv - &reconstructed;
            let squared_norm = from_reconstructed.mapv(|v| v * v).sum();
            let (orth_losses, orth_grad) =
                orthogonality_penalty(&(&adv - inputs).view(), prior, consts, self.orth_const);
            let orth_loss = orth_losses.sum();
            let loss = margin_losses.sum() + squared_norm + orth_loss;

            let grad_model = self.model.backward(&adv.view(), &grad_logits.view());
            if grad_model.dim() != adv.dim() {
                return Err(AttackError::GradientShapeMismatch {
                    expected: adv.dim(),
                    given: grad_model.dim(),
                });
            }
            let grad_adv = grad_model + &(from_reconstructed * 2.) + &orth_grad;
            let gradient = grad_adv * &bounds.model_space_jacobian(&w.view());
            let rate = self.config.schedule.rate(step, steps);
            delta += &optimizer.step(&gradient, rate);

            if self.config.record_loss {
                loss_trace.push(loss);
                orth_trace.push(orth_loss);
            }

            if self.config.abort_early && step % check_every == 0 {
                // after each tenth of the overall steps, check progress
                if !(loss <= 0.9999 * loss_at_previous_check) {
                    trace!("abort early at step {} with loss {}", step, loss);
                    break;
                }
                loss_at_previous_check = loss;
            }

            let found_step = margin.is_adversarial(&logits.view());
            let norms = row_norms(&(&adv - inputs).view());
            let predicted = argmax_rows(&logits.view());
            for i in 0..n {
                if !found_step[i] {
                    continue;
                }
                found[i] = true;
                if norms[i] < best_norms[i] {
                    best_norms[i] = norms[i];
                    best_classes[i] = predicted[i];
                    best_perturbed.row_mut(i).assign(&adv.row(i));
                }
            }
        }

        debug!(
            "cw run finished after {} of {} steps, {} of {} samples adversarial",
            steps_run,
            steps,
            found.iter().filter(|&&f| f).count(),
            n
        );
        Ok(CWOutcome {
            best_perturbed,
            best_norms,
            best_classes,
            found,
            steps_run,
            loss_trace,
            orth_trace,
        })
    }
}

/// Per-sample `orth_const * c * sum_k (d_k . p)^2` and its gradient with respect to `p`.
pub fn orthogonality_penalty(
    perturbations: &ArrayView2<AdvFloat>,
    prior: &PriorDirections,
    consts: &ArrayView1<AdvFloat>,
    orth_const: AdvFloat,
) -> (Array1<AdvFloat>, Array2<AdvFloat>) {
    let mut losses = Array1::zeros(perturbations.nrows());
    let mut grad = Array2::zeros(perturbations.raw_dim());
    if prior.is_empty() {
        return (losses, grad);
    }
    Zip::indexed(&mut losses)
        .and(grad.rows_mut())
        .and(perturbations.rows())
        .for_each(|i, loss, mut grad_row, p| {
            let dirs = match prior.get(i) {
                Some(dirs) if dirs.nrows() > 0 => dirs,
                _ => return,
            };
            let scale = orth_const * consts[i];
            let projections = dirs.dot(&p);
            *loss = scale * projections.dot(&projections);
            grad_row.assign(&(dirs.t().dot(&projections) * (2. * scale)));
        });
    (losses, grad)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::AbsDiffEq;
    use crate::test_util::*;
    use ndarray::{arr1, arr2, Axis};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fast_config() -> AttackConfig {
        AttackConfig {
            steps: 100,
            schedule: crate::config::LearningRateSchedule::Constant { rate: 0.05 },
            abort_early: false,
            ..AttackConfig::default()
        }
    }

    #[test]
    fn test_finds_adversarial_across_threshold() {
        let model = threshold_model();
        let cw = ConstrainedCW::new(&model, fast_config(), 1e5);
        let inputs = arr2(&[[0.3, 0.5]]);
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = cw
            .run(
                &inputs.view(),
                &Criterion::Untargeted(arr1(&[0])),
                &arr1(&[1.]).view(),
                &PriorDirections::none(),
                &mut rng,
            )
            .unwrap();
        assert!(outcome.found[0]);
        assert_eq!(outcome.best_classes[0], 1);
        assert!(outcome.best_perturbed[[0, 0]] > 0.5);
        assert!(outcome.best_norms[0] > 0.19 && outcome.best_norms[0] < 0.3);
        assert_eq!(outcome.steps_run, 100);
    }

    #[test]
    fn test_small_const_finds_nothing() {
        let model = threshold_model();
        let cw = ConstrainedCW::new(&model, fast_config(), 1e5);
        let inputs = arr2(&[[0.3, 0.5]]);
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = cw
            .run(
                &inputs.view(),
                &Criterion::Untargeted(arr1(&[0])),
                &arr1(&[1e-3]).view(),
                &PriorDirections::none(),
                &mut rng,
            )
            .unwrap();
        assert!(!outcome.found[0]);
        assert!(outcome.best_norms[0].is_infinite());
        assert_eq!(outcome.best_perturbed, inputs);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let model = threshold_model();
        let cw = ConstrainedCW::new(&model, fast_config(), 1e5);
        let mut rng = StdRng::seed_from_u64(0);
        let inputs = arr2(&[[0.3, 0.5]]);
        let wide = arr2(&[[0.3, 0.5, 0.1]]);
        let labels = Criterion::Untargeted(arr1(&[0]));
        let consts = arr1(&[1.]);
        let none = PriorDirections::none();
        assert!(matches!(
            cw.run(&wide.view(), &labels, &consts.view(), &none, &mut rng),
            Err(AttackError::InputShapeMismatch {
                expected: 2,
                given: 3
            })
        ));
        let two_labels = Criterion::Untargeted(arr1(&[0, 1]));
        assert!(matches!(
            cw.run(&inputs.view(), &two_labels, &consts.view(), &none, &mut rng),
            Err(AttackError::LabelShapeMismatch { .. })
        ));
        let prior = PriorDirections::new(vec![arr2(&[[1., 0., 0.]])]);
        assert!(matches!(
            cw.run(&inputs.view(), &labels, &consts.view(), &prior, &mut rng),
            Err(AttackError::DirectionShapeMismatch { .. })
        ));
        let zero = arr1(&[0.]);
        assert!(matches!(
            cw.run(&inputs.view(), &labels, &zero.view(), &none, &mut rng),
            Err(AttackError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_abort_early_stops_on_stagnation() {
        let model = threshold_model();
        let config = AttackConfig {
            steps: 1000,
            abort_early: true,
            ..AttackConfig::default()
        };
        let cw = ConstrainedCW::new(&model, config, 1e5);
        let inputs = arr2(&[[0.3, 0.5]]);
        // far too weak to move: the loss settles within the first checks
        let outcome = cw
            .run(
                &inputs.view(),
                &Criterion::Untargeted(arr1(&[0])),
                &arr1(&[1e-6]).view(),
                &PriorDirections::none(),
                &mut StdRng::seed_from_u64(0),
            )
            .unwrap();
        assert!(!outcome.found[0]);
        assert!(outcome.steps_run < 1000);
        // aborts only happen on a check step
        assert_eq!((outcome.steps_run - 1) % 100, 0);
    }

    #[test]
    fn test_penalty_blocks_known_direction() {
        let model = threshold_model();
        let cw = ConstrainedCW::new(&model, fast_config(), 1e5);
        let inputs = arr2(&[[0.3, 0.5]]);
        let prior = PriorDirections::new(vec![arr2(&[[1., 0.]])]);
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = cw
            .run(
                &inputs.view(),
                &Criterion::Untargeted(arr1(&[0])),
                &arr1(&[1.]).view(),
                &prior,
                &mut rng,
            )
            .unwrap();
        assert!(!outcome.found[0]);
    }

    #[test]
    fn test_zero_directions_are_a_no_op() {
        let model = threshold_model();
        let config = AttackConfig {
            random_start: true,
            record_loss: true,
            ..fast_config()
        };
        let cw = ConstrainedCW::new(&model, config, 1e5);
        let inputs = arr2(&[[0.3, 0.5], [0.4, 0.2]]);
        let criterion = Criterion::Untargeted(arr1(&[0, 0]));
        let consts = arr1(&[1., 0.5]);
        let zeros = PriorDirections::new(vec![arr2(&[[0., 0.]]), Array2::zeros((0, 2))]);

        let none = PriorDirections::none();
        let plain = cw
            .run(&inputs.view(), &criterion, &consts.view(), &none, &mut StdRng::seed_from_u64(7))
            .unwrap();
        let constrained = cw
            .run(&inputs.view(), &criterion, &consts.view(), &zeros, &mut StdRng::seed_from_u64(7))
            .unwrap();
        assert!(plain.best_perturbed.abs_diff_eq(&constrained.best_perturbed, 1e-12));
        assert_eq!(plain.found, constrained.found);
        assert_eq!(plain.loss_trace.len(), 100);
        assert!(constrained.orth_trace.iter().all(|&v| v == 0.));
    }

    proptest! {
        #[test]
        fn test_penalty_gradient_matches_finite_difference(p in array2(2, 4), d in unit_vector(4), e in unit_vector(4)) {
            let prior = PriorDirections::new(vec![ndarray::stack(Axis(0), &[d.view(), e.view()]).unwrap(), Array2::zeros((0, 4))]);
            let consts = arr1(&[0.5, 2.]);
            let (losses, grad) = orthogonality_penalty(&p.view(), &prior, &consts.view(), 3.);
            prop_assert_eq!(losses[1], 0.);
            let h = 1e-6;
            for j in 0..4 {
                let mut plus = p.clone();
                let mut minus = p.clone();
                plus[[0, j]] += h;
                minus[[0, j]] -= h;
                let fd = (orthogonality_penalty(&plus.view(), &prior, &consts.view(), 3.).0[0]
                    - orthogonality_penalty(&minus.view(), &prior, &consts.view(), 3.).0[0]) / (2. * h);
                prop_assert!((fd - grad[[0, j]]).abs() <= 1e-4 * (1. + fd.abs()));
            }
        }
    }
}
