#![allow(dead_code)]
use ndarray::Array;
use ndarray::Array1;
use ndarray::Array2;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use orthadv::affine::Affine2;
use orthadv::dnn::{Dense, Layer, ReLU, DNN};
use orthadv::{AttackConfig, DecompositionConfig, InputBounds, LearningRateSchedule};
use rand::Rng;

/// Two classes on the unit box: class 1 iff `x[axis] > 0.5`.
pub fn axis_threshold_model(features: usize, axis: usize) -> DNN {
    let mut basis = Array2::zeros((2, features));
    basis[[0, axis]] = -5.;
    basis[[1, axis]] = 5.;
    let shift = Array1::from(vec![2.5, -2.5]);
    DNN::new(
        vec![Dense::new(Affine2::new(basis, shift)).into()],
        InputBounds::default(),
    )
    .unwrap()
}

pub fn threshold_model() -> DNN {
    axis_threshold_model(2, 0)
}

/// A ReLU network with standard normal weights on the unit box.
pub fn random_dnn<R: Rng>(input_size: usize, hidden: usize, classes: usize, rng: &mut R) -> DNN {
    let dense1 = Dense::new(Affine2::new(
        Array::random_using((hidden, input_size), Normal::new(0., 1.).unwrap(), rng),
        Array::random_using(hidden, Normal::new(0., 1.).unwrap(), rng),
    ));
    let dense_out = Dense::new(Affine2::new(
        Array::random_using((classes, hidden), Normal::new(0., 1.).unwrap(), rng),
        Array::random_using(classes, Normal::new(0., 1.).unwrap(), rng),
    ));
    let layers: Vec<Layer> = vec![dense1.into(), ReLU::new(hidden).into(), dense_out.into()];
    DNN::new(layers, InputBounds::default()).unwrap()
}

/// Short runs with a learning rate large enough to cross the unit box.
pub fn fast_attack(binary_search_steps: usize, steps: usize) -> AttackConfig {
    AttackConfig {
        binary_search_steps,
        steps,
        schedule: LearningRateSchedule::Staircase {
            base_rate: 0.05,
            stages: 3,
        },
        ..AttackConfig::default()
    }
}

pub fn decomposition(
    attack: AttackConfig,
    n_adv_dims: usize,
    early_stop: usize,
) -> DecompositionConfig {
    DecompositionConfig {
        attack,
        n_adv_dims,
        early_stop,
        max_runs: 10,
        ..DecompositionConfig::default()
    }
}
