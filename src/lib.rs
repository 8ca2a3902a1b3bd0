#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::module_name_repetitions)]
//! Decomposition of a classifier's decision at a fixed input into a sequence
//! of near-orthogonal, minimum-norm adversarial directions.
//!
//! The directions are found one at a time with a Carlini-Wagner style L2
//! minimisation that carries an extra penalty against every direction found
//! before it. [`decomposition`] drives the accumulation loop,
//! [`binary_search`] tunes the trade-off constant and [`carlini_wagner`]
//! holds the optimiser itself.
extern crate approx;
extern crate itertools;
extern crate more_asserts;
extern crate ndarray;
extern crate ndarray_rand;
extern crate ndarray_stats;
extern crate rand;
extern crate serde;

pub mod affine;
pub mod binary_search;
pub mod bounds;
pub mod carlini_wagner;
pub mod classifier;
pub mod config;
pub mod criterion;
pub mod decomposition;
pub mod directions;
pub mod dnn;
pub mod error;
pub mod logging;
pub mod optimizer;
pub mod util;

#[cfg(test)]
mod test_util;

pub type AdvFloat = f64;

pub use crate::binary_search::{BinarySearch, SearchOutcome};
pub use crate::bounds::InputBounds;
pub use crate::carlini_wagner::{ConstrainedCW, CWOutcome};
pub use crate::classifier::Classifier;
pub use crate::config::{AttackConfig, DecompositionConfig, LearningRateSchedule};
pub use crate::criterion::Criterion;
pub use crate::decomposition::{
    decompose_batched, decompose_sequential, DecompositionArtifact, DecompositionResult,
};
pub use crate::directions::{DirectionSet, PriorDirections};
pub use crate::dnn::DNN;
pub use crate::error::{AttackError, ModelError, Result};
