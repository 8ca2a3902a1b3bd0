//! Error types
//!
//! Only configuration problems are errors. A sample for which no adversarial
//! is found is reported through the `found` flags of the outcomes instead.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AttackError>;

/// Problems with the structure of a reference model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network has no layers")]
    EmptyNetwork,

    #[error("layer {index} expects {expected} inputs but receives {given}")]
    LayerDimensionMismatch {
        index: usize,
        expected: usize,
        given: usize,
    },

    #[error("dense layer basis has {rows} rows but shift has {shift} entries")]
    ShiftMismatch { rows: usize, shift: usize },

    #[error("invalid input bounds [{lower}, {upper}]")]
    InvalidBounds { lower: f64, upper: f64 },
}

/// Errors raised before any optimisation starts.
#[derive(Debug, Error)]
pub enum AttackError {
    #[error("expected {name} to have shape ({expected},), got ({given},)")]
    LabelShapeMismatch {
        name: &'static str,
        expected: usize,
        given: usize,
    },

    #[error("class index {class} is out of range for a model with {num_classes} classes")]
    ClassOutOfRange { class: usize, num_classes: usize },

    #[error("inputs have {given} features but the model expects {expected}")]
    InputShapeMismatch { expected: usize, given: usize },

    #[error("prior directions for sample {sample} have {given} features, expected {expected}")]
    DirectionShapeMismatch {
        sample: usize,
        expected: usize,
        given: usize,
    },

    #[error("prior directions cover {given} samples but the batch has {expected}")]
    DirectionBatchMismatch { expected: usize, given: usize },

    #[error("model returned logits of shape {given:?}, expected {expected:?}")]
    LogitsShapeMismatch {
        expected: (usize, usize),
        given: (usize, usize),
    },

    #[error("model returned an input gradient of shape {given:?}, expected {expected:?}")]
    GradientShapeMismatch {
        expected: (usize, usize),
        given: (usize, usize),
    },

    #[error("unsupported criterion: {0}")]
    UnsupportedCriterion(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
