pub mod dense;
pub mod dnn;
pub mod layer;
pub mod relu;

pub use dense::Dense;
pub use dnn::DNN;
pub use layer::{Layer, Operation};
pub use relu::ReLU;
