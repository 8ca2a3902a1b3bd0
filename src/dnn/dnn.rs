use crate::bounds::InputBounds;
use crate::classifier::Classifier;
use crate::dnn::layer::{Layer, Operation};
use crate::error::ModelError;
use crate::AdvFloat;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential network whose final layer emits logits.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(try_from = "RawDNN")]
pub struct DNN {
    layers: Vec<Layer>,
    bounds: InputBounds,
}

#[derive(Deserialize)]
struct RawDNN {
    layers: Vec<Layer>,
    #[serde(default)]
    bounds: InputBounds,
}

impl TryFrom<RawDNN> for DNN {
    type Error = ModelError;

    fn try_from(raw: RawDNN) -> Result<Self, ModelError> {
        Self::new(raw.layers, raw.bounds)
    }
}

impl DNN {
    /// # Errors
    /// If `layers` is empty or consecutive layers disagree on their dimensions.
    pub fn new(layers: Vec<Layer>, bounds: InputBounds) -> Result<Self, ModelError> {
        if layers.is_empty() {
            return Err(ModelError::EmptyNetwork);
        }
        for (index, pair) in layers.windows(2).enumerate() {
            if pair[0].output_dim() != pair[1].input_dim() {
                return Err(ModelError::LayerDimensionMismatch {
                    index: index + 1,
                    expected: pair[1].input_dim(),
                    given: pair[0].output_dim(),
                });
            }
        }
        Ok(Self { layers, bounds })
    }

    /// Inputs to every layer followed by the network output.
    fn activations(&self, inputs: &ArrayView2<AdvFloat>) -> Vec<Array2<AdvFloat>> {
        let mut reprs = Vec::with_capacity(self.layers.len() + 1);
        reprs.push(inputs.to_owned());
        for layer in &self.layers {
            let next = layer.forward(&reprs[reprs.len() - 1].view());
            reprs.push(next);
        }
        reprs
    }
}

impl Classifier for DNN {
    fn bounds(&self) -> InputBounds {
        self.bounds
    }

    fn num_features(&self) -> usize {
        self.layers[0].input_dim()
    }

    fn num_classes(&self) -> usize {
        self.layers[self.layers.len() - 1].output_dim()
    }

    fn forward(&self, inputs: &ArrayView2<AdvFloat>) -> Array2<AdvFloat> {
        self.layers
            .iter()
            .fold(inputs.to_owned(), |x, layer| layer.forward(&x.view()))
    }

    fn backward(
        &self,
        inputs: &ArrayView2<AdvFloat>,
        grad_logits: &ArrayView2<AdvFloat>,
    ) -> Array2<AdvFloat> {
        let reprs = self.activations(inputs);
        self.layers
            .iter()
            .zip(reprs.iter())
            .rev()
            .fold(grad_logits.to_owned(), |grad, (layer, input)| {
                layer.backward(&input.view(), &grad.view())
            })
    }
}

impl fmt::Display for DNN {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let layers: Vec<String> = self.layers.iter().map(|x| format!("{}", x)).collect();
        write!(
            f,
            "Input {} {} => {}",
            self.num_features(),
            self.bounds,
            layers.join(" => ")
        )
    }
}
