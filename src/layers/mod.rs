//! Layer family for the network engine.
//!
//! Every layer kind is one variant of the closed [`Layer`] sum type, giving
//! the net a plain ordered collection to traverse with no trait objects
//! involved. All variants share one contract:
//!
//! - `forward(input, is_training)` overwrites the layer's own pre-allocated
//!   output volume from the input values. The previous output is invalidated
//!   by the next forward call.
//! - `backward(input)` consumes the output volume's gradient buffer (already
//!   filled by the downstream layer), zeroes the input volume's gradient
//!   buffer and accumulates into it; parametric layers additionally
//!   accumulate into their parameter gradients (never overwrite, since a
//!   batch runs several forward/backward passes before one update).
//! - Loss variants seed the whole backward pass through `backward_loss`,
//!   which takes a ground-truth target instead of an upstream gradient and
//!   returns the scalar loss.

pub mod activations;
pub mod conv;
pub mod dropout;
pub mod fully_conn;
pub mod input;
pub mod loss;
pub mod pool;

use std::error::Error;

use serde::{Deserialize, Serialize};

use crate::vol::{Vol, VolJson};

pub use activations::{EluLayer, ReluLayer, SigmoidLayer, TanhLayer};
pub use conv::ConvLayer;
pub use dropout::DropoutLayer;
pub use fully_conn::FullyConnLayer;
pub use input::InputLayer;
pub use loss::{LossTarget, RegressionLayer, SoftmaxLayer, SvmLayer};
pub use pool::PoolLayer;

/// One (parameters, gradients, decay multipliers) tuple exposed by a layer
/// for optimization. Bias groups conventionally carry zero decay multipliers
/// so that regularization never pulls biases toward zero.
pub struct ParamGroup<'a> {
    pub params: &'a mut [f32],
    pub grads: &'a mut [f32],
    pub l1_decay_mul: f32,
    pub l2_decay_mul: f32,
}

/// A network layer: one tagged variant per layer kind.
#[derive(Clone, Debug)]
pub enum Layer {
    Input(InputLayer),
    FullyConn(FullyConnLayer),
    Conv(ConvLayer),
    Pool(PoolLayer),
    Relu(ReluLayer),
    Sigmoid(SigmoidLayer),
    Tanh(TanhLayer),
    Elu(EluLayer),
    Dropout(DropoutLayer),
    Softmax(SoftmaxLayer),
    Svm(SvmLayer),
    Regression(RegressionLayer),
}

/// Dispatch a uniform operation to whichever variant is inside.
macro_rules! dispatch {
    ($layer:expr, $inner:ident => $body:expr) => {
        match $layer {
            Layer::Input($inner) => $body,
            Layer::FullyConn($inner) => $body,
            Layer::Conv($inner) => $body,
            Layer::Pool($inner) => $body,
            Layer::Relu($inner) => $body,
            Layer::Sigmoid($inner) => $body,
            Layer::Tanh($inner) => $body,
            Layer::Elu($inner) => $body,
            Layer::Dropout($inner) => $body,
            Layer::Softmax($inner) => $body,
            Layer::Svm($inner) => $body,
            Layer::Regression($inner) => $body,
        }
    };
}

impl Layer {
    /// Compute this layer's output from `input`, overwriting the owned
    /// output volume. Only dropout consults `is_training`.
    pub fn forward(&mut self, input: &Vol, is_training: bool) {
        dispatch!(self, l => l.forward(input, is_training))
    }

    /// Propagate the output gradient back into `input`'s gradient buffer
    /// (zeroing it first) and accumulate parameter gradients. No-op for the
    /// input layer and for loss layers, whose gradient is seeded by
    /// [`Layer::backward_loss`].
    pub fn backward(&mut self, input: &mut Vol) {
        dispatch!(self, l => l.backward(input))
    }

    /// Seed the backward pass at a loss layer: compute the gradient of the
    /// loss with respect to `input` from the ground-truth target `y` and
    /// return the scalar loss.
    ///
    /// Errors when called on a non-loss variant or with a target kind the
    /// loss does not accept.
    pub fn backward_loss(
        &mut self,
        input: &mut Vol,
        y: &LossTarget,
    ) -> Result<f32, Box<dyn Error>> {
        match self {
            Layer::Softmax(l) => l.backward_loss(input, y),
            Layer::Svm(l) => l.backward_loss(input, y),
            Layer::Regression(l) => l.backward_loss(input, y),
            other => Err(crate::utils::invalid_data(format!(
                "layer '{}' is not a loss layer",
                other.layer_type()
            ))),
        }
    }

    /// Parameter groups of this layer, in a stable order: one group per
    /// filter, then one for the biases. Non-parametric layers expose none.
    pub fn params_and_grads(&mut self) -> Vec<ParamGroup<'_>> {
        match self {
            Layer::FullyConn(l) => l.params_and_grads(),
            Layer::Conv(l) => l.params_and_grads(),
            _ => Vec::new(),
        }
    }

    /// Output width.
    pub fn out_sx(&self) -> usize {
        dispatch!(self, l => l.out_sx())
    }

    /// Output height.
    pub fn out_sy(&self) -> usize {
        dispatch!(self, l => l.out_sy())
    }

    /// Output depth.
    pub fn out_depth(&self) -> usize {
        dispatch!(self, l => l.out_depth())
    }

    /// The layer's owned output volume, as written by the last forward call.
    pub fn out_act(&self) -> &Vol {
        dispatch!(self, l => l.out_act())
    }

    /// Mutable access to the output volume; the backward pass of the
    /// downstream layer writes the output gradient through this.
    pub fn out_act_mut(&mut self) -> &mut Vol {
        dispatch!(self, l => l.out_act_mut())
    }

    /// The string tag identifying this layer kind in the persistence format.
    pub fn layer_type(&self) -> &'static str {
        match self {
            Layer::Input(_) => "input",
            Layer::FullyConn(_) => "fc",
            Layer::Conv(_) => "conv",
            Layer::Pool(_) => "pool",
            Layer::Relu(_) => "relu",
            Layer::Sigmoid(_) => "sigmoid",
            Layer::Tanh(_) => "tanh",
            Layer::Elu(_) => "elu",
            Layer::Dropout(_) => "dropout",
            Layer::Softmax(_) => "softmax",
            Layer::Svm(_) => "svm",
            Layer::Regression(_) => "regression",
        }
    }

    /// True for the softmax/svm/regression variants.
    pub fn is_loss(&self) -> bool {
        matches!(
            self,
            Layer::Softmax(_) | Layer::Svm(_) | Layer::Regression(_)
        )
    }

    /// Structural export of this layer.
    pub fn to_json(&self) -> LayerJson {
        dispatch!(self, l => l.to_json())
    }

    /// Reconstruct a layer from its structural record, dispatching on the
    /// record's `layer_type` tag.
    pub fn from_json(json: &LayerJson) -> Layer {
        match json {
            LayerJson::Input { .. } => Layer::Input(InputLayer::from_json(json)),
            LayerJson::Fc { .. } => Layer::FullyConn(FullyConnLayer::from_json(json)),
            LayerJson::Conv { .. } => Layer::Conv(ConvLayer::from_json(json)),
            LayerJson::Pool { .. } => Layer::Pool(PoolLayer::from_json(json)),
            LayerJson::Relu { .. } => Layer::Relu(ReluLayer::from_json(json)),
            LayerJson::Sigmoid { .. } => Layer::Sigmoid(SigmoidLayer::from_json(json)),
            LayerJson::Tanh { .. } => Layer::Tanh(TanhLayer::from_json(json)),
            LayerJson::Elu { .. } => Layer::Elu(EluLayer::from_json(json)),
            LayerJson::Dropout { .. } => Layer::Dropout(DropoutLayer::from_json(json)),
            LayerJson::Softmax { .. } => Layer::Softmax(SoftmaxLayer::from_json(json)),
            LayerJson::Svm { .. } => Layer::Svm(SvmLayer::from_json(json)),
            LayerJson::Regression { .. } => Layer::Regression(RegressionLayer::from_json(json)),
        }
    }
}

fn default_one() -> f32 {
    1.0
}

fn default_alpha() -> f32 {
    1.0
}

/// Structural record of a layer, tagged by `layer_type`.
///
/// Optional fields (`pad`, decay multipliers, `alpha`) default to fixed
/// constants when absent so that older exports keep importing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "layer_type", rename_all = "lowercase")]
pub enum LayerJson {
    Input {
        out_sx: usize,
        out_sy: usize,
        out_depth: usize,
    },
    Fc {
        out_depth: usize,
        out_sx: usize,
        out_sy: usize,
        num_inputs: usize,
        #[serde(default = "default_one")]
        l1_decay_mul: f32,
        #[serde(default = "default_one")]
        l2_decay_mul: f32,
        filters: Vec<VolJson>,
        biases: VolJson,
    },
    Conv {
        out_depth: usize,
        out_sx: usize,
        out_sy: usize,
        sx: usize,
        sy: usize,
        stride: usize,
        #[serde(default)]
        pad: usize,
        in_depth: usize,
        in_sx: usize,
        in_sy: usize,
        #[serde(default = "default_one")]
        l1_decay_mul: f32,
        #[serde(default = "default_one")]
        l2_decay_mul: f32,
        filters: Vec<VolJson>,
        biases: VolJson,
    },
    Pool {
        out_depth: usize,
        out_sx: usize,
        out_sy: usize,
        sx: usize,
        sy: usize,
        stride: usize,
        #[serde(default)]
        pad: usize,
        in_depth: usize,
        in_sx: usize,
        in_sy: usize,
    },
    Relu {
        out_sx: usize,
        out_sy: usize,
        out_depth: usize,
    },
    Sigmoid {
        out_sx: usize,
        out_sy: usize,
        out_depth: usize,
    },
    Tanh {
        out_sx: usize,
        out_sy: usize,
        out_depth: usize,
    },
    Elu {
        out_sx: usize,
        out_sy: usize,
        out_depth: usize,
        #[serde(default = "default_alpha")]
        alpha: f32,
    },
    Dropout {
        out_sx: usize,
        out_sy: usize,
        out_depth: usize,
        drop_prob: f32,
    },
    Softmax {
        out_depth: usize,
        out_sx: usize,
        out_sy: usize,
        num_inputs: usize,
    },
    Svm {
        out_depth: usize,
        out_sx: usize,
        out_sy: usize,
        num_inputs: usize,
    },
    Regression {
        out_depth: usize,
        out_sx: usize,
        out_sy: usize,
        num_inputs: usize,
    },
}
