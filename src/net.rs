//! The network: a strict linear pipeline of layers.

use std::error::Error;

use serde::{Deserialize, Serialize};

use crate::architecture::{desugar, LayerSpec};
use crate::layers::{
    ConvLayer, DropoutLayer, EluLayer, FullyConnLayer, InputLayer, Layer, LayerJson, LossTarget,
    ParamGroup, PoolLayer, RegressionLayer, ReluLayer, SigmoidLayer, SoftmaxLayer, SvmLayer,
    TanhLayer,
};
use crate::utils::{invalid_data, SimpleRng};
use crate::vol::Vol;

/// An ordered sequence of layers: the first is always the input layer, the
/// last is always a loss layer, and the order defines both the forward and
/// the backward traversal. There is no branching or merging.
pub struct Net {
    layers: Vec<Layer>,
}

/// Structural record of a whole network.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetJson {
    pub layers: Vec<LayerJson>,
}

impl Net {
    /// Materialize a network from a layer-specification list.
    ///
    /// The list is desugared first (see [`crate::architecture::desugar`]),
    /// then each spec is instantiated in order, wiring every non-first
    /// layer's input shape verbatim from the previous layer's output shape.
    ///
    /// # Errors
    ///
    /// Fails when fewer than two specs are given, when the first spec is not
    /// the input type, or when a spec carries an unrecognized `layer_type`.
    pub fn make_layers(specs: &[LayerSpec], rng: &mut SimpleRng) -> Result<Net, Box<dyn Error>> {
        if specs.len() < 2 {
            return Err(invalid_data(
                "at least one input layer and one loss layer are required",
            ));
        }
        if specs[0].layer_type != "input" {
            return Err(invalid_data(
                "first layer must be the input layer, to declare the size of inputs",
            ));
        }

        let specs = desugar(specs);
        let mut layers: Vec<Layer> = Vec::with_capacity(specs.len());

        for spec in &specs {
            // sole wiring mechanism: previous layer's output shape
            let (in_sx, in_sy, in_depth) = match layers.last() {
                Some(prev) => (prev.out_sx(), prev.out_sy(), prev.out_depth()),
                None => (0, 0, 0),
            };

            let layer = match spec.layer_type.as_str() {
                "input" => Layer::Input(InputLayer::new(
                    spec.out_sx.unwrap_or(1),
                    spec.out_sy.unwrap_or(1),
                    spec.out_depth.ok_or_else(|| {
                        invalid_data("input layer requires 'out_depth'")
                    })?,
                )),
                "fc" => Layer::FullyConn(FullyConnLayer::new(
                    spec.num_neurons
                        .ok_or_else(|| invalid_data("fc layer requires 'num_neurons'"))?,
                    in_sx,
                    in_sy,
                    in_depth,
                    spec.bias_pref.unwrap_or(0.0),
                    spec.l1_decay_mul.unwrap_or(0.0),
                    spec.l2_decay_mul.unwrap_or(1.0),
                    rng,
                )),
                "conv" => {
                    let sx = spec
                        .sx
                        .ok_or_else(|| invalid_data("conv layer requires 'sx'"))?;
                    Layer::Conv(ConvLayer::new(
                        spec.filters
                            .ok_or_else(|| invalid_data("conv layer requires 'filters'"))?,
                        sx,
                        spec.sy.unwrap_or(sx),
                        in_sx,
                        in_sy,
                        in_depth,
                        spec.stride.unwrap_or(1),
                        spec.pad.unwrap_or(0),
                        spec.bias_pref.unwrap_or(0.0),
                        spec.l1_decay_mul.unwrap_or(0.0),
                        spec.l2_decay_mul.unwrap_or(1.0),
                        rng,
                    ))
                }
                "pool" => {
                    let sx = spec
                        .sx
                        .ok_or_else(|| invalid_data("pool layer requires 'sx'"))?;
                    Layer::Pool(PoolLayer::new(
                        sx,
                        spec.sy.unwrap_or(sx),
                        in_sx,
                        in_sy,
                        in_depth,
                        spec.stride.unwrap_or(2),
                        spec.pad.unwrap_or(0),
                    ))
                }
                "relu" => Layer::Relu(ReluLayer::new(in_sx, in_sy, in_depth)),
                "sigmoid" => Layer::Sigmoid(SigmoidLayer::new(in_sx, in_sy, in_depth)),
                "tanh" => Layer::Tanh(TanhLayer::new(in_sx, in_sy, in_depth)),
                "elu" => Layer::Elu(EluLayer::new(
                    in_sx,
                    in_sy,
                    in_depth,
                    spec.alpha.unwrap_or(1.0),
                )),
                "dropout" => Layer::Dropout(DropoutLayer::new(
                    in_sx,
                    in_sy,
                    in_depth,
                    spec.drop_prob.unwrap_or(0.5),
                    rng,
                )),
                "softmax" => Layer::Softmax(SoftmaxLayer::new(in_sx, in_sy, in_depth)),
                "svm" => Layer::Svm(SvmLayer::new(in_sx, in_sy, in_depth)),
                "regression" => Layer::Regression(RegressionLayer::new(in_sx, in_sy, in_depth)),
                other => {
                    return Err(invalid_data(format!("unrecognized layer type: {}", other)))
                }
            };
            layers.push(layer);
        }

        Ok(Net { layers })
    }

    /// The materialized layer sequence.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Forward the input through every layer in order and return the final
    /// layer's output.
    ///
    /// The trainer passes `is_training = true`; prediction callers pass
    /// false so dropout switches to its deterministic scaling mode. The
    /// returned volume is owned by the last layer and is invalidated by the
    /// next forward call.
    pub fn forward(&mut self, x: &Vol, is_training: bool) -> &Vol {
        self.layers[0].forward(x, is_training);
        for i in 1..self.layers.len() {
            let (head, tail) = self.layers.split_at_mut(i);
            let input = head[i - 1].out_act();
            tail[0].forward(input, is_training);
        }
        self.layers[self.layers.len() - 1].out_act()
    }

    /// Run forward in prediction mode and invoke only the final loss
    /// layer's backward, returning its scalar loss without propagating
    /// gradients through earlier layers.
    pub fn get_cost_loss(&mut self, x: &Vol, y: &LossTarget) -> Result<f32, Box<dyn Error>> {
        self.forward(x, false);
        let n = self.layers.len();
        let (head, tail) = self.layers.split_at_mut(n - 1);
        let input = head[n - 2].out_act_mut();
        tail[0].backward_loss(input, y)
    }

    /// Backprop: seed the gradient at the final loss layer from the target,
    /// then run every preceding layer's backward in strict reverse order.
    /// Returns the loss layer's scalar.
    pub fn backward(&mut self, y: &LossTarget) -> Result<f32, Box<dyn Error>> {
        let n = self.layers.len();
        let (head, tail) = self.layers.split_at_mut(n - 1);
        let input = head[n - 2].out_act_mut();
        let loss = tail[0].backward_loss(input, y)?;

        // first layer assumed input; its backward is a no-op
        for i in (1..n - 1).rev() {
            let (head, tail) = self.layers.split_at_mut(i);
            tail[0].backward(head[i - 1].out_act_mut());
        }
        Ok(loss)
    }

    /// Every layer's parameter groups concatenated in layer order. This
    /// concatenation order is the stable identity the trainer's per-group
    /// accumulators are indexed by.
    pub fn params_and_grads(&mut self) -> Vec<ParamGroup<'_>> {
        let mut response = Vec::new();
        for layer in &mut self.layers {
            response.extend(layer.params_and_grads());
        }
        response
    }

    /// Index of the class with the highest output probability (first index
    /// wins ties).
    ///
    /// # Errors
    ///
    /// Fails unless the final layer is the softmax variant.
    pub fn get_prediction(&self) -> Result<usize, Box<dyn Error>> {
        let last = self.layers.last().ok_or_else(|| invalid_data("empty net"))?;
        if !matches!(last, Layer::Softmax(_)) {
            return Err(invalid_data(
                "get_prediction assumes softmax as the last layer of the net",
            ));
        }
        let p = &last.out_act().w;
        let mut maxv = p[0];
        let mut maxi = 0;
        for (i, &v) in p.iter().enumerate().skip(1) {
            if v > maxv {
                maxv = v;
                maxi = i;
            }
        }
        Ok(maxi)
    }

    /// Structural export of the whole network.
    pub fn to_json(&self) -> NetJson {
        NetJson {
            layers: self.layers.iter().map(Layer::to_json).collect(),
        }
    }

    /// Reconstruct a network from a structural record, dispatching each
    /// layer on its `layer_type` tag.
    pub fn from_json(json: &NetJson) -> Net {
        Net {
            layers: json.layers.iter().map(Layer::from_json).collect(),
        }
    }
}
