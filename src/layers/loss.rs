//! Loss layers: softmax classification, SVM structured hinge, and L2
//! regression.
//!
//! Loss layers sit at the end of the pipeline. Their forward pass carries
//! the raw scores through (softmax additionally normalizes them into
//! probabilities), and their backward pass is seeded by a ground-truth
//! [`LossTarget`] rather than a downstream gradient, returning the scalar
//! loss for the example.

use std::error::Error;

use crate::layers::LayerJson;
use crate::utils::invalid_data;
use crate::vol::Vol;

/// Ground truth handed to a loss layer's backward pass.
///
/// Classification losses take `Class`; regression accepts a full target
/// vector, a single scalar (one-dimensional regression on dimension 0), or a
/// sparse `{dim, val}` pair that touches only the addressed dimension.
#[derive(Clone, Debug, PartialEq)]
pub enum LossTarget {
    Class(usize),
    Vector(Vec<f32>),
    Scalar(f32),
    Dim { dim: usize, val: f32 },
}

/// Softmax classifier over `num_inputs` discrete classes.
///
/// Forward computes a numerically stable softmax (the per-call maximum is
/// subtracted before exponentiating, so very large scores cannot overflow)
/// and caches the probability vector for backward.
#[derive(Clone, Debug)]
pub struct SoftmaxLayer {
    num_inputs: usize,
    out_depth: usize,
    /// Probabilities cached by the last forward call.
    es: Vec<f32>,
    out_act: Vol,
}

impl SoftmaxLayer {
    pub fn new(in_sx: usize, in_sy: usize, in_depth: usize) -> Self {
        let num_inputs = in_sx * in_sy * in_depth;
        Self {
            num_inputs,
            out_depth: num_inputs,
            es: vec![0.0; num_inputs],
            out_act: Vol::new(1, 1, num_inputs, 0.0),
        }
    }

    pub fn forward(&mut self, input: &Vol, _is_training: bool) {
        // max-subtraction trick: exp never sees a positive argument
        let amax = input.w.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let mut esum = 0.0;
        for (e, &a) in self.es.iter_mut().zip(input.w.iter()) {
            *e = (a - amax).exp();
            esum += *e;
        }
        for (out, e) in self.out_act.w.iter_mut().zip(self.es.iter_mut()) {
            *e /= esum;
            *out = *e;
        }
    }

    /// No upstream gradient at a loss layer; seeding happens in
    /// [`SoftmaxLayer::backward_loss`].
    pub fn backward(&mut self, _input: &mut Vol) {}

    pub fn backward_loss(
        &mut self,
        input: &mut Vol,
        y: &LossTarget,
    ) -> Result<f32, Box<dyn Error>> {
        let y = match y {
            LossTarget::Class(i) => *i,
            other => {
                return Err(invalid_data(format!(
                    "softmax loss expects a class index, got {:?}",
                    other
                )))
            }
        };
        if y >= self.out_depth {
            return Err(invalid_data(format!(
                "class index {} out of range for {} classes",
                y, self.out_depth
            )));
        }

        input.zero_grads();
        for i in 0..self.out_depth {
            let indicator = if i == y { 1.0 } else { 0.0 };
            input.dw[i] = self.es[i] - indicator;
        }

        // negative log likelihood of the true class
        Ok(-self.es[y].ln())
    }

    pub fn out_sx(&self) -> usize {
        1
    }

    pub fn out_sy(&self) -> usize {
        1
    }

    pub fn out_depth(&self) -> usize {
        self.out_depth
    }

    pub fn out_act(&self) -> &Vol {
        &self.out_act
    }

    pub fn out_act_mut(&mut self) -> &mut Vol {
        &mut self.out_act
    }

    pub fn to_json(&self) -> LayerJson {
        LayerJson::Softmax {
            out_depth: self.out_depth,
            out_sx: 1,
            out_sy: 1,
            num_inputs: self.num_inputs,
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Softmax { num_inputs, .. } => SoftmaxLayer::new(1, 1, *num_inputs),
            _ => panic!("expected a softmax layer record"),
        }
    }
}

/// Multi-class SVM with a structured margin-1 hinge loss.
///
/// The ground-truth score must beat every other class's score by at least
/// the margin; every violating class contributes its positive margin excess
/// to the loss and a +/-1 pair to the gradient. A score exactly tied with
/// the truth violates the margin (`ydiff == margin > 0`) and counts.
#[derive(Clone, Debug)]
pub struct SvmLayer {
    num_inputs: usize,
    out_depth: usize,
    out_act: Vol,
}

impl SvmLayer {
    pub fn new(in_sx: usize, in_sy: usize, in_depth: usize) -> Self {
        let num_inputs = in_sx * in_sy * in_depth;
        Self {
            num_inputs,
            out_depth: num_inputs,
            out_act: Vol::new(1, 1, num_inputs, 0.0),
        }
    }

    pub fn forward(&mut self, input: &Vol, _is_training: bool) {
        // raw scores pass through
        self.out_act.w.copy_from_slice(&input.w);
    }

    pub fn backward(&mut self, _input: &mut Vol) {}

    pub fn backward_loss(
        &mut self,
        input: &mut Vol,
        y: &LossTarget,
    ) -> Result<f32, Box<dyn Error>> {
        let y = match y {
            LossTarget::Class(i) => *i,
            other => {
                return Err(invalid_data(format!(
                    "svm loss expects a class index, got {:?}",
                    other
                )))
            }
        };
        if y >= self.out_depth {
            return Err(invalid_data(format!(
                "class index {} out of range for {} classes",
                y, self.out_depth
            )));
        }

        input.zero_grads();
        let yscore = input.w[y];
        let margin = 1.0;
        let mut loss = 0.0;
        for i in 0..self.out_depth {
            if i == y {
                continue;
            }
            let ydiff = -yscore + input.w[i] + margin;
            if ydiff > 0.0 {
                // violating dimension, apply loss
                input.dw[i] += 1.0;
                input.dw[y] -= 1.0;
                loss += ydiff;
            }
        }
        Ok(loss)
    }

    pub fn out_sx(&self) -> usize {
        1
    }

    pub fn out_sy(&self) -> usize {
        1
    }

    pub fn out_depth(&self) -> usize {
        self.out_depth
    }

    pub fn out_act(&self) -> &Vol {
        &self.out_act
    }

    pub fn out_act_mut(&mut self) -> &mut Vol {
        &mut self.out_act
    }

    pub fn to_json(&self) -> LayerJson {
        LayerJson::Svm {
            out_depth: self.out_depth,
            out_sx: 1,
            out_sy: 1,
            num_inputs: self.num_inputs,
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Svm { num_inputs, .. } => SvmLayer::new(1, 1, *num_inputs),
            _ => panic!("expected an svm layer record"),
        }
    }
}

/// L2 regression cost: penalizes `0.5 * sum_i (x_i - y_i)^2` along the
/// addressed dimensions, leaving other gradient entries at zero.
#[derive(Clone, Debug)]
pub struct RegressionLayer {
    num_inputs: usize,
    out_depth: usize,
    out_act: Vol,
}

impl RegressionLayer {
    pub fn new(in_sx: usize, in_sy: usize, in_depth: usize) -> Self {
        let num_inputs = in_sx * in_sy * in_depth;
        Self {
            num_inputs,
            out_depth: num_inputs,
            out_act: Vol::new(1, 1, num_inputs, 0.0),
        }
    }

    pub fn forward(&mut self, input: &Vol, _is_training: bool) {
        self.out_act.w.copy_from_slice(&input.w);
    }

    pub fn backward(&mut self, _input: &mut Vol) {}

    pub fn backward_loss(
        &mut self,
        input: &mut Vol,
        y: &LossTarget,
    ) -> Result<f32, Box<dyn Error>> {
        input.zero_grads();
        let mut loss = 0.0;
        match y {
            LossTarget::Vector(ys) => {
                if ys.len() != self.out_depth {
                    return Err(invalid_data(format!(
                        "regression target has {} dimensions, layer has {}",
                        ys.len(),
                        self.out_depth
                    )));
                }
                for i in 0..self.out_depth {
                    let dy = input.w[i] - ys[i];
                    input.dw[i] = dy;
                    loss += 0.5 * dy * dy;
                }
            }
            LossTarget::Scalar(yv) => {
                // one-dimensional regression on dimension 0
                let dy = input.w[0] - yv;
                input.dw[0] = dy;
                loss += 0.5 * dy * dy;
            }
            LossTarget::Dim { dim, val } => {
                if *dim >= self.out_depth {
                    return Err(invalid_data(format!(
                        "regression dimension {} out of range for {} outputs",
                        dim, self.out_depth
                    )));
                }
                let dy = input.w[*dim] - val;
                input.dw[*dim] = dy;
                loss += 0.5 * dy * dy;
            }
            LossTarget::Class(_) => {
                return Err(invalid_data(
                    "regression loss expects a vector, scalar or {dim, val} target",
                ))
            }
        }
        Ok(loss)
    }

    pub fn out_sx(&self) -> usize {
        1
    }

    pub fn out_sy(&self) -> usize {
        1
    }

    pub fn out_depth(&self) -> usize {
        self.out_depth
    }

    pub fn out_act(&self) -> &Vol {
        &self.out_act
    }

    pub fn out_act_mut(&mut self) -> &mut Vol {
        &mut self.out_act
    }

    pub fn to_json(&self) -> LayerJson {
        LayerJson::Regression {
            out_depth: self.out_depth,
            out_sx: 1,
            out_sy: 1,
            num_inputs: self.num_inputs,
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Regression { num_inputs, .. } => RegressionLayer::new(1, 1, *num_inputs),
            _ => panic!("expected a regression layer record"),
        }
    }
}
