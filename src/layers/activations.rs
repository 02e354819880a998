//! Elementwise nonlinearity layers: ReLU, Sigmoid, Tanh and ELU.
//!
//! All four apply a scalar function independently to every element and keep
//! the input shape. Their derivatives are expressed in terms of the *output*
//! value, so the backward pass needs nothing but the output volume and the
//! incoming gradient.

use crate::layers::LayerJson;
use crate::vol::Vol;

/// x -> max(0, x). Derivative: 1 where output > 0, else 0.
#[derive(Clone, Debug)]
pub struct ReluLayer {
    out_sx: usize,
    out_sy: usize,
    out_depth: usize,
    out_act: Vol,
}

/// x -> 1/(1+e^-x). Derivative: out * (1 - out).
#[derive(Clone, Debug)]
pub struct SigmoidLayer {
    out_sx: usize,
    out_sy: usize,
    out_depth: usize,
    out_act: Vol,
}

/// x -> tanh(x). Derivative: 1 - out^2.
#[derive(Clone, Debug)]
pub struct TanhLayer {
    out_sx: usize,
    out_sy: usize,
    out_depth: usize,
    out_act: Vol,
}

/// x -> x for x > 0, alpha*(e^x - 1) otherwise.
/// Derivative: 1 where output > 0, else out + alpha.
#[derive(Clone, Debug)]
pub struct EluLayer {
    alpha: f32,
    out_sx: usize,
    out_sy: usize,
    out_depth: usize,
    out_act: Vol,
}

macro_rules! activation_common {
    ($name:ident) => {
        impl $name {
            pub fn out_sx(&self) -> usize {
                self.out_sx
            }

            pub fn out_sy(&self) -> usize {
                self.out_sy
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
        }
    };
}

activation_common!(ReluLayer);
activation_common!(SigmoidLayer);
activation_common!(TanhLayer);
activation_common!(EluLayer);

impl ReluLayer {
    pub fn new(in_sx: usize, in_sy: usize, in_depth: usize) -> Self {
        Self {
            out_sx: in_sx,
            out_sy: in_sy,
            out_depth: in_depth,
            out_act: Vol::new(in_sx, in_sy, in_depth, 0.0),
        }
    }

    pub fn forward(&mut self, input: &Vol, _is_training: bool) {
        for (out, &w) in self.out_act.w.iter_mut().zip(input.w.iter()) {
            *out = if w < 0.0 { 0.0 } else { w };
        }
    }

    pub fn backward(&mut self, input: &mut Vol) {
        input.zero_grads();
        for i in 0..input.dw.len() {
            if self.out_act.w[i] > 0.0 {
                input.dw[i] = self.out_act.dw[i];
            }
        }
    }

    pub fn to_json(&self) -> LayerJson {
        LayerJson::Relu {
            out_sx: self.out_sx,
            out_sy: self.out_sy,
            out_depth: self.out_depth,
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Relu {
                out_sx,
                out_sy,
                out_depth,
            } => ReluLayer::new(*out_sx, *out_sy, *out_depth),
            _ => panic!("expected a relu layer record"),
        }
    }
}

impl SigmoidLayer {
    pub fn new(in_sx: usize, in_sy: usize, in_depth: usize) -> Self {
        Self {
            out_sx: in_sx,
            out_sy: in_sy,
            out_depth: in_depth,
            out_act: Vol::new(in_sx, in_sy, in_depth, 0.0),
        }
    }

    pub fn forward(&mut self, input: &Vol, _is_training: bool) {
        for (out, &w) in self.out_act.w.iter_mut().zip(input.w.iter()) {
            *out = 1.0 / (1.0 + (-w).exp());
        }
    }

    pub fn backward(&mut self, input: &mut Vol) {
        input.zero_grads();
        for i in 0..input.dw.len() {
            let out = self.out_act.w[i];
            input.dw[i] = out * (1.0 - out) * self.out_act.dw[i];
        }
    }

    pub fn to_json(&self) -> LayerJson {
        LayerJson::Sigmoid {
            out_sx: self.out_sx,
            out_sy: self.out_sy,
            out_depth: self.out_depth,
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Sigmoid {
                out_sx,
                out_sy,
                out_depth,
            } => SigmoidLayer::new(*out_sx, *out_sy, *out_depth),
            _ => panic!("expected a sigmoid layer record"),
        }
    }
}

impl TanhLayer {
    pub fn new(in_sx: usize, in_sy: usize, in_depth: usize) -> Self {
        Self {
            out_sx: in_sx,
            out_sy: in_sy,
            out_depth: in_depth,
            out_act: Vol::new(in_sx, in_sy, in_depth, 0.0),
        }
    }

    pub fn forward(&mut self, input: &Vol, _is_training: bool) {
        for (out, &w) in self.out_act.w.iter_mut().zip(input.w.iter()) {
            *out = w.tanh();
        }
    }

    pub fn backward(&mut self, input: &mut Vol) {
        input.zero_grads();
        for i in 0..input.dw.len() {
            let out = self.out_act.w[i];
            input.dw[i] = (1.0 - out * out) * self.out_act.dw[i];
        }
    }

    pub fn to_json(&self) -> LayerJson {
        LayerJson::Tanh {
            out_sx: self.out_sx,
            out_sy: self.out_sy,
            out_depth: self.out_depth,
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Tanh {
                out_sx,
                out_sy,
                out_depth,
            } => TanhLayer::new(*out_sx, *out_sy, *out_depth),
            _ => panic!("expected a tanh layer record"),
        }
    }
}

impl EluLayer {
    pub fn new(in_sx: usize, in_sy: usize, in_depth: usize, alpha: f32) -> Self {
        Self {
            alpha,
            out_sx: in_sx,
            out_sy: in_sy,
            out_depth: in_depth,
            out_act: Vol::new(in_sx, in_sy, in_depth, 0.0),
        }
    }

    pub fn forward(&mut self, input: &Vol, _is_training: bool) {
        for (out, &w) in self.out_act.w.iter_mut().zip(input.w.iter()) {
            *out = if w > 0.0 { w } else { self.alpha * (w.exp() - 1.0) };
        }
    }

    pub fn backward(&mut self, input: &mut Vol) {
        input.zero_grads();
        for i in 0..input.dw.len() {
            let out = self.out_act.w[i];
            let deriv = if out > 0.0 { 1.0 } else { out + self.alpha };
            input.dw[i] = deriv * self.out_act.dw[i];
        }
    }

    pub fn to_json(&self) -> LayerJson {
        LayerJson::Elu {
            out_sx: self.out_sx,
            out_sy: self.out_sy,
            out_depth: self.out_depth,
            alpha: self.alpha,
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Elu {
                out_sx,
                out_sy,
                out_depth,
                alpha,
            } => EluLayer::new(*out_sx, *out_sy, *out_depth, *alpha),
            _ => panic!("expected an elu layer record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_thresholds_at_zero() {
        let mut layer = ReluLayer::new(1, 1, 4);
        let x = Vol::from_slice(&[-1.0, 0.0, 0.5, 3.0]);
        layer.forward(&x, false);
        assert_eq!(layer.out_act().w, vec![0.0, 0.0, 0.5, 3.0]);
    }

    #[test]
    fn test_relu_backward_gates_gradient() {
        let mut layer = ReluLayer::new(1, 1, 3);
        let mut x = Vol::from_slice(&[-1.0, 2.0, 3.0]);
        layer.forward(&x, false);
        layer.out_act_mut().dw.copy_from_slice(&[1.0, 1.0, 2.0]);
        layer.backward(&mut x);
        assert_eq!(x.dw, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_sigmoid_midpoint_and_derivative() {
        let mut layer = SigmoidLayer::new(1, 1, 1);
        let mut x = Vol::from_slice(&[0.0]);
        layer.forward(&x, false);
        assert!((layer.out_act().w[0] - 0.5).abs() < 1e-6);

        layer.out_act_mut().dw[0] = 1.0;
        layer.backward(&mut x);
        // derivative at 0.5 is 0.25
        assert!((x.dw[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_tanh_derivative_uses_output() {
        let mut layer = TanhLayer::new(1, 1, 1);
        let mut x = Vol::from_slice(&[0.5]);
        layer.forward(&x, false);
        let out = layer.out_act().w[0];

        layer.out_act_mut().dw[0] = 2.0;
        layer.backward(&mut x);
        assert!((x.dw[0] - 2.0 * (1.0 - out * out)).abs() < 1e-6);
    }

    #[test]
    fn test_elu_negative_branch() {
        let mut layer = EluLayer::new(1, 1, 2, 1.0);
        let mut x = Vol::from_slice(&[-2.0, 2.0]);
        layer.forward(&x, false);
        let out_neg = layer.out_act().w[0];
        assert!((out_neg - ((-2.0f32).exp() - 1.0)).abs() < 1e-6);
        assert_eq!(layer.out_act().w[1], 2.0);

        layer.out_act_mut().dw.copy_from_slice(&[1.0, 1.0]);
        layer.backward(&mut x);
        // negative side: derivative is out + alpha = e^x
        assert!((x.dw[0] - (out_neg + 1.0)).abs() < 1e-6);
        assert_eq!(x.dw[1], 1.0);
    }
}
