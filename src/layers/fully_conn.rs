//! Fully connected layer.

use crate::layers::{LayerJson, ParamGroup};
use crate::utils::SimpleRng;
use crate::vol::Vol;

/// Fully connected layer: every output neuron sees the whole input volume.
///
/// Each of the `out_depth` neurons owns its own weight volume of length
/// `num_inputs` (the flattened input), plus one shared bias volume. The
/// output is `out[i] = bias[i] + sum_d input[d] * w_i[d]`.
///
/// Parameter groups are exported one per neuron plus one for the biases; the
/// bias group carries zero decay multipliers.
#[derive(Clone, Debug)]
pub struct FullyConnLayer {
    out_depth: usize,
    num_inputs: usize,
    l1_decay_mul: f32,
    l2_decay_mul: f32,
    filters: Vec<Vol>,
    biases: Vol,
    out_act: Vol,
}

impl FullyConnLayer {
    /// Create a fully connected layer with `num_neurons` outputs for inputs
    /// of shape `(in_sx, in_sy, in_depth)`.
    ///
    /// Weights are fan-in normalized Gaussian draws; biases start at
    /// `bias_pref` (a small positive value helps ReLU units come alive
    /// early).
    pub fn new(
        num_neurons: usize,
        in_sx: usize,
        in_sy: usize,
        in_depth: usize,
        bias_pref: f32,
        l1_decay_mul: f32,
        l2_decay_mul: f32,
        rng: &mut SimpleRng,
    ) -> Self {
        let num_inputs = in_sx * in_sy * in_depth;
        let filters = (0..num_neurons)
            .map(|_| Vol::random(1, 1, num_inputs, rng))
            .collect();
        Self {
            out_depth: num_neurons,
            num_inputs,
            l1_decay_mul,
            l2_decay_mul,
            filters,
            biases: Vol::new(1, 1, num_neurons, bias_pref),
            out_act: Vol::new(1, 1, num_neurons, 0.0),
        }
    }

    pub fn forward(&mut self, input: &Vol, _is_training: bool) {
        assert_eq!(
            input.len(),
            self.num_inputs,
            "fc layer expects {} inputs, got {}",
            self.num_inputs,
            input.len()
        );
        for i in 0..self.out_depth {
            let wi = &self.filters[i].w;
            let mut a = self.biases.w[i];
            for d in 0..self.num_inputs {
                a += input.w[d] * wi[d];
            }
            self.out_act.w[i] = a;
        }
    }

    pub fn backward(&mut self, input: &mut Vol) {
        input.zero_grads();
        for i in 0..self.out_depth {
            let fi = &mut self.filters[i];
            let chain_grad = self.out_act.dw[i];
            for d in 0..self.num_inputs {
                input.dw[d] += fi.w[d] * chain_grad;
                fi.dw[d] += input.w[d] * chain_grad;
            }
            self.biases.dw[i] += chain_grad;
        }
    }

    pub fn params_and_grads(&mut self) -> Vec<ParamGroup<'_>> {
        let l1 = self.l1_decay_mul;
        let l2 = self.l2_decay_mul;
        let mut groups: Vec<ParamGroup<'_>> = self
            .filters
            .iter_mut()
            .map(|f| ParamGroup {
                params: &mut f.w,
                grads: &mut f.dw,
                l1_decay_mul: l1,
                l2_decay_mul: l2,
            })
            .collect();
        groups.push(ParamGroup {
            params: &mut self.biases.w,
            grads: &mut self.biases.dw,
            l1_decay_mul: 0.0,
            l2_decay_mul: 0.0,
        });
        groups
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
        LayerJson::Fc {
            out_depth: self.out_depth,
            out_sx: 1,
            out_sy: 1,
            num_inputs: self.num_inputs,
            l1_decay_mul: self.l1_decay_mul,
            l2_decay_mul: self.l2_decay_mul,
            filters: self.filters.iter().map(Vol::to_json).collect(),
            biases: self.biases.to_json(),
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Fc {
                out_depth,
                num_inputs,
                l1_decay_mul,
                l2_decay_mul,
                filters,
                biases,
                ..
            } => Self {
                out_depth: *out_depth,
                num_inputs: *num_inputs,
                l1_decay_mul: *l1_decay_mul,
                l2_decay_mul: *l2_decay_mul,
                filters: filters.iter().map(Vol::from_json).collect(),
                biases: Vol::from_json(biases),
                out_act: Vol::new(1, 1, *out_depth, 0.0),
            },
            _ => panic!("expected an fc layer record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_layer() -> FullyConnLayer {
        // 2 neurons over 3 inputs with hand-set weights
        let mut rng = SimpleRng::new(1);
        let mut layer = FullyConnLayer::new(2, 1, 1, 3, 0.0, 0.0, 1.0, &mut rng);
        layer.filters[0].w.copy_from_slice(&[1.0, 0.0, -1.0]);
        layer.filters[1].w.copy_from_slice(&[0.5, 0.5, 0.5]);
        layer.biases.w.copy_from_slice(&[0.0, 1.0]);
        layer
    }

    #[test]
    fn test_forward_dot_products() {
        let mut layer = unit_layer();
        let x = Vol::from_slice(&[2.0, 3.0, 4.0]);
        layer.forward(&x, false);
        assert_eq!(layer.out_act().w[0], 2.0 - 4.0);
        assert_eq!(layer.out_act().w[1], 0.5 * (2.0 + 3.0 + 4.0) + 1.0);
    }

    #[test]
    fn test_backward_distributes_gradient() {
        let mut layer = unit_layer();
        let mut x = Vol::from_slice(&[2.0, 3.0, 4.0]);
        layer.forward(&x, false);

        layer.out_act_mut().dw.copy_from_slice(&[1.0, 0.0]);
        layer.backward(&mut x);

        // input gradient is neuron 0's weights
        assert_eq!(x.dw, vec![1.0, 0.0, -1.0]);
        // weight gradient is the input values
        assert_eq!(layer.filters[0].dw, vec![2.0, 3.0, 4.0]);
        assert_eq!(layer.filters[1].dw, vec![0.0, 0.0, 0.0]);
        assert_eq!(layer.biases.dw, vec![1.0, 0.0]);
    }

    #[test]
    fn test_param_grads_accumulate_across_passes() {
        let mut layer = unit_layer();
        let mut x = Vol::from_slice(&[1.0, 1.0, 1.0]);
        for _ in 0..2 {
            layer.forward(&x, true);
            layer.out_act_mut().dw.copy_from_slice(&[1.0, 1.0]);
            layer.backward(&mut x);
        }
        // two passes, gradients summed, never overwritten
        assert_eq!(layer.biases.dw, vec![2.0, 2.0]);
        assert_eq!(layer.filters[0].dw, vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_param_group_layout() {
        let mut layer = unit_layer();
        let groups = layer.params_and_grads();
        assert_eq!(groups.len(), 3); // 2 neurons + biases
        assert_eq!(groups[0].params.len(), 3);
        assert_eq!(groups[2].params.len(), 2);
        assert_eq!(groups[2].l1_decay_mul, 0.0);
        assert_eq!(groups[2].l2_decay_mul, 0.0);
    }
}
