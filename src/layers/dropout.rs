//! Dropout layer for regularization.

use crate::layers::LayerJson;
use crate::utils::SimpleRng;
use crate::vol::Vol;

/// Randomly zeroes elements during training to prevent co-adaptation.
///
/// In training mode each element is dropped independently with probability
/// `drop_prob`, and the per-element decisions are recorded so that the
/// backward pass reproduces exactly the same masking. In prediction mode no
/// mask is drawn; every element is instead scaled by `1 - drop_prob` so that
/// the expected activation matches what downstream layers saw in training.
///
/// The layer owns its own RNG stream, seeded from the construction-time
/// source, so a seeded net produces identical masks run to run.
#[derive(Clone, Debug)]
pub struct DropoutLayer {
    out_sx: usize,
    out_sy: usize,
    out_depth: usize,
    drop_prob: f32,
    dropped: Vec<bool>,
    rng: SimpleRng,
    out_act: Vol,
}

impl DropoutLayer {
    /// Create a dropout layer over inputs of shape `(in_sx, in_sy,
    /// in_depth)` dropping each element with probability `drop_prob`.
    pub fn new(
        in_sx: usize,
        in_sy: usize,
        in_depth: usize,
        drop_prob: f32,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(
            (0.0..1.0).contains(&drop_prob),
            "drop_prob must be in range [0.0, 1.0)"
        );
        let n = in_sx * in_sy * in_depth;
        // derive an independent stream so sibling dropout layers do not
        // replay the same mask sequence
        let seed = ((rng.next_u32() as u64) << 32) | rng.next_u32() as u64;
        Self {
            out_sx: in_sx,
            out_sy: in_sy,
            out_depth: in_depth,
            drop_prob,
            dropped: vec![false; n],
            rng: SimpleRng::new(seed),
            out_act: Vol::new(in_sx, in_sy, in_depth, 0.0),
        }
    }

    pub fn drop_prob(&self) -> f32 {
        self.drop_prob
    }

    pub fn forward(&mut self, input: &Vol, is_training: bool) {
        if is_training {
            for i in 0..input.w.len() {
                if self.rng.next_f32() < self.drop_prob {
                    self.out_act.w[i] = 0.0;
                    self.dropped[i] = true;
                } else {
                    self.out_act.w[i] = input.w[i];
                    self.dropped[i] = false;
                }
            }
        } else {
            // inverted scaling: match the expected value seen in training
            let scale = 1.0 - self.drop_prob;
            for (out, &w) in self.out_act.w.iter_mut().zip(input.w.iter()) {
                *out = w * scale;
            }
        }
    }

    pub fn backward(&mut self, input: &mut Vol) {
        input.zero_grads();
        for i in 0..input.dw.len() {
            if !self.dropped[i] {
                input.dw[i] = self.out_act.dw[i];
            }
        }
    }

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

    pub fn to_json(&self) -> LayerJson {
        LayerJson::Dropout {
            out_sx: self.out_sx,
            out_sy: self.out_sy,
            out_depth: self.out_depth,
            drop_prob: self.drop_prob,
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Dropout {
                out_sx,
                out_sy,
                out_depth,
                drop_prob,
            } => {
                let mut rng = SimpleRng::new(0);
                DropoutLayer::new(*out_sx, *out_sy, *out_depth, *drop_prob, &mut rng)
            }
            _ => panic!("expected a dropout layer record"),
        }
    }
}
