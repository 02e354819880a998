//! Max pooling layer.

use crate::layers::conv::out_dim;
use crate::layers::LayerJson;
use crate::vol::Vol;

/// Max pooling: each output cell takes the maximum over its receptive window
/// in the same depth slice. No learned parameters.
///
/// The forward pass records, per output cell, the input coordinate that won
/// the max (ties broken by the first maximum encountered in scan order), and
/// the backward pass routes the whole output gradient to exactly that
/// position. A window that contains no in-bounds input at all (possible with
/// aggressive pad/stride combinations) outputs 0.0, records no winner, and
/// drops its gradient on backward.
#[derive(Clone, Debug)]
pub struct PoolLayer {
    sx: usize,
    sy: usize,
    in_depth: usize,
    in_sx: usize,
    in_sy: usize,
    stride: usize,
    pad: usize,
    out_depth: usize,
    out_sx: usize,
    out_sy: usize,
    /// Winning input coordinate per output cell, `None` for empty windows.
    switches: Vec<Option<(usize, usize)>>,
    out_act: Vol,
}

impl PoolLayer {
    /// Create a pooling layer with `sx` x `sy` windows over inputs of shape
    /// `(in_sx, in_sy, in_depth)`.
    pub fn new(
        sx: usize,
        sy: usize,
        in_sx: usize,
        in_sy: usize,
        in_depth: usize,
        stride: usize,
        pad: usize,
    ) -> Self {
        let out_sx = out_dim(in_sx, pad, sx, stride);
        let out_sy = out_dim(in_sy, pad, sy, stride);
        Self {
            sx,
            sy,
            in_depth,
            in_sx,
            in_sy,
            stride,
            pad,
            out_depth: in_depth,
            out_sx,
            out_sy,
            switches: vec![None; out_sx * out_sy * in_depth],
            out_act: Vol::new(out_sx, out_sy, in_depth, 0.0),
        }
    }

    pub fn forward(&mut self, input: &Vol, _is_training: bool) {
        assert_eq!(
            input.len(),
            self.in_sx * self.in_sy * self.in_depth,
            "pool layer expects a {}x{}x{} input",
            self.in_sx,
            self.in_sy,
            self.in_depth
        );
        let v_sx = input.sx() as isize;
        let v_sy = input.sy() as isize;

        let mut n = 0; // switch counter
        for d in 0..self.out_depth {
            let mut y = -(self.pad as isize);
            for ay in 0..self.out_sy {
                let mut x = -(self.pad as isize);
                for ax in 0..self.out_sx {
                    let mut best: Option<(f32, usize, usize)> = None;
                    for fy in 0..self.sy {
                        let oy = y + fy as isize;
                        if oy < 0 || oy >= v_sy {
                            continue;
                        }
                        for fx in 0..self.sx {
                            let ox = x + fx as isize;
                            if ox < 0 || ox >= v_sx {
                                continue;
                            }
                            let v = input.get(ox as usize, oy as usize, d);
                            // strict > keeps the first-encountered winner
                            if best.map_or(true, |(a, _, _)| v > a) {
                                best = Some((v, ox as usize, oy as usize));
                            }
                        }
                    }
                    match best {
                        Some((a, wx, wy)) => {
                            self.switches[n] = Some((wx, wy));
                            self.out_act.set(ax, ay, d, a);
                        }
                        None => {
                            // window entirely out of bounds
                            self.switches[n] = None;
                            self.out_act.set(ax, ay, d, 0.0);
                        }
                    }
                    n += 1;
                    x += self.stride as isize;
                }
                y += self.stride as isize;
            }
        }
    }

    pub fn backward(&mut self, input: &mut Vol) {
        input.zero_grads();
        let mut n = 0;
        for d in 0..self.out_depth {
            for ay in 0..self.out_sy {
                for ax in 0..self.out_sx {
                    if let Some((wx, wy)) = self.switches[n] {
                        let chain_grad = self.out_act.get_grad(ax, ay, d);
                        input.add_grad(wx, wy, d, chain_grad);
                    }
                    n += 1;
                }
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
        LayerJson::Pool {
            out_depth: self.out_depth,
            out_sx: self.out_sx,
            out_sy: self.out_sy,
            sx: self.sx,
            sy: self.sy,
            stride: self.stride,
            pad: self.pad,
            in_depth: self.in_depth,
            in_sx: self.in_sx,
            in_sy: self.in_sy,
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Pool {
                sx,
                sy,
                stride,
                pad,
                in_depth,
                in_sx,
                in_sy,
                ..
            } => PoolLayer::new(*sx, *sy, *in_sx, *in_sy, *in_depth, *stride, *pad),
            _ => panic!("expected a pool layer record"),
        }
    }
}
