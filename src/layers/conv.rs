//! 2D convolution layer.

use crate::layers::{LayerJson, ParamGroup};
use crate::utils::SimpleRng;
use crate::vol::Vol;

/// Convolution layer: `out_depth` feature maps, each produced by sweeping a
/// `(sx, sy, in_depth)` filter over the input at a given stride with implicit
/// zero padding.
///
/// Output spatial size follows `floor((in + 2*pad - filter)/stride + 1)` on
/// each axis; strided applications that do not fit the input are trimmed,
/// never partially applied. Out-of-bounds filter taps contribute zero, which
/// is how the zero padding is realized — no padded copy of the input is ever
/// materialized.
#[derive(Clone, Debug)]
pub struct ConvLayer {
    out_depth: usize,
    sx: usize,
    sy: usize,
    in_depth: usize,
    in_sx: usize,
    in_sy: usize,
    stride: usize,
    pad: usize,
    l1_decay_mul: f32,
    l2_decay_mul: f32,
    out_sx: usize,
    out_sy: usize,
    filters: Vec<Vol>,
    biases: Vol,
    out_act: Vol,
}

/// `floor((in + 2*pad - filter)/stride + 1)`, clamped at zero for filters
/// larger than the padded input.
pub(crate) fn out_dim(input: usize, pad: usize, filter: usize, stride: usize) -> usize {
    let span = input as isize + 2 * pad as isize - filter as isize;
    if span < 0 {
        0
    } else {
        (span / stride as isize + 1) as usize
    }
}

impl ConvLayer {
    /// Create a convolution layer of `filters` feature maps with `sx` x `sy`
    /// spatial filters over inputs of shape `(in_sx, in_sy, in_depth)`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        filters: usize,
        sx: usize,
        sy: usize,
        in_sx: usize,
        in_sy: usize,
        in_depth: usize,
        stride: usize,
        pad: usize,
        bias_pref: f32,
        l1_decay_mul: f32,
        l2_decay_mul: f32,
        rng: &mut SimpleRng,
    ) -> Self {
        let out_sx = out_dim(in_sx, pad, sx, stride);
        let out_sy = out_dim(in_sy, pad, sy, stride);
        let filter_vols = (0..filters)
            .map(|_| Vol::random(sx, sy, in_depth, rng))
            .collect();
        Self {
            out_depth: filters,
            sx,
            sy,
            in_depth,
            in_sx,
            in_sy,
            stride,
            pad,
            l1_decay_mul,
            l2_decay_mul,
            out_sx,
            out_sy,
            filters: filter_vols,
            biases: Vol::new(1, 1, filters, bias_pref),
            out_act: Vol::new(out_sx, out_sy, filters, 0.0),
        }
    }

    pub fn forward(&mut self, input: &Vol, _is_training: bool) {
        assert_eq!(
            input.len(),
            self.in_sx * self.in_sy * self.in_depth,
            "conv layer expects a {}x{}x{} input",
            self.in_sx,
            self.in_sy,
            self.in_depth
        );
        let v_sx = input.sx() as isize;
        let v_sy = input.sy() as isize;
        let stride = self.stride as isize;

        for d in 0..self.out_depth {
            let f = &self.filters[d];
            let mut y = -(self.pad as isize);
            for ay in 0..self.out_sy {
                let mut x = -(self.pad as isize);
                for ax in 0..self.out_sx {
                    // inner product of the filter with the input patch under
                    // it; out-of-bounds taps are the implicit zero padding
                    let mut a = 0.0;
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
                            let fbase = ((self.sx * fy) + fx) * self.in_depth;
                            let vbase =
                                ((v_sx as usize * oy as usize) + ox as usize) * self.in_depth;
                            for fd in 0..self.in_depth {
                                a += f.w[fbase + fd] * input.w[vbase + fd];
                            }
                        }
                    }
                    a += self.biases.w[d];
                    self.out_act.set(ax, ay, d, a);
                    x += stride;
                }
                y += stride;
            }
        }
    }

    pub fn backward(&mut self, input: &mut Vol) {
        input.zero_grads();
        let v_sx = input.sx() as isize;
        let v_sy = input.sy() as isize;
        let stride = self.stride as isize;

        for d in 0..self.out_depth {
            let f = &mut self.filters[d];
            let mut y = -(self.pad as isize);
            for ay in 0..self.out_sy {
                let mut x = -(self.pad as isize);
                for ax in 0..self.out_sx {
                    let chain_grad = self.out_act.get_grad(ax, ay, d);
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
                            let fbase = ((self.sx * fy) + fx) * self.in_depth;
                            let vbase =
                                ((v_sx as usize * oy as usize) + ox as usize) * self.in_depth;
                            for fd in 0..self.in_depth {
                                // outer product of input patch and output
                                // gradient into the filter; filter-weighted
                                // scatter back into the input gradient
                                f.dw[fbase + fd] += input.w[vbase + fd] * chain_grad;
                                input.dw[vbase + fd] += f.w[fbase + fd] * chain_grad;
                            }
                        }
                    }
                    self.biases.dw[d] += chain_grad;
                    x += stride;
                }
                y += stride;
            }
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
        LayerJson::Conv {
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
            l1_decay_mul: self.l1_decay_mul,
            l2_decay_mul: self.l2_decay_mul,
            filters: self.filters.iter().map(Vol::to_json).collect(),
            biases: self.biases.to_json(),
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Conv {
                out_depth,
                out_sx,
                out_sy,
                sx,
                sy,
                stride,
                pad,
                in_depth,
                in_sx,
                in_sy,
                l1_decay_mul,
                l2_decay_mul,
                filters,
                biases,
            } => Self {
                out_depth: *out_depth,
                sx: *sx,
                sy: *sy,
                in_depth: *in_depth,
                in_sx: *in_sx,
                in_sy: *in_sy,
                stride: *stride,
                pad: *pad,
                l1_decay_mul: *l1_decay_mul,
                l2_decay_mul: *l2_decay_mul,
                out_sx: *out_sx,
                out_sy: *out_sy,
                filters: filters.iter().map(Vol::from_json).collect(),
                biases: Vol::from_json(biases),
                out_act: Vol::new(*out_sx, *out_sy, *out_depth, 0.0),
            },
            _ => panic!("expected a conv layer record"),
        }
    }
}
