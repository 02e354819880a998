//! The basic data volume of the engine.
//!
//! A `Vol` is a 3D block of numbers with a width (`sx`), height (`sy`) and
//! depth, stored as a flat value buffer plus a parallel gradient buffer of the
//! same length. It holds activations, filter weights and biases alike, and
//! carries the gradients with respect to its own values.

use serde::{Deserialize, Serialize};

use crate::utils::SimpleRng;

/// A 3D volume of values with a parallel gradient buffer.
///
/// Element `(x, y, d)` lives at flat index `((sx * y) + x) * depth + d` in
/// both buffers. The two buffers always have equal length `sx * sy * depth`.
///
/// The gradient buffer `dw` is "pending" state: the layer that owns the
/// corresponding input zeroes it at the start of its backward pass and then
/// accumulates into it.
#[derive(Clone, Debug)]
pub struct Vol {
    sx: usize,
    sy: usize,
    depth: usize,
    /// Values.
    pub w: Vec<f32>,
    /// Gradients with respect to the values.
    pub dw: Vec<f32>,
}

/// Structural record of a `Vol` for persistence.
///
/// The gradient buffer is omitted by default to save space; when absent on
/// import the gradients are zero-filled. Buffer length is re-derived from the
/// dimensions rather than trusted from the record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VolJson {
    pub sx: usize,
    pub sy: usize,
    pub depth: usize,
    pub w: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dw: Option<Vec<f32>>,
}

impl Vol {
    /// Create a volume filled with the constant `c`, with zero gradients.
    pub fn new(sx: usize, sy: usize, depth: usize, c: f32) -> Self {
        let n = sx * sy * depth;
        Self {
            sx,
            sy,
            depth,
            w: vec![c; n],
            dw: vec![0.0; n],
        }
    }

    /// Create a randomly initialized volume.
    ///
    /// Values are independent zero-mean Gaussian draws scaled by
    /// `sqrt(1/(sx*sy*depth))`. The weight normalization equalizes the output
    /// variance of every neuron; otherwise neurons with many incoming
    /// connections would have outputs of larger variance.
    pub fn random(sx: usize, sy: usize, depth: usize, rng: &mut SimpleRng) -> Self {
        let n = sx * sy * depth;
        let scale = (1.0 / n as f32).sqrt();
        let mut v = Vol::new(sx, sy, depth, 0.0);
        for w in &mut v.w {
            *w = rng.randn(0.0, scale);
        }
        v
    }

    /// Create a 1x1xN volume from a flat list of values.
    pub fn from_slice(values: &[f32]) -> Self {
        Self {
            sx: 1,
            sy: 1,
            depth: values.len(),
            w: values.to_vec(),
            dw: vec![0.0; values.len()],
        }
    }

    /// Width of the volume.
    pub fn sx(&self) -> usize {
        self.sx
    }

    /// Height of the volume.
    pub fn sy(&self) -> usize {
        self.sy
    }

    /// Depth of the volume.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of elements (equal to the length of both buffers).
    pub fn len(&self) -> usize {
        self.w.len()
    }

    /// True when the volume holds no elements.
    pub fn is_empty(&self) -> bool {
        self.w.is_empty()
    }

    #[inline]
    fn index(&self, x: usize, y: usize, d: usize) -> usize {
        ((self.sx * y) + x) * self.depth + d
    }

    /// Value at `(x, y, d)`.
    #[inline]
    pub fn get(&self, x: usize, y: usize, d: usize) -> f32 {
        self.w[self.index(x, y, d)]
    }

    /// Set the value at `(x, y, d)`.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, d: usize, v: f32) {
        let ix = self.index(x, y, d);
        self.w[ix] = v;
    }

    /// Add to the value at `(x, y, d)`.
    #[inline]
    pub fn add(&mut self, x: usize, y: usize, d: usize, v: f32) {
        let ix = self.index(x, y, d);
        self.w[ix] += v;
    }

    /// Gradient at `(x, y, d)`.
    #[inline]
    pub fn get_grad(&self, x: usize, y: usize, d: usize) -> f32 {
        self.dw[self.index(x, y, d)]
    }

    /// Set the gradient at `(x, y, d)`.
    #[inline]
    pub fn set_grad(&mut self, x: usize, y: usize, d: usize, v: f32) {
        let ix = self.index(x, y, d);
        self.dw[ix] = v;
    }

    /// Add to the gradient at `(x, y, d)`.
    #[inline]
    pub fn add_grad(&mut self, x: usize, y: usize, d: usize, v: f32) {
        let ix = self.index(x, y, d);
        self.dw[ix] += v;
    }

    /// Same-shape volume with zeroed values and gradients.
    pub fn clone_and_zero(&self) -> Self {
        Vol::new(self.sx, self.sy, self.depth, 0.0)
    }

    /// Deep copy of the values; the gradient buffer of the copy is zeroed.
    pub fn clone_values(&self) -> Self {
        let mut v = Vol::new(self.sx, self.sy, self.depth, 0.0);
        v.w.copy_from_slice(&self.w);
        v
    }

    /// Accumulate another volume's values in place.
    pub fn add_from(&mut self, other: &Vol) {
        assert_eq!(self.w.len(), other.w.len(), "add_from shape mismatch");
        for (w, o) in self.w.iter_mut().zip(other.w.iter()) {
            *w += o;
        }
    }

    /// Accumulate another volume's values in place, scaled by `a`.
    pub fn add_from_scaled(&mut self, other: &Vol, a: f32) {
        assert_eq!(self.w.len(), other.w.len(), "add_from_scaled shape mismatch");
        for (w, o) in self.w.iter_mut().zip(other.w.iter()) {
            *w += a * o;
        }
    }

    /// Fill the value buffer with a constant.
    pub fn set_const(&mut self, a: f32) {
        self.w.fill(a);
    }

    /// Zero the gradient buffer.
    pub fn zero_grads(&mut self) {
        self.dw.fill(0.0);
    }

    /// Structural export, gradients omitted.
    pub fn to_json(&self) -> VolJson {
        VolJson {
            sx: self.sx,
            sy: self.sy,
            depth: self.depth,
            w: self.w.clone(),
            dw: None,
        }
    }

    /// Structural export including the gradient buffer.
    pub fn to_json_with_grads(&self) -> VolJson {
        VolJson {
            dw: Some(self.dw.clone()),
            ..self.to_json()
        }
    }

    /// Reconstruct a volume from a structural record.
    ///
    /// Buffer length is re-derived as `sx * sy * depth`; gradients are
    /// zero-filled when the record carries none.
    pub fn from_json(json: &VolJson) -> Self {
        let n = json.sx * json.sy * json.depth;
        let mut v = Vol::new(json.sx, json.sy, json.depth, 0.0);
        v.w[..n].copy_from_slice(&json.w[..n]);
        if let Some(dw) = &json.dw {
            v.dw[..n].copy_from_slice(&dw[..n]);
        }
        v
    }
}
