//! Input layer: declares the shape of the data entering the net.

use crate::layers::LayerJson;
use crate::vol::Vol;

/// Identity passthrough that fixes the input shape of the pipeline.
///
/// The forward pass copies the caller's volume into the layer's own output
/// buffer, so nothing downstream ever aliases memory the caller owns. The
/// copy also gives the backward pass a place to deposit the gradient with
/// respect to the network input without mutating the caller's data.
#[derive(Clone, Debug)]
pub struct InputLayer {
    out_sx: usize,
    out_sy: usize,
    out_depth: usize,
    out_act: Vol,
}

impl InputLayer {
    /// Create an input layer for volumes of the given shape.
    pub fn new(sx: usize, sy: usize, depth: usize) -> Self {
        Self {
            out_sx: sx,
            out_sy: sy,
            out_depth: depth,
            out_act: Vol::new(sx, sy, depth, 0.0),
        }
    }

    pub fn forward(&mut self, input: &Vol, _is_training: bool) {
        assert_eq!(
            input.len(),
            self.out_act.len(),
            "input volume has {} elements, net expects {}",
            input.len(),
            self.out_act.len()
        );
        self.out_act.w.copy_from_slice(&input.w);
    }

    /// Nothing upstream of the input layer; no-op.
    pub fn backward(&mut self, _input: &mut Vol) {}

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
        LayerJson::Input {
            out_sx: self.out_sx,
            out_sy: self.out_sy,
            out_depth: self.out_depth,
        }
    }

    pub fn from_json(json: &LayerJson) -> Self {
        match json {
            LayerJson::Input {
                out_sx,
                out_sy,
                out_depth,
            } => InputLayer::new(*out_sx, *out_sy, *out_depth),
            _ => panic!("expected an input layer record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_is_identity() {
        let mut layer = InputLayer::new(1, 1, 4);
        let x = Vol::from_slice(&[1.0, -2.0, 3.0, 0.5]);
        layer.forward(&x, false);
        assert_eq!(layer.out_act().w, x.w);
    }

    #[test]
    fn test_output_shape_is_configured_shape() {
        let layer = InputLayer::new(24, 24, 3);
        assert_eq!(layer.out_sx(), 24);
        assert_eq!(layer.out_sy(), 24);
        assert_eq!(layer.out_depth(), 3);
    }

    #[test]
    #[should_panic(expected = "net expects")]
    fn test_forward_rejects_wrong_size() {
        let mut layer = InputLayer::new(1, 1, 3);
        let x = Vol::from_slice(&[1.0, 2.0]);
        layer.forward(&x, false);
    }
}
