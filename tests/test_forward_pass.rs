// Tests for forward propagation: output dimensions, shape chaining through
// stacked layers, and basic numeric correctness of the softmax head.

use approx::assert_relative_eq;

use convnet::utils::SimpleRng;
use convnet::{LayerSpec, LossTarget, Net, Vol};

fn input_spec(sx: usize, sy: usize, depth: usize) -> LayerSpec {
    let mut spec = LayerSpec::of_type("input");
    spec.out_sx = Some(sx);
    spec.out_sy = Some(sy);
    spec.out_depth = Some(depth);
    spec
}

#[test]
fn test_mlp_probabilities() {
    let mut fc = LayerSpec::of_type("fc");
    fc.num_neurons = Some(5);
    fc.activation = Some("relu".to_string());
    let mut softmax = LayerSpec::of_type("softmax");
    softmax.num_classes = Some(3);

    let mut rng = SimpleRng::new(99);
    let mut net = Net::make_layers(&[input_spec(1, 1, 4), fc, softmax], &mut rng).unwrap();

    let x = Vol::from_slice(&[0.2, -0.3, 0.5, 0.1]);
    let out = net.forward(&x, false);

    assert_eq!(out.depth(), 3);
    let sum: f32 = out.w.iter().sum();
    assert_relative_eq!(sum, 1.0, epsilon = 1e-5);
    assert!(out.w.iter().all(|&p| (0.0..=1.0).contains(&p)));
}

#[test]
fn test_conv_pool_shape_chain() {
    // 28x28x1 -> conv 5x5x8 stride 1 -> relu -> pool 2x2 stride 2 -> softmax 10
    let mut conv = LayerSpec::of_type("conv");
    conv.sx = Some(5);
    conv.filters = Some(8);
    conv.stride = Some(1);
    conv.activation = Some("relu".to_string());
    let mut pool = LayerSpec::of_type("pool");
    pool.sx = Some(2);
    pool.stride = Some(2);
    let mut softmax = LayerSpec::of_type("softmax");
    softmax.num_classes = Some(10);

    let mut rng = SimpleRng::new(1);
    let mut net =
        Net::make_layers(&[input_spec(28, 28, 1), conv, pool, softmax], &mut rng).unwrap();

    let layers = net.layers();
    // conv: (28 - 5)/1 + 1 = 24
    assert_eq!(layers[1].out_sx(), 24);
    assert_eq!(layers[1].out_sy(), 24);
    assert_eq!(layers[1].out_depth(), 8);
    // pool: (24 - 2)/2 + 1 = 12
    assert_eq!(layers[3].out_sx(), 12);
    assert_eq!(layers[3].out_sy(), 12);
    assert_eq!(layers[3].out_depth(), 8);

    let x = Vol::new(28, 28, 1, 0.0);
    let out = net.forward(&x, false);
    assert_eq!(out.len(), 10);
}

#[test]
fn test_conv_padding_preserves_size() {
    let mut conv = LayerSpec::of_type("conv");
    conv.sx = Some(3);
    conv.filters = Some(4);
    conv.stride = Some(1);
    conv.pad = Some(1);
    let mut softmax = LayerSpec::of_type("softmax");
    softmax.num_classes = Some(2);

    let mut rng = SimpleRng::new(1);
    let net = Net::make_layers(&[input_spec(8, 8, 3), conv, softmax], &mut rng).unwrap();

    assert_eq!(net.layers()[1].out_sx(), 8);
    assert_eq!(net.layers()[1].out_sy(), 8);
}

#[test]
fn test_forward_is_deterministic_in_prediction_mode() {
    let mut fc = LayerSpec::of_type("fc");
    fc.num_neurons = Some(6);
    fc.activation = Some("tanh".to_string());
    fc.drop_prob = Some(0.5);
    let mut softmax = LayerSpec::of_type("softmax");
    softmax.num_classes = Some(2);

    let mut rng = SimpleRng::new(17);
    let mut net = Net::make_layers(&[input_spec(1, 1, 3), fc, softmax], &mut rng).unwrap();

    let x = Vol::from_slice(&[0.1, 0.2, 0.3]);
    let first = net.forward(&x, false).w.clone();
    let second = net.forward(&x, false).w.clone();
    assert_eq!(first, second);
}

#[test]
fn test_prediction_tracks_strongest_input() {
    // a net with an identity-ish fc head can be forced by hand-editing is
    // overkill; instead check that get_cost_loss decreases when the target
    // matches the predicted class
    let mut fc = LayerSpec::of_type("fc");
    fc.num_neurons = Some(4);
    let mut softmax = LayerSpec::of_type("softmax");
    softmax.num_classes = Some(4);

    let mut rng = SimpleRng::new(23);
    let mut net = Net::make_layers(&[input_spec(1, 1, 2), fc, softmax], &mut rng).unwrap();

    let x = Vol::from_slice(&[0.9, -0.4]);
    net.forward(&x, false);
    let pred = net.get_prediction().unwrap();

    let loss_pred = net.get_cost_loss(&x, &LossTarget::Class(pred)).unwrap();
    for c in 0..4 {
        let loss_c = net.get_cost_loss(&x, &LossTarget::Class(c)).unwrap();
        assert!(loss_pred <= loss_c);
    }
}
