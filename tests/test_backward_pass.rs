// Tests for backward propagation through whole networks: gradient seeding at
// the loss head, flow through intermediate layers, and accumulation across
// repeated passes.

use convnet::utils::SimpleRng;
use convnet::{LayerSpec, LossTarget, Net, Vol};

fn input_spec(sx: usize, sy: usize, depth: usize) -> LayerSpec {
    let mut spec = LayerSpec::of_type("input");
    spec.out_sx = Some(sx);
    spec.out_sy = Some(sy);
    spec.out_depth = Some(depth);
    spec
}

fn classifier_net(rng: &mut SimpleRng) -> Net {
    let mut fc = LayerSpec::of_type("fc");
    fc.num_neurons = Some(5);
    fc.activation = Some("sigmoid".to_string());
    let mut softmax = LayerSpec::of_type("softmax");
    softmax.num_classes = Some(3);
    Net::make_layers(&[input_spec(1, 1, 4), fc, softmax], rng).unwrap()
}

#[test]
fn test_backward_populates_every_parametric_layer() {
    let mut rng = SimpleRng::new(8);
    let mut net = classifier_net(&mut rng);

    let x = Vol::from_slice(&[0.3, -0.2, 0.7, 0.4]);
    net.forward(&x, true);
    net.backward(&LossTarget::Class(2)).unwrap();

    // two fc layers contribute groups; each group must carry some gradient
    let groups = net.params_and_grads();
    assert!(!groups.is_empty());
    for group in &groups {
        assert_eq!(group.params.len(), group.grads.len());
    }
    let any = groups.iter().any(|g| g.grads.iter().any(|&v| v != 0.0));
    assert!(any);
}

#[test]
fn test_gradients_accumulate_across_passes() {
    let mut rng = SimpleRng::new(8);
    let mut net = classifier_net(&mut rng);

    let x = Vol::from_slice(&[0.3, -0.2, 0.7, 0.4]);
    let y = LossTarget::Class(1);

    net.forward(&x, true);
    net.backward(&y).unwrap();
    let once: Vec<f32> = net
        .params_and_grads()
        .iter()
        .flat_map(|g| g.grads.iter().copied())
        .collect();

    net.forward(&x, true);
    net.backward(&y).unwrap();
    let twice: Vec<f32> = net
        .params_and_grads()
        .iter()
        .flat_map(|g| g.grads.iter().copied())
        .collect();

    for (a, b) in once.iter().zip(twice.iter()) {
        assert!((b - 2.0 * a).abs() < 1e-5, "expected {} to double to {}", a, b);
    }
}

#[test]
fn test_loss_drops_after_manual_sgd_step() {
    let mut rng = SimpleRng::new(30);
    let mut net = classifier_net(&mut rng);

    let x = Vol::from_slice(&[0.5, 0.5, -0.5, 0.0]);
    let y = LossTarget::Class(0);

    let before = net.get_cost_loss(&x, &y).unwrap();

    net.forward(&x, true);
    net.backward(&y).unwrap();
    for group in net.params_and_grads() {
        for (p, g) in group.params.iter_mut().zip(group.grads.iter()) {
            *p -= 0.05 * g;
        }
    }

    let after = net.get_cost_loss(&x, &y).unwrap();
    assert!(after < before, "loss did not drop: {} -> {}", before, after);
}

#[test]
fn test_backward_through_conv_pool_stack() {
    let mut conv = LayerSpec::of_type("conv");
    conv.sx = Some(3);
    conv.filters = Some(2);
    conv.stride = Some(1);
    conv.activation = Some("relu".to_string());
    let mut pool = LayerSpec::of_type("pool");
    pool.sx = Some(2);
    pool.stride = Some(2);
    let mut softmax = LayerSpec::of_type("softmax");
    softmax.num_classes = Some(2);

    let mut rng = SimpleRng::new(12);
    let mut net =
        Net::make_layers(&[input_spec(8, 8, 1), conv, pool, softmax], &mut rng).unwrap();

    let x = Vol::random(8, 8, 1, &mut rng);
    net.forward(&x, true);
    let loss = net.backward(&LossTarget::Class(1)).unwrap();
    assert!(loss.is_finite());

    // the conv filters must receive gradient through relu and max pooling
    let any = net
        .params_and_grads()
        .iter()
        .any(|g| g.grads.iter().any(|&v| v != 0.0));
    assert!(any);
}

#[test]
fn test_regression_gradient_is_signed_error() {
    let mut reg = LayerSpec::of_type("regression");
    reg.num_neurons = Some(2);

    let mut rng = SimpleRng::new(3);
    let mut net = Net::make_layers(&[input_spec(1, 1, 2), reg], &mut rng).unwrap();

    let x = Vol::from_slice(&[1.0, -1.0]);
    let out = net.forward(&x, true).w.clone();
    let target = vec![out[0] + 0.5, out[1] - 0.25];
    let loss = net
        .backward(&LossTarget::Vector(target))
        .unwrap();

    // loss = 0.5 * (0.5^2 + 0.25^2)
    assert!((loss - 0.5 * (0.25 + 0.0625)).abs() < 1e-5);
}
