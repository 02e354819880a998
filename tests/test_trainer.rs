// Tests for end-to-end training: convergence of sgd on a small regression
// problem, classification accuracy after training, and a smoke pass over
// every update rule.

use convnet::utils::SimpleRng;
use convnet::{LayerSpec, LossTarget, Method, Net, Trainer, TrainerOptions, Vol};

fn input_spec(depth: usize) -> LayerSpec {
    let mut spec = LayerSpec::of_type("input");
    spec.out_sx = Some(1);
    spec.out_sy = Some(1);
    spec.out_depth = Some(depth);
    spec
}

// y = 0.5 * a - 0.3 * b + 0.1, learnable exactly by a single linear neuron
fn linear_target(a: f32, b: f32) -> f32 {
    0.5 * a - 0.3 * b + 0.1
}

#[test]
fn test_sgd_converges_on_linear_regression() {
    let mut reg = LayerSpec::of_type("regression");
    reg.num_neurons = Some(1);

    let mut rng = SimpleRng::new(1234);
    let mut net = Net::make_layers(&[input_spec(2), reg], &mut rng).unwrap();

    let mut opts = TrainerOptions::default();
    opts.learning_rate = 0.1;
    opts.momentum = 0.0;
    let mut trainer = Trainer::new(opts);

    let mut last_loss = 0.0;
    for _ in 0..1000 {
        let a = rng.next_f32() * 2.0 - 1.0;
        let b = rng.next_f32() * 2.0 - 1.0;
        let x = Vol::from_slice(&[a, b]);
        let stats = trainer
            .train(&mut net, &x, &LossTarget::Scalar(linear_target(a, b)))
            .unwrap();
        last_loss = stats.loss;
    }
    assert!(last_loss < 0.01, "loss after 1000 iterations: {}", last_loss);

    // probe a fresh point
    let x = Vol::from_slice(&[0.25, -0.5]);
    let out = net.forward(&x, false);
    assert!((out.w[0] - linear_target(0.25, -0.5)).abs() < 0.05);
}

#[test]
fn test_classifier_learns_separable_points() {
    let mut fc = LayerSpec::of_type("fc");
    fc.num_neurons = Some(6);
    fc.activation = Some("tanh".to_string());
    let mut softmax = LayerSpec::of_type("softmax");
    softmax.num_classes = Some(2);

    let mut rng = SimpleRng::new(88);
    let mut net = Net::make_layers(&[input_spec(2), fc, softmax], &mut rng).unwrap();

    let mut opts = TrainerOptions::default();
    opts.learning_rate = 0.05;
    opts.batch_size = 4;
    opts.l2_decay = 0.0001;
    let mut trainer = Trainer::new(opts);

    // two clusters on opposite sides of the origin
    let data = [
        ([0.5f32, 0.5f32], 0usize),
        ([0.6, 0.4], 0),
        ([0.4, 0.7], 0),
        ([-0.5, -0.5], 1),
        ([-0.6, -0.4], 1),
        ([-0.4, -0.7], 1),
    ];

    for _ in 0..200 {
        for (point, label) in &data {
            let x = Vol::from_slice(point);
            trainer
                .train(&mut net, &x, &LossTarget::Class(*label))
                .unwrap();
        }
    }

    for (point, label) in &data {
        let x = Vol::from_slice(point);
        net.forward(&x, false);
        assert_eq!(net.get_prediction().unwrap(), *label);
    }
}

#[test]
fn test_every_method_trains_without_panicking() {
    for method in [
        Method::Sgd,
        Method::Adagrad,
        Method::Windowgrad,
        Method::Adadelta,
        Method::Adam,
        Method::Nesterov,
    ] {
        let mut fc = LayerSpec::of_type("fc");
        fc.num_neurons = Some(4);
        fc.activation = Some("relu".to_string());
        let mut softmax = LayerSpec::of_type("softmax");
        softmax.num_classes = Some(3);

        let mut rng = SimpleRng::new(7);
        let mut net = Net::make_layers(&[input_spec(3), fc, softmax], &mut rng).unwrap();

        let mut opts = TrainerOptions::default();
        opts.method = method;
        opts.batch_size = 2;
        opts.l1_decay = 0.0001;
        opts.l2_decay = 0.0001;
        let mut trainer = Trainer::new(opts);

        for i in 0..20usize {
            let x = Vol::from_slice(&[0.1 * i as f32, -0.2, 0.3]);
            let stats = trainer
                .train(&mut net, &x, &LossTarget::Class(i % 3))
                .unwrap();
            assert!(stats.loss.is_finite(), "{:?} produced a non-finite loss", method);
        }

        // every parameter must stay finite after the updates
        for group in net.params_and_grads() {
            assert!(group.params.iter().all(|p| p.is_finite()));
        }
    }
}

#[test]
fn test_svm_head_trains() {
    let mut fc = LayerSpec::of_type("fc");
    fc.num_neurons = Some(5);
    fc.activation = Some("relu".to_string());
    let mut svm = LayerSpec::of_type("svm");
    svm.num_classes = Some(2);

    let mut rng = SimpleRng::new(19);
    let mut net = Net::make_layers(&[input_spec(2), fc, svm], &mut rng).unwrap();

    let mut opts = TrainerOptions::default();
    opts.learning_rate = 0.05;
    let mut trainer = Trainer::new(opts);

    let x = Vol::from_slice(&[0.7, -0.7]);
    let y = LossTarget::Class(0);

    let before = net.get_cost_loss(&x, &y).unwrap();
    for _ in 0..100 {
        trainer.train(&mut net, &x, &y).unwrap();
    }
    let after = net.get_cost_loss(&x, &y).unwrap();
    assert!(after <= before, "hinge loss grew: {} -> {}", before, after);
}
