//! Stochastic gradient-based training with six update rules.

use std::error::Error;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::layers::LossTarget;
use crate::net::Net;
use crate::vol::Vol;

/// Parameter update rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Vanilla gradient descent, optionally with classical momentum.
    Sgd,
    /// Per-parameter learning rate scaled by the accumulated squared
    /// gradient history.
    Adagrad,
    /// Adagrad with an exponentially decaying window instead of the full
    /// history.
    Windowgrad,
    /// Windowed squared gradients on both the gradient and the update;
    /// ignores the learning rate entirely.
    Adadelta,
    /// Bias-corrected first and second moment estimates.
    Adam,
    /// Momentum with the lookahead correction.
    Nesterov,
}

/// Trainer hyperparameters. Every field has the conventional default so a
/// config file only needs to name what it changes.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct TrainerOptions {
    pub method: Method,
    pub learning_rate: f32,
    pub l1_decay: f32,
    pub l2_decay: f32,
    /// Number of `train` calls between parameter updates; gradients
    /// accumulate in between.
    pub batch_size: usize,
    /// Classical momentum coefficient (sgd only).
    pub momentum: f32,
    /// Window decay for windowgrad and adadelta.
    pub ro: f32,
    /// Denominator fuzz for the adaptive methods.
    pub eps: f32,
    /// Adam first-moment decay.
    pub beta1: f32,
    /// Adam second-moment decay.
    pub beta2: f32,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            method: Method::Sgd,
            learning_rate: 0.01,
            l1_decay: 0.0,
            l2_decay: 0.0,
            batch_size: 1,
            momentum: 0.9,
            ro: 0.95,
            eps: 1e-8,
            beta1: 0.9,
            beta2: 0.999,
        }
    }
}

/// Per-call training report.
#[derive(Clone, Copy, Debug)]
pub struct TrainStats {
    pub fwd_time: Duration,
    pub bwd_time: Duration,
    pub l1_decay_loss: f32,
    pub l2_decay_loss: f32,
    /// The loss layer's data loss for this example.
    pub cost_loss: f32,
    /// Data loss plus both decay losses.
    pub loss: f32,
}

/// Drives a network through forward/backward passes and applies the
/// configured update rule once per accumulated batch.
///
/// The trainer owns the per-parameter accumulator state (`gsum`, `xsum`),
/// keyed by the position of each parameter group in
/// [`Net::params_and_grads`]. Training the same trainer against a net of a
/// different architecture resets nothing; create a fresh trainer instead.
pub struct Trainer {
    pub options: TrainerOptions,
    /// Total `train` calls so far.
    k: usize,
    /// Gradient history, one vec per parameter group. Empty until the first
    /// update for plain sgd without momentum.
    gsum: Vec<Vec<f32>>,
    /// Update history, used by adadelta and adam only.
    xsum: Vec<Vec<f32>>,
}

impl Trainer {
    pub fn new(options: TrainerOptions) -> Self {
        Self {
            options,
            k: 0,
            gsum: Vec::new(),
            xsum: Vec::new(),
        }
    }

    /// Number of `train` calls so far.
    pub fn iterations(&self) -> usize {
        self.k
    }

    /// One training step: forward `x`, backprop against `y`, and when a
    /// full batch has accumulated, apply the update rule and zero the
    /// gradients.
    pub fn train(
        &mut self,
        net: &mut Net,
        x: &Vol,
        y: &LossTarget,
    ) -> Result<TrainStats, Box<dyn Error>> {
        let start = Instant::now();
        net.forward(x, true);
        let fwd_time = start.elapsed();

        let start = Instant::now();
        let cost_loss = net.backward(y)?;
        let bwd_time = start.elapsed();

        let mut l1_decay_loss = 0.0f32;
        let mut l2_decay_loss = 0.0f32;

        self.k += 1;
        if self.k % self.options.batch_size == 0 {
            let opts = self.options;
            let mut groups = net.params_and_grads();

            // lazily size the accumulators on the first update
            if self.gsum.is_empty() && (opts.method != Method::Sgd || opts.momentum > 0.0) {
                for g in &groups {
                    self.gsum.push(vec![0.0; g.params.len()]);
                    if opts.method == Method::Adam || opts.method == Method::Adadelta {
                        self.xsum.push(vec![0.0; g.params.len()]);
                    } else {
                        self.xsum.push(Vec::new());
                    }
                }
            }

            for (i, group) in groups.iter_mut().enumerate() {
                let l1_decay = opts.l1_decay * group.l1_decay_mul;
                let l2_decay = opts.l2_decay * group.l2_decay_mul;

                for j in 0..group.params.len() {
                    let p = group.params[j];
                    l1_decay_loss += l1_decay * p.abs();
                    l2_decay_loss += l2_decay * p * p * 0.5;

                    let l1_grad = l1_decay * if p > 0.0 { 1.0 } else { -1.0 };
                    let l2_grad = l2_decay * p;
                    let gij =
                        (l1_grad + l2_grad + group.grads[j]) / opts.batch_size as f32;

                    match opts.method {
                        Method::Adam => {
                            let gsum = &mut self.gsum[i];
                            let xsum = &mut self.xsum[i];
                            gsum[j] = gsum[j] * opts.beta1 + (1.0 - opts.beta1) * gij;
                            xsum[j] = xsum[j] * opts.beta2 + (1.0 - opts.beta2) * gij * gij;
                            let bias_corr1 =
                                gsum[j] / (1.0 - opts.beta1.powi(self.k as i32));
                            let bias_corr2 =
                                xsum[j] / (1.0 - opts.beta2.powi(self.k as i32));
                            let dx = -opts.learning_rate * bias_corr1
                                / (bias_corr2.sqrt() + opts.eps);
                            group.params[j] += dx;
                        }
                        Method::Adagrad => {
                            let gsum = &mut self.gsum[i];
                            gsum[j] += gij * gij;
                            let dx = -opts.learning_rate / (gsum[j] + opts.eps).sqrt() * gij;
                            group.params[j] += dx;
                        }
                        Method::Windowgrad => {
                            let gsum = &mut self.gsum[i];
                            gsum[j] = opts.ro * gsum[j] + (1.0 - opts.ro) * gij * gij;
                            let dx = -opts.learning_rate / (gsum[j] + opts.eps).sqrt() * gij;
                            group.params[j] += dx;
                        }
                        Method::Adadelta => {
                            let gsum = &mut self.gsum[i];
                            let xsum = &mut self.xsum[i];
                            gsum[j] = opts.ro * gsum[j] + (1.0 - opts.ro) * gij * gij;
                            let dx = -((xsum[j] + opts.eps) / (gsum[j] + opts.eps)).sqrt()
                                * gij;
                            xsum[j] = opts.ro * xsum[j] + (1.0 - opts.ro) * dx * dx;
                            group.params[j] += dx;
                        }
                        Method::Nesterov => {
                            let gsum = &mut self.gsum[i];
                            let old = gsum[j];
                            gsum[j] = gsum[j] * opts.momentum + opts.learning_rate * gij;
                            let dx = opts.momentum * old - (1.0 + opts.momentum) * gsum[j];
                            group.params[j] += dx;
                        }
                        Method::Sgd => {
                            if opts.momentum > 0.0 {
                                let gsum = &mut self.gsum[i];
                                let dx = opts.momentum * gsum[j] - opts.learning_rate * gij;
                                gsum[j] = dx;
                                group.params[j] += dx;
                            } else {
                                group.params[j] -= opts.learning_rate * gij;
                            }
                        }
                    }

                    group.grads[j] = 0.0;
                }
            }
        }

        Ok(TrainStats {
            fwd_time,
            bwd_time,
            l1_decay_loss,
            l2_decay_loss,
            cost_loss,
            loss: cost_loss + l1_decay_loss + l2_decay_loss,
        })
    }
}
