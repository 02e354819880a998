//! Simple random number generator for reproducibility.
//!
//! This module provides a lightweight xorshift-based PRNG that doesn't require
//! external dependencies, ensuring reproducible results across runs. It is the
//! single random source of the engine: weight initialization and dropout both
//! take an explicit `&mut SimpleRng` instead of consulting global state, so
//! seeded runs are fully deterministic.

use std::time::{SystemTime, UNIX_EPOCH};

/// Simple RNG for reproducibility without external crates.
///
/// Uses the xorshift algorithm for fast, deterministic random number
/// generation, plus a Box-Muller transform for Gaussian samples.
#[derive(Clone, Debug)]
pub struct SimpleRng {
    state: u64,
    /// Spare Gaussian sample cached by the Box-Muller transform.
    spare: Option<f32>,
}

impl SimpleRng {
    /// Create a new RNG with explicit seed (if zero, use a fixed value).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state, spare: None }
    }

    /// Reseed based on the current time.
    pub fn reseed_from_time(&mut self) {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        self.state = if nanos == 0 {
            0x9e3779b97f4a7c15
        } else {
            nanos
        };
        self.spare = None;
    }

    /// Basic xorshift to generate u32.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 32) as u32
    }

    /// Convert to [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.next_u32() as f32 / u32::MAX as f32
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Standard Gaussian sample via the Marsaglia polar variant of
    /// Box-Muller. Generates two samples per transform and caches the spare.
    pub fn gauss(&mut self) -> f32 {
        if let Some(v) = self.spare.take() {
            return v;
        }
        loop {
            let u = 2.0 * self.next_f32() - 1.0;
            let v = 2.0 * self.next_f32() - 1.0;
            let r = u * u + v * v;
            if r == 0.0 || r > 1.0 {
                continue;
            }
            let c = (-2.0 * r.ln() / r).sqrt();
            self.spare = Some(v * c);
            return u * c;
        }
    }

    /// Gaussian sample with the given mean and standard deviation.
    pub fn randn(&mut self, mu: f32, std: f32) -> f32 {
        mu + self.gauss() * std
    }
}
