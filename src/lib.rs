//! Convnet: a small feed-forward neural network engine.
//!
//! The crate is built from four pieces:
//!
//! - `vol`: the `Vol` data volume, a flat value/gradient buffer pair over a
//!   (width, height, depth) logical shape. Every activation, weight and
//!   gradient in the engine lives in a `Vol`.
//! - `layers`: the layer family (input, fully connected, convolution, max
//!   pooling, elementwise nonlinearities, dropout, and the softmax/SVM/
//!   regression loss heads), expressed as one closed `Layer` sum type.
//! - `net`: a strict linear pipeline of layers with whole-network forward,
//!   backward, parameter collection and prediction extraction, built from a
//!   desugared list of `LayerSpec`s.
//! - `trainer`: a gradient-descent trainer with six update rules (sgd with
//!   optional momentum, adagrad, windowgrad, adadelta, adam, nesterov).
//!
//! Everything is single-threaded, synchronous and CPU-bound; all buffers are
//! mutated in place and exactly one forward/backward/update cycle is in
//! flight at a time per net/trainer pair.

pub mod architecture;
pub mod layers;
pub mod net;
pub mod trainer;
pub mod utils;
pub mod vol;

pub use architecture::LayerSpec;
pub use layers::{Layer, LossTarget};
pub use net::Net;
pub use trainer::{Method, Trainer, TrainerOptions};
pub use vol::Vol;
