//! Shared utilities for the network engine.
//!
//! The seeded random number source consumed by volume initialization and the
//! dropout layer, plus the error constructor used for configuration and
//! contract violations.

pub mod rng;

pub use rng::SimpleRng;

use std::error::Error;

/// Build the boxed error used for configuration and contract violations.
pub fn invalid_data(msg: impl Into<String>) -> Box<dyn Error> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        msg.into(),
    ))
}
