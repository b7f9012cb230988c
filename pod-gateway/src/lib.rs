//! pod-gateway library crate.
//!
//! Exposes the credential lifecycle manager, the ephemeral image store and
//! the HTTP gateway that wires them together, so the binary and the
//! integration tests share one implementation.

pub mod api;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod images;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod utils;

pub use error::{Error, Result};
