//! HTTP gateway.
//!
//! Thin axum layer over the credential manager and the image store, plus
//! health, metrics and logging endpoints.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
