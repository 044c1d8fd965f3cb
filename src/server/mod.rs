//! Server module
//!
//! The axum router, request-level error mapping, and the credential status
//! endpoint.

pub mod error;
pub mod http;
mod status;

pub use error::ProxyError;
pub use http::{create_router, AppState};
