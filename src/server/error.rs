//! Request-level error mapping.
//!
//! Dispatch failures become JSON error bodies with a stable `error` kind and
//! a masked `message`. Subprocess exit codes are not errors; they ride back
//! in a 200 response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::logging::redact;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(String),

    #[error("no plugin handles tool: {0}")]
    UnknownTool(String),

    #[error("no credential for {tool} on {resource}")]
    NoCredential { tool: String, resource: String },

    #[error("policy denied {tool} on {resource}")]
    PolicyDenied { tool: String, resource: String },

    #[error("unsupported git operation: {0}")]
    NotSupported(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl ProxyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "BAD_REQUEST",
            ProxyError::UnknownTool(_) => "UNKNOWN_TOOL",
            ProxyError::NoCredential { .. } => "NO_CREDENTIAL",
            ProxyError::PolicyDenied { .. } => "POLICY_DENIED",
            ProxyError::NotSupported(_) => "NOT_SUPPORTED",
            ProxyError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_)
            | ProxyError::UnknownTool(_)
            | ProxyError::NotSupported(_) => StatusCode::BAD_REQUEST,
            ProxyError::NoCredential { .. } | ProxyError::PolicyDenied { .. } => {
                StatusCode::FORBIDDEN
            }
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let message = redact::mask(&self.to_string());
        let body = Json(json!({ "error": self.kind(), "message": message }));
        (self.status(), body).into_response()
    }
}
