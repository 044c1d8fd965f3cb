//! Git smart-protocol reverse proxy with credential rewriting.
//!
//! Exposes the three smart-HTTP endpoints under `/git/{owner}/{repo}.git/`
//! and forwards them to the canonical host with the selected credential
//! injected as Basic auth. Bodies stream in both directions so large fetches
//! and pushes never buffer fully in memory. Anything the sandbox sent in
//! `Authorization` is dropped on the floor.

use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

use crate::logging::audit::{audit, AuditEvent};
use crate::logging::redact;
use crate::plugins::ProxyContext;
use crate::server::error::ProxyError;

use super::credential::{select_credential, TOKEN_ENV};

/// Basic-auth username GitHub expects for token authentication.
pub const BASIC_AUTH_USER: &str = "x-access-token";

/// Default upstream. Overridable per plugin config for tests.
pub const DEFAULT_BASE_URL: &str = "https://github.com";

const UPLOAD_PACK: &str = "git-upload-pack";
const RECEIVE_PACK: &str = "git-receive-pack";

/// Inbound headers the smart protocol cares about. Everything else,
/// Authorization included, stays behind.
const FORWARD_REQUEST_HEADERS: &[&str] = &[
    "content-type",
    "accept",
    "user-agent",
    "content-encoding",
    "git-protocol",
];

const FORWARD_RESPONSE_HEADERS: &[&str] = &["content-type", "content-encoding", "cache-control"];

pub(super) fn router(ctx: ProxyContext) -> Router {
    Router::new()
        .route("/git/:owner/:repo/info/refs", get(info_refs))
        .route(&format!("/git/:owner/:repo/{UPLOAD_PACK}"), post(upload_pack))
        .route(&format!("/git/:owner/:repo/{RECEIVE_PACK}"), post(receive_pack))
        .route("/git/:owner/:repo/*rest", any(unsupported))
        .with_state(ctx)
}

async fn info_refs(
    State(ctx): State<ProxyContext>,
    Path((owner, repo)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let query = query.unwrap_or_default();
    let service = query
        .split('&')
        .find_map(|kv| kv.strip_prefix("service="))
        .unwrap_or_default();
    if service != UPLOAD_PACK && service != RECEIVE_PACK {
        return ProxyError::NotSupported(format!(
            "info/refs requires service={UPLOAD_PACK} or service={RECEIVE_PACK}"
        ))
        .into_response();
    }
    let service = service.to_string();

    proxy(
        ctx,
        &owner,
        &repo,
        "info/refs",
        Some(&query),
        reqwest::Method::GET,
        &headers,
        None,
        &service,
    )
    .await
}

async fn upload_pack(
    State(ctx): State<ProxyContext>,
    Path((owner, repo)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    proxy(
        ctx,
        &owner,
        &repo,
        UPLOAD_PACK,
        None,
        reqwest::Method::POST,
        &headers,
        Some(body),
        UPLOAD_PACK,
    )
    .await
}

async fn receive_pack(
    State(ctx): State<ProxyContext>,
    Path((owner, repo)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    proxy(
        ctx,
        &owner,
        &repo,
        RECEIVE_PACK,
        None,
        reqwest::Method::POST,
        &headers,
        Some(body),
        RECEIVE_PACK,
    )
    .await
}

/// Everything under the repo prefix outside the smart-protocol trio
/// (LFS batch endpoints and friends).
async fn unsupported(Path((owner, repo, rest)): Path<(String, String, String)>) -> Response {
    ProxyError::NotSupported(format!("/git/{owner}/{repo}/{rest}")).into_response()
}

#[allow(clippy::too_many_arguments)]
async fn proxy(
    ctx: ProxyContext,
    owner: &str,
    repo_segment: &str,
    subpath: &str,
    query: Option<&str>,
    method: reqwest::Method,
    headers: &HeaderMap,
    body: Option<Body>,
    service: &str,
) -> Response {
    let Some(repo) = repo_segment.strip_suffix(".git") else {
        return ProxyError::NotSupported(format!("/git/{owner}/{repo_segment}")).into_response();
    };
    let resource = format!("{owner}/{repo}");

    let credential = ctx
        .config
        .plugin(super::NAME)
        .and_then(|config| select_credential(&resource, config));
    let Some(credential) = credential else {
        audit(AuditEvent::CliRejected {
            tool: "git".into(),
            resource: resource.clone(),
            reason: "no credential".into(),
        });
        return ProxyError::NoCredential {
            tool: "git".into(),
            resource,
        }
        .into_response();
    };
    let Some(token) = credential.env_str(TOKEN_ENV) else {
        return ProxyError::NoCredential {
            tool: "git".into(),
            resource,
        }
        .into_response();
    };

    let base = ctx
        .config
        .plugin(super::NAME)
        .and_then(|c| c.extra_str("github_base_url"))
        .unwrap_or(DEFAULT_BASE_URL);
    let mut url = format!("{base}/{owner}/{repo}.git/{subpath}");
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }

    let authorization = format!(
        "Basic {}",
        BASE64.encode(format!("{BASIC_AUTH_USER}:{token}"))
    );

    let mut request = ctx
        .client
        .request(method, &url)
        .header(reqwest::header::AUTHORIZATION, authorization);
    for name in FORWARD_REQUEST_HEADERS {
        if let Some(value) = headers.get(*name) {
            request = request.header(*name, value.as_bytes());
        }
    }
    if let Some(body) = body {
        request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    // The http timeout bounds the upstream's time-to-first-byte; pack
    // transfers stream for as long as both ends keep the pipe moving.
    let started = Instant::now();
    let upstream = match tokio::time::timeout(ctx.config.timeouts.http, request.send()).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            return ProxyError::UpstreamUnavailable(redact::mask(&e.to_string())).into_response();
        }
        Err(_) => {
            return ProxyError::UpstreamUnavailable(format!(
                "upstream did not respond within {}s",
                ctx.config.timeouts.http.as_secs()
            ))
            .into_response();
        }
    };

    let status = upstream.status().as_u16();
    debug!(resource = %resource, service, status, "proxied git request");
    audit(AuditEvent::GitProxied {
        resource,
        service: service.to_string(),
        status,
        duration_ms: started.elapsed().as_millis() as u64,
    });

    let mut builder =
        Response::builder().status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY));
    for name in FORWARD_RESPONSE_HEADERS {
        if let Some(value) = upstream.headers().get(*name) {
            builder = builder.header(*name, value.as_bytes());
        }
    }
    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}
