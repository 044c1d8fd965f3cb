//! GitHub plugin: gh CLI execution, git smart-HTTP reverse proxy, custom
//! commands for the API surface gh lacks, and credential health probes.

pub mod commands;
pub mod credential;
pub mod git_proxy;
pub mod graphql;

use async_trait::async_trait;
use axum::Router;
use futures_util::future::join_all;
use reqwest::header;
use serde_json::{json, Value};

use crate::config::{CredentialEntry, PluginConfig};
use crate::logging::redact;
use crate::plugins::{CommandOutcome, Credential, Plugin, ProxyContext};

pub const NAME: &str = "github";

pub struct GitHubPlugin;

#[async_trait]
impl Plugin for GitHubPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn tools(&self) -> &'static [&'static str] {
        &["gh"]
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["token"]
    }

    fn select_credential(&self, resource: &str, config: &PluginConfig) -> Option<Credential> {
        credential::select_credential(resource, config)
    }

    fn routes(&self, ctx: ProxyContext) -> Option<Router> {
        Some(git_proxy::router(ctx))
    }

    fn commands(&self) -> &'static [&'static str] {
        &["discussion", "issue", "pr", "sub-issue"]
    }

    async fn run_command(
        &self,
        name: &str,
        args: &[String],
        resource: &str,
        credential: &Credential,
        ctx: &ProxyContext,
    ) -> CommandOutcome {
        commands::dispatch(name, args, resource, credential, ctx).await
    }

    async fn health_check(&self, config: &PluginConfig, ctx: &ProxyContext) -> Vec<Value> {
        let api_url = config
            .extra_str("api_url")
            .unwrap_or(commands::DEFAULT_API_URL);
        let probes = config
            .credentials
            .iter()
            .map(|entry| probe_credential(ctx, api_url, entry));
        join_all(probes).await
    }
}

/// One cheap authenticated call per credential: `GET /user`. Reports token
/// validity, the login it belongs to, scopes, and the rate-limit headroom —
/// with the token masked to its display prefix.
async fn probe_credential(ctx: &ProxyContext, api_url: &str, entry: &CredentialEntry) -> Value {
    let resources = &entry.resources;
    let Some(token) = entry.field_str("token") else {
        return json!({
            "valid": false,
            "error": "credential entry missing token",
            "resources": resources,
        });
    };
    let masked_token = redact::mask_value(token);

    let response = ctx
        .client
        .get(format!("{api_url}/user"))
        .timeout(ctx.config.timeouts.http)
        .header(header::AUTHORIZATION, format!("token {token}"))
        .send()
        .await;

    match response {
        Ok(response) if response.status().is_success() => {
            let scopes = header_str(&response, "x-oauth-scopes");
            let rate_limit_remaining = header_str(&response, "x-ratelimit-remaining");
            let body: Value = response.json().await.unwrap_or(Value::Null);
            json!({
                "valid": true,
                "user": body["login"].as_str().unwrap_or(""),
                "scopes": scopes,
                "rate_limit_remaining": rate_limit_remaining,
                "masked_token": masked_token,
                "resources": resources,
            })
        }
        Ok(response) => json!({
            "valid": false,
            "error": format!("HTTP {}", response.status().as_u16()),
            "masked_token": masked_token,
            "resources": resources,
        }),
        Err(e) => json!({
            "valid": false,
            "error": redact::mask(&e.to_string()),
            "masked_token": masked_token,
            "resources": resources,
        }),
    }
}

fn header_str(response: &reqwest::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}
