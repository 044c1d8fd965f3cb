//! HTTP router: command dispatch, liveness, and credential status.
//!
//! `POST /cli` runs the four-step pipeline — resolve plugin, select
//! credential, consult the custom-command layer, execute the subprocess —
//! strictly in order. Plugin-contributed routers (the git proxy) merge in at
//! build time.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::exec::{execute_cli, CliResult};
use crate::logging::audit::{audit, AuditEvent};
use crate::plugins::{CommandOutcome, PluginRegistry, ProxyContext};
use crate::policy;
use crate::server::error::ProxyError;
use crate::server::status::handle_auth_status;

/// Shared state for the core handlers.
#[derive(Clone)]
pub struct AppState {
    pub ctx: ProxyContext,
    pub registry: Arc<PluginRegistry>,
}

/// Build the full application router, plugin routes included.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/cli", post(handle_cli))
        .route("/health", get(handle_health))
        .route("/auth/status", get(handle_auth_status))
        .with_state(state.clone());

    for plugin in state.registry.iter() {
        if let Some(routes) = plugin.routes(state.ctx.clone()) {
            router = router.merge(routes);
        }
    }

    router
}

#[derive(Debug, Deserialize)]
struct CliRequest {
    tool: String,
    #[serde(default)]
    args: Vec<String>,
    resource: String,
}

async fn handle_cli(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CliResult>, ProxyError> {
    let request: CliRequest = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::BadRequest(format!("invalid request body: {e}")))?;
    if request.tool.is_empty() {
        return Err(ProxyError::BadRequest("missing 'tool' field".into()));
    }
    if request.resource.is_empty() {
        return Err(ProxyError::BadRequest("missing 'resource' field".into()));
    }

    let plugin = state
        .registry
        .plugin_for_tool(&request.tool)
        .ok_or_else(|| {
            audit(AuditEvent::CliRejected {
                tool: request.tool.clone(),
                resource: request.resource.clone(),
                reason: "unknown tool".into(),
            });
            ProxyError::UnknownTool(request.tool.clone())
        })?;

    let command = request.args.first().map(String::as_str).unwrap_or("");

    if !policy::evaluate(&request.tool, command, &request.resource) {
        audit(AuditEvent::CliRejected {
            tool: request.tool.clone(),
            resource: request.resource.clone(),
            reason: "policy denied".into(),
        });
        return Err(ProxyError::PolicyDenied {
            tool: request.tool.clone(),
            resource: request.resource.clone(),
        });
    }

    let plugin_config = state.ctx.config.plugin(plugin.name());
    let credential = plugin_config
        .and_then(|config| plugin.select_credential(&request.resource, config))
        .ok_or_else(|| {
            audit(AuditEvent::CliRejected {
                tool: request.tool.clone(),
                resource: request.resource.clone(),
                reason: "no credential".into(),
            });
            ProxyError::NoCredential {
                tool: request.tool.clone(),
                resource: request.resource.clone(),
            }
        })?;

    let started = Instant::now();

    if !command.is_empty() && plugin.commands().contains(&command) {
        let outcome = plugin
            .run_command(
                command,
                &request.args[1..],
                &request.resource,
                &credential,
                &state.ctx,
            )
            .await;
        if let CommandOutcome::Completed(result) = outcome {
            record_dispatch(&request, &result, started, "command");
            return Ok(Json(result));
        }
        // Declined: fall through to the real CLI.
    }

    let result = execute_cli(
        &request.tool,
        &request.args,
        &credential.env,
        state.ctx.config.timeouts.cli,
        None,
    )
    .await;
    record_dispatch(&request, &result, started, "subprocess");
    Ok(Json(result))
}

fn record_dispatch(request: &CliRequest, result: &CliResult, started: Instant, via: &str) {
    info!(
        tool = %request.tool,
        resource = %request.resource,
        exit_code = result.exit_code,
        via,
        "dispatched"
    );
    audit(AuditEvent::CliDispatched {
        tool: request.tool.clone(),
        resource: request.resource.clone(),
        argv_shape: argv_shape(&request.args),
        exit_code: result.exit_code,
        duration_ms: started.elapsed().as_millis() as u64,
        via: via.to_string(),
    });
}

/// First argv token plus the remaining-arg count; never argument values.
fn argv_shape(args: &[String]) -> String {
    match args.first() {
        None => "(none)".to_string(),
        Some(first) => format!("{first} (+{} args)", args.len() - 1),
    }
}

/// Liveness. No credential is touched on this path.
async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
