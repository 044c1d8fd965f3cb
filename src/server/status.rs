//! Credential health aggregation for `GET /auth/status`.
//!
//! Probes run concurrently across plugins and across credentials, each one
//! bounded by the http timeout inside the plugin. Probe failures are data in
//! the response, never a non-200: the endpoint reports on credentials, it
//! does not depend on them.

use axum::extract::State;
use axum::Json;
use futures_util::future::join_all;
use serde_json::{json, Value};

use crate::server::http::AppState;

pub(super) async fn handle_auth_status(State(state): State<AppState>) -> Json<Value> {
    let probes = state.registry.iter().map(|plugin| {
        let plugin = plugin.clone();
        let ctx = state.ctx.clone();
        async move {
            let statuses = match ctx.config.plugin(plugin.name()) {
                Some(config) => plugin.health_check(config, &ctx).await,
                None => Vec::new(),
            };
            (plugin.name(), statuses)
        }
    });

    let mut plugins = serde_json::Map::new();
    for (name, statuses) in join_all(probes).await {
        plugins.insert(name.to_string(), Value::Array(statuses));
    }

    Json(json!({ "status": "ok", "plugins": plugins }))
}
