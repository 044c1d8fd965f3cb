//! Google Workspace plugin: gog CLI execution and keyring health probes.
//!
//! No custom routes and no custom commands; every invocation runs the real
//! CLI with the keyring password injected.

pub mod credential;

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{json, Value};

use crate::config::{CredentialEntry, PluginConfig};
use crate::exec::execute_cli;
use crate::logging::redact;
use crate::plugins::{Credential, Plugin, ProxyContext};

use credential::{ACCOUNT_ENV, KEYRING_ENV};

pub const NAME: &str = "google";

pub struct GooglePlugin;

#[async_trait]
impl Plugin for GooglePlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn tools(&self) -> &'static [&'static str] {
        &["gog"]
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["keyring_password"]
    }

    fn select_credential(&self, resource: &str, config: &PluginConfig) -> Option<Credential> {
        credential::select_credential(resource, config)
    }

    async fn health_check(&self, config: &PluginConfig, ctx: &ProxyContext) -> Vec<Value> {
        let probes = config
            .credentials
            .iter()
            .map(|entry| probe_credential(ctx, entry));
        join_all(probes).await
    }
}

/// Probe one keyring credential by listing accounts through the real CLI.
/// Valid iff the binary runs and exits zero; account emails are masked.
async fn probe_credential(ctx: &ProxyContext, entry: &CredentialEntry) -> Value {
    let resources = &entry.resources;
    let Some(keyring_password) = entry.field_str("keyring_password") else {
        return json!({
            "valid": false,
            "error": "credential entry missing keyring_password",
            "resources": resources,
        });
    };
    let masked = redact::mask_value(keyring_password);

    let mut env = HashMap::new();
    env.insert(KEYRING_ENV.to_string(), keyring_password.to_string());
    if let Some(account) = entry.field_str("account") {
        env.insert(ACCOUNT_ENV.to_string(), account.to_string());
    }

    let args = vec!["auth".to_string(), "list".to_string()];
    let result = execute_cli("gog", &args, &env, ctx.config.timeouts.http, None).await;

    if result.exit_code == 0 {
        json!({
            "valid": true,
            "accounts": redact::mask_emails(result.stdout.trim()),
            "masked_keyring_password": masked,
            "resources": resources,
        })
    } else {
        let diagnostic = if result.stderr.trim().is_empty() {
            result.stdout.trim().to_string()
        } else {
            result.stderr.trim().to_string()
        };
        json!({
            "valid": false,
            "error": redact::mask(&diagnostic),
            "masked_keyring_password": masked,
            "resources": resources,
        })
    }
}
