//! Credential selection for Google Workspace accounts.

use crate::config::PluginConfig;
use crate::plugins::{match_resource, Credential};

/// Env var unlocking the gog CLI's credential keyring.
pub const KEYRING_ENV: &str = "GOG_KEYRING_PASSWORD";

/// Env var selecting the gog account when a credential pins one.
pub const ACCOUNT_ENV: &str = "GOG_ACCOUNT";

/// First-match-wins over the ordered credentials list. The resource is an
/// opaque account tag ("default" is common).
pub fn select_credential(resource: &str, config: &PluginConfig) -> Option<Credential> {
    for entry in &config.credentials {
        let Some(keyring_password) = entry.field_str("keyring_password") else {
            continue;
        };
        for pattern in &entry.resources {
            if match_resource(pattern, resource) {
                let mut credential =
                    Credential::from_env([(KEYRING_ENV, keyring_password)]);
                if let Some(account) = entry.field_str("account") {
                    credential
                        .env
                        .insert(ACCOUNT_ENV.to_string(), account.to_string());
                }
                return Some(credential);
            }
        }
    }
    None
}
