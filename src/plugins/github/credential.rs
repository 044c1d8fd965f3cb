//! Credential selection for GitHub resources.

use crate::config::PluginConfig;
use crate::plugins::{match_resource, Credential};

/// Env var the gh CLI reads its token from.
pub const TOKEN_ENV: &str = "GH_TOKEN";

/// Env var pinning the gh CLI to the canonical host.
pub const HOST_ENV: &str = "GH_HOST";

pub const HOST: &str = "github.com";

/// First-match-wins over the ordered credentials list; within one entry,
/// patterns are tried in order.
pub fn select_credential(resource: &str, config: &PluginConfig) -> Option<Credential> {
    for entry in &config.credentials {
        for pattern in &entry.resources {
            if match_resource(pattern, resource) {
                let token = entry.field_str("token")?;
                return Some(Credential::from_env([
                    (TOKEN_ENV, token),
                    (HOST_ENV, HOST),
                ]));
            }
        }
    }
    None
}
