//! Plugin registry and the credential-selection primitives shared by all
//! plugins.
//!
//! A plugin owns a disjoint set of CLI tool names and knows how to turn a
//! `(resource, config slice)` pair into a credential envelope. It may also
//! contribute HTTP routes (the github plugin's git proxy), custom commands
//! that intercept a dispatch before the subprocess, and a health probe for
//! `/auth/status`. The built-in set is fixed at compile time; the registry
//! is built once at startup from the plugins that have configuration.

pub mod github;
pub mod google;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use serde_json::Value;

use crate::config::{Config, ConfigError, PluginConfig};
use crate::exec::CliResult;

/// Environment overlay derived from a credential entry.
///
/// Never serialized and never logged; only the derived artifacts (subprocess
/// env, outbound Authorization header) leave the process. `Debug` shows key
/// names only.
#[derive(Clone, Default)]
pub struct Credential {
    pub env: HashMap<String, String>,
}

impl Credential {
    pub fn from_env<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            env: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn env_str(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.env.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Credential").field("env", &keys).finish()
    }
}

/// What a custom-command handler decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The handler did not claim this invocation; run the real CLI.
    Declined,
    /// Final result; no subprocess is spawned.
    Completed(CliResult),
}

/// Shared request-path dependencies handed to plugins: the immutable
/// configuration and the pooled outbound HTTP client.
#[derive(Clone)]
pub struct ProxyContext {
    pub config: Arc<Config>,
    pub client: reqwest::Client,
}

impl ProxyContext {
    pub fn new(config: Arc<Config>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("credgate/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build outbound HTTP client");
        Self { config, client }
    }
}

#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable plugin identifier (also the config key).
    fn name(&self) -> &'static str;

    /// CLI binaries this plugin handles. Disjoint across plugins.
    fn tools(&self) -> &'static [&'static str];

    /// Secret fields every credential entry must carry.
    fn required_fields(&self) -> &'static [&'static str];

    /// Walk the plugin's ordered credential list and return the envelope for
    /// the first entry with a matching pattern. Never suspends.
    fn select_credential(&self, resource: &str, config: &PluginConfig) -> Option<Credential>;

    /// Extra HTTP routes contributed by this plugin.
    fn routes(&self, _ctx: ProxyContext) -> Option<Router> {
        None
    }

    /// Names of custom commands intercepted before subprocess execution.
    fn commands(&self) -> &'static [&'static str] {
        &[]
    }

    /// Run a custom command. `args` excludes the command name itself.
    async fn run_command(
        &self,
        _name: &str,
        _args: &[String],
        _resource: &str,
        _credential: &Credential,
        _ctx: &ProxyContext,
    ) -> CommandOutcome {
        CommandOutcome::Declined
    }

    /// Probe every configured credential. One JSON object per entry, in
    /// configuration order, secrets masked.
    async fn health_check(&self, _config: &PluginConfig, _ctx: &ProxyContext) -> Vec<Value> {
        Vec::new()
    }
}

/// Match one resource pattern against a resource.
///
/// Three forms, anchored on the whole string, ASCII case-insensitive:
/// an exact literal, an owner wildcard (`owner/*`), or `*`.
pub fn match_resource(pattern: &str, resource: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        let Some((owner, _)) = resource.split_once('/') else {
            return false;
        };
        return owner.eq_ignore_ascii_case(prefix);
    }
    pattern.eq_ignore_ascii_case(resource)
}

/// Whether a configured pattern is one of the three supported forms.
pub fn pattern_is_valid(pattern: &str) -> bool {
    const META: &[char] = &['*', '?', '['];
    if pattern.is_empty() {
        return false;
    }
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return !prefix.is_empty() && !prefix.contains(META);
    }
    !pattern.contains(META)
}

/// The built-in plugin set.
pub fn builtin() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(github::GitHubPlugin),
        Arc::new(google::GooglePlugin),
    ]
}

/// Read-only plugin registry: the built-in plugins that have configuration,
/// with tool-name disjointness verified.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn build(config: &Config) -> Result<Self, ConfigError> {
        let plugins: Vec<Arc<dyn Plugin>> = builtin()
            .into_iter()
            .filter(|p| config.plugin(p.name()).is_some())
            .collect();

        let mut claimed: HashMap<&str, &str> = HashMap::new();
        for plugin in &plugins {
            for tool in plugin.tools() {
                if let Some(first) = claimed.insert(tool, plugin.name()) {
                    return Err(ConfigError::DuplicateTool {
                        first: first.to_string(),
                        second: plugin.name().to_string(),
                        tool: tool.to_string(),
                    });
                }
            }
        }

        Ok(Self { plugins })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    pub fn plugin_for_tool(&self, tool: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.tools().contains(&tool))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
