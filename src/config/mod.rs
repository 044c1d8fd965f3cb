//! Configuration loading and validation.
//!
//! The configuration is a single JSON5 document. Loading stats the file and
//! refuses anything whose permission bits grant group or world access, then
//! parses and validates the schema against the built-in plugin set. The
//! result is immutable for the lifetime of the process; a restart is
//! required to pick up changes.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::logging::redact::SECRET_KEYS;
use crate::plugins;

/// Default bind port.
pub const DEFAULT_PORT: u16 = 8766;

/// Default subprocess timeout in seconds.
pub const DEFAULT_CLI_TIMEOUT_SECS: u64 = 60;

/// Default outbound HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Configuration errors. All of these are startup-fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to read config file {path}: {source}")]
    Io { path: String, source: io::Error },

    #[error("config file {path} has too-open permissions ({mode:03o}); run: chmod 600 {path}")]
    Permissions { path: String, mode: u32 },

    #[error("invalid JSON5 in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("unknown plugin in config: {name}")]
    UnknownPlugin { name: String },

    #[error("{0}")]
    Malformed(String),

    #[error("plugins '{first}' and '{second}' both claim tool '{tool}'")]
    DuplicateTool {
        first: String,
        second: String,
        tool: String,
    },
}

/// Per-class request timeouts.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Bound on one CLI subprocess run.
    pub cli: Duration,
    /// Bound on one outbound HTTP request (and on each health probe).
    pub http: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            cli: Duration::from_secs(DEFAULT_CLI_TIMEOUT_SECS),
            http: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// One credential record: its raw fields plus the ordered resource patterns
/// it is scoped to. Field values are only ever read by the owning plugin and
/// by the secret collector; they are never serialized back out. `Debug`
/// shows field names only.
#[derive(Clone)]
pub struct CredentialEntry {
    fields: Map<String, Value>,
    pub resources: Vec<String>,
}

impl std::fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("resources", &self.resources)
            .finish()
    }
}

impl CredentialEntry {
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    fn secret_values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|(k, v)| {
            if SECRET_KEYS.contains(&k.as_str()) {
                v.as_str().filter(|s| !s.is_empty())
            } else {
                None
            }
        })
    }
}

/// Config slice for one plugin: the ordered credential list plus any
/// plugin-specific keys (upstream URL overrides and the like).
#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    pub credentials: Vec<CredentialEntry>,
    extra: Map<String, Value>,
}

impl PluginConfig {
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Immutable proxy configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub timeouts: Timeouts,
    /// JSONL audit sink; audit events go to tracing only when absent.
    pub audit_log: Option<PathBuf>,
    plugins: Vec<(String, PluginConfig)>,
}

impl Config {
    pub fn plugin(&self, name: &str) -> Option<&PluginConfig> {
        self.plugins
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|(n, _)| n.as_str())
    }

    /// Every secret value in the configuration, for the masker.
    pub fn secret_values(&self) -> Vec<String> {
        self.plugins
            .iter()
            .flat_map(|(_, p)| p.credentials.iter())
            .flat_map(|entry| entry.secret_values().map(str::to_string))
            .collect()
    }
}

/// Load and validate configuration from a JSON5 file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let display = path.display().to_string();

    let metadata = std::fs::metadata(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: display.clone(),
            }
        } else {
            ConfigError::Io {
                path: display.clone(),
                source: e,
            }
        }
    })?;
    check_permissions(&display, &metadata)?;

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: display.clone(),
        source: e,
    })?;

    let value: Value = json5::from_str(&content).map_err(|e| ConfigError::Parse {
        path: display,
        message: e.to_string(),
    })?;

    from_value(value)
}

/// Refuse config files readable by group or world.
#[cfg(unix)]
fn check_permissions(path: &str, metadata: &std::fs::Metadata) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(ConfigError::Permissions {
            path: path.to_string(),
            mode,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &str, _metadata: &std::fs::Metadata) -> Result<(), ConfigError> {
    Ok(())
}

/// Validate a parsed configuration document.
pub fn from_value(value: Value) -> Result<Config, ConfigError> {
    let Value::Object(root) = value else {
        return Err(ConfigError::Malformed("config must be a JSON object".into()));
    };

    let port = match root.get("port") {
        None => DEFAULT_PORT,
        Some(v) => v
            .as_u64()
            .filter(|p| (1..=u64::from(u16::MAX)).contains(p))
            .map(|p| p as u16)
            .ok_or_else(|| ConfigError::Malformed("'port' must be an integer in 1..=65535".into()))?,
    };

    let timeouts = parse_timeouts(root.get("timeouts"))?;

    let audit_log = match root.get("audit_log") {
        None => None,
        Some(v) => Some(PathBuf::from(v.as_str().ok_or_else(|| {
            ConfigError::Malformed("'audit_log' must be a string path".into())
        })?)),
    };

    let mut plugins = Vec::new();
    if let Some(section) = root.get("plugins") {
        let Value::Object(map) = section else {
            return Err(ConfigError::Malformed("'plugins' must be an object".into()));
        };
        for (name, plugin_value) in map {
            let plugin = plugins::builtin()
                .into_iter()
                .find(|p| p.name() == name)
                .ok_or_else(|| ConfigError::UnknownPlugin { name: name.clone() })?;
            plugins.push((
                name.clone(),
                parse_plugin_config(name, plugin_value, plugin.required_fields())?,
            ));
        }
    }

    Ok(Config {
        port,
        timeouts,
        audit_log,
        plugins,
    })
}

fn parse_timeouts(value: Option<&Value>) -> Result<Timeouts, ConfigError> {
    let Some(value) = value else {
        return Ok(Timeouts::default());
    };
    let Value::Object(map) = value else {
        return Err(ConfigError::Malformed("'timeouts' must be an object".into()));
    };

    let mut timeouts = Timeouts::default();
    for (key, slot) in [("cli", &mut timeouts.cli), ("http", &mut timeouts.http)] {
        if let Some(v) = map.get(key) {
            let secs = v.as_u64().filter(|s| *s > 0).ok_or_else(|| {
                ConfigError::Malformed(format!("'timeouts.{key}' must be a positive integer"))
            })?;
            *slot = Duration::from_secs(secs);
        }
    }
    Ok(timeouts)
}

fn parse_plugin_config(
    name: &str,
    value: &Value,
    required_fields: &[&str],
) -> Result<PluginConfig, ConfigError> {
    let Value::Object(map) = value else {
        return Err(ConfigError::Malformed(format!(
            "plugin config '{name}' must be an object"
        )));
    };

    let mut credentials = Vec::new();
    if let Some(creds) = map.get("credentials") {
        let Value::Array(items) = creds else {
            return Err(ConfigError::Malformed(format!(
                "plugin '{name}' credentials must be an array"
            )));
        };
        for (i, item) in items.iter().enumerate() {
            credentials.push(parse_credential_entry(name, i, item, required_fields)?);
        }
    }

    let mut extra = map.clone();
    extra.remove("credentials");

    Ok(PluginConfig { credentials, extra })
}

fn parse_credential_entry(
    plugin: &str,
    index: usize,
    value: &Value,
    required_fields: &[&str],
) -> Result<CredentialEntry, ConfigError> {
    let Value::Object(fields) = value else {
        return Err(ConfigError::Malformed(format!(
            "plugin '{plugin}' credential {index} must be an object"
        )));
    };

    for field in required_fields {
        let present = fields
            .get(*field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !present {
            return Err(ConfigError::Malformed(format!(
                "plugin '{plugin}' credential {index} missing '{field}'"
            )));
        }
    }

    let resources = fields
        .get("resources")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ConfigError::Malformed(format!(
                "plugin '{plugin}' credential {index} missing 'resources'"
            ))
        })?;
    if resources.is_empty() {
        return Err(ConfigError::Malformed(format!(
            "plugin '{plugin}' credential {index} 'resources' must not be empty"
        )));
    }

    let mut patterns = Vec::with_capacity(resources.len());
    for pattern in resources {
        let pattern = pattern.as_str().ok_or_else(|| {
            ConfigError::Malformed(format!(
                "plugin '{plugin}' credential {index} resource patterns must be strings"
            ))
        })?;
        if !plugins::pattern_is_valid(pattern) {
            return Err(ConfigError::Malformed(format!(
                "plugin '{plugin}' credential {index} has invalid resource pattern '{pattern}' \
                 (allowed: exact, 'owner/*', or '*')"
            )));
        }
        patterns.push(pattern.to_string());
    }

    let mut fields = fields.clone();
    fields.remove("resources");

    Ok(CredentialEntry {
        fields,
        resources: patterns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(doc: &str) -> Result<Config, ConfigError> {
        from_value(json5::from_str(doc).unwrap())
    }

    const GOOD: &str = r#"{
        port: 9100,
        timeouts: { cli: 5, http: 2 },
        plugins: {
            github: {
                credentials: [
                    { token: "ghp_first", resources: ["acme/*"] },
                    { token: "ghp_second", resources: ["*"] },
                ],
            },
            google: {
                credentials: [
                    { keyring_password: "pw1", account: "ops@corp.test", resources: ["default"] },
                ],
            },
        },
    }"#;

    #[test]
    fn test_full_config_parses() {
        let config = parse(GOOD).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.timeouts.cli, Duration::from_secs(5));
        assert_eq!(config.timeouts.http, Duration::from_secs(2));
        let github = config.plugin("github").unwrap();
        assert_eq!(github.credentials.len(), 2);
        assert_eq!(github.credentials[0].field_str("token"), Some("ghp_first"));
        assert_eq!(github.credentials[0].resources, vec!["acme/*"]);
        assert!(config.plugin("google").is_some());
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse(r#"{ plugins: {} }"#).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(
            config.timeouts.cli,
            Duration::from_secs(DEFAULT_CLI_TIMEOUT_SECS)
        );
        assert_eq!(
            config.timeouts.http,
            Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)
        );
        assert!(config.audit_log.is_none());
    }

    #[test]
    fn test_comments_allowed() {
        let config = parse(
            r#"{
            // bind port
            port: 8800,
            plugins: {},
        }"#,
        )
        .unwrap();
        assert_eq!(config.port, 8800);
    }

    #[test]
    fn test_unknown_plugin_rejected() {
        let err = parse(r#"{ plugins: { gitlab: { credentials: [] } } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPlugin { name } if name == "gitlab"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = parse(r#"{ timeouts: { cli: 0 }, plugins: {} }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn test_port_out_of_range_rejected() {
        let err = parse(r#"{ port: 70000, plugins: {} }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn test_missing_required_secret_field_rejected() {
        let err = parse(r#"{ plugins: { github: { credentials: [ { resources: ["*"] } ] } } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("missing 'token'"));
    }

    #[test]
    fn test_google_requires_keyring_password() {
        let err = parse(
            r#"{ plugins: { google: { credentials: [ { account: "a@b.co", resources: ["*"] } ] } } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing 'keyring_password'"));
    }

    #[test]
    fn test_empty_resources_rejected() {
        let err =
            parse(r#"{ plugins: { github: { credentials: [ { token: "t", resources: [] } ] } } }"#)
                .unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_missing_resources_rejected() {
        let err = parse(r#"{ plugins: { github: { credentials: [ { token: "t" } ] } } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("missing 'resources'"));
    }

    #[test]
    fn test_bad_pattern_shapes_rejected() {
        for pattern in ["acme/repo-?", "acme/repo-[ab]", "*/repo", "acme/mid*dle", "**"] {
            let doc = format!(
                r#"{{ plugins: {{ github: {{ credentials: [ {{ token: "t", resources: ["{pattern}"] }} ] }} }} }}"#
            );
            let err = parse(&doc).unwrap_err();
            assert!(
                matches!(err, ConfigError::Malformed(_)),
                "pattern {pattern} should be rejected"
            );
        }
    }

    #[test]
    fn test_secret_values_collected() {
        let config = parse(GOOD).unwrap();
        let secrets = config.secret_values();
        assert!(secrets.contains(&"ghp_first".to_string()));
        assert!(secrets.contains(&"ghp_second".to_string()));
        assert!(secrets.contains(&"pw1".to_string()));
        // account is metadata, not a secret
        assert!(!secrets.contains(&"ops@corp.test".to_string()));
    }

    #[test]
    fn test_credential_entry_debug_hides_values() {
        let config = parse(GOOD).unwrap();
        let printed = format!("{:?}", config.plugin("github").unwrap().credentials[0]);
        assert!(printed.contains("token"));
        assert!(!printed.contains("ghp_first"));
    }

    #[test]
    fn test_extra_keys_preserved() {
        let config = parse(
            r#"{ plugins: { github: {
                github_base_url: "http://127.0.0.1:9999",
                credentials: [ { token: "t", resources: ["*"] } ],
            } } }"#,
        )
        .unwrap();
        assert_eq!(
            config.plugin("github").unwrap().extra_str("github_base_url"),
            Some("http://127.0.0.1:9999")
        );
    }

    #[cfg(unix)]
    mod unix_permissions {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn write_config(dir: &tempfile::TempDir, mode: u32) -> std::path::PathBuf {
            let path = dir.path().join("credgate.json5");
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "{{ plugins: {{}} }}").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
            path
        }

        #[test]
        fn test_mode_0600_accepted() {
            let dir = tempfile::TempDir::new().unwrap();
            let path = write_config(&dir, 0o600);
            assert!(load_config(&path).is_ok());
        }

        #[test]
        fn test_mode_0640_rejected() {
            let dir = tempfile::TempDir::new().unwrap();
            let path = write_config(&dir, 0o640);
            let err = load_config(&path).unwrap_err();
            assert!(matches!(err, ConfigError::Permissions { mode, .. } if mode == 0o640));
        }

        #[test]
        fn test_mode_0604_rejected() {
            let dir = tempfile::TempDir::new().unwrap();
            let path = write_config(&dir, 0o604);
            assert!(matches!(
                load_config(&path).unwrap_err(),
                ConfigError::Permissions { .. }
            ));
        }

        #[test]
        fn test_missing_file_reported() {
            let err = load_config(std::path::Path::new("/nonexistent/credgate.json5")).unwrap_err();
            assert!(matches!(err, ConfigError::NotFound { .. }));
        }

        #[test]
        fn test_invalid_json5_reported() {
            let dir = tempfile::TempDir::new().unwrap();
            let path = dir.path().join("bad.json5");
            std::fs::write(&path, "{ not valid").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
            assert!(matches!(
                load_config(&path).unwrap_err(),
                ConfigError::Parse { .. }
            ));
        }
    }
}
