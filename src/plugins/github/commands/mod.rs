//! Custom commands intercepted before subprocess execution.
//!
//! Each command sees the argv tail after its own name. Commands covering
//! ground the gh CLI lacks (`discussion`, `sub-issue`) always complete;
//! the partial-edit commands (`issue`, `pr`) claim only their `--old/--new`
//! form and decline everything else so it falls through to the real CLI.

pub mod discussion;
pub mod issue;
pub mod pr;
pub mod sub_issue;

use std::time::Duration;

use reqwest::{header, Method};
use serde_json::Value;

use crate::exec::CliResult;
use crate::logging::redact;
use crate::plugins::{CommandOutcome, Credential, ProxyContext};

use super::credential::TOKEN_ENV;
use super::graphql::ApiError;

/// Default REST endpoint. Overridable per plugin config for tests.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// REST endpoint for this deployment (plugin config override or default).
pub(crate) fn api_url(ctx: &ProxyContext) -> &str {
    ctx.config
        .plugin(super::NAME)
        .and_then(|c| c.extra_str("api_url"))
        .unwrap_or(DEFAULT_API_URL)
}

/// GraphQL endpoint for this deployment (plugin config override or default).
pub(crate) fn graphql_url(ctx: &ProxyContext) -> &str {
    ctx.config
        .plugin(super::NAME)
        .and_then(|c| c.extra_str("graphql_url"))
        .unwrap_or(super::graphql::DEFAULT_GRAPHQL_URL)
}

/// Route one custom command. `args` excludes the command name.
pub(super) async fn dispatch(
    name: &str,
    args: &[String],
    resource: &str,
    credential: &Credential,
    ctx: &ProxyContext,
) -> CommandOutcome {
    match name {
        "discussion" => {
            CommandOutcome::Completed(discussion::execute(args, resource, credential, ctx).await)
        }
        "issue" => issue::execute(args, resource, credential, ctx).await,
        "pr" => pr::execute(args, resource, credential, ctx).await,
        "sub-issue" => {
            CommandOutcome::Completed(sub_issue::execute(args, resource, credential, ctx).await)
        }
        _ => CommandOutcome::Declined,
    }
}

/// Convert a command result into the response shape, masking diagnostics.
pub(crate) fn into_cli_result(result: Result<CliResult, ApiError>) -> CliResult {
    result.unwrap_or_else(|e| CliResult::error(redact::mask(&e.to_string())))
}

/// Split an `owner/repo` resource.
pub(crate) fn split_resource(resource: &str) -> Result<(&str, &str), ApiError> {
    resource
        .split_once('/')
        .ok_or_else(|| ApiError::command(format!("invalid repository resource: {resource}")))
}

pub(crate) fn token_of(credential: &Credential) -> Result<&str, ApiError> {
    credential
        .env_str(TOKEN_ENV)
        .ok_or_else(|| ApiError::command("credential envelope has no token"))
}

pub(crate) fn parse_number(s: &str) -> Result<i64, ApiError> {
    s.parse()
        .map_err(|_| ApiError::command(format!("invalid number: {s}")))
}

/// One credential's view of the REST endpoint.
pub(crate) struct RestClient<'a> {
    pub client: &'a reqwest::Client,
    pub api_url: &'a str,
    pub token: &'a str,
    pub timeout: Duration,
}

impl RestClient<'_> {
    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{path}", self.api_url);
        let mut request = self
            .client
            .request(method, url)
            .timeout(self.timeout)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?.json().await?)
    }
}

/// Flags shared by the partial-edit commands.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct EditFlags {
    pub positional: Vec<String>,
    pub old: Option<String>,
    pub new: Option<String>,
    pub replace_all: bool,
    pub title: Option<String>,
}

pub(crate) fn has_old_and_new(args: &[String]) -> bool {
    args.iter().any(|a| a == "--old") && args.iter().any(|a| a == "--new")
}

/// Parse `--old`, `--new`, `--replace-all`, `--title`; anything else is
/// positional.
pub(crate) fn parse_edit_flags(args: &[String]) -> Result<EditFlags, ApiError> {
    let mut flags = EditFlags::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--old" => {
                flags.old = Some(flag_value(args, i, "--old")?);
                i += 2;
            }
            "--new" => {
                flags.new = Some(flag_value(args, i, "--new")?);
                i += 2;
            }
            "--title" => {
                flags.title = Some(flag_value(args, i, "--title")?);
                i += 2;
            }
            "--replace-all" => {
                flags.replace_all = true;
                i += 1;
            }
            _ => {
                flags.positional.push(args[i].clone());
                i += 1;
            }
        }
    }
    Ok(flags)
}

fn flag_value(args: &[String], i: usize, flag: &str) -> Result<String, ApiError> {
    args.get(i + 1)
        .cloned()
        .ok_or_else(|| ApiError::command(format!("{flag} requires a value")))
}

/// Replace `old` with `new` in `body`.
///
/// Fails if `old` is absent, or ambiguous without `--replace-all`.
pub(crate) fn partial_replace(
    body: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> Result<String, ApiError> {
    let count = body.matches(old).count();

    if count == 0 {
        return Err(ApiError::command("old string not found in body"));
    }
    if count > 1 && !replace_all {
        return Err(ApiError::command(format!(
            "old string found {count} times in body (use --replace-all to replace all occurrences)"
        )));
    }

    if replace_all {
        Ok(body.replace(old, new))
    } else {
        Ok(body.replacen(old, new, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_edit_flags_full() {
        let flags =
            parse_edit_flags(&argv(&["42", "--old", "a", "--new", "b", "--replace-all"])).unwrap();
        assert_eq!(flags.positional, vec!["42"]);
        assert_eq!(flags.old.as_deref(), Some("a"));
        assert_eq!(flags.new.as_deref(), Some("b"));
        assert!(flags.replace_all);
        assert!(flags.title.is_none());
    }

    #[test]
    fn test_parse_edit_flags_title() {
        let flags =
            parse_edit_flags(&argv(&["7", "--old", "x", "--new", "y", "--title", "T"])).unwrap();
        assert_eq!(flags.title.as_deref(), Some("T"));
    }

    #[test]
    fn test_parse_edit_flags_positionals_interleaved() {
        // The partial-edit callers (issue, pr) pass the number anywhere in
        // the tail; discussion edits never route through these flags.
        let flags =
            parse_edit_flags(&argv(&["--old", "a", "42", "--new", "b", "--unknown"])).unwrap();
        assert_eq!(flags.positional, vec!["42", "--unknown"]);
        assert_eq!(flags.old.as_deref(), Some("a"));
        assert_eq!(flags.new.as_deref(), Some("b"));
        assert!(!flags.replace_all);
    }

    #[test]
    fn test_parse_edit_flags_missing_value() {
        let err = parse_edit_flags(&argv(&["42", "--old"])).unwrap_err();
        assert_eq!(err.to_string(), "--old requires a value");
    }

    #[test]
    fn test_has_old_and_new() {
        assert!(has_old_and_new(&argv(&["1", "--old", "a", "--new", "b"])));
        assert!(!has_old_and_new(&argv(&["1", "--old", "a"])));
        assert!(!has_old_and_new(&argv(&["1", "--body", "b"])));
    }

    #[test]
    fn test_partial_replace_single() {
        let out = partial_replace("a b c", "b", "x", false).unwrap();
        assert_eq!(out, "a x c");
    }

    #[test]
    fn test_partial_replace_not_found() {
        let err = partial_replace("a b c", "z", "x", false).unwrap_err();
        assert_eq!(err.to_string(), "old string not found in body");
    }

    #[test]
    fn test_partial_replace_ambiguous() {
        let err = partial_replace("b b", "b", "x", false).unwrap_err();
        assert!(err.to_string().contains("found 2 times"));
        assert!(err.to_string().contains("--replace-all"));
    }

    #[test]
    fn test_partial_replace_all() {
        let out = partial_replace("b b b", "b", "x", true).unwrap();
        assert_eq!(out, "x x x");
    }

    #[test]
    fn test_split_resource() {
        assert_eq!(split_resource("acme/widgets").unwrap(), ("acme", "widgets"));
        assert!(split_resource("default").is_err());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42").unwrap(), 42);
        assert!(parse_number("abc").is_err());
    }
}
