//! Issue command: partial body replacement via the REST API.
//!
//! Handles:
//! - `issue edit <number> --old "..." --new "..." [--replace-all]`
//! - `issue comment edit <comment-id> --old "..." --new "..." [--replace-all]`
//!
//! Everything else declines and falls through to the gh CLI.

use serde_json::json;

use crate::exec::CliResult;
use crate::plugins::{CommandOutcome, Credential, ProxyContext};

use super::super::graphql::ApiError;
use super::{
    api_url, has_old_and_new, into_cli_result, parse_edit_flags, parse_number, partial_replace,
    split_resource, token_of, EditFlags, RestClient,
};

pub async fn execute(
    args: &[String],
    resource: &str,
    credential: &Credential,
    ctx: &ProxyContext,
) -> CommandOutcome {
    let Some((subcmd, rest)) = args.split_first() else {
        return CommandOutcome::Declined;
    };

    if subcmd == "edit" && has_old_and_new(rest) {
        return CommandOutcome::Completed(into_cli_result(
            run_edit(rest, resource, credential, ctx).await,
        ));
    }

    if subcmd == "comment" && rest.first().is_some_and(|a| a == "edit") && has_old_and_new(&rest[1..])
    {
        return CommandOutcome::Completed(into_cli_result(
            run_comment_edit(&rest[1..], resource, credential, ctx).await,
        ));
    }

    CommandOutcome::Declined
}

fn rest_client<'a>(
    credential: &'a Credential,
    ctx: &'a ProxyContext,
) -> Result<RestClient<'a>, ApiError> {
    Ok(RestClient {
        client: &ctx.client,
        api_url: api_url(ctx),
        token: token_of(credential)?,
        timeout: ctx.config.timeouts.http,
    })
}

async fn run_edit(
    args: &[String],
    resource: &str,
    credential: &Credential,
    ctx: &ProxyContext,
) -> Result<CliResult, ApiError> {
    let (owner, repo) = split_resource(resource)?;
    let rest = rest_client(credential, ctx)?;
    let flags = parse_edit_flags(args)?;
    let (old, new) = old_and_new(&flags)?;

    let number = match flags.positional.first() {
        Some(raw) => parse_number(raw)
            .map_err(|_| ApiError::command(format!("Invalid issue number: {raw}")))?,
        None => return Err(ApiError::command("issue number required")),
    };

    let path = format!("/repos/{owner}/{repo}/issues/{number}");
    let issue = rest.get(&path).await?;
    let current = issue["body"].as_str().unwrap_or("");
    let updated = partial_replace(current, old, new, flags.replace_all)?;
    rest.patch(&path, &json!({ "body": updated })).await?;

    Ok(CliResult {
        exit_code: 0,
        stdout: String::new(),
        stderr: format!("Updated issue #{number}"),
    })
}

async fn run_comment_edit(
    args: &[String],
    resource: &str,
    credential: &Credential,
    ctx: &ProxyContext,
) -> Result<CliResult, ApiError> {
    let (owner, repo) = split_resource(resource)?;
    let rest = rest_client(credential, ctx)?;
    let flags = parse_edit_flags(args)?;
    let (old, new) = old_and_new(&flags)?;

    let comment_id = flags
        .positional
        .first()
        .ok_or_else(|| ApiError::command("comment ID required"))?;

    let path = format!("/repos/{owner}/{repo}/issues/comments/{comment_id}");
    let comment = rest.get(&path).await?;
    let current = comment["body"].as_str().unwrap_or("");
    let updated = partial_replace(current, old, new, flags.replace_all)?;
    rest.patch(&path, &json!({ "body": updated })).await?;

    Ok(CliResult {
        exit_code: 0,
        stdout: String::new(),
        stderr: format!("Updated comment {comment_id}"),
    })
}

pub(super) fn old_and_new(flags: &EditFlags) -> Result<(&str, &str), ApiError> {
    let old = flags
        .old
        .as_deref()
        .ok_or_else(|| ApiError::command("--old requires a value"))?;
    let new = flags
        .new
        .as_deref()
        .ok_or_else(|| ApiError::command("--new requires a value"))?;
    Ok((old, new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use std::sync::Arc;

    fn ctx() -> ProxyContext {
        let config = config::from_value(json5::from_str(r#"{ plugins: {} }"#).unwrap()).unwrap();
        ProxyContext::new(Arc::new(config))
    }

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn credential() -> Credential {
        Credential::from_env([("GH_TOKEN", "t")])
    }

    #[tokio::test]
    async fn test_plain_edit_declines() {
        let outcome = execute(&argv(&["edit", "42", "--title", "T"]), "a/b", &credential(), &ctx())
            .await;
        assert_eq!(outcome, CommandOutcome::Declined);
    }

    #[tokio::test]
    async fn test_list_declines() {
        let outcome = execute(&argv(&["list"]), "a/b", &credential(), &ctx()).await;
        assert_eq!(outcome, CommandOutcome::Declined);
    }

    #[tokio::test]
    async fn test_empty_args_decline() {
        let outcome = execute(&[], "a/b", &credential(), &ctx()).await;
        assert_eq!(outcome, CommandOutcome::Declined);
    }

    #[tokio::test]
    async fn test_edit_with_old_and_new_requires_number() {
        let outcome = execute(
            &argv(&["edit", "--old", "a", "--new", "b"]),
            "acme/widgets",
            &credential(),
            &ctx(),
        )
        .await;
        let CommandOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr, "issue number required");
    }

    #[tokio::test]
    async fn test_edit_rejects_non_numeric_issue() {
        let outcome = execute(
            &argv(&["edit", "abc", "--old", "a", "--new", "b"]),
            "acme/widgets",
            &credential(),
            &ctx(),
        )
        .await;
        let CommandOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result.stderr, "Invalid issue number: abc");
    }

    #[tokio::test]
    async fn test_comment_edit_requires_id() {
        let outcome = execute(
            &argv(&["comment", "edit", "--old", "a", "--new", "b"]),
            "acme/widgets",
            &credential(),
            &ctx(),
        )
        .await;
        let CommandOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result.stderr, "comment ID required");
    }

    #[tokio::test]
    async fn test_invalid_resource_reported() {
        let outcome = execute(
            &argv(&["edit", "1", "--old", "a", "--new", "b"]),
            "no-slash",
            &credential(),
            &ctx(),
        )
        .await;
        let CommandOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert!(result.stderr.contains("invalid repository resource"));
    }
}
