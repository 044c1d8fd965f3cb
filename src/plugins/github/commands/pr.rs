//! PR command: partial body replacement via the REST API.
//!
//! Handles:
//! - `pr edit <number> --old "..." --new "..." [--replace-all] [--title "..."]`
//! - `pr comment edit <comment-id> --old "..." --new "..." [--replace-all]`
//!
//! PR comments live on the issues endpoint, so `pr comment edit` shares the
//! issue implementation. Everything else declines.

use serde_json::json;

use crate::exec::CliResult;
use crate::plugins::{CommandOutcome, Credential, ProxyContext};

use super::super::graphql::ApiError;
use super::issue::old_and_new;
use super::{
    api_url, has_old_and_new, into_cli_result, parse_edit_flags, parse_number, partial_replace,
    split_resource, token_of, RestClient,
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
        // Same wire shape as an issue comment edit.
        return super::issue::execute(args, resource, credential, ctx).await;
    }

    CommandOutcome::Declined
}

async fn run_edit(
    args: &[String],
    resource: &str,
    credential: &Credential,
    ctx: &ProxyContext,
) -> Result<CliResult, ApiError> {
    let (owner, repo) = split_resource(resource)?;
    let rest = RestClient {
        client: &ctx.client,
        api_url: api_url(ctx),
        token: token_of(credential)?,
        timeout: ctx.config.timeouts.http,
    };
    let flags = parse_edit_flags(args)?;
    let (old, new) = old_and_new(&flags)?;

    let number = match flags.positional.first() {
        Some(raw) => parse_number(raw)
            .map_err(|_| ApiError::command(format!("Invalid PR number: {raw}")))?,
        None => return Err(ApiError::command("PR number required")),
    };

    let path = format!("/repos/{owner}/{repo}/pulls/{number}");
    let pr = rest.get(&path).await?;
    let current = pr["body"].as_str().unwrap_or("");
    let updated = partial_replace(current, old, new, flags.replace_all)?;

    let mut payload = json!({ "body": updated });
    if let Some(title) = &flags.title {
        payload["title"] = json!(title);
    }
    rest.patch(&path, &payload).await?;

    Ok(CliResult {
        exit_code: 0,
        stdout: String::new(),
        stderr: format!("Updated PR #{number}"),
    })
}
