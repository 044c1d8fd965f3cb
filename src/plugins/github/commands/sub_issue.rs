//! Sub-issue command: GitHub Sub-Issues via the GraphQL API.
//!
//! The gh CLI has no native sub-issue support, so every subcommand is
//! handled here; nothing falls through to a subprocess.

use serde_json::{json, Value};

use crate::exec::CliResult;
use crate::plugins::{Credential, ProxyContext};

use super::super::graphql::{ApiError, GraphqlClient, SUB_ISSUES_FEATURE};
use super::{graphql_url, into_cli_result, parse_number, split_resource, token_of};

pub async fn execute(
    args: &[String],
    resource: &str,
    credential: &Credential,
    ctx: &ProxyContext,
) -> CliResult {
    into_cli_result(run(args, resource, credential, ctx).await)
}

async fn run(
    args: &[String],
    resource: &str,
    credential: &Credential,
    ctx: &ProxyContext,
) -> Result<CliResult, ApiError> {
    let Some((subcmd, rest)) = args.split_first() else {
        return Err(ApiError::command("sub-issue subcommand required"));
    };

    let (owner, repo) = split_resource(resource)?;
    let gql = GraphqlClient {
        client: &ctx.client,
        url: graphql_url(ctx),
        token: token_of(credential)?,
        timeout: ctx.config.timeouts.http,
    };

    match subcmd.as_str() {
        "list" => {
            let number = single_number(rest)?;
            list(&gql, owner, repo, number).await
        }
        "parent" => {
            let number = single_number(rest)?;
            parent(&gql, owner, repo, number).await
        }
        "add" => {
            let (parent_number, child_number) = number_pair(rest)?;
            add(&gql, owner, repo, parent_number, child_number).await
        }
        "remove" => {
            let (parent_number, child_number) = number_pair(rest)?;
            remove(&gql, owner, repo, parent_number, child_number).await
        }
        "reorder" => {
            let (parent_number, child_number) = number_pair(rest)?;
            let (before, after) = parse_reorder_args(&rest[2..])?;
            if before.is_none() && after.is_none() {
                return Err(ApiError::command("--before or --after required"));
            }
            reorder(&gql, owner, repo, parent_number, child_number, before, after).await
        }
        other => Err(ApiError::command(format!(
            "Unknown sub-issue subcommand: {other}"
        ))),
    }
}

fn single_number(args: &[String]) -> Result<i64, ApiError> {
    let first = args
        .first()
        .ok_or_else(|| ApiError::command("issue number required"))?;
    parse_number(first)
}

fn number_pair(args: &[String]) -> Result<(i64, i64), ApiError> {
    if args.len() < 2 {
        return Err(ApiError::command("parent and child issue numbers required"));
    }
    Ok((parse_number(&args[0])?, parse_number(&args[1])?))
}

/// Parse `--before` and `--after` issue numbers.
fn parse_reorder_args(args: &[String]) -> Result<(Option<i64>, Option<i64>), ApiError> {
    let mut before = None;
    let mut after = None;
    let mut i = 0;
    while i < args.len() {
        let flag_with_value = i + 1 < args.len();
        match args[i].as_str() {
            "--before" if flag_with_value => {
                before = Some(parse_number(&args[i + 1])?);
                i += 2;
            }
            "--after" if flag_with_value => {
                after = Some(parse_number(&args[i + 1])?);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok((before, after))
}

// ---------------------------------------------------------------------------
// GraphQL operations
// ---------------------------------------------------------------------------

async fn list(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    number: i64,
) -> Result<CliResult, ApiError> {
    const QUERY: &str = "
    query($owner: String!, $repo: String!, $number: Int!) {
        repository(owner: $owner, name: $repo) {
            issue(number: $number) {
                subIssues(first: 50) {
                    nodes { number title state }
                }
            }
        }
    }
    ";
    let result = gql
        .execute_with(
            QUERY,
            json!({ "owner": owner, "repo": repo, "number": number }),
            &[SUB_ISSUES_FEATURE],
        )
        .await?;
    let issue = result.pointer("/data/repository/issue");
    let Some(issue) = issue.filter(|i| !i.is_null()) else {
        return Err(ApiError::command(format!(
            "Issue #{number} not found in {owner}/{repo}"
        )));
    };

    let nodes = issue
        .pointer("/subIssues/nodes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let lines: Vec<String> = nodes.iter().map(issue_line).collect();
    Ok(CliResult::ok(lines.join("\n"), ""))
}

async fn parent(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    number: i64,
) -> Result<CliResult, ApiError> {
    const QUERY: &str = "
    query($owner: String!, $repo: String!, $number: Int!) {
        repository(owner: $owner, name: $repo) {
            issue(number: $number) {
                parent { number title state }
            }
        }
    }
    ";
    let result = gql
        .execute_with(
            QUERY,
            json!({ "owner": owner, "repo": repo, "number": number }),
            &[SUB_ISSUES_FEATURE],
        )
        .await?;
    let issue = result.pointer("/data/repository/issue");
    let Some(issue) = issue.filter(|i| !i.is_null()) else {
        return Err(ApiError::command(format!(
            "Issue #{number} not found in {owner}/{repo}"
        )));
    };

    let stdout = match issue.get("parent").filter(|p| !p.is_null()) {
        Some(parent) => issue_line(parent),
        None => "No parent issue".to_string(),
    };
    Ok(CliResult::ok(stdout, ""))
}

fn issue_line(issue: &Value) -> String {
    format!(
        "{}\t{}\t{}",
        issue["number"].as_i64().unwrap_or(0),
        issue["state"].as_str().unwrap_or(""),
        issue["title"].as_str().unwrap_or("")
    )
}

async fn add(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    parent_number: i64,
    child_number: i64,
) -> Result<CliResult, ApiError> {
    let issue_id = gql.issue_node_id(owner, repo, parent_number).await?;
    let sub_issue_id = gql.issue_node_id(owner, repo, child_number).await?;

    const MUTATION: &str = "
    mutation($issueId: ID!, $subIssueId: ID!) {
        addSubIssue(input: {issueId: $issueId, subIssueId: $subIssueId}) {
            issue { number }
            subIssue { number }
        }
    }
    ";
    gql.execute_with(
        MUTATION,
        json!({ "issueId": issue_id, "subIssueId": sub_issue_id }),
        &[SUB_ISSUES_FEATURE],
    )
    .await?;

    Ok(CliResult::ok(
        format!("Added #{child_number} as sub-issue of #{parent_number}"),
        "",
    ))
}

async fn remove(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    parent_number: i64,
    child_number: i64,
) -> Result<CliResult, ApiError> {
    let issue_id = gql.issue_node_id(owner, repo, parent_number).await?;
    let sub_issue_id = gql.issue_node_id(owner, repo, child_number).await?;

    const MUTATION: &str = "
    mutation($issueId: ID!, $subIssueId: ID!) {
        removeSubIssue(input: {issueId: $issueId, subIssueId: $subIssueId}) {
            issue { number }
            subIssue { number }
        }
    }
    ";
    gql.execute_with(
        MUTATION,
        json!({ "issueId": issue_id, "subIssueId": sub_issue_id }),
        &[SUB_ISSUES_FEATURE],
    )
    .await?;

    Ok(CliResult::ok(
        format!("Removed #{child_number} from #{parent_number}"),
        "",
    ))
}

async fn reorder(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    parent_number: i64,
    child_number: i64,
    before_number: Option<i64>,
    after_number: Option<i64>,
) -> Result<CliResult, ApiError> {
    let issue_id = gql.issue_node_id(owner, repo, parent_number).await?;
    let sub_issue_id = gql.issue_node_id(owner, repo, child_number).await?;

    let before_id = match before_number {
        Some(n) => Some(gql.issue_node_id(owner, repo, n).await?),
        None => None,
    };
    let after_id = match after_number {
        Some(n) => Some(gql.issue_node_id(owner, repo, n).await?),
        None => None,
    };

    const MUTATION: &str = "
    mutation($issueId: ID!, $subIssueId: ID!, $beforeId: ID, $afterId: ID) {
        reprioritizeSubIssue(input: {issueId: $issueId, subIssueId: $subIssueId, beforeId: $beforeId, afterId: $afterId}) {
            issue { number }
        }
    }
    ";
    gql.execute_with(
        MUTATION,
        json!({
            "issueId": issue_id,
            "subIssueId": sub_issue_id,
            "beforeId": before_id,
            "afterId": after_id,
        }),
        &[SUB_ISSUES_FEATURE],
    )
    .await?;

    Ok(CliResult::ok("Reordered", ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_reorder_args() {
        let (before, after) = parse_reorder_args(&argv(&["--before", "5"])).unwrap();
        assert_eq!(before, Some(5));
        assert_eq!(after, None);

        let (before, after) = parse_reorder_args(&argv(&["--after", "9"])).unwrap();
        assert_eq!(before, None);
        assert_eq!(after, Some(9));
    }

    #[test]
    fn test_parse_reorder_rejects_bad_number() {
        assert!(parse_reorder_args(&argv(&["--before", "x"])).is_err());
    }

    #[test]
    fn test_number_pair_requires_two() {
        assert!(number_pair(&argv(&["1"])).is_err());
        assert_eq!(number_pair(&argv(&["1", "2"])).unwrap(), (1, 2));
    }

    #[test]
    fn test_issue_line_format() {
        let line = issue_line(&serde_json::json!({
            "number": 7, "state": "OPEN", "title": "Split the parser"
        }));
        assert_eq!(line, "7\tOPEN\tSplit the parser");
    }
}
