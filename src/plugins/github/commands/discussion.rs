//! Discussion command: GitHub Discussions via the GraphQL API.
//!
//! The gh CLI has no native discussion support, so every subcommand is
//! handled here; nothing falls through to a subprocess.

use serde_json::{json, Value};

use crate::exec::CliResult;
use crate::plugins::{Credential, ProxyContext};

use super::super::graphql::{ApiError, GraphqlClient};
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
        return Err(ApiError::command("discussion subcommand required"));
    };

    let (owner, repo) = split_resource(resource)?;
    let gql = GraphqlClient {
        client: &ctx.client,
        url: graphql_url(ctx),
        token: token_of(credential)?,
        timeout: ctx.config.timeouts.http,
    };

    match subcmd.as_str() {
        "list" => list(&gql, owner, repo).await,
        "view" => {
            let number = required_number(rest, "discussion number required")?;
            view(&gql, owner, repo, number).await
        }
        "create" => {
            let (title, body, category) = parse_create_args(rest)?;
            create(&gql, owner, repo, &title, &body, &category).await
        }
        "edit" => {
            let number = required_number(rest, "discussion number required")?;
            let (title, body) = parse_edit_args(&rest[1..])?;
            update(&gql, owner, repo, number, title, body).await
        }
        "close" => {
            let number = required_number(rest, "discussion number required")?;
            close(&gql, owner, repo, number).await
        }
        "reopen" => {
            let number = required_number(rest, "discussion number required")?;
            reopen(&gql, owner, repo, number).await
        }
        "delete" => {
            let number = required_number(rest, "discussion number required")?;
            delete(&gql, owner, repo, number).await
        }
        "comment" => handle_comment(&gql, owner, repo, rest).await,
        "answer" => {
            let id = required_id(rest, "comment_id required")?;
            mark_answer(&gql, id).await
        }
        "unanswer" => {
            let id = required_id(rest, "comment_id required")?;
            unmark_answer(&gql, id).await
        }
        "poll" => handle_poll(&gql, rest).await,
        other => Err(ApiError::command(format!(
            "Unknown discussion subcommand: {other}"
        ))),
    }
}

fn required_number(args: &[String], missing: &str) -> Result<i64, ApiError> {
    let first = args.first().ok_or_else(|| ApiError::command(missing))?;
    parse_number(first)
}

fn required_id<'a>(args: &'a [String], missing: &str) -> Result<&'a str, ApiError> {
    args.first()
        .map(String::as_str)
        .ok_or_else(|| ApiError::command(missing))
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

/// Parse `--title`, `--body`, `--category`; all three are required.
fn parse_create_args(args: &[String]) -> Result<(String, String, String), ApiError> {
    let mut title = None;
    let mut body = None;
    let mut category = None;
    let mut i = 0;
    while i < args.len() {
        let flag_with_value = i + 1 < args.len();
        match args[i].as_str() {
            "--title" | "-t" if flag_with_value => {
                title = Some(args[i + 1].clone());
                i += 2;
            }
            "--body" | "-b" if flag_with_value => {
                body = Some(args[i + 1].clone());
                i += 2;
            }
            "--category" | "-c" if flag_with_value => {
                category = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }

    let title = title.ok_or_else(|| ApiError::command("--title is required"))?;
    let body = body.ok_or_else(|| ApiError::command("--body is required"))?;
    let category = category.ok_or_else(|| ApiError::command("--category is required"))?;
    Ok((title, body, category))
}

/// Parse `--title` and/or `--body`; at least one is required.
fn parse_edit_args(args: &[String]) -> Result<(Option<String>, Option<String>), ApiError> {
    let mut title = None;
    let mut body = None;
    let mut i = 0;
    while i < args.len() {
        let flag_with_value = i + 1 < args.len();
        match args[i].as_str() {
            "--title" | "-t" if flag_with_value => {
                title = Some(args[i + 1].clone());
                i += 2;
            }
            "--body" | "-b" if flag_with_value => {
                body = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }

    if title.is_none() && body.is_none() {
        return Err(ApiError::command("--title or --body is required"));
    }
    Ok((title, body))
}

fn parse_comment_body(args: &[String]) -> Result<String, ApiError> {
    let mut i = 0;
    while i < args.len() {
        if matches!(args[i].as_str(), "--body" | "-b") && i + 1 < args.len() {
            return Ok(args[i + 1].clone());
        }
        i += 1;
    }
    Err(ApiError::command("--body is required"))
}

/// Parse `--body` (required) and `--reply-to`.
fn parse_add_comment_args(args: &[String]) -> Result<(String, Option<String>), ApiError> {
    let mut body = None;
    let mut reply_to = None;
    let mut i = 0;
    while i < args.len() {
        let flag_with_value = i + 1 < args.len();
        match args[i].as_str() {
            "--body" | "-b" if flag_with_value => {
                body = Some(args[i + 1].clone());
                i += 2;
            }
            "--reply-to" if flag_with_value => {
                reply_to = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }

    let body = body.ok_or_else(|| ApiError::command("--body is required"))?;
    Ok((body, reply_to))
}

async fn handle_comment(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    args: &[String],
) -> Result<CliResult, ApiError> {
    let Some((first, rest)) = args.split_first() else {
        return Err(ApiError::command(
            "discussion number or 'edit'/'delete' required",
        ));
    };

    match first.as_str() {
        "delete" => {
            let id = required_id(rest, "comment_id required")?;
            delete_comment(gql, id).await
        }
        "edit" => {
            let id = required_id(rest, "comment_id required")?;
            let body = parse_comment_body(&rest[1..])?;
            update_comment(gql, id, &body).await
        }
        number => {
            let number = parse_number(number)?;
            let (body, reply_to) = parse_add_comment_args(rest)?;
            add_comment(gql, owner, repo, number, &body, reply_to.as_deref()).await
        }
    }
}

async fn handle_poll(gql: &GraphqlClient<'_>, args: &[String]) -> Result<CliResult, ApiError> {
    let Some((first, rest)) = args.split_first() else {
        return Err(ApiError::command("poll subcommand required (vote)"));
    };

    match first.as_str() {
        "vote" => {
            let id = required_id(rest, "option_id required")?;
            poll_vote(gql, id).await
        }
        other => Err(ApiError::command(format!(
            "Unknown poll subcommand: {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// GraphQL helpers
// ---------------------------------------------------------------------------

async fn discussion_category_id(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    category_name: &str,
) -> Result<String, ApiError> {
    const QUERY: &str = "
    query($owner: String!, $repo: String!) {
        repository(owner: $owner, name: $repo) {
            discussionCategories(first: 100) {
                nodes { id name slug }
            }
        }
    }
    ";
    let result = gql
        .execute(QUERY, json!({ "owner": owner, "repo": repo }))
        .await?;
    let categories = result
        .pointer("/data/repository/discussionCategories/nodes")
        .and_then(Value::as_array)
        .ok_or_else(ApiError::shape)?;

    for category in categories {
        let name = category["name"].as_str().unwrap_or("");
        let slug = category["slug"].as_str().unwrap_or("");
        if name.eq_ignore_ascii_case(category_name) || slug.eq_ignore_ascii_case(category_name) {
            return category["id"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(ApiError::shape);
        }
    }

    let available: Vec<&str> = categories
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    Err(ApiError::command(format!(
        "Category '{category_name}' not found. Available: {}",
        available.join(", ")
    )))
}

async fn discussion_node_id(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    number: i64,
) -> Result<String, ApiError> {
    const QUERY: &str = "
    query($owner: String!, $repo: String!, $number: Int!) {
        repository(owner: $owner, name: $repo) {
            discussion(number: $number) { id }
        }
    }
    ";
    let result = gql
        .execute(
            QUERY,
            json!({ "owner": owner, "repo": repo, "number": number }),
        )
        .await?;
    result
        .pointer("/data/repository/discussion/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ApiError::command(format!("Discussion #{number} not found")))
}

fn author_login(value: &Value) -> &str {
    value.pointer("/author/login").and_then(Value::as_str).unwrap_or("ghost")
}

// ---------------------------------------------------------------------------
// GraphQL operations
// ---------------------------------------------------------------------------

async fn list(gql: &GraphqlClient<'_>, owner: &str, repo: &str) -> Result<CliResult, ApiError> {
    const QUERY: &str = "
    query($owner: String!, $repo: String!) {
        repository(owner: $owner, name: $repo) {
            discussions(first: 30, orderBy: {field: CREATED_AT, direction: DESC}) {
                nodes {
                    number
                    title
                    author { login }
                    createdAt
                    category { name }
                    comments { totalCount }
                }
            }
        }
    }
    ";
    let result = gql
        .execute(QUERY, json!({ "owner": owner, "repo": repo }))
        .await?;
    let discussions = result
        .pointer("/data/repository/discussions/nodes")
        .and_then(Value::as_array)
        .ok_or_else(ApiError::shape)?;

    let lines: Vec<String> = discussions
        .iter()
        .map(|d| {
            let number = d["number"].as_i64().unwrap_or(0);
            let title = d["title"].as_str().unwrap_or("");
            let category = d.pointer("/category/name").and_then(Value::as_str).unwrap_or("");
            let comments = d
                .pointer("/comments/totalCount")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            format!(
                "#{number}\t{title}\t{}\t{category}\t{comments} comments",
                author_login(d)
            )
        })
        .collect();

    Ok(CliResult::ok(lines.join("\n"), ""))
}

async fn view(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    number: i64,
) -> Result<CliResult, ApiError> {
    const QUERY: &str = "
    query($owner: String!, $repo: String!, $number: Int!) {
        repository(owner: $owner, name: $repo) {
            discussion(number: $number) {
                number
                title
                body
                author { login }
                createdAt
                category { name }
                url
                comments(first: 50) {
                    nodes {
                        id
                        author { login }
                        body
                        createdAt
                    }
                }
            }
        }
    }
    ";
    let result = gql
        .execute(
            QUERY,
            json!({ "owner": owner, "repo": repo, "number": number }),
        )
        .await?;
    let discussion = result.pointer("/data/repository/discussion");
    let Some(d) = discussion.filter(|d| !d.is_null()) else {
        return Err(ApiError::command(format!("Discussion #{number} not found")));
    };

    let body = d["body"].as_str().filter(|b| !b.is_empty()).unwrap_or("(empty)");
    let mut lines = vec![
        format!("title:\t{}", d["title"].as_str().unwrap_or("")),
        format!("number:\t{}", d["number"].as_i64().unwrap_or(0)),
        format!("author:\t{}", author_login(d)),
        format!(
            "category:\t{}",
            d.pointer("/category/name").and_then(Value::as_str).unwrap_or("")
        ),
        format!("url:\t{}", d["url"].as_str().unwrap_or("")),
        format!("created:\t{}", d["createdAt"].as_str().unwrap_or("")),
        String::new(),
        "--- BODY ---".to_string(),
        body.to_string(),
        String::new(),
        "--- COMMENTS ---".to_string(),
    ];
    if let Some(comments) = d.pointer("/comments/nodes").and_then(Value::as_array) {
        for c in comments {
            lines.push(format!(
                "\n[{}] {} at {}:",
                c["id"].as_str().unwrap_or(""),
                author_login(c),
                c["createdAt"].as_str().unwrap_or("")
            ));
            lines.push(c["body"].as_str().unwrap_or("").to_string());
        }
    }

    Ok(CliResult::ok(lines.join("\n"), ""))
}

async fn create(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    title: &str,
    body: &str,
    category: &str,
) -> Result<CliResult, ApiError> {
    let repo_id = gql.repository_id(owner, repo).await?;
    let category_id = discussion_category_id(gql, owner, repo, category).await?;

    const MUTATION: &str = "
    mutation($repositoryId: ID!, $categoryId: ID!, $title: String!, $body: String!) {
        createDiscussion(input: {repositoryId: $repositoryId, categoryId: $categoryId, title: $title, body: $body}) {
            discussion { number url }
        }
    }
    ";
    let result = gql
        .execute(
            MUTATION,
            json!({
                "repositoryId": repo_id,
                "categoryId": category_id,
                "title": title,
                "body": body,
            }),
        )
        .await?;
    let d = result
        .pointer("/data/createDiscussion/discussion")
        .ok_or_else(ApiError::shape)?;

    Ok(CliResult {
        exit_code: 0,
        stdout: d["url"].as_str().unwrap_or("").to_string(),
        stderr: format!("Created discussion #{}", d["number"].as_i64().unwrap_or(0)),
    })
}

async fn update(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    number: i64,
    title: Option<String>,
    body: Option<String>,
) -> Result<CliResult, ApiError> {
    let discussion_id = discussion_node_id(gql, owner, repo, number).await?;

    const MUTATION: &str = "
    mutation($discussionId: ID!, $title: String, $body: String) {
        updateDiscussion(input: {discussionId: $discussionId, title: $title, body: $body}) {
            discussion { number url }
        }
    }
    ";
    let result = gql
        .execute(
            MUTATION,
            json!({ "discussionId": discussion_id, "title": title, "body": body }),
        )
        .await?;
    let d = result
        .pointer("/data/updateDiscussion/discussion")
        .ok_or_else(ApiError::shape)?;

    Ok(CliResult {
        exit_code: 0,
        stdout: d["url"].as_str().unwrap_or("").to_string(),
        stderr: format!("Updated discussion #{}", d["number"].as_i64().unwrap_or(0)),
    })
}

async fn close(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    number: i64,
) -> Result<CliResult, ApiError> {
    let discussion_id = discussion_node_id(gql, owner, repo, number).await?;

    const MUTATION: &str = "
    mutation($discussionId: ID!) {
        closeDiscussion(input: {discussionId: $discussionId}) {
            discussion { number url }
        }
    }
    ";
    let result = gql
        .execute(MUTATION, json!({ "discussionId": discussion_id }))
        .await?;
    let d = result
        .pointer("/data/closeDiscussion/discussion")
        .ok_or_else(ApiError::shape)?;

    Ok(CliResult {
        exit_code: 0,
        stdout: d["url"].as_str().unwrap_or("").to_string(),
        stderr: format!("Closed discussion #{}", d["number"].as_i64().unwrap_or(0)),
    })
}

async fn reopen(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    number: i64,
) -> Result<CliResult, ApiError> {
    let discussion_id = discussion_node_id(gql, owner, repo, number).await?;

    const MUTATION: &str = "
    mutation($discussionId: ID!) {
        reopenDiscussion(input: {discussionId: $discussionId}) {
            discussion { number url }
        }
    }
    ";
    let result = gql
        .execute(MUTATION, json!({ "discussionId": discussion_id }))
        .await?;
    let d = result
        .pointer("/data/reopenDiscussion/discussion")
        .ok_or_else(ApiError::shape)?;

    Ok(CliResult {
        exit_code: 0,
        stdout: d["url"].as_str().unwrap_or("").to_string(),
        stderr: format!("Reopened discussion #{}", d["number"].as_i64().unwrap_or(0)),
    })
}

async fn delete(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    number: i64,
) -> Result<CliResult, ApiError> {
    let discussion_id = discussion_node_id(gql, owner, repo, number).await?;

    const MUTATION: &str = "
    mutation($discussionId: ID!) {
        deleteDiscussion(input: {id: $discussionId}) {
            discussion { number }
        }
    }
    ";
    let result = gql
        .execute(MUTATION, json!({ "discussionId": discussion_id }))
        .await?;
    let d = result
        .pointer("/data/deleteDiscussion/discussion")
        .ok_or_else(ApiError::shape)?;

    Ok(CliResult {
        exit_code: 0,
        stdout: String::new(),
        stderr: format!("Deleted discussion #{}", d["number"].as_i64().unwrap_or(0)),
    })
}

async fn add_comment(
    gql: &GraphqlClient<'_>,
    owner: &str,
    repo: &str,
    number: i64,
    body: &str,
    reply_to: Option<&str>,
) -> Result<CliResult, ApiError> {
    let discussion_id = discussion_node_id(gql, owner, repo, number).await?;

    const MUTATION: &str = "
    mutation($discussionId: ID!, $body: String!, $replyToId: ID) {
        addDiscussionComment(input: {discussionId: $discussionId, body: $body, replyToId: $replyToId}) {
            comment { id url }
        }
    }
    ";
    let result = gql
        .execute(
            MUTATION,
            json!({ "discussionId": discussion_id, "body": body, "replyToId": reply_to }),
        )
        .await?;
    let c = result
        .pointer("/data/addDiscussionComment/comment")
        .ok_or_else(ApiError::shape)?;

    Ok(CliResult {
        exit_code: 0,
        stdout: c["url"].as_str().unwrap_or("").to_string(),
        stderr: format!("Added comment {}", c["id"].as_str().unwrap_or("")),
    })
}

async fn update_comment(
    gql: &GraphqlClient<'_>,
    comment_id: &str,
    body: &str,
) -> Result<CliResult, ApiError> {
    const MUTATION: &str = "
    mutation($commentId: ID!, $body: String!) {
        updateDiscussionComment(input: {commentId: $commentId, body: $body}) {
            comment { id url }
        }
    }
    ";
    let result = gql
        .execute(MUTATION, json!({ "commentId": comment_id, "body": body }))
        .await?;
    let c = result
        .pointer("/data/updateDiscussionComment/comment")
        .ok_or_else(ApiError::shape)?;

    Ok(CliResult {
        exit_code: 0,
        stdout: c["url"].as_str().unwrap_or("").to_string(),
        stderr: format!("Updated comment {}", c["id"].as_str().unwrap_or("")),
    })
}

async fn delete_comment(gql: &GraphqlClient<'_>, comment_id: &str) -> Result<CliResult, ApiError> {
    const MUTATION: &str = "
    mutation($commentId: ID!) {
        deleteDiscussionComment(input: {id: $commentId}) {
            comment { id }
        }
    }
    ";
    let result = gql
        .execute(MUTATION, json!({ "commentId": comment_id }))
        .await?;
    let c = result
        .pointer("/data/deleteDiscussionComment/comment")
        .ok_or_else(ApiError::shape)?;

    Ok(CliResult {
        exit_code: 0,
        stdout: String::new(),
        stderr: format!("Deleted comment {}", c["id"].as_str().unwrap_or("")),
    })
}

async fn mark_answer(gql: &GraphqlClient<'_>, comment_id: &str) -> Result<CliResult, ApiError> {
    const MUTATION: &str = "
    mutation($commentId: ID!) {
        markDiscussionCommentAsAnswer(input: {id: $commentId}) {
            discussion { number url }
        }
    }
    ";
    let result = gql
        .execute(MUTATION, json!({ "commentId": comment_id }))
        .await?;
    let d = result
        .pointer("/data/markDiscussionCommentAsAnswer/discussion")
        .ok_or_else(ApiError::shape)?;

    Ok(CliResult {
        exit_code: 0,
        stdout: d["url"].as_str().unwrap_or("").to_string(),
        stderr: format!(
            "Marked as answer in discussion #{}",
            d["number"].as_i64().unwrap_or(0)
        ),
    })
}

async fn unmark_answer(gql: &GraphqlClient<'_>, comment_id: &str) -> Result<CliResult, ApiError> {
    const MUTATION: &str = "
    mutation($commentId: ID!) {
        unmarkDiscussionCommentAsAnswer(input: {id: $commentId}) {
            discussion { number url }
        }
    }
    ";
    let result = gql
        .execute(MUTATION, json!({ "commentId": comment_id }))
        .await?;
    let d = result
        .pointer("/data/unmarkDiscussionCommentAsAnswer/discussion")
        .ok_or_else(ApiError::shape)?;

    Ok(CliResult {
        exit_code: 0,
        stdout: d["url"].as_str().unwrap_or("").to_string(),
        stderr: format!(
            "Unmarked answer in discussion #{}",
            d["number"].as_i64().unwrap_or(0)
        ),
    })
}

async fn poll_vote(gql: &GraphqlClient<'_>, option_id: &str) -> Result<CliResult, ApiError> {
    const MUTATION: &str = "
    mutation($optionId: ID!) {
        addDiscussionPollVote(input: {pollOptionId: $optionId}) {
            pollOption { id option totalVoteCount }
        }
    }
    ";
    let result = gql
        .execute(MUTATION, json!({ "optionId": option_id }))
        .await?;
    let option = result
        .pointer("/data/addDiscussionPollVote/pollOption")
        .ok_or_else(ApiError::shape)?;

    Ok(CliResult::ok(
        format!(
            "Voted for: {} (total: {})",
            option["option"].as_str().unwrap_or(""),
            option["totalVoteCount"].as_i64().unwrap_or(0)
        ),
        "",
    ))
}
