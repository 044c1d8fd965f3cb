//! Minimal GraphQL client for the GitHub API.

use std::time::Duration;

use reqwest::header;
use serde_json::{json, Value};
use thiserror::Error;

/// Default GraphQL endpoint. Overridable per plugin config for tests.
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Feature header required by the sub-issues API.
pub const SUB_ISSUES_FEATURE: (&str, &str) = ("GraphQL-Features", "sub_issues");

/// Errors from the GitHub API layer. `Command` carries user-facing
/// diagnostics (bad arguments, missing objects) and surfaces on stderr with
/// exit code 1, mirroring what the real CLI would print.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Command(String),

    #[error("GraphQL error: {0}")]
    Graphql(String),

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command(message.into())
    }

    /// The usual "response did not have the documented shape" case.
    pub fn shape() -> Self {
        Self::Command("unexpected response shape from GitHub API".into())
    }
}

/// One credential's view of the GraphQL endpoint.
pub struct GraphqlClient<'a> {
    pub client: &'a reqwest::Client,
    pub url: &'a str,
    pub token: &'a str,
    pub timeout: Duration,
}

impl GraphqlClient<'_> {
    pub async fn execute(&self, query: &str, variables: Value) -> Result<Value, ApiError> {
        self.execute_with(query, variables, &[]).await
    }

    pub async fn execute_with(
        &self,
        query: &str,
        variables: Value,
        extra_headers: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        let mut body = json!({ "query": query });
        if !variables.is_null() {
            body["variables"] = variables;
        }

        let mut request = self
            .client
            .post(self.url)
            .timeout(self.timeout)
            .header(header::AUTHORIZATION, format!("bearer {}", self.token))
            .json(&body);
        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }

        let result: Value = request.send().await?.json().await?;
        if let Some(errors) = result.get("errors") {
            return Err(ApiError::Graphql(errors.to_string()));
        }
        Ok(result)
    }

    /// Repository node ID.
    pub async fn repository_id(&self, owner: &str, repo: &str) -> Result<String, ApiError> {
        const QUERY: &str = "
        query($owner: String!, $repo: String!) {
            repository(owner: $owner, name: $repo) {
                id
            }
        }
        ";
        let result = self
            .execute(QUERY, json!({ "owner": owner, "repo": repo }))
            .await?;
        result
            .pointer("/data/repository/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::command(format!("Repository {owner}/{repo} not found")))
    }

    /// Issue node ID (sub-issues feature flag enabled).
    pub async fn issue_node_id(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<String, ApiError> {
        const QUERY: &str = "
        query($owner: String!, $repo: String!, $number: Int!) {
            repository(owner: $owner, name: $repo) {
                issue(number: $number) {
                    id
                }
            }
        }
        ";
        let result = self
            .execute_with(
                QUERY,
                json!({ "owner": owner, "repo": repo, "number": number }),
                &[SUB_ISSUES_FEATURE],
            )
            .await?;
        result
            .pointer("/data/repository/issue/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::command(format!("Issue #{number} not found in {owner}/{repo}"))
            })
    }
}
