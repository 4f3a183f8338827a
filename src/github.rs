//! GitHub REST client: diffs in, pull request reviews out.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ReviewError};

const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Review event sent with a pull request review.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approve,
    RequestChanges,
    Comment,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Approve => "APPROVE",
            ReviewDecision::RequestChanges => "REQUEST_CHANGES",
            ReviewDecision::Comment => "COMMENT",
        }
    }
}

/// Line-anchored review comment.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReviewComment {
    pub path: String,
    pub line: u32,
    pub body: String,
}

/// Body of `POST /repos/{owner}/{repo}/pulls/{number}/reviews`.
#[derive(Debug, Clone, Serialize)]
pub struct PullRequestReview {
    pub body: String,
    pub event: ReviewDecision,
    pub comments: Vec<ReviewComment>,
}

/// Source-hosting operations the review pipeline depends on.
#[async_trait]
pub trait DiffFetcher: Send + Sync {
    async fn commit_diff(&self, owner: &str, repo: &str, sha: &str) -> Result<String>;

    async fn pull_request_diff(&self, owner: &str, repo: &str, number: u64) -> Result<String>;

    async fn submit_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        review: &PullRequestReview,
    ) -> Result<()>;
}

pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(token: &str, base_url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ReviewError::ConfigError(format!("Invalid GitHub token: {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(USER_AGENT, HeaderValue::from_static("AI-Code-Reviewer"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ReviewError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_diff(&self, url: String, what: &str) -> Result<String> {
        debug!("Fetching {} from {}", what, url);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, DIFF_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| ReviewError::transport(&format!("Failed to fetch {what}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReviewError::Upstream {
                status: Some(status.as_u16()),
                message: format!("Failed to fetch {what}: GitHub API responded with {status}"),
            });
        }

        response
            .text()
            .await
            .map_err(|e| ReviewError::transport(&format!("Failed to read {what}"), e))
    }
}

#[async_trait]
impl DiffFetcher for GitHubClient {
    async fn commit_diff(&self, owner: &str, repo: &str, sha: &str) -> Result<String> {
        let url = format!("{}/repos/{}/{}/commits/{}", self.base_url, owner, repo, sha);
        self.get_diff(url, "commit diff").await
    }

    async fn pull_request_diff(&self, owner: &str, repo: &str, number: u64) -> Result<String> {
        let url = format!("{}/repos/{}/{}/pulls/{}", self.base_url, owner, repo, number);
        self.get_diff(url, "PR diff").await
    }

    async fn submit_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        review: &PullRequestReview,
    ) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/reviews",
            self.base_url, owner, repo, number
        );

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, JSON_MEDIA_TYPE)
            .json(review)
            .send()
            .await
            .map_err(|e| ReviewError::transport("Failed to submit PR review", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ReviewError::Upstream {
                status: Some(status.as_u16()),
                message: format!(
                    "Failed to submit PR review: GitHub API responded with {status}: {text}"
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DIFF: &str = "diff --git a/README.md b/README.md\n+hello\n";

    #[test]
    fn review_serializes_with_github_event_names() {
        let review = PullRequestReview {
            body: "LGTM".into(),
            event: ReviewDecision::RequestChanges,
            comments: vec![ReviewComment {
                path: "src/main.rs".into(),
                line: 42,
                body: "nit".into(),
            }],
        };
        let value = serde_json::to_value(&review).unwrap();
        assert_eq!(value["event"], "REQUEST_CHANGES");
        assert_eq!(value["comments"][0]["line"], 42);
        assert_eq!(ReviewDecision::Approve.as_str(), "APPROVE");
    }

    #[tokio::test]
    async fn fetches_commit_diff_with_diff_media_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo-org/hello-world/commits/abc123"))
            .and(header("accept", DIFF_MEDIA_TYPE))
            .and(header("authorization", "Bearer ghp_test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DIFF))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new("ghp_test", server.uri()).unwrap();
        let diff = client
            .commit_diff("octo-org", "hello-world", "abc123")
            .await
            .unwrap();
        assert_eq!(diff, DIFF);
    }

    #[tokio::test]
    async fn fetches_pull_request_diff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo-org/hello-world/pulls/42"))
            .and(header("accept", DIFF_MEDIA_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_string(DIFF))
            .mount(&server)
            .await;

        let client = GitHubClient::new("ghp_test", format!("{}/", server.uri())).unwrap();
        let diff = client
            .pull_request_diff("octo-org", "hello-world", 42)
            .await
            .unwrap();
        assert_eq!(diff, DIFF);
    }

    #[tokio::test]
    async fn non_success_becomes_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GitHubClient::new("ghp_test", server.uri()).unwrap();
        let err = client
            .commit_diff("octo-org", "hello-world", "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Upstream { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn submits_review_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo-org/hello-world/pulls/42/reviews"))
            .and(body_json(json!({
                "body": "Summary",
                "event": "COMMENT",
                "comments": [{ "path": "a.rs", "line": 3, "body": "note" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new("ghp_test", server.uri()).unwrap();
        let review = PullRequestReview {
            body: "Summary".into(),
            event: ReviewDecision::Comment,
            comments: vec![ReviewComment {
                path: "a.rs".into(),
                line: 3,
                body: "note".into(),
            }],
        };
        client
            .submit_review("octo-org", "hello-world", 42, &review)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_submit_carries_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("Unprocessable: line out of range"),
            )
            .mount(&server)
            .await;

        let client = GitHubClient::new("ghp_test", server.uri()).unwrap();
        let review = PullRequestReview {
            body: "Summary".into(),
            event: ReviewDecision::Approve,
            comments: vec![],
        };
        let err = client
            .submit_review("octo-org", "hello-world", 42, &review)
            .await
            .unwrap_err();
        match err {
            ReviewError::Upstream { status, message } => {
                assert_eq!(status, Some(422));
                assert!(message.contains("line out of range"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
