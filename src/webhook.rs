//! GitHub webhook payloads and event-type dispatch

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{Result, ReviewError};

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

/// Pull request actions that trigger a review. Everything else is ignored.
pub const REVIEWABLE_PR_ACTIONS: [&str; 3] = ["opened", "synchronize", "reopened"];

/// Event type taken from the `X-GitHub-Event` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Push,
    PullRequest,
    Other(String),
}

impl EventKind {
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("push") => EventKind::Push,
            Some("pull_request") => EventKind::PullRequest,
            Some(other) => EventKind::Other(other.to_string()),
            None => EventKind::Other("unknown".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub name: Option<String>,
    pub login: String,
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
    pub html_url: Option<String>,
}

impl Repository {
    /// Owner segment for REST calls. Push payloads carry `owner.name`; pull request
    /// payloads only have `owner.login`.
    pub fn owner_for_api(&self) -> &str {
        self.owner
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.owner.login)
    }

    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.name
        } else {
            &self.full_name
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub id: String,
    pub message: String,
    pub timestamp: String,
    pub url: String,
    pub author: CommitAuthor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pusher {
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub login: String,
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub before: String,
    pub after: String,
    pub repository: Repository,
    pub pusher: Pusher,
    pub sender: Sender,
    pub commits: Vec<Commit>,
    pub head_commit: Option<Commit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub user: Sender,
    pub head: GitRef,
    pub base: GitRef,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: Repository,
    pub sender: Sender,
}

/// Returns the pull request action when it is one we review.
pub fn reviewable_action(payload: &Value) -> Option<&str> {
    payload
        .get("action")
        .and_then(Value::as_str)
        .filter(|action| REVIEWABLE_PR_ACTIONS.iter().any(|a| a == action))
}

/// Validates an already-parsed body against the typed event shape.
pub fn validate_payload<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| ReviewError::InvalidPayload {
        details: json!({ "message": e.to_string() }),
    })
}
