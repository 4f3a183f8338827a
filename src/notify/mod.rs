//! Notification channels and the per-unit fan-out over them.

pub mod email;
pub mod teams;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ReviewConfig;
use crate::error::Result;
use crate::review::StructuredReview;
use crate::webhook::{Commit, PullRequestEvent, Repository};

pub use email::EmailNotifier;
pub use teams::TeamsNotifier;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Normalized description of the reviewed unit, shared by every channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommitMetadata {
    pub repo: String,
    pub author: String,
    pub date: String,
    pub url: String,
}

impl CommitMetadata {
    pub fn for_commit(repository: &Repository, commit: &Commit) -> Self {
        let author = [
            Some(commit.author.name.as_str()),
            commit.author.username.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or("Unknown");

        Self {
            repo: repository.display_name().to_string(),
            author: author.to_string(),
            date: human_date(&commit.timestamp),
            url: commit.url.clone(),
        }
    }

    pub fn for_pull_request(event: &PullRequestEvent, now: DateTime<Utc>) -> Self {
        Self {
            repo: event.repository.display_name().to_string(),
            author: event.pull_request.user.login.clone(),
            date: now.format(DATE_FORMAT).to_string(),
            url: event.pull_request.html_url.clone(),
        }
    }
}

/// Renders an RFC 3339 timestamp in UTC; anything unparseable is shown as received.
fn human_date(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc).format(DATE_FORMAT).to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

/// A channel that can deliver a review. Implementations hold only configuration
/// resolved at startup and never mutate what they are given.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(
        &self,
        review: &StructuredReview,
        metadata: &CommitMetadata,
        recipient: Option<&str>,
    ) -> Result<()>;
}

/// The enabled channels, chosen once from configuration.
#[derive(Clone, Default)]
pub struct NotifierSet {
    broadcast: Vec<Arc<dyn Notifier>>,
    per_author: Option<Arc<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new(broadcast: Vec<Arc<dyn Notifier>>, per_author: Option<Arc<dyn Notifier>>) -> Self {
        Self {
            broadcast,
            per_author,
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Result<Self> {
        let mut broadcast: Vec<Arc<dyn Notifier>> = Vec::new();
        if config.teams.enabled {
            broadcast.push(Arc::new(TeamsNotifier::from_config(&config.teams)?));
            info!("Teams notifier initialized");
        }

        let per_author: Option<Arc<dyn Notifier>> = if config.email.enabled {
            let notifier = EmailNotifier::from_config(&config.email)?;
            info!("Email notifier initialized");
            Some(Arc::new(notifier))
        } else {
            None
        };

        Ok(Self::new(broadcast, per_author))
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.broadcast
            .iter()
            .chain(self.per_author.iter())
            .map(|n| n.name())
            .collect()
    }

    /// Delivers to every broadcast channel, then to the author's mailbox when the
    /// address is usable. Failures are logged per channel and never stop the next
    /// attempt. Returns how many deliveries succeeded.
    pub async fn notify(
        &self,
        review: &StructuredReview,
        metadata: &CommitMetadata,
        author_email: Option<&str>,
    ) -> usize {
        info!(repo = %metadata.repo, "Sending notifications");
        let mut sent = 0;

        for notifier in &self.broadcast {
            debug!(notifier = notifier.name(), "Dispatching notification");
            match notifier.send(review, metadata, None).await {
                Ok(()) => {
                    info!(notifier = notifier.name(), "Notification sent");
                    sent += 1;
                }
                Err(e) => error!(notifier = notifier.name(), error = %e, "Notification failed"),
            }
        }

        if let Some(notifier) = &self.per_author {
            match author_email {
                None => debug!(notifier = notifier.name(), "No author email, skipping"),
                Some(address) if is_deliverable(address) => {
                    debug!(
                        notifier = notifier.name(),
                        recipient = address,
                        "Dispatching notification"
                    );
                    match notifier.send(review, metadata, Some(address)).await {
                        Ok(()) => {
                            info!(
                                notifier = notifier.name(),
                                recipient = address,
                                "Notification sent"
                            );
                            sent += 1;
                        }
                        Err(e) => error!(
                            notifier = notifier.name(),
                            recipient = address,
                            error = %e,
                            "Notification failed"
                        ),
                    }
                }
                Some(address) => warn!(
                    notifier = notifier.name(),
                    "Invalid author email address: {address:?}"
                ),
            }
        }

        sent
    }
}

fn is_deliverable(address: &str) -> bool {
    !address.is_empty() && address.contains('@')
}
