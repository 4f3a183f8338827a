//! Microsoft Teams channel: posts an Adaptive Card to an incoming webhook.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::{CommitMetadata, Notifier};
use crate::config::TeamsConfig;
use crate::error::{Result, ReviewError};
use crate::review::{Finding, OverallSeverity, Severity, StructuredReview};

const MAX_CARD_FINDINGS: usize = 10;
const LOGO_URL: &str = "https://cdn-icons-png.flaticon.com/512/2111/2111432.png";

pub struct TeamsNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl TeamsNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ReviewError::ConfigError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    pub fn from_config(config: &TeamsConfig) -> Result<Self> {
        let url = config
            .webhook_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ReviewError::ConfigError("Teams webhook URL is missing".into()))?;
        Self::new(url)
    }

    fn masked_url(&self) -> String {
        let visible: String = self.webhook_url.chars().take(20).collect();
        format!("{visible}...")
    }
}

#[async_trait]
impl Notifier for TeamsNotifier {
    fn name(&self) -> &'static str {
        "teams"
    }

    async fn send(
        &self,
        review: &StructuredReview,
        metadata: &CommitMetadata,
        _recipient: Option<&str>,
    ) -> Result<()> {
        debug!("Sending Adaptive Card to Teams webhook: {}", self.masked_url());

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&adaptive_card(review, metadata))
            .send()
            .await
            .map_err(|e| {
                ReviewError::Notification(format!("Failed to send Teams notification: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "No response body".to_string());
            return Err(ReviewError::Notification(format!(
                "Teams responded with {status}: {text}"
            )));
        }
        Ok(())
    }
}

fn overall_style(severity: OverallSeverity) -> (&'static str, &'static str) {
    match severity {
        OverallSeverity::Critical => ("Attention", "🔴"),
        OverallSeverity::Warning => ("Warning", "🟠"),
        OverallSeverity::Info => ("Accent", "🔵"),
        OverallSeverity::Clean => ("Good", "🟢"),
    }
}

fn finding_style(severity: Severity) -> (&'static str, &'static str) {
    match severity {
        Severity::Critical => ("Attention", "🔴"),
        Severity::Warning => ("Warning", "🟠"),
        Severity::Info => ("Accent", "🔵"),
    }
}

fn location(finding: &Finding) -> String {
    match finding.line_range {
        Some(range) => format!("File: {} (L{}-{})", finding.file_path, range.start, range.end),
        None => format!("File: {}", finding.file_path),
    }
}

fn finding_block(finding: &Finding) -> Value {
    let (color, icon) = finding_style(finding.severity);
    let mut items = vec![
        json!({
            "type": "TextBlock",
            "text": format!("{icon} **{}**", finding.title),
            "wrap": true,
            "color": color
        }),
        json!({
            "type": "TextBlock",
            "spacing": "None",
            "text": location(finding),
            "isSubtle": true,
            "wrap": true,
            "size": "Small"
        }),
        json!({
            "type": "TextBlock",
            "text": finding.description,
            "wrap": true,
            "size": "Small"
        }),
    ];

    if let Some(suggestion) = &finding.suggestion {
        items.push(json!({
            "type": "TextBlock",
            "text": format!("**Suggestion:** {suggestion}"),
            "wrap": true,
            "size": "Small",
            "spacing": "Small"
        }));
    }
    if let Some(code) = &finding.code_suggestion {
        items.push(json!({
            "type": "Container",
            "style": "emphasis",
            "spacing": "Small",
            "items": [{
                "type": "TextBlock",
                "text": code,
                "wrap": true,
                "fontType": "Monospace",
                "size": "Small"
            }]
        }));
    }

    json!({ "type": "Container", "separator": true, "items": items })
}

/// Adaptive Card 1.4 wrapped in the `message` envelope incoming webhooks expect.
pub fn adaptive_card(review: &StructuredReview, metadata: &CommitMetadata) -> Value {
    let (color, icon) = overall_style(review.overall_severity);
    let findings: Vec<Value> = review
        .findings
        .iter()
        .take(MAX_CARD_FINDINGS)
        .map(finding_block)
        .collect();

    json!({
        "type": "message",
        "attachments": [{
            "contentType": "application/vnd.microsoft.card.adaptive",
            "content": {
                "type": "AdaptiveCard",
                "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                "version": "1.4",
                "body": [
                    {
                        "type": "ColumnSet",
                        "columns": [
                            {
                                "type": "Column",
                                "width": "auto",
                                "items": [{ "type": "Image", "url": LOGO_URL, "size": "Small" }]
                            },
                            {
                                "type": "Column",
                                "width": "stretch",
                                "items": [
                                    {
                                        "type": "TextBlock",
                                        "text": format!("AI Review: {}", metadata.repo),
                                        "weight": "Bolder",
                                        "size": "Medium"
                                    },
                                    {
                                        "type": "TextBlock",
                                        "text": format!(
                                            "{icon} Status: {}",
                                            review.overall_severity.as_str().to_uppercase()
                                        ),
                                        "color": color,
                                        "spacing": "None"
                                    }
                                ]
                            }
                        ]
                    },
                    {
                        "type": "Container",
                        "style": "emphasis",
                        "bleed": true,
                        "items": [{
                            "type": "TextBlock",
                            "text": review.summary,
                            "wrap": true,
                            "italic": true
                        }]
                    },
                    {
                        "type": "FactSet",
                        "facts": [
                            { "title": "Author", "value": metadata.author },
                            { "title": "Date", "value": metadata.date },
                            { "title": "Commit", "value": format!("[View on GitHub]({})", metadata.url) }
                        ]
                    },
                    { "type": "Container", "items": findings }
                ],
                "actions": [{
                    "type": "Action.OpenUrl",
                    "title": "View Commit on GitHub",
                    "url": metadata.url
                }]
            }
        }]
    })
}
