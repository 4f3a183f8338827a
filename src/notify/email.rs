//! Email channel: HTML review summaries over SMTP.

use async_trait::async_trait;
use html_escape::encode_text;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt::Write as _;

use super::{CommitMetadata, Notifier};
use crate::config::EmailConfig;
use crate::error::{Result, ReviewError};
use crate::review::{Finding, OverallSeverity, Severity, StructuredReview};

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    default_to: Option<String>,
}

impl EmailNotifier {
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let missing = |field: &str| ReviewError::ConfigError(format!("Missing email {field}"));
        let host = config.host.as_deref().ok_or_else(|| missing("host"))?;
        let user = config.user.clone().ok_or_else(|| missing("user"))?;
        let pass = config.pass.clone().ok_or_else(|| missing("pass"))?;
        let from = config
            .sender()
            .ok_or_else(|| missing("sender"))?
            .parse::<Mailbox>()
            .map_err(|e| ReviewError::ConfigError(format!("Invalid sender address: {e}")))?;

        // `secure` means implicit TLS from the first byte; otherwise upgrade with STARTTLS.
        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| ReviewError::ConfigError(format!("Invalid SMTP relay '{host}': {e}")))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(user, pass))
            .build();

        Ok(Self {
            transport,
            from,
            default_to: config.to.clone().filter(|t| !t.is_empty()),
        })
    }

    fn build_message(
        &self,
        review: &StructuredReview,
        metadata: &CommitMetadata,
        to: &str,
    ) -> Result<Message> {
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| ReviewError::Notification(format!("Invalid recipient '{to}': {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!(
                "[{}] AI Code Review: {}",
                review.overall_severity.as_str().to_uppercase(),
                metadata.repo
            ))
            .header(ContentType::TEXT_HTML)
            .body(render_html(review, metadata))
            .map_err(|e| ReviewError::Notification(format!("Failed to build email: {e}")))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(
        &self,
        review: &StructuredReview,
        metadata: &CommitMetadata,
        recipient: Option<&str>,
    ) -> Result<()> {
        let to = recipient
            .or(self.default_to.as_deref())
            .ok_or_else(|| ReviewError::Notification("No recipient email provided".into()))?;

        let message = self.build_message(review, metadata, to)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| ReviewError::Notification(format!("Failed to send email: {e}")))?;
        Ok(())
    }
}

fn overall_color(severity: OverallSeverity) -> &'static str {
    match severity {
        OverallSeverity::Critical => "#dc2626",
        OverallSeverity::Warning => "#f59e0b",
        OverallSeverity::Info => "#3b82f6",
        OverallSeverity::Clean => "#10b981",
    }
}

fn finding_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#dc2626",
        Severity::Warning => "#f59e0b",
        Severity::Info => "#3b82f6",
    }
}

fn render_finding(out: &mut String, finding: &Finding) {
    let severity = finding.severity.as_str();
    let color = finding_color(finding.severity);
    let range = finding
        .line_range
        .map(|r| format!(" (L{}-{})", r.start, r.end))
        .unwrap_or_default();

    let _ = write!(
        out,
        r#"<div style="margin-bottom: 20px; padding: 15px; border-left: 5px solid {color}; background-color: #f9f9f9;">
<h3 style="margin: 0 0 10px 0; color: #333;"><span style="color: {color};">[{}]</span> {}</h3>
<p style="margin: 5px 0;"><strong>File:</strong> {}{range}</p>
<p style="margin: 5px 0;">{}</p>"#,
        severity.to_uppercase(),
        encode_text(&finding.title),
        encode_text(&finding.file_path),
        encode_text(&finding.description),
    );
    if let Some(suggestion) = &finding.suggestion {
        let _ = write!(
            out,
            r#"<p style="margin: 5px 0;"><strong>Suggestion:</strong> {}</p>"#,
            encode_text(suggestion)
        );
    }
    if let Some(code) = &finding.code_suggestion {
        let _ = write!(
            out,
            r#"<pre style="background: #e5e7eb; padding: 10px; border-radius: 5px; overflow-x: auto;"><code>{}</code></pre>"#,
            encode_text(code)
        );
    }
    out.push_str("</div>\n");
}

pub(crate) fn render_html(review: &StructuredReview, metadata: &CommitMetadata) -> String {
    let overall = review.overall_severity.as_str();
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<div style="font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto;">
<h1 style="border-bottom: 2px solid #eee; padding-bottom: 10px;">AI Code Review</h1>
<div style="background-color: #f3f4f6; padding: 15px; border-radius: 5px; margin-bottom: 20px;">
<p style="margin: 5px 0;"><strong>Repository:</strong> {repo}</p>
<p style="margin: 5px 0;"><strong>Author:</strong> {author}</p>
<p style="margin: 5px 0;"><strong>Date:</strong> {date}</p>
<p style="margin: 5px 0;"><strong>Commit:</strong> <a href="{url}">{url}</a></p>
</div>
<div style="padding: 15px; background-color: {color}; color: white; border-radius: 5px; margin-bottom: 20px;">
<h2 style="margin: 0;">Overall Status: {status}</h2>
<p style="margin: 5px 0 0 0;">{summary}</p>
</div>
<h2>Findings</h2>
"#,
        repo = encode_text(&metadata.repo),
        author = encode_text(&metadata.author),
        date = encode_text(&metadata.date),
        url = html_escape::encode_double_quoted_attribute(&metadata.url),
        color = overall_color(review.overall_severity),
        status = overall.to_uppercase(),
        summary = encode_text(&review.summary),
    );
    for finding in &review.findings {
        render_finding(&mut html, finding);
    }
    html.push_str("</div>\n");
    html
}
