//! Review orchestration: webhook admission, event dispatch, and the per-unit
//! fetch → analyze → submit → notify pipeline.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use crate::ai::DiffAnalyzer;
use crate::error::{Result, ReviewError};
use crate::github::{DiffFetcher, PullRequestReview};
use crate::mapper::{findings_to_comments, severity_to_decision};
use crate::notify::{CommitMetadata, NotifierSet};
use crate::review::StructuredReview;
use crate::signature::SignatureValidator;
use crate::unit::{ReviewUnit, UnitReport, UnitStatus};
use crate::webhook::{
    Commit, EventKind, PullRequestEvent, PushEvent, Repository, reviewable_action,
    validate_payload,
};

/// Event-type switches, read once from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReviewOptions {
    pub push_review_enabled: bool,
    pub pr_review_enabled: bool,
}

impl Default for ReviewOptions {
    fn default() -> Self {
        Self {
            push_review_enabled: true,
            pr_review_enabled: true,
        }
    }
}

/// A validated webhook, ready for background processing or deliberately ignored.
#[derive(Debug)]
pub enum Dispatch {
    Ignored(String),
    Push(PushEvent),
    PullRequest(PullRequestEvent),
}

pub struct ReviewService {
    validator: SignatureValidator,
    diffs: Arc<dyn DiffFetcher>,
    analyzer: Arc<dyn DiffAnalyzer>,
    notifiers: NotifierSet,
    options: ReviewOptions,
}

impl ReviewService {
    pub fn new(
        validator: SignatureValidator,
        diffs: Arc<dyn DiffFetcher>,
        analyzer: Arc<dyn DiffAnalyzer>,
        notifiers: NotifierSet,
        options: ReviewOptions,
    ) -> Self {
        Self {
            validator,
            diffs,
            analyzer,
            notifiers,
            options,
        }
    }

    pub fn options(&self) -> ReviewOptions {
        self.options
    }

    pub fn notifiers(&self) -> &NotifierSet {
        &self.notifiers
    }

    /// Synchronous part of webhook handling. Nothing in the body is looked at
    /// before the signature checks out.
    pub fn accept(
        &self,
        signature: Option<&str>,
        event: Option<&str>,
        raw_body: &[u8],
    ) -> Result<Dispatch> {
        self.validator.validate(signature, raw_body)?;

        let payload: serde_json::Value =
            serde_json::from_slice(raw_body).map_err(ReviewError::MalformedPayload)?;

        match EventKind::from_header(event) {
            EventKind::Other(name) => {
                info!(event = %name, "Ignoring unsupported event type");
                Ok(Dispatch::Ignored(format!("{name} event")))
            }
            EventKind::Push if !self.options.push_review_enabled => {
                info!("Push review disabled, ignoring push event");
                Ok(Dispatch::Ignored("push event (push review disabled)".into()))
            }
            EventKind::Push => Ok(Dispatch::Push(validate_payload(payload).inspect_err(
                |e| warn!(error = %e, "Invalid push payload"),
            )?)),
            EventKind::PullRequest => {
                let Some(action) = reviewable_action(&payload) else {
                    let action = payload
                        .get("action")
                        .and_then(|a| a.as_str())
                        .unwrap_or("unknown")
                        .to_string();
                    info!(action = %action, "Ignoring pull_request action");
                    return Ok(Dispatch::Ignored(format!("pull_request action '{action}'")));
                };
                info!(action = action, "Accepted pull_request event");
                Ok(Dispatch::PullRequest(validate_payload(payload).inspect_err(
                    |e| warn!(error = %e, "Invalid pull_request payload"),
                )?))
            }
        }
    }

    /// Starts the review of an accepted webhook without waiting for it. The
    /// webhook response never depends on the outcome; everything that happens
    /// afterwards is reported through tracing only. The returned handle resolves
    /// to the unit reports (empty if the run panicked) and may simply be dropped.
    pub fn detach_review(
        self: &Arc<Self>,
        dispatch: Dispatch,
        delivery: &str,
    ) -> JoinHandle<Vec<UnitReport>> {
        let service = Arc::clone(self);
        let span = info_span!("review", delivery = %delivery);
        let run = tokio::spawn(async move { service.run(dispatch).await }.instrument(span.clone()));

        tokio::spawn(
            async move {
                match run.await {
                    Ok(reports) => {
                        let reviewed = reports
                            .iter()
                            .filter(|r| r.status == UnitStatus::Reviewed)
                            .count();
                        info!(units = reports.len(), reviewed, "Review run finished");
                        reports
                    }
                    Err(e) => {
                        error!(error = %e, "Review run aborted");
                        Vec::new()
                    }
                }
            }
            .instrument(span),
        )
    }

    pub async fn run(&self, dispatch: Dispatch) -> Vec<UnitReport> {
        match dispatch {
            Dispatch::Ignored(_) => Vec::new(),
            Dispatch::Push(event) => self.process_push_event(&event).await,
            Dispatch::PullRequest(event) => vec![self.process_pull_request_event(&event).await],
        }
    }

    /// Reviews commits one at a time in push order, so a large push never bursts
    /// the analyzer or the GitHub API. A failed commit is skipped, not fatal.
    pub async fn process_push_event(&self, event: &PushEvent) -> Vec<UnitReport> {
        let repo = event.repository.display_name();
        if event.commits.is_empty() {
            info!(repo = %repo, "No commits found in push event");
            return Vec::new();
        }

        info!(
            repo = %repo,
            commits = event.commits.len(),
            "Starting review of push event"
        );
        let mut reports = Vec::with_capacity(event.commits.len());
        for commit in &event.commits {
            info!(commit = %commit.id, author = %commit.author.name, "Processing commit");
            reports.push(self.process_commit(&event.repository, commit).await);
        }
        info!(repo = %repo, "Finished processing push event");
        reports
    }

    async fn process_commit(&self, repository: &Repository, commit: &Commit) -> UnitReport {
        let unit = ReviewUnit::Commit {
            sha: commit.id.clone(),
        };
        let fetch = self
            .diffs
            .commit_diff(repository.owner_for_api(), &repository.name, &commit.id);
        let review = match self.review_unit(&unit, fetch).await {
            Ok(review) => review,
            Err(status) => return UnitReport::skipped(unit, status),
        };

        let metadata = CommitMetadata::for_commit(repository, commit);
        let sent = self
            .notifiers
            .notify(&review, &metadata, commit.author.email.as_deref())
            .await;
        UnitReport::reviewed(unit, false, sent)
    }

    pub async fn process_pull_request_event(&self, event: &PullRequestEvent) -> UnitReport {
        let owner = event.repository.owner_for_api();
        let repo = &event.repository.name;
        let number = event.pull_request.number;
        let unit = ReviewUnit::PullRequest { number };
        info!(
            unit = %unit,
            action = %event.action,
            repo = %event.repository.display_name(),
            "Processing pull request"
        );

        let fetch = self.diffs.pull_request_diff(owner, repo, number);
        let review = match self.review_unit(&unit, fetch).await {
            Ok(review) => review,
            Err(status) => return UnitReport::skipped(unit, status),
        };

        let submitted = if self.options.pr_review_enabled {
            self.submit_review(owner, repo, number, &review).await
        } else {
            false
        };

        let metadata = CommitMetadata::for_pull_request(event, Utc::now());
        let sent = self.notifiers.notify(&review, &metadata, None).await;
        UnitReport::reviewed(unit, submitted, sent)
    }

    /// Fetch and analyze one unit. Any failure ends the unit with a skip status.
    async fn review_unit(
        &self,
        unit: &ReviewUnit,
        fetch: impl Future<Output = Result<String>>,
    ) -> std::result::Result<StructuredReview, UnitStatus> {
        let diff = fetch.await.map_err(|e| {
            error!(unit = %unit, error = %e, "Failed to fetch diff, skipping");
            UnitStatus::SkippedDiffUnavailable
        })?;

        if diff.trim().is_empty() {
            warn!(unit = %unit, "Empty diff, skipping");
            return Err(UnitStatus::SkippedEmptyDiff);
        }

        info!(unit = %unit, "Analyzing changes");
        let review = self.analyzer.analyze_diff(&diff).await.map_err(|e| {
            error!(unit = %unit, error = %e, "Analysis failed, skipping");
            UnitStatus::SkippedAnalysisFailed
        })?;

        info!(
            unit = %unit,
            severity = %review.overall_severity,
            findings = review.findings.len(),
            "Review completed"
        );
        Ok(review)
    }

    async fn submit_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        review: &StructuredReview,
    ) -> bool {
        let submission = PullRequestReview {
            body: review.summary.clone(),
            event: severity_to_decision(review.overall_severity),
            comments: findings_to_comments(&review.findings),
        };

        match self.diffs.submit_review(owner, repo, number, &submission).await {
            Ok(()) => {
                info!(
                    pr = number,
                    decision = submission.event.as_str(),
                    comments = submission.comments.len(),
                    "Submitted pull request review"
                );
                true
            }
            Err(e) => {
                error!(pr = number, error = %e, "Failed to submit pull request review");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::ReviewDecision;
    use crate::notify::testing::RecordingNotifier;
    use crate::review::{Finding, LineRange, OverallSeverity, Severity};
    use crate::webhook::fixtures;
    use async_trait::async_trait;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "webhook-secret";

    #[derive(Default)]
    struct FakeGitHub {
        diffs: HashMap<String, Result<String>>,
        fetches: Mutex<Vec<String>>,
        submitted: Mutex<Vec<(u64, PullRequestReview)>>,
        fail_submit: bool,
    }

    impl FakeGitHub {
        fn with_diff(mut self, key: &str, diff: Result<String>) -> Self {
            self.diffs.insert(key.to_string(), diff);
            self
        }

        fn lookup(&self, key: String) -> Result<String> {
            self.fetches.lock().unwrap().push(key.clone());
            match self.diffs.get(&key) {
                Some(Ok(diff)) => Ok(diff.clone()),
                _ => Err(ReviewError::Upstream {
                    status: Some(404),
                    message: "Not Found".into(),
                }),
            }
        }
    }

    #[async_trait]
    impl DiffFetcher for FakeGitHub {
        async fn commit_diff(&self, _owner: &str, _repo: &str, sha: &str) -> Result<String> {
            self.lookup(sha.to_string())
        }

        async fn pull_request_diff(
            &self,
            _owner: &str,
            _repo: &str,
            number: u64,
        ) -> Result<String> {
            self.lookup(format!("pr-{number}"))
        }

        async fn submit_review(
            &self,
            _owner: &str,
            _repo: &str,
            number: u64,
            review: &PullRequestReview,
        ) -> Result<()> {
            self.submitted.lock().unwrap().push((number, review.clone()));
            if self.fail_submit {
                Err(ReviewError::Upstream {
                    status: Some(422),
                    message: "Unprocessable".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    struct FakeAnalyzer {
        review: Option<StructuredReview>,
        calls: AtomicUsize,
    }

    impl FakeAnalyzer {
        fn returning(review: StructuredReview) -> Arc<Self> {
            Arc::new(Self {
                review: Some(review),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                review: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DiffAnalyzer for FakeAnalyzer {
        async fn analyze_diff(&self, _diff: &str) -> Result<StructuredReview> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.review
                .clone()
                .ok_or_else(|| ReviewError::Analysis("AI returned an empty response.".into()))
        }
    }

    fn clean() -> StructuredReview {
        StructuredReview {
            summary: "Looks good.".into(),
            overall_severity: OverallSeverity::Clean,
            findings: vec![],
        }
    }

    fn critical() -> StructuredReview {
        StructuredReview {
            summary: "SQL injection.".into(),
            overall_severity: OverallSeverity::Critical,
            findings: vec![Finding {
                severity: Severity::Critical,
                file_path: "src/db.rs".into(),
                line_range: Some(LineRange { start: 10, end: 12 }),
                title: "SQL injection".into(),
                description: "User input is concatenated into a query.".into(),
                suggestion: Some("Bind parameters.".into()),
                code_suggestion: None,
            }],
        }
    }

    fn service(
        github: Arc<FakeGitHub>,
        analyzer: Arc<FakeAnalyzer>,
        notifiers: NotifierSet,
        options: ReviewOptions,
    ) -> Arc<ReviewService> {
        Arc::new(ReviewService::new(
            SignatureValidator::new(SECRET),
            github,
            analyzer,
            notifiers,
            options,
        ))
    }

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[tokio::test]
    async fn failed_commit_does_not_stop_the_batch() {
        let github = Arc::new(FakeGitHub::default().with_diff("bbb", Ok("+b".into())));
        let analyzer = FakeAnalyzer::returning(clean());
        let teams = RecordingNotifier::new("teams");
        let email = RecordingNotifier::new("email");
        let svc = service(
            github.clone(),
            analyzer.clone(),
            NotifierSet::new(vec![teams.clone()], Some(email.clone())),
            ReviewOptions::default(),
        );

        let event: PushEvent = validate_payload(fixtures::push(vec![
            fixtures::commit("aaa", Some("mona@example.com")),
            fixtures::commit("bbb", Some("mona@example.com")),
        ]))
        .unwrap();
        let reports = svc.process_push_event(&event).await;

        assert_eq!(*github.fetches.lock().unwrap(), vec!["aaa", "bbb"]);
        assert_eq!(reports[0].status, UnitStatus::SkippedDiffUnavailable);
        assert_eq!(reports[1].status, UnitStatus::Reviewed);
        assert_eq!(reports[1].notifications_sent, 2);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(teams.call_count(), 1);
        assert_eq!(email.call_count(), 1);
        assert!(github.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_without_commits_is_a_no_op() {
        let github = Arc::new(FakeGitHub::default());
        let analyzer = FakeAnalyzer::returning(clean());
        let teams = RecordingNotifier::new("teams");
        let email = RecordingNotifier::new("email");
        let svc = service(
            github.clone(),
            analyzer.clone(),
            NotifierSet::new(vec![teams.clone()], Some(email.clone())),
            ReviewOptions::default(),
        );

        let body = fixtures::push(vec![]).to_string();
        let dispatch = svc
            .accept(Some(&sign(body.as_bytes())), Some("push"), body.as_bytes())
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Push(ref e) if e.commits.is_empty()));

        let reports = svc.run(dispatch).await;

        assert!(reports.is_empty());
        assert!(github.fetches.lock().unwrap().is_empty());
        assert!(github.submitted.lock().unwrap().is_empty());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(teams.call_count(), 0);
        assert_eq!(email.call_count(), 0);
    }

    #[tokio::test]
    async fn analysis_failure_skips_commit() {
        let github = Arc::new(
            FakeGitHub::default()
                .with_diff("aaa", Ok("+a".into()))
                .with_diff("bbb", Ok("   \n".into())),
        );
        let teams = RecordingNotifier::new("teams");
        let svc = service(
            github,
            FakeAnalyzer::failing(),
            NotifierSet::new(vec![teams.clone()], None),
            ReviewOptions::default(),
        );

        let event: PushEvent = validate_payload(fixtures::push(vec![
            fixtures::commit("aaa", None),
            fixtures::commit("bbb", None),
        ]))
        .unwrap();
        let reports = svc.process_push_event(&event).await;

        assert_eq!(reports[0].status, UnitStatus::SkippedAnalysisFailed);
        assert_eq!(reports[1].status, UnitStatus::SkippedEmptyDiff);
        assert_eq!(teams.call_count(), 0);
    }

    #[tokio::test]
    async fn bot_author_gets_no_email() {
        let github = Arc::new(FakeGitHub::default().with_diff("aaa", Ok("+a".into())));
        let teams = RecordingNotifier::new("teams");
        let email = RecordingNotifier::new("email");
        let svc = service(
            github,
            FakeAnalyzer::returning(clean()),
            NotifierSet::new(vec![teams.clone()], Some(email.clone())),
            ReviewOptions::default(),
        );

        let event: PushEvent =
            validate_payload(fixtures::push(vec![fixtures::commit("aaa", Some("bot"))])).unwrap();
        let reports = svc.process_push_event(&event).await;

        assert_eq!(reports[0].notifications_sent, 1);
        assert_eq!(teams.call_count(), 1);
        assert_eq!(email.call_count(), 0);
    }

    #[tokio::test]
    async fn critical_pull_request_requests_changes() {
        let github = Arc::new(FakeGitHub::default().with_diff("pr-42", Ok("+query".into())));
        let teams = RecordingNotifier::new("teams");
        let chat = RecordingNotifier::new("chat");
        let svc = service(
            github.clone(),
            FakeAnalyzer::returning(critical()),
            NotifierSet::new(vec![teams.clone(), chat.clone()], None),
            ReviewOptions::default(),
        );

        let event: PullRequestEvent =
            validate_payload(fixtures::pull_request("opened")).unwrap();
        let report = svc.process_pull_request_event(&event).await;

        assert_eq!(report.status, UnitStatus::Reviewed);
        assert!(report.review_submitted);

        let submitted = github.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        let (number, review) = &submitted[0];
        assert_eq!(*number, 42);
        assert_eq!(review.event, ReviewDecision::RequestChanges);
        assert_eq!(review.body, "SQL injection.");
        assert_eq!(review.comments.len(), 1);
        assert_eq!(review.comments[0].line, 12);
        assert_eq!(review.comments[0].path, "src/db.rs");

        for notifier in [&teams, &chat] {
            let calls = notifier.calls.lock().unwrap();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].0, critical());
            assert_eq!(calls[0].1.author, "hubot");
            assert_eq!(calls[0].1.url, "https://github.com/octo-org/hello-world/pull/42");
        }
    }

    #[tokio::test]
    async fn failed_submission_still_notifies() {
        let github = Arc::new(FakeGitHub {
            fail_submit: true,
            ..FakeGitHub::default()
        }
        .with_diff("pr-42", Ok("+x".into())));
        let teams = RecordingNotifier::new("teams");
        let svc = service(
            github,
            FakeAnalyzer::returning(clean()),
            NotifierSet::new(vec![teams.clone()], None),
            ReviewOptions::default(),
        );

        let event: PullRequestEvent =
            validate_payload(fixtures::pull_request("synchronize")).unwrap();
        let report = svc.process_pull_request_event(&event).await;

        assert!(!report.review_submitted);
        assert_eq!(report.notifications_sent, 1);
        assert_eq!(teams.call_count(), 1);
    }

    #[tokio::test]
    async fn pr_review_submission_can_be_disabled() {
        let github = Arc::new(FakeGitHub::default().with_diff("pr-42", Ok("+x".into())));
        let svc = service(
            github.clone(),
            FakeAnalyzer::returning(clean()),
            NotifierSet::default(),
            ReviewOptions {
                pr_review_enabled: false,
                ..ReviewOptions::default()
            },
        );

        let event: PullRequestEvent =
            validate_payload(fixtures::pull_request("reopened")).unwrap();
        let report = svc.process_pull_request_event(&event).await;

        assert_eq!(report.status, UnitStatus::Reviewed);
        assert!(github.submitted.lock().unwrap().is_empty());
    }

    #[test]
    fn accept_checks_signature_before_parsing() {
        let svc = service(
            Arc::new(FakeGitHub::default()),
            FakeAnalyzer::returning(clean()),
            NotifierSet::default(),
            ReviewOptions::default(),
        );
        let body = b"not json";
        assert!(matches!(
            svc.accept(None, Some("push"), body),
            Err(ReviewError::Authentication(_))
        ));
        assert!(matches!(
            svc.accept(Some(&sign(body)), Some("push"), body),
            Err(ReviewError::MalformedPayload(_))
        ));
    }

    #[test]
    fn accept_dispatches_by_event_type() {
        let svc = service(
            Arc::new(FakeGitHub::default()),
            FakeAnalyzer::returning(clean()),
            NotifierSet::default(),
            ReviewOptions {
                push_review_enabled: false,
                pr_review_enabled: true,
            },
        );

        let push = fixtures::push(vec![]).to_string();
        let dispatch = svc
            .accept(Some(&sign(push.as_bytes())), Some("push"), push.as_bytes())
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Ignored(_)));

        let closed = fixtures::pull_request("closed").to_string();
        let dispatch = svc
            .accept(Some(&sign(closed.as_bytes())), Some("pull_request"), closed.as_bytes())
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Ignored(ref why) if why.contains("closed")));

        let opened = fixtures::pull_request("opened").to_string();
        let dispatch = svc
            .accept(Some(&sign(opened.as_bytes())), Some("pull_request"), opened.as_bytes())
            .unwrap();
        assert!(matches!(dispatch, Dispatch::PullRequest(ref e) if e.number == 42));

        let ping = r#"{"zen":"Design for failure."}"#;
        let dispatch = svc
            .accept(Some(&sign(ping.as_bytes())), Some("ping"), ping.as_bytes())
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Ignored(_)));
    }

    #[test]
    fn accept_reports_schema_failures() {
        let svc = service(
            Arc::new(FakeGitHub::default()),
            FakeAnalyzer::returning(clean()),
            NotifierSet::default(),
            ReviewOptions::default(),
        );
        let body = r#"{"ref": "refs/heads/main"}"#;
        let err = svc
            .accept(Some(&sign(body.as_bytes())), Some("push"), body.as_bytes())
            .unwrap_err();
        assert!(matches!(err, ReviewError::InvalidPayload { .. }));
    }

    #[tokio::test]
    async fn detached_review_reports_when_done() {
        let github = Arc::new(FakeGitHub::default().with_diff("aaa", Ok("+a".into())));
        let teams = RecordingNotifier::new("teams");
        let svc = service(
            github,
            FakeAnalyzer::returning(clean()),
            NotifierSet::new(vec![teams.clone()], None),
            ReviewOptions::default(),
        );
        let event: PushEvent =
            validate_payload(fixtures::push(vec![fixtures::commit("aaa", None)])).unwrap();

        let reports = svc
            .detach_review(Dispatch::Push(event), "delivery-1")
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(teams.call_count(), 1);
    }
}
