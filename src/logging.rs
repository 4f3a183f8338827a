use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_core::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::{Result, ReviewError};

const LOG_FILE_PREFIX: &str = "code_review";
const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Which part of the pipeline emitted an event, derived from the event target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Dispatch,
    GitHub,
    Analysis,
    Review,
    Notification,
    System,
}

impl PipelineStage {
    fn from_target(target: &str) -> Self {
        match target {
            t if t.contains("::api") || t.contains("::webhook") || t.contains("::signature") => {
                PipelineStage::Dispatch
            }
            t if t.contains("::github") => PipelineStage::GitHub,
            t if t.contains("::ai") => PipelineStage::Analysis,
            t if t.contains("::notify") => PipelineStage::Notification,
            t if t.contains("::service") => PipelineStage::Review,
            _ => PipelineStage::System,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PipelineEvent {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub stage: PipelineStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub message: String,
}

pub struct FileLogger {
    log_directory: PathBuf,
    rotation: Rotation,
}

impl FileLogger {
    pub fn new(log_directory: impl Into<PathBuf>) -> Self {
        Self {
            log_directory: log_directory.into(),
            rotation: Rotation::DAILY,
        }
    }

    pub fn setup_file_logging(&self) -> Result<(NonBlocking, WorkerGuard)> {
        std::fs::create_dir_all(&self.log_directory)?;
        let file_appender =
            RollingFileAppender::new(self.rotation.clone(), &self.log_directory, LOG_FILE_PREFIX);
        Ok(tracing_appender::non_blocking(file_appender))
    }
}

/// Bounded buffer of recent pipeline events, oldest evicted first.
/// Cloning shares the underlying buffer.
#[derive(Clone)]
pub struct RecentEvents {
    inner: Arc<Mutex<VecDeque<PipelineEvent>>>,
    capacity: usize,
}

impl RecentEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, event: PipelineEvent) {
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut events) = self.inner.lock() {
            while events.len() >= self.capacity {
                events.pop_front();
            }
            events.push_back(event);
        }
    }

    /// Newest last.
    pub fn snapshot(&self) -> Vec<PipelineEvent> {
        self.inner
            .lock()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct PipelineEventVisitor {
    message: String,
    unit: Option<String>,
}

impl tracing::field::Visit for PipelineEventVisitor {
    fn record_debug(&mut self, field: &tracing_core::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "unit" => self.unit = Some(format!("{:?}", value)),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &tracing_core::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "unit" => self.unit = Some(value.to_string()),
            _ => {}
        }
    }
}

/// Tracing layer that copies pipeline activity into a [`RecentEvents`] buffer:
/// warnings and errors from this crate, plus informational events tagged with
/// a `unit` field.
#[derive(Clone)]
pub struct PipelineEventLayer {
    events: RecentEvents,
}

impl PipelineEventLayer {
    pub fn new(events: RecentEvents) -> Self {
        Self { events }
    }

    fn is_pipeline_target(metadata: &Metadata<'_>) -> bool {
        metadata.target().starts_with(CRATE_TARGET)
    }
}

impl<S: Subscriber> Layer<S> for PipelineEventLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        if !Self::is_pipeline_target(metadata) {
            return;
        }
        let level = *metadata.level();
        let tagged = metadata.fields().field("unit").is_some();
        if level > Level::WARN && !(level == Level::INFO && tagged) {
            return;
        }

        let mut visitor = PipelineEventVisitor::default();
        event.record(&mut visitor);

        self.events.push(PipelineEvent {
            timestamp: Utc::now(),
            level: level.to_string(),
            stage: PipelineStage::from_target(metadata.target()),
            unit: visitor.unit,
            message: visitor.message,
        });
    }
}

/// Installs the global subscriber. The returned guard must be held for as long
/// as file output should keep flushing.
pub fn setup_logging(config: &LoggingConfig) -> Result<(RecentEvents, Option<WorkerGuard>)> {
    let events = RecentEvents::new(config.max_recent_events);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let (writer, guard) = FileLogger::new(directory).setup_file_logging()?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(PipelineEventLayer::new(events.clone()))
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| ReviewError::ConfigError(format!("Failed to install logging: {e}")))?;

    Ok((events, guard))
}
