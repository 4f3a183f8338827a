pub mod ai;
pub mod api;
pub mod config;
pub mod error;
pub mod github;
pub mod logging;
pub mod mapper;
pub mod notify;
pub mod review;
pub mod service;
pub mod signature;
pub mod unit;
pub mod webhook;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use config::ReviewConfig;
use logging::RecentEvents;
use service::ReviewService;

pub struct AppState {
    pub service: Arc<ReviewService>,
    pub config: Arc<ReviewConfig>,
    pub events: RecentEvents,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        service: Arc<ReviewService>,
        config: Arc<ReviewConfig>,
        events: RecentEvents,
    ) -> Self {
        Self {
            service,
            config,
            events,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
