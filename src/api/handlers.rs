//! Health and status endpoints

use axum::{
    Json,
    extract::{Query, State as AxumState},
    response::IntoResponse,
};
use serde_json::json;
use std::collections::HashMap;

use crate::SharedState;

const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

/// Root health check endpoint
/// Supports ?format=json for detailed JSON response
pub async fn root(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if params.get("format").map(String::as_str) == Some("json") {
        Json(json!({
            "name": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": state.start_time.elapsed().as_secs(),
            "status": "healthy"
        }))
        .into_response()
    } else {
        format!("{SERVICE_NAME} - healthy").into_response()
    }
}

/// Server status: uptime, what is enabled, and the recent pipeline events
/// recorded by the background reviews.
pub async fn status(AxumState(state): AxumState<SharedState>) -> impl IntoResponse {
    let options = state.service.options();
    let events = state.events.snapshot();

    Json(json!({
        "server": {
            "name": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        },
        "review": {
            "push_review_enabled": options.push_review_enabled,
            "pr_review_enabled": options.pr_review_enabled,
            "model": state.config.ai.model,
            "channels": state.service.notifiers().channel_names(),
        },
        "events": {
            "count": events.len(),
            "recent": events,
        }
    }))
}
