//! HTTP surface: health, status and the GitHub webhook receiver

pub mod handlers;
pub mod webhook;

use axum::{Router, routing};

pub use handlers::{root, status};
pub use webhook::handle_webhook;

use crate::SharedState;

pub const WEBHOOK_PATH: &str = "/webhooks/github";

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(root))
        .route("/status", routing::get(status))
        .route(WEBHOOK_PATH, routing::post(handle_webhook))
        .with_state(state)
}
