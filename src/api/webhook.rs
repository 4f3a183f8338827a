//! Webhook handler for GitHub push and pull_request events

use axum::{
    Json,
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::service::Dispatch;
use crate::signature::SIGNATURE_HEADER;
use crate::webhook::{DELIVERY_HEADER, EVENT_HEADER};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Handles the GitHub webhook POST request.
///
/// Validation happens before responding; the review itself runs detached, so
/// GitHub gets its answer without waiting on the diff, the AI or any channel.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = header(&headers, DELIVERY_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());
    let event = header(&headers, EVENT_HEADER);
    let _span = info_span!("webhook", delivery = %delivery, event = event.unwrap_or("unknown"))
        .entered();

    let dispatch = match state
        .service
        .accept(header(&headers, SIGNATURE_HEADER), event, &body)
    {
        Ok(dispatch) => dispatch,
        Err(e) => {
            warn!(error = %e, "Rejected webhook");
            return e.into_response();
        }
    };

    let message = match dispatch {
        Dispatch::Ignored(reason) => format!("Ignored {reason}"),
        dispatch => {
            info!("Webhook accepted, starting review");
            state.service.detach_review(dispatch, &delivery);
            "Received".to_string()
        }
    };

    (StatusCode::OK, Json(json!({ "message": message }))).into_response()
}
