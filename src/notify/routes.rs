//! REST endpoint for sending a transactional email directly.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use super::dispatcher::{DeliveryOutcome, NotificationDispatcher};
use super::email_type::EmailType;
use super::templates::EmailPayload;
use crate::api::{ApiError, parse_submission_id, required};

#[derive(Clone)]
pub struct NotifyRouteState {
    pub dispatcher: NotificationDispatcher,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest {
    email_type: Option<String>,
    data: Option<Value>,
    submission_id: Option<String>,
}

/// POST /api/send-email
///
/// Delivery failures are reported in the body with `success: false`, not as
/// an HTTP error.
async fn send_email(
    State(state): State<NotifyRouteState>,
    body: Result<Json<SendEmailRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    let raw_type = required(&req.email_type, "Missing emailType or data")?;
    let data = req
        .data
        .filter(|d| !d.is_null())
        .ok_or_else(|| ApiError::BadRequest("Missing emailType or data".into()))?;
    let email_type: EmailType = raw_type.parse().map_err(ApiError::BadRequest)?;
    let payload: EmailPayload = serde_json::from_value(data)
        .map_err(|e| ApiError::BadRequest(format!("Invalid email data: {e}")))?;
    let submission_id = match req.submission_id.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(parse_submission_id(raw)?),
        None => None,
    };

    let outcome = state.dispatcher.send(email_type, &payload, submission_id).await;
    let mut body = json!({
        "success": outcome.is_sent(),
        "status": outcome.status(),
        "emailType": email_type,
    });
    match outcome {
        DeliveryOutcome::Sent { message_id } => body["messageId"] = json!(message_id),
        DeliveryOutcome::Failed { reason } => body["error"] = json!(reason),
        DeliveryOutcome::AlreadySent => {}
    }
    Ok(Json(body))
}

pub fn notify_routes(state: NotifyRouteState) -> Router {
    Router::new()
        .route("/api/send-email", post(send_email))
        .with_state(state)
}
