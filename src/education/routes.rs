//! REST endpoints for education events.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use super::logger::{EducationAction, EducationLogger};
use crate::api::{ApiError, parse_submission_id, required};

/// Shared state for education routes.
#[derive(Clone)]
pub struct EducationRouteState {
    pub logger: EducationLogger,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackEventRequest {
    submission_id: Option<String>,
    step_name: Option<String>,
    step_type: Option<String>,
    action: Option<String>,
    time_spent: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsQuery {
    submission_id: Option<String>,
}

/// POST /api/education-events
async fn track_event(
    State(state): State<EducationRouteState>,
    body: Result<Json<TrackEventRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    const MISSING: &str = "submissionId, stepName, and stepType are required";
    let submission_id = required(&req.submission_id, MISSING)?;
    let step_name = required(&req.step_name, MISSING)?;
    let step_type = required(&req.step_type, MISSING)?;
    let action = match req.action.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        Some(raw) => raw.parse::<EducationAction>().map_err(ApiError::BadRequest)?,
        None => EducationAction::default(),
    };
    let id = parse_submission_id(submission_id)?;

    let event = state
        .logger
        .try_log_event(id, step_name, step_type, action, req.time_spent.filter(|t| *t >= 0))
        .await?;

    Ok(Json(json!({ "success": true, "educationEvent": event })))
}

/// GET /api/education-events?submissionId=
async fn list_events(
    State(state): State<EducationRouteState>,
    query: Result<Query<EventsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(q) = query?;
    let raw = required(&q.submission_id, "submissionId is required")?;
    let id = parse_submission_id(raw)?;
    let events = state.logger.events_for(id).await?;
    Ok(Json(json!(events)))
}

/// Build the education REST routes.
pub fn education_routes(state: EducationRouteState) -> Router {
    Router::new()
        .route("/api/education-events", post(track_event).get(list_events))
        .with_state(state)
}
