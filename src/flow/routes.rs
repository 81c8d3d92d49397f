//! REST endpoint driving the wizard one step at a time.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use super::controller::{StepInput, Transition, WizardController};
use super::snapshot::SnapshotPatch;
use super::step::StepName;
use crate::api::{ApiError, parse_submission_id, required};
use crate::education::EducationAction;

#[derive(Clone)]
pub struct WizardRouteState {
    pub controller: Arc<WizardController>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvanceRequest {
    submission_id: Option<String>,
    current_step: Option<String>,
    #[serde(default)]
    data: SnapshotPatch,
    action: Option<String>,
    time_spent: Option<i64>,
}

/// POST /api/wizard/advance
async fn advance(
    State(state): State<WizardRouteState>,
    body: Result<Json<AdvanceRequest>, JsonRejection>,
) -> Result<Json<Transition>, ApiError> {
    let Json(req) = body?;
    let step = required(&req.current_step, "currentStep is required")?
        .parse::<StepName>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let action = req
        .action
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .map(str::parse::<EducationAction>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let submission_id = req
        .submission_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(parse_submission_id)
        .transpose()?;

    let mut session = state.controller.load_session(submission_id).await?;
    let input = StepInput {
        step,
        patch: req.data,
        action,
        time_spent: req.time_spent.filter(|t| *t >= 0),
    };
    let transition = state.controller.advance(&mut session, input).await?;
    Ok(Json(transition))
}

pub fn wizard_routes(state: WizardRouteState) -> Router {
    Router::new()
        .route("/api/wizard/advance", post(advance))
        .with_state(state)
}
