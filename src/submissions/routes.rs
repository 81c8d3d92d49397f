//! REST endpoints for creating, updating and reading submissions.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::{ApiError, parse_submission_id, required};
use crate::flow::snapshot::{SnapshotPatch, SubmissionSnapshot, validate_email};
use crate::flow::step::{StepName, SubmissionStatus};
use crate::store::{Database, FeedbackPatch, NewSubmission, RetentionPatch, SubmissionPatch};

#[derive(Clone)]
pub struct SubmissionRouteState {
    pub db: Arc<dyn Database>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveSubmissionRequest {
    submission_id: Option<String>,
    current_step: Option<String>,
    #[serde(flatten)]
    fields: SnapshotPatch,
}

#[derive(Debug, Deserialize)]
struct GetSubmissionQuery {
    id: Option<String>,
}

const MISSING_REQUIRED: &str = "Email and current step are required";

/// POST /api/submissions
///
/// Creates a submission when `submissionId` is absent, otherwise updates it.
async fn save_submission(
    State(state): State<SubmissionRouteState>,
    body: Result<Json<SaveSubmissionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    let email = required(&req.fields.email, MISSING_REQUIRED)?.to_string();
    let step = required(&req.current_step, MISSING_REQUIRED)?
        .parse::<StepName>()
        .map_err(|e| ApiError::BadRequest(format!("Invalid current step: {}", e.0)))?;
    validate_email(&email)?;

    let id = match req.submission_id.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => {
            let id = parse_submission_id(raw)?;
            update(&*state.db, id, email, step, &req.fields).await?;
            id
        }
        None => create(&*state.db, email, step, &req.fields).await?,
    };

    let submission = state.db.get_submission(id).await?;
    Ok(Json(json!({
        "success": true,
        "submissionId": id,
        "submission": submission,
    })))
}

fn retention_patch(step: StepName, fields: &SnapshotPatch) -> RetentionPatch {
    let mut patch = RetentionPatch::from_patch(fields);
    if step == StepName::Retention {
        patch.offer_presented = Some(true);
    }
    patch
}

async fn create(
    db: &dyn Database,
    email: String,
    step: StepName,
    fields: &SnapshotPatch,
) -> Result<Uuid, ApiError> {
    if fields.touches_feedback() {
        let mut snapshot = SubmissionSnapshot::default();
        snapshot.merge(fields);
        snapshot.validate_feedback()?;
    }
    let feedback = fields
        .touches_feedback()
        .then(|| FeedbackPatch::from_patch(fields));
    let created = db
        .create_submission(NewSubmission {
            email,
            user_name: fields.user_name.clone(),
            current_step: step,
            status: SubmissionStatus::derive(step, fields.retention_accepted),
            feedback,
        })
        .await?;

    let retention = retention_patch(step, fields);
    if !retention.is_empty() {
        db.upsert_retention(created.id, retention).await?;
    }
    tracing::info!(submission_id = %created.id, step = %step, "Submission created via API");
    Ok(created.id)
}

async fn update(
    db: &dyn Database,
    id: Uuid,
    email: String,
    step: StepName,
    fields: &SnapshotPatch,
) -> Result<(), ApiError> {
    let existing = db.get_submission(id).await?;
    let mut snapshot = existing.snapshot();
    snapshot.merge(fields);
    if fields.touches_feedback() {
        snapshot.validate_feedback()?;
    }

    db.update_submission(
        id,
        SubmissionPatch {
            email: Some(email),
            user_name: fields.user_name.clone(),
            current_step: Some(step),
            status: Some(SubmissionStatus::derive(step, snapshot.retention_accepted)),
        },
    )
    .await?;

    if fields.touches_feedback() {
        db.upsert_feedback(id, FeedbackPatch::from_patch(fields)).await?;
    }
    let retention = retention_patch(step, fields);
    if !retention.is_empty() {
        db.upsert_retention(id, retention).await?;
    }
    Ok(())
}

/// GET /api/submissions?id=
async fn get_submission(
    State(state): State<SubmissionRouteState>,
    query: Result<Query<GetSubmissionQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(q) = query?;
    let id = parse_submission_id(required(&q.id, "Submission ID is required")?)?;
    let submission = state.db.get_submission(id).await?;
    Ok(Json(json!(submission)))
}

pub fn submission_routes(state: SubmissionRouteState) -> Router {
    Router::new()
        .route("/api/submissions", post(save_submission).get(get_submission))
        .with_state(state)
}
