//! HTTP error mapping shared by every router.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, LoggingError, ValidationError, WizardError};

/// Errors a handler can answer with.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Validation(ValidationError),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, field) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Validation(v) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                v.message,
                Some(v.field.to_string()),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
                field,
            }),
        )
            .into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Validation(v) => ApiError::Validation(v),
            DatabaseError::NotFound { entity, .. } => {
                ApiError::NotFound(format!("{} not found", capitalize(&entity)))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<LoggingError> for ApiError {
    fn from(err: LoggingError) -> Self {
        match err {
            LoggingError::UnknownSubmission(_) => {
                ApiError::NotFound("Submission not found".to_string())
            }
            LoggingError::Write(db) => db.into(),
        }
    }
}

impl From<WizardError> for ApiError {
    fn from(err: WizardError) -> Self {
        match err {
            WizardError::StepMismatch { .. } => ApiError::Conflict(err.to_string()),
            WizardError::Validation(v) => ApiError::Validation(v),
            WizardError::Database(db) => db.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid JSON body: {}", err.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Reject a missing or blank required field.
pub fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

/// Parse a submission id. Malformed ids cannot match a record, so they are 404.
pub fn parse_submission_id(raw: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound("Submission not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (
                ApiError::Validation(ValidationError::new("email", "bad")),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn database_errors_map_by_kind() {
        let nf: ApiError = DatabaseError::not_found("submission", "abc").into();
        assert!(matches!(nf, ApiError::NotFound(ref m) if m == "Submission not found"));

        let v: ApiError = DatabaseError::Validation(ValidationError::new("email", "bad")).into();
        assert!(matches!(v, ApiError::Validation(_)));

        let q: ApiError = DatabaseError::Query("disk I/O error".into()).into();
        assert!(matches!(q, ApiError::Internal(_)));
    }

    #[test]
    fn step_mismatch_is_conflict() {
        let err: ApiError = WizardError::StepMismatch {
            expected: "retention".into(),
            actual: "feedback".into(),
        }
        .into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn required_rejects_blank() {
        assert!(required(&Some("  ".into()), "Email is required").is_err());
        assert!(required(&None, "Email is required").is_err());
        assert_eq!(required(&Some(" a@b.c ".into()), "x").unwrap(), "a@b.c");
    }

    #[test]
    fn malformed_id_is_not_found() {
        assert!(matches!(parse_submission_id("not-a-uuid"), Err(ApiError::NotFound(_))));
    }
}
