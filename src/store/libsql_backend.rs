//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! fixed-width RFC 3339 text (UTC, microseconds) so they sort lexically.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DatabaseError, ValidationError};
use crate::flow::feature::Feature;
use crate::flow::reason::{self, MISSING_FEATURES};
use crate::flow::snapshot::validate_email;
use crate::flow::step::{StepName, SubmissionStatus};
use crate::store::migrations;
use crate::store::model::{
    EducationEvent, EmailLog, EmailLogStatus, Feedback, FeedbackPatch, NewEducationEvent,
    NewEmailLog, NewSubmission, Retention, RetentionPatch, Submission, SubmissionPatch,
};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn fetch_submission(&self, id: Uuid) -> Result<Option<Submission>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fetch_submission: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_submission(&row).map_err(|e| {
                DatabaseError::Query(format!("fetch_submission row: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("fetch_submission row: {e}"))),
        }
    }

    async fn fetch_feedback(&self, submission_id: Uuid) -> Result<Option<Feedback>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE submission_id = ?1"),
                params![submission_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fetch_feedback: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_feedback(&row)
                    .map_err(|e| DatabaseError::Query(format!("fetch_feedback row: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("fetch_feedback row: {e}"))),
        }
    }

    async fn fetch_retention(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<Retention>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RETENTION_COLUMNS} FROM retention WHERE submission_id = ?1"),
                params![submission_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fetch_retention: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_retention(&row)
                    .map_err(|e| DatabaseError::Query(format!("fetch_retention row: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("fetch_retention row: {e}"))),
        }
    }

    async fn require_submission(&self, id: Uuid) -> Result<(), DatabaseError> {
        if self.submission_exists(id).await? {
            Ok(())
        } else {
            Err(DatabaseError::not_found("submission", id))
        }
    }

    async fn touch_submission(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE submissions SET updated_at = ?2 WHERE id = ?1",
                params![id.to_string(), ts(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("touch_submission: {e}")))?;
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Current time at storage precision, so written and re-read values compare equal.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.filter(|s| !s.is_empty()).map(|s| parse_datetime(&s))
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_bool(b: Option<bool>) -> libsql::Value {
    match b {
        Some(b) => libsql::Value::Integer(b as i64),
        None => libsql::Value::Null,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

const SUBMISSION_COLUMNS: &str =
    "id, email, user_name, current_step, status, created_at, updated_at";

const FEEDBACK_COLUMNS: &str = "id, submission_id, cancellation_reasons, selected_features, specific_issues, additional_feedback, created_at, updated_at";

const RETENTION_COLUMNS: &str = "id, submission_id, offer_presented, offer_accepted, presented_at, accepted_at, future_plan, competitor, created_at, updated_at";

const EVENT_COLUMNS: &str =
    "id, submission_id, step_name, step_type, action, time_spent, completed_at";

const EMAIL_LOG_COLUMNS: &str = "id, submission_id, email_type, recipient_email, status, message_id, error_message, created_at, updated_at";

/// Nested records are left empty; `get_submission` fills them in.
fn row_to_submission(row: &libsql::Row) -> Result<Submission, libsql::Error> {
    let id: String = row.get(0)?;
    let step: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created: String = row.get(5)?;
    let updated: String = row.get(6)?;
    Ok(Submission {
        id: parse_uuid(&id),
        email: row.get(1)?,
        user_name: row.get(2).ok(),
        current_step: step.parse().unwrap_or(StepName::Confirmation),
        status: SubmissionStatus::parse(&status),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
        feedback: None,
        retention: None,
        education_events: Vec::new(),
    })
}

fn row_to_feedback(row: &libsql::Row) -> Result<Feedback, libsql::Error> {
    let id: String = row.get(0)?;
    let submission_id: String = row.get(1)?;
    let reasons: String = row.get(2)?;
    let features: String = row.get(3)?;
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;
    Ok(Feedback {
        id: parse_uuid(&id),
        submission_id: parse_uuid(&submission_id),
        cancellation_reasons: serde_json::from_str(&reasons).unwrap_or_default(),
        selected_features: serde_json::from_str(&features).unwrap_or_default(),
        specific_issues: row.get(4).ok(),
        additional_feedback: row.get(5).ok(),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_retention(row: &libsql::Row) -> Result<Retention, libsql::Error> {
    let id: String = row.get(0)?;
    let submission_id: String = row.get(1)?;
    let presented: i64 = row.get(2)?;
    let accepted: Option<i64> = row.get(3).ok();
    let created: String = row.get(8)?;
    let updated: String = row.get(9)?;
    Ok(Retention {
        id: parse_uuid(&id),
        submission_id: parse_uuid(&submission_id),
        offer_presented: presented != 0,
        offer_accepted: accepted.map(|v| v != 0),
        presented_at: parse_optional_datetime(row.get(4).ok()),
        accepted_at: parse_optional_datetime(row.get(5).ok()),
        future_plan: row.get(6).ok(),
        competitor: row.get(7).ok(),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_event(row: &libsql::Row) -> Result<EducationEvent, libsql::Error> {
    let id: String = row.get(0)?;
    let submission_id: String = row.get(1)?;
    let completed: String = row.get(6)?;
    Ok(EducationEvent {
        id: parse_uuid(&id),
        submission_id: parse_uuid(&submission_id),
        step_name: row.get(2)?,
        step_type: row.get(3)?,
        action: row.get(4)?,
        time_spent: row.get(5).ok(),
        completed_at: parse_datetime(&completed),
    })
}

fn row_to_email_log(row: &libsql::Row) -> Result<EmailLog, libsql::Error> {
    let id: String = row.get(0)?;
    let submission_id: String = row.get(1)?;
    let status: String = row.get(4)?;
    let created: String = row.get(7)?;
    let updated: String = row.get(8)?;
    Ok(EmailLog {
        id: parse_uuid(&id),
        submission_id: parse_uuid(&submission_id),
        email_type: row.get(2)?,
        recipient_email: row.get(3)?,
        status: EmailLogStatus::parse(&status),
        message_id: row.get(5).ok(),
        error_message: row.get(6).ok(),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

/// Canonical, non-empty reasons or the feedback-screen validation error.
fn required_reasons(raw: Option<&Vec<String>>) -> Result<Vec<String>, ValidationError> {
    let reasons = raw.map(|r| reason::canonicalize_all(r)).unwrap_or_default();
    if reasons.is_empty() {
        return Err(ValidationError::new(
            "cancellationReasons",
            "Please select a reason for canceling",
        ));
    }
    Ok(reasons)
}

fn merge_feedback(
    submission_id: Uuid,
    existing: Option<&Feedback>,
    patch: &FeedbackPatch,
    now: DateTime<Utc>,
) -> Result<Feedback, ValidationError> {
    let cancellation_reasons = match (&patch.cancellation_reasons, existing) {
        (Some(raw), _) => required_reasons(Some(raw))?,
        (None, Some(fb)) => fb.cancellation_reasons.clone(),
        (None, None) => required_reasons(None)?,
    };
    let mut selected_features: Vec<Feature> = patch
        .selected_features
        .clone()
        .or_else(|| existing.map(|fb| fb.selected_features.clone()))
        .unwrap_or_default();
    if !reason::contains(&cancellation_reasons, MISSING_FEATURES) {
        selected_features.clear();
    }

    Ok(Feedback {
        id: existing.map(|fb| fb.id).unwrap_or_else(Uuid::new_v4),
        submission_id,
        cancellation_reasons,
        selected_features,
        specific_issues: patch
            .specific_issues
            .clone()
            .or_else(|| existing.and_then(|fb| fb.specific_issues.clone())),
        additional_feedback: patch
            .additional_feedback
            .clone()
            .or_else(|| existing.and_then(|fb| fb.additional_feedback.clone())),
        created_at: existing.map(|fb| fb.created_at).unwrap_or(now),
        updated_at: existing.map(|fb| fb.updated_at).unwrap_or(now),
    })
}

fn merge_retention(
    submission_id: Uuid,
    existing: Option<&Retention>,
    patch: &RetentionPatch,
    now: DateTime<Utc>,
) -> Retention {
    let offer_accepted = patch
        .offer_accepted
        .or_else(|| existing.and_then(|r| r.offer_accepted));
    // Answering the offer implies it was shown.
    let offer_presented = patch.offer_accepted.is_some()
        || patch
            .offer_presented
            .or_else(|| existing.map(|r| r.offer_presented))
            .unwrap_or(false);
    let prior_presented_at = existing.and_then(|r| r.presented_at);
    let prior_accepted_at = existing.and_then(|r| r.accepted_at);

    Retention {
        id: existing.map(|r| r.id).unwrap_or_else(Uuid::new_v4),
        submission_id,
        offer_presented,
        offer_accepted,
        presented_at: if offer_presented {
            prior_presented_at.or(Some(now))
        } else {
            prior_presented_at
        },
        accepted_at: match offer_accepted {
            Some(true) => prior_accepted_at.or(Some(now)),
            _ => None,
        },
        future_plan: patch
            .future_plan
            .clone()
            .or_else(|| existing.and_then(|r| r.future_plan.clone())),
        competitor: patch
            .competitor
            .clone()
            .or_else(|| existing.and_then(|r| r.competitor.clone())),
        created_at: existing.map(|r| r.created_at).unwrap_or(now),
        updated_at: existing.map(|r| r.updated_at).unwrap_or(now),
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Submissions ─────────────────────────────────────────────────

    async fn create_submission(&self, new: NewSubmission) -> Result<Submission, DatabaseError> {
        validate_email(&new.email)?;
        if let Some(fb) = &new.feedback {
            required_reasons(fb.cancellation_reasons.as_ref())?;
        }

        let id = Uuid::new_v4();
        let now = now();
        self.conn()
            .execute(
                "INSERT INTO submissions (id, email, user_name, current_step, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    new.email.trim(),
                    opt_text(new.user_name.as_deref()),
                    new.current_step.as_str(),
                    new.status.as_str(),
                    ts(now),
                    ts(now),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_submission: {e}")))?;
        debug!(%id, step = %new.current_step, "Submission created");

        if let Some(fb) = new.feedback {
            self.upsert_feedback(id, fb).await?;
        }
        self.get_submission(id).await
    }

    async fn update_submission(
        &self,
        id: Uuid,
        patch: SubmissionPatch,
    ) -> Result<Submission, DatabaseError> {
        if let Some(email) = &patch.email {
            validate_email(email)?;
        }
        let current = self
            .fetch_submission(id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("submission", id))?;

        let email = patch.email.as_deref().map(str::trim).unwrap_or(&current.email);
        let user_name = patch.user_name.as_deref().or(current.user_name.as_deref());
        let step = patch.current_step.unwrap_or(current.current_step);
        let status = patch.status.unwrap_or(current.status);

        self.conn()
            .execute(
                "UPDATE submissions SET email = ?2, user_name = ?3, current_step = ?4, status = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    email,
                    opt_text(user_name),
                    step.as_str(),
                    status.as_str(),
                    ts(now()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_submission: {e}")))?;
        debug!(%id, %step, %status, "Submission updated");

        self.get_submission(id).await
    }

    async fn upsert_feedback(
        &self,
        id: Uuid,
        patch: FeedbackPatch,
    ) -> Result<Feedback, DatabaseError> {
        self.require_submission(id).await?;
        let existing = self.fetch_feedback(id).await?;
        let now = now();
        let mut merged = merge_feedback(id, existing.as_ref(), &patch, now)?;

        if existing.as_ref() == Some(&merged) {
            return Ok(merged);
        }
        merged.updated_at = now;

        self.conn()
            .execute(
                "INSERT INTO feedback (id, submission_id, cancellation_reasons, selected_features, specific_issues, additional_feedback, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(submission_id) DO UPDATE SET
                    cancellation_reasons = excluded.cancellation_reasons,
                    selected_features = excluded.selected_features,
                    specific_issues = excluded.specific_issues,
                    additional_feedback = excluded.additional_feedback,
                    updated_at = excluded.updated_at",
                params![
                    merged.id.to_string(),
                    id.to_string(),
                    to_json(&merged.cancellation_reasons)?,
                    to_json(&merged.selected_features)?,
                    opt_text(merged.specific_issues.as_deref()),
                    opt_text(merged.additional_feedback.as_deref()),
                    ts(merged.created_at),
                    ts(merged.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_feedback: {e}")))?;
        self.touch_submission(id, now).await?;
        debug!(submission_id = %id, "Feedback upserted");
        Ok(merged)
    }

    async fn upsert_retention(
        &self,
        id: Uuid,
        patch: RetentionPatch,
    ) -> Result<Retention, DatabaseError> {
        self.require_submission(id).await?;
        let existing = self.fetch_retention(id).await?;
        let now = now();
        let mut merged = merge_retention(id, existing.as_ref(), &patch, now);

        if existing.as_ref() == Some(&merged) {
            return Ok(merged);
        }
        merged.updated_at = now;

        self.conn()
            .execute(
                "INSERT INTO retention (id, submission_id, offer_presented, offer_accepted, presented_at, accepted_at, future_plan, competitor, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(submission_id) DO UPDATE SET
                    offer_presented = excluded.offer_presented,
                    offer_accepted = excluded.offer_accepted,
                    presented_at = excluded.presented_at,
                    accepted_at = excluded.accepted_at,
                    future_plan = excluded.future_plan,
                    competitor = excluded.competitor,
                    updated_at = excluded.updated_at",
                params![
                    merged.id.to_string(),
                    id.to_string(),
                    merged.offer_presented as i64,
                    opt_bool(merged.offer_accepted),
                    opt_text(merged.presented_at.map(ts).as_deref()),
                    opt_text(merged.accepted_at.map(ts).as_deref()),
                    opt_text(merged.future_plan.as_deref()),
                    opt_text(merged.competitor.as_deref()),
                    ts(merged.created_at),
                    ts(merged.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_retention: {e}")))?;
        self.touch_submission(id, now).await?;
        debug!(submission_id = %id, accepted = ?merged.offer_accepted, "Retention upserted");
        Ok(merged)
    }

    async fn get_submission(&self, id: Uuid) -> Result<Submission, DatabaseError> {
        let mut submission = self
            .fetch_submission(id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("submission", id))?;
        submission.feedback = self.fetch_feedback(id).await?;
        submission.retention = self.fetch_retention(id).await?;
        submission.education_events = self.list_education_events(id).await?;
        Ok(submission)
    }

    async fn submission_exists(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM submissions WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("submission_exists: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) > 0),
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("submission_exists row: {e}"))),
        }
    }

    // ── Education events ────────────────────────────────────────────

    async fn insert_education_event(
        &self,
        event: NewEducationEvent,
    ) -> Result<EducationEvent, DatabaseError> {
        self.require_submission(event.submission_id).await?;
        let now = now();
        let stored = EducationEvent {
            id: Uuid::new_v4(),
            submission_id: event.submission_id,
            step_name: event.step_name,
            step_type: event.step_type,
            action: event.action,
            time_spent: event.time_spent,
            completed_at: now,
        };

        self.conn()
            .execute(
                "INSERT INTO education_events (id, submission_id, step_name, step_type, action, time_spent, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    stored.id.to_string(),
                    stored.submission_id.to_string(),
                    stored.step_name.as_str(),
                    stored.step_type.as_str(),
                    stored.action.as_str(),
                    match stored.time_spent {
                        Some(secs) => libsql::Value::Integer(secs),
                        None => libsql::Value::Null,
                    },
                    ts(stored.completed_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_education_event: {e}")))?;
        self.touch_submission(stored.submission_id, now).await?;
        debug!(
            submission_id = %stored.submission_id,
            step = %stored.step_name,
            action = %stored.action,
            "Education event recorded"
        );
        Ok(stored)
    }

    async fn list_education_events(
        &self,
        submission_id: Uuid,
    ) -> Result<Vec<EducationEvent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM education_events WHERE submission_id = ?1
                     ORDER BY completed_at ASC, rowid ASC"
                ),
                params![submission_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_education_events: {e}")))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_education_events row: {e}")))?
        {
            events.push(
                row_to_event(&row)
                    .map_err(|e| DatabaseError::Query(format!("list_education_events: {e}")))?,
            );
        }
        Ok(events)
    }

    // ── Email log ───────────────────────────────────────────────────

    async fn get_email_log(
        &self,
        submission_id: Uuid,
        email_type: &str,
    ) -> Result<Option<EmailLog>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EMAIL_LOG_COLUMNS} FROM email_logs WHERE submission_id = ?1 AND email_type = ?2"
                ),
                params![submission_id.to_string(), email_type],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_email_log: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_email_log(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_email_log row: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_email_log row: {e}"))),
        }
    }

    async fn record_email_log(&self, entry: NewEmailLog) -> Result<EmailLog, DatabaseError> {
        if let Some(existing) = self.get_email_log(entry.submission_id, &entry.email_type).await?
            && existing.status == EmailLogStatus::Sent
        {
            return Ok(existing);
        }

        let now = now();
        self.conn()
            .execute(
                "INSERT INTO email_logs (id, submission_id, email_type, recipient_email, status, message_id, error_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(submission_id, email_type) DO UPDATE SET
                    recipient_email = excluded.recipient_email,
                    status = excluded.status,
                    message_id = excluded.message_id,
                    error_message = excluded.error_message,
                    updated_at = excluded.updated_at",
                params![
                    Uuid::new_v4().to_string(),
                    entry.submission_id.to_string(),
                    entry.email_type.as_str(),
                    entry.recipient_email.as_str(),
                    entry.status.as_str(),
                    opt_text(entry.message_id.as_deref()),
                    opt_text(entry.error_message.as_deref()),
                    ts(now),
                    ts(now),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_email_log: {e}")))?;

        self.get_email_log(entry.submission_id, &entry.email_type)
            .await?
            .ok_or_else(|| DatabaseError::not_found("email_log", entry.submission_id))
    }

    // ── Attempt rate limiting ───────────────────────────────────────

    async fn recent_attempts(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT attempted_at FROM submission_attempts
                 WHERE ip_address = ?1 AND attempted_at >= ?2
                 ORDER BY attempted_at ASC",
                params![ip, ts(since)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_attempts: {e}")))?;

        let mut attempts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_attempts row: {e}")))?
        {
            let at: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("recent_attempts: {e}")))?;
            attempts.push(parse_datetime(&at));
        }
        Ok(attempts)
    }

    async fn record_attempt(&self, ip: &str, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO submission_attempts (ip_address, attempted_at) VALUES (?1, ?2)",
                params![ip, ts(at)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_attempt: {e}")))?;
        Ok(())
    }
}
