//! `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::model::{
    EducationEvent, EmailLog, Feedback, FeedbackPatch, NewEducationEvent, NewEmailLog,
    NewSubmission, Retention, RetentionPatch, Submission, SubmissionPatch,
};

/// Backend-agnostic store for submissions and everything hanging off them.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Submissions ─────────────────────────────────────────────────

    /// Create a submission (and its feedback, when given).
    ///
    /// Fails with `DatabaseError::Validation` before writing anything if the
    /// email is blank or the given reasons are empty.
    async fn create_submission(&self, new: NewSubmission) -> Result<Submission, DatabaseError>;

    /// Apply a patch to an existing submission. `NotFound` if unknown.
    async fn update_submission(
        &self,
        id: Uuid,
        patch: SubmissionPatch,
    ) -> Result<Submission, DatabaseError>;

    /// Read-merge-write the submission's feedback row. A patch that changes
    /// nothing writes nothing.
    async fn upsert_feedback(&self, id: Uuid, patch: FeedbackPatch)
    -> Result<Feedback, DatabaseError>;

    /// Read-merge-write the submission's retention row. `presentedAt` and
    /// `acceptedAt` are stamped once.
    async fn upsert_retention(
        &self,
        id: Uuid,
        patch: RetentionPatch,
    ) -> Result<Retention, DatabaseError>;

    /// Fetch a submission with feedback, retention and education events.
    async fn get_submission(&self, id: Uuid) -> Result<Submission, DatabaseError>;

    async fn submission_exists(&self, id: Uuid) -> Result<bool, DatabaseError>;

    // ── Education events ────────────────────────────────────────────

    async fn insert_education_event(
        &self,
        event: NewEducationEvent,
    ) -> Result<EducationEvent, DatabaseError>;

    /// Events for one submission, oldest first.
    async fn list_education_events(
        &self,
        submission_id: Uuid,
    ) -> Result<Vec<EducationEvent>, DatabaseError>;

    // ── Email log ───────────────────────────────────────────────────

    async fn get_email_log(
        &self,
        submission_id: Uuid,
        email_type: &str,
    ) -> Result<Option<EmailLog>, DatabaseError>;

    /// Upsert the log row for (submission, type). A `sent` row is never
    /// downgraded.
    async fn record_email_log(&self, entry: NewEmailLog) -> Result<EmailLog, DatabaseError>;

    // ── Attempt rate limiting ───────────────────────────────────────

    /// Attempt timestamps for `ip` at or after `since`, oldest first.
    async fn recent_attempts(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, DatabaseError>;

    async fn record_attempt(&self, ip: &str, at: DateTime<Utc>) -> Result<(), DatabaseError>;
}
