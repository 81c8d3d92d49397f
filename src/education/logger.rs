//! Append-only log of education-screen interactions.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DatabaseError, LoggingError};
use crate::retry::RetryPolicy;
use crate::store::{Database, EducationEvent, NewEducationEvent};

/// What the user did on an education screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationAction {
    Shown,
    CtaClicked,
    LinkClicked,
    #[default]
    EducationCompleted,
    EducationDismissed,
    SupportContacted,
    SupportContactFailed,
}

impl EducationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shown => "shown",
            Self::CtaClicked => "cta_clicked",
            Self::LinkClicked => "link_clicked",
            Self::EducationCompleted => "education_completed",
            Self::EducationDismissed => "education_dismissed",
            Self::SupportContacted => "support_contacted",
            Self::SupportContactFailed => "support_contact_failed",
        }
    }
}

impl std::fmt::Display for EducationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EducationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "shown" => Ok(Self::Shown),
            "cta_clicked" => Ok(Self::CtaClicked),
            "link_clicked" => Ok(Self::LinkClicked),
            "education_completed" => Ok(Self::EducationCompleted),
            "education_dismissed" => Ok(Self::EducationDismissed),
            "support_contacted" => Ok(Self::SupportContacted),
            "support_contact_failed" => Ok(Self::SupportContactFailed),
            other => Err(format!("unknown education action: {other}")),
        }
    }
}

/// Writes education events, retrying transient store failures.
#[derive(Clone)]
pub struct EducationLogger {
    db: Arc<dyn Database>,
    retry: RetryPolicy,
}

impl EducationLogger {
    pub fn new(db: Arc<dyn Database>, retry: RetryPolicy) -> Self {
        Self { db, retry }
    }

    /// Record an event. Failures are logged and swallowed.
    pub async fn log_event(
        &self,
        submission_id: Uuid,
        step_name: &str,
        step_type: &str,
        action: EducationAction,
        time_spent: Option<i64>,
    ) {
        if let Err(e) = self
            .try_log_event(submission_id, step_name, step_type, action, time_spent)
            .await
        {
            tracing::warn!(
                %submission_id,
                step = step_name,
                %action,
                error = %e,
                "Education event not recorded"
            );
        }
    }

    /// Record an event, reporting failure to the caller.
    pub async fn try_log_event(
        &self,
        submission_id: Uuid,
        step_name: &str,
        step_type: &str,
        action: EducationAction,
        time_spent: Option<i64>,
    ) -> Result<EducationEvent, LoggingError> {
        let event = NewEducationEvent {
            submission_id,
            step_name: step_name.to_string(),
            step_type: step_type.to_string(),
            action: action.as_str().to_string(),
            time_spent,
        };
        self.retry
            .retry_if(
                "education_event",
                || self.db.insert_education_event(event.clone()),
                |e| !matches!(e, DatabaseError::NotFound { .. } | DatabaseError::Validation(_)),
            )
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => LoggingError::UnknownSubmission(submission_id),
                other => LoggingError::Write(other),
            })
    }

    pub async fn events_for(&self, submission_id: Uuid) -> Result<Vec<EducationEvent>, LoggingError> {
        if !self.db.submission_exists(submission_id).await? {
            return Err(LoggingError::UnknownSubmission(submission_id));
        }
        Ok(self.db.list_education_events(submission_id).await?)
    }
}
