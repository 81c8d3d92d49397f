//! Persisted records and the patches that create or change them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flow::feature::Feature;
use crate::flow::snapshot::{SnapshotPatch, SubmissionSnapshot};
use crate::flow::step::{StepName, SubmissionStatus};

/// One cancellation attempt, with its sub-records nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    pub email: String,
    pub user_name: Option<String>,
    pub current_step: StepName,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub feedback: Option<Feedback>,
    pub retention: Option<Retention>,
    #[serde(default)]
    pub education_events: Vec<EducationEvent>,
}

impl Submission {
    /// Rebuild the wizard's form state from what was stored.
    pub fn snapshot(&self) -> SubmissionSnapshot {
        let mut snap = SubmissionSnapshot {
            email: Some(self.email.clone()),
            user_name: self.user_name.clone(),
            ..Default::default()
        };
        if let Some(fb) = &self.feedback {
            snap.cancellation_reasons = fb.cancellation_reasons.clone();
            snap.selected_features = fb.selected_features.clone();
            snap.specific_issues = fb.specific_issues.clone();
            snap.additional_feedback = fb.additional_feedback.clone();
        }
        if let Some(rt) = &self.retention {
            snap.retention_accepted = rt.offer_accepted;
            snap.future_plans = rt.future_plan.clone();
            snap.competitor_info = rt.competitor.clone();
        }
        snap
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub cancellation_reasons: Vec<String>,
    pub selected_features: Vec<Feature>,
    pub specific_issues: Option<String>,
    pub additional_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub offer_presented: bool,
    pub offer_accepted: Option<bool>,
    pub presented_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub future_plan: Option<String>,
    pub competitor: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of an education screen interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationEvent {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub step_name: String,
    pub step_type: String,
    pub action: String,
    /// Seconds spent on the screen.
    pub time_spent: Option<i64>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEducationEvent {
    pub submission_id: Uuid,
    pub step_name: String,
    pub step_type: String,
    pub action: String,
    pub time_spent: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailLogStatus {
    Sent,
    Failed,
}

impl EmailLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            _ => Self::Failed,
        }
    }
}

/// Outcome of the latest delivery attempt for one (submission, email type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailLog {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub email_type: String,
    pub recipient_email: String,
    pub status: EmailLogStatus,
    pub message_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEmailLog {
    pub submission_id: Uuid,
    pub email_type: String,
    pub recipient_email: String,
    pub status: EmailLogStatus,
    pub message_id: Option<String>,
    pub error_message: Option<String>,
}

// ── Write models ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub email: String,
    pub user_name: Option<String>,
    pub current_step: StepName,
    pub status: SubmissionStatus,
    /// Feedback written together with the submission. When present, its
    /// reasons must be non-empty.
    pub feedback: Option<FeedbackPatch>,
}

impl NewSubmission {
    pub fn new(email: impl Into<String>, current_step: StepName) -> Self {
        Self {
            email: email.into(),
            user_name: None,
            current_step,
            status: SubmissionStatus::Active,
            feedback: None,
        }
    }

    pub fn with_feedback(mut self, feedback: FeedbackPatch) -> Self {
        self.feedback = Some(feedback);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionPatch {
    pub email: Option<String>,
    pub user_name: Option<String>,
    pub current_step: Option<StepName>,
    pub status: Option<SubmissionStatus>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackPatch {
    pub cancellation_reasons: Option<Vec<String>>,
    pub selected_features: Option<Vec<Feature>>,
    pub specific_issues: Option<String>,
    pub additional_feedback: Option<String>,
}

impl FeedbackPatch {
    /// Full feedback state of a snapshot.
    pub fn from_snapshot(snap: &SubmissionSnapshot) -> Self {
        Self {
            cancellation_reasons: Some(snap.cancellation_reasons.clone()),
            selected_features: Some(snap.selected_features.clone()),
            specific_issues: snap.specific_issues.clone(),
            additional_feedback: snap.additional_feedback.clone(),
        }
    }

    /// Only the feedback fields a client actually sent.
    pub fn from_patch(patch: &SnapshotPatch) -> Self {
        Self {
            cancellation_reasons: patch.cancellation_reasons.clone(),
            selected_features: patch.selected_features.clone(),
            specific_issues: patch.specific_issues.clone(),
            additional_feedback: patch.additional_feedback.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetentionPatch {
    pub offer_presented: Option<bool>,
    pub offer_accepted: Option<bool>,
    pub future_plan: Option<String>,
    pub competitor: Option<String>,
}

impl RetentionPatch {
    pub fn presented() -> Self {
        Self {
            offer_presented: Some(true),
            ..Default::default()
        }
    }

    pub fn from_patch(patch: &SnapshotPatch) -> Self {
        Self {
            offer_presented: None,
            offer_accepted: patch.retention_accepted,
            future_plan: patch.future_plans.clone(),
            competitor: patch.competitor_info.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_serializes_camel_case() {
        let now = Utc::now();
        let sub = Submission {
            id: Uuid::new_v4(),
            email: "a@b.test".into(),
            user_name: None,
            current_step: StepName::FuturePlans,
            status: SubmissionStatus::Active,
            created_at: now,
            updated_at: now,
            feedback: None,
            retention: None,
            education_events: Vec::new(),
        };
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["currentStep"], "future_plans");
        assert_eq!(json["status"], "active");
        assert!(json.get("educationEvents").is_some());
    }

    #[test]
    fn snapshot_rehydrates_sub_records() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let sub = Submission {
            id,
            email: "a@b.test".into(),
            user_name: Some("Ada".into()),
            current_step: StepName::Retention,
            status: SubmissionStatus::Active,
            created_at: now,
            updated_at: now,
            feedback: Some(Feedback {
                id: Uuid::new_v4(),
                submission_id: id,
                cancellation_reasons: vec!["Missing Features".into()],
                selected_features: vec![Feature::DisplayWidgets],
                specific_issues: None,
                additional_feedback: Some("more layouts".into()),
                created_at: now,
                updated_at: now,
            }),
            retention: Some(Retention {
                id: Uuid::new_v4(),
                submission_id: id,
                offer_presented: true,
                offer_accepted: Some(false),
                presented_at: Some(now),
                accepted_at: None,
                future_plan: Some("build in-house".into()),
                competitor: None,
                created_at: now,
                updated_at: now,
            }),
            education_events: Vec::new(),
        };
        let snap = sub.snapshot();
        assert_eq!(snap.email.as_deref(), Some("a@b.test"));
        assert_eq!(snap.selected_features, vec![Feature::DisplayWidgets]);
        assert_eq!(snap.retention_accepted, Some(false));
        assert_eq!(snap.future_plans.as_deref(), Some("build in-house"));
    }

    #[test]
    fn empty_patches() {
        assert!(FeedbackPatch::default().is_empty());
        assert!(RetentionPatch::from_patch(&SnapshotPatch::default()).is_empty());
        assert!(!RetentionPatch::presented().is_empty());
    }
}
