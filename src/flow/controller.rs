//! WizardController: merges step input, persists it, routes, and fires the
//! side effects of entering the next step.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::education::{EducationAction, EducationLogger};
use crate::error::{ValidationError, WizardError};
use crate::flow::router::StepRouter;
use crate::flow::snapshot::{SnapshotPatch, SubmissionSnapshot, validate_email};
use crate::flow::step::{StepKind, StepName, SubmissionStatus};
use crate::notify::{DeliveryOutcome, EmailPayload, EmailType, NotificationDispatcher};
use crate::store::{
    Database, FeedbackPatch, NewSubmission, RetentionPatch, Submission, SubmissionPatch,
};

/// Where one user is in the wizard.
#[derive(Debug, Clone, PartialEq)]
pub struct WizardSession {
    /// Unset until the feedback step has been stored.
    pub submission_id: Option<Uuid>,
    pub step: StepName,
    pub snapshot: SubmissionSnapshot,
}

impl Default for WizardSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardSession {
    pub fn new() -> Self {
        Self {
            submission_id: None,
            step: StepName::Feedback,
            snapshot: SubmissionSnapshot::default(),
        }
    }

    pub fn from_submission(submission: &Submission) -> Self {
        Self {
            submission_id: Some(submission.id),
            step: submission.current_step,
            snapshot: submission.snapshot(),
        }
    }
}

/// The user's action on the screen for `step`.
#[derive(Debug, Clone)]
pub struct StepInput {
    pub step: StepName,
    pub patch: SnapshotPatch,
    /// How the user left an education screen; defaults to `education_completed`.
    pub action: Option<EducationAction>,
    /// Seconds spent on the screen.
    pub time_spent: Option<i64>,
}

impl StepInput {
    pub fn new(step: StepName) -> Self {
        Self {
            step,
            patch: SnapshotPatch::default(),
            action: None,
            time_spent: None,
        }
    }

    pub fn with_patch(mut self, patch: SnapshotPatch) -> Self {
        self.patch = patch;
        self
    }
}

/// An email fired by a transition, and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub email_type: EmailType,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub submission_id: Option<Uuid>,
    pub previous_step: StepName,
    pub current_step: StepName,
    pub status: SubmissionStatus,
    pub progress: u8,
    pub terminal: bool,
    /// The input was for a step already completed; nothing was written.
    pub replayed: bool,
    pub notifications: Vec<Notification>,
}

pub struct WizardController {
    db: Arc<dyn Database>,
    logger: EducationLogger,
    dispatcher: NotificationDispatcher,
    router: StepRouter,
}

impl WizardController {
    pub fn new(
        db: Arc<dyn Database>,
        logger: EducationLogger,
        dispatcher: NotificationDispatcher,
        router: StepRouter,
    ) -> Self {
        Self {
            db,
            logger,
            dispatcher,
            router,
        }
    }

    /// Session for a stored submission, or a fresh one.
    pub async fn load_session(&self, submission_id: Option<Uuid>) -> Result<WizardSession, WizardError> {
        match submission_id {
            Some(id) => Ok(WizardSession::from_submission(&self.db.get_submission(id).await?)),
            None => Ok(WizardSession::new()),
        }
    }

    /// Apply one step of user input.
    ///
    /// 1. Detect replays and step mismatches.
    /// 2. Hold frozen terminal steps.
    /// 3. Merge the input into a copy of the snapshot and validate it.
    /// 4. Persist the step's data.
    /// 5. Route on the merged snapshot.
    /// 6. Persist the new step and status.
    /// 7. Commit to the session.
    /// 8. Fire education events and notifications.
    ///
    /// Store failures in 4 and 6 propagate; nothing in 8 can fail the call.
    pub async fn advance(
        &self,
        session: &mut WizardSession,
        input: StepInput,
    ) -> Result<Transition, WizardError> {
        // 1. Replay / mismatch
        if input.step != session.step {
            if session.submission_id.is_some()
                && self
                    .router
                    .steps_before(session.step, &session.snapshot)
                    .contains(&input.step)
            {
                debug!(
                    submission_id = ?session.submission_id,
                    step = %input.step,
                    "Replayed step input, ignoring"
                );
                return Ok(self.transition(session, input.step, true, Vec::new()));
            }
            return Err(WizardError::StepMismatch {
                expected: session.step.to_string(),
                actual: input.step.to_string(),
            });
        }

        // 2. Terminal steps that route to themselves
        if session.step.is_terminal() && self.router.next_step(session.step, &session.snapshot) == session.step {
            return Ok(self.transition(session, session.step, false, Vec::new()));
        }

        // 3. Merge and validate
        let mut snapshot = session.snapshot.clone();
        snapshot.merge(&input.patch);
        validate_step(input.step, &input.patch, &snapshot)?;

        // 4. Persist the step's data
        let id = self.persist_step(session.submission_id, &input, &snapshot).await?;

        // 5. Route
        let previous = session.step;
        let next = self.router.next_step(previous, &snapshot);
        let status = SubmissionStatus::derive(next, snapshot.retention_accepted);

        // 6. Persist step and status
        self.db
            .update_submission(
                id,
                SubmissionPatch {
                    email: input.patch.email.as_ref().map(|e| e.trim().to_string()),
                    user_name: input.patch.user_name.clone(),
                    current_step: Some(next),
                    status: Some(status),
                },
            )
            .await?;
        if next == StepName::Retention {
            self.db.upsert_retention(id, RetentionPatch::presented()).await?;
        }

        // 7. Commit
        session.submission_id = Some(id);
        session.step = next;
        session.snapshot = snapshot;

        info!(
            submission_id = %id,
            from = %previous,
            to = %next,
            status = %status,
            "Wizard advanced"
        );

        // 8. Side effects
        if matches!(previous.kind(), StepKind::Education | StepKind::Calendly) {
            let action = input.action.unwrap_or_default();
            self.logger
                .log_event(id, previous.as_str(), previous.kind().as_str(), action, input.time_spent)
                .await;
        }
        let notifications = self.enter_step(id, next, &session.snapshot).await;

        Ok(self.transition(session, previous, false, notifications))
    }

    /// Write the input's data. Creates the submission on first save.
    async fn persist_step(
        &self,
        submission_id: Option<Uuid>,
        input: &StepInput,
        snapshot: &SubmissionSnapshot,
    ) -> Result<Uuid, WizardError> {
        let Some(id) = submission_id else {
            let created = self
                .db
                .create_submission(NewSubmission {
                    email: snapshot.email.clone().unwrap_or_default(),
                    user_name: snapshot.user_name.clone(),
                    current_step: input.step,
                    status: SubmissionStatus::Active,
                    feedback: Some(FeedbackPatch::from_snapshot(snapshot)),
                })
                .await?;
            let retention = RetentionPatch::from_patch(&input.patch);
            if !retention.is_empty() {
                self.db.upsert_retention(created.id, retention).await?;
            }
            return Ok(created.id);
        };

        if input.step == StepName::Feedback || input.patch.touches_feedback() {
            self.db
                .upsert_feedback(id, FeedbackPatch::from_snapshot(snapshot))
                .await?;
        }
        let retention = RetentionPatch::from_patch(&input.patch);
        if !retention.is_empty() {
            self.db.upsert_retention(id, retention).await?;
        }
        Ok(id)
    }

    /// Education events and notifications for the step just entered.
    async fn enter_step(
        &self,
        id: Uuid,
        step: StepName,
        snapshot: &SubmissionSnapshot,
    ) -> Vec<Notification> {
        let kind = step.kind();
        if matches!(kind, StepKind::Education | StepKind::Calendly | StepKind::Confirmation) {
            self.logger
                .log_event(id, step.as_str(), kind.as_str(), EducationAction::Shown, None)
                .await;
        }

        let email_types: Vec<EmailType> = match step {
            StepName::ReviewOptimizationEmailConfirmation => vec![EmailType::ReviewOptimizationFollowup],
            StepName::PoorExperienceEmailConfirmation => vec![EmailType::PoorExperienceFollowup],
            StepName::RetailSyndicationConfirmation => vec![EmailType::RetailSyndicationFollowup],
            StepName::TechnicalIssuesConfirmation => vec![EmailType::TechnicalIssuesFollowup],
            StepName::Confirmation if snapshot.retention_accepted == Some(true) => {
                vec![EmailType::RetentionConfirmation, EmailType::RetentionAcceptance]
            }
            StepName::Confirmation => vec![
                EmailType::CancellationConfirmation,
                EmailType::CancellationNotification,
            ],
            _ => Vec::new(),
        };

        let payload = email_payload(snapshot);
        let mut notifications = Vec::with_capacity(email_types.len());
        for email_type in email_types {
            let outcome = self.dispatcher.send(email_type, &payload, Some(id)).await;
            if email_type.is_followup() {
                let action = if outcome.is_sent() {
                    EducationAction::SupportContacted
                } else {
                    EducationAction::SupportContactFailed
                };
                self.logger
                    .log_event(id, step.as_str(), kind.as_str(), action, None)
                    .await;
            }
            notifications.push(Notification { email_type, outcome });
        }
        notifications
    }

    fn transition(
        &self,
        session: &WizardSession,
        previous: StepName,
        replayed: bool,
        notifications: Vec<Notification>,
    ) -> Transition {
        Transition {
            submission_id: session.submission_id,
            previous_step: previous,
            current_step: session.step,
            status: SubmissionStatus::derive(session.step, session.snapshot.retention_accepted),
            progress: session.step.progress_percent(),
            terminal: session.step.is_terminal(),
            replayed,
            notifications,
        }
    }
}

/// Rules the merged snapshot must satisfy before `step` can be left.
fn validate_step(
    step: StepName,
    patch: &SnapshotPatch,
    snapshot: &SubmissionSnapshot,
) -> Result<(), ValidationError> {
    if step == StepName::Feedback || patch.touches_feedback() {
        snapshot.validate_feedback()?;
    }
    if step == StepName::Retention && snapshot.retention_accepted.is_none() {
        return Err(ValidationError::new(
            "retentionAccepted",
            "Please accept or decline the offer",
        ));
    }
    match &patch.email {
        Some(email) => validate_email(email),
        None => Ok(()),
    }
}

fn email_payload(snapshot: &SubmissionSnapshot) -> EmailPayload {
    EmailPayload {
        user_email: snapshot.email.clone(),
        user_name: snapshot.user_name.clone(),
        cancellation_reasons: snapshot.cancellation_reasons.clone(),
        specific_issues: snapshot.specific_issues.clone(),
        additional_feedback: snapshot.additional_feedback.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::EmailSettings;
    use crate::error::DeliveryError;
    use crate::flow::feature::Feature;
    use crate::flow::reason::{
        MISSING_FEATURES, NOT_GETTING_ENOUGH_REVIEWS, TECHNICAL_ISSUES, TOO_EXPENSIVE,
    };
    use crate::flow::router::TerminalPolicy;
    use crate::notify::{MailTransport, OutgoingEmail};
    use crate::retry::RetryPolicy;
    use crate::store::LibSqlBackend;

    #[derive(Default)]
    struct StubTransport {
        fail: bool,
        sent: Mutex<Vec<EmailType>>,
    }

    #[async_trait]
    impl MailTransport for StubTransport {
        fn name(&self) -> &str {
            "stub"
        }

        async fn send(&self, email: &OutgoingEmail) -> Result<String, DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Transport {
                    provider: "stub".into(),
                    reason: "connection refused".into(),
                });
            }
            self.sent.lock().unwrap().push(email.email_type);
            Ok(format!("stub-{}", email.email_type))
        }
    }

    struct Harness {
        controller: WizardController,
        db: Arc<dyn Database>,
        transport: Arc<StubTransport>,
    }

    async fn harness_with(policy: TerminalPolicy, fail: bool) -> Harness {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let transport = Arc::new(StubTransport {
            fail,
            ..Default::default()
        });
        let logger = EducationLogger::new(db.clone(), RetryPolicy::none());
        let dispatcher = NotificationDispatcher::new(
            transport.clone(),
            db.clone(),
            EmailSettings::default(),
            RetryPolicy::none(),
        );
        Harness {
            controller: WizardController::new(db.clone(), logger, dispatcher, StepRouter::new(policy)),
            db,
            transport,
        }
    }

    async fn harness() -> Harness {
        harness_with(TerminalPolicy::Freeze, false).await
    }

    fn feedback(reasons: &[&str]) -> StepInput {
        StepInput::new(StepName::Feedback).with_patch(SnapshotPatch {
            email: Some("owner@shop.test".into()),
            cancellation_reasons: Some(reasons.iter().map(|r| r.to_string()).collect()),
            ..Default::default()
        })
    }

    fn retention(accepted: bool) -> StepInput {
        StepInput::new(StepName::Retention).with_patch(SnapshotPatch {
            retention_accepted: Some(accepted),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn too_expensive_declines_and_cancels() {
        let h = harness().await;
        let mut session = WizardSession::new();

        let t = h.controller.advance(&mut session, feedback(&[TOO_EXPENSIVE])).await.unwrap();
        assert_eq!(t.current_step, StepName::Retention);
        let id = t.submission_id.unwrap();
        let stored = h.db.get_submission(id).await.unwrap();
        assert!(stored.retention.as_ref().unwrap().offer_presented);

        let t = h.controller.advance(&mut session, retention(false)).await.unwrap();
        assert_eq!(t.current_step, StepName::FuturePlans);

        let plans = StepInput::new(StepName::FuturePlans).with_patch(SnapshotPatch {
            future_plans: Some("Switching to a competitor".into()),
            ..Default::default()
        });
        let t = h.controller.advance(&mut session, plans).await.unwrap();
        assert_eq!(t.current_step, StepName::Confirmation);
        assert_eq!(t.status, SubmissionStatus::Cancelled);
        assert!(t.terminal);
        assert_eq!(t.progress, 100);
        let types: Vec<_> = t.notifications.iter().map(|n| n.email_type).collect();
        assert_eq!(
            types,
            vec![EmailType::CancellationConfirmation, EmailType::CancellationNotification]
        );

        let stored = h.db.get_submission(id).await.unwrap();
        assert_eq!(stored.current_step, StepName::Confirmation);
        assert_eq!(stored.status, SubmissionStatus::Cancelled);
        assert_eq!(stored.retention.unwrap().future_plan.as_deref(), Some("Switching to a competitor"));
    }

    #[tokio::test]
    async fn accepting_retention_sends_welcome_back() {
        let h = harness().await;
        let mut session = WizardSession::new();
        h.controller.advance(&mut session, feedback(&[TOO_EXPENSIVE])).await.unwrap();
        let t = h.controller.advance(&mut session, retention(true)).await.unwrap();
        assert_eq!(t.current_step, StepName::Confirmation);
        assert_eq!(t.status, SubmissionStatus::Retained);
        assert_eq!(
            *h.transport.sent.lock().unwrap(),
            vec![EmailType::RetentionConfirmation, EmailType::RetentionAcceptance]
        );
    }

    #[tokio::test]
    async fn retail_syndication_ends_at_its_confirmation() {
        let h = harness().await;
        let mut session = WizardSession::new();
        let input = StepInput::new(StepName::Feedback).with_patch(SnapshotPatch {
            email: Some("owner@shop.test".into()),
            cancellation_reasons: Some(vec![MISSING_FEATURES.into()]),
            selected_features: Some(vec![Feature::RetailSyndication]),
            ..Default::default()
        });
        let t = h.controller.advance(&mut session, input).await.unwrap();
        assert_eq!(t.current_step, StepName::RetailSyndicationEducation);

        let t = h
            .controller
            .advance(&mut session, StepInput::new(StepName::RetailSyndicationEducation))
            .await
            .unwrap();
        assert_eq!(t.current_step, StepName::RetailSyndicationConfirmation);
        assert!(t.terminal);
        assert_eq!(t.status, SubmissionStatus::Retained);
        assert_eq!(t.notifications.len(), 1);
        assert_eq!(t.notifications[0].email_type, EmailType::RetailSyndicationFollowup);

        let events = h.db.list_education_events(t.submission_id.unwrap()).await.unwrap();
        let actions: Vec<_> = events.iter().map(|e| (e.step_name.as_str(), e.action.as_str())).collect();
        assert_eq!(
            actions,
            vec![
                ("retail_syndication_education", "shown"),
                ("retail_syndication_education", "education_completed"),
                ("retail_syndication_confirmation", "shown"),
                ("retail_syndication_confirmation", "support_contacted"),
            ]
        );

        // Frozen: further input changes nothing.
        let again = h
            .controller
            .advance(&mut session, StepInput::new(StepName::RetailSyndicationConfirmation))
            .await
            .unwrap();
        assert_eq!(again.current_step, StepName::RetailSyndicationConfirmation);
        assert!(again.notifications.is_empty());
    }

    #[tokio::test]
    async fn failing_transport_does_not_block_the_wizard() {
        let h = harness_with(TerminalPolicy::Freeze, true).await;
        let mut session = WizardSession::new();
        h.controller
            .advance(&mut session, feedback(&[TECHNICAL_ISSUES]))
            .await
            .unwrap();
        let t = h
            .controller
            .advance(&mut session, StepInput::new(StepName::TechnicalIssuesEducation))
            .await
            .unwrap();
        assert_eq!(t.current_step, StepName::TechnicalIssuesConfirmation);
        assert!(matches!(t.notifications[0].outcome, DeliveryOutcome::Failed { .. }));

        let events = h.db.list_education_events(t.submission_id.unwrap()).await.unwrap();
        assert_eq!(events.last().unwrap().action, "support_contact_failed");
    }

    #[tokio::test]
    async fn invalid_feedback_writes_nothing() {
        let h = harness().await;
        let mut session = WizardSession::new();
        let err = h.controller.advance(&mut session, feedback(&[])).await.unwrap_err();
        assert!(matches!(err, WizardError::Validation(ref v) if v.field == "cancellationReasons"));
        assert_eq!(session, WizardSession::new());
    }

    #[tokio::test]
    async fn replayed_input_is_ignored() {
        let h = harness().await;
        let mut session = WizardSession::new();
        h.controller
            .advance(&mut session, feedback(&[NOT_GETTING_ENOUGH_REVIEWS]))
            .await
            .unwrap();
        let before = session.clone();

        let t = h
            .controller
            .advance(&mut session, feedback(&[NOT_GETTING_ENOUGH_REVIEWS]))
            .await
            .unwrap();
        assert!(t.replayed);
        assert_eq!(t.current_step, StepName::ReviewOptimizationEducation);
        assert_eq!(session, before);

        let err = h
            .controller
            .advance(&mut session, StepInput::new(StepName::FuturePlans))
            .await
            .unwrap_err();
        assert!(matches!(err, WizardError::StepMismatch { .. }));
    }

    #[tokio::test]
    async fn unvisited_predecessor_is_a_mismatch() {
        let h = harness().await;
        let mut session = WizardSession::new();
        h.controller.advance(&mut session, feedback(&[TOO_EXPENSIVE])).await.unwrap();
        assert_eq!(session.step, StepName::Retention);

        for step in [
            StepName::CombinedEducation,
            StepName::FeatureEducation,
            StepName::CustomApiEducation,
            StepName::GoogleBusinessEducation,
        ] {
            let err = h
                .controller
                .advance(&mut session, StepInput::new(step))
                .await
                .unwrap_err();
            assert!(matches!(err, WizardError::StepMismatch { .. }), "{step}");
        }
        assert_eq!(session.step, StepName::Retention);
    }

    #[tokio::test]
    async fn legacy_policy_only_replays_the_visited_confirmation() {
        let h = harness_with(TerminalPolicy::ResumeRetention, false).await;
        let mut session = WizardSession::new();
        h.controller.advance(&mut session, feedback(&[TECHNICAL_ISSUES])).await.unwrap();
        for step in [StepName::TechnicalIssuesEducation, StepName::TechnicalIssuesConfirmation] {
            h.controller.advance(&mut session, StepInput::new(step)).await.unwrap();
        }
        assert_eq!(session.step, StepName::Retention);

        let t = h
            .controller
            .advance(&mut session, StepInput::new(StepName::TechnicalIssuesConfirmation))
            .await
            .unwrap();
        assert!(t.replayed);

        let err = h
            .controller
            .advance(&mut session, StepInput::new(StepName::RetailSyndicationConfirmation))
            .await
            .unwrap_err();
        assert!(matches!(err, WizardError::StepMismatch { .. }));
    }

    #[tokio::test]
    async fn later_steps_cannot_break_feedback_rules() {
        let h = harness().await;
        let mut session = WizardSession::new();
        h.controller.advance(&mut session, feedback(&[TOO_EXPENSIVE])).await.unwrap();
        let id = session.submission_id.unwrap();

        let input = StepInput::new(StepName::Retention).with_patch(SnapshotPatch {
            retention_accepted: Some(false),
            cancellation_reasons: Some(vec![MISSING_FEATURES.into()]),
            ..Default::default()
        });
        let err = h.controller.advance(&mut session, input).await.unwrap_err();
        assert!(matches!(err, WizardError::Validation(ref v) if v.field == "selectedFeatures"));
        assert_eq!(session.step, StepName::Retention);

        let stored = h.db.get_submission(id).await.unwrap();
        assert_eq!(stored.snapshot().cancellation_reasons, vec![TOO_EXPENSIVE]);
        assert_eq!(stored.current_step, StepName::Retention);
    }

    #[tokio::test]
    async fn retention_requires_an_answer() {
        let h = harness().await;
        let mut session = WizardSession::new();
        h.controller.advance(&mut session, feedback(&[TOO_EXPENSIVE])).await.unwrap();
        let err = h
            .controller
            .advance(&mut session, StepInput::new(StepName::Retention))
            .await
            .unwrap_err();
        assert!(matches!(err, WizardError::Validation(ref v) if v.field == "retentionAccepted"));
        assert_eq!(session.step, StepName::Retention);
    }

    #[tokio::test]
    async fn legacy_policy_resumes_retention_after_followup() {
        let h = harness_with(TerminalPolicy::ResumeRetention, false).await;
        let mut session = WizardSession::new();
        h.controller.advance(&mut session, feedback(&[TECHNICAL_ISSUES])).await.unwrap();
        h.controller
            .advance(&mut session, StepInput::new(StepName::TechnicalIssuesEducation))
            .await
            .unwrap();
        let t = h
            .controller
            .advance(&mut session, StepInput::new(StepName::TechnicalIssuesConfirmation))
            .await
            .unwrap();
        assert_eq!(t.current_step, StepName::Retention);
        assert_eq!(t.status, SubmissionStatus::Active);
    }

    #[tokio::test]
    async fn session_rehydrates_from_store() {
        let h = harness().await;
        let mut session = WizardSession::new();
        h.controller.advance(&mut session, feedback(&[TOO_EXPENSIVE])).await.unwrap();

        let mut restored = h.controller.load_session(session.submission_id).await.unwrap();
        assert_eq!(restored.step, StepName::Retention);
        assert_eq!(restored.snapshot.cancellation_reasons, vec![TOO_EXPENSIVE]);

        let t = h.controller.advance(&mut restored, retention(true)).await.unwrap();
        assert_eq!(t.current_step, StepName::Confirmation);
    }
}
