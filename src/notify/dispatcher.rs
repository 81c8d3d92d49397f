//! Renders, sends and logs transactional email without ever failing the caller.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::email_type::EmailType;
use super::templates::{self, EmailPayload};
use super::transport::{MailTransport, OutgoingEmail};
use crate::config::EmailSettings;
use crate::retry::RetryPolicy;
use crate::store::{Database, EmailLogStatus, NewEmailLog};

/// What happened to one send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    /// A `sent` log row already exists for this submission and type.
    AlreadySent,
    Failed {
        reason: String,
    },
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. } | Self::AlreadySent)
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::AlreadySent => "already_sent",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn MailTransport>,
    db: Arc<dyn Database>,
    settings: EmailSettings,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        db: Arc<dyn Database>,
        settings: EmailSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            db,
            settings,
            retry,
        }
    }

    pub fn settings(&self) -> &EmailSettings {
        &self.settings
    }

    /// Send one email. With a `submission_id`, a previously sent email of the
    /// same type is not sent again and the attempt is logged.
    pub async fn send(
        &self,
        email_type: EmailType,
        payload: &EmailPayload,
        submission_id: Option<Uuid>,
    ) -> DeliveryOutcome {
        if let Some(id) = submission_id {
            match self.db.get_email_log(id, email_type.as_str()).await {
                Ok(Some(log)) if log.status == EmailLogStatus::Sent => {
                    tracing::info!(
                        submission_id = %id,
                        email_type = %email_type,
                        "Email already sent, skipping"
                    );
                    return DeliveryOutcome::AlreadySent;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        submission_id = %id,
                        email_type = %email_type,
                        error = %e,
                        "Email log lookup failed, sending anyway"
                    );
                }
            }
        }

        let rendered = match templates::render(email_type, payload, &self.settings) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(email_type = %email_type, error = %e, "Email not rendered");
                return DeliveryOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };
        let outgoing = OutgoingEmail::new(rendered, &self.settings);

        let result = self
            .retry
            .retry_if(
                email_type.as_str(),
                || self.transport.send(&outgoing),
                |e| e.is_retryable(),
            )
            .await;

        let outcome = match result {
            Ok(message_id) => {
                tracing::info!(
                    email_type = %email_type,
                    provider = self.transport.name(),
                    message_id = %message_id,
                    "Email sent"
                );
                DeliveryOutcome::Sent { message_id }
            }
            Err(e) => {
                tracing::warn!(
                    email_type = %email_type,
                    provider = self.transport.name(),
                    error = %e,
                    "Email delivery failed"
                );
                DeliveryOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        if let Some(id) = submission_id {
            self.record(id, &outgoing, &outcome).await;
        }
        outcome
    }

    async fn record(&self, submission_id: Uuid, email: &OutgoingEmail, outcome: &DeliveryOutcome) {
        let (status, message_id, error_message) = match outcome {
            DeliveryOutcome::Sent { message_id } => {
                (EmailLogStatus::Sent, Some(message_id.clone()), None)
            }
            DeliveryOutcome::Failed { reason } => (EmailLogStatus::Failed, None, Some(reason.clone())),
            DeliveryOutcome::AlreadySent => return,
        };
        let entry = NewEmailLog {
            submission_id,
            email_type: email.email_type.as_str().to_string(),
            recipient_email: email.to.clone(),
            status,
            message_id,
            error_message,
        };
        if let Err(e) = self.db.record_email_log(entry).await {
            tracing::warn!(
                submission_id = %submission_id,
                email_type = %email.email_type,
                error = %e,
                "Failed to record email log"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::DeliveryError;
    use crate::flow::step::StepName;
    use crate::store::{FeedbackPatch, LibSqlBackend, NewSubmission};

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<OutgoingEmail>>,
        /// Fail this many calls before succeeding.
        failures: AtomicU32,
        status: u16,
    }

    #[async_trait]
    impl MailTransport for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, email: &OutgoingEmail) -> Result<String, DeliveryError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DeliveryError::Rejected {
                    status: self.status,
                    body: "nope".into(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(email.clone());
            Ok(format!("msg-{}", sent.len()))
        }
    }

    async fn setup(transport: Arc<Recording>, retry: RetryPolicy) -> (NotificationDispatcher, Arc<dyn Database>, Uuid) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let sub = db
            .create_submission(
                NewSubmission::new("owner@shop.test", StepName::Feedback).with_feedback(FeedbackPatch {
                    cancellation_reasons: Some(vec!["Too Expensive".into()]),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
        let dispatcher =
            NotificationDispatcher::new(transport, db.clone(), EmailSettings::default(), retry);
        (dispatcher, db, sub.id)
    }

    fn payload() -> EmailPayload {
        EmailPayload {
            user_email: Some("owner@shop.test".into()),
            cancellation_reasons: vec!["Too Expensive".into()],
            ..Default::default()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn sends_once_per_submission_and_type() {
        let transport = Arc::new(Recording::default());
        let (dispatcher, db, id) = setup(transport.clone(), RetryPolicy::none()).await;

        let first = dispatcher
            .send(EmailType::CancellationConfirmation, &payload(), Some(id))
            .await;
        assert_eq!(first, DeliveryOutcome::Sent { message_id: "msg-1".into() });

        let second = dispatcher
            .send(EmailType::CancellationConfirmation, &payload(), Some(id))
            .await;
        assert_eq!(second, DeliveryOutcome::AlreadySent);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);

        let log = db
            .get_email_log(id, "cancellation_confirmation")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.status, EmailLogStatus::Sent);
        assert_eq!(log.message_id.as_deref(), Some("msg-1"));
    }

    #[tokio::test]
    async fn without_submission_every_call_sends() {
        let transport = Arc::new(Recording::default());
        let (dispatcher, _db, _id) = setup(transport.clone(), RetryPolicy::none()).await;
        for _ in 0..2 {
            let outcome = dispatcher
                .send(EmailType::CancellationNotification, &payload(), None)
                .await;
            assert!(outcome.is_sent());
        }
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "support@ravecapture.com");
    }

    #[tokio::test]
    async fn retries_transient_rejections() {
        let transport = Arc::new(Recording {
            failures: AtomicU32::new(2),
            status: 503,
            ..Default::default()
        });
        let (dispatcher, _db, id) = setup(transport.clone(), fast_retry()).await;
        let outcome = dispatcher
            .send(EmailType::RetentionConfirmation, &payload(), Some(id))
            .await;
        assert!(matches!(outcome, DeliveryOutcome::Sent { .. }));
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn permanent_failure_is_logged_and_retryable_later() {
        let transport = Arc::new(Recording {
            failures: AtomicU32::new(1),
            status: 422,
            ..Default::default()
        });
        let (dispatcher, db, id) = setup(transport.clone(), fast_retry()).await;

        let outcome = dispatcher
            .send(EmailType::TechnicalIssuesFollowup, &payload(), Some(id))
            .await;
        assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));
        let log = db
            .get_email_log(id, "technical_issues_followup")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.status, EmailLogStatus::Failed);

        let again = dispatcher
            .send(EmailType::TechnicalIssuesFollowup, &payload(), Some(id))
            .await;
        assert!(matches!(again, DeliveryOutcome::Sent { .. }));
    }

    #[tokio::test]
    async fn missing_address_fails_without_sending() {
        let transport = Arc::new(Recording::default());
        let (dispatcher, _db, _id) = setup(transport.clone(), RetryPolicy::none()).await;
        let outcome = dispatcher
            .send(EmailType::CancellationConfirmation, &EmailPayload::default(), None)
            .await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed {
                reason: "userEmail is required".into()
            }
        );
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let sent = serde_json::to_value(DeliveryOutcome::Sent { message_id: "m1".into() }).unwrap();
        assert_eq!(sent, serde_json::json!({"status": "sent", "messageId": "m1"}));
        let skipped = serde_json::to_value(DeliveryOutcome::AlreadySent).unwrap();
        assert_eq!(skipped, serde_json::json!({"status": "already_sent"}));
    }
}
