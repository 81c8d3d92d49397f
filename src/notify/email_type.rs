//! The fixed set of transactional emails.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    CancellationConfirmation,
    CancellationNotification,
    RetentionConfirmation,
    RetentionAcceptance,
    ReviewOptimizationFollowup,
    PoorExperienceFollowup,
    RetailSyndicationFollowup,
    TechnicalIssuesFollowup,
}

/// Who an email is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    User,
    Operations,
}

impl EmailType {
    pub const ALL: [EmailType; 8] = [
        Self::CancellationConfirmation,
        Self::CancellationNotification,
        Self::RetentionConfirmation,
        Self::RetentionAcceptance,
        Self::ReviewOptimizationFollowup,
        Self::PoorExperienceFollowup,
        Self::RetailSyndicationFollowup,
        Self::TechnicalIssuesFollowup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CancellationConfirmation => "cancellation_confirmation",
            Self::CancellationNotification => "cancellation_notification",
            Self::RetentionConfirmation => "retention_confirmation",
            Self::RetentionAcceptance => "retention_acceptance",
            Self::ReviewOptimizationFollowup => "review_optimization_followup",
            Self::PoorExperienceFollowup => "poor_experience_followup",
            Self::RetailSyndicationFollowup => "retail_syndication_followup",
            Self::TechnicalIssuesFollowup => "technical_issues_followup",
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self {
            Self::CancellationNotification | Self::RetentionAcceptance => Recipient::Operations,
            _ => Recipient::User,
        }
    }

    /// Follow-ups sent after the user asked for help instead of cancelling.
    pub fn is_followup(&self) -> bool {
        matches!(
            self,
            Self::ReviewOptimizationFollowup
                | Self::PoorExperienceFollowup
                | Self::RetailSyndicationFollowup
                | Self::TechnicalIssuesFollowup
        )
    }
}

impl std::fmt::Display for EmailType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("Invalid email type: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde() {
        for t in EmailType::ALL {
            assert_eq!(serde_json::to_value(t).unwrap(), t.to_string());
            assert_eq!(t.as_str().parse::<EmailType>().unwrap(), t);
        }
    }

    #[test]
    fn only_internal_notices_go_to_operations() {
        let ops: Vec<_> = EmailType::ALL
            .into_iter()
            .filter(|t| t.recipient() == Recipient::Operations)
            .collect();
        assert_eq!(
            ops,
            vec![EmailType::CancellationNotification, EmailType::RetentionAcceptance]
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert_eq!(
            "welcome_email".parse::<EmailType>().unwrap_err(),
            "Invalid email type: welcome_email"
        );
    }
}
