//! Wizard steps and the submission status they imply.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every screen of the cancellation wizard.
///
/// Serialized names are the wire and storage form (`review_optimization_education`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Feedback,
    ReviewOptimizationEducation,
    ReviewOptimizationCalendly,
    ReviewOptimizationEmailConfirmation,
    PoorExperienceEducation,
    PoorExperienceCalendly,
    PoorExperienceEmailConfirmation,
    TechnicalIssuesEducation,
    TechnicalIssuesConfirmation,
    FeatureEducation,
    CombinedEducation,
    CustomApiEducation,
    GoogleBusinessEducation,
    RetailSyndicationEducation,
    RetailSyndicationConfirmation,
    Retention,
    FuturePlans,
    Confirmation,
}

/// Coarse category of a step, recorded as the education event `stepType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Feedback,
    Education,
    Calendly,
    Confirmation,
    Retention,
    FuturePlans,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feedback => "feedback",
            Self::Education => "education",
            Self::Calendly => "calendly",
            Self::Confirmation => "confirmation",
            Self::Retention => "retention",
            Self::FuturePlans => "future_plans",
        }
    }
}

impl StepName {
    pub const ALL: [StepName; 18] = [
        Self::Feedback,
        Self::ReviewOptimizationEducation,
        Self::ReviewOptimizationCalendly,
        Self::ReviewOptimizationEmailConfirmation,
        Self::PoorExperienceEducation,
        Self::PoorExperienceCalendly,
        Self::PoorExperienceEmailConfirmation,
        Self::TechnicalIssuesEducation,
        Self::TechnicalIssuesConfirmation,
        Self::FeatureEducation,
        Self::CombinedEducation,
        Self::CustomApiEducation,
        Self::GoogleBusinessEducation,
        Self::RetailSyndicationEducation,
        Self::RetailSyndicationConfirmation,
        Self::Retention,
        Self::FuturePlans,
        Self::Confirmation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feedback => "feedback",
            Self::ReviewOptimizationEducation => "review_optimization_education",
            Self::ReviewOptimizationCalendly => "review_optimization_calendly",
            Self::ReviewOptimizationEmailConfirmation => "review_optimization_email_confirmation",
            Self::PoorExperienceEducation => "poor_experience_education",
            Self::PoorExperienceCalendly => "poor_experience_calendly",
            Self::PoorExperienceEmailConfirmation => "poor_experience_email_confirmation",
            Self::TechnicalIssuesEducation => "technical_issues_education",
            Self::TechnicalIssuesConfirmation => "technical_issues_confirmation",
            Self::FeatureEducation => "feature_education",
            Self::CombinedEducation => "combined_education",
            Self::CustomApiEducation => "custom_api_education",
            Self::GoogleBusinessEducation => "google_business_education",
            Self::RetailSyndicationEducation => "retail_syndication_education",
            Self::RetailSyndicationConfirmation => "retail_syndication_confirmation",
            Self::Retention => "retention",
            Self::FuturePlans => "future_plans",
            Self::Confirmation => "confirmation",
        }
    }

    /// Terminal steps end the wizard run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ReviewOptimizationEmailConfirmation
                | Self::PoorExperienceEmailConfirmation
                | Self::TechnicalIssuesConfirmation
                | Self::RetailSyndicationConfirmation
                | Self::Confirmation
        )
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Self::Feedback => StepKind::Feedback,
            Self::ReviewOptimizationEducation
            | Self::PoorExperienceEducation
            | Self::TechnicalIssuesEducation
            | Self::FeatureEducation
            | Self::CombinedEducation
            | Self::CustomApiEducation
            | Self::GoogleBusinessEducation
            | Self::RetailSyndicationEducation => StepKind::Education,
            Self::ReviewOptimizationCalendly | Self::PoorExperienceCalendly => StepKind::Calendly,
            Self::Retention => StepKind::Retention,
            Self::FuturePlans => StepKind::FuturePlans,
            Self::ReviewOptimizationEmailConfirmation
            | Self::PoorExperienceEmailConfirmation
            | Self::TechnicalIssuesConfirmation
            | Self::RetailSyndicationConfirmation
            | Self::Confirmation => StepKind::Confirmation,
        }
    }

    /// Rough completion percentage for a client-side progress bar.
    pub fn progress_percent(&self) -> u8 {
        if self.is_terminal() {
            return 100;
        }
        match self.kind() {
            StepKind::Feedback => 25,
            StepKind::Education => 50,
            StepKind::Calendly => 65,
            StepKind::Retention => 75,
            StepKind::FuturePlans => 90,
            StepKind::Confirmation => 100,
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a step name is not part of the wizard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown step: {0}")]
pub struct UnknownStep(pub String);

impl FromStr for StepName {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == trimmed)
            .ok_or_else(|| UnknownStep(s.to_string()))
    }
}

/// Lifecycle of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    Active,
    Retained,
    Cancelled,
}

impl SubmissionStatus {
    /// Status implied by reaching `step`.
    ///
    /// Every terminal step other than `confirmation` means the user took a
    /// remedy instead of cancelling.
    pub fn derive(step: StepName, retention_accepted: Option<bool>) -> Self {
        match step {
            StepName::Confirmation if retention_accepted == Some(true) => Self::Retained,
            StepName::Confirmation => Self::Cancelled,
            s if s.is_terminal() => Self::Retained,
            _ => Self::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retained => "retained",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "retained" => Self::Retained,
            "cancelled" => Self::Cancelled,
            _ => Self::Active,
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde() {
        for step in StepName::ALL {
            let json = serde_json::to_value(step).unwrap();
            assert_eq!(json.as_str().unwrap(), step.to_string());
        }
        for status in [
            SubmissionStatus::Active,
            SubmissionStatus::Retained,
            SubmissionStatus::Cancelled,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json.as_str().unwrap(), status.to_string());
        }
    }

    #[test]
    fn from_str_roundtrips_every_step() {
        for step in StepName::ALL {
            assert_eq!(step.as_str().parse::<StepName>().unwrap(), step);
        }
        assert_eq!(" retention ".parse::<StepName>().unwrap(), StepName::Retention);
        assert!("legacy_email_step".parse::<StepName>().is_err());
    }

    #[test]
    fn five_terminal_steps() {
        let terminal: Vec<_> = StepName::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal.len(), 5);
        assert!(terminal.iter().all(|s| s.kind() == StepKind::Confirmation));
        assert!(terminal.iter().all(|s| s.progress_percent() == 100));
    }

    #[test]
    fn kinds() {
        assert_eq!(StepName::CombinedEducation.kind(), StepKind::Education);
        assert_eq!(StepName::PoorExperienceCalendly.kind(), StepKind::Calendly);
        assert_eq!(StepName::FuturePlans.kind().as_str(), "future_plans");
        assert_eq!(StepName::Feedback.kind().as_str(), "feedback");
    }

    #[test]
    fn progress_is_monotonic_along_a_branch() {
        let path = [
            StepName::Feedback,
            StepName::ReviewOptimizationEducation,
            StepName::ReviewOptimizationCalendly,
            StepName::ReviewOptimizationEmailConfirmation,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].progress_percent() < pair[1].progress_percent());
        }
    }

    #[test]
    fn status_derivation() {
        use SubmissionStatus::*;
        assert_eq!(SubmissionStatus::derive(StepName::Feedback, None), Active);
        assert_eq!(SubmissionStatus::derive(StepName::Retention, Some(true)), Active);
        assert_eq!(SubmissionStatus::derive(StepName::Confirmation, Some(true)), Retained);
        assert_eq!(SubmissionStatus::derive(StepName::Confirmation, Some(false)), Cancelled);
        assert_eq!(SubmissionStatus::derive(StepName::Confirmation, None), Cancelled);
        assert_eq!(
            SubmissionStatus::derive(StepName::TechnicalIssuesConfirmation, None),
            Retained
        );
        assert_eq!(
            SubmissionStatus::derive(StepName::PoorExperienceEmailConfirmation, None),
            Retained
        );
    }
}
