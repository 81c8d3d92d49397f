//! Step routing: (current step, snapshot) -> next step.

use crate::flow::feature::Feature;
use crate::flow::reason::{MISSING_FEATURES, NOT_GETTING_ENOUGH_REVIEWS, POOR_EXPERIENCE, TECHNICAL_ISSUES};
use crate::flow::snapshot::SubmissionSnapshot;
use crate::flow::step::StepName;

/// What happens when routing is asked to move past a terminal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminalPolicy {
    /// Terminal steps route to themselves.
    #[default]
    Freeze,
    /// Terminal steps route back to `retention`; `confirmation` still stays put.
    ResumeRetention,
}

impl TerminalPolicy {
    pub fn from_legacy_flag(legacy: bool) -> Self {
        if legacy {
            Self::ResumeRetention
        } else {
            Self::Freeze
        }
    }
}

/// Pure routing table. Holds no state beyond its terminal policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepRouter {
    policy: TerminalPolicy,
}

impl StepRouter {
    pub fn new(policy: TerminalPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TerminalPolicy {
        self.policy
    }

    pub fn next_step(&self, current: StepName, snapshot: &SubmissionSnapshot) -> StepName {
        use StepName::*;
        match current {
            Feedback => route_feedback(snapshot),

            ReviewOptimizationEducation => ReviewOptimizationCalendly,
            ReviewOptimizationCalendly => ReviewOptimizationEmailConfirmation,
            PoorExperienceEducation => PoorExperienceCalendly,
            PoorExperienceCalendly => PoorExperienceEmailConfirmation,
            TechnicalIssuesEducation => TechnicalIssuesConfirmation,
            RetailSyndicationEducation => RetailSyndicationConfirmation,

            FeatureEducation | CombinedEducation | CustomApiEducation | GoogleBusinessEducation => {
                Retention
            }

            Retention if snapshot.retention_accepted == Some(true) => Confirmation,
            Retention => FuturePlans,
            FuturePlans => Confirmation,

            Confirmation => Confirmation,
            terminal => match self.policy {
                TerminalPolicy::Freeze => terminal,
                TerminalPolicy::ResumeRetention => Retention,
            },
        }
    }

    /// Steps visited on the way from `feedback` to `target` for this
    /// snapshot, oldest first. Empty when `target` is not on that path.
    pub fn steps_before(&self, target: StepName, snapshot: &SubmissionSnapshot) -> Vec<StepName> {
        let mut path = Vec::new();
        let mut step = StepName::Feedback;
        while step != target {
            if path.contains(&step) || path.len() >= StepName::ALL.len() {
                return Vec::new();
            }
            path.push(step);
            step = self.next_step(step, snapshot);
        }
        path
    }

    /// Route from a step name as a client sent it. Unknown names finish the flow.
    pub fn next_step_from_str(&self, current: &str, snapshot: &SubmissionSnapshot) -> StepName {
        match current.parse::<StepName>() {
            Ok(step) => self.next_step(step, snapshot),
            Err(_) => {
                tracing::debug!(step = current, "Unknown step name, routing to confirmation");
                StepName::Confirmation
            }
        }
    }
}

/// First matching reason wins.
fn route_feedback(snapshot: &SubmissionSnapshot) -> StepName {
    if snapshot.has_reason(TECHNICAL_ISSUES) {
        StepName::TechnicalIssuesEducation
    } else if snapshot.has_reason(NOT_GETTING_ENOUGH_REVIEWS) {
        StepName::ReviewOptimizationEducation
    } else if snapshot.has_reason(POOR_EXPERIENCE) {
        StepName::PoorExperienceEducation
    } else if snapshot.has_reason(MISSING_FEATURES) {
        route_features(snapshot)
    } else {
        StepName::Retention
    }
}

fn route_features(snapshot: &SubmissionSnapshot) -> StepName {
    let shopping = snapshot.has_feature(&Feature::GoogleShoppingAds);
    let platform = snapshot.has_feature(&Feature::StorePlatformIntegration);
    match (shopping, platform) {
        (true, true) => StepName::CombinedEducation,
        (true, false) => StepName::FeatureEducation,
        (false, true) => StepName::CustomApiEducation,
        (false, false) if snapshot.has_feature(&Feature::GoogleSellerAds) => {
            StepName::GoogleBusinessEducation
        }
        (false, false) if snapshot.has_feature(&Feature::RetailSyndication) => {
            StepName::RetailSyndicationEducation
        }
        (false, false) if snapshot.has_feature(&Feature::DisplayWidgets) => {
            StepName::FeatureEducation
        }
        (false, false) => StepName::Retention,
    }
}
