//! The accumulated form data a submission carries through the wizard.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::flow::feature::Feature;
use crate::flow::reason::{self, MISSING_FEATURES, SOMETHING_ELSE};

/// Regular features a user may pick, not counting "Something else".
pub const MAX_REGULAR_FEATURES: usize = 2;

/// Everything the user has entered so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSnapshot {
    pub email: Option<String>,
    pub user_name: Option<String>,
    /// Canonical reasons, in the order given.
    pub cancellation_reasons: Vec<String>,
    pub selected_features: Vec<Feature>,
    pub specific_issues: Option<String>,
    pub additional_feedback: Option<String>,
    pub retention_accepted: Option<bool>,
    pub future_plans: Option<String>,
    pub competitor_info: Option<String>,
}

/// Partial update sent with one step. Absent fields leave the snapshot alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotPatch {
    pub email: Option<String>,
    pub user_name: Option<String>,
    pub cancellation_reasons: Option<Vec<String>>,
    pub selected_features: Option<Vec<Feature>>,
    #[serde(alias = "technicalIssue")]
    pub specific_issues: Option<String>,
    pub additional_feedback: Option<String>,
    pub retention_accepted: Option<bool>,
    pub future_plans: Option<String>,
    pub competitor_info: Option<String>,
}

impl SnapshotPatch {
    pub fn touches_feedback(&self) -> bool {
        self.cancellation_reasons.is_some()
            || self.selected_features.is_some()
            || self.specific_issues.is_some()
            || self.additional_feedback.is_some()
    }

    pub fn touches_retention(&self) -> bool {
        self.retention_accepted.is_some()
            || self.future_plans.is_some()
            || self.competitor_info.is_some()
    }
}

impl SubmissionSnapshot {
    /// Apply `patch` on top of the current values.
    ///
    /// Reasons are canonicalized on the way in. Feature selections only
    /// survive while "Missing Features" is among the reasons.
    pub fn merge(&mut self, patch: &SnapshotPatch) {
        if let Some(email) = &patch.email {
            self.email = Some(email.trim().to_string());
        }
        if let Some(name) = &patch.user_name {
            self.user_name = Some(name.clone());
        }
        if let Some(reasons) = &patch.cancellation_reasons {
            self.cancellation_reasons = reason::canonicalize_all(reasons);
        }
        if let Some(features) = &patch.selected_features {
            self.selected_features = features.clone();
        }
        if let Some(v) = &patch.specific_issues {
            self.specific_issues = Some(v.clone());
        }
        if let Some(v) = &patch.additional_feedback {
            self.additional_feedback = Some(v.clone());
        }
        if patch.retention_accepted.is_some() {
            self.retention_accepted = patch.retention_accepted;
        }
        if let Some(v) = &patch.future_plans {
            self.future_plans = Some(v.clone());
        }
        if let Some(v) = &patch.competitor_info {
            self.competitor_info = Some(v.clone());
        }
        if !self.has_reason(MISSING_FEATURES) {
            self.selected_features.clear();
        }
    }

    pub fn has_reason(&self, canonical: &str) -> bool {
        reason::contains(&self.cancellation_reasons, canonical)
    }

    pub fn has_feature(&self, feature: &Feature) -> bool {
        self.selected_features.contains(feature)
    }

    /// Check the feedback-screen rules, reporting the first one broken.
    pub fn validate_feedback(&self) -> Result<(), ValidationError> {
        if self.cancellation_reasons.is_empty() {
            return Err(ValidationError::new(
                "cancellationReasons",
                "Please select a reason for canceling",
            ));
        }
        validate_email(self.email.as_deref().unwrap_or(""))?;

        if self.has_reason(MISSING_FEATURES) {
            if self.selected_features.is_empty() {
                return Err(ValidationError::new(
                    "selectedFeatures",
                    "Please select at least one missing feature",
                ));
            }
            if let Some(Feature::Unrecognized(label)) = self
                .selected_features
                .iter()
                .find(|f| matches!(f, Feature::Unrecognized(_)))
            {
                return Err(ValidationError::new(
                    "selectedFeatures",
                    format!("Unrecognized feature: {label}"),
                ));
            }
            let regular = self.selected_features.iter().filter(|f| f.is_regular()).count();
            if regular > MAX_REGULAR_FEATURES {
                return Err(ValidationError::new(
                    "selectedFeatures",
                    format!("Please select at most {MAX_REGULAR_FEATURES} features"),
                ));
            }
            if self.has_feature(&Feature::SomethingElse) && is_blank(&self.additional_feedback) {
                return Err(ValidationError::new(
                    "additionalFeedback",
                    "Please provide details about the additional feature you need",
                ));
            }
        }

        if self.has_reason(SOMETHING_ELSE) && is_blank(&self.additional_feedback) {
            return Err(ValidationError::new(
                "additionalFeedback",
                "Please provide additional feedback",
            ));
        }
        Ok(())
    }
}

/// Require a non-blank address containing `@`.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::new("email", "Please enter your email address"));
    }
    if !email.contains('@') {
        return Err(ValidationError::new("email", "Please enter a valid email address"));
    }
    Ok(())
}

fn is_blank(v: &Option<String>) -> bool {
    v.as_deref().is_none_or(|s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::reason::{TECHNICAL_ISSUES, TOO_EXPENSIVE};

    fn feedback(reasons: &[&str]) -> SubmissionSnapshot {
        let mut snap = SubmissionSnapshot::default();
        snap.merge(&SnapshotPatch {
            email: Some("owner@shop.test".into()),
            cancellation_reasons: Some(reasons.iter().map(|r| r.to_string()).collect()),
            ..Default::default()
        });
        snap
    }

    #[test]
    fn merge_canonicalizes_reasons() {
        let snap = feedback(&["other", "too expensive"]);
        assert_eq!(snap.cancellation_reasons, vec![SOMETHING_ELSE, TOO_EXPENSIVE]);
    }

    #[test]
    fn merge_keeps_untouched_fields() {
        let mut snap = feedback(&[TECHNICAL_ISSUES]);
        snap.merge(&SnapshotPatch {
            specific_issues: Some("widget will not load".into()),
            ..Default::default()
        });
        snap.merge(&SnapshotPatch {
            retention_accepted: Some(false),
            ..Default::default()
        });
        assert_eq!(snap.email.as_deref(), Some("owner@shop.test"));
        assert_eq!(snap.specific_issues.as_deref(), Some("widget will not load"));
        assert_eq!(snap.retention_accepted, Some(false));
    }

    #[test]
    fn features_cleared_when_reason_dropped() {
        let mut snap = SubmissionSnapshot::default();
        snap.merge(&SnapshotPatch {
            cancellation_reasons: Some(vec![MISSING_FEATURES.into()]),
            selected_features: Some(vec![Feature::RetailSyndication]),
            ..Default::default()
        });
        assert_eq!(snap.selected_features, vec![Feature::RetailSyndication]);

        snap.merge(&SnapshotPatch {
            cancellation_reasons: Some(vec![TOO_EXPENSIVE.into()]),
            ..Default::default()
        });
        assert!(snap.selected_features.is_empty());
    }

    #[test]
    fn patch_deserializes_camel_case_and_technical_issue_alias() {
        let patch: SnapshotPatch = serde_json::from_value(serde_json::json!({
            "cancellationReasons": ["Technical Issues"],
            "technicalIssue": "sync fails",
            "retentionAccepted": true
        }))
        .unwrap();
        assert_eq!(patch.specific_issues.as_deref(), Some("sync fails"));
        assert_eq!(patch.retention_accepted, Some(true));
        assert!(patch.touches_feedback());
        assert!(patch.touches_retention());
    }

    #[test]
    fn validation_messages() {
        let msg = |snap: &SubmissionSnapshot| snap.validate_feedback().unwrap_err().message;

        assert_eq!(msg(&SubmissionSnapshot::default()), "Please select a reason for canceling");

        let mut no_email = feedback(&[TOO_EXPENSIVE]);
        no_email.email = None;
        assert_eq!(msg(&no_email), "Please enter your email address");

        let mut bad_email = feedback(&[TOO_EXPENSIVE]);
        bad_email.email = Some("owner.shop.test".into());
        assert_eq!(msg(&bad_email), "Please enter a valid email address");

        assert_eq!(
            msg(&feedback(&[MISSING_FEATURES])),
            "Please select at least one missing feature"
        );
        assert_eq!(msg(&feedback(&["Other"])), "Please provide additional feedback");
        assert!(feedback(&[TOO_EXPENSIVE]).validate_feedback().is_ok());
    }

    #[test]
    fn feature_rules() {
        let mut snap = feedback(&[MISSING_FEATURES]);
        snap.selected_features = vec![
            Feature::GoogleShoppingAds,
            Feature::StorePlatformIntegration,
            Feature::SomethingElse,
        ];
        let err = snap.validate_feedback().unwrap_err();
        assert_eq!(err.field, "additionalFeedback");
        assert_eq!(err.message, "Please provide details about the additional feature you need");

        snap.additional_feedback = Some("Shopify POS sync".into());
        assert!(snap.validate_feedback().is_ok());

        snap.selected_features.push(Feature::DisplayWidgets);
        assert!(snap.validate_feedback().is_err());

        snap.selected_features = vec![Feature::Unrecognized("Dark mode".into())];
        let err = snap.validate_feedback().unwrap_err();
        assert_eq!(err.message, "Unrecognized feature: Dark mode");
    }
}
