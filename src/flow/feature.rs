//! "Missing feature" labels offered on the feedback screen.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A feature the user said the product lacks.
///
/// Labels outside the known set are kept verbatim in `Unrecognized` so they
/// can be rejected with a clear message instead of silently ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Feature {
    GoogleShoppingAds,
    GoogleSellerAds,
    StorePlatformIntegration,
    DisplayWidgets,
    RetailSyndication,
    SomethingElse,
    Unrecognized(String),
}

impl Feature {
    /// The selectable features, in form order.
    pub const KNOWN: [Feature; 6] = [
        Self::GoogleShoppingAds,
        Self::GoogleSellerAds,
        Self::StorePlatformIntegration,
        Self::DisplayWidgets,
        Self::RetailSyndication,
        Self::SomethingElse,
    ];

    pub fn label(&self) -> &str {
        match self {
            Self::GoogleShoppingAds => "Unable to integrate my reviews into Google Shopping Ads",
            Self::GoogleSellerAds => "Cannot display reviews in Google Seller Ads",
            Self::StorePlatformIntegration => "Lacks integration requirements with my store platform",
            Self::DisplayWidgets => "Can't customize my display widgets",
            Self::RetailSyndication => "Doesn't offer Retail Syndication",
            Self::SomethingElse => "Something else",
            Self::Unrecognized(label) => label,
        }
    }

    fn slug(&self) -> Option<&'static str> {
        match self {
            Self::GoogleShoppingAds => Some("google_shopping_ads"),
            Self::GoogleSellerAds => Some("google_seller_ads"),
            Self::StorePlatformIntegration => Some("store_platform_integration"),
            Self::DisplayWidgets => Some("display_widgets"),
            Self::RetailSyndication => Some("retail_syndication"),
            Self::SomethingElse => Some("something_else"),
            Self::Unrecognized(_) => None,
        }
    }

    /// Parse a form label (or its snake_case identifier). Case-insensitive.
    pub fn from_label(raw: &str) -> Self {
        let key = raw.trim();
        Self::KNOWN
            .iter()
            .find(|f| f.label().eq_ignore_ascii_case(key) || f.slug() == Some(key))
            .cloned()
            .unwrap_or_else(|| Self::Unrecognized(raw.trim().to_string()))
    }

    /// Counts toward the two-feature limit.
    pub fn is_regular(&self) -> bool {
        !matches!(self, Self::SomethingElse | Self::Unrecognized(_))
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Feature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_label(&raw))
    }
}
