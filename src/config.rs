//! Configuration types, read once from the environment at startup.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

const DEFAULT_POSTMARK_URL: &str = "https://api.postmarkapp.com";

/// Which mail provider the dispatcher talks to.
#[derive(Debug, Clone)]
pub enum MailConfig {
    /// Postmark HTTP API.
    Postmark {
        server_token: SecretString,
        base_url: String,
    },
    /// Plain SMTP relay.
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: SecretString,
    },
    /// No provider: every send fails with `NotConfigured` and the flow moves on.
    Disabled,
}

impl MailConfig {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Postmark { .. } => "postmark",
            Self::Smtp { .. } => "smtp",
            Self::Disabled => "disabled",
        }
    }
}

/// Addresses and links rendered into outgoing mail.
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub from_address: String,
    pub reply_to: String,
    /// Receives `cancellation_notification` and `retention_acceptance`.
    pub ops_address: String,
    pub product_name: String,
    pub review_calendly_url: String,
    pub experience_calendly_url: String,
    /// Retention discount, percent.
    pub discount_percent: u32,
    pub discount_months: u32,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            from_address: "noreply@ravecapture.com".to_string(),
            reply_to: "support@ravecapture.com".to_string(),
            ops_address: "support@ravecapture.com".to_string(),
            product_name: "RaveCapture".to_string(),
            review_calendly_url: "https://calendly.com/ravecapture/review-optimization".to_string(),
            experience_calendly_url: "https://calendly.com/ravecapture/experience-review"
                .to_string(),
            discount_percent: 50,
            discount_months: 12,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: String,
    /// Route terminal steps back to `retention` instead of freezing them.
    pub legacy_terminal_routing: bool,
    pub mail: MailConfig,
    pub email: EmailSettings,
    /// Backoff for the failure-tolerant collaborators (mail, education log).
    pub retry: RetryPolicy,
    /// Cancellation attempts allowed per client IP per window.
    pub max_attempts_per_window: u32,
    pub attempt_window: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: "./data/cancel-flow.db".to_string(),
            legacy_terminal_routing: false,
            mail: MailConfig::Disabled,
            email: EmailSettings::default(),
            retry: RetryPolicy::default(),
            max_attempts_per_window: 3,
            attempt_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unset and blank values fall back
    /// to defaults; values that are set but malformed are rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        let email_defaults = EmailSettings::default();

        let mail = if let Some(token) = get("POSTMARK_SERVER_TOKEN") {
            MailConfig::Postmark {
                server_token: SecretString::from(token),
                base_url: get("POSTMARK_API_URL").unwrap_or_else(|| DEFAULT_POSTMARK_URL.into()),
            }
        } else if let Some(host) = get("SMTP_HOST") {
            let username = get("SMTP_USERNAME").ok_or_else(|| ConfigError::MissingRequired {
                key: "SMTP_USERNAME".into(),
                hint: "required when SMTP_HOST is set".into(),
            })?;
            let password = get("SMTP_PASSWORD").ok_or_else(|| ConfigError::MissingRequired {
                key: "SMTP_PASSWORD".into(),
                hint: "required when SMTP_HOST is set".into(),
            })?;
            MailConfig::Smtp {
                host,
                port: parse_or(&get, "SMTP_PORT", 587)?,
                username,
                password: SecretString::from(password),
            }
        } else {
            MailConfig::Disabled
        };

        let email = EmailSettings {
            from_address: get("CANCEL_FLOW_FROM_EMAIL").unwrap_or(email_defaults.from_address),
            reply_to: get("CANCEL_FLOW_REPLY_TO").unwrap_or(email_defaults.reply_to),
            ops_address: get("CANCEL_FLOW_OPS_EMAIL").unwrap_or(email_defaults.ops_address),
            product_name: get("CANCEL_FLOW_PRODUCT_NAME").unwrap_or(email_defaults.product_name),
            review_calendly_url: get("CANCEL_FLOW_REVIEW_CALENDLY_URL")
                .unwrap_or(email_defaults.review_calendly_url),
            experience_calendly_url: get("CANCEL_FLOW_EXPERIENCE_CALENDLY_URL")
                .unwrap_or(email_defaults.experience_calendly_url),
            discount_percent: parse_or(
                &get,
                "CANCEL_FLOW_DISCOUNT_PERCENT",
                email_defaults.discount_percent,
            )?,
            discount_months: parse_or(
                &get,
                "CANCEL_FLOW_DISCOUNT_MONTHS",
                email_defaults.discount_months,
            )?,
        };

        if email.discount_percent > 100 {
            return Err(ConfigError::InvalidValue {
                key: "CANCEL_FLOW_DISCOUNT_PERCENT".into(),
                message: format!("{} is not a percentage", email.discount_percent),
            });
        }

        let retry = RetryPolicy {
            max_attempts: parse_or(&get, "CANCEL_FLOW_RETRY_ATTEMPTS", defaults.retry.max_attempts)?,
            initial_delay: Duration::from_millis(parse_or(
                &get,
                "CANCEL_FLOW_RETRY_BASE_MS",
                defaults.retry.initial_delay.as_millis() as u64,
            )?),
            ..defaults.retry
        };

        Ok(Self {
            port: parse_or(&get, "CANCEL_FLOW_PORT", defaults.port)?,
            db_path: get("CANCEL_FLOW_DB_PATH").unwrap_or(defaults.db_path),
            legacy_terminal_routing: parse_bool(&get, "CANCEL_FLOW_LEGACY_TERMINAL_ROUTING")?,
            mail,
            email,
            retry,
            max_attempts_per_window: parse_or(
                &get,
                "CANCEL_FLOW_MAX_ATTEMPTS",
                defaults.max_attempts_per_window,
            )?,
            attempt_window: defaults.attempt_window,
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, ConfigError> {
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got {v:?}"),
            }),
        },
    }
}
