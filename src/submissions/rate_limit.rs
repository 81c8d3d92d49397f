//! Sliding-window limit on cancellation attempts per client IP.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::api::ApiError;
use crate::error::DatabaseError;
use crate::store::Database;

const UNKNOWN_IP: &str = "0.0.0.0";

/// Answer for one attempt check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Attempts left in the window after this one.
    pub attempts_remaining: u32,
    /// When a refused client may try again.
    pub next_attempt_allowed: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct AttemptLimiter {
    db: Arc<dyn Database>,
    max_attempts: u32,
    window: TimeDelta,
}

impl AttemptLimiter {
    pub fn new(db: Arc<dyn Database>, max_attempts: u32, window: std::time::Duration) -> Self {
        Self {
            db,
            max_attempts,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::hours(24)),
        }
    }

    /// Check (and, when allowed, record) an attempt from `ip` at `now`.
    pub async fn check(&self, ip: &str, now: DateTime<Utc>) -> Result<RateLimitDecision, DatabaseError> {
        let attempts = self.db.recent_attempts(ip, now - self.window).await?;
        let used = attempts.len() as u32;

        if used >= self.max_attempts {
            // The window frees up when the attempt that filled it ages out.
            let idx = attempts.len().saturating_sub(self.max_attempts as usize);
            let next = attempts.get(idx).map(|at| *at + self.window);
            tracing::info!(ip, attempts = used, "Cancellation attempt refused");
            return Ok(RateLimitDecision {
                allowed: false,
                attempts_remaining: 0,
                next_attempt_allowed: next,
            });
        }

        self.db.record_attempt(ip, now).await?;
        Ok(RateLimitDecision {
            allowed: true,
            attempts_remaining: self.max_attempts - used - 1,
            next_attempt_allowed: None,
        })
    }
}

/// Client IP from `x-real-ip`, then the first `x-forwarded-for` hop.
pub fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    header("x-real-ip")
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .unwrap_or(UNKNOWN_IP)
        .to_string()
}

/// POST /api/check-rate-limit
async fn check_rate_limit(
    State(limiter): State<AttemptLimiter>,
    headers: HeaderMap,
) -> Result<Json<RateLimitDecision>, ApiError> {
    let ip = client_ip(&headers);
    Ok(Json(limiter.check(&ip, Utc::now()).await?))
}

pub fn rate_limit_routes(limiter: AttemptLimiter) -> Router {
    Router::new()
        .route("/api/check-rate-limit", post(check_rate_limit))
        .with_state(limiter)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::HeaderValue;

    use super::*;
    use crate::store::LibSqlBackend;

    async fn limiter() -> AttemptLimiter {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        AttemptLimiter::new(db, 3, Duration::from_secs(24 * 3600))
    }

    #[tokio::test]
    async fn third_attempt_is_last() {
        let limiter = limiter().await;
        let start = Utc::now();
        let mut remaining = Vec::new();
        for i in 0..3 {
            let d = limiter.check("203.0.113.7", start + TimeDelta::minutes(i)).await.unwrap();
            assert!(d.allowed);
            remaining.push(d.attempts_remaining);
        }
        assert_eq!(remaining, vec![2, 1, 0]);

        let refused = limiter
            .check("203.0.113.7", start + TimeDelta::minutes(10))
            .await
            .unwrap();
        assert!(!refused.allowed);
        assert_eq!(
            refused.next_attempt_allowed.unwrap().timestamp(),
            (start + TimeDelta::hours(24)).timestamp()
        );

        let other = limiter.check("198.51.100.1", start).await.unwrap();
        assert!(other.allowed);
    }

    #[tokio::test]
    async fn window_slides() {
        let limiter = limiter().await;
        let start = Utc::now() - TimeDelta::hours(30);
        for i in 0..3 {
            limiter.check("203.0.113.7", start + TimeDelta::minutes(i)).await.unwrap();
        }
        let later = limiter.check("203.0.113.7", Utc::now()).await.unwrap();
        assert!(later.allowed);
        assert_eq!(later.attempts_remaining, 2);
    }

    #[test]
    fn ip_header_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "0.0.0.0");

        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.1, 10.0.0.1"));
        assert_eq!(client_ip(&headers), "198.51.100.1");

        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.7"));
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }
}
