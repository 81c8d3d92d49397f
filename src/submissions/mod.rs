//! Submission CRUD endpoints and the per-IP attempt limiter.

pub mod rate_limit;
pub mod routes;

pub use rate_limit::{AttemptLimiter, RateLimitDecision, rate_limit_routes};
pub use routes::{SubmissionRouteState, submission_routes};
