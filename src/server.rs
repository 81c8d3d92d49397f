//! Wires the services together and assembles the HTTP router.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::education::{EducationLogger, EducationRouteState, education_routes};
use crate::flow::{StepRouter, TerminalPolicy, WizardController, WizardRouteState, wizard_routes};
use crate::notify::transport::MailTransport;
use crate::notify::{NotificationDispatcher, NotifyRouteState, notify_routes};
use crate::store::Database;
use crate::submissions::{AttemptLimiter, SubmissionRouteState, rate_limit_routes, submission_routes};

/// Everything the routers share.
#[derive(Clone)]
pub struct AppServices {
    pub db: Arc<dyn Database>,
    pub logger: EducationLogger,
    pub dispatcher: NotificationDispatcher,
    pub controller: Arc<WizardController>,
    pub limiter: AttemptLimiter,
}

impl AppServices {
    pub fn new(db: Arc<dyn Database>, transport: Arc<dyn MailTransport>, config: &AppConfig) -> Self {
        let logger = EducationLogger::new(Arc::clone(&db), config.retry.clone());
        let dispatcher = NotificationDispatcher::new(
            transport,
            Arc::clone(&db),
            config.email.clone(),
            config.retry.clone(),
        );
        let router = StepRouter::new(TerminalPolicy::from_legacy_flag(config.legacy_terminal_routing));
        let controller = Arc::new(WizardController::new(
            Arc::clone(&db),
            logger.clone(),
            dispatcher.clone(),
            router,
        ));
        let limiter = AttemptLimiter::new(
            Arc::clone(&db),
            config.max_attempts_per_window,
            config.attempt_window,
        );
        Self {
            db,
            logger,
            dispatcher,
            controller,
            limiter,
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// The full application router.
pub fn build_app(services: &AppServices) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(submission_routes(SubmissionRouteState {
            db: Arc::clone(&services.db),
        }))
        .merge(education_routes(EducationRouteState {
            logger: services.logger.clone(),
        }))
        .merge(notify_routes(NotifyRouteState {
            dispatcher: services.dispatcher.clone(),
        }))
        .merge(wizard_routes(WizardRouteState {
            controller: Arc::clone(&services.controller),
        }))
        .merge(rate_limit_routes(services.limiter.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
