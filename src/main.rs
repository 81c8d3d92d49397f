use std::sync::Arc;

use anyhow::Context;

use cancel_flow::config::AppConfig;
use cancel_flow::notify::transport;
use cancel_flow::server::{AppServices, build_app};
use cancel_flow::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("🧾 Cancel Flow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api", config.port);
    eprintln!("   Mail: {}", config.mail.provider_name());
    eprintln!(
        "   Terminal routing: {}",
        if config.legacy_terminal_routing {
            "legacy (resume retention)"
        } else {
            "freeze"
        }
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&config.db_path))
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path))?,
    );
    eprintln!("   Database: {}", config.db_path);

    // ── Services ─────────────────────────────────────────────────────────
    let mailer = transport::from_config(&config.mail);
    let services = AppServices::new(db, mailer, &config);
    let app = build_app(&services);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Cancel flow server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
