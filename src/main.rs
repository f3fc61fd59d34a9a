use credentials_api::audit::{AuditLogger, MemoryAuditStorage};
use credentials_api::clock::SystemClock;
use credentials_api::config;
use credentials_api::handlers::{self, AppState};
use credentials_api::models::{AppConfig, TransportSecurity};
use credentials_api::rate_limit::SlidingWindowRateLimiter;
use credentials_api::service::CredentialsService;
use credentials_api::session::{
    MemorySessionStore, SessionIssuer, TokenCodec, UserSessionIndex, spawn_sweeper,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credentials_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let app_config = match config::load_config_with_fallback() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(app_config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(app_config: Arc<AppConfig>) -> Result<(), String> {
    let addr = app_config.server.socket_addr()?;

    match app_config.server.transport_security {
        Some(TransportSecurity::UpstreamTls) => {
            tracing::info!("Transport security: TLS terminated upstream");
        }
        Some(TransportSecurity::Insecure) => {
            tracing::warn!(
                "Transport security is 'insecure': session tokens travel in plaintext. Do not use outside local development."
            );
        }
        None => return Err("server.transport_security is not set".to_string()),
    }

    let session_config = app_config.session.clone();
    let codec = TokenCodec::new(session_config.token_secret.as_bytes())
        .map_err(|e| format!("Invalid token secret: {}", e))?;

    let store = Arc::new(MemorySessionStore::new(
        session_config.store_capacity,
        session_config.grace_period(),
    ));
    let limiter = Arc::new(SlidingWindowRateLimiter::from_config(&app_config.rate_limit));
    let sweep_interval = Duration::from_secs(session_config.sweep_interval_secs);

    let issuer = Arc::new(SessionIssuer::new(
        store,
        Arc::new(UserSessionIndex::new()),
        limiter,
        codec,
        Arc::new(SystemClock),
        session_config,
    ));

    let (audit, audit_handle) = AuditLogger::spawn(
        Arc::new(MemoryAuditStorage::new()),
        app_config.audit.channel_capacity,
    );

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(issuer.clone(), sweep_interval, shutdown.clone());

    let state = AppState {
        service: CredentialsService::new(issuer, audit),
    };
    let app = handlers::router(
        state,
        Duration::from_secs(app_config.server.request_timeout_secs),
    );

    tracing::info!("Starting credentials API server on {}", addr);
    tracing::info!("Session routes: /api/v1/sessions, /api/v1/sessions/resolve, /api/v1/sessions/revoke");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
            serve_shutdown.cancel();
        })
        .await
        .map_err(|e| format!("Server failed: {}", e))?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!("Sweeper task ended abnormally: {}", e);
    }
    // The router owned the last audit sender, so the writer drains and exits.
    if let Err(e) = audit_handle.await {
        tracing::warn!("Audit writer ended abnormally: {}", e);
    }

    tracing::info!("Credentials API stopped");
    Ok(())
}
