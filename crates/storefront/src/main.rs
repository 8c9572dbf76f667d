//! Right Water storefront: catalog, orders and catalog administration.
//!
//! This binary serves the storefront on port 3000.
//!
//! # Architecture
//!
//! - Axum web framework with Askama templates for server-side rendering
//! - Email/password identity provider with opaque bearer tokens
//! - `PostgreSQL` document store with per-collection access policy
//! - Local filesystem blob store for product images under `/media`
//!
//! # Security
//!
//! Administrator privilege comes only from authorization records, which this
//! binary reads but never writes. Grant and revoke them with `rw-cli admin`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use right_water_storefront::config::StorefrontConfig;
use right_water_storefront::db::{self, PgAccounts, PgBackend};
use right_water_storefront::services::blob::LocalBlobStore;
use right_water_storefront::services::mail::{LogMailer, Mailer, SmtpMailer};
use right_water_storefront::state::{AppState, Backends};
use sentry::integrations::tracing as sentry_tracing;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Reset links go out over SMTP when configured, otherwise to the log.
fn create_mailer(config: &StorefrontConfig) -> Arc<dyn Mailer> {
    let Some(email) = &config.email else {
        tracing::warn!("SMTP not configured; password reset links will be logged");
        return Arc::new(LogMailer);
    };
    match SmtpMailer::new(email) {
        Ok(mailer) => Arc::new(mailer),
        Err(e) => {
            tracing::error!(error = %e, "invalid SMTP configuration; logging reset links instead");
            Arc::new(LogMailer)
        }
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = StorefrontConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "right_water_storefront=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p right-water-cli -- migrate

    let documents = PgBackend::new(pool.clone());
    let _listener = documents
        .listen()
        .await
        .expect("Failed to listen for document changes");

    let backends = Backends {
        pool: Some(pool.clone()),
        documents: Arc::new(documents),
        accounts: Arc::new(PgAccounts::new(pool.clone())),
        blobs: Arc::new(LocalBlobStore::new(config.media_dir.clone(), "/media")),
        mailer: create_mailer(&config),
    };
    let state =
        AppState::new(config.clone(), backends).expect("Failed to initialize application state");

    let app = right_water_storefront::app(state, PostgresStore::new(pool))
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("storefront listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
