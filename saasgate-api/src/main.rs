//! # SaaSGate API Server
//!
//! Accounts, JWT sessions, subscription billing and plan-limited apps.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p saasgate-api
//! ```
//!
//! Configuration comes from the environment (a `.env` file is loaded first).
//! `LOG_FORMAT=json` switches logs to JSON lines.

use saasgate_api::{
    app::{build_router, AppState},
    config::Config,
};
use saasgate_shared::billing::stripe::StripeClient;
use saasgate_shared::db::{migrations::run_migrations, pool, pool::create_pool};
use saasgate_shared::email::{EmailSender, HttpEmailSender, LogEmailSender};
use saasgate_shared::models::blacklisted_token::BlacklistedToken;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "saasgate_api=debug,saasgate_shared=debug,tower_http=debug".into()
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received, draining connections...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        "SaaSGate API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let db = create_pool(pool::DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;

    run_migrations(&db).await?;

    let purged = BlacklistedToken::purge_expired(&db).await?;
    if purged > 0 {
        tracing::info!(purged, "Purged expired blacklisted tokens");
    }

    let mailer: Arc<dyn EmailSender> = match &config.email.api_key {
        Some(api_key) => Arc::new(HttpEmailSender::new(api_key.clone(), config.email.from.clone())),
        None => {
            tracing::warn!("EMAIL_API_KEY not set; emails will be logged, not sent");
            Arc::new(LogEmailSender)
        }
    };

    let processor = Arc::new(StripeClient::new(
        config.stripe.secret_key.clone(),
        config.stripe.api_base.clone(),
    ));

    let address = config.bind_address();
    let state = AppState::new(db, config, processor, mailer);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Server listening on http://{}", address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
