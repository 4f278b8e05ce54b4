//! alumni-admin: privileged admin server for the alumni portal.
//!
//! Reads config from env vars (and `.env`):
//!   DATABASE_URL            Postgres connection string (required)
//!   BAAS_URL                BaaS project URL (required)
//!   BAAS_SERVICE_ROLE_KEY   elevated service credential (required)
//!   BIND_ADDR               listen address (default: 0.0.0.0:3001)
//!   ADMIN_API_TOKEN         bearer token for /api/admin/* (optional)
//!   EMAIL_API_KEY           enables the test-email route (optional)

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use alumni_admin::config::Config;
use alumni_admin::router::build_router;
use alumni_admin::state::AppState;
use alumni_backend::{AuthAdminClient, HttpEmailSender, PgStores};
use alumni_core::AdminService;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,alumni_admin=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.step_timeout)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Connected to database");

    let stores = PgStores::new(pool);
    let identities = AuthAdminClient::new(
        &config.baas_url,
        config.service_role_key.clone(),
        config.step_timeout,
    )?;

    let mut service = AdminService::new(
        Arc::new(stores.registrations),
        Arc::new(stores.users),
        Arc::new(stores.profiles),
        Arc::new(identities),
    )
    .with_config(config.service_config());

    match &config.email {
        Some(email) => {
            let mailer = HttpEmailSender::new(
                &email.api_url,
                email.api_key.clone(),
                email.from.clone(),
                config.step_timeout,
            )?;
            service = service.with_mailer(Arc::new(mailer));
        }
        None => tracing::warn!("EMAIL_API_KEY not set; test email route will return 503"),
    }

    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_API_TOKEN not set; admin routes accept unauthenticated requests");
    }

    let state = AppState::new(service, &config.service_name, config.admin_token.as_deref());
    let app = build_router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!("{} listening on {}", config.service_name, config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
