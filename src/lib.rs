use std::path::Path;
use std::sync::Arc;

use crate::model::entity::UserEntity;
use crate::model::{DbConnection, ModelManager};
use crate::payments::{PaymentGateway, StripeClient};
use crate::utils::signal::shutdown_signal;
use crate::{error::AppResult, web::AppState};
use axum::Router;
use sqlx::migrate::Migrator;
use tokio::net::TcpListener;

pub mod config;
pub use config::{Config, ConfigError, ConfigResult};

pub mod auth;
pub mod error;
pub mod model;
pub mod payments;
pub mod utils;
pub mod web;

static APPLICATION_NAME: &str = "academy";

pub async fn build_server() -> AppResult<(AppState, Router)> {
    let use_local = cfg!(debug_assertions);
    let config = config::Config::get_or_init(use_local).await;
    let db = DbConnection::connect(config.app().database_uri())?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    tracing::debug!("applying migrations...");
    migrator.run(db.pool()).await?;

    let payments = Arc::new(StripeClient::from_config(config));
    build_server_with(db, payments).await
}

/// Server over an already migrated pool with a custom payment gateway.
pub async fn build_server_with(
    db: DbConnection,
    payments: Arc<dyn PaymentGateway>,
) -> AppResult<(AppState, Router)> {
    let config = config::Config::get_or_init(cfg!(debug_assertions)).await;
    let mm = ModelManager::new(db);

    if let Some((email, password)) = config.app().admin_credentials() {
        UserEntity::ensure_admin(&mm, email, || auth::hash_password(password)).await?;
    }

    let state = AppState::new(mm, config, payments);
    let app = web::routes::build_app(state.clone(), config);
    Ok((state, app))
}

#[tracing::instrument]
pub async fn setup_workers() -> AppResult<()> {
    let (_, app) = build_server().await?;
    let config = Config::get_or_init(false).await;
    let listener = TcpListener::bind(config.host().bindto()).await?;

    tracing::info!("{APPLICATION_NAME} is starting at: {}", config.host().bindto());
    let axum_handle = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal());

    axum_handle.await?;
    Ok(())
}

fn setup_trace() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

    // load .env file for RUST_LOG etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .with(ErrorLayer::default())
        .init();

    tracing::debug!("tracing initialized.");
}

#[tracing::instrument]
pub async fn run() -> AppResult<()> {
    setup_trace();
    setup_workers().await?;
    Ok(())
}
