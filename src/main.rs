// src/main.rs
use axum::{extract::Extension, middleware, Router};
use dotenv::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::PathBuf;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// MODULE IMPORTS
// ============================================================================

mod access;
mod admin;
mod common;
mod logging_middleware;
mod payments;
mod services;
mod verification;

// ============================================================================
// COMMON IMPORTS
// ============================================================================

use common::{AppConfig, AppState};
use services::monitoring::{init_sentry, MonitoringConfig};
use services::{ChatPlatform, OcrEngine, TelegramClient, TesseractOcr};

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let monitoring = MonitoringConfig::from_env();
    let _sentry_guard = init_sentry(&monitoring);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(sentry_tracing::layer())
        .init();

    if monitoring.is_enabled() {
        info!(environment = %monitoring.environment, "Error reporting enabled");
    }

    // ========================================================================
    // ENVIRONMENT CONFIGURATION
    // ========================================================================

    let config = AppConfig::from_env()?;
    config.log_summary();

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    if let Some(path_part) = config.database_url.strip_prefix("sqlite://") {
        let path_without_params = path_part.split('?').next().unwrap_or("");
        if !path_without_params.is_empty() && !path_without_params.starts_with(':') {
            let db_path = PathBuf::from(path_without_params);
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
    }

    let pool = SqlitePoolOptions::new()
        .connect_with(common::migrations::connect_options(&config.database_url)?)
        .await?;

    // Run database migrations
    common::migrations::run_migrations(&pool).await?;

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    let ocr: Arc<dyn OcrEngine> = Arc::new(TesseractOcr::detect(config.tesseract_path.clone()).await);
    if !ocr.is_available() {
        warn!(
            tesseract_path = %config.tesseract_path,
            "Tesseract not found; every receipt will be rejected as unreadable"
        );
    }

    let chat: Arc<dyn ChatPlatform> = Arc::new(TelegramClient::new(&config.bot_token));
    info!("TelegramClient initialized");

    if config.vip_chat_id.is_none() {
        warn!("VIP_CHAT_ID not set; token redemption and join requests are disabled");
    }

    let cors_origins = config.cors_origins.clone();
    let port = config.port;

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let app_state = AppState::new(pool, config, ocr, chat);

    // Startup sweep so stale rows from a previous run don't linger
    let expired_payments = app_state.ledger.sweep_expired().await?;
    let expired_tokens = app_state.tokens.sweep_expired().await?;
    info!(expired_payments, expired_tokens, "Startup sweep finished");

    let shared = Arc::new(RwLock::new(app_state));

    // ========================================================================
    // ROUTER COMPOSITION
    // ========================================================================

    let app = Router::new()
        // ====================================================================
        // PAYMENT ROUTES (Instructions, Requests, Receipt Upload)
        // ====================================================================
        .merge(payments::payments_routes())
        // ====================================================================
        // ACCESS ROUTES (Token Redemption, Join Requests)
        // ====================================================================
        .merge(access::access_routes())
        // ====================================================================
        // ADMIN ROUTES (Stats, Price, Join Request Review, Maintenance)
        // ====================================================================
        .merge(admin::admin_routes())
        // ====================================================================
        // MIDDLEWARE AND LAYERS
        // ====================================================================
        // Add request/response body logging in debug mode
        .layer(middleware::from_fn(logging_middleware::log_request_response))
        .layer(Extension(shared.clone()))
        .layer({
            let origins: Vec<axum::http::HeaderValue> = cors_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                    axum::http::HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true)
        })
        .layer(TraceLayer::new_for_http());

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
