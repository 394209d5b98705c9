// src/admin/handlers/dashboard.rs

use axum::{extract::Extension, Json};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::admin::extractors::AdminUser;
use crate::admin::models::{StatsResponse, SweepResponse};
use crate::common::{ApiError, AppState};

/// GET /api/admin/stats - Ledger, token and join-request statistics
pub async fn get_stats(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    admin: AdminUser,
) -> Result<Json<StatsResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    info!(admin_id = %admin.id, "Fetching stats");

    let ledger = state.ledger.stats().await?;
    let tokens = state.tokens.stats().await?;
    let join_requests = state.gate.stats().await?;
    let price = state
        .settings_service
        .current_price(state.config.base_amount)
        .await?;

    Ok(Json(StatsResponse {
        ledger,
        tokens,
        join_requests,
        ocr_available: state.ocr.is_available(),
        price,
        payment_window_minutes: state.config.payment_window_minutes,
        generated_at: Utc::now().to_rfc3339(),
    }))
}

/// POST /api/admin/maintenance/sweep - Drop expired requests and unused tokens
pub async fn run_sweep(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    admin: AdminUser,
) -> Result<Json<SweepResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let expired_payments = state.ledger.sweep_expired().await?;
    let expired_tokens = state.tokens.sweep_expired().await?;

    info!(
        admin_id = %admin.id,
        expired_payments,
        expired_tokens,
        "Maintenance sweep finished"
    );

    Ok(Json(SweepResponse {
        expired_payments,
        expired_tokens,
    }))
}
