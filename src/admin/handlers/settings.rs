// src/admin/handlers/settings.rs

use axum::{extract::Extension, Json};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::admin::extractors::AdminUser;
use crate::admin::models::{PriceResponse, SetPriceRequest};
use crate::common::{ApiError, AppState, ValidationResult};
use crate::payments::validators::validate_amount;

/// PUT /api/admin/price - Change the price quoted for new requests
///
/// Requests that are already pending keep the amount they were created with.
pub async fn set_price(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    admin: AdminUser,
    Json(request): Json<SetPriceRequest>,
) -> Result<Json<PriceResponse>, ApiError> {
    let mut validation = ValidationResult::new();
    validation.check("amount", validate_amount(request.amount));
    if !validation.is_valid {
        return Err(validation.into());
    }

    let state = state_lock.read().await.clone();
    state
        .settings_service
        .set_price(request.amount, &admin.id)
        .await?;

    info!(admin_id = %admin.id, amount = request.amount, "Price updated");

    Ok(Json(PriceResponse {
        amount: request.amount,
        updated_by: admin.id,
    }))
}

/// DELETE /api/admin/price - Fall back to the configured base amount
pub async fn reset_price(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    admin: AdminUser,
) -> Result<Json<PriceResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let had_override = state.settings_service.reset_price().await?;
    let amount = state
        .settings_service
        .current_price(state.config.base_amount)
        .await?;

    info!(admin_id = %admin.id, amount, had_override, "Price reset to base amount");

    Ok(Json(PriceResponse {
        amount,
        updated_by: admin.id,
    }))
}
