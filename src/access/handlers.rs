use axum::{extract::Extension, response::IntoResponse, Json};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::models::{
    GrantResponse, JoinRecordResponse, JoinRequestPayload, RedeemRequest, ReissueRequest,
    ReissueResponse,
};
use crate::common::helpers::{format_timestamp, safe_token_log};
use crate::common::{ApiError, AppState, Validate};
use crate::payments::services::ReceiptService;

/// POST /api/access/redeem - Exchange a token for a single-use invite
pub async fn redeem_token(
    Extension(state): Extension<Arc<RwLock<AppState>>>,
    Json(request): Json<RedeemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let validation = request.validate();
    if !validation.is_valid {
        return Err(validation.into());
    }

    let app_state = state.read().await;
    let user_id = request.user_id.trim();

    let grant = app_state.tokens.redeem(&request.token, user_id).await?;

    // The invite is already paid for; a failed pre-approval only means the
    // join request will be checked against the redeemed token instead.
    if let Err(e) = app_state.gate.pre_approve(user_id).await {
        warn!(user_id = %user_id, error = %e, "Pre-approval after redemption failed");
    }

    info!(
        user_id = %user_id,
        token = %safe_token_log(&request.token.trim().to_uppercase()),
        "Invite granted"
    );
    Ok(Json(GrantResponse::from(grant)))
}

/// POST /api/access/tokens - Issue a fresh token to a verified payer
pub async fn reissue_token(
    Extension(state): Extension<Arc<RwLock<AppState>>>,
    Json(request): Json<ReissueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let validation = request.validate();
    if !validation.is_valid {
        return Err(validation.into());
    }

    let app_state = state.read().await;
    let owner_id = request.owner_id.trim();

    let (token, delivered) = ReceiptService::new(&app_state)
        .reissue_token(owner_id)
        .await?;

    Ok(Json(ReissueResponse {
        owner_id: owner_id.to_string(),
        token_expires_at: format_timestamp(token.expires_at),
        token_delivered: delivered,
    }))
}

/// POST /api/access/join-requests - A member asked to join the paid chat
pub async fn join_request(
    Extension(state): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<JoinRequestPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let validation = payload.validate();
    if !validation.is_valid {
        return Err(validation.into());
    }

    let app_state = state.read().await;
    let record = app_state
        .gate
        .handle_join_request(payload.member_id.trim())
        .await?;

    Ok(Json(JoinRecordResponse::from(record)))
}
