// src/admin/handlers/join_requests.rs

use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::access::join_records::JoinStatus;
use crate::access::models::JoinRecordResponse;
use crate::access::validators::validate_user_id;
use crate::admin::extractors::AdminUser;
use crate::admin::models::JoinRequestsQuery;
use crate::common::{ApiError, AppState};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

/// GET /api/admin/join-requests?status=&limit= - Join records, newest first
pub async fn list_join_requests(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    _admin: AdminUser,
    Query(query): Query<JoinRequestsQuery>,
) -> Result<Json<Vec<JoinRecordResponse>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<JoinStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let state = state_lock.read().await.clone();
    let records = state.gate.list(status, limit).await?;

    Ok(Json(records.into_iter().map(JoinRecordResponse::from).collect()))
}

/// POST /api/admin/join-requests/:member_id/approve
pub async fn approve_join_request(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    admin: AdminUser,
    Path(member_id): Path<String>,
) -> Result<Json<JoinRecordResponse>, ApiError> {
    decide(state_lock, admin, member_id, true).await
}

/// POST /api/admin/join-requests/:member_id/decline
pub async fn decline_join_request(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    admin: AdminUser,
    Path(member_id): Path<String>,
) -> Result<Json<JoinRecordResponse>, ApiError> {
    decide(state_lock, admin, member_id, false).await
}

async fn decide(
    state_lock: Arc<RwLock<AppState>>,
    admin: AdminUser,
    member_id: String,
    approve: bool,
) -> Result<Json<JoinRecordResponse>, ApiError> {
    validate_user_id(&member_id).map_err(ApiError::ValidationError)?;

    let state = state_lock.read().await.clone();
    let record = state.gate.decide(&member_id, approve, &admin.id).await?;

    Ok(Json(JoinRecordResponse::from(record)))
}
