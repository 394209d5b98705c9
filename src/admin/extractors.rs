//! Admin authentication extractor for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::common::helpers::constant_time_eq;
use crate::common::{ApiError, AppState};

/// The operator, authenticated by `Authorization: Bearer <ADMIN_API_KEY>`.
///
/// `id` is the configured admin chat id; it is recorded as `decided_by` and
/// `updated_by` on everything the admin changes.
#[derive(Debug)]
pub struct AdminUser {
    pub id: String,
}

/// Checks an `Authorization` header value against the configured key.
/// Accepts `Bearer <key>` or the bare key.
pub fn authorize(header: Option<&str>, api_key: &str) -> Result<(), ApiError> {
    let Some(header) = header else {
        warn!("Admin authentication failed: missing Authorization header");
        return Err(ApiError::Unauthorized("missing auth".into()));
    };

    let presented = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    if api_key.is_empty() || !constant_time_eq(presented.as_bytes(), api_key.as_bytes()) {
        warn!("Admin authentication failed: invalid API key");
        return Err(ApiError::Unauthorized("invalid admin key".into()));
    }

    Ok(())
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let config = state_lock.read().await.config.clone();

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());
        authorize(header, &config.admin_api_key)?;

        debug!(admin_id = %config.admin_id, "Admin authenticated via extractor");
        Ok(AdminUser {
            id: config.admin_id.clone(),
        })
    }
}
