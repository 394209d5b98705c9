use axum::{
    extract::{Extension, Multipart, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::models::{
    ActivePaymentResponse, CancelResponse, CreatePaymentRequest, HistoryQuery, HistoryResponse,
    InstructionsResponse, PaymentRequestResponse, PaymentStatus, PaymentStatusResponse,
    SubmissionResponse, VerifiedPaymentResponse,
};
use super::services::{ReceiptService, SubmissionOutcome};
use super::validators::validate_amount_matches_price;
use crate::access::validators::validate_user_id;
use crate::common::helpers::format_timestamp;
use crate::common::{ApiError, AppState, Validate, ValidationResult};

/// Upload limit for a receipt screenshot
pub const MAX_RECEIPT_SIZE: usize = 10 * 1024 * 1024;

const DEFAULT_HISTORY_LIMIT: i64 = 10;

// ============================================================================
// Payment Request Handlers
// ============================================================================

/// GET /api/payments/instructions - Where and how much to pay
pub async fn get_instructions(
    Extension(state): Extension<Arc<RwLock<AppState>>>,
) -> Result<impl IntoResponse, ApiError> {
    let app_state = state.read().await;
    let config = &app_state.config;

    let amount = app_state
        .settings_service
        .current_price(config.base_amount)
        .await?;

    Ok(Json(InstructionsResponse {
        receiver_name: config.receiver_name.clone(),
        receiver_account: config.receiver_account.clone(),
        amount,
        brand_fee: config.brand_fee,
        timeout_minutes: config.payment_window_minutes,
        reference_prefix: config.reference_prefix.clone(),
    }))
}

/// POST /api/payments - Open a payment request
pub async fn create_payment_request(
    Extension(state): Extension<Arc<RwLock<AppState>>>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut validation = request.validate();

    let app_state = state.read().await;
    let price = app_state
        .settings_service
        .current_price(app_state.config.base_amount)
        .await?;

    if validation.is_valid {
        validation.check("amount", validate_amount_matches_price(request.amount, price));
    }
    if !validation.is_valid {
        return Err(validation.into());
    }

    let pending = app_state
        .ledger
        .create_request(
            request.requester_id.trim(),
            request.amount,
            request.display_name.trim(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PaymentRequestResponse::new(&pending, &app_state.config)),
    ))
}

/// GET /api/payments/active/:requester_id - Current request and time left
pub async fn get_active_payment(
    Extension(state): Extension<Arc<RwLock<AppState>>>,
    Path(requester_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let app_state = state.read().await;
    let now = Utc::now();

    let pending = app_state
        .ledger
        .get_active_request_at(&requester_id, now)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No active payment request for {}", requester_id))
        })?;

    Ok(Json(ActivePaymentResponse::at(&pending, now)))
}

/// DELETE /api/payments/active/:requester_id - Cancel the current request
pub async fn cancel_active_payment(
    Extension(state): Extension<Arc<RwLock<AppState>>>,
    Path(requester_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let app_state = state.read().await;
    let cancelled = app_state.ledger.cancel_request(&requester_id).await?;

    Ok(Json(CancelResponse {
        cancelled: true,
        reference: cancelled.reference,
    }))
}

/// GET /api/payments/status/:reference - Pending, verified or unknown
pub async fn get_payment_status(
    Extension(state): Extension<Arc<RwLock<AppState>>>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let app_state = state.read().await;
    let now = Utc::now();

    let response = match app_state.ledger.find_by_reference_at(&reference, now).await? {
        PaymentStatus::Pending(pending) => PaymentStatusResponse::Pending {
            payment: ActivePaymentResponse::at(&pending, now),
        },
        PaymentStatus::Verified(payment) => PaymentStatusResponse::Verified {
            payment: VerifiedPaymentResponse::from(&payment),
        },
        PaymentStatus::NotFound => PaymentStatusResponse::NotFound { reference },
    };

    Ok(Json(response))
}

/// GET /api/payments/history/:requester_id - Verified payments, newest first
pub async fn get_history(
    Extension(state): Extension<Arc<RwLock<AppState>>>,
    Path(requester_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let app_state = state.read().await;
    let payments = app_state
        .ledger
        .history(&requester_id, query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await?;

    Ok(Json(HistoryResponse {
        requester_id,
        payments: payments.iter().map(VerifiedPaymentResponse::from).collect(),
    }))
}

// ============================================================================
// Receipt Upload Handler
// ============================================================================

/// POST /api/payments/verify - Multipart `requester_id` + `receipt_image`
///
/// 200 with the verified payment, 422 with the rejection reasons.
pub async fn verify_receipt(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    // OCR can take a while; don't hold the lock across it
    let state = state_lock.read().await.clone();

    let mut requester_id: Option<String> = None;
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("requester_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| ApiError::BadRequest("Failed to read requester_id".to_string()))?;
                requester_id = Some(value.trim().to_string());
            }
            Some("receipt_image") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::BadRequest("Failed to read file data".to_string()))?;
                if data.len() > MAX_RECEIPT_SIZE {
                    return Err(ApiError::BadRequest(
                        "Receipt image exceeds 10MB limit".to_string(),
                    ));
                }
                image = Some(data.to_vec());
            }
            _ => {}
        }
    }

    let mut validation = ValidationResult::new();
    match requester_id.as_deref() {
        Some(id) => validation.check("requester_id", validate_user_id(id)),
        None => validation.add_error("requester_id", "Requester id is required"),
    }
    match image.as_deref() {
        Some(bytes) if !bytes.is_empty() => {}
        _ => validation.add_error("receipt_image", "Receipt image is required"),
    }
    if !validation.is_valid {
        return Err(validation.into());
    }

    let (requester_id, image) = match (requester_id, image) {
        (Some(id), Some(bytes)) => (id, bytes),
        _ => return Err(ApiError::BadRequest("Incomplete upload".to_string())),
    };

    let outcome = ReceiptService::new(&state)
        .submit(&requester_id, &image)
        .await?;

    let receiver_name = state.config.receiver_name.clone();
    let response = match outcome {
        SubmissionOutcome::Verified {
            payment,
            outcome,
            token,
            token_delivered,
        } => {
            info!(
                requester_id = %requester_id,
                reference = %payment.reference,
                token_delivered,
                "Receipt verified"
            );
            (
                StatusCode::OK,
                SubmissionResponse {
                    status: "verified",
                    reference: payment.reference.clone(),
                    expected_amount: payment.amount,
                    receiver_name,
                    outcome,
                    payment: Some(VerifiedPaymentResponse::from(&payment)),
                    token_expires_at: Some(format_timestamp(token.expires_at)),
                    token_delivered,
                },
            )
        }
        SubmissionOutcome::Rejected { pending, outcome } => {
            warn!(
                requester_id = %requester_id,
                reference = %pending.reference,
                "Receipt did not match the payment request"
            );
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                SubmissionResponse {
                    status: "rejected",
                    reference: pending.reference,
                    expected_amount: pending.amount,
                    receiver_name,
                    outcome,
                    payment: None,
                    token_expires_at: None,
                    token_delivered: false,
                },
            )
        }
    };

    Ok((response.0, Json(response.1)))
}
