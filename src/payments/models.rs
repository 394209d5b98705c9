use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::common::config::AppConfig;
use crate::common::helpers::format_timestamp;
use crate::verification::VerificationOutcome;

// ============================================================================
// Stored records
// ============================================================================

/// An outstanding payment request. At most one per requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PendingPayment {
    pub reference: String,
    pub requester_id: String,
    pub amount: i64,
    pub created_at: i64, // unix seconds
    pub expires_at: i64, // unix seconds
    pub display_name: String,
}

impl PendingPayment {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.expires_at
    }

    pub fn seconds_left_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now.timestamp()).max(0)
    }
}

/// Append-only record of a successfully verified payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct VerifiedPayment {
    pub reference: String,
    pub requester_id: String,
    pub amount: i64,
    pub verified_at: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentStatus {
    Pending(PendingPayment),
    Verified(VerifiedPayment),
    NotFound,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LedgerStats {
    pub pending_payments: i64,
    pub verified_payments: i64,
    pub total_verified_amount: i64,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub requester_id: String,
    pub display_name: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct InstructionsResponse {
    pub receiver_name: String,
    pub receiver_account: String,
    pub amount: i64,
    pub brand_fee: i64,
    pub timeout_minutes: i64,
    pub reference_prefix: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentRequestResponse {
    pub reference: String,
    pub amount: i64,
    pub receiver_name: String,
    pub receiver_account: String,
    pub created_at: String,
    pub expires_at: String,
    pub timeout_minutes: i64,
}

impl PaymentRequestResponse {
    pub fn new(pending: &PendingPayment, config: &AppConfig) -> Self {
        Self {
            reference: pending.reference.clone(),
            amount: pending.amount,
            receiver_name: config.receiver_name.clone(),
            receiver_account: config.receiver_account.clone(),
            created_at: format_timestamp(pending.created_at),
            expires_at: format_timestamp(pending.expires_at),
            timeout_minutes: config.payment_window_minutes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActivePaymentResponse {
    pub reference: String,
    pub amount: i64,
    pub display_name: String,
    pub created_at: String,
    pub expires_at: String,
    pub time_left_seconds: i64,
}

impl ActivePaymentResponse {
    pub fn at(pending: &PendingPayment, now: DateTime<Utc>) -> Self {
        Self {
            reference: pending.reference.clone(),
            amount: pending.amount,
            display_name: pending.display_name.clone(),
            created_at: format_timestamp(pending.created_at),
            expires_at: format_timestamp(pending.expires_at),
            time_left_seconds: pending.seconds_left_at(now),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifiedPaymentResponse {
    pub reference: String,
    pub amount: i64,
    pub display_name: String,
    pub verified_at: String,
}

impl From<&VerifiedPayment> for VerifiedPaymentResponse {
    fn from(payment: &VerifiedPayment) -> Self {
        Self {
            reference: payment.reference.clone(),
            amount: payment.amount,
            display_name: payment.display_name.clone(),
            verified_at: format_timestamp(payment.verified_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentStatusResponse {
    Pending { payment: ActivePaymentResponse },
    Verified { payment: VerifiedPaymentResponse },
    NotFound { reference: String },
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub requester_id: String,
    pub payments: Vec<VerifiedPaymentResponse>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
    pub reference: String,
}

/// Receipt upload outcome; sent with 200 when verified, 422 when rejected
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub status: &'static str,
    pub reference: String,
    pub expected_amount: i64,
    pub receiver_name: String,
    #[serde(flatten)]
    pub outcome: VerificationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<VerifiedPaymentResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<String>,
    pub token_delivered: bool,
}
