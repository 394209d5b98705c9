// src/admin/models.rs

use serde::{Deserialize, Serialize};

use crate::access::join_records::JoinStats;
use crate::access::tokens::TokenStats;
use crate::payments::models::LedgerStats;

// Stats models
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub ledger: LedgerStats,
    pub tokens: TokenStats,
    pub join_requests: JoinStats,
    pub ocr_available: bool,
    pub price: i64,
    pub payment_window_minutes: i64,
    pub generated_at: String,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired_payments: u64,
    pub expired_tokens: u64,
}

// Price models
#[derive(Debug, Deserialize)]
pub struct SetPriceRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct PriceResponse {
    pub amount: i64,
    pub updated_by: String,
}

// Join request models
#[derive(Debug, Deserialize)]
pub struct JoinRequestsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}
