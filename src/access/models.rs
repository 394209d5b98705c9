use serde::{Deserialize, Serialize};

use super::join_records::{JoinRecord, JoinStatus};
use super::tokens::Grant;
use crate::common::helpers::format_timestamp;

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub token: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReissueRequest {
    pub owner_id: String,
}

/// A join request that arrived on the chat platform
#[derive(Debug, Deserialize)]
pub struct JoinRequestPayload {
    pub member_id: String,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub invite_link: String,
    pub expires_at: String,
}

impl From<Grant> for GrantResponse {
    fn from(grant: Grant) -> Self {
        Self {
            invite_link: grant.invite_link,
            expires_at: format_timestamp(grant.expires_at),
        }
    }
}

/// The token itself only travels by direct message
#[derive(Debug, Serialize)]
pub struct ReissueResponse {
    pub owner_id: String,
    pub token_expires_at: String,
    pub token_delivered: bool,
}

#[derive(Debug, Serialize)]
pub struct JoinRecordResponse {
    pub member_id: String,
    pub status: JoinStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<String>,
    pub updated_at: String,
}

impl From<JoinRecord> for JoinRecordResponse {
    fn from(record: JoinRecord) -> Self {
        Self {
            member_id: record.member_id,
            status: record.status,
            decided_by: record.decided_by,
            decided_at: record.decided_at.map(format_timestamp),
            updated_at: format_timestamp(record.updated_at),
        }
    }
}
