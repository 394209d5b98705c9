// src/access/gate.rs
//! Join-request gate for the paid chat.
//!
//! Members who redeemed a token (or were pre-approved) are let in
//! automatically; everyone else is parked as `pending` for an admin.
//! A record only moves to a decided state after the platform call succeeded.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::join_records::{JoinRecord, JoinRecordStore, JoinStats, JoinStatus};
use super::tokens::{AccessTokenService, TokenError};
use crate::services::{ChatError, ChatPlatform};

/// `decided_by` value for automatic decisions
pub const SYSTEM_DECIDER: &str = "system";

const JOIN_INSTRUCTIONS: &str = "Your request to join is waiting for approval. Complete a payment and redeem your access token to be admitted.";

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("No target chat is configured")]
    NotConfigured,

    #[error("Chat platform request failed: {0}")]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct MembershipGate {
    records: JoinRecordStore,
    tokens: AccessTokenService,
    chat: Arc<dyn ChatPlatform>,
    target_chat: Option<String>,
}

impl MembershipGate {
    pub fn new(
        records: JoinRecordStore,
        tokens: AccessTokenService,
        chat: Arc<dyn ChatPlatform>,
        target_chat: Option<String>,
    ) -> Self {
        Self {
            records,
            tokens,
            chat,
            target_chat,
        }
    }

    fn chat_id(&self) -> Result<&str, GateError> {
        self.target_chat.as_deref().ok_or(GateError::NotConfigured)
    }

    /// Marks a member as entitled to join (called after a redemption).
    pub async fn pre_approve(&self, member_id: &str) -> Result<JoinRecord, GateError> {
        self.pre_approve_at(member_id, Utc::now()).await
    }

    pub async fn pre_approve_at(
        &self,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> Result<JoinRecord, GateError> {
        if let Some(existing) = self.records.get(member_id).await? {
            if existing.status == JoinStatus::Approved {
                return Ok(existing);
            }
        }

        let record = self
            .records
            .upsert(member_id, JoinStatus::PreApproved, Some(SYSTEM_DECIDER), now)
            .await?;
        info!(member_id = %member_id, "Member pre-approved");
        Ok(record)
    }

    pub async fn handle_join_request(&self, member_id: &str) -> Result<JoinRecord, GateError> {
        self.handle_join_request_at(member_id, Utc::now()).await
    }

    pub async fn handle_join_request_at(
        &self,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> Result<JoinRecord, GateError> {
        let chat_id = self.chat_id()?;

        let existing = self.records.get(member_id).await?;
        let entitled = match existing.as_ref().map(|r| r.status) {
            Some(JoinStatus::PreApproved) | Some(JoinStatus::Approved) => true,
            _ => self.tokens.has_redeemed(member_id).await?,
        };

        if entitled {
            self.chat.approve_join_request(chat_id, member_id).await?;
            let record = self
                .records
                .upsert(member_id, JoinStatus::Approved, Some(SYSTEM_DECIDER), now)
                .await?;
            info!(member_id = %member_id, "Join request approved automatically");
            return Ok(record);
        }

        let record = self
            .records
            .upsert(member_id, JoinStatus::Pending, None, now)
            .await?;
        info!(member_id = %member_id, "Join request parked for review");

        if let Err(e) = self.chat.send_message(member_id, JOIN_INSTRUCTIONS).await {
            warn!(member_id = %member_id, error = %e, "Could not send join instructions");
        }

        Ok(record)
    }

    /// Admin decision on a join request
    pub async fn decide(
        &self,
        member_id: &str,
        approve: bool,
        admin_id: &str,
    ) -> Result<JoinRecord, GateError> {
        self.decide_at(member_id, approve, admin_id, Utc::now()).await
    }

    pub async fn decide_at(
        &self,
        member_id: &str,
        approve: bool,
        admin_id: &str,
        now: DateTime<Utc>,
    ) -> Result<JoinRecord, GateError> {
        let chat_id = self.chat_id()?;

        let status = if approve {
            self.chat.approve_join_request(chat_id, member_id).await?;
            JoinStatus::Approved
        } else {
            self.chat.decline_join_request(chat_id, member_id).await?;
            JoinStatus::Declined
        };

        let record = self
            .records
            .upsert(member_id, status, Some(admin_id), now)
            .await?;
        info!(member_id = %member_id, admin_id = %admin_id, status = %status, "Join request decided");
        Ok(record)
    }

    pub async fn list(
        &self,
        status: Option<JoinStatus>,
        limit: i64,
    ) -> Result<Vec<JoinRecord>, GateError> {
        Ok(self.records.list(status, limit).await?)
    }

    pub async fn stats(&self) -> Result<JoinStats, GateError> {
        Ok(self.records.stats().await?)
    }
}
