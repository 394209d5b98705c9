// src/access/tokens.rs
//! Single-use access tokens.
//!
//! One verified payment admits one person: a token is bound to its owner,
//! expires, and flips `used` 0 -> 1 exactly once, only after the chat
//! platform has produced the single-use invite it pays for.
//!
//! A redemption first claims the token (`redeeming_at`), so concurrent
//! redemptions never ask the platform for a second invite. The claim is
//! released when the platform call fails.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::common::helpers::safe_token_log;
use crate::common::id_generator::generate_access_token;
use crate::services::{ChatError, ChatPlatform};

/// A claim older than this is treated as abandoned and may be taken over
const CLAIM_TIMEOUT_SECONDS: i64 = 120;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Access token not recognised")]
    InvalidToken,

    #[error("Access token has expired")]
    Expired,

    #[error("Access token belongs to another user")]
    NotOwner,

    #[error("Access token has already been used")]
    AlreadyUsed,

    #[error("No target chat is configured for invites")]
    GrantUnavailable,

    #[error("Chat platform could not create the invite: {0}")]
    GrantFailed(#[from] ChatError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct AccessToken {
    pub token: String,
    pub owner_id: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub used: i64,
    pub redeemed_at: Option<i64>,
}

impl AccessToken {
    pub fn is_used(&self) -> bool {
        self.used != 0
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

/// Single-use invite produced by a successful redemption
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grant {
    pub invite_link: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TokenStats {
    pub issued: i64,
    pub redeemed: i64,
}

#[derive(Clone)]
pub struct AccessTokenService {
    db: SqlitePool,
    chat: Arc<dyn ChatPlatform>,
    target_chat: Option<String>,
    invite_ttl: Duration,
}

impl AccessTokenService {
    pub fn new(
        db: SqlitePool,
        chat: Arc<dyn ChatPlatform>,
        target_chat: Option<String>,
        invite_ttl_seconds: i64,
    ) -> Self {
        Self {
            db,
            chat,
            target_chat,
            invite_ttl: Duration::seconds(invite_ttl_seconds),
        }
    }

    pub async fn issue(&self, owner_id: &str, ttl: Duration) -> Result<IssuedToken, TokenError> {
        self.issue_at(owner_id, ttl, Utc::now()).await
    }

    /// Several live tokens per owner are allowed; each is independently single-use.
    pub async fn issue_at(
        &self,
        owner_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let issued = IssuedToken {
            token: generate_access_token(),
            expires_at: (now + ttl).timestamp(),
        };

        sqlx::query(
            "INSERT INTO access_tokens (token, owner_id, created_at, expires_at, used) VALUES (?, ?, ?, ?, 0)",
        )
        .bind(&issued.token)
        .bind(owner_id)
        .bind(now.timestamp())
        .bind(issued.expires_at)
        .execute(&self.db)
        .await?;

        info!(
            owner_id = %owner_id,
            token = %safe_token_log(&issued.token),
            expires_at = issued.expires_at,
            "Access token issued"
        );
        Ok(issued)
    }

    pub async fn redeem(&self, token: &str, requesting_user_id: &str) -> Result<Grant, TokenError> {
        self.redeem_at(token, requesting_user_id, Utc::now()).await
    }

    /// Checks run in a fixed order: unknown, expired, wrong owner, used.
    /// The token is claimed, then the invite is created, and only then is it
    /// marked used, so a chat outage leaves it redeemable. A redemption that
    /// finds the token already claimed reports it as used.
    pub async fn redeem_at(
        &self,
        token: &str,
        requesting_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Grant, TokenError> {
        let token = token.trim().to_uppercase();
        let masked = safe_token_log(&token);

        let record = sqlx::query_as::<_, AccessToken>(
            "SELECT token, owner_id, created_at, expires_at, used, redeemed_at FROM access_tokens WHERE token = ?",
        )
        .bind(&token)
        .fetch_optional(&self.db)
        .await?
        .ok_or(TokenError::InvalidToken)?;

        if record.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        if record.owner_id != requesting_user_id {
            warn!(
                token = %masked,
                owner_id = %record.owner_id,
                requesting_user_id = %requesting_user_id,
                "Access token presented by a different user"
            );
            return Err(TokenError::NotOwner);
        }
        if record.is_used() {
            warn!(token = %masked, owner_id = %record.owner_id, "Access token reuse attempt");
            return Err(TokenError::AlreadyUsed);
        }

        let chat_id = self
            .target_chat
            .as_deref()
            .ok_or(TokenError::GrantUnavailable)?;

        if !self.claim(&token, now).await? {
            warn!(
                token = %masked,
                owner_id = %record.owner_id,
                "Access token is already being redeemed"
            );
            return Err(TokenError::AlreadyUsed);
        }

        let invite_expires_at = now + self.invite_ttl;
        let invite_link = match self
            .chat
            .create_single_use_invite(chat_id, invite_expires_at)
            .await
        {
            Ok(link) => link,
            Err(e) => {
                error!(token = %masked, error = %e, "Invite creation failed, token left unused");
                self.release(&token).await?;
                return Err(TokenError::GrantFailed(e));
            }
        };

        let updated = sqlx::query(
            "UPDATE access_tokens SET used = 1, redeemed_at = ?, redeeming_at = NULL WHERE token = ? AND used = 0",
        )
        .bind(now.timestamp())
        .bind(&token)
        .execute(&self.db)
        .await?;

        if updated.rows_affected() == 0 {
            error!(
                token = %masked,
                owner_id = %record.owner_id,
                "Claimed access token was marked used elsewhere"
            );
            return Err(TokenError::AlreadyUsed);
        }

        info!(token = %masked, owner_id = %record.owner_id, "Access token redeemed");
        Ok(Grant {
            invite_link,
            expires_at: invite_expires_at.timestamp(),
        })
    }

    /// Takes the redemption claim; false when another redemption holds it.
    async fn claim(&self, token: &str, now: DateTime<Utc>) -> Result<bool, TokenError> {
        let claimed = sqlx::query(
            "UPDATE access_tokens SET redeeming_at = ? WHERE token = ? AND used = 0 AND (redeeming_at IS NULL OR redeeming_at < ?)",
        )
        .bind(now.timestamp())
        .bind(token)
        .bind(now.timestamp() - CLAIM_TIMEOUT_SECONDS)
        .execute(&self.db)
        .await?;

        Ok(claimed.rows_affected() == 1)
    }

    async fn release(&self, token: &str) -> Result<(), TokenError> {
        sqlx::query("UPDATE access_tokens SET redeeming_at = NULL WHERE token = ? AND used = 0")
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn sweep_expired(&self) -> Result<u64, TokenError> {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Deletes expired tokens that were never used; redeemed ones are kept.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<u64, TokenError> {
        let removed = sqlx::query("DELETE FROM access_tokens WHERE used = 0 AND expires_at < ?")
            .bind(now.timestamp())
            .execute(&self.db)
            .await?
            .rows_affected();

        if removed > 0 {
            info!(removed, "Expired access tokens swept");
        }
        Ok(removed)
    }

    pub async fn has_redeemed(&self, owner_id: &str) -> Result<bool, TokenError> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM access_tokens WHERE owner_id = ? AND used = 1 LIMIT 1")
                .bind(owner_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(found.is_some())
    }

    pub async fn stats(&self) -> Result<TokenStats, TokenError> {
        let stats = sqlx::query_as::<_, TokenStats>(
            "SELECT COUNT(*) AS issued, COALESCE(SUM(used), 0) AS redeemed FROM access_tokens",
        )
        .fetch_one(&self.db)
        .await?;
        Ok(stats)
    }
}
