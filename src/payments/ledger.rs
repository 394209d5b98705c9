// src/payments/ledger.rs
//! Payment lifecycle: NONE -> PENDING -> {VERIFIED | EXPIRED/CANCELLED} -> NONE.
//!
//! Exclusive owner of `pending_payments` and `verified_payments`. Per-requester
//! serialization comes from the unique index on `pending_payments.requester_id`
//! and from doing every transition inside one transaction. Expiry is a
//! predicate evaluated at decision time; there are no timers.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::models::{LedgerStats, PaymentStatus, PendingPayment, VerifiedPayment};
use crate::common::id_generator::generate_reference;

/// Fresh references tried before giving up with a retryable error
const MAX_REFERENCE_ATTEMPTS: usize = 3;
pub const MAX_HISTORY_LIMIT: i64 = 50;

const PENDING_COLUMNS: &str =
    "reference, requester_id, amount, created_at, expires_at, display_name";
const VERIFIED_COLUMNS: &str = "reference, requester_id, amount, verified_at, display_name";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Requester {requester_id} already has pending payment {reference}")]
    Conflict {
        requester_id: String,
        reference: String,
    },

    #[error("Payment {0} has already been verified")]
    AlreadyVerified(String),

    #[error("Payment request {0} has expired or no longer exists")]
    Expired(String),

    #[error("No pending payment for requester {0}")]
    NotFound(String),

    #[error("Could not allocate a unique payment reference, please retry")]
    ReferenceCollision,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of one insert attempt
enum InsertAttempt {
    Created(PendingPayment),
    ReferenceTaken,
}

/// Produces a candidate reference from the configured prefix
pub type ReferenceGenerator = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone)]
pub struct PaymentLedger {
    db: SqlitePool,
    window: Duration,
    reference_prefix: String,
    next_reference: ReferenceGenerator,
}

impl fmt::Debug for PaymentLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentLedger")
            .field("window", &self.window)
            .field("reference_prefix", &self.reference_prefix)
            .finish_non_exhaustive()
    }
}

impl PaymentLedger {
    pub fn new(db: SqlitePool, window_minutes: i64, reference_prefix: impl Into<String>) -> Self {
        Self {
            db,
            window: Duration::minutes(window_minutes),
            reference_prefix: reference_prefix.into(),
            next_reference: Arc::new(generate_reference),
        }
    }

    /// Replaces the random reference source.
    pub fn with_reference_generator(
        mut self,
        generator: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.next_reference = Arc::new(generator);
        self
    }

    // ============================================================================
    // Requests
    // ============================================================================

    pub async fn create_request(
        &self,
        requester_id: &str,
        amount: i64,
        display_name: &str,
    ) -> Result<PendingPayment, LedgerError> {
        self.create_request_at(requester_id, amount, display_name, Utc::now())
            .await
    }

    /// Sweeps, then opens a pending request valid for the configured window.
    pub async fn create_request_at(
        &self,
        requester_id: &str,
        amount: i64,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<PendingPayment, LedgerError> {
        self.sweep_expired_at(now).await?;

        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let reference = (self.next_reference)(&self.reference_prefix);
            match self
                .try_insert(&reference, requester_id, amount, display_name, now)
                .await?
            {
                InsertAttempt::Created(pending) => {
                    info!(
                        reference = %pending.reference,
                        requester_id = %requester_id,
                        amount,
                        expires_at = pending.expires_at,
                        "Payment request created"
                    );
                    return Ok(pending);
                }
                InsertAttempt::ReferenceTaken => {
                    warn!(reference = %reference, attempt, "Payment reference collision, regenerating");
                }
            }
        }

        error!(requester_id = %requester_id, "Exhausted payment reference attempts");
        Err(LedgerError::ReferenceCollision)
    }

    /// The INSERT must stay the transaction's first statement: a transaction
    /// that reads first cannot upgrade to a write lock under contention and
    /// fails with SQLITE_BUSY.
    async fn try_insert(
        &self,
        reference: &str,
        requester_id: &str,
        amount: i64,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<InsertAttempt, LedgerError> {
        let mut tx = self.db.begin().await?;

        let pending = PendingPayment {
            reference: reference.to_string(),
            requester_id: requester_id.to_string(),
            amount,
            created_at: now.timestamp(),
            expires_at: (now + self.window).timestamp(),
            display_name: display_name.to_string(),
        };

        let inserted = sqlx::query(&format!(
            "INSERT INTO pending_payments ({}) VALUES (?, ?, ?, ?, ?, ?)",
            PENDING_COLUMNS
        ))
        .bind(&pending.reference)
        .bind(&pending.requester_id)
        .bind(pending.amount)
        .bind(pending.created_at)
        .bind(pending.expires_at)
        .bind(&pending.display_name)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e, "pending_payments.requester_id") => {
                // Lost a race with a concurrent request for the same requester
                let (existing,): (String,) =
                    sqlx::query_as("SELECT reference FROM pending_payments WHERE requester_id = ?")
                        .bind(requester_id)
                        .fetch_one(&mut *tx)
                        .await?;
                return Err(LedgerError::Conflict {
                    requester_id: requester_id.to_string(),
                    reference: existing,
                });
            }
            Err(e) if is_unique_violation(&e, "pending_payments.reference") => {
                return Ok(InsertAttempt::ReferenceTaken);
            }
            Err(e) => return Err(e.into()),
        }

        // References stay unique across both tables; dropping `tx` rolls back.
        let already_verified: Option<(String,)> =
            sqlx::query_as("SELECT reference FROM verified_payments WHERE reference = ?")
                .bind(reference)
                .fetch_optional(&mut *tx)
                .await?;
        if already_verified.is_some() {
            return Ok(InsertAttempt::ReferenceTaken);
        }

        tx.commit().await?;
        Ok(InsertAttempt::Created(pending))
    }

    pub async fn get_active_request(
        &self,
        requester_id: &str,
    ) -> Result<Option<PendingPayment>, LedgerError> {
        self.get_active_request_at(requester_id, Utc::now()).await
    }

    pub async fn get_active_request_at(
        &self,
        requester_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingPayment>, LedgerError> {
        self.sweep_expired_at(now).await?;

        let pending = sqlx::query_as::<_, PendingPayment>(&format!(
            "SELECT {} FROM pending_payments WHERE requester_id = ?",
            PENDING_COLUMNS
        ))
        .bind(requester_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(pending.filter(|p| !p.is_expired_at(now)))
    }

    /// Removes the requester's pending request, if any.
    pub async fn cancel_request(&self, requester_id: &str) -> Result<PendingPayment, LedgerError> {
        let cancelled = sqlx::query_as::<_, PendingPayment>(&format!(
            "DELETE FROM pending_payments WHERE requester_id = ? RETURNING {}",
            PENDING_COLUMNS
        ))
        .bind(requester_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| LedgerError::NotFound(requester_id.to_string()))?;

        info!(
            reference = %cancelled.reference,
            requester_id = %requester_id,
            "Payment request cancelled"
        );
        Ok(cancelled)
    }

    // ============================================================================
    // Expiry
    // ============================================================================

    pub async fn sweep_expired(&self) -> Result<u64, LedgerError> {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Deletes every pending row with `expires_at < now`. Idempotent.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let removed = sqlx::query("DELETE FROM pending_payments WHERE expires_at < ?")
            .bind(now.timestamp())
            .execute(&self.db)
            .await?
            .rows_affected();

        if removed > 0 {
            info!(removed, "Expired payment requests swept");
        }
        Ok(removed)
    }

    // ============================================================================
    // Verification
    // ============================================================================

    pub async fn mark_verified(&self, reference: &str) -> Result<VerifiedPayment, LedgerError> {
        self.mark_verified_at(reference, Utc::now()).await
    }

    /// Converts an unexpired pending row into a verified one, atomically.
    ///
    /// A reference is verified at most once: the pending row is deleted and
    /// the verified row inserted in the same transaction, and the verified
    /// table's primary key rejects a second insert.
    pub async fn mark_verified_at(
        &self,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedPayment, LedgerError> {
        let mut tx = self.db.begin().await?;

        let pending = sqlx::query_as::<_, PendingPayment>(&format!(
            "DELETE FROM pending_payments WHERE reference = ? AND expires_at >= ? RETURNING {}",
            PENDING_COLUMNS
        ))
        .bind(reference)
        .bind(now.timestamp())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(pending) = pending else {
            let verified: Option<(String,)> =
                sqlx::query_as("SELECT reference FROM verified_payments WHERE reference = ?")
                    .bind(reference)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(if verified.is_some() {
                warn!(reference = %reference, "Attempt to verify an already verified payment");
                LedgerError::AlreadyVerified(reference.to_string())
            } else {
                info!(reference = %reference, "Verification attempted on expired or missing request");
                LedgerError::Expired(reference.to_string())
            });
        };

        let verified = VerifiedPayment {
            reference: pending.reference,
            requester_id: pending.requester_id,
            amount: pending.amount,
            verified_at: now.timestamp(),
            display_name: pending.display_name,
        };

        let inserted = sqlx::query(&format!(
            "INSERT INTO verified_payments ({}) VALUES (?, ?, ?, ?, ?)",
            VERIFIED_COLUMNS
        ))
        .bind(&verified.reference)
        .bind(&verified.requester_id)
        .bind(verified.amount)
        .bind(verified.verified_at)
        .bind(&verified.display_name)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e, "verified_payments.reference") => {
                error!(
                    reference = %reference,
                    "Pending payment coexisted with a verified one; rolling back"
                );
                return Err(LedgerError::AlreadyVerified(reference.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;

        info!(
            reference = %verified.reference,
            requester_id = %verified.requester_id,
            amount = verified.amount,
            "Payment verified"
        );
        Ok(verified)
    }

    // ============================================================================
    // Queries
    // ============================================================================

    pub async fn find_by_reference(&self, reference: &str) -> Result<PaymentStatus, LedgerError> {
        self.find_by_reference_at(reference, Utc::now()).await
    }

    pub async fn find_by_reference_at(
        &self,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatus, LedgerError> {
        self.sweep_expired_at(now).await?;

        let pending = sqlx::query_as::<_, PendingPayment>(&format!(
            "SELECT {} FROM pending_payments WHERE reference = ?",
            PENDING_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.db)
        .await?;
        if let Some(pending) = pending.filter(|p| !p.is_expired_at(now)) {
            return Ok(PaymentStatus::Pending(pending));
        }

        let verified = sqlx::query_as::<_, VerifiedPayment>(&format!(
            "SELECT {} FROM verified_payments WHERE reference = ?",
            VERIFIED_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.db)
        .await?;

        Ok(verified.map_or(PaymentStatus::NotFound, PaymentStatus::Verified))
    }

    /// Verified payments for a requester, newest first; `limit` is clamped to 1..=50.
    pub async fn history(
        &self,
        requester_id: &str,
        limit: i64,
    ) -> Result<Vec<VerifiedPayment>, LedgerError> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);

        let payments = sqlx::query_as::<_, VerifiedPayment>(&format!(
            "SELECT {} FROM verified_payments WHERE requester_id = ? ORDER BY verified_at DESC, rowid DESC LIMIT ?",
            VERIFIED_COLUMNS
        ))
        .bind(requester_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(payments)
    }

    pub async fn has_verified_payment(&self, requester_id: &str) -> Result<bool, LedgerError> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM verified_payments WHERE requester_id = ? LIMIT 1")
                .bind(requester_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(found.is_some())
    }

    pub async fn stats(&self) -> Result<LedgerStats, LedgerError> {
        let stats = sqlx::query_as::<_, LedgerStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM pending_payments) AS pending_payments,
                (SELECT COUNT(*) FROM verified_payments) AS verified_payments,
                (SELECT COALESCE(SUM(amount), 0) FROM verified_payments) AS total_verified_amount
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(stats)
    }
}

/// SQLite reports constraint failures as "UNIQUE constraint failed: table.column"
fn is_unique_violation(e: &sqlx::Error, column: &str) -> bool {
    e.as_database_error()
        .map(|db| {
            let message = db.message();
            message.contains("UNIQUE constraint failed") && message.contains(column)
        })
        .unwrap_or(false)
}
