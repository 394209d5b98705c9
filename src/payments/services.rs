// src/payments/services.rs
//! Receipt submission: pending request -> image sniffing -> OCR -> verify ->
//! ledger transition -> access token.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::ledger::{LedgerError, PaymentLedger};
use super::models::{PendingPayment, VerifiedPayment};
use crate::access::tokens::{AccessTokenService, IssuedToken, TokenError};
use crate::common::AppState;
use crate::services::ocr::{read_receipt, sniff_image_type, OcrEngine};
use crate::services::ChatPlatform;
use crate::verification::{ReceiptVerifier, VerificationOutcome};

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("No active payment request for {0}; create one first")]
    NoPendingRequest(String),

    #[error("No verified payment on record for {0}")]
    NotVerified(String),

    #[error("Upload is not a supported image (JPEG, PNG, GIF, BMP, WebP or ICO)")]
    UnsupportedImage,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

#[derive(Debug)]
pub enum SubmissionOutcome {
    Verified {
        payment: VerifiedPayment,
        outcome: VerificationOutcome,
        token: IssuedToken,
        token_delivered: bool,
    },
    Rejected {
        pending: PendingPayment,
        outcome: VerificationOutcome,
    },
}

pub struct ReceiptService {
    ledger: PaymentLedger,
    verifier: Arc<ReceiptVerifier>,
    ocr: Arc<dyn OcrEngine>,
    tokens: AccessTokenService,
    chat: Arc<dyn ChatPlatform>,
    receiver_name: String,
    admin_id: String,
    ocr_timeout: std::time::Duration,
    token_ttl: Duration,
}

impl ReceiptService {
    pub fn new(state: &AppState) -> Self {
        Self {
            ledger: state.ledger.clone(),
            verifier: state.verifier.clone(),
            ocr: state.ocr.clone(),
            tokens: state.tokens.clone(),
            chat: state.chat.clone(),
            receiver_name: state.config.receiver_name.clone(),
            admin_id: state.config.admin_id.clone(),
            ocr_timeout: state.config.ocr_timeout,
            token_ttl: Duration::minutes(state.config.token_ttl_minutes),
        }
    }

    pub async fn submit(
        &self,
        requester_id: &str,
        image: &[u8],
    ) -> Result<SubmissionOutcome, SubmissionError> {
        self.submit_at(requester_id, image, Utc::now()).await
    }

    /// `now` is the arrival time; the ledger decision uses arrival time plus
    /// the time spent in OCR, so a slow OCR run cannot outlive the window.
    pub async fn submit_at(
        &self,
        requester_id: &str,
        image: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let started = Instant::now();

        let pending = self
            .ledger
            .get_active_request_at(requester_id, now)
            .await?
            .ok_or_else(|| SubmissionError::NoPendingRequest(requester_id.to_string()))?;

        let image_type = sniff_image_type(image).ok_or(SubmissionError::UnsupportedImage)?;
        info!(
            reference = %pending.reference,
            image_type,
            bytes = image.len(),
            "Receipt received"
        );

        let text = read_receipt(self.ocr.as_ref(), image, self.ocr_timeout).await;
        let outcome = self.verifier.verify(
            text.as_deref(),
            pending.amount as f64,
            &pending.reference,
            &self.receiver_name,
        );

        if !outcome.accepted {
            info!(
                reference = %pending.reference,
                reasons = ?outcome.reason_messages(),
                detected_amount = ?outcome.detected_amount,
                "Receipt rejected"
            );
            return Ok(SubmissionOutcome::Rejected { pending, outcome });
        }

        let decided_at =
            now + Duration::from_std(started.elapsed()).unwrap_or_else(|_| Duration::zero());
        let payment = self
            .ledger
            .mark_verified_at(&pending.reference, decided_at)
            .await?;

        let token = self
            .tokens
            .issue_at(&payment.requester_id, self.token_ttl, decided_at)
            .await
            .map_err(|e| {
                error!(
                    reference = %payment.reference,
                    error = %e,
                    "Payment verified but token issuance failed"
                );
                e
            })?;

        let token_delivered = self.deliver_token(&payment.requester_id, &token).await;
        self.notify_admin(&payment).await;

        Ok(SubmissionOutcome::Verified {
            payment,
            outcome,
            token,
            token_delivered,
        })
    }

    /// Issues a fresh token for a requester who has a verified payment
    /// (e.g. the first one expired before it was redeemed).
    pub async fn reissue_token(
        &self,
        owner_id: &str,
    ) -> Result<(IssuedToken, bool), SubmissionError> {
        if !self.ledger.has_verified_payment(owner_id).await? {
            warn!(owner_id = %owner_id, "Token reissue requested without a verified payment");
            return Err(SubmissionError::NotVerified(owner_id.to_string()));
        }

        let token = self.tokens.issue(owner_id, self.token_ttl).await?;
        let delivered = self.deliver_token(owner_id, &token).await;
        Ok((token, delivered))
    }

    async fn deliver_token(&self, owner_id: &str, token: &IssuedToken) -> bool {
        let text = format!(
            "Payment verified. Your personal access token is {}. It is valid for {} minutes and works once, for your account only.",
            token.token,
            self.token_ttl.num_minutes()
        );

        match self.chat.send_message(owner_id, &text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "Failed to deliver access token");
                false
            }
        }
    }

    async fn notify_admin(&self, payment: &VerifiedPayment) {
        let text = format!(
            "Payment verified: {} ({}) paid {} with reference {}",
            payment.display_name, payment.requester_id, payment.amount, payment.reference
        );

        if let Err(e) = self.chat.send_message(&self.admin_id, &text).await {
            warn!(reference = %payment.reference, error = %e, "Failed to notify admin");
        }
    }
}
