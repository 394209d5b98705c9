// src/verification/verifier.rs
//! Conjunctive receipt verification.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use tracing::debug;

use super::amount::AmountExtractor;
use super::fields::{FieldMatcher, MatchPolicy};

/// Allowed difference between the detected and the expected amount
pub const DEFAULT_AMOUNT_TOLERANCE: f64 = 1.0;

/// Why a receipt was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    UnreadableImage,
    AmountNotFound,
    AmountMismatch { expected: f64, found: f64 },
    RecipientNotFound,
    ReferenceNotFound,
    StatusNotSuccessful,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::UnreadableImage => "UNREADABLE_IMAGE",
            RejectionReason::AmountNotFound => "AMOUNT_NOT_FOUND",
            RejectionReason::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            RejectionReason::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            RejectionReason::ReferenceNotFound => "REFERENCE_NOT_FOUND",
            RejectionReason::StatusNotSuccessful => "STATUS_NOT_SUCCESSFUL",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::UnreadableImage => write!(f, "unreadable image"),
            RejectionReason::AmountNotFound => write!(f, "payment amount not found in receipt"),
            RejectionReason::AmountMismatch { expected, found } => write!(
                f,
                "amount mismatch: expected {:.2}, found {:.2}",
                expected, found
            ),
            RejectionReason::RecipientNotFound => write!(f, "recipient name not found in receipt"),
            RejectionReason::ReferenceNotFound => write!(f, "payment reference not found in receipt"),
            RejectionReason::StatusNotSuccessful => {
                write!(f, "transaction is not marked as successful")
            }
        }
    }
}

impl Serialize for RejectionReason {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("RejectionReason", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result of verifying one receipt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationOutcome {
    pub accepted: bool,
    pub reasons: Vec<RejectionReason>,
    pub detected_amount: Option<f64>,
}

impl VerificationOutcome {
    pub fn reason_messages(&self) -> Vec<String> {
        self.reasons.iter().map(|r| r.to_string()).collect()
    }
}

/// Combines the amount extractor and the field matcher into one decision.
#[derive(Debug, Clone)]
pub struct ReceiptVerifier {
    amounts: AmountExtractor,
    fields: FieldMatcher,
    tolerance: f64,
}

impl ReceiptVerifier {
    pub fn new(policy: MatchPolicy) -> Self {
        Self {
            amounts: AmountExtractor::new(),
            fields: FieldMatcher::new(policy),
            tolerance: DEFAULT_AMOUNT_TOLERANCE,
        }
    }

    pub fn with_extractor(mut self, amounts: AmountExtractor) -> Self {
        self.amounts = amounts;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.abs();
        self
    }

    /// Runs every check independently and accepts only if all pass.
    ///
    /// `None` or blank text short-circuits to a single `UnreadableImage`
    /// reason. Pure: no I/O, no state.
    pub fn verify(
        &self,
        text: Option<&str>,
        expected_amount: f64,
        reference: &str,
        recipient_name: &str,
    ) -> VerificationOutcome {
        let text = match text {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                return VerificationOutcome {
                    accepted: false,
                    reasons: vec![RejectionReason::UnreadableImage],
                    detected_amount: None,
                }
            }
        };

        let mut reasons = Vec::new();

        let detected_amount = self.amounts.extract_amount(text, Some(expected_amount));
        match detected_amount {
            None => reasons.push(RejectionReason::AmountNotFound),
            Some(found) if (found - expected_amount).abs() > self.tolerance => {
                reasons.push(RejectionReason::AmountMismatch {
                    expected: expected_amount,
                    found,
                })
            }
            Some(_) => {}
        }

        if !self.fields.find_recipient(text, recipient_name) {
            reasons.push(RejectionReason::RecipientNotFound);
        }
        if !self.fields.find_reference(text, reference) {
            reasons.push(RejectionReason::ReferenceNotFound);
        }
        if !self.fields.find_success_status(text) {
            reasons.push(RejectionReason::StatusNotSuccessful);
        }

        let accepted = reasons.is_empty();
        debug!(
            accepted,
            reference = %reference,
            detected_amount = ?detected_amount,
            rejected_checks = reasons.len(),
            "Receipt verification finished"
        );

        VerificationOutcome {
            accepted,
            reasons,
            detected_amount,
        }
    }
}
