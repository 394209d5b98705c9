// src/verification/mod.rs
//! # Verification Module
//!
//! Turns OCR'd receipt text into an accept/reject decision.
//!
//! ## Components
//! - **amount**: ordered fallback chain that finds the paid amount
//! - **fields**: reference, recipient and success-status predicates
//! - **verifier**: conjunctive decision with typed rejection reasons
//!
//! Everything here is pure; the OCR engine and the ledger live elsewhere.

pub mod amount;
pub mod fields;
pub mod verifier;


pub use amount::{AmountExtractor, AmountMatch, AmountStrategy};
pub use fields::{FieldMatcher, MatchPolicy, PaymentPlatform};
pub use verifier::{ReceiptVerifier, RejectionReason, VerificationOutcome};
