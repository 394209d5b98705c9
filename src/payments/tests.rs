//! Tests for payments module
//!
//! Ledger transitions and expiry, plus the receipt submission flow with
//! fake OCR and chat collaborators.

#[cfg(test)]
mod tests {
    use super::super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    use crate::common::migrations::{file_pool, test_pool};
    use crate::common::state::testing::test_state;
    use crate::common::{ApiError, AppState, Validate};
    use crate::services::chat::testing::RecordingChat;
    use crate::services::ocr::testing::{StaticOcr, PNG_MAGIC};
    use crate::verification::RejectionReason;
    use ledger::{LedgerError, PaymentLedger};
    use models::PaymentStatus;
    use services::{ReceiptService, SubmissionError, SubmissionOutcome};

    const REQUESTER: &str = "7770001";
    const ADMIN: &str = "1001";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    async fn ledger() -> PaymentLedger {
        PaymentLedger::new(test_pool().await, 20, "tmzbrand")
    }

    fn receipt_for(reference: &str, amount: &str) -> String {
        format!(
            "Transfer Successful\n{}\nRecipient Details\nJOHN DOE\nOPay | 801****678\nRemark\n{}\nSession ID 100004250601090512",
            amount, reference
        )
    }

    // ------------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_request_sets_window() {
        let ledger = ledger().await;
        let pending = ledger
            .create_request_at(REQUESTER, 2000, "Ada", t0())
            .await
            .unwrap();

        assert!(pending.reference.starts_with("tmzbrand"));
        assert_eq!(pending.reference.len(), "tmzbrand".len() + 6);
        assert_eq!(pending.expires_at - pending.created_at, 20 * 60);
    }

    #[tokio::test]
    async fn test_second_request_conflicts_and_keeps_original() {
        let ledger = ledger().await;
        let original = ledger
            .create_request_at(REQUESTER, 2000, "Ada", t0())
            .await
            .unwrap();

        let second = ledger
            .create_request_at(REQUESTER, 3000, "Ada", t0() + Duration::minutes(1))
            .await;
        match second {
            Err(LedgerError::Conflict { reference, .. }) => assert_eq!(reference, original.reference),
            other => panic!("expected conflict, got {:?}", other),
        }

        let active = ledger
            .get_active_request_at(REQUESTER, t0() + Duration::minutes(2))
            .await
            .unwrap();
        assert_eq!(active, Some(original));
    }

    #[tokio::test]
    async fn test_expired_request_frees_the_requester() {
        let ledger = ledger().await;
        let first = ledger
            .create_request_at(REQUESTER, 2000, "Ada", t0())
            .await
            .unwrap();

        let later = t0() + Duration::minutes(21);
        assert_eq!(ledger.get_active_request_at(REQUESTER, later).await.unwrap(), None);

        let second = ledger
            .create_request_at(REQUESTER, 2000, "Ada", later)
            .await
            .unwrap();
        assert_ne!(second.reference, first.reference);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let ledger = ledger().await;
        ledger.create_request_at("1", 2000, "A", t0()).await.unwrap();
        ledger.create_request_at("2", 2000, "B", t0()).await.unwrap();
        ledger
            .create_request_at("3", 2000, "C", t0() + Duration::minutes(10))
            .await
            .unwrap();

        let now = t0() + Duration::minutes(25);
        assert_eq!(ledger.sweep_expired_at(now).await.unwrap(), 2);
        assert_eq!(ledger.sweep_expired_at(now).await.unwrap(), 0);
        assert_eq!(ledger.stats().await.unwrap().pending_payments, 1);
    }

    #[tokio::test]
    async fn test_verify_twice_yields_one_row() {
        let ledger = ledger().await;
        let pending = ledger
            .create_request_at(REQUESTER, 2000, "Ada", t0())
            .await
            .unwrap();

        let verified = ledger
            .mark_verified_at(&pending.reference, t0() + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(verified.amount, 2000);
        assert_eq!(verified.requester_id, REQUESTER);

        let again = ledger
            .mark_verified_at(&pending.reference, t0() + Duration::minutes(6))
            .await;
        assert!(matches!(again, Err(LedgerError::AlreadyVerified(_))));

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.verified_payments, 1);
        assert_eq!(stats.pending_payments, 0);
        assert_eq!(stats.total_verified_amount, 2000);
    }

    #[tokio::test]
    async fn test_expired_unswept_request_cannot_be_verified() {
        let ledger = ledger().await;
        let pending = ledger
            .create_request_at(REQUESTER, 2000, "Ada", t0())
            .await
            .unwrap();

        let result = ledger
            .mark_verified_at(&pending.reference, t0() + Duration::minutes(21))
            .await;
        assert!(matches!(result, Err(LedgerError::Expired(_))));
        assert!(!ledger.has_verified_payment(REQUESTER).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_reference_states() {
        let ledger = ledger().await;
        let pending = ledger
            .create_request_at(REQUESTER, 2000, "Ada", t0())
            .await
            .unwrap();

        let status = ledger
            .find_by_reference_at(&pending.reference, t0() + Duration::minutes(1))
            .await
            .unwrap();
        assert!(matches!(status, PaymentStatus::Pending(_)));

        ledger
            .mark_verified_at(&pending.reference, t0() + Duration::minutes(2))
            .await
            .unwrap();
        let status = ledger
            .find_by_reference_at(&pending.reference, t0() + Duration::minutes(3))
            .await
            .unwrap();
        assert!(matches!(status, PaymentStatus::Verified(_)));

        let missing = ledger
            .find_by_reference_at("tmzbrand000000", t0())
            .await
            .unwrap();
        assert_eq!(missing, PaymentStatus::NotFound);
    }

    #[tokio::test]
    async fn test_cancel_request() {
        let ledger = ledger().await;
        let pending = ledger
            .create_request_at(REQUESTER, 2000, "Ada", t0())
            .await
            .unwrap();

        let cancelled = ledger.cancel_request(REQUESTER).await.unwrap();
        assert_eq!(cancelled.reference, pending.reference);

        let again = ledger.cancel_request(REQUESTER).await;
        assert!(matches!(again, Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_history_newest_first_and_clamped() {
        let ledger = ledger().await;
        let mut references = Vec::new();
        for round in 0..3 {
            let start = t0() + Duration::hours(round);
            let pending = ledger
                .create_request_at(REQUESTER, 2000, "Ada", start)
                .await
                .unwrap();
            ledger
                .mark_verified_at(&pending.reference, start + Duration::minutes(1))
                .await
                .unwrap();
            references.push(pending.reference);
        }

        let history = ledger.history(REQUESTER, 10).await.unwrap();
        let got: Vec<&str> = history.iter().map(|p| p.reference.as_str()).collect();
        let expected: Vec<&str> = references.iter().rev().map(String::as_str).collect();
        assert_eq!(got, expected);

        assert_eq!(ledger.history(REQUESTER, 0).await.unwrap().len(), 1);
        assert_eq!(ledger.history(REQUESTER, 500).await.unwrap().len(), 3);
        assert!(ledger.history("someone-else", 10).await.unwrap().is_empty());
    }

    /// Ledger whose references come from `script`, in order
    async fn scripted_ledger(script: &[&str]) -> PaymentLedger {
        let queue: Vec<String> = script.iter().rev().map(|r| r.to_string()).collect();
        let queue = Mutex::new(queue);
        ledger()
            .await
            .with_reference_generator(move |_prefix: &str| queue.lock().unwrap().pop().unwrap())
    }

    #[tokio::test]
    async fn test_pending_reference_collision_regenerates() {
        let ledger = scripted_ledger(&["tmzbrand111111", "tmzbrand111111", "tmzbrand222222"]).await;
        ledger.create_request_at("1", 2000, "A", t0()).await.unwrap();

        let second = ledger.create_request_at("2", 2000, "B", t0()).await.unwrap();
        assert_eq!(second.reference, "tmzbrand222222");
        assert_eq!(ledger.stats().await.unwrap().pending_payments, 2);
    }

    #[tokio::test]
    async fn test_verified_reference_is_never_reused() {
        let ledger = scripted_ledger(&["tmzbrand111111", "tmzbrand111111", "tmzbrand222222"]).await;
        let first = ledger.create_request_at("1", 2000, "A", t0()).await.unwrap();
        ledger
            .mark_verified_at(&first.reference, t0() + Duration::minutes(1))
            .await
            .unwrap();

        let second = ledger
            .create_request_at("2", 2000, "B", t0() + Duration::minutes(2))
            .await
            .unwrap();
        assert_eq!(second.reference, "tmzbrand222222");

        let status = ledger
            .find_by_reference_at(&first.reference, t0() + Duration::minutes(3))
            .await
            .unwrap();
        assert!(matches!(status, PaymentStatus::Verified(v) if v.requester_id == "1"));
    }

    #[tokio::test]
    async fn test_exhausted_references_fail_retryably() {
        let taken = "tmzbrand111111";
        let ledger = scripted_ledger(&[taken, taken, taken, taken]).await;
        ledger.create_request_at("1", 2000, "A", t0()).await.unwrap();

        let result = ledger.create_request_at("2", 2000, "B", t0()).await;
        assert!(matches!(result, Err(LedgerError::ReferenceCollision)));
        assert_eq!(ledger.get_active_request_at("2", t0()).await.unwrap(), None);

        let response = ApiError::from(LedgerError::ReferenceCollision).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_on_shared_file_report_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_pool(&dir.path().join("ledger.db"), 8).await;
        let ledger = PaymentLedger::new(pool, 20, "tmzbrand");

        let mut handles = Vec::new();
        for requester in 0..30 {
            for _ in 0..4 {
                let ledger = ledger.clone();
                handles.push(tokio::spawn(async move {
                    ledger
                        .create_request(&format!("77700{:02}", requester), 2000, "Ada")
                        .await
                }));
            }
        }

        let (mut created, mut conflicts) = (0, 0);
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(LedgerError::Conflict { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected ledger error: {}", other),
            }
        }
        assert_eq!(created, 30);
        assert_eq!(conflicts, 90);
        assert_eq!(ledger.stats().await.unwrap().pending_payments, 30);
    }

    // ------------------------------------------------------------------------
    // Receipt submission
    // ------------------------------------------------------------------------

    async fn state_with_request(chat: Arc<RecordingChat>) -> (AppState, models::PendingPayment) {
        let state = test_state(StaticOcr::failing(), chat).await;
        let pending = state
            .ledger
            .create_request_at(REQUESTER, 2000, "Ada", t0())
            .await
            .unwrap();
        (state, pending)
    }

    #[tokio::test]
    async fn test_matching_receipt_verifies_and_issues_token() {
        let chat = Arc::new(RecordingChat::new());
        let (mut state, pending) = state_with_request(chat.clone()).await;
        state.ocr = Arc::new(StaticOcr::reading(&receipt_for(&pending.reference, "₦2,000.00")));

        let outcome = ReceiptService::new(&state)
            .submit_at(REQUESTER, PNG_MAGIC, t0() + Duration::minutes(5))
            .await
            .unwrap();

        let SubmissionOutcome::Verified {
            payment,
            outcome,
            token,
            token_delivered,
        } = outcome
        else {
            panic!("expected a verified submission");
        };
        assert!(outcome.accepted);
        assert_eq!(outcome.detected_amount, Some(2000.0));
        assert_eq!(payment.reference, pending.reference);
        assert!(token_delivered);

        let dms = chat.messages_to(REQUESTER);
        assert_eq!(dms.len(), 1);
        assert!(dms[0].contains(&token.token));
        assert_eq!(chat.messages_to(ADMIN).len(), 1);

        assert!(state.ledger.has_verified_payment(REQUESTER).await.unwrap());
        assert_eq!(state.tokens.stats().await.unwrap().issued, 1);
    }

    #[tokio::test]
    async fn test_wrong_amount_is_rejected_and_request_kept() {
        let chat = Arc::new(RecordingChat::new());
        let (mut state, pending) = state_with_request(chat.clone()).await;
        state.ocr = Arc::new(StaticOcr::reading(&receipt_for(&pending.reference, "₦1,500.00")));

        let outcome = ReceiptService::new(&state)
            .submit_at(REQUESTER, PNG_MAGIC, t0() + Duration::minutes(5))
            .await
            .unwrap();

        let SubmissionOutcome::Rejected { pending: kept, outcome } = outcome else {
            panic!("expected a rejected submission");
        };
        assert_eq!(kept.reference, pending.reference);
        assert_eq!(
            outcome.reasons,
            vec![RejectionReason::AmountMismatch {
                expected: 2000.0,
                found: 1500.0
            }]
        );
        assert!(chat.calls().is_empty());

        let still_active = state
            .ledger
            .get_active_request_at(REQUESTER, t0() + Duration::minutes(6))
            .await
            .unwrap();
        assert!(still_active.is_some());
    }

    #[tokio::test]
    async fn test_unreadable_receipt_is_rejected() {
        let chat = Arc::new(RecordingChat::new());
        let (state, _pending) = state_with_request(chat).await;

        let outcome = ReceiptService::new(&state)
            .submit_at(REQUESTER, PNG_MAGIC, t0() + Duration::minutes(5))
            .await
            .unwrap();

        let SubmissionOutcome::Rejected { outcome, .. } = outcome else {
            panic!("expected a rejected submission");
        };
        assert_eq!(outcome.reasons, vec![RejectionReason::UnreadableImage]);
        assert_eq!(outcome.detected_amount, None);
    }

    #[tokio::test]
    async fn test_submission_preconditions() {
        let chat = Arc::new(RecordingChat::new());
        let (state, _pending) = state_with_request(chat).await;
        let service = ReceiptService::new(&state);

        let not_image = service
            .submit_at(REQUESTER, b"definitely not an image", t0() + Duration::minutes(1))
            .await;
        assert!(matches!(not_image, Err(SubmissionError::UnsupportedImage)));

        let stranger = service
            .submit_at("7770999", PNG_MAGIC, t0() + Duration::minutes(1))
            .await;
        assert!(matches!(stranger, Err(SubmissionError::NoPendingRequest(_))));

        let too_late = service
            .submit_at(REQUESTER, PNG_MAGIC, t0() + Duration::minutes(21))
            .await;
        assert!(matches!(too_late, Err(SubmissionError::NoPendingRequest(_))));
    }

    #[tokio::test]
    async fn test_chat_outage_does_not_undo_verification() {
        let chat = Arc::new(RecordingChat::new());
        let (mut state, pending) = state_with_request(chat.clone()).await;
        state.ocr = Arc::new(StaticOcr::reading(&receipt_for(&pending.reference, "₦2,000.00")));
        chat.set_failing(true);

        let outcome = ReceiptService::new(&state)
            .submit_at(REQUESTER, PNG_MAGIC, t0() + Duration::minutes(5))
            .await
            .unwrap();

        match outcome {
            SubmissionOutcome::Verified {
                token_delivered, ..
            } => assert!(!token_delivered),
            other => panic!("expected a verified submission, got {:?}", other),
        }
        assert!(state.ledger.has_verified_payment(REQUESTER).await.unwrap());
    }

    #[tokio::test]
    async fn test_reissue_requires_verified_payment() {
        let chat = Arc::new(RecordingChat::new());
        let (state, pending) = state_with_request(chat.clone()).await;
        let service = ReceiptService::new(&state);

        let refused = service.reissue_token(REQUESTER).await;
        assert!(matches!(refused, Err(SubmissionError::NotVerified(_))));

        state
            .ledger
            .mark_verified_at(&pending.reference, t0() + Duration::minutes(1))
            .await
            .unwrap();
        let (token, delivered) = service.reissue_token(REQUESTER).await.unwrap();
        assert!(delivered);
        assert!(chat.messages_to(REQUESTER)[0].contains(&token.token));
    }

    // ------------------------------------------------------------------------
    // Validators
    // ------------------------------------------------------------------------

    #[test]
    fn test_create_request_validation() {
        let valid = models::CreatePaymentRequest {
            requester_id: "7770001".to_string(),
            display_name: "Ada Obi".to_string(),
            amount: 2000,
        };
        assert!(valid.validate().is_valid);

        let invalid = models::CreatePaymentRequest {
            requester_id: "".to_string(),
            display_name: "   ".to_string(),
            amount: 0,
        };
        let result = invalid.validate();
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_amount_must_match_price() {
        assert!(validators::validate_amount_matches_price(2000, 2000).is_ok());
        assert!(validators::validate_amount_matches_price(1999, 2000).is_err());
    }
}
