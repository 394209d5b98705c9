//! Tests for access module
//!
//! Token issue/redeem semantics, the chat-outage path and the join-request gate.

#[cfg(test)]
mod tests {
    use super::super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    use crate::common::migrations::test_pool;
    use crate::common::Validate;
    use crate::services::chat::testing::{ChatCall, RecordingChat};
    use gate::{GateError, MembershipGate, SYSTEM_DECIDER};
    use join_records::{JoinRecordStore, JoinStatus};
    use tokens::{AccessTokenService, TokenError};

    const VIP_CHAT: &str = "-1001234567890";
    const OWNER: &str = "5550001";
    const STRANGER: &str = "5550002";

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, hour, minute, 0).unwrap()
    }

    struct Fixture {
        chat: Arc<RecordingChat>,
        tokens: AccessTokenService,
        gate: MembershipGate,
        records: JoinRecordStore,
    }

    async fn fixture_with_chat(target_chat: Option<&str>) -> Fixture {
        let pool = test_pool().await;
        let chat = Arc::new(RecordingChat::new());
        let target = target_chat.map(str::to_string);
        let tokens = AccessTokenService::new(pool.clone(), chat.clone(), target.clone(), 600);
        let records = JoinRecordStore::new(pool.clone());
        let gate = MembershipGate::new(records.clone(), tokens.clone(), chat.clone(), target);
        Fixture {
            chat,
            tokens,
            gate,
            records,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with_chat(Some(VIP_CHAT)).await
    }

    // ------------------------------------------------------------------------
    // Tokens
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_token_redeems_exactly_once() {
        let f = fixture().await;
        let issued = f
            .tokens
            .issue_at(OWNER, Duration::minutes(60), at(12, 0))
            .await
            .unwrap();

        let grant = f.tokens.redeem_at(&issued.token, OWNER, at(12, 5)).await.unwrap();
        assert_eq!(grant.invite_link, "https://t.me/+invite1");
        assert_eq!(grant.expires_at, (at(12, 5) + Duration::seconds(600)).timestamp());

        let second = f.tokens.redeem_at(&issued.token, OWNER, at(12, 6)).await;
        assert!(matches!(second, Err(TokenError::AlreadyUsed)));
        assert_eq!(f.chat.invites(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_create_one_invite() {
        let f = fixture().await;
        let issued = f
            .tokens
            .issue_at(OWNER, Duration::minutes(60), at(12, 0))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            f.tokens.redeem_at(&issued.token, OWNER, at(12, 5)),
            f.tokens.redeem_at(&issued.token, OWNER, at(12, 5)),
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(TokenError::AlreadyUsed)));
        assert_eq!(f.chat.invites(), 1);
        assert!(f.tokens.has_redeemed(OWNER).await.unwrap());
    }

    #[tokio::test]
    async fn test_token_is_normalized_before_lookup() {
        let f = fixture().await;
        let issued = f
            .tokens
            .issue_at(OWNER, Duration::minutes(60), at(12, 0))
            .await
            .unwrap();

        let typed = format!("  {}  ", issued.token.to_lowercase());
        assert!(f.tokens.redeem_at(&typed, OWNER, at(12, 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_bound_to_owner() {
        let f = fixture().await;
        let issued = f
            .tokens
            .issue_at(OWNER, Duration::minutes(60), at(12, 0))
            .await
            .unwrap();

        let result = f.tokens.redeem_at(&issued.token, STRANGER, at(12, 1)).await;
        assert!(matches!(result, Err(TokenError::NotOwner)));
        assert_eq!(f.chat.invites(), 0);

        // The rightful owner can still use it
        assert!(f.tokens.redeem_at(&issued.token, OWNER, at(12, 2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_and_unknown_tokens() {
        let f = fixture().await;
        let issued = f
            .tokens
            .issue_at(OWNER, Duration::minutes(60), at(10, 0))
            .await
            .unwrap();

        let expired = f.tokens.redeem_at(&issued.token, OWNER, at(11, 1)).await;
        assert!(matches!(expired, Err(TokenError::Expired)));

        let unknown = f.tokens.redeem_at("0000000000000000", OWNER, at(10, 1)).await;
        assert!(matches!(unknown, Err(TokenError::InvalidToken)));
        assert_eq!(f.chat.invites(), 0);
    }

    #[tokio::test]
    async fn test_chat_outage_leaves_token_redeemable() {
        let f = fixture().await;
        let issued = f
            .tokens
            .issue_at(OWNER, Duration::minutes(60), at(12, 0))
            .await
            .unwrap();

        f.chat.set_failing(true);
        let failed = f.tokens.redeem_at(&issued.token, OWNER, at(12, 1)).await;
        assert!(matches!(failed, Err(TokenError::GrantFailed(_))));
        assert!(!f.tokens.has_redeemed(OWNER).await.unwrap());

        f.chat.set_failing(false);
        let grant = f.tokens.redeem_at(&issued.token, OWNER, at(12, 2)).await.unwrap();
        assert!(grant.invite_link.starts_with("https://t.me/+"));
        assert!(f.tokens.has_redeemed(OWNER).await.unwrap());
    }

    #[tokio::test]
    async fn test_redeem_without_target_chat() {
        let f = fixture_with_chat(None).await;
        let issued = f
            .tokens
            .issue_at(OWNER, Duration::minutes(60), at(12, 0))
            .await
            .unwrap();

        let result = f.tokens.redeem_at(&issued.token, OWNER, at(12, 1)).await;
        assert!(matches!(result, Err(TokenError::GrantUnavailable)));
        assert!(f.chat.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_unused_expired_tokens() {
        let f = fixture().await;
        let used = f
            .tokens
            .issue_at(OWNER, Duration::minutes(30), at(9, 0))
            .await
            .unwrap();
        f.tokens.redeem_at(&used.token, OWNER, at(9, 10)).await.unwrap();
        f.tokens
            .issue_at(OWNER, Duration::minutes(30), at(9, 0))
            .await
            .unwrap();
        f.tokens
            .issue_at(STRANGER, Duration::minutes(30), at(11, 0))
            .await
            .unwrap();

        assert_eq!(f.tokens.sweep_expired_at(at(10, 0)).await.unwrap(), 1);
        assert_eq!(f.tokens.sweep_expired_at(at(10, 0)).await.unwrap(), 0);

        let stats = f.tokens.stats().await.unwrap();
        assert_eq!(stats.issued, 2);
        assert_eq!(stats.redeemed, 1);
    }

    // ------------------------------------------------------------------------
    // Gate
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_unentitled_join_request_is_parked() {
        let f = fixture().await;

        let record = f.gate.handle_join_request_at(STRANGER, at(12, 0)).await.unwrap();
        assert_eq!(record.status, JoinStatus::Pending);
        assert_eq!(record.decided_by, None);
        assert_eq!(record.decided_at, None);

        assert_eq!(f.chat.messages_to(STRANGER).len(), 1);
        assert!(!f
            .chat
            .calls()
            .iter()
            .any(|call| matches!(call, ChatCall::Approve { .. })));
    }

    #[tokio::test]
    async fn test_redeemed_member_is_approved_automatically() {
        let f = fixture().await;
        let issued = f
            .tokens
            .issue_at(OWNER, Duration::minutes(60), at(12, 0))
            .await
            .unwrap();
        f.tokens.redeem_at(&issued.token, OWNER, at(12, 1)).await.unwrap();

        let record = f.gate.handle_join_request_at(OWNER, at(12, 2)).await.unwrap();
        assert_eq!(record.status, JoinStatus::Approved);
        assert_eq!(record.decided_by.as_deref(), Some(SYSTEM_DECIDER));
        assert!(f.chat.calls().contains(&ChatCall::Approve {
            chat_id: VIP_CHAT.to_string(),
            user_id: OWNER.to_string(),
        }));
    }

    #[tokio::test]
    async fn test_pre_approved_member_is_admitted() {
        let f = fixture().await;
        f.gate.pre_approve_at(OWNER, at(12, 0)).await.unwrap();

        let record = f.gate.handle_join_request_at(OWNER, at(12, 1)).await.unwrap();
        assert_eq!(record.status, JoinStatus::Approved);

        // Pre-approving an approved member keeps the approval
        let again = f.gate.pre_approve_at(OWNER, at(12, 2)).await.unwrap();
        assert_eq!(again.status, JoinStatus::Approved);
    }

    #[tokio::test]
    async fn test_admin_decisions() {
        let f = fixture().await;
        f.gate.handle_join_request_at(OWNER, at(12, 0)).await.unwrap();
        f.gate.handle_join_request_at(STRANGER, at(12, 0)).await.unwrap();

        let approved = f.gate.decide_at(OWNER, true, "1001", at(12, 5)).await.unwrap();
        assert_eq!(approved.status, JoinStatus::Approved);
        assert_eq!(approved.decided_by.as_deref(), Some("1001"));
        assert_eq!(approved.decided_at, Some(at(12, 5).timestamp()));

        let declined = f.gate.decide_at(STRANGER, false, "1001", at(12, 6)).await.unwrap();
        assert_eq!(declined.status, JoinStatus::Declined);
        assert!(f.chat.calls().contains(&ChatCall::Decline {
            chat_id: VIP_CHAT.to_string(),
            user_id: STRANGER.to_string(),
        }));

        let stats = f.gate.stats().await.unwrap();
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.declined, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_chat_failure_leaves_record_undecided() {
        let f = fixture().await;
        f.gate.handle_join_request_at(OWNER, at(12, 0)).await.unwrap();

        f.chat.set_failing(true);
        let result = f.gate.decide_at(OWNER, true, "1001", at(12, 1)).await;
        assert!(matches!(result, Err(GateError::Chat(_))));

        let record = f.records.get(OWNER).await.unwrap().unwrap();
        assert_eq!(record.status, JoinStatus::Pending);
    }

    #[tokio::test]
    async fn test_gate_without_target_chat() {
        let f = fixture_with_chat(None).await;

        let result = f.gate.handle_join_request_at(OWNER, at(12, 0)).await;
        assert!(matches!(result, Err(GateError::NotConfigured)));
        assert!(f.records.get(OWNER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let f = fixture().await;
        f.gate.handle_join_request_at("100", at(12, 0)).await.unwrap();
        f.gate.handle_join_request_at("200", at(12, 1)).await.unwrap();
        f.gate.pre_approve_at("300", at(12, 2)).await.unwrap();

        let pending = f.gate.list(Some(JoinStatus::Pending), 10).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|r| r.member_id.as_str()).collect();
        assert_eq!(ids, vec!["200", "100"]);

        assert_eq!(f.gate.list(None, 10).await.unwrap().len(), 3);
        assert_eq!(f.gate.list(None, 1).await.unwrap().len(), 1);
    }

    // ------------------------------------------------------------------------
    // Validators
    // ------------------------------------------------------------------------

    #[test]
    fn test_redeem_request_validation() {
        let valid = models::RedeemRequest {
            token: " k7np3xw2qz8mrt5v ".to_string(),
            user_id: "5550001".to_string(),
        };
        assert!(valid.validate().is_valid);

        let invalid = models::RedeemRequest {
            token: "SHORT".to_string(),
            user_id: "not-a-number".to_string(),
        };
        let result = invalid.validate();
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_user_id_validation() {
        assert!(validators::validate_user_id("-1001234567890").is_ok());
        assert!(validators::validate_user_id("").is_err());
        assert!(validators::validate_user_id("-").is_err());
        assert!(validators::validate_user_id("12a4").is_err());
    }
}
