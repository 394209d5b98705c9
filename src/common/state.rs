// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use super::config::AppConfig;
use crate::access::gate::MembershipGate;
use crate::access::join_records::JoinRecordStore;
use crate::access::tokens::AccessTokenService;
use crate::payments::ledger::PaymentLedger;
use crate::services::{ChatPlatform, OcrEngine, SettingsService};
use crate::verification::ReceiptVerifier;

/// Database pool, configuration, services and the two external collaborators
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub settings_service: Arc<SettingsService>,
    pub ledger: PaymentLedger,
    pub verifier: Arc<ReceiptVerifier>,
    pub tokens: AccessTokenService,
    pub gate: MembershipGate,
    pub ocr: Arc<dyn OcrEngine>,
    pub chat: Arc<dyn ChatPlatform>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: AppConfig,
        ocr: Arc<dyn OcrEngine>,
        chat: Arc<dyn ChatPlatform>,
    ) -> Self {
        let settings_service = Arc::new(SettingsService::new(db.clone()));
        let ledger = PaymentLedger::new(
            db.clone(),
            config.payment_window_minutes,
            config.reference_prefix.clone(),
        );
        let verifier = Arc::new(ReceiptVerifier::new(config.match_policy()));
        let tokens = AccessTokenService::new(
            db.clone(),
            chat.clone(),
            config.vip_chat_id.clone(),
            config.invite_ttl_seconds,
        );
        let gate = MembershipGate::new(
            JoinRecordStore::new(db.clone()),
            tokens.clone(),
            chat.clone(),
            config.vip_chat_id.clone(),
        );

        Self {
            db,
            config: Arc::new(config),
            settings_service,
            ledger,
            verifier,
            tokens,
            gate,
            ocr,
            chat,
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::common::config::test_config;
    use crate::common::migrations::test_pool;
    use crate::services::chat::testing::RecordingChat;
    use crate::services::ocr::testing::StaticOcr;

    /// State over a fresh in-memory database with the given fakes
    pub async fn test_state(ocr: StaticOcr, chat: Arc<RecordingChat>) -> AppState {
        AppState::new(test_pool().await, test_config(), Arc::new(ocr), chat)
    }
}
