// src/common/config.rs
//! Runtime configuration read from the environment (after `.env` loading).
//!
//! Missing required values abort startup; optional values fall back to
//! defaults. `from_lookup` takes any key -> value source so tests never touch
//! the process environment.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::helpers::safe_token_log;
use crate::verification::{MatchPolicy, PaymentPlatform};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone)]
pub struct AppConfig {
    // Payment destination
    pub receiver_name: String,
    pub receiver_account: String,

    // Admin & chat platform
    pub admin_id: String,
    pub admin_api_key: String,
    pub bot_token: String,
    pub vip_chat_id: Option<String>,

    // Pricing & lifecycle
    pub payment_window_minutes: i64,
    pub base_amount: i64,
    pub brand_fee: i64,
    pub token_ttl_minutes: i64,
    pub invite_ttl_seconds: i64,

    // Receipt matching
    pub reference_prefix: String,
    pub recipient_aliases: Vec<String>,
    pub receipt_platform: PaymentPlatform,

    // OCR
    pub tesseract_path: String,
    pub ocr_timeout: Duration,

    // Server
    pub database_url: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("receiver_name", &self.receiver_name)
            .field("receiver_account", &self.receiver_account)
            .field("admin_id", &self.admin_id)
            .field("admin_api_key", &safe_token_log(&self.admin_api_key))
            .field("bot_token", &safe_token_log(&self.bot_token))
            .field("vip_chat_id", &self.vip_chat_id)
            .field("payment_window_minutes", &self.payment_window_minutes)
            .field("base_amount", &self.base_amount)
            .field("brand_fee", &self.brand_fee)
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .field("invite_ttl_seconds", &self.invite_ttl_seconds)
            .field("reference_prefix", &self.reference_prefix)
            .field("recipient_aliases", &self.recipient_aliases)
            .field("receipt_platform", &self.receipt_platform)
            .field("tesseract_path", &self.tesseract_path)
            .field("ocr_timeout", &self.ocr_timeout)
            .field("database_url", &self.database_url)
            .field("port", &self.port)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let receiver_account = get("RECEIVER_ACCOUNT")
            .or_else(|| get("OPAY_ACCOUNT_NUMBER"))
            .ok_or(ConfigError::Missing("RECEIVER_ACCOUNT"))?;

        let config = Self {
            receiver_name: required(&get, "RECEIVER_NAME")?,
            receiver_account,
            admin_id: required(&get, "ADMIN_ID")?,
            admin_api_key: required(&get, "ADMIN_API_KEY")?,
            bot_token: required(&get, "TELEGRAM_BOT_TOKEN")?,
            vip_chat_id: get("VIP_CHAT_ID"),
            payment_window_minutes: parsed(&get, "PAYMENT_TIMEOUT_MINUTES", 20)?,
            base_amount: parsed(&get, "BASE_AMOUNT", 2000)?,
            brand_fee: parsed(&get, "BRAND_FEE", 0)?,
            token_ttl_minutes: parsed(&get, "TOKEN_TTL_MINUTES", 60)?,
            invite_ttl_seconds: parsed(&get, "INVITE_TTL_SECONDS", 600)?,
            reference_prefix: get("REFERENCE_PREFIX").unwrap_or_else(|| "tmzbrand".to_string()),
            recipient_aliases: get("RECIPIENT_ALIASES")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            receipt_platform: parsed(&get, "RECEIPT_PLATFORM", PaymentPlatform::Opay)?,
            tesseract_path: get("TESSERACT_PATH").unwrap_or_else(|| "tesseract".to_string()),
            ocr_timeout: Duration::from_secs(parsed(&get, "OCR_TIMEOUT_SECONDS", 30)?),
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://paygate.db".to_string()),
            port: parsed(&get, "PORT", 8080)?,
            cors_origins: get("CORS_ORIGINS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
        };

        config.check_ranges()?;
        Ok(config)
    }

    fn check_ranges(&self) -> Result<(), ConfigError> {
        let positive = [
            ("PAYMENT_TIMEOUT_MINUTES", self.payment_window_minutes),
            ("BASE_AMOUNT", self.base_amount),
            ("TOKEN_TTL_MINUTES", self.token_ttl_minutes),
            ("INVITE_TTL_SECONDS", self.invite_ttl_seconds),
        ];
        for (key, value) in positive {
            if value <= 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                });
            }
        }

        if self.brand_fee < 0 {
            return Err(ConfigError::Invalid {
                key: "BRAND_FEE",
                value: self.brand_fee.to_string(),
            });
        }

        Ok(())
    }

    /// Receipt matching rules for the configured platform
    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy::for_platform(self.receipt_platform, self.reference_prefix.clone())
            .with_aliases(self.recipient_aliases.clone())
    }

    pub fn log_summary(&self) {
        info!(
            receiver = %self.receiver_name,
            platform = %self.receipt_platform,
            window_minutes = self.payment_window_minutes,
            base_amount = self.base_amount,
            vip_chat_configured = self.vip_chat_id.is_some(),
            "Configuration loaded"
        );
    }
}

fn required<G>(get: &G, key: &'static str) -> Result<String, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(key).ok_or(ConfigError::Missing(key))
}

fn parsed<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
pub fn test_config() -> AppConfig {
    let vars = test_vars();
    AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
        .expect("test configuration is complete")
}

#[cfg(test)]
fn test_vars() -> std::collections::HashMap<&'static str, &'static str> {
    [
        ("RECEIVER_NAME", "JOHN DOE"),
        ("RECEIVER_ACCOUNT", "8012345678"),
        ("ADMIN_ID", "1001"),
        ("ADMIN_API_KEY", "admin-secret-key"),
        ("TELEGRAM_BOT_TOKEN", "123456:test-bot-token"),
        ("VIP_CHAT_ID", "-1001234567890"),
    ]
    .into_iter()
    .collect()
}
