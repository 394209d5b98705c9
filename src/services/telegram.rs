// src/services/telegram.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use super::chat::{ChatError, ChatPlatform};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API envelope: `{"ok": true, "result": ...}` or
/// `{"ok": false, "description": "..."}`
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatInviteLink {
    invite_link: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: Value,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct CreateInviteLinkRequest {
    chat_id: Value,
    expire_date: i64,
    member_limit: u32,
}

#[derive(Debug, Serialize)]
struct JoinRequestDecision {
    chat_id: Value,
    user_id: Value,
}

/// Bot API client. The bot token is part of every URL, so URLs are never logged.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Self {
        Self::with_base_url(TELEGRAM_API_BASE, bot_token)
    }

    pub fn with_base_url(api_base: &str, bot_token: &str) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
        }
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, ChatError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.without_url()))?;

        let status = response.status();
        let envelope = response
            .json::<TelegramResponse<T>>()
            .await
            .map_err(|e| ChatError::Network(e.without_url()))?;
        let result = unwrap_envelope(method, envelope);

        match &result {
            Ok(_) => debug!(method = %method, status = %status, "Telegram call succeeded"),
            Err(e) => error!(method = %method, status = %status, error = %e, "Telegram call failed"),
        }
        result
    }
}

fn unwrap_envelope<T>(method: &str, envelope: TelegramResponse<T>) -> Result<T, ChatError> {
    if !envelope.ok {
        return Err(ChatError::Api(
            envelope
                .description
                .unwrap_or_else(|| format!("{} was rejected", method)),
        ));
    }

    envelope
        .result
        .ok_or_else(|| ChatError::Api(format!("{} returned no result", method)))
}

/// Numeric ids go over the wire as integers, `@channel` names as strings.
fn id_value(id: &str) -> Value {
    id.trim()
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id.trim()))
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
        let request = SendMessageRequest {
            chat_id: id_value(chat_id),
            text,
            disable_web_page_preview: true,
        };
        self.call::<_, Value>("sendMessage", &request).await?;
        Ok(())
    }

    async fn create_single_use_invite(
        &self,
        chat_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ChatError> {
        let request = CreateInviteLinkRequest {
            chat_id: id_value(chat_id),
            expire_date: expires_at.timestamp(),
            member_limit: 1,
        };
        let link: ChatInviteLink = self.call("createChatInviteLink", &request).await?;
        Ok(link.invite_link)
    }

    async fn approve_join_request(&self, chat_id: &str, user_id: &str) -> Result<(), ChatError> {
        let request = JoinRequestDecision {
            chat_id: id_value(chat_id),
            user_id: id_value(user_id),
        };
        self.call::<_, bool>("approveChatJoinRequest", &request).await?;
        Ok(())
    }

    async fn decline_join_request(&self, chat_id: &str, user_id: &str) -> Result<(), ChatError> {
        let request = JoinRequestDecision {
            chat_id: id_value(chat_id),
            user_id: id_value(user_id),
        };
        self.call::<_, bool>("declineChatJoinRequest", &request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_value() {
        assert_eq!(id_value("-1001234567890"), Value::from(-1001234567890i64));
        assert_eq!(id_value("@vipchannel"), Value::from("@vipchannel"));
    }

    #[test]
    fn test_invite_request_shape() {
        let request = CreateInviteLinkRequest {
            chat_id: id_value("-100200"),
            expire_date: 1_700_000_600,
            member_limit: 1,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["chat_id"], -100200);
        assert_eq!(json["member_limit"], 1);
        assert_eq!(json["expire_date"], 1_700_000_600i64);
    }

    #[test]
    fn test_unwrap_envelope() {
        let ok: TelegramResponse<ChatInviteLink> =
            serde_json::from_str(r#"{"ok":true,"result":{"invite_link":"https://t.me/+abc"}}"#)
                .unwrap();
        assert_eq!(
            unwrap_envelope("createChatInviteLink", ok).unwrap().invite_link,
            "https://t.me/+abc"
        );

        let rejected: TelegramResponse<bool> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: HIDE_REQUESTER_MISSING"}"#,
        )
        .unwrap();
        match unwrap_envelope("approveChatJoinRequest", rejected) {
            Err(ChatError::Api(message)) => assert!(message.contains("HIDE_REQUESTER_MISSING")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
