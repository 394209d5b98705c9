// src/services/chat.rs
//! Chat platform boundary.
//!
//! Everything the gate needs from the messaging platform: direct messages,
//! single-use invite links and join-request decisions. Production uses
//! [`TelegramClient`](super::telegram::TelegramClient); tests use the
//! recording fake in [`testing`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Chat platform request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Chat platform rejected the request: {0}")]
    Api(String),
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Direct message to a user (or a post to a chat)
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError>;

    /// Invite link usable by exactly one member, expiring at `expires_at`
    async fn create_single_use_invite(
        &self,
        chat_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ChatError>;

    async fn approve_join_request(&self, chat_id: &str, user_id: &str) -> Result<(), ChatError>;

    async fn decline_join_request(&self, chat_id: &str, user_id: &str) -> Result<(), ChatError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum ChatCall {
        Message { chat_id: String, text: String },
        Invite { chat_id: String },
        Approve { chat_id: String, user_id: String },
        Decline { chat_id: String, user_id: String },
    }

    /// Records every call; can be switched into an outage.
    #[derive(Default)]
    pub struct RecordingChat {
        calls: Mutex<Vec<ChatCall>>,
        failing: AtomicBool,
    }

    impl RecordingChat {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn calls(&self) -> Vec<ChatCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn invites(&self) -> usize {
            self.calls()
                .iter()
                .filter(|call| matches!(call, ChatCall::Invite { .. }))
                .count()
        }

        pub fn messages_to(&self, target: &str) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    ChatCall::Message { chat_id, text } if chat_id == target => Some(text),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: ChatCall) -> Result<(), ChatError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ChatError::Api("simulated outage".to_string()));
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl ChatPlatform for RecordingChat {
        async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
            self.record(ChatCall::Message {
                chat_id: chat_id.to_string(),
                text: text.to_string(),
            })
        }

        async fn create_single_use_invite(
            &self,
            chat_id: &str,
            _expires_at: DateTime<Utc>,
        ) -> Result<String, ChatError> {
            self.record(ChatCall::Invite {
                chat_id: chat_id.to_string(),
            })?;
            Ok(format!("https://t.me/+invite{}", self.invites()))
        }

        async fn approve_join_request(&self, chat_id: &str, user_id: &str) -> Result<(), ChatError> {
            self.record(ChatCall::Approve {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
            })
        }

        async fn decline_join_request(&self, chat_id: &str, user_id: &str) -> Result<(), ChatError> {
            self.record(ChatCall::Decline {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
            })
        }
    }
}
