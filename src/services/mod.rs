// src/services/mod.rs
//
// Shared services and external collaborators used across domain modules

pub mod chat;
pub mod monitoring;
pub mod ocr;
pub mod settings;
pub mod telegram;

// Re-export commonly used types for convenience
pub use chat::{ChatError, ChatPlatform};
pub use ocr::{OcrEngine, OcrError, TesseractOcr};
pub use settings::SettingsService;
pub use telegram::TelegramClient;
