// ABOUTME: Messaging platform implementations of the core MessageTransport trait
// ABOUTME: Telegram is the only platform; the core never depends on it directly

pub mod telegram;

pub use telegram::TelegramTransport;
