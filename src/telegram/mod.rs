//! Telegram bot integration.

pub mod client;
pub mod outbox;

pub use client::run_telegram_daemon;
pub use outbox::TelegramOutbox;
