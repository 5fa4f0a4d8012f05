//! Telegram Bot API access.

mod client;
#[cfg(test)]
pub mod fake;
mod gateway;
pub mod types;

pub use client::TelegramClient;
pub use gateway::TelegramGateway;
