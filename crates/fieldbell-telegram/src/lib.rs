//! # Fieldbell Telegram
//! Telegram Bot API transport: long polling for inbound updates and the
//! `MessagingGateway` impl used for delivery, liveness probes, and group
//! admin lookups.

pub mod api;
pub mod client;

pub use api::{Chat, ChatMemberUpdated, Message, Update, User};
pub use client::{TelegramConfig, TelegramGateway, UpdateStream};
