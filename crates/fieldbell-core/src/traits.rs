//! Collaborator traits — the seams behind which the persistent store and
//! the chat platform live.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{OperatorRecord, Role};

/// Messaging gateway failure. The dispatcher and the liveness checker key
/// their self-heal behavior off `ChatInaccessible` only; every other
/// failure is retried on a later tick.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The bot can no longer reach the chat: kicked, chat deleted, or the
    /// chat id never existed.
    #[error("chat {0} is inaccessible")]
    ChatInaccessible(i64),

    #[error("gateway error: {0}")]
    Other(String),
}

impl GatewayError {
    pub fn is_chat_gone(&self) -> bool {
        matches!(self, GatewayError::ChatInaccessible(_))
    }
}

impl From<GatewayError> for crate::error::FieldbellError {
    fn from(e: GatewayError) -> Self {
        crate::error::FieldbellError::Gateway(e.to_string())
    }
}

/// Record-oriented persistent store for the operator ledger.
///
/// Every mutation is a single atomic write against one record (or one
/// group-id cascade), so a stop signal can never leave a row half-updated.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up a record by its registered name and role.
    async fn find_by_credentials(&self, user_name: &str, role: Role)
    -> Result<Option<OperatorRecord>>;

    /// Look up a record by the Telegram id bound to it.
    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<OperatorRecord>>;

    /// Stamp `telegram_id` on the record matching (user_name, role).
    /// The one persisted write of a successful verification.
    async fn bind_telegram_id(&self, user_name: &str, role: Role, telegram_id: i64) -> Result<()>;

    /// Queue a report on the record bound to `telegram_id`: sets the body,
    /// clears `is_sent`/`sent_at`, and stamps the indexing group (if any).
    async fn queue_message(
        &self,
        telegram_id: i64,
        body: &str,
        group_id: Option<i64>,
    ) -> Result<()>;

    /// Queue a report by registered name (HTTP ingestion path).
    /// Returns false when no record carries that name.
    async fn queue_message_by_name(&self, user_name: &str, body: &str) -> Result<bool>;

    /// All records with a non-empty body and `is_sent = false`.
    async fn pending_messages(&self) -> Result<Vec<OperatorRecord>>;

    /// Count-only variant of `pending_messages`.
    async fn pending_count(&self) -> Result<u64>;

    /// Mark one record delivered.
    async fn mark_sent(&self, record_id: i64, sent_at: DateTime<Utc>) -> Result<()>;

    /// Stamp `group_id` on one record.
    async fn set_group(&self, record_id: i64, group_id: i64) -> Result<()>;

    /// Clear `group_id` on one record.
    async fn clear_group_for_record(&self, record_id: i64) -> Result<()>;

    /// Clear `group_id` on every record bound to the group. Returns how
    /// many rows changed.
    async fn clear_group_everywhere(&self, group_id: i64) -> Result<u64>;

    /// Distinct non-null group ids across all records.
    async fn distinct_group_ids(&self) -> Result<Vec<i64>>;

    /// Insert a new record (seeding/tests).
    async fn insert(&self, record: OperatorRecord) -> Result<i64>;
}

/// Chat platform capabilities the engines need.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Deliver a text message to a chat (personal or group).
    async fn send_message(&self, chat_id: i64, text: &str) -> std::result::Result<(), GatewayError>;

    /// Liveness probe — succeeds iff the bot can still see the chat.
    async fn get_chat(&self, chat_id: i64) -> std::result::Result<(), GatewayError>;

    /// Platform-level administrators of a group.
    async fn get_chat_administrators(
        &self,
        group_id: i64,
    ) -> std::result::Result<Vec<i64>, GatewayError>;
}
