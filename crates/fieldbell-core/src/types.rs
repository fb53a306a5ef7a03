//! Domain types — the operator ledger row and its vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered role of an operator record.
///
/// The numeric ids match the seeded `role_id` column: 1 = admin,
/// 2 = waspang (field operator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Waspang,
}

impl Role {
    /// Parse the role keyword a user types during verification.
    /// Case-insensitive; anything else is malformed input.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "waspang" => Some(Role::Waspang),
            _ => None,
        }
    }

    pub fn role_id(&self) -> i64 {
        match self {
            Role::Admin => 1,
            Role::Waspang => 2,
        }
    }

    pub fn from_role_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Waspang),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Waspang => "waspang",
        }
    }
}

/// One row of the operator ledger: identity, queued report, send status.
///
/// Rows are seeded externally; the engines only mutate `telegram_id`,
/// `group_id`, `message_body`, `is_sent` and `sent_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorRecord {
    pub id: i64,
    pub user_name: String,
    pub role: Role,
    /// Chat id bound during verification; None until the operator verifies.
    pub telegram_id: Option<i64>,
    /// Delivery group bound by an admin; only Admin rows may hold one.
    pub group_id: Option<i64>,
    /// Queued report body. `is_sent == false` is the sole queue predicate.
    pub message_body: Option<String>,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

impl OperatorRecord {
    /// True when this record has a non-empty body waiting for delivery.
    pub fn has_pending_message(&self) -> bool {
        !self.is_sent
            && self
                .message_body
                .as_deref()
                .is_some_and(|body| !body.trim().is_empty())
    }
}

/// Where a chat update came from. Group and supergroup behave identically
/// for binding and indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    Private,
    Group,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("  ADMIN "), Some(Role::Admin));
        assert_eq!(Role::parse("Waspang"), Some(Role::Waspang));
        assert_eq!(Role::parse("supervisor"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn test_role_id_roundtrip() {
        assert_eq!(Role::from_role_id(Role::Admin.role_id()), Some(Role::Admin));
        assert_eq!(
            Role::from_role_id(Role::Waspang.role_id()),
            Some(Role::Waspang)
        );
        assert_eq!(Role::from_role_id(9), None);
    }

    #[test]
    fn test_pending_predicate() {
        let mut record = OperatorRecord {
            id: 1,
            user_name: "alice".into(),
            role: Role::Waspang,
            telegram_id: Some(42),
            group_id: None,
            message_body: Some("report".into()),
            is_sent: false,
            sent_at: None,
        };
        assert!(record.has_pending_message());

        record.is_sent = true;
        assert!(!record.has_pending_message());

        record.is_sent = false;
        record.message_body = Some("   ".into());
        assert!(!record.has_pending_message());

        record.message_body = None;
        assert!(!record.has_pending_message());
    }
}
