//! Telegram Bot API wire types — only the fields this bot reads.

use fieldbell_core::types::ChatKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    /// Bot's own membership changed (added to / removed from a group).
    pub my_chat_member: Option<ChatMemberUpdated>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub date: i64,
    /// Users added to the chat by this message (includes the bot itself).
    pub new_chat_members: Option<Vec<User>>,
    /// User removed from the chat by this message.
    pub left_chat_member: Option<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

impl Chat {
    /// Collapse Telegram's four chat types into the two this bot cares
    /// about. Channels are treated as groups for delivery purposes.
    pub fn kind(&self) -> ChatKind {
        match self.chat_type.as_str() {
            "private" => ChatKind::Private,
            _ => ChatKind::Group,
        }
    }

    pub fn title_or_unnamed(&self) -> &str {
        self.title.as_deref().unwrap_or("unnamed group")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub from: User,
    pub new_chat_member: ChatMember,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMember {
    pub user: User,
    /// member, administrator, creator, left, kicked, restricted.
    pub status: String,
}

impl ChatMember {
    pub fn is_gone(&self) -> bool {
        matches!(self.status.as_str(), "left" | "kicked")
    }
}
