//! Update routing — turns inbound Telegram updates into engine calls.

use fieldbell_core::traits::{MessagingGateway, RecordStore};
use fieldbell_core::types::ChatKind;
use fieldbell_dispatch::NotificationDispatcher;
use fieldbell_telegram::api::{Message, Update};
use fieldbell_telegram::client::TelegramGateway;
use fieldbell_verify::{
    GroupBindingService, IndexOrigin, SessionStore, VerificationEngine, VerifyStep,
};
use std::sync::Arc;

/// All the engines behind the chat front end.
pub struct Bot {
    pub gateway: Arc<TelegramGateway>,
    pub store: Arc<dyn RecordStore>,
    pub sessions: Arc<SessionStore>,
    pub verifier: Arc<VerificationEngine>,
    pub groups: Arc<GroupBindingService>,
    pub dispatcher: Arc<NotificationDispatcher>,
    /// Our own user id, from the startup getMe probe.
    pub bot_id: i64,
}

impl Bot {
    /// Route one update. Never returns an error: anything that goes wrong
    /// here is logged and contained so the polling loop keeps draining.
    pub async fn handle_update(&self, update: Update) {
        if let Some(change) = update.my_chat_member {
            self.handle_membership_change(change).await;
            return;
        }
        if let Some(message) = update.message {
            self.handle_message(message).await;
        }
    }

    /// Bot added to or removed from a group.
    async fn handle_membership_change(
        &self,
        change: fieldbell_telegram::api::ChatMemberUpdated,
    ) {
        if change.chat.kind() != ChatKind::Group {
            return;
        }
        let group_id = change.chat.id;
        if change.new_chat_member.is_gone() {
            tracing::info!(
                "❌ Bot removed from group {} ({group_id})",
                change.chat.title_or_unnamed()
            );
            match self.store.clear_group_everywhere(group_id).await {
                Ok(cleared) => {
                    tracing::info!("✅ Cleared group {group_id} from {cleared} record(s)")
                }
                Err(e) => tracing::error!("❌ Could not clear group {group_id}: {e}"),
            }
        } else {
            tracing::info!(
                "✅ Bot added to group {} ({group_id})",
                change.chat.title_or_unnamed()
            );
            self.reply(group_id, &crate::commands::group_greeting(group_id))
                .await;
        }
    }

    async fn handle_message(&self, message: Message) {
        // Service messages about our own membership (older update shape)
        if let Some(joined) = &message.new_chat_members
            && joined.iter().any(|u| u.id == self.bot_id)
        {
            self.reply(message.chat.id, &crate::commands::group_greeting(message.chat.id))
                .await;
            return;
        }
        if let Some(left) = &message.left_chat_member
            && left.id == self.bot_id
        {
            if let Err(e) = self.store.clear_group_everywhere(message.chat.id).await {
                tracing::error!("❌ Could not clear group {}: {e}", message.chat.id);
            }
            return;
        }

        let Some(from) = message.from.as_ref() else {
            return;
        };
        if from.is_bot {
            return;
        }
        let Some(text) = message.text.clone() else {
            return;
        };

        if let Some(command) = parse_command(&text) {
            self.handle_command(&command, &message).await;
        } else {
            self.handle_text(&text, &message).await;
        }
    }

    async fn handle_command(&self, command: &str, message: &Message) {
        match command {
            "start" => self.cmd_start(message).await,
            "menu" => self.cmd_menu(message).await,
            "indexmsg" => self.cmd_indexmsg(message).await,
            "cancel" => self.cmd_cancel(message).await,
            "status" => self.cmd_status(message).await,
            other => {
                tracing::debug!("Unknown command /{other} ignored");
            }
        }
    }

    /// Plain text: indexing capture first, then the verification flow.
    async fn handle_text(&self, text: &str, message: &Message) {
        let user_id = message.from.as_ref().map(|u| u.id).unwrap_or_default();

        if let Some(session) = self.sessions.get(user_id)
            && let VerifyStep::Indexing(origin) = session.step
        {
            self.capture_index_message(user_id, text, origin, message)
                .await;
            return;
        }

        // Verification only happens in private chat; group chatter that is
        // not an indexing capture is none of our business.
        if message.chat.kind() != ChatKind::Private {
            return;
        }
        self.run_verification(user_id, text, message.chat.id).await;
    }

    /// Store the next message as the queued report (indexing mode).
    async fn capture_index_message(
        &self,
        user_id: i64,
        text: &str,
        origin: IndexOrigin,
        message: &Message,
    ) {
        let chat_id = message.chat.id;

        // Re-check access at capture time; indexing rights may have been
        // revoked since /indexmsg.
        let allowed = match origin {
            IndexOrigin::Group(group_id) => {
                self.groups.is_authorized_in_group(user_id, group_id).await
            }
            IndexOrigin::Private => self.is_registered(user_id).await,
        };
        if !allowed {
            self.sessions.cancel_indexing(user_id);
            self.reply(chat_id, crate::commands::TEXT_NO_ACCESS).await;
            return;
        }

        match self
            .store
            .queue_message(user_id, text, origin.group_id())
            .await
        {
            Ok(()) => {
                self.sessions.cancel_indexing(user_id);
                self.reply(chat_id, &crate::commands::index_stored(text, origin))
                    .await;
                tracing::info!("✅ Report indexed by user {user_id}");
            }
            Err(e) => {
                // Session stays in indexing so the user can just resend.
                tracing::error!("❌ Failed to store indexed report: {e}");
                self.reply(chat_id, "❌ Could not store the report. Please try again.")
                    .await;
            }
        }
    }

    async fn run_verification(&self, user_id: i64, text: &str, chat_id: i64) {
        match self.verifier.submit(user_id, text).await {
            Ok(outcome) => {
                if let Some(reply) = crate::commands::render_verify_outcome(&outcome) {
                    self.reply(chat_id, &reply).await;
                }
            }
            Err(e) => {
                tracing::error!("❌ Verification write failed for user {user_id}: {e}");
                self.reply(chat_id, "❌ Could not save your verification. Please contact support.")
                    .await;
            }
        }
    }

    /// Whether the user holds any verified record (admin or waspang).
    pub(crate) async fn is_registered(&self, user_id: i64) -> bool {
        matches!(self.store.find_by_telegram_id(user_id).await, Ok(Some(_)))
    }

    /// Send a reply, logging (not propagating) delivery failures.
    pub(crate) async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.gateway.send_message(chat_id, text).await {
            tracing::warn!("❌ Reply to chat {chat_id} failed: {e}");
        }
    }
}

/// Extract a command name from "/cmd", "/cmd@botname" or "/cmd args".
fn parse_command(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix('/')?;
    let first = rest.split_whitespace().next()?;
    let name = first.split('@').next().unwrap_or(first);
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start"), Some("start".into()));
        assert_eq!(parse_command("/START"), Some("start".into()));
        assert_eq!(parse_command("/status@fieldbell_bot"), Some("status".into()));
        assert_eq!(parse_command("/indexmsg now"), Some("indexmsg".into()));
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/"), None);
    }
}
