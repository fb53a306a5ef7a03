//! Command handlers and user-facing message rendering.

use fieldbell_core::traits::RecordStore;
use fieldbell_core::types::{ChatKind, Role};
use fieldbell_telegram::api::Message;
use fieldbell_verify::{IndexOrigin, VerifyOutcome};

use crate::bot::Bot;

pub(crate) const TEXT_NO_ACCESS: &str = "❌ You do not have access to use this bot here.";

impl Bot {
    /// `/start` — verification in private chat; group connection in groups.
    pub(crate) async fn cmd_start(&self, message: &Message) {
        let Some(user_id) = message.from.as_ref().map(|u| u.id) else {
            return;
        };
        let chat_id = message.chat.id;

        if message.chat.kind() == ChatKind::Private {
            self.verifier.start(user_id);
            self.reply(
                chat_id,
                "🤖 Welcome to the Fieldbell notification bot!\n\n\
                 🔐 You need to verify before using it.\n\n\
                 👤 Please enter your username:",
            )
            .await;
            return;
        }

        // In a group: already-connected admins get a greeting; otherwise a
        // registered admin connects the group to their record.
        if self.groups.is_authorized_in_group(user_id, chat_id).await {
            self.reply(
                chat_id,
                "✅ Welcome back!\n\n🤖 The bot is ready in this group.\n📝 Use /menu to see what is available.",
            )
            .await;
            return;
        }

        if !self.groups.has_role(user_id, Role::Admin).await {
            self.reply(chat_id, TEXT_NO_ACCESS).await;
            return;
        }

        let title = message.chat.title_or_unnamed().to_string();
        if self.groups.bind(user_id, chat_id, &title).await {
            self.reply(
                chat_id,
                &format!(
                    "✅ Bot connected to {title}!\n\n\
                     🔒 Only registered admins can use the bot here.\n\
                     📝 This group now receives your queued reports.\n\n\
                     Use /menu to see what is available."
                ),
            )
            .await;
        } else {
            self.reply(chat_id, "❌ Could not register this group. Please try again.")
                .await;
        }
    }

    /// `/menu` — show the verified identity and available commands.
    pub(crate) async fn cmd_menu(&self, message: &Message) {
        let Some(user_id) = message.from.as_ref().map(|u| u.id) else {
            return;
        };
        let chat_id = message.chat.id;

        if message.chat.kind() == ChatKind::Group
            && !self.groups.is_authorized_in_group(user_id, chat_id).await
        {
            self.reply(chat_id, TEXT_NO_ACCESS).await;
            return;
        }

        let record = match self.store.find_by_telegram_id(user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                let text = if message.chat.kind() == ChatKind::Private {
                    "❌ You are not verified yet. Use /start to verify first."
                } else {
                    "❌ You are not verified yet. Message the bot privately to verify."
                };
                self.reply(chat_id, text).await;
                return;
            }
            Err(e) => {
                tracing::error!("❌ Record lookup failed for /menu: {e}");
                return;
            }
        };

        let group_line = match record.group_id {
            Some(group_id) => format!("• Connected group: {group_id}"),
            None => "• Connected group: none".to_string(),
        };
        self.reply(
            chat_id,
            &format!(
                "📋 Main menu\n\n\
                 👤 Your info:\n\
                 • Username: {}\n\
                 • Role: {}\n\
                 {group_line}\n\n\
                 🔧 Commands:\n\
                 /start - restart verification\n\
                 /indexmsg - store a report for automatic delivery\n\
                 /status - delivery status\n\
                 /menu - this menu",
                record.user_name,
                record.role.as_str(),
            ),
        )
        .await;
    }

    /// `/indexmsg` — arm indexing mode; the next message becomes the
    /// queued report.
    pub(crate) async fn cmd_indexmsg(&self, message: &Message) {
        let Some(user_id) = message.from.as_ref().map(|u| u.id) else {
            return;
        };
        let chat_id = message.chat.id;

        let origin = match message.chat.kind() {
            ChatKind::Group => {
                if !self.groups.is_authorized_in_group(user_id, chat_id).await {
                    self.reply(chat_id, TEXT_NO_ACCESS).await;
                    return;
                }
                IndexOrigin::Group(chat_id)
            }
            ChatKind::Private => {
                // Admins and waspang operators may both queue reports.
                if !self.is_registered(user_id).await {
                    self.reply(chat_id, TEXT_NO_ACCESS).await;
                    return;
                }
                IndexOrigin::Private
            }
        };

        self.sessions.enter_indexing(user_id, origin);
        self.reply(
            chat_id,
            "📝 Indexing mode on\n\n\
             ✍️ Send the report you want delivered automatically.\n\
             💡 Your next message is stored as the report body.\n\n\
             ❌ Send /cancel to abort.",
        )
        .await;
    }

    /// `/cancel` — leave indexing mode.
    pub(crate) async fn cmd_cancel(&self, message: &Message) {
        let Some(user_id) = message.from.as_ref().map(|u| u.id) else {
            return;
        };
        if self.sessions.cancel_indexing(user_id) {
            self.reply(message.chat.id, "❌ Indexing mode cancelled.").await;
        }
    }

    /// `/status` — the caller's queued report and overall pending count.
    pub(crate) async fn cmd_status(&self, message: &Message) {
        let Some(user_id) = message.from.as_ref().map(|u| u.id) else {
            return;
        };
        let chat_id = message.chat.id;

        if message.chat.kind() == ChatKind::Group {
            if !self.groups.is_authorized_in_group(user_id, chat_id).await {
                self.reply(chat_id, TEXT_NO_ACCESS).await;
                return;
            }
        } else if !self.is_registered(user_id).await {
            self.reply(chat_id, TEXT_NO_ACCESS).await;
            return;
        }

        let record = match self.store.find_by_telegram_id(user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.reply(chat_id, "❌ No record found for your account.").await;
                return;
            }
            Err(e) => {
                tracing::error!("❌ Record lookup failed for /status: {e}");
                return;
            }
        };

        let pending_total = self.dispatcher.pending_count().await.unwrap_or(0);
        let mut text = format!("📊 Delivery status — {}\n\n", record.user_name);
        match record.message_body.as_deref().filter(|b| !b.trim().is_empty()) {
            Some(body) => {
                text.push_str("📝 Stored report: ✅\n");
                text.push_str(if record.is_sent {
                    "📤 Delivery: ✅ sent\n"
                } else {
                    "📤 Delivery: ⏳ pending\n"
                });
                if let Some(sent_at) = record.sent_at {
                    text.push_str(&format!("🕐 Sent at: {}\n", sent_at.to_rfc3339()));
                }
                text.push_str(&format!("\n💬 Preview:\n\"{}\"\n", preview(body)));
            }
            None => {
                text.push_str("📝 Stored report: ❌\n");
                text.push_str("💡 Use /indexmsg to store one.\n");
            }
        }
        text.push_str(&format!("\n🔔 Reports pending system-wide: {pending_total}"));
        self.reply(chat_id, &text).await;
    }
}

/// Greeting sent when the bot joins a group.
pub(crate) fn group_greeting(group_id: i64) -> String {
    format!(
        "✅ The bot has been added to this group!\n\n\
         🔑 Group id: {group_id}\n\
         📝 Use /start to connect your account to this group.\n\
         ❓ Use /menu to see what is available."
    )
}

/// Confirmation after a report is indexed.
pub(crate) fn index_stored(body: &str, origin: IndexOrigin) -> String {
    let target = match origin {
        IndexOrigin::Group(_) => "this group",
        IndexOrigin::Private => "personal chat",
    };
    format!(
        "✅ Report stored!\n\n\
         📝 Target: {target}\n\
         📤 Status: waiting for automatic delivery\n\n\
         💬 Preview:\n\"{}\"\n\n\
         🔔 The report will be sent automatically.",
        preview(body),
    )
}

/// Reply text for a verification outcome; None means stay silent.
pub(crate) fn render_verify_outcome(outcome: &VerifyOutcome) -> Option<String> {
    match outcome {
        VerifyOutcome::NoSession | VerifyOutcome::NotVerifying => None,
        VerifyOutcome::Locked { remaining_secs } => Some(format!(
            "🚫 Too many failed attempts. Try again in {remaining_secs} second(s)."
        )),
        VerifyOutcome::EmptyUsername => {
            Some("❌ Username cannot be empty. Please enter your username:".into())
        }
        VerifyOutcome::PromptRole => {
            Some("Please enter your role (admin/waspang):".into())
        }
        VerifyOutcome::MalformedRole => {
            Some("❌ Role must be \"admin\" or \"waspang\". Please try again:".into())
        }
        VerifyOutcome::Rejected { attempts_left } => Some(format!(
            "❌ Username or role is wrong. {attempts_left} attempt(s) left."
        )),
        VerifyOutcome::LockedOut { wait_secs } => Some(format!(
            "🚫 Too many failed attempts. You are locked out for {wait_secs} second(s)."
        )),
        VerifyOutcome::Verified { username, role } => Some(format!(
            "✅ Verification successful!\n\
             👤 Username: {username}\n\
             🎭 Role: {}\n\n\
             You can now use /indexmsg and /status.",
            role.as_str(),
        )),
    }
}

/// First 100 characters of a report body.
fn preview(body: &str) -> String {
    if body.chars().count() > 100 {
        let cut: String = body.chars().take(100).collect();
        format!("{cut}...")
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_at_100_chars() {
        let short = "short report";
        assert_eq!(preview(short), short);

        let long = "x".repeat(150);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 103);
    }

    #[test]
    fn test_render_outcomes() {
        assert!(render_verify_outcome(&VerifyOutcome::NoSession).is_none());
        assert!(render_verify_outcome(&VerifyOutcome::NotVerifying).is_none());

        let locked = render_verify_outcome(&VerifyOutcome::LockedOut { wait_secs: 15 }).unwrap();
        assert!(locked.contains("15 second"));

        let rejected =
            render_verify_outcome(&VerifyOutcome::Rejected { attempts_left: 2 }).unwrap();
        assert!(rejected.contains("2 attempt"));
    }
}
