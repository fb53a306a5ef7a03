//! Telegram gateway — reqwest client over the Bot API.

use async_trait::async_trait;
use fieldbell_core::error::{FieldbellError, Result};
use fieldbell_core::traits::{GatewayError, MessagingGateway};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::api::{ApiResponse, ChatMember, Update, User};

/// Request timeout for ordinary API calls. Long polling gets a wider one
/// so the server-side wait (30 s) can complete.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_TIMEOUT: Duration = Duration::from_secs(40);

/// Telegram gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_poll_interval() -> u64 {
    1
}

/// Bot API client. Cheap to clone (reqwest client is an Arc internally).
#[derive(Clone)]
pub struct TelegramGateway {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramGateway {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.config.bot_token, method
        )
    }

    /// POST one API method and unwrap the `ok`/`result` envelope.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        chat_id: i64,
        timeout: Duration,
    ) -> std::result::Result<T, GatewayError> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| GatewayError::Other(format!("{method} failed: {e}")))?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Other(format!("invalid {method} response: {e}")))?;

        if !body.ok {
            return Err(classify_api_error(
                chat_id,
                body.description.unwrap_or_default(),
            ));
        }
        body.result
            .ok_or_else(|| GatewayError::Other(format!("{method}: empty result")))
    }

    /// Fetch updates past `offset` using long polling. Returns the updates
    /// and the offset to use on the next call.
    pub async fn get_updates(&self, offset: i64) -> Result<(Vec<Update>, i64)> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": 30,
            "allowed_updates": ["message", "my_chat_member"],
        });
        let updates: Vec<Update> = self
            .call("getUpdates", &body, 0, POLL_TIMEOUT)
            .await
            .map_err(FieldbellError::from)?;
        let next_offset = updates
            .last()
            .map(|u| u.update_id + 1)
            .unwrap_or(offset);
        Ok((updates, next_offset))
    }

    /// Bot identity — used as a startup probe.
    pub async fn get_me(&self) -> Result<User> {
        let me: User = self
            .call("getMe", &serde_json::json!({}), 0, CALL_TIMEOUT)
            .await
            .map_err(FieldbellError::from)?;
        Ok(me)
    }

    /// Register the command menu shown by Telegram clients.
    pub async fn set_my_commands(&self, commands: &[(&str, &str)]) -> Result<()> {
        let list: Vec<serde_json::Value> = commands
            .iter()
            .map(|(name, description)| {
                serde_json::json!({ "command": name, "description": description })
            })
            .collect();
        let body = serde_json::json!({ "commands": list });
        let _: serde_json::Value = self
            .call("setMyCommands", &body, 0, CALL_TIMEOUT)
            .await
            .map_err(FieldbellError::from)?;
        Ok(())
    }

    /// Spawn the long-poll loop and return the update stream.
    pub fn start_polling(&self) -> UpdateStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let gateway = self.clone();
        let poll_interval = self.config.poll_interval;

        tokio::spawn(async move {
            let mut offset = 0i64;
            tracing::info!("Telegram polling loop started");

            loop {
                match gateway.get_updates(offset).await {
                    Ok((updates, next_offset)) => {
                        offset = next_offset;
                        for update in updates {
                            if tx.send(update).is_err() {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }

                tokio::time::sleep(Duration::from_secs(poll_interval)).await;
            }
        });

        UpdateStream { rx }
    }
}

/// Stream of inbound updates from the polling task.
pub struct UpdateStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<Update>,
}

impl Stream for UpdateStream {
    type Item = Update;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Unpin for UpdateStream {}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send_message(&self, chat_id: i64, text: &str) -> std::result::Result<(), GatewayError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let _: serde_json::Value = self.call("sendMessage", &body, chat_id, CALL_TIMEOUT).await?;
        Ok(())
    }

    async fn get_chat(&self, chat_id: i64) -> std::result::Result<(), GatewayError> {
        let body = serde_json::json!({ "chat_id": chat_id });
        let _: serde_json::Value = self.call("getChat", &body, chat_id, CALL_TIMEOUT).await?;
        Ok(())
    }

    async fn get_chat_administrators(
        &self,
        group_id: i64,
    ) -> std::result::Result<Vec<i64>, GatewayError> {
        let body = serde_json::json!({ "chat_id": group_id });
        let members: Vec<ChatMember> = self
            .call("getChatAdministrators", &body, group_id, CALL_TIMEOUT)
            .await?;
        Ok(members.into_iter().map(|m| m.user.id).collect())
    }
}

/// Map a Bot API error description onto the gateway error taxonomy.
/// Telegram reports "no longer in the chat" in several phrasings.
fn classify_api_error(chat_id: i64, description: String) -> GatewayError {
    let lower = description.to_lowercase();
    let chat_gone = lower.contains("bot was kicked")
        || lower.contains("chat not found")
        || lower.contains("bot is not a member")
        || lower.contains("group chat was deleted")
        || lower.contains("chat was deactivated");
    if chat_gone {
        GatewayError::ChatInaccessible(chat_id)
    } else {
        GatewayError::Other(format!("telegram API error: {description}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_chat_gone_descriptions() {
        for desc in [
            "Forbidden: bot was kicked from the supergroup chat",
            "Bad Request: chat not found",
            "Forbidden: bot is not a member of the supergroup chat",
            "Forbidden: the group chat was deleted",
        ] {
            let err = classify_api_error(-100, desc.to_string());
            assert!(err.is_chat_gone(), "expected chat-gone for {desc:?}");
        }
    }

    #[test]
    fn test_classify_other_failures_are_retryable() {
        // Blocked by a user is a personal-delivery failure, not a dead group
        let err = classify_api_error(42, "Forbidden: bot was blocked by the user".into());
        assert!(!err.is_chat_gone());

        let err = classify_api_error(42, "Too Many Requests: retry after 30".into());
        assert!(!err.is_chat_gone());
    }
}
