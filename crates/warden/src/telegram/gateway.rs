//! Telegram implementation of the gate's platform ports.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use warden_common::{ChatId, Challenge, JoiningUser, UserId, WardenError};

use super::client::TelegramClient;
use super::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use crate::captcha::encode_callback;
use crate::config::RemovalMode;
use crate::gate::{ChallengeChannel, PermissionGateway};

/// Buttons per keyboard row
const BUTTONS_PER_ROW: usize = 2;

pub struct TelegramGateway {
    client: Arc<TelegramClient>,
    removal: RemovalMode,
    admin_chat: Option<ChatId>,
}

impl TelegramGateway {
    pub fn new(client: Arc<TelegramClient>, removal: RemovalMode, admin_chat: Option<ChatId>) -> Self {
        Self {
            client,
            removal,
            admin_chat,
        }
    }
}

#[async_trait]
impl PermissionGateway for TelegramGateway {
    async fn restrict(&self, chat: ChatId, user: UserId) -> Result<(), WardenError> {
        self.client.restrict_chat_member(chat, user, None).await
    }

    async fn unrestrict(&self, chat: ChatId, user: UserId) -> Result<(), WardenError> {
        self.client.unrestrict_chat_member(chat, user).await
    }

    /// The user is out once the ban succeeds. A failed unban in kick mode
    /// leaves them banned, which is reported on its own.
    async fn remove(&self, chat: ChatId, user: UserId) -> Result<(), WardenError> {
        self.client.ban_chat_member(chat, user).await?;
        if self.removal == RemovalMode::Kick {
            if let Err(e) = self.client.unban_chat_member(chat, user).await {
                warn!(chat_id = %chat, user_id = %user, error = %e, "Kick left the user banned");
                let text = format!(
                    "⚠️ Removed user {user} from chat {chat}, but could not lift the ban ({e}). They cannot rejoin until unbanned."
                );
                self.alert_admins(&text).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChallengeChannel for TelegramGateway {
    async fn present(
        &self,
        chat: ChatId,
        user: &JoiningUser,
        challenge: &Challenge,
        ttl: Duration,
    ) -> Result<i64, WardenError> {
        let text = challenge_text(user, challenge, ttl);
        let keyboard = challenge_keyboard(user.id, challenge);
        self.client
            .send_message_with_keyboard(chat, &text, &keyboard)
            .await
    }

    async fn acknowledge(&self, token: &str, text: &str, alert: bool) -> Result<(), WardenError> {
        self.client.answer_callback_query(token, text, alert).await
    }

    async fn announce(&self, chat: ChatId, text: &str) -> Result<i64, WardenError> {
        self.client.send_message(chat, text).await
    }

    fn delete_later(&self, chat: ChatId, message_ids: Vec<i64>, delay: Duration) {
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for message_id in message_ids {
                match client.delete_message(chat, message_id).await {
                    Ok(()) => debug!(chat_id = %chat, message_id, "Cleanup message deleted"),
                    Err(e) => debug!(chat_id = %chat, message_id, error = %e, "Failed to delete cleanup message"),
                }
            }
        });
    }

    async fn alert_admins(&self, text: &str) {
        let Some(admin_chat) = self.admin_chat else {
            warn!(alert = %text, "No admin chat configured, alert only logged");
            return;
        };
        if let Err(e) = self.client.send_message(admin_chat, text).await {
            error!(chat_id = %admin_chat, error = %e, "Failed to deliver admin alert");
        }
    }
}

/// Prompt shown above the answer buttons
pub fn challenge_text(user: &JoiningUser, challenge: &Challenge, ttl: Duration) -> String {
    format!(
        "Welcome, {}! Before you can write here, please answer within {} seconds:\n\n{}",
        user.display_name,
        ttl.as_secs(),
        challenge.prompt
    )
}

/// One button per option, each carrying the subject id and its value
pub fn challenge_keyboard(subject: UserId, challenge: &Challenge) -> InlineKeyboardMarkup {
    let inline_keyboard = challenge
        .options
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            row.iter()
                .map(|option| InlineKeyboardButton {
                    text: option.to_string(),
                    callback_data: encode_callback(subject, *option),
                })
                .collect()
        })
        .collect();

    InlineKeyboardMarkup { inline_keyboard }
}
