//! Thin Bot API client over `reqwest`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use warden_common::{ChatId, UserId, WardenError};

use super::types::{
    ChatMember, ChatPermissions, InlineKeyboardMarkup, Message, TelegramResponse, Update, User,
};
use crate::config::TelegramConfig;

/// Update kinds requested from `getUpdates`. `chat_member` is only
/// delivered when asked for explicitly.
const ALLOWED_UPDATES: [&str; 3] = ["message", "callback_query", "chat_member"];

#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    /// `<api_url>/bot<token>`, never logged
    base_url: String,
    request_timeout: Duration,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, WardenError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|e| WardenError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), config.token),
            request_timeout: config.request_timeout(),
        })
    }

    /// Call `method` with a JSON payload and unwrap the Bot API envelope
    pub async fn send_request<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<T, WardenError> {
        self.send_with_timeout(method, payload, self.request_timeout)
            .await
    }

    async fn send_with_timeout<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<T, WardenError> {
        debug!(method, "Calling Bot API");

        let response = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        // error replies carry a JSON body too, whatever the status
        let body: TelegramResponse<T> = response
            .json()
            .await
            .map_err(|e| transport_error(method, e))?;

        unwrap_response(method, body)
    }

    pub async fn get_me(&self) -> Result<User, WardenError> {
        self.send_request("getMe", json!({})).await
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(
        &self,
        offset: i64,
        poll_timeout: Duration,
    ) -> Result<Vec<Update>, WardenError> {
        let payload = json!({
            "offset": offset,
            "timeout": poll_timeout.as_secs(),
            "allowed_updates": ALLOWED_UPDATES,
        });
        // the server holds the request for up to `poll_timeout`
        self.send_with_timeout("getUpdates", payload, poll_timeout + self.request_timeout)
            .await
    }

    pub async fn send_message(&self, chat: ChatId, text: &str) -> Result<i64, WardenError> {
        let payload = json!({
            "chat_id": chat.0,
            "text": text,
            "disable_notification": true,
        });
        let message: Message = self.send_request("sendMessage", payload).await?;
        Ok(message.message_id)
    }

    pub async fn send_message_with_keyboard(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: &InlineKeyboardMarkup,
    ) -> Result<i64, WardenError> {
        let payload = json!({
            "chat_id": chat.0,
            "text": text,
            "reply_markup": keyboard,
        });
        let message: Message = self.send_request("sendMessage", payload).await?;
        Ok(message.message_id)
    }

    /// Revoke all sending rights; `until` of `None` means until lifted
    pub async fn restrict_chat_member(
        &self,
        chat: ChatId,
        user: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), WardenError> {
        let payload = json!({
            "chat_id": chat.0,
            "user_id": user.0,
            "permissions": ChatPermissions::all(false),
            "use_independent_chat_permissions": true,
            "until_date": until.map(|t| t.timestamp()).unwrap_or(0),
        });
        let _: bool = self.send_request("restrictChatMember", payload).await?;
        Ok(())
    }

    pub async fn unrestrict_chat_member(&self, chat: ChatId, user: UserId) -> Result<(), WardenError> {
        let payload = json!({
            "chat_id": chat.0,
            "user_id": user.0,
            "permissions": ChatPermissions::all(true),
            "use_independent_chat_permissions": true,
        });
        let _: bool = self.send_request("restrictChatMember", payload).await?;
        Ok(())
    }

    pub async fn ban_chat_member(&self, chat: ChatId, user: UserId) -> Result<(), WardenError> {
        let payload = json!({
            "chat_id": chat.0,
            "user_id": user.0,
            "revoke_messages": true,
        });
        let _: bool = self.send_request("banChatMember", payload).await?;
        Ok(())
    }

    pub async fn unban_chat_member(&self, chat: ChatId, user: UserId) -> Result<(), WardenError> {
        let payload = json!({
            "chat_id": chat.0,
            "user_id": user.0,
            "only_if_banned": true,
        });
        let _: bool = self.send_request("unbanChatMember", payload).await?;
        Ok(())
    }

    pub async fn delete_message(&self, chat: ChatId, message_id: i64) -> Result<(), WardenError> {
        let payload = json!({
            "chat_id": chat.0,
            "message_id": message_id,
        });
        let _: bool = self.send_request("deleteMessage", payload).await?;
        Ok(())
    }

    pub async fn answer_callback_query(
        &self,
        query_id: &str,
        text: &str,
        show_alert: bool,
    ) -> Result<(), WardenError> {
        let payload = json!({
            "callback_query_id": query_id,
            "text": text,
            "show_alert": show_alert,
        });
        let _: bool = self.send_request("answerCallbackQuery", payload).await?;
        Ok(())
    }

    pub async fn get_chat_member(&self, chat: ChatId, user: UserId) -> Result<ChatMember, WardenError> {
        let payload = json!({
            "chat_id": chat.0,
            "user_id": user.0,
        });
        self.send_request("getChatMember", payload).await
    }
}

/// Map a transport failure, stripping the URL since it contains the token
fn transport_error(method: &str, err: reqwest::Error) -> WardenError {
    if err.is_timeout() {
        WardenError::Timeout(method.to_string())
    } else {
        WardenError::Http(format!("{method}: {}", err.without_url()))
    }
}

fn unwrap_response<T>(method: &str, body: TelegramResponse<T>) -> Result<T, WardenError> {
    match (body.ok, body.result) {
        (true, Some(result)) => Ok(result),
        (true, None) => Err(WardenError::telegram(method, "response without result")),
        (false, _) => Err(WardenError::telegram(
            method,
            body.description
                .unwrap_or_else(|| format!("error code {}", body.error_code.unwrap_or_default())),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::fake::FakeBotApi;
    use tokio_test::{assert_err, assert_ok};

    fn client(api_url: &str) -> TelegramClient {
        let config = TelegramConfig {
            token: "123:abc".to_string(),
            api_url: api_url.to_string(),
            ..Default::default()
        };
        TelegramClient::new(&config).unwrap()
    }

    #[test]
    fn test_unwrap_response_variants() {
        let ok = TelegramResponse {
            ok: true,
            result: Some(true),
            description: None,
            error_code: None,
        };
        assert!(assert_ok!(unwrap_response("deleteMessage", ok)));

        let failed: TelegramResponse<bool> = TelegramResponse {
            ok: false,
            result: None,
            description: Some("Bad Request: message to delete not found".into()),
            error_code: Some(400),
        };
        let err = assert_err!(unwrap_response("deleteMessage", failed));
        assert!(err.to_string().contains("message to delete not found"));
    }

    #[test]
    fn test_base_url_strips_trailing_slash() {
        let client = client("https://api.telegram.org/");
        assert_eq!(client.base_url, "https://api.telegram.org/bot123:abc");
    }

    #[tokio::test]
    async fn test_round_trip_against_fake_api() {
        let api = FakeBotApi::start().await;
        let client = client(&api.url);

        let me = assert_ok!(client.get_me().await);
        assert_eq!(me.id, 99);

        let message_id = assert_ok!(client.send_message(ChatId(-1001), "hello").await);
        assert_eq!(message_id, 500);
        assert_eq!(api.calls("sendMessage")[0]["text"], "hello");

        assert_ok!(client.delete_message(ChatId(-1001), 500).await);
        assert_eq!(api.calls("deleteMessage")[0]["message_id"], 500);
    }

    #[tokio::test]
    async fn test_restrict_payloads() {
        let api = FakeBotApi::start().await;
        let client = client(&api.url);

        assert_ok!(client.restrict_chat_member(ChatId(-1001), UserId(7), None).await);
        assert_ok!(client.unrestrict_chat_member(ChatId(-1001), UserId(7)).await);

        let calls = api.calls("restrictChatMember");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0]["until_date"], 0);
        assert_eq!(calls[0]["permissions"]["can_send_messages"], false);
        assert_eq!(calls[1]["permissions"]["can_send_messages"], true);
    }

    #[tokio::test]
    async fn test_api_error_is_typed() {
        let api = FakeBotApi::start_failing(&["banChatMember"]).await;
        let client = client(&api.url);

        let err = assert_err!(client.ban_chat_member(ChatId(-1001), UserId(7)).await);
        match err {
            WardenError::Telegram { method, description } => {
                assert_eq!(method, "banChatMember");
                assert!(description.contains("not enough rights"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_api_hides_token() {
        // nothing listens on port 9 of localhost
        let client = client("http://127.0.0.1:9");
        let err = assert_err!(client.get_me().await);
        assert!(!err.to_string().contains("123:abc"));
    }
}
