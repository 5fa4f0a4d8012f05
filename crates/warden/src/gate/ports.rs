//! Capabilities the gate consumes from the chat platform.

use async_trait::async_trait;
use std::time::Duration;

use warden_common::{ChatId, Challenge, JoiningUser, UserId, WardenError};

/// Restricts, unrestricts and removes chat members.
///
/// Owned by the platform client; the gate never caches membership state.
#[async_trait]
pub trait PermissionGateway: Send + Sync {
    /// Revoke posting rights until further notice
    async fn restrict(&self, chat: ChatId, user: UserId) -> Result<(), WardenError>;

    /// Restore full posting rights
    async fn unrestrict(&self, chat: ChatId, user: UserId) -> Result<(), WardenError>;

    /// Take the user out of the chat
    async fn remove(&self, chat: ChatId, user: UserId) -> Result<(), WardenError>;
}

/// Talks to subjects and administrators
#[async_trait]
pub trait ChallengeChannel: Send + Sync {
    /// Show `challenge` to `user`, returning the id of the message carrying it
    async fn present(
        &self,
        chat: ChatId,
        user: &JoiningUser,
        challenge: &Challenge,
        ttl: Duration,
    ) -> Result<i64, WardenError>;

    /// Answer the submitter of a button press; `alert` shows a dialog
    async fn acknowledge(&self, token: &str, text: &str, alert: bool) -> Result<(), WardenError>;

    /// Post a message in the chat, returning its id
    async fn announce(&self, chat: ChatId, text: &str) -> Result<i64, WardenError>;

    /// Delete messages after `delay` without blocking the caller
    fn delete_later(&self, chat: ChatId, message_ids: Vec<i64>, delay: Duration);

    /// Report a condition an administrator has to resolve
    async fn alert_admins(&self, text: &str);
}
