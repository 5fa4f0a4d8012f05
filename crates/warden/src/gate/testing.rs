//! Recording platform double for gate tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use warden_common::{ChatId, Challenge, JoiningUser, UserId, WardenError};

use super::ports::{ChallengeChannel, PermissionGateway};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Restrict(ChatId, UserId),
    Unrestrict(ChatId, UserId),
    Remove(ChatId, UserId),
    Present {
        chat: ChatId,
        user: UserId,
        challenge: Challenge,
    },
    Ack {
        token: String,
        text: String,
        alert: bool,
    },
    Announce(ChatId, String),
    DeleteLater(ChatId, Vec<i64>),
    Alert(String),
}

#[derive(Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<Call>>,
    next_message: AtomicI64,
    fail_restrict: AtomicBool,
    fail_remove: AtomicBool,
    fail_present: AtomicBool,
    hang_restrict: AtomicBool,
}

impl RecordingPlatform {
    pub fn fail_restrict(&self, on: bool) {
        self.fail_restrict.store(on, Ordering::SeqCst);
    }

    pub fn fail_remove(&self, on: bool) {
        self.fail_remove.store(on, Ordering::SeqCst);
    }

    pub fn fail_present(&self, on: bool) {
        self.fail_present.store(on, Ordering::SeqCst);
    }

    pub fn hang_restrict(&self, on: bool) {
        self.hang_restrict.store(on, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    /// Last challenge shown to `user` in `chat`
    pub fn challenge_for(&self, chat: ChatId, user: UserId) -> Option<Challenge> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|c| match c {
                Call::Present {
                    chat: c_chat,
                    user: c_user,
                    challenge,
                } if *c_chat == chat && *c_user == user => Some(challenge.clone()),
                _ => None,
            })
    }

    pub fn announced(&self, chat: ChatId) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Announce(c_chat, text) if *c_chat == chat => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn message_id(&self) -> i64 {
        self.next_message.fetch_add(1, Ordering::SeqCst) + 100
    }
}

#[async_trait]
impl PermissionGateway for RecordingPlatform {
    async fn restrict(&self, chat: ChatId, user: UserId) -> Result<(), WardenError> {
        self.record(Call::Restrict(chat, user));
        if self.hang_restrict.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_restrict.load(Ordering::SeqCst) {
            return Err(WardenError::telegram("restrictChatMember", "not enough rights"));
        }
        Ok(())
    }

    async fn unrestrict(&self, chat: ChatId, user: UserId) -> Result<(), WardenError> {
        self.record(Call::Unrestrict(chat, user));
        Ok(())
    }

    async fn remove(&self, chat: ChatId, user: UserId) -> Result<(), WardenError> {
        self.record(Call::Remove(chat, user));
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(WardenError::telegram("banChatMember", "not enough rights"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChallengeChannel for RecordingPlatform {
    async fn present(
        &self,
        chat: ChatId,
        user: &JoiningUser,
        challenge: &Challenge,
        _ttl: Duration,
    ) -> Result<i64, WardenError> {
        if self.fail_present.load(Ordering::SeqCst) {
            return Err(WardenError::telegram("sendMessage", "chat not found"));
        }
        self.record(Call::Present {
            chat,
            user: user.id,
            challenge: challenge.clone(),
        });
        Ok(self.message_id())
    }

    async fn acknowledge(&self, token: &str, text: &str, alert: bool) -> Result<(), WardenError> {
        self.record(Call::Ack {
            token: token.to_string(),
            text: text.to_string(),
            alert,
        });
        Ok(())
    }

    async fn announce(&self, chat: ChatId, text: &str) -> Result<i64, WardenError> {
        self.record(Call::Announce(chat, text.to_string()));
        Ok(self.message_id())
    }

    fn delete_later(&self, chat: ChatId, message_ids: Vec<i64>, _delay: Duration) {
        self.record(Call::DeleteLater(chat, message_ids));
    }

    async fn alert_admins(&self, text: &str) {
        self.record(Call::Alert(text.to_string()));
    }
}
