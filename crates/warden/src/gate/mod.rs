//! Join verification gate.
//!
//! Restricts joining users, challenges them, and either unlocks or
//! removes them. One actor per chat serializes all events of that chat;
//! chats never wait on each other.

mod actor;
mod machine;
mod ports;
mod stats;
mod store;

#[cfg(test)]
mod testing;

pub use ports::{ChallengeChannel, PermissionGateway};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};

use warden_common::constants::{ACTOR_IDLE_SECS, CHAT_MAILBOX_CAPACITY};
use warden_common::{
    AnswerOutcome, ChatId, JoinOutcome, JoiningUser, MetricsSnapshot, PendingVerification, UserId,
    WardenError,
};

use crate::captcha::ChallengeGenerator;
use crate::config::AppConfig;
use actor::{ChatActor, GateDeps, GateEvent};
use stats::GateStats;

/// Gate behaviour derived from configuration
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub max_attempts: u32,
    pub challenge_ttl: Duration,
    pub request_timeout: Duration,
    pub cleanup_delay: Duration,
    pub welcome_message: String,
    /// An actor with no pending records stops after this long without events
    pub actor_idle_timeout: Duration,
}

impl GateSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.verification.max_attempts,
            challenge_ttl: config.verification.challenge_ttl(),
            request_timeout: config.telegram.request_timeout(),
            cleanup_delay: config.verification.cleanup_delay(),
            welcome_message: config.verification.welcome_message.clone(),
            actor_idle_timeout: Duration::from_secs(ACTOR_IDLE_SECS),
        }
    }

    pub fn welcome_for(&self, name: &str) -> String {
        self.welcome_message.replace("{name}", name)
    }
}

/// An answer as delivered by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSubmission {
    /// Subject named by the pressed button
    pub subject: UserId,
    /// User who pressed it
    pub submitter: UserId,
    /// Raw answer text
    pub answer: String,
    /// Token used to reply to the submitter (callback query id)
    pub reply_token: Option<String>,
}

/// Handle to the gate, cheap to clone
#[derive(Clone)]
pub struct VerificationGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    deps: Arc<GateDeps>,
    shutdown: broadcast::Sender<()>,
}

impl VerificationGate {
    pub fn new(
        generator: ChallengeGenerator,
        settings: GateSettings,
        gateway: Arc<dyn PermissionGateway>,
        channel: Arc<dyn ChallengeChannel>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        let deps = Arc::new(GateDeps {
            actors: Mutex::new(HashMap::new()),
            gateway,
            channel,
            generator,
            settings,
            stats: Arc::new(GateStats::default()),
        });

        Self {
            inner: Arc::new(GateInner {
                deps,
                shutdown,
            }),
        }
    }

    /// A user joined `chat`: restrict and challenge them
    pub async fn on_user_joined(
        &self,
        chat: ChatId,
        user: JoiningUser,
    ) -> Result<JoinOutcome, WardenError> {
        self.request(chat, |reply| GateEvent::Joined { user, reply })
            .await
    }

    /// Someone pressed an answer button in `chat`
    pub async fn on_answer_submitted(
        &self,
        chat: ChatId,
        submission: AnswerSubmission,
    ) -> Result<AnswerOutcome, WardenError> {
        self.request(chat, |reply| GateEvent::Answer { submission, reply })
            .await
    }

    /// Deadline of `challenge_id` passed; returns true if the subject was removed.
    ///
    /// Timers armed by the gate deliver this on their own; the method is
    /// exposed for callers that track deadlines externally.
    pub async fn on_deadline_elapsed(
        &self,
        chat: ChatId,
        subject: UserId,
        challenge_id: u64,
    ) -> Result<bool, WardenError> {
        self.request(chat, |reply| GateEvent::DeadlineElapsed {
            subject,
            challenge_id,
            reply: Some(reply),
        })
        .await
    }

    /// Admin override: verify `subject` without an answer
    pub async fn approve(&self, chat: ChatId, subject: UserId) -> Result<bool, WardenError> {
        self.request(chat, |reply| GateEvent::Approve { subject, reply })
            .await
    }

    /// Forget `subject`'s pending verification without unrestricting or
    /// removing them. Used when an administrator takes over moderation.
    pub async fn dismiss(&self, chat: ChatId, subject: UserId) -> Result<bool, WardenError> {
        self.request(chat, |reply| GateEvent::Dismiss { subject, reply })
            .await
    }

    /// Records currently pending in `chat`, oldest first.
    ///
    /// Does not start an actor for a chat the gate has not seen.
    pub async fn pending(&self, chat: ChatId) -> Result<Vec<PendingVerification>, WardenError> {
        let running = {
            let actors = self.inner.deps.actors.lock().await;
            actors.get(&chat).is_some_and(|sender| !sender.is_closed())
        };
        if !running {
            return Ok(Vec::new());
        }
        self.request(chat, |reply| GateEvent::Pending { reply }).await
    }

    /// Pending records across all chats
    pub fn pending_count(&self) -> u64 {
        self.inner.deps.stats.pending()
    }

    pub fn snapshot(&self, uptime_secs: u64) -> MetricsSnapshot {
        self.inner.deps.stats.snapshot(uptime_secs)
    }

    async fn request<T>(
        &self,
        chat: ChatId,
        event: impl FnOnce(oneshot::Sender<T>) -> GateEvent,
    ) -> Result<T, WardenError> {
        let (reply, response) = oneshot::channel();
        let mailbox = self.mailbox(chat).await;

        mailbox
            .send(event(reply))
            .await
            .map_err(|_| WardenError::ChannelClosed(format!("verification actor for chat {chat}")))?;

        response
            .await
            .map_err(|_| WardenError::ChannelClosed(format!("verification actor for chat {chat}")))
    }

    /// Get the chat's mailbox, spawning its actor on first use.
    ///
    /// The returned clone keeps an idle actor from retiring until dropped.
    async fn mailbox(&self, chat: ChatId) -> mpsc::Sender<GateEvent> {
        let mut actors = self.inner.deps.actors.lock().await;

        if let Some(sender) = actors.get(&chat) {
            if !sender.is_closed() {
                return sender.clone();
            }
        }

        let (sender, events) = mpsc::channel(CHAT_MAILBOX_CAPACITY);
        let actor = ChatActor::new(chat, self.inner.deps.clone(), sender.downgrade());
        let shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(actor.run(events, shutdown));

        actors.insert(chat, sender.clone());
        sender
    }
}
