//! Per-chat verification actor.
//!
//! Each chat gets one task that owns its [`VerificationMachine`] and
//! processes events strictly one after another, so a subject's record is
//! never touched concurrently. Deadline timers are separate one-shot tasks
//! that post back into the mailbox through a weak handle. An actor whose
//! chat has nothing pending leaves the registry after a quiet period and is
//! spawned again on the next event.

use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use warden_common::{
    AnswerOutcome, ChatId, JoinOutcome, JoiningUser, PendingVerification, RemovalReason, UserId,
    WardenError,
};

use super::machine::{Admission, Submission, VerificationMachine, VerificationPolicy};
use super::ports::{ChallengeChannel, PermissionGateway};
use super::stats::GateStats;
use super::{AnswerSubmission, GateSettings};
use crate::captcha::ChallengeGenerator;

/// Live actor mailboxes by chat
pub(crate) type ActorRegistry = Mutex<HashMap<ChatId, mpsc::Sender<GateEvent>>>;

/// Everything an actor needs besides its own state
pub(crate) struct GateDeps {
    pub actors: ActorRegistry,
    pub gateway: Arc<dyn PermissionGateway>,
    pub channel: Arc<dyn ChallengeChannel>,
    pub generator: ChallengeGenerator,
    pub settings: GateSettings,
    pub stats: Arc<GateStats>,
}

/// Messages delivered to a chat actor
pub(crate) enum GateEvent {
    Joined {
        user: JoiningUser,
        reply: oneshot::Sender<JoinOutcome>,
    },
    Answer {
        submission: AnswerSubmission,
        reply: oneshot::Sender<AnswerOutcome>,
    },
    Approve {
        subject: UserId,
        reply: oneshot::Sender<bool>,
    },
    Dismiss {
        subject: UserId,
        reply: oneshot::Sender<bool>,
    },
    DeadlineElapsed {
        subject: UserId,
        challenge_id: u64,
        reply: Option<oneshot::Sender<bool>>,
    },
    Pending {
        reply: oneshot::Sender<Vec<PendingVerification>>,
    },
}

pub(crate) struct ChatActor {
    chat: ChatId,
    machine: VerificationMachine,
    timers: HashMap<UserId, JoinHandle<()>>,
    deps: Arc<GateDeps>,
    mailbox: mpsc::WeakSender<GateEvent>,
}

impl ChatActor {
    pub fn new(chat: ChatId, deps: Arc<GateDeps>, mailbox: mpsc::WeakSender<GateEvent>) -> Self {
        let policy = VerificationPolicy {
            max_attempts: deps.settings.max_attempts,
            challenge_ttl: chrono::Duration::seconds(deps.settings.challenge_ttl.as_secs() as i64),
        };
        Self {
            chat,
            machine: VerificationMachine::new(chat, policy),
            timers: HashMap::new(),
            deps,
            mailbox,
        }
    }

    /// Process events until every sender is gone or shutdown is signalled
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<GateEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        debug!(chat_id = %self.chat, "Verification actor started");

        let idle_timeout = self.deps.settings.actor_idle_timeout;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = tokio::time::sleep(idle_timeout), if self.machine.len() == 0 => {
                    if self.try_retire(&events).await {
                        debug!(chat_id = %self.chat, "Idle verification actor retired");
                        break;
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        self.deps.stats.adjust_pending(-(self.machine.len() as i64));

        debug!(chat_id = %self.chat, pending = self.machine.len(), "Verification actor stopped");
    }

    /// Leave the registry if nobody can still reach the mailbox.
    ///
    /// Requests clone the sender under the registry lock, so a strong count
    /// of one (the registry's) and an empty queue mean no event is in flight.
    async fn try_retire(&self, events: &mpsc::Receiver<GateEvent>) -> bool {
        let mut actors = self.deps.actors.lock().await;
        if self.mailbox.strong_count() > 1 || !events.is_empty() {
            return false;
        }
        if actors
            .get(&self.chat)
            .is_some_and(|sender| self.mailbox.upgrade().is_some_and(|own| own.same_channel(sender)))
        {
            actors.remove(&self.chat);
        }
        true
    }

    async fn handle(&mut self, event: GateEvent) {
        let before = self.machine.len() as i64;

        match event {
            GateEvent::Joined { user, reply } => {
                let outcome = self.on_joined(user).await;
                let _ = reply.send(outcome);
            }
            GateEvent::Answer { submission, reply } => {
                let outcome = self.on_answer(submission).await;
                let _ = reply.send(outcome);
            }
            GateEvent::Approve { subject, reply } => {
                let approved = self.on_approve(subject).await;
                let _ = reply.send(approved);
            }
            GateEvent::Dismiss { subject, reply } => {
                let dismissed = self.on_dismiss(subject);
                let _ = reply.send(dismissed);
            }
            GateEvent::DeadlineElapsed {
                subject,
                challenge_id,
                reply,
            } => {
                let removed = self.on_deadline(subject, challenge_id).await;
                if let Some(reply) = reply {
                    let _ = reply.send(removed);
                }
            }
            GateEvent::Pending { reply } => {
                let mut records: Vec<_> = self.machine.records().cloned().collect();
                records.sort_by_key(|r| r.issued_at);
                let _ = reply.send(records);
            }
        }

        self.deps.stats.adjust_pending(self.machine.len() as i64 - before);
    }

    async fn on_joined(&mut self, user: JoiningUser) -> JoinOutcome {
        GateStats::incr(&self.deps.stats.joins);
        let started = Instant::now();

        let challenge = {
            let mut rng = rand::rng();
            self.deps.generator.generate(&mut rng)
        };

        let record = match self.machine.admit(&user, &challenge, Utc::now()) {
            Admission::Admitted(record) => record,
            Admission::AlreadyPending => {
                debug!(chat_id = %self.chat, user_id = %user.id, "Join ignored, challenge already running");
                return JoinOutcome::AlreadyPending;
            }
        };

        if let Err(e) = self.bounded("restrict", self.deps.gateway.restrict(self.chat, user.id)).await {
            self.machine.abandon(user.id);
            self.report_failure("restrict", &user.display_name, user.id, &e).await;
            return JoinOutcome::Aborted {
                reason: e.to_string(),
            };
        }

        let ttl = self.deps.settings.challenge_ttl;
        let presented = self
            .bounded("present", self.deps.channel.present(self.chat, &user, &challenge, ttl))
            .await;
        match presented {
            Ok(message_id) => {
                self.machine.attach_message(user.id, message_id);
            }
            Err(e) => {
                self.machine.abandon(user.id);
                self.report_failure("show the challenge to", &user.display_name, user.id, &e)
                    .await;
                if let Err(e) = self
                    .bounded("unrestrict", self.deps.gateway.unrestrict(self.chat, user.id))
                    .await
                {
                    self.report_failure("unrestrict", &user.display_name, user.id, &e).await;
                }
                return JoinOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        }

        self.schedule_deadline(user.id, record.challenge_id, started + ttl);
        GateStats::incr(&self.deps.stats.challenges_issued);

        info!(
            chat_id = %self.chat,
            user_id = %user.id,
            challenge_id = record.challenge_id,
            "Challenge issued"
        );

        JoinOutcome::Challenged {
            challenge_id: record.challenge_id,
            deadline: record.deadline,
        }
    }

    async fn on_answer(&mut self, submission: AnswerSubmission) -> AnswerOutcome {
        let AnswerSubmission {
            subject,
            submitter,
            answer,
            reply_token,
        } = submission;

        match self.machine.submit(submitter, subject, &answer, Utc::now()) {
            Submission::Unauthorized => {
                GateStats::incr(&self.deps.stats.unauthorized);
                warn!(
                    chat_id = %self.chat,
                    user_id = %subject,
                    submitter = %submitter,
                    "Rejected answer from someone other than the subject"
                );
                self.acknowledge(reply_token.as_deref(), "This challenge is not for you.", true)
                    .await;
                AnswerOutcome::Unauthorized
            }
            Submission::Expired => {
                GateStats::incr(&self.deps.stats.expired_sessions);
                debug!(chat_id = %self.chat, user_id = %subject, "Answer for expired session");
                self.acknowledge(
                    reply_token.as_deref(),
                    "This verification session has expired.",
                    true,
                )
                .await;
                AnswerOutcome::Expired
            }
            Submission::Retry {
                attempts,
                remaining,
            } => {
                info!(
                    chat_id = %self.chat,
                    user_id = %subject,
                    attempts,
                    remaining,
                    "Wrong answer"
                );
                let text = format!("Wrong answer. {remaining} attempt(s) left.");
                self.acknowledge(reply_token.as_deref(), &text, true).await;
                AnswerOutcome::Retry {
                    attempts,
                    remaining,
                }
            }
            Submission::Verified(record) => {
                self.cancel_timer(subject);
                self.acknowledge(reply_token.as_deref(), "Correct, welcome!", false)
                    .await;
                self.finish_verified(record, false).await;
                AnswerOutcome::Verified
            }
            Submission::Exhausted(record) => {
                self.cancel_timer(subject);
                self.acknowledge(reply_token.as_deref(), "Wrong answer. No attempts left.", true)
                    .await;
                self.finish_removed(record, RemovalReason::AttemptsExhausted)
                    .await;
                AnswerOutcome::Removed {
                    reason: RemovalReason::AttemptsExhausted,
                }
            }
            Submission::DeadlinePassed(record) => {
                self.cancel_timer(subject);
                self.acknowledge(
                    reply_token.as_deref(),
                    "This verification session has expired.",
                    true,
                )
                .await;
                self.finish_removed(record, RemovalReason::DeadlineElapsed)
                    .await;
                AnswerOutcome::Removed {
                    reason: RemovalReason::DeadlineElapsed,
                }
            }
        }
    }

    async fn on_approve(&mut self, subject: UserId) -> bool {
        let Some(record) = self.machine.approve(subject) else {
            return false;
        };
        self.cancel_timer(subject);
        self.finish_verified(record, true).await;
        true
    }

    /// Drop the record without touching the subject's permissions
    fn on_dismiss(&mut self, subject: UserId) -> bool {
        let Some(record) = self.machine.abandon(subject) else {
            return false;
        };
        self.cancel_timer(subject);
        info!(
            chat_id = %self.chat,
            user_id = %subject,
            challenge_id = record.challenge_id,
            "Pending verification dismissed"
        );
        self.cleanup(record.challenge_message.into_iter().collect());
        true
    }

    async fn on_deadline(&mut self, subject: UserId, challenge_id: u64) -> bool {
        let Some(record) = self.machine.expire(subject, challenge_id) else {
            debug!(
                chat_id = %self.chat,
                user_id = %subject,
                challenge_id,
                "Stale deadline ignored"
            );
            return false;
        };
        self.timers.remove(&subject);
        self.finish_removed(record, RemovalReason::DeadlineElapsed)
            .await;
        true
    }

    async fn finish_verified(&mut self, record: PendingVerification, approved: bool) {
        let mut cleanup: Vec<i64> = record.challenge_message.into_iter().collect();

        let text = match self
            .bounded("unrestrict", self.deps.gateway.unrestrict(self.chat, record.subject))
            .await
        {
            Ok(()) => {
                if approved {
                    GateStats::incr(&self.deps.stats.approved);
                } else {
                    GateStats::incr(&self.deps.stats.verified);
                }
                info!(
                    chat_id = %self.chat,
                    user_id = %record.subject,
                    approved,
                    "Subject verified"
                );
                self.deps.settings.welcome_for(&record.display_name)
            }
            Err(e) => {
                self.report_failure("unrestrict", &record.display_name, record.subject, &e)
                    .await;
                format!(
                    "{} passed verification, but I could not lift the restriction. An administrator has been notified.",
                    record.display_name
                )
            }
        };

        if let Some(message_id) = self.announce(&text).await {
            cleanup.push(message_id);
        }
        self.cleanup(cleanup);
    }

    async fn finish_removed(&mut self, record: PendingVerification, reason: RemovalReason) {
        let mut cleanup: Vec<i64> = record.challenge_message.into_iter().collect();

        match self
            .bounded("remove", self.deps.gateway.remove(self.chat, record.subject))
            .await
        {
            Ok(()) => {
                match reason {
                    RemovalReason::AttemptsExhausted => {
                        GateStats::incr(&self.deps.stats.removed_attempts)
                    }
                    RemovalReason::DeadlineElapsed => {
                        GateStats::incr(&self.deps.stats.removed_timeout)
                    }
                }
                info!(
                    chat_id = %self.chat,
                    user_id = %record.subject,
                    attempts = record.attempts,
                    reason = %reason,
                    "Subject removed"
                );
                let text = format!("{} was removed: {}.", record.display_name, reason);
                if let Some(message_id) = self.announce(&text).await {
                    cleanup.push(message_id);
                }
            }
            Err(e) => {
                self.report_failure("remove", &record.display_name, record.subject, &e)
                    .await;
            }
        }

        self.cleanup(cleanup);
    }

    fn schedule_deadline(&mut self, subject: UserId, challenge_id: u64, at: Instant) {
        let mailbox = self.mailbox.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox
                    .send(GateEvent::DeadlineElapsed {
                        subject,
                        challenge_id,
                        reply: None,
                    })
                    .await;
            }
        });

        if let Some(previous) = self.timers.insert(subject, timer) {
            previous.abort();
        }
    }

    fn cancel_timer(&mut self, subject: UserId) {
        if let Some(timer) = self.timers.remove(&subject) {
            timer.abort();
        }
    }

    /// Run one outbound call under the configured timeout
    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, WardenError>>,
    ) -> Result<T, WardenError> {
        match tokio::time::timeout(self.deps.settings.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(WardenError::Timeout(operation.to_string())),
        }
    }

    async fn report_failure(&self, action: &str, name: &str, user: UserId, err: &WardenError) {
        GateStats::incr(&self.deps.stats.gateway_failures);
        error!(
            chat_id = %self.chat,
            user_id = %user,
            error = %err,
            "Failed to {action} subject"
        );
        let text = format!(
            "⚠️ Could not {action} {name} (id {user}) in chat {}: {err}. Check the bot's admin rights.",
            self.chat
        );
        self.deps.channel.alert_admins(&text).await;
    }

    async fn acknowledge(&self, token: Option<&str>, text: &str, alert: bool) {
        let Some(token) = token else { return };
        if let Err(e) = self
            .bounded("acknowledge", self.deps.channel.acknowledge(token, text, alert))
            .await
        {
            debug!(chat_id = %self.chat, error = %e, "Failed to acknowledge submission");
        }
    }

    async fn announce(&self, text: &str) -> Option<i64> {
        match self
            .bounded("announce", self.deps.channel.announce(self.chat, text))
            .await
        {
            Ok(message_id) => Some(message_id),
            Err(e) => {
                warn!(chat_id = %self.chat, error = %e, "Failed to post announcement");
                None
            }
        }
    }

    fn cleanup(&self, message_ids: Vec<i64>) {
        if !message_ids.is_empty() {
            self.deps
                .channel
                .delete_later(self.chat, message_ids, self.deps.settings.cleanup_delay);
        }
    }
}
