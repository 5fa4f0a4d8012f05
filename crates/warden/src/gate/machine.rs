//! Verification state machine for one chat.
//!
//! Pure transitions over a [`PendingStore`]; no I/O happens here. The
//! chat actor feeds events in, then carries out the returned decision
//! against the permission gateway.
//!
//! ```text
//!            correct / approve
//! PENDING ─────────────────────▶ VERIFIED
//!    │  ▲
//!    │  │ wrong, attempts < max
//!    │  └──┘
//!    │ wrong, attempts == max  |  deadline
//!    └─────────────────────────────────────▶ REMOVED
//! ```

use chrono::{DateTime, Duration, Utc};

use warden_common::{ChatId, Challenge, JoiningUser, PendingVerification, UserId};

use super::store::PendingStore;
use crate::captcha::parse_answer;

/// Limits applied to every challenge in the chat
#[derive(Debug, Clone, Copy)]
pub struct VerificationPolicy {
    pub max_attempts: u32,
    pub challenge_ttl: Duration,
}

/// Decision for a join event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// New record created
    Admitted(PendingVerification),
    /// Subject already has a running challenge, nothing changed
    AlreadyPending,
}

/// Decision for an answer submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Correct answer, record removed
    Verified(PendingVerification),
    /// Wrong answer, record kept with the new attempt count
    Retry { attempts: u32, remaining: u32 },
    /// Wrong answer that used the last attempt, record removed
    Exhausted(PendingVerification),
    /// Answer arrived after the deadline, record removed
    DeadlinePassed(PendingVerification),
    /// No record for the subject
    Expired,
    /// Submitter is not the subject, nothing changed
    Unauthorized,
}

/// Per-chat verification state machine
#[derive(Debug)]
pub struct VerificationMachine {
    chat: ChatId,
    policy: VerificationPolicy,
    store: PendingStore,
}

impl VerificationMachine {
    pub fn new(chat: ChatId, policy: VerificationPolicy) -> Self {
        Self {
            chat,
            policy,
            store: PendingStore::new(),
        }
    }

    /// PENDING entry: create a record for `user` unless one exists
    pub fn admit(&mut self, user: &JoiningUser, challenge: &Challenge, now: DateTime<Utc>) -> Admission {
        if self.store.contains(user.id) {
            return Admission::AlreadyPending;
        }

        let record = PendingVerification {
            subject: user.id,
            origin_chat: self.chat,
            display_name: user.display_name.clone(),
            challenge_id: self.store.next_challenge_id(),
            expected_answer: challenge.answer,
            attempts: 0,
            issued_at: now,
            deadline: now + self.policy.challenge_ttl,
            challenge_message: None,
        };
        self.store.insert(record.clone());
        Admission::Admitted(record)
    }

    /// Remember which message shows the subject's challenge
    pub fn attach_message(&mut self, subject: UserId, message_id: i64) -> bool {
        match self.store.get_mut(subject) {
            Some(record) => {
                record.challenge_message = Some(message_id);
                true
            }
            None => false,
        }
    }

    /// Judge a submission by `submitter` against `subject`'s record.
    ///
    /// Unparsable answers count as wrong answers.
    pub fn submit(
        &mut self,
        submitter: UserId,
        subject: UserId,
        raw_answer: &str,
        now: DateTime<Utc>,
    ) -> Submission {
        if submitter != subject {
            return Submission::Unauthorized;
        }

        let Some(record) = self.store.get_mut(subject) else {
            return Submission::Expired;
        };

        if record.is_expired_at(now) {
            return match self.store.remove(subject) {
                Some(record) => Submission::DeadlinePassed(record),
                None => Submission::Expired,
            };
        }

        if parse_answer(raw_answer) == Some(record.expected_answer) {
            return match self.store.remove(subject) {
                Some(record) => Submission::Verified(record),
                None => Submission::Expired,
            };
        }

        record.attempts = (record.attempts + 1).min(self.policy.max_attempts);
        if record.attempts >= self.policy.max_attempts {
            return match self.store.remove(subject) {
                Some(record) => Submission::Exhausted(record),
                None => Submission::Expired,
            };
        }

        Submission::Retry {
            attempts: record.attempts,
            remaining: self.policy.max_attempts - record.attempts,
        }
    }

    /// Deadline event. Only removes the record the timer was armed for.
    pub fn expire(&mut self, subject: UserId, challenge_id: u64) -> Option<PendingVerification> {
        match self.store.get(subject) {
            Some(record) if record.challenge_id == challenge_id => self.store.remove(subject),
            _ => None,
        }
    }

    /// Manual verification by an administrator
    pub fn approve(&mut self, subject: UserId) -> Option<PendingVerification> {
        self.store.remove(subject)
    }

    /// Drop a record whose challenge could not be set up
    pub fn abandon(&mut self, subject: UserId) -> Option<PendingVerification> {
        self.store.remove(subject)
    }

    #[cfg(test)]
    pub fn get(&self, subject: UserId) -> Option<&PendingVerification> {
        self.store.get(subject)
    }

    pub fn records(&self) -> impl Iterator<Item = &PendingVerification> {
        self.store.records()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }
}
