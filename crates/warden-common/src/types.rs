//! Core types shared across Warden components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Telegram user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Telegram chat identifier (groups are negative)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user entering a guarded chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoiningUser {
    pub id: UserId,
    /// First name as shown by Telegram, used in announcements
    pub display_name: String,
}

impl JoiningUser {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// Arithmetic challenge shown to a joining user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Left operand
    pub left: i64,
    /// Right operand
    pub right: i64,
    /// Question text, e.g. "What is 3 + 4?"
    pub prompt: String,
    /// Distinct candidate answers in display order, one of them correct
    pub options: Vec<i64>,
    /// The sum of both operands
    pub answer: i64,
}

/// Verification lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Restricted, waiting for an answer
    Pending,
    /// Solved the challenge (or approved), permissions restored
    Verified,
    /// Removed from the chat
    Removed,
}

/// Why a subject was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Too many wrong answers
    AttemptsExhausted,
    /// No correct answer before the deadline
    DeadlineElapsed,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttemptsExhausted => write!(f, "too many wrong answers"),
            Self::DeadlineElapsed => write!(f, "no answer in time"),
        }
    }
}

/// One record per subject currently mid-challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingVerification {
    /// The joining user
    pub subject: UserId,

    /// Chat the challenge was issued in
    pub origin_chat: ChatId,

    /// Name used when announcing the result
    pub display_name: String,

    /// Store-unique id, lets stale deadline events be told apart
    pub challenge_id: u64,

    /// Correct solution, fixed for the lifetime of the record
    pub expected_answer: i64,

    /// Wrong submissions so far
    pub attempts: u32,

    /// When the challenge was issued
    pub issued_at: DateTime<Utc>,

    /// After this instant the record is no longer answerable
    pub deadline: DateTime<Utc>,

    /// Message carrying the challenge keyboard, once displayed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_message: Option<i64>,
}

impl PendingVerification {
    /// Check whether the deadline has passed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

/// Result of delivering a join event to the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JoinOutcome {
    /// Restricted and challenged
    Challenged {
        challenge_id: u64,
        deadline: DateTime<Utc>,
    },
    /// A challenge for this subject is already running
    AlreadyPending,
    /// The challenge could not be set up (restrict or display failed)
    Aborted { reason: String },
}

/// Result of delivering an answer (or approval) to the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Correct answer, subject unlocked
    Verified,
    /// Wrong answer, subject still pending
    Retry { attempts: u32, remaining: u32 },
    /// Subject removed from the chat
    Removed { reason: RemovalReason },
    /// No pending record for this subject
    Expired,
    /// Submitter is not the subject
    Unauthorized,
}

impl AnswerOutcome {
    /// Lifecycle state the subject is in after this outcome, if it has one
    pub fn status(&self) -> Option<VerificationStatus> {
        match self {
            Self::Verified => Some(VerificationStatus::Verified),
            Self::Retry { .. } => Some(VerificationStatus::Pending),
            Self::Removed { .. } => Some(VerificationStatus::Removed),
            Self::Expired | Self::Unauthorized => None,
        }
    }
}

/// Counters exposed on the metrics endpoint and `/status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Join events received
    pub joins: u64,
    /// Challenges successfully put in front of a user
    pub challenges_issued: u64,
    /// Subjects verified by answering
    pub verified: u64,
    /// Subjects verified by an admin
    pub approved: u64,
    /// Removed after too many wrong answers
    pub removed_attempts: u64,
    /// Removed after the deadline
    pub removed_timeout: u64,
    /// Submissions from someone other than the subject
    pub unauthorized: u64,
    /// Submissions with no pending record
    pub expired_sessions: u64,
    /// Failed restrict/unrestrict/remove/display calls
    pub gateway_failures: u64,
    /// Records currently pending
    pub pending: u64,
    /// Seconds since the process started
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_pending_expiry_boundary() {
        let issued_at = Utc::now();
        let record = PendingVerification {
            subject: UserId(1),
            origin_chat: ChatId(-100),
            display_name: "Ana".to_string(),
            challenge_id: 1,
            expected_answer: 7,
            attempts: 0,
            issued_at,
            deadline: issued_at + Duration::seconds(120),
            challenge_message: None,
        };

        assert!(!record.is_expired_at(issued_at + Duration::seconds(119)));
        assert!(record.is_expired_at(issued_at + Duration::seconds(120)));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(AnswerOutcome::Retry {
            attempts: 1,
            remaining: 2,
        })
        .unwrap();
        assert_eq!(json["outcome"], "retry");
        assert_eq!(json["remaining"], 2);

        let json = serde_json::to_value(AnswerOutcome::Removed {
            reason: RemovalReason::DeadlineElapsed,
        })
        .unwrap();
        assert_eq!(json["reason"], "deadline_elapsed");
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(AnswerOutcome::Verified.status(), Some(VerificationStatus::Verified));
        assert_eq!(
            AnswerOutcome::Retry {
                attempts: 2,
                remaining: 1
            }
            .status(),
            Some(VerificationStatus::Pending)
        );
        assert_eq!(
            AnswerOutcome::Removed {
                reason: RemovalReason::AttemptsExhausted
            }
            .status(),
            Some(VerificationStatus::Removed)
        );
        assert_eq!(AnswerOutcome::Unauthorized.status(), None);
    }
}
