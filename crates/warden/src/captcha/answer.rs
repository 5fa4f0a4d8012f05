//! Answer button payloads and submitted-answer parsing.

use warden_common::UserId;
use warden_common::constants::callback::{ANSWER_PREFIX, MAX_DATA_LEN, SEPARATOR};

/// Decoded answer button press: which subject it targets and the raw answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerCallback {
    pub subject: UserId,
    pub answer: String,
}

/// Encode the callback data for one answer button
pub fn encode_callback(subject: UserId, option: i64) -> String {
    let data = format!("{ANSWER_PREFIX}{SEPARATOR}{}{SEPARATOR}{option}", subject.0);
    debug_assert!(data.len() <= MAX_DATA_LEN);
    data
}

/// Decode callback data produced by [`encode_callback`].
///
/// Returns `None` for data that does not belong to the gate or names no
/// subject. The answer part is kept verbatim; a mangled answer is still a
/// submission and is judged by [`parse_answer`].
pub fn decode_callback(data: &str) -> Option<AnswerCallback> {
    let mut parts = data.splitn(3, SEPARATOR);
    if parts.next()? != ANSWER_PREFIX {
        return None;
    }
    let subject = parts.next()?.parse::<i64>().ok()?;
    let answer = parts.next().unwrap_or_default().to_string();
    Some(AnswerCallback {
        subject: UserId(subject),
        answer,
    })
}

/// Parse a submitted answer. Surrounding whitespace is ignored, anything
/// that is not a plain integer yields `None`.
pub fn parse_answer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}
