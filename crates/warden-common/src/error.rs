//! Common error types for Warden components.

use thiserror::Error;

/// Common errors across Warden components
#[derive(Debug, Error)]
pub enum WardenError {
    /// Telegram Bot API returned `ok: false` or an unexpected payload
    #[error("Telegram API error ({method}): {description}")]
    Telegram { method: String, description: String },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Challenge generation error
    #[error("Challenge error: {0}")]
    Challenge(String),

    /// A verification actor mailbox is closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl WardenError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Telegram { .. } => 502,
            Self::Http(_) => 502,
            Self::Challenge(_) => 500,
            Self::ChannelClosed(_) => 503,
            Self::Internal(_) => 500,
            Self::Timeout(_) => 504,
        }
    }

    /// Returns true if this error may succeed when retried later.
    ///
    /// The gate itself never retries; the poller only uses this to pick
    /// the log level of a failed poll.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout(_))
    }

    pub fn telegram(method: &str, description: impl Into<String>) -> Self {
        Self::Telegram {
            method: method.to_string(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(WardenError::Timeout("restrictChatMember".into()).is_retryable());
        assert!(WardenError::Http("connection reset".into()).is_retryable());
        assert!(!WardenError::telegram("banChatMember", "not enough rights").is_retryable());
        assert!(!WardenError::ChannelClosed("chat -1001".into()).is_retryable());
    }

    #[test]
    fn test_telegram_error_display() {
        let err = WardenError::telegram("restrictChatMember", "Bad Request: not enough rights");
        assert_eq!(
            err.to_string(),
            "Telegram API error (restrictChatMember): Bad Request: not enough rights"
        );
        assert_eq!(err.status_code(), 502);
    }
}
