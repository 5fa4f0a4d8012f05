//! Shared constants for Warden components.

/// Default HTTP listen address for the operator endpoints
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8090";

/// Default Telegram Bot API base URL
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Wrong answers allowed before the subject is removed
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Time a subject has to solve the challenge (2 minutes)
pub const DEFAULT_CHALLENGE_TTL_SECS: u64 = 120;

/// Smallest operand used in arithmetic challenges
pub const DEFAULT_OPERAND_MIN: i64 = 1;

/// Largest operand used in arithmetic challenges
pub const DEFAULT_OPERAND_MAX: i64 = 10;

/// Operands must lie within -OPERAND_LIMIT..=OPERAND_LIMIT
pub const OPERAND_LIMIT: i64 = 1_000_000;

/// Number of answer buttons shown with each challenge
pub const DEFAULT_OPTION_COUNT: usize = 4;

/// Upper bound for a single outbound Telegram call
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Long-poll timeout passed to `getUpdates`
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 50;

/// Pause after a failed `getUpdates` call
pub const DEFAULT_ERROR_BACKOFF_SECS: u64 = 5;

/// Delay before challenge and announcement messages are deleted
pub const DEFAULT_CLEANUP_DELAY_SECS: u64 = 30;

/// Default mute length for `/mute` without an argument (1 hour)
pub const DEFAULT_MUTE_MINUTES: i64 = 60;

/// Longest accepted mute (366 days); Telegram treats anything longer as forever
pub const MAX_MUTE_MINUTES: i64 = 366 * 24 * 60;

/// Mailbox depth of each per-chat verification actor
pub const CHAT_MAILBOX_CAPACITY: usize = 64;

/// Idle time after which an actor with no pending records stops (10 minutes)
pub const ACTOR_IDLE_SECS: u64 = 600;

/// Callback data layout for answer buttons
pub mod callback {
    /// Answer button: vg:{user_id}:{answer}
    pub const ANSWER_PREFIX: &str = "vg";

    /// Separator between callback data fields
    pub const SEPARATOR: char = ':';

    /// Telegram rejects callback data longer than this
    pub const MAX_DATA_LEN: usize = 64;
}

/// Telegram chat member status strings
pub mod member_status {
    pub const CREATOR: &str = "creator";
    pub const ADMINISTRATOR: &str = "administrator";
    pub const MEMBER: &str = "member";
    pub const RESTRICTED: &str = "restricted";
    pub const LEFT: &str = "left";
    pub const KICKED: &str = "kicked";
}
