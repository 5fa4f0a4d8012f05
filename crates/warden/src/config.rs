//! Configuration management for Warden.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use warden_common::constants::{
    DEFAULT_CHALLENGE_TTL_SECS, DEFAULT_CLEANUP_DELAY_SECS, DEFAULT_ERROR_BACKOFF_SECS,
    DEFAULT_LISTEN_ADDR, DEFAULT_MAX_ATTEMPTS, DEFAULT_OPERAND_MAX, DEFAULT_OPERAND_MIN,
    DEFAULT_OPTION_COUNT, DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_TELEGRAM_API_URL, OPERAND_LIMIT,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address for health/metrics
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Telegram connection settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Join verification settings
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Handling of bot accounts added to a chat
    #[serde(default)]
    pub bots: BotPolicyConfig,
}

/// Telegram Bot API settings
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    #[serde(default)]
    pub token: String,

    /// Bot API base URL (without the /bot<token> suffix)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Long-poll timeout for getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Upper bound for every other Bot API call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Pause after a failed poll
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    /// Chat that receives gateway failure alerts
    #[serde(default)]
    pub admin_chat_id: Option<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_api_url(),
            poll_timeout_secs: default_poll_timeout(),
            request_timeout_secs: default_request_timeout(),
            error_backoff_secs: default_error_backoff(),
            admin_chat_id: None,
        }
    }
}

/// How a failed subject leaves the chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalMode {
    /// Ban then unban, the user may join again
    Kick,
    /// Permanent ban
    Ban,
}

/// Join verification settings
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    /// Wrong answers before removal
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds a subject has to answer
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,

    /// Smallest operand
    #[serde(default = "default_operand_min")]
    pub operand_min: i64,

    /// Largest operand
    #[serde(default = "default_operand_max")]
    pub operand_max: i64,

    /// Answer buttons per challenge
    #[serde(default = "default_option_count")]
    pub option_count: usize,

    /// Kick or ban on failure
    #[serde(default = "default_removal")]
    pub removal: RemovalMode,

    /// Seconds before challenge/result messages are deleted
    #[serde(default = "default_cleanup_delay")]
    pub cleanup_delay_secs: u64,

    /// Announcement after a successful verification, `{name}` is replaced
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            challenge_ttl_secs: default_challenge_ttl(),
            operand_min: default_operand_min(),
            operand_max: default_operand_max(),
            option_count: default_option_count(),
            removal: default_removal(),
            cleanup_delay_secs: default_cleanup_delay(),
            welcome_message: default_welcome_message(),
        }
    }
}

/// Bot accounts added to a chat
#[derive(Debug, Clone, Deserialize)]
pub struct BotPolicyConfig {
    /// Remove bot accounts immediately instead of ignoring them
    #[serde(default = "default_ban_bots")]
    pub ban_on_join: bool,

    /// Bot user ids that are always let in
    #[serde(default)]
    pub whitelist: Vec<i64>,
}

impl Default for BotPolicyConfig {
    fn default() -> Self {
        Self {
            ban_on_join: default_ban_bots(),
            whitelist: Vec::new(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_api_url() -> String { DEFAULT_TELEGRAM_API_URL.to_string() }
fn default_poll_timeout() -> u64 { DEFAULT_POLL_TIMEOUT_SECS }
fn default_request_timeout() -> u64 { DEFAULT_REQUEST_TIMEOUT_SECS }
fn default_error_backoff() -> u64 { DEFAULT_ERROR_BACKOFF_SECS }
fn default_max_attempts() -> u32 { DEFAULT_MAX_ATTEMPTS }
fn default_challenge_ttl() -> u64 { DEFAULT_CHALLENGE_TTL_SECS }
fn default_operand_min() -> i64 { DEFAULT_OPERAND_MIN }
fn default_operand_max() -> i64 { DEFAULT_OPERAND_MAX }
fn default_option_count() -> usize { DEFAULT_OPTION_COUNT }
fn default_removal() -> RemovalMode { RemovalMode::Kick }
fn default_cleanup_delay() -> u64 { DEFAULT_CLEANUP_DELAY_SECS }
fn default_welcome_message() -> String { "Welcome, {name}! Thanks for verifying.".to_string() }
fn default_ban_bots() -> bool { true }

impl AppConfig {
    /// Load configuration from file and `WARDEN__*` env vars, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut builder = config::Config::builder();

        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("WARDEN").separator("__"))
            .build()
            .context("Failed to load config")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("Failed to parse config")?;

        // Apply CLI overrides
        if let Some(ref token) = args.token {
            config.telegram.token = token.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the gate cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.telegram.token.trim().is_empty() {
            bail!("telegram.token is empty (set TELEGRAM_BOT_TOKEN or --token)");
        }
        if self.telegram.request_timeout_secs == 0 {
            bail!("telegram.request_timeout_secs must be at least 1");
        }
        self.verification.validate()
    }
}

impl VerificationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            bail!("verification.max_attempts must be at least 1");
        }
        if self.challenge_ttl_secs == 0 {
            bail!("verification.challenge_ttl_secs must be at least 1");
        }
        if self.operand_min > self.operand_max {
            bail!(
                "verification.operand_min ({}) is greater than operand_max ({})",
                self.operand_min,
                self.operand_max
            );
        }
        if self.operand_min < -OPERAND_LIMIT || self.operand_max > OPERAND_LIMIT {
            bail!("verification operands must stay within -{OPERAND_LIMIT}..={OPERAND_LIMIT}");
        }
        if self.option_count < 2 {
            bail!("verification.option_count must be at least 2");
        }
        // Distractors are drawn from the possible sums
        let distinct_sums = (2 * (self.operand_max - self.operand_min) + 1) as u64;
        if self.option_count as u64 > distinct_sums {
            bail!(
                "verification.option_count ({}) exceeds the {} possible sums of operands {}..={}",
                self.option_count,
                distinct_sums,
                self.operand_min,
                self.operand_max
            );
        }
        Ok(())
    }

    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_secs)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }
}

impl TelegramConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            telegram: TelegramConfig::default(),
            verification: VerificationConfig::default(),
            bots: BotPolicyConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_observed_behavior() {
        let config = AppConfig::default();
        assert_eq!(config.verification.max_attempts, 3);
        assert_eq!(config.verification.challenge_ttl_secs, 120);
        assert_eq!(config.verification.operand_min, 1);
        assert_eq!(config.verification.operand_max, 10);
        assert_eq!(config.verification.option_count, 4);
        assert_eq!(config.verification.removal, RemovalMode::Kick);
        assert!(config.verification.validate().is_ok());
    }

    #[test]
    fn test_empty_token_rejected() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.telegram.token = "123:abc".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_option_count_bounded_by_possible_sums() {
        let mut verification = VerificationConfig {
            operand_min: 1,
            operand_max: 1,
            ..Default::default()
        };
        // only the sum 2 exists
        assert!(verification.validate().is_err());

        verification.operand_max = 2;
        verification.option_count = 3;
        assert!(verification.validate().is_ok());

        verification.option_count = 4;
        assert!(verification.validate().is_err());
    }

    #[test]
    fn test_zero_request_timeout_rejected() {
        let mut config = AppConfig::default();
        config.telegram.token = "123:abc".to_string();
        config.telegram.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extreme_operands_rejected() {
        let verification = VerificationConfig {
            operand_min: i64::MIN,
            operand_max: i64::MAX,
            ..Default::default()
        };
        assert!(verification.validate().is_err());

        let verification = VerificationConfig {
            operand_min: -OPERAND_LIMIT,
            operand_max: OPERAND_LIMIT,
            ..Default::default()
        };
        assert!(verification.validate().is_ok());
    }

    #[test]
    fn test_inverted_operand_range_rejected() {
        let verification = VerificationConfig {
            operand_min: 10,
            operand_max: 1,
            ..Default::default()
        };
        assert!(verification.validate().is_err());
    }

    #[test]
    fn test_parse_toml_sections() {
        let raw = r#"
            listen_addr = "0.0.0.0:9000"

            [telegram]
            token = "123:abc"
            admin_chat_id = -1001

            [verification]
            max_attempts = 5
            removal = "ban"
            welcome_message = "Hi {name}"

            [bots]
            ban_on_join = false
            whitelist = [42]
        "#;
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.telegram.admin_chat_id, Some(-1001));
        assert_eq!(config.telegram.poll_timeout_secs, 50);
        assert_eq!(config.verification.max_attempts, 5);
        assert_eq!(config.verification.removal, RemovalMode::Ban);
        assert_eq!(config.verification.option_count, 4);
        assert_eq!(config.verification.welcome_message, "Hi {name}");
        assert!(!config.bots.ban_on_join);
        assert_eq!(config.bots.whitelist, vec![42]);
    }
}
