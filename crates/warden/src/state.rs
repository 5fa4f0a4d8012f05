//! Application state and shared resources.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use warden_common::{MetricsSnapshot, UserId};

use crate::config::AppConfig;
use crate::gate::VerificationGate;
use crate::telegram::TelegramClient;

/// The bot's own account, learned from `getMe`
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub id: UserId,
    pub username: Option<String>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Bot API client
    pub telegram: Arc<TelegramClient>,

    /// Join verification gate
    pub gate: VerificationGate,

    /// Who we are in the chats
    pub bot: BotIdentity,

    /// Set while the poller is reaching Telegram
    ready: Arc<AtomicBool>,

    started_at: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        telegram: Arc<TelegramClient>,
        gate: VerificationGate,
        bot: BotIdentity,
    ) -> Self {
        Self {
            config: Arc::new(config),
            telegram,
            gate,
            bot,
            ready: Arc::new(AtomicBool::new(false)),
            started_at: Instant::now(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Record poller liveness, returning the previous value
    pub fn set_ready(&self, ready: bool) -> bool {
        self.ready.swap(ready, Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.gate.snapshot(self.uptime_secs())
    }
}

#[cfg(test)]
impl AppState {
    /// State wired to an unreachable Bot API; nothing is sent
    pub fn for_tests() -> Self {
        Self::for_tests_with_api("http://127.0.0.1:9")
    }

    pub fn for_tests_with_api(api_url: &str) -> Self {
        use crate::captcha::ChallengeGenerator;
        use crate::gate::GateSettings;
        use crate::telegram::TelegramGateway;

        let mut config = AppConfig::default();
        config.telegram.token = "1:test".to_string();
        config.telegram.api_url = api_url.to_string();

        let telegram = Arc::new(TelegramClient::new(&config.telegram).unwrap());
        let gateway = Arc::new(TelegramGateway::new(
            telegram.clone(),
            config.verification.removal,
            None,
        ));
        let (shutdown, _) = tokio::sync::broadcast::channel(1);
        let gate = VerificationGate::new(
            ChallengeGenerator::from_config(&config.verification).unwrap(),
            GateSettings::from_config(&config),
            gateway.clone(),
            gateway,
            shutdown,
        );

        Self::new(
            config,
            telegram,
            gate,
            BotIdentity {
                id: UserId(99),
                username: Some("warden_bot".to_string()),
            },
        )
    }
}
