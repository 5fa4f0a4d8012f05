//! # Warden - Telegram join verification bot
//!
//! Restricts every user joining a group, asks them a short arithmetic
//! question and lifts the restriction on the right answer. Wrong answers
//! and silence get the user removed.
//!
//! ## Architecture
//! ```text
//! Telegram ──getUpdates──▶ poller ──▶ gate (one actor per chat)
//!    ▲                                   │
//!    └──── restrict / unrestrict / ban ◀─┘
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod bot;
mod captcha;
mod config;
mod gate;
mod routes;
mod state;
mod telegram;

use captcha::ChallengeGenerator;
use config::AppConfig;
use gate::{GateSettings, VerificationGate};
use state::{AppState, BotIdentity};
use telegram::{TelegramClient, TelegramGateway};
use warden_common::{ChatId, UserId};

/// Warden - Telegram join verification bot
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/warden.toml")]
    config: String,

    /// Bot token (overrides config)
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Listen address for health/metrics (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env before argument parsing so env-backed flags see it
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("🛡️ Starting Warden v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!("📋 Configuration loaded from {}", args.config);

    let telegram = Arc::new(
        TelegramClient::new(&config.telegram).context("Failed to create Telegram client")?,
    );
    let me = telegram
        .get_me()
        .await
        .context("Failed to reach Telegram, check the bot token")?;
    info!(
        "🤖 Logged in as @{} (id {})",
        me.username.as_deref().unwrap_or("?"),
        me.id
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let gateway = Arc::new(TelegramGateway::new(
        telegram.clone(),
        config.verification.removal,
        config.telegram.admin_chat_id.map(ChatId),
    ));
    let generator = ChallengeGenerator::from_config(&config.verification)
        .context("Invalid challenge settings")?;
    let gate = VerificationGate::new(
        generator,
        GateSettings::from_config(&config),
        gateway.clone(),
        gateway,
        shutdown_tx.clone(),
    );

    let state = AppState::new(
        config.clone(),
        telegram,
        gate,
        BotIdentity {
            id: UserId(me.id),
            username: me.username,
        },
    );

    let poller = tokio::spawn(bot::run_poller(state.clone(), shutdown_tx.subscribe()));

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Warden listening on {}", config.listen_addr);

    let shutdown_signal = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    poller.await.context("Poller task failed")?;

    info!("👋 Warden shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
