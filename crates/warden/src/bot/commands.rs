//! Administrator commands.
//!
//! Commands are looked up in an ordered table; the first entry whose name
//! matches wins. Everything except `/help` is restricted to chat
//! administrators, checked live with `getChatMember`.

use chrono::{TimeDelta, Utc};
use tracing::{error, info, warn};

use warden_common::constants::{DEFAULT_MUTE_MINUTES, MAX_MUTE_MINUTES};
use warden_common::{ChatId, UserId, WardenError};

use crate::state::AppState;
use crate::telegram::types::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    Status,
    Approve,
    Ban,
    Kick,
    Mute,
    Unmute,
}

pub struct CommandSpec {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
    pub admin_only: bool,
    pub kind: CommandKind,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "help",
        usage: "/help",
        description: "show this message",
        admin_only: false,
        kind: CommandKind::Help,
    },
    CommandSpec {
        name: "status",
        usage: "/status",
        description: "uptime, pending verifications and counters",
        admin_only: true,
        kind: CommandKind::Status,
    },
    CommandSpec {
        name: "approve",
        usage: "/approve <user_id>",
        description: "let a pending user in without answering",
        admin_only: true,
        kind: CommandKind::Approve,
    },
    CommandSpec {
        name: "ban",
        usage: "/ban <user_id>",
        description: "ban a user permanently",
        admin_only: true,
        kind: CommandKind::Ban,
    },
    CommandSpec {
        name: "kick",
        usage: "/kick <user_id>",
        description: "remove a user, they may join again",
        admin_only: true,
        kind: CommandKind::Kick,
    },
    CommandSpec {
        name: "mute",
        usage: "/mute <user_id> [minutes]",
        description: "revoke posting rights for a while",
        admin_only: true,
        kind: CommandKind::Mute,
    },
    CommandSpec {
        name: "unmute",
        usage: "/unmute <user_id>",
        description: "restore posting rights",
        admin_only: true,
        kind: CommandKind::Unmute,
    },
];

/// A `/command@bot arg…` line split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub name: String,
    pub addressee: Option<&'a str>,
    pub args: Vec<&'a str>,
}

pub fn parse_command(text: &str) -> Option<ParsedCommand<'_>> {
    let mut words = text.split_whitespace();
    let head = words.next()?.strip_prefix('/')?;
    let (name, addressee) = match head.split_once('@') {
        Some((name, bot)) => (name, Some(bot)),
        None => (head, None),
    };
    if name.is_empty() {
        return None;
    }
    Some(ParsedCommand {
        name: name.to_ascii_lowercase(),
        addressee,
        args: words.collect(),
    })
}

/// First table entry matching `name`
pub fn find_command(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name == name)
}

/// Target of a moderation command: the author of the replied-to message,
/// otherwise a numeric id as first argument. Returns the target and the
/// arguments left over.
pub fn resolve_target<'a>(message: &Message, args: &'a [&'a str]) -> Option<(UserId, String, &'a [&'a str])> {
    if let Some(user) = message.reply_to_message.as_ref().and_then(|m| m.from.as_ref()) {
        return Some((UserId(user.id), user.display_name(), args));
    }
    let (first, rest) = args.split_first()?;
    let id = first.parse::<i64>().ok()?;
    Some((UserId(id), format!("user {id}"), rest))
}

/// Mute length from the remaining arguments, at most [`MAX_MUTE_MINUTES`]
pub fn mute_minutes(args: &[&str]) -> Option<i64> {
    match args.first() {
        None => Some(DEFAULT_MUTE_MINUTES),
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|m| (1..=MAX_MUTE_MINUTES).contains(m)),
    }
}

pub fn format_uptime(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    match (days, hours, minutes) {
        (0, 0, 0) => format!("{seconds}s"),
        (0, 0, _) => format!("{minutes}m {seconds}s"),
        (0, _, _) => format!("{hours}h {minutes}m"),
        _ => format!("{days}d {hours}h"),
    }
}

pub fn help_text() -> String {
    let mut text = String::from("🛡️ Warden verifies new members with a short math question.\n\nCommands:\n");
    for spec in COMMANDS {
        text.push_str(&format!("{} - {}\n", spec.usage, spec.description));
    }
    text.push_str("\nModeration commands also accept a reply to the target's message instead of an id.");
    text
}

/// Handle a message starting with `/`
pub async fn handle_command(state: &AppState, message: &Message) {
    let Some(text) = message.text.as_deref() else { return };
    let Some(parsed) = parse_command(text) else { return };

    // `/cmd@other_bot` is meant for someone else
    if let Some(addressee) = parsed.addressee {
        if state.bot.username.as_deref() != Some(addressee) {
            return;
        }
    }

    let Some(spec) = find_command(&parsed.name) else { return };
    let Some(sender) = message.from.as_ref() else { return };
    let chat = ChatId(message.chat.id);

    if spec.admin_only {
        match state.telegram.get_chat_member(chat, UserId(sender.id)).await {
            Ok(member) if member.is_admin() => {}
            Ok(_) => {
                reply(state, chat, "❌ Only chat administrators can use this command.").await;
                return;
            }
            Err(e) => {
                error!(chat_id = %chat, user_id = sender.id, error = %e, "Failed to check admin status");
                reply(state, chat, "❌ Could not check your permissions.").await;
                return;
            }
        }
    }

    info!(chat_id = %chat, user_id = sender.id, command = spec.name, "Running command");

    let text = match execute(state, spec, chat, message, &parsed.args).await {
        Ok(text) => text,
        Err(e) => {
            warn!(chat_id = %chat, command = spec.name, error = %e, "Command failed");
            format!("⚠️ {} failed: {e}", spec.usage)
        }
    };
    reply(state, chat, &text).await;
}

async fn execute(
    state: &AppState,
    spec: &CommandSpec,
    chat: ChatId,
    message: &Message,
    args: &[&str],
) -> Result<String, WardenError> {
    if matches!(spec.kind, CommandKind::Help) {
        return Ok(help_text());
    }
    if matches!(spec.kind, CommandKind::Status) {
        return status_text(state, chat).await;
    }

    let Some((target, name, rest)) = resolve_target(message, args) else {
        return Ok(format!("Usage: {} (or reply to a message)", spec.usage));
    };

    match spec.kind {
        CommandKind::Approve => {
            if state.gate.approve(chat, target).await? {
                Ok(format!("✅ {name} approved."))
            } else {
                Ok(format!("{name} has no pending verification."))
            }
        }
        CommandKind::Ban => {
            state.gate.dismiss(chat, target).await?;
            state.telegram.ban_chat_member(chat, target).await?;
            Ok(format!("🔨 {name} banned."))
        }
        CommandKind::Kick => {
            state.gate.dismiss(chat, target).await?;
            state.telegram.ban_chat_member(chat, target).await?;
            state.telegram.unban_chat_member(chat, target).await?;
            Ok(format!("👢 {name} removed."))
        }
        CommandKind::Mute => {
            let until = mute_minutes(rest).and_then(|minutes| {
                let until = Utc::now().checked_add_signed(TimeDelta::try_minutes(minutes)?)?;
                Some((minutes, until))
            });
            let Some((minutes, until)) = until else {
                return Ok(format!(
                    "Usage: {} (1 to {MAX_MUTE_MINUTES} minutes)",
                    spec.usage
                ));
            };
            state
                .telegram
                .restrict_chat_member(chat, target, Some(until))
                .await?;
            Ok(format!("🔇 {name} muted for {minutes} minutes."))
        }
        CommandKind::Unmute => {
            state.telegram.unrestrict_chat_member(chat, target).await?;
            Ok(format!("🔊 {name} can write again."))
        }
        CommandKind::Help | CommandKind::Status => Err(WardenError::Internal(format!(
            "{} has no target",
            spec.name
        ))),
    }
}

async fn status_text(state: &AppState, chat: ChatId) -> Result<String, WardenError> {
    let pending = state.gate.pending(chat).await?;
    let metrics = state.metrics();

    let mut text = format!(
        "🟢 Running for {}\n⏳ Pending here: {}\n\n📊 Since start: {} joins, {} verified, {} approved, {} removed (wrong answers), {} removed (timeout), {} gateway failures",
        format_uptime(metrics.uptime_secs),
        pending.len(),
        metrics.joins,
        metrics.verified,
        metrics.approved,
        metrics.removed_attempts,
        metrics.removed_timeout,
        metrics.gateway_failures,
    );
    for record in pending {
        text.push_str(&format!(
            "\n• {} (id {}), {} attempt(s) used",
            record.display_name, record.subject, record.attempts
        ));
    }
    Ok(text)
}

async fn reply(state: &AppState, chat: ChatId, text: &str) {
    if let Err(e) = state.telegram.send_message(chat, text).await {
        error!(chat_id = %chat, error = %e, "Failed to send command reply");
    }
}
