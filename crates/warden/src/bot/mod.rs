//! Update poller and dispatch.
//!
//! Long-polls `getUpdates` and hands each update to its own task. Joins
//! and answer presses go to the gate, slash commands to [`commands`].

pub mod commands;

use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use warden_common::{AnswerOutcome, ChatId, JoinOutcome, JoiningUser, UserId};

use crate::captcha::decode_callback;
use crate::gate::AnswerSubmission;
use crate::state::AppState;
use crate::telegram::types::{CallbackQuery, Chat, Message, Update, User};

/// Poll until shutdown
pub async fn run_poller(state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let poll_timeout = Duration::from_secs(state.config.telegram.poll_timeout_secs);
    let backoff = Duration::from_secs(state.config.telegram.error_backoff_secs);
    let mut offset: i64 = 0;

    info!("📡 Polling Telegram for updates");

    loop {
        let result = tokio::select! {
            result = state.telegram.get_updates(offset, poll_timeout) => result,
            _ = shutdown.recv() => break,
        };

        match result {
            Ok(updates) => {
                if !state.set_ready(true) {
                    info!("✅ Connected to Telegram");
                }
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let state = state.clone();
                    tokio::spawn(async move {
                        dispatch(&state, update).await;
                    });
                }
            }
            Err(e) => {
                state.set_ready(false);
                if e.is_retryable() {
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "Polling failed");
                } else {
                    error!(error = %e, backoff_secs = backoff.as_secs(), "Telegram rejected getUpdates");
                }
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.recv() => break,
                }
            }
        }
    }

    state.set_ready(false);
    info!("Poller stopped");
}

/// Route one update
pub async fn dispatch(state: &AppState, update: Update) {
    debug!(update_id = update.update_id, "Dispatching update");

    if let Some(message) = update.message {
        handle_message(state, &message).await;
    } else if let Some(member) = update.chat_member {
        if member.is_join() && is_group(&member.chat) {
            handle_new_member(state, &member.chat, &member.new_chat_member.user).await;
        }
    } else if let Some(query) = update.callback_query {
        handle_callback(state, &query).await;
    }
}

async fn handle_message(state: &AppState, message: &Message) {
    if let Some(members) = &message.new_chat_members {
        if is_group(&message.chat) {
            for user in members {
                handle_new_member(state, &message.chat, user).await;
            }
        }
        return;
    }

    if message.text.as_deref().is_some_and(|t| t.starts_with('/')) {
        commands::handle_command(state, message).await;
    }
}

async fn handle_new_member(state: &AppState, chat: &Chat, user: &User) {
    let chat_id = ChatId(chat.id);

    if UserId(user.id) == state.bot.id {
        debug!(chat_id = %chat_id, "Bot added to chat");
        return;
    }

    if user.is_bot {
        handle_bot_join(state, chat_id, user).await;
        return;
    }

    let joining = JoiningUser::new(UserId(user.id), user.display_name());
    match state.gate.on_user_joined(chat_id, joining).await {
        Ok(JoinOutcome::Challenged { challenge_id, .. }) => {
            debug!(chat_id = %chat_id, user_id = user.id, challenge_id, "Join challenged");
        }
        Ok(JoinOutcome::AlreadyPending) => {}
        Ok(JoinOutcome::Aborted { reason }) => {
            warn!(chat_id = %chat_id, user_id = user.id, reason = %reason, "Join verification aborted");
        }
        Err(e) => {
            error!(chat_id = %chat_id, user_id = user.id, error = %e, "Failed to deliver join");
        }
    }
}

/// Bots cannot press buttons; they are let in or removed by policy
async fn handle_bot_join(state: &AppState, chat: ChatId, bot: &User) {
    let policy = &state.config.bots;

    if policy.whitelist.contains(&bot.id) {
        info!(chat_id = %chat, bot_id = bot.id, "Whitelisted bot joined");
        return;
    }
    if !policy.ban_on_join {
        debug!(chat_id = %chat, bot_id = bot.id, "Bot joined, policy allows it");
        return;
    }

    match state.telegram.ban_chat_member(chat, UserId(bot.id)).await {
        Ok(()) => {
            info!(chat_id = %chat, bot_id = bot.id, "Banned bot account on join");
            let text = format!("🤖 {} was banned: bot accounts are not allowed here.", bot.display_name());
            if let Err(e) = state.telegram.send_message(chat, &text).await {
                debug!(chat_id = %chat, error = %e, "Failed to announce bot ban");
            }
        }
        Err(e) => {
            error!(chat_id = %chat, bot_id = bot.id, error = %e, "Failed to ban bot account");
        }
    }
}

async fn handle_callback(state: &AppState, query: &CallbackQuery) {
    let Some(answer) = query.data.as_deref().and_then(decode_callback) else {
        debug!(query_id = %query.id, "Ignoring foreign callback");
        return;
    };

    let Some(chat) = query.message.as_ref().map(|m| ChatId(m.chat.id)) else {
        if let Err(e) = state
            .telegram
            .answer_callback_query(&query.id, "This verification session has expired.", true)
            .await
        {
            debug!(query_id = %query.id, error = %e, "Failed to acknowledge callback");
        }
        return;
    };

    let submission = AnswerSubmission {
        subject: answer.subject,
        submitter: UserId(query.from.id),
        answer: answer.answer,
        reply_token: Some(query.id.clone()),
    };

    match state.gate.on_answer_submitted(chat, submission).await {
        Ok(AnswerOutcome::Verified) => {
            debug!(chat_id = %chat, user_id = query.from.id, "Answer accepted");
        }
        Ok(outcome) => {
            debug!(
                chat_id = %chat,
                user_id = query.from.id,
                ?outcome,
                status = ?outcome.status(),
                "Answer handled"
            );
        }
        Err(e) => {
            error!(chat_id = %chat, user_id = query.from.id, error = %e, "Failed to deliver answer");
        }
    }
}

fn is_group(chat: &Chat) -> bool {
    matches!(chat.chat_type.as_str(), "group" | "supergroup")
}
