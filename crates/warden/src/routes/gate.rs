//! Read-only view of the verification gate.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;

use warden_common::{ChatId, PendingVerification};

use crate::state::AppState;

#[derive(Serialize)]
pub struct PendingResponse {
    chat_id: ChatId,
    pending: Vec<PendingVerification>,
}

/// Subjects currently mid-challenge in one chat
pub async fn pending_for_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
) -> Result<Json<PendingResponse>, (StatusCode, String)> {
    let chat = ChatId(chat_id);
    let pending = state.gate.pending(chat).await.map_err(|e| {
        tracing::warn!(chat_id = %chat, error = %e, "Failed to list pending verifications");
        (
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            e.to_string(),
        )
    })?;

    Ok(Json(PendingResponse {
        chat_id: chat,
        pending,
    }))
}
