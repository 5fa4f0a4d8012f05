//! In-process fake of the Bot API for tests.

use axum::{Json, Router, extract::Path, extract::State, routing::post};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// User id the fake reports as chat administrator
pub const FAKE_ADMIN_ID: i64 = 1;

#[derive(Clone, Default)]
struct FakeState {
    calls: Arc<Mutex<Vec<(String, Value)>>>,
    failing: Arc<HashSet<String>>,
    next_message: Arc<AtomicI64>,
}

pub struct FakeBotApi {
    pub url: String,
    state: FakeState,
}

impl FakeBotApi {
    pub async fn start() -> Self {
        Self::start_failing(&[]).await
    }

    /// Every method in `failing` answers with a Bot API error
    pub async fn start_failing(failing: &[&str]) -> Self {
        let state = FakeState {
            failing: Arc::new(failing.iter().map(|m| m.to_string()).collect()),
            next_message: Arc::new(AtomicI64::new(500)),
            ..Default::default()
        };

        let app = Router::new()
            .route("/{bot}/{method}", post(handle))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    /// Request bodies received for `method`, in order
    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

async fn handle(
    State(state): State<FakeState>,
    Path((_bot, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .calls
        .lock()
        .unwrap()
        .push((method.clone(), body.clone()));

    if state.failing.contains(&method) {
        return Json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: not enough rights to restrict/unrestrict chat member",
        }));
    }

    let result = match method.as_str() {
        "getMe" => json!({"id": 99, "is_bot": true, "first_name": "Warden", "username": "warden_bot"}),
        "sendMessage" => json!({
            "message_id": state.next_message.fetch_add(1, Ordering::SeqCst),
            "chat": {"id": body["chat_id"], "type": "supergroup"},
            "text": body["text"],
        }),
        "getChatMember" => {
            let status = if body["user_id"] == FAKE_ADMIN_ID { "administrator" } else { "member" };
            json!({
                "status": status,
                "user": {"id": body["user_id"], "is_bot": false, "first_name": "Someone"},
            })
        }
        "getUpdates" => json!([]),
        _ => json!(true),
    };
    Json(json!({"ok": true, "result": result}))
}
