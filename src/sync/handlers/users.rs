// User registration: insert-if-absent keyed by email. The original clients
// treat this as fire-and-forget; the ack still reports whether a row was
// created so newer clients can tell.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{parse, Reply};
use crate::error::BoardError;
use crate::AppContext;

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    email: String,
    name: String,
}

pub async fn register(data: Value, ctx: &AppContext) -> Result<Reply> {
    let payload: RegisterPayload = parse(data)?;
    if payload.email.trim().is_empty() {
        return Err(BoardError::MalformedPayload("missing email".to_string()).into());
    }

    let inserted = ctx
        .store
        .insert_user_if_absent(&payload.email, &payload.name)
        .await?;
    if inserted {
        info!(email = %payload.email, "user registered");
    }

    Ok(Reply {
        event: "ack",
        data: json!({ "for": "users-creation", "ok": true, "inserted": inserted }),
        watch: None,
    })
}
