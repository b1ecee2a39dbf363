use crate::AppContext;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// The original server's greeting, kept for client compatibility.
pub async fn root() -> &'static str {
    "This is taskify server!"
}

pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let uptime = ctx.started_at.elapsed().as_secs();
    let active = ctx.sessions.active_count().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime,
        "activeSessions": active,
    }))
}
