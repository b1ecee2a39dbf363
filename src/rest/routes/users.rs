use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use crate::board::User;
use crate::AppContext;

#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub email: String,
    pub name: String,
}

/// Dedupe registration: a repeated email leaves the existing row untouched.
pub async fn register_user(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<RegisterUser>,
) -> Result<Json<Value>, StatusCode> {
    if body.email.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    match ctx.store.insert_user_if_absent(&body.email, &body.name).await {
        Ok(inserted) => Ok(Json(json!({ "inserted": inserted }))),
        Err(e) => {
            error!(err = %e, "failed to register user");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn list_users(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<Vec<User>>, StatusCode> {
    match ctx.store.list_users().await {
        Ok(users) => Ok(Json(users)),
        Err(e) => {
            error!(err = %e, "failed to list users");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
