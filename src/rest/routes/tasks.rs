use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use tracing::error;

use crate::board::Task;
use crate::AppContext;

/// The non-partitioned feed: every persisted task as a flat array.
/// Store failure is a bare 500 — no body guarantee.
pub async fn list_tasks(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<Vec<Task>>, StatusCode> {
    match ctx.store.find_all().await {
        Ok(tasks) => Ok(Json(tasks)),
        Err(e) => {
            error!(err = %e, "failed to list tasks");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
