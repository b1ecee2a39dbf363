// sync/handlers — one handler per mutation kind.
//
// Every inbound mutation gets exactly one `ack` reply on the originating
// connection (result or typed error), and every state-changing handler
// concludes with an owner-scoped refresh broadcast. Unrecognized event names
// are ignored silently — not an error condition visible to the client.

pub mod tasks;
pub mod users;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::error::BoardError;
use crate::sync::event::server_event;
use crate::AppContext;

/// What a handler hands back to the router: the reply event for the
/// originating connection, plus the owner (if any) the connection should
/// start watching for broadcasts.
pub struct Reply {
    pub event: &'static str,
    pub data: Value,
    pub watch: Option<String>,
}

/// Defensive payload decode — a missing or mistyped field is a
/// `MalformedPayload`, answered in the ack, never a crashed connection.
pub(crate) fn parse<T: DeserializeOwned>(data: Value) -> Result<T, BoardError> {
    serde_json::from_value(data).map_err(|e| BoardError::MalformedPayload(e.to_string()))
}

/// Route one inbound event to its handler. Returns the serialized reply
/// frame and the owner to watch, or `None` for unrecognized event names.
pub async fn dispatch(
    event: &str,
    data: Value,
    ctx: &AppContext,
) -> Option<(String, Option<String>)> {
    let result = match event {
        "task-creation" => tasks::create(data, ctx).await,
        "users-creation" => users::register(data, ctx).await,
        "get-tasks" => tasks::fetch(data, ctx).await,
        "task-delete" => tasks::delete(data, ctx).await,
        "task-update" => tasks::edit_title(data, ctx).await,
        "update-task-category" => tasks::move_category(data, ctx).await,
        "reorder-items" => tasks::reorder(data, ctx).await,
        _ => {
            debug!(event, "ignoring unrecognized event");
            return None;
        }
    };

    match result {
        Ok(reply) => Some((server_event(reply.event, reply.data), reply.watch)),
        Err(e) => {
            let (code, message) = classify_error(&e);
            warn!(event, code, "handler failed");
            let ack = json!({
                "for": event,
                "ok": false,
                "error": { "code": code, "message": message }
            });
            Some((server_event("ack", ack), None))
        }
    }
}

fn classify_error(e: &anyhow::Error) -> (&'static str, String) {
    if let Some(board_err) = e.downcast_ref::<BoardError>() {
        return (board_err.code(), board_err.to_string());
    }
    error!(err = %e, "internal error");
    ("internal", "internal error".to_string())
}
