// Task mutation handlers: create, delete, edit-title, move-category,
// reorder, fetch. Each is an independent read-modify-write against the
// store; multi-step mutations are scoped by task id + owner so concurrent
// events on the same board have the smallest possible blast radius.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{parse, Reply};
use crate::board::ordering::{self, ReorderItem};
use crate::board::{Category, NewTask, Task};
use crate::error::BoardError;
use crate::store::TaskFields;
use crate::AppContext;

#[derive(Debug, Deserialize)]
struct DeletePayload {
    id: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EditTitlePayload {
    id: String,
    title: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MoveCategoryPayload {
    id: String,
    category: Category,
    order: i64,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReorderPayload {
    email: String,
    #[serde(rename = "updatedItems")]
    updated_items: Vec<ReorderItem>,
}

/// Re-read the owner's board and emit it to every connection watching that
/// owner. The canonical post-mutation step for every state-changing handler.
async fn broadcast_refresh(ctx: &AppContext, owner: &str) -> Result<Vec<Task>, BoardError> {
    let tasks = ctx.store.find_by_owner(owner).await?;
    let view = ordering::board_view(tasks);
    ctx.broadcaster.emit_owner(owner, "updatedTasks", json!(view));
    Ok(view)
}

/// Resolve the owner of a mutation: trust the payload's `user` field when
/// present, otherwise look the task up. `None` means the task is absent and
/// the mutation degrades to a no-op.
async fn resolve_owner(
    ctx: &AppContext,
    id: &str,
    user: Option<String>,
) -> Result<Option<String>, BoardError> {
    match user {
        Some(u) => Ok(Some(u)),
        None => Ok(ctx.store.find_one(id).await?.map(|t| t.added_by)),
    }
}

pub async fn create(data: Value, ctx: &AppContext) -> Result<Reply> {
    let new: NewTask = parse(data)?;
    if new.title.trim().is_empty() {
        return Err(BoardError::MalformedPayload("empty title".to_string()).into());
    }
    if new.added_by.trim().is_empty() {
        return Err(BoardError::MalformedPayload("missing addedBy".to_string()).into());
    }
    if !new.category.is_known() {
        return Err(BoardError::UnknownCategory(new.category.as_str().to_string()).into());
    }

    // Append to the owner's column when the client did not pick a position.
    let order = match new.order {
        Some(order) => order,
        None => {
            let owned = ctx.store.find_by_owner(&new.added_by).await?;
            ordering::next_order(&owned, &new.added_by, &new.category)
        }
    };

    let task = ctx
        .store
        .insert(&new.title, &new.category, order, &new.added_by)
        .await?;
    info!(owner = %task.added_by, id = %task.id, "task created");

    broadcast_refresh(ctx, &task.added_by).await?;
    Ok(Reply {
        event: "ack",
        data: json!({ "for": "task-creation", "ok": true, "id": task.id }),
        watch: Some(task.added_by),
    })
}

pub async fn delete(data: Value, ctx: &AppContext) -> Result<Reply> {
    let payload: DeletePayload = parse(data)?;
    let owner = resolve_owner(ctx, &payload.id, payload.user).await?;

    let deleted = ctx.store.delete(&payload.id).await?;
    if deleted {
        info!(id = %payload.id, "task deleted");
        if let Some(owner) = &owner {
            broadcast_refresh(ctx, owner).await?;
        }
    } else {
        // Second delete of the same id: no error, no effect.
        debug!(id = %payload.id, "delete of absent task — no-op");
    }

    Ok(Reply {
        event: "ack",
        data: json!({ "for": "task-delete", "ok": true, "deleted": deleted }),
        watch: owner,
    })
}

pub async fn edit_title(data: Value, ctx: &AppContext) -> Result<Reply> {
    let payload: EditTitlePayload = parse(data)?;
    if payload.title.trim().is_empty() {
        return Err(BoardError::MalformedPayload("empty title".to_string()).into());
    }
    let owner = resolve_owner(ctx, &payload.id, payload.user).await?;

    let fields = TaskFields {
        title: Some(payload.title),
        ..Default::default()
    };
    let affected = ctx
        .store
        .update_fields(&payload.id, owner.as_deref(), &fields)
        .await?;

    if affected > 0 {
        if let Some(owner) = &owner {
            broadcast_refresh(ctx, owner).await?;
        }
    }

    Ok(Reply {
        event: "ack",
        data: json!({ "for": "task-update", "ok": true, "updated": affected > 0 }),
        watch: owner,
    })
}

pub async fn move_category(data: Value, ctx: &AppContext) -> Result<Reply> {
    let payload: MoveCategoryPayload = parse(data)?;
    if !payload.category.is_known() {
        return Err(BoardError::UnknownCategory(payload.category.as_str().to_string()).into());
    }
    let owner = resolve_owner(ctx, &payload.id, payload.user).await?;

    // A single (category, order) pair repositions the task; id and title are
    // untouched. Ties in the destination column are broken by id until the
    // next reorder resequences it.
    let fields = TaskFields {
        category: Some(payload.category),
        order: Some(payload.order),
        ..Default::default()
    };
    let affected = ctx
        .store
        .update_fields(&payload.id, owner.as_deref(), &fields)
        .await?;

    if affected > 0 {
        if let Some(owner) = &owner {
            broadcast_refresh(ctx, owner).await?;
        }
    }

    Ok(Reply {
        event: "ack",
        data: json!({ "for": "update-task-category", "ok": true, "updated": affected > 0 }),
        watch: owner,
    })
}

pub async fn reorder(data: Value, ctx: &AppContext) -> Result<Reply> {
    let payload: ReorderPayload = parse(data)?;
    if payload.email.trim().is_empty() {
        return Err(BoardError::MalformedPayload("missing email".to_string()).into());
    }
    let plan = ordering::plan_reorder(&payload.updated_items)?;

    // One targeted update per pair, scoped by id + owner. Never a scope-wide
    // clear+rewrite: a concurrent create or delete on the same owner must
    // survive this reorder untouched.
    let mut applied = 0u64;
    for (id, order) in &plan {
        let fields = TaskFields {
            order: Some(*order),
            ..Default::default()
        };
        let affected = ctx
            .store
            .update_fields(id, Some(&payload.email), &fields)
            .await?;
        if affected == 0 {
            debug!(id = %id, owner = %payload.email, "reorder target absent — skipped");
        }
        applied += affected;
    }

    let tasks = ctx.store.find_by_owner(&payload.email).await?;
    let view = ordering::board_view(tasks);
    ctx.broadcaster
        .emit_owner(&payload.email, "reordered-tasks", json!({ "updatedTasks": view }));

    Ok(Reply {
        event: "ack",
        data: json!({ "for": "reorder-items", "ok": true, "applied": applied }),
        watch: Some(payload.email),
    })
}

pub async fn fetch(data: Value, ctx: &AppContext) -> Result<Reply> {
    // Wire contract: the payload is the owner email as a plain string.
    let owner: String = parse(data)?;
    if owner.trim().is_empty() {
        return Err(BoardError::MalformedPayload("missing owner email".to_string()).into());
    }
    let tasks = ctx.store.find_by_owner(&owner).await?;
    let view = ordering::board_view(tasks);
    Ok(Reply {
        event: "userTasks",
        data: json!(view),
        watch: Some(owner),
    })
}
