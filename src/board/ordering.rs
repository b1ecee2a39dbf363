// board/ordering.rs — Ordering & placement algorithm.
//
// Order keys are scoped per (owner, category): each column is its own
// sequence. Keys are gap-tolerant; render position compares `(order, id)` so
// the view stays total and deterministic even while duplicate raw order
// values transiently exist between a cross-column move and the next reorder.

use std::collections::HashSet;

use serde::Deserialize;
use tracing::warn;

use crate::board::{Category, Task};
use crate::error::BoardError;

/// One entry of a client `reorder-items` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderItem {
    pub id: String,
    pub order: i64,
}

/// The board partitioned into its three columns, each position-sorted.
#[derive(Debug, Default)]
pub struct Columns {
    pub todos: Vec<Task>,
    pub in_progress: Vec<Task>,
    pub done: Vec<Task>,
    /// Rows dropped because their category is outside the enumerated set.
    pub unknown: usize,
}

/// Sort tasks into render position: `(order, id)`. Total and deterministic —
/// the id tie-break keeps equal raw orders stable across re-reads.
pub fn position_sort(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
}

/// Append position for a new task in its owner's column: one past the
/// current maximum, or 0 for an empty column.
pub fn next_order(tasks: &[Task], owner: &str, category: &Category) -> i64 {
    tasks
        .iter()
        .filter(|t| t.added_by == owner && &t.category == category)
        .map(|t| t.order)
        .max()
        .map_or(0, |max| max + 1)
}

/// Partition an owner's tasks into columns, dropping rows with an unknown
/// category. Dropped rows are counted and logged, never fatal.
pub fn categorize(tasks: Vec<Task>) -> Columns {
    let mut columns = Columns::default();
    for task in tasks {
        match task.category {
            Category::Todos => columns.todos.push(task),
            Category::InProgress => columns.in_progress.push(task),
            Category::Done => columns.done.push(task),
            Category::Unknown(ref raw) => {
                warn!(id = %task.id, category = %raw, "excluding task with unknown category");
                columns.unknown += 1;
            }
        }
    }
    position_sort(&mut columns.todos);
    position_sort(&mut columns.in_progress);
    position_sort(&mut columns.done);
    columns
}

/// The categorized board flattened back to a single array in column order
/// (todos, in-progress, done). This is the shape every refresh emission and
/// `get-tasks` reply carries.
pub fn board_view(tasks: Vec<Task>) -> Vec<Task> {
    let columns = categorize(tasks);
    let mut view = columns.todos;
    view.extend(columns.in_progress);
    view.extend(columns.done);
    view
}

/// Validate a reorder payload into per-task targeted updates.
///
/// Rejects duplicate task ids and duplicate target orders — either would
/// break the strict-orderability invariant for the affected column. The plan
/// is always a list of individual `(id, order)` updates scoped by id + owner
/// at the store; a scope-wide clear+rewrite is never produced.
pub fn plan_reorder(items: &[ReorderItem]) -> Result<Vec<(String, i64)>, BoardError> {
    let mut seen_ids = HashSet::new();
    let mut seen_orders = HashSet::new();
    for item in items {
        if item.id.is_empty() {
            return Err(BoardError::MalformedPayload("empty task id".to_string()));
        }
        if !seen_ids.insert(item.id.as_str()) {
            return Err(BoardError::MalformedPayload(format!(
                "duplicate task id in reorder: {}",
                item.id
            )));
        }
        if !seen_orders.insert(item.order) {
            return Err(BoardError::MalformedPayload(format!(
                "duplicate order value in reorder: {}",
                item.order
            )));
        }
    }
    Ok(items.iter().map(|i| (i.id.clone(), i.order)).collect())
}
