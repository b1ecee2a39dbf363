// store/mod.rs — Task store adapter.
//
// Thin CRUD surface over SQLite. Owns no board logic: invariants (order
// uniqueness, category validity) are entirely the calling handler's concern.
// Constructed once at startup and passed into every handler through
// AppContext — there are no global collection handles.

use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::board::{Category, Task, User};
use crate::error::BoardError;

/// Default timeout for individual SQLite queries. A hung store call blocks
/// only its own handler's continuation; this bounds how long.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

async fn with_deadline<T>(
    deadline: std::time::Duration,
    fut: impl std::future::Future<Output = Result<T, BoardError>>,
) -> Result<T, BoardError> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(BoardError::StoreUnavailable(format!(
            "query timed out after {:.1}s",
            deadline.as_secs_f64()
        ))),
    }
}

async fn with_timeout<T>(
    fut: impl std::future::Future<Output = Result<T, BoardError>>,
) -> Result<T, BoardError> {
    with_deadline(QUERY_TIMEOUT, fut).await
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TaskRow {
    id: String,
    title: String,
    category: String,
    order: i64,
    added_by: String,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            category: Category::parse(&row.category),
            order: row.order,
            added_by: row.added_by,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    email: String,
    name: String,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            email: row.email,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

/// Partial update of a task's mutable fields. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct TaskFields {
    pub title: Option<String>,
    pub category: Option<Category>,
    pub order: Option<i64>,
}

#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    /// Open (or create) the board database under `data_dir` and run
    /// migrations. Failure here is fatal to startup, unlike steady-state
    /// per-request failures.
    pub async fn open(data_dir: &Path) -> Result<Self, BoardError> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| BoardError::StoreUnavailable(e.to_string()))?;
        let db_path = data_dir.join("taskify.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))
                .map_err(BoardError::from)?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Clone of the underlying connection pool (pools are `Arc`-backed, so
    /// this is cheap). Callers can use it to observe or close the shared
    /// store out of band.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Idempotent schema creation.
    async fn migrate(&self) -> Result<(), BoardError> {
        let statements = [
            r#"CREATE TABLE IF NOT EXISTS tasks (
                id       TEXT PRIMARY KEY,
                title    TEXT NOT NULL,
                category TEXT NOT NULL,
                "order"  INTEGER NOT NULL,
                added_by TEXT NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(added_by)",
            r#"CREATE TABLE IF NOT EXISTS users (
                email      TEXT PRIMARY KEY,
                name       TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
        ];
        for stmt in statements {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    // ─── Tasks ───────────────────────────────────────────────────────────────

    pub async fn find_all(&self) -> Result<Vec<Task>, BoardError> {
        with_timeout(async {
            let rows: Vec<TaskRow> =
                sqlx::query_as(r#"SELECT * FROM tasks ORDER BY "order", id"#)
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows.into_iter().map(Task::from).collect())
        })
        .await
    }

    pub async fn find_by_owner(&self, owner: &str) -> Result<Vec<Task>, BoardError> {
        with_timeout(async {
            let rows: Vec<TaskRow> = sqlx::query_as(
                r#"SELECT * FROM tasks WHERE added_by = ? ORDER BY "order", id"#,
            )
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(Task::from).collect())
        })
        .await
    }

    pub async fn find_one(&self, id: &str) -> Result<Option<Task>, BoardError> {
        with_timeout(async {
            let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(Task::from))
        })
        .await
    }

    /// Insert a new task. The store assigns the id; it never changes again.
    pub async fn insert(
        &self,
        title: &str,
        category: &Category,
        order: i64,
        added_by: &str,
    ) -> Result<Task, BoardError> {
        let id = Uuid::new_v4().to_string();
        with_timeout(async {
            sqlx::query(
                r#"INSERT INTO tasks (id, title, category, "order", added_by) VALUES (?, ?, ?, ?, ?)"#,
            )
            .bind(&id)
            .bind(title)
            .bind(category.as_str())
            .bind(order)
            .bind(added_by)
            .execute(&self.pool)
            .await?;
            Ok(Task {
                id,
                title: title.to_string(),
                category: category.clone(),
                order,
                added_by: added_by.to_string(),
            })
        })
        .await
    }

    /// Update a subset of a task's mutable fields. When `owner` is given the
    /// update is scoped by id + owner so a concurrent event naming the same
    /// id under a different owner can never be clobbered.
    ///
    /// Returns the affected-row count: 0 means the task was absent (or owned
    /// by someone else) and callers treat that as a no-op.
    pub async fn update_fields(
        &self,
        id: &str,
        owner: Option<&str>,
        fields: &TaskFields,
    ) -> Result<u64, BoardError> {
        if fields.title.is_none() && fields.category.is_none() && fields.order.is_none() {
            return Ok(0);
        }
        let mut qb = sqlx::QueryBuilder::new("UPDATE tasks SET ");
        let mut set = qb.separated(", ");
        if let Some(title) = &fields.title {
            set.push("title = ").push_bind_unseparated(title);
        }
        if let Some(category) = &fields.category {
            set.push("category = ")
                .push_bind_unseparated(category.as_str().to_string());
        }
        if let Some(order) = fields.order {
            set.push("\"order\" = ").push_bind_unseparated(order);
        }
        qb.push(" WHERE id = ").push_bind(id);
        if let Some(owner) = owner {
            qb.push(" AND added_by = ").push_bind(owner);
        }
        with_timeout(async {
            let result = qb.build().execute(&self.pool).await?;
            Ok(result.rows_affected())
        })
        .await
    }

    /// Delete one task by id. Returns false when the id was absent — a
    /// second delete of the same id is a no-op, not an error.
    pub async fn delete(&self, id: &str) -> Result<bool, BoardError> {
        with_timeout(async {
            let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    /// Owner-scoped bulk clear.
    pub async fn delete_all(&self, owner: &str) -> Result<u64, BoardError> {
        with_timeout(async {
            let result = sqlx::query("DELETE FROM tasks WHERE added_by = ?")
                .bind(owner)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    /// Seed/import path. Each row is an independent insert, matching the
    /// store's no-multi-document-transaction posture.
    pub async fn bulk_insert(&self, tasks: &[Task]) -> Result<(), BoardError> {
        for task in tasks {
            with_timeout(async {
                sqlx::query(
                    r#"INSERT INTO tasks (id, title, category, "order", added_by) VALUES (?, ?, ?, ?, ?)"#,
                )
                .bind(&task.id)
                .bind(&task.title)
                .bind(task.category.as_str())
                .bind(task.order)
                .bind(&task.added_by)
                .execute(&self.pool)
                .await?;
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    // ─── Users ───────────────────────────────────────────────────────────────

    /// Dedupe-insert keyed by email. Returns true when a row was created;
    /// an existing registration is left untouched (no-op, never an update).
    pub async fn insert_user_if_absent(
        &self,
        email: &str,
        name: &str,
    ) -> Result<bool, BoardError> {
        let now = Utc::now().to_rfc3339();
        with_timeout(async {
            let result = sqlx::query(
                "INSERT INTO users (email, name, created_at) VALUES (?, ?, ?)
                 ON CONFLICT(email) DO NOTHING",
            )
            .bind(email)
            .bind(name)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    pub async fn find_user(&self, email: &str) -> Result<Option<User>, BoardError> {
        with_timeout(async {
            let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(User::from))
        })
        .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, BoardError> {
        with_timeout(async {
            let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(User::from).collect())
        })
        .await
    }
}
