// board/mod.rs — Task board data model.
//
// Wire shapes match the original board clients: task objects serialize with
// `addedBy` camelCase, categories as "todos" | "in-progress" | "done".

pub mod ordering;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The three fixed Kanban columns.
///
/// A persisted value outside the enumerated set is carried as `Unknown` rather
/// than rejected: such rows are logged and excluded from categorized views but
/// must never crash reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Todos,
    InProgress,
    Done,
    Unknown(String),
}

impl Category {
    pub const KNOWN: [Category; 3] = [Category::Todos, Category::InProgress, Category::Done];

    pub fn parse(s: &str) -> Self {
        match s {
            "todos" => Self::Todos,
            "in-progress" => Self::InProgress,
            "done" => Self::Done,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Todos => "todos",
            Self::InProgress => "in-progress",
            Self::Done => "done",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// A persisted board task. `id` is store-assigned and immutable; only
/// `title`, `category`, and `order` mutate in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub category: Category,
    pub order: i64,
    #[serde(rename = "addedBy")]
    pub added_by: String,
}

/// Client payload for `task-creation` — a task without an id.
/// `order` may be omitted; the handler assigns an append position.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub category: Category,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(rename = "addedBy")]
    pub added_by: String,
}

/// A registered board user. Created once per distinct email; duplicate
/// registration is a no-op, never an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}
