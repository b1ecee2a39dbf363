use thiserror::Error;

/// Failure taxonomy for board mutation handlers.
///
/// `NotFound` is advisory — handlers treat a missing task id as a no-op, not a
/// failure. `UnknownCategory` is logged and the row excluded from categorized
/// views; it never aborts reconciliation.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl BoardError {
    /// Stable wire code carried in `ack` error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "store-unavailable",
            Self::NotFound(_) => "not-found",
            Self::UnknownCategory(_) => "unknown-category",
            Self::MalformedPayload(_) => "malformed-payload",
        }
    }
}

impl From<sqlx::Error> for BoardError {
    fn from(e: sqlx::Error) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}
