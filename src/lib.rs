pub mod board;
pub mod config;
pub mod error;
pub mod rest;
pub mod store;
pub mod sync;

use std::sync::Arc;

use config::BoardConfig;
use store::TaskStore;
use sync::event::EventBroadcaster;
use sync::session::SessionRegistry;

/// Shared application state passed to every event handler and HTTP route.
/// Constructed once at startup — the store handle lives here, never in a
/// free-floating global.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<BoardConfig>,
    pub store: Arc<TaskStore>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub sessions: Arc<SessionRegistry>,
    pub started_at: std::time::Instant,
}
