// sync/session.rs — Anonymous session registry.
//
// Connections carry no identity: the registry's only state is "connection
// exists". Disconnection removes the id with no compensating action — there
// are no per-connection locks to release.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

pub type SessionId = u64;

#[derive(Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    active: RwLock<HashSet<SessionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.active.write().await.insert(id);
        id
    }

    pub async fn unregister(&self, id: SessionId) {
        self.active.write().await.remove(&id);
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }
}
