//! In-memory table of live client connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type ConnectionId = u64;

/// One accepted client.
#[derive(Debug, Clone)]
pub struct LiveConnection {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
    /// Set while the connection holds a session.
    pub user_id: Option<i64>,
    cancel: CancellationToken,
}

/// Counters reported by the maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub active: usize,
    pub authenticated: usize,
    pub total_accepted: u64,
    pub total_rejected: u64,
}

#[derive(Default)]
struct Table {
    connections: HashMap<ConnectionId, LiveConnection>,
    next_id: ConnectionId,
    total_accepted: u64,
    total_rejected: u64,
}

/// Thread-safe registry of live connections.
///
/// The lock is held only for table updates, never across socket I/O.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    table: Arc<RwLock<Table>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a connection unless `limit` live connections already exist.
    ///
    /// The count check and the insert happen under one write lock, so the
    /// ceiling holds under concurrent accepts.
    pub async fn try_register(
        &self,
        peer: SocketAddr,
        limit: usize,
        cancel: CancellationToken,
    ) -> Option<ConnectionId> {
        let mut table = self.table.write().await;
        if table.connections.len() >= limit {
            table.total_rejected += 1;
            warn!(peer = %peer, limit, "Connection limit reached, rejecting");
            return None;
        }

        table.next_id += 1;
        table.total_accepted += 1;
        let id = table.next_id;
        table.connections.insert(
            id,
            LiveConnection {
                id,
                peer,
                connected_at: Utc::now(),
                user_id: None,
                cancel,
            },
        );
        info!(connection_id = id, peer = %peer, "Connection registered");
        Some(id)
    }

    /// Remove a connection.
    pub async fn unregister(&self, id: ConnectionId) -> Option<LiveConnection> {
        let conn = self.table.write().await.connections.remove(&id);
        if conn.is_some() {
            debug!(connection_id = id, "Connection unregistered");
        } else {
            warn!(connection_id = id, "Tried to unregister unknown connection");
        }
        conn
    }

    /// Record the user now (or no longer) authenticated on a connection.
    pub async fn set_user(&self, id: ConnectionId, user_id: Option<i64>) {
        if let Some(conn) = self.table.write().await.connections.get_mut(&id) {
            conn.user_id = user_id;
        }
    }

    pub async fn get(&self, id: ConnectionId) -> Option<LiveConnection> {
        self.table.read().await.connections.get(&id).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.table.read().await.connections.len()
    }

    pub async fn stats(&self) -> ConnectionStats {
        let table = self.table.read().await;
        ConnectionStats {
            active: table.connections.len(),
            authenticated: table
                .connections
                .values()
                .filter(|c| c.user_id.is_some())
                .count(),
            total_accepted: table.total_accepted,
            total_rejected: table.total_rejected,
        }
    }

    /// Signal every live connection to close. Returns how many were signalled.
    pub async fn disconnect_all(&self) -> usize {
        let table = self.table.read().await;
        for conn in table.connections.values() {
            conn.cancel.cancel();
        }
        table.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let id = registry
            .try_register(peer(5000), 10, CancellationToken::new())
            .await
            .unwrap();

        let conn = registry.get(id).await.unwrap();
        assert_eq!(conn.peer, peer(5000));
        assert!(conn.user_id.is_none());
        assert_eq!(registry.connection_count().await, 1);

        assert!(registry.unregister(id).await.is_some());
        assert!(registry.unregister(id).await.is_none());
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn limit_is_enforced_and_counted() {
        let registry = ConnectionRegistry::new();
        let a = registry
            .try_register(peer(1), 2, CancellationToken::new())
            .await
            .unwrap();
        registry
            .try_register(peer(2), 2, CancellationToken::new())
            .await
            .unwrap();
        assert!(
            registry
                .try_register(peer(3), 2, CancellationToken::new())
                .await
                .is_none()
        );

        registry.unregister(a).await;
        assert!(
            registry
                .try_register(peer(4), 2, CancellationToken::new())
                .await
                .is_some()
        );

        let stats = registry.stats().await;
        assert_eq!(stats.active, 2);
        assert_eq!(stats.total_accepted, 3);
        assert_eq!(stats.total_rejected, 1);
    }

    #[tokio::test]
    async fn authenticated_count_follows_set_user() {
        let registry = ConnectionRegistry::new();
        let a = registry
            .try_register(peer(1), 10, CancellationToken::new())
            .await
            .unwrap();
        let b = registry
            .try_register(peer(2), 10, CancellationToken::new())
            .await
            .unwrap();

        registry.set_user(a, Some(7)).await;
        registry.set_user(b, Some(8)).await;
        assert_eq!(registry.stats().await.authenticated, 2);

        registry.set_user(b, None).await;
        registry.unregister(a).await;
        assert_eq!(registry.stats().await.authenticated, 0);
    }

    #[tokio::test]
    async fn disconnect_all_cancels_tokens() {
        let registry = ConnectionRegistry::new();
        let t1 = CancellationToken::new();
        let t2 = CancellationToken::new();
        registry.try_register(peer(1), 10, t1.clone()).await.unwrap();
        registry.try_register(peer(2), 10, t2.clone()).await.unwrap();

        assert_eq!(registry.disconnect_all().await, 2);
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }
}
