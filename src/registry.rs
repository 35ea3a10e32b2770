//! Connection registry
//!
//! The single source of truth mapping a live `ConnId` to its [`Connection`].
//! All mutation and all full-collection iteration go through one coarse
//! mutex; the lock is held only for the map operation or the snapshot copy,
//! never across a send or an await.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::connection::Connection;
use crate::types::ConnId;

/// Registry of live connections with a fixed capacity cap
///
/// Invariant: every connection with a running reader task has exactly one
/// entry here, and vice versa, except for the short window while a
/// disconnect is being processed.
#[derive(Debug)]
pub struct Registry {
    inner: Mutex<HashMap<ConnId, Connection>>,
    capacity: usize,
}

impl Registry {
    /// Create an empty registry holding at most `capacity` connections
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConnId, Connection>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new connection.
    ///
    /// Rejects the insert and hands the connection back when the registry is
    /// at capacity; the caller closes the transport without registering it.
    pub fn insert(&self, conn: Connection) -> Result<usize, Connection> {
        let mut map = self.lock();
        if map.len() >= self.capacity {
            return Err(conn);
        }
        map.insert(conn.id, conn);
        Ok(map.len())
    }

    /// Remove a connection, returning it if it was still registered.
    ///
    /// Returning `None` means the id was already removed; callers use this
    /// to make disconnect handling idempotent.
    pub fn remove(&self, id: ConnId) -> Option<Connection> {
        self.lock().remove(&id)
    }

    /// Set a connection's nickname.
    ///
    /// Returns `None` if the connection is gone, otherwise the previous
    /// nickname (which is `None` on the first JOIN).
    pub fn set_nickname(&self, id: ConnId, nickname: String) -> Option<Option<String>> {
        let mut map = self.lock();
        let conn = map.get_mut(&id)?;
        Some(conn.set_nickname(nickname))
    }

    /// Look up the display name for a connection
    pub fn display_name(&self, id: ConnId) -> Option<String> {
        self.lock().get(&id).map(Connection::display_name)
    }

    /// Take a consistent copy of the live-connection set for one broadcast
    /// pass. The lock is released before any send happens.
    pub fn snapshot(&self) -> Vec<Connection> {
        self.lock().values().cloned().collect()
    }

    /// Remove and return every connection (shutdown teardown)
    pub fn drain(&self) -> Vec<Connection> {
        self.lock().drain().map(|(_, conn)| conn).collect()
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Configured maximum connection count
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OUTBOUND_BUFFER;
    use tokio::sync::mpsc;

    fn test_conn() -> Connection {
        let (tx, _rx) = mpsc::channel(OUTBOUND_BUFFER);
        Connection::new(ConnId::next(), tx)
    }

    #[tokio::test]
    async fn test_insert_remove() {
        let registry = Registry::new(4);
        let conn = test_conn();
        let id = conn.id;

        assert_eq!(registry.insert(conn).unwrap(), 1);
        assert_eq!(registry.len(), 1);

        let removed = registry.remove(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(registry.is_empty());

        // second remove is a no-op
        assert!(registry.remove(id).is_none());
    }

    #[tokio::test]
    async fn test_capacity_cap() {
        let registry = Registry::new(2);
        registry.insert(test_conn()).unwrap();
        registry.insert(test_conn()).unwrap();

        let third = test_conn();
        let third_id = third.id;
        let rejected = registry.insert(third).unwrap_err();
        assert_eq!(rejected.id, third_id);
        assert_eq!(registry.len(), 2);

        // freeing a slot lets the next insert through
        let victim = registry.snapshot()[0].id;
        registry.remove(victim).unwrap();
        registry.insert(test_conn()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_set_nickname() {
        let registry = Registry::new(4);
        let conn = test_conn();
        let id = conn.id;
        registry.insert(conn).unwrap();

        assert_eq!(registry.set_nickname(id, "alice".to_string()), Some(None));
        assert_eq!(registry.display_name(id), Some("alice".to_string()));

        // repeat JOIN overwrites silently
        assert_eq!(
            registry.set_nickname(id, "alicia".to_string()),
            Some(Some("alice".to_string()))
        );
        assert_eq!(registry.display_name(id), Some("alicia".to_string()));

        registry.remove(id);
        assert_eq!(registry.set_nickname(id, "ghost".to_string()), None);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let registry = Registry::new(4);
        let conn = test_conn();
        let id = conn.id;
        registry.insert(conn).unwrap();

        let snap = registry.snapshot();
        registry.remove(id);

        // the snapshot is unaffected by later mutation
        assert_eq!(snap.len(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_drain() {
        let registry = Registry::new(4);
        registry.insert(test_conn()).unwrap();
        registry.insert(test_conn()).unwrap();

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }
}
