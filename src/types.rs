//! Basic type definitions for the chat relay
//!
//! Provides the `ConnId` newtype: a process-unique connection identifier
//! allocated from an atomic counter, never reused for the lifetime of the
//! process.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique connection identifier (newtype pattern)
///
/// Wraps a monotonically increasing `u64` for type-safe connection
/// identification. Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

impl ConnId {
    /// Allocate the next connection ID
    pub fn next() -> Self {
        Self(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, used when a connection has no nickname yet
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conn_id_unique() {
        let id1 = ConnId::next();
        let id2 = ConnId::next();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_conn_id_monotonic() {
        let id1 = ConnId::next();
        let id2 = ConnId::next();
        assert!(id2 > id1);
    }
}
