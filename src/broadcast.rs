//! Message fan-out
//!
//! Takes a registry snapshot under the lock, releases the lock, then
//! best-effort queues the rendered line for every live connection's writer
//! task. A failed send to one target (full backlog, writer gone) neither
//! aborts delivery to the rest nor removes the failing connection; removal
//! is deferred to that connection's own read path noticing the failure.

use std::sync::Arc;

use tracing::debug;

use crate::protocol;
use crate::registry::Registry;
use crate::types::ConnId;

/// Fans messages out to every registered connection
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    /// Create a broadcaster over the given registry
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Broadcast a chat message from `origin`.
    ///
    /// The origin receives a self-framed echo (`You: <text>`); every other
    /// connection receives the text prefixed with the origin's display name.
    pub fn message(&self, origin: ConnId, text: &str) {
        let snapshot = self.registry.snapshot();

        let sender_name = snapshot
            .iter()
            .find(|c| c.id == origin)
            .map(|c| c.display_name())
            .unwrap_or_else(|| format!("client {}", origin));

        let other_line = protocol::render_other(&sender_name, text);
        let self_line = protocol::render_self(text);

        for conn in &snapshot {
            let line = if conn.id == origin {
                &self_line
            } else {
                &other_line
            };
            if let Err(e) = conn.try_send_line(line) {
                debug!("Send to client {} dropped: {}", conn.id, e);
            }
        }
    }

    /// Broadcast an informational notice (join/leave) to every connection.
    ///
    /// No self/other distinction; the same text goes to everyone.
    pub fn announce(&self, text: &str) {
        for conn in self.registry.snapshot() {
            if let Err(e) = conn.try_send_line(text) {
                debug!("Notice to client {} dropped: {}", conn.id, e);
            }
        }
    }

    /// Broadcast a server-origin (admin console) line to every connection
    pub fn server_line(&self, text: &str) {
        self.announce(&protocol::render_server(text));
    }
}
