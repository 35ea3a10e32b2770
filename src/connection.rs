//! Connection struct definition
//!
//! Represents one accepted client connection: its stable id, nickname, and
//! the outbound line channel drained by the connection's writer task.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::types::ConnId;

/// Bounded backlog of outbound lines per connection; a peer that falls this
/// far behind starts losing broadcasts
pub const OUTBOUND_BUFFER: usize = 32;

/// Connected client information
///
/// Outbound lines go through a bounded channel to the writer task, which
/// owns the write half of the stream and completes every write. Sends from
/// the broadcast path are a non-blocking `try_send` and never suspend. The
/// partial-line buffer is owned by the reader task, not stored here.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnId,
    /// Nickname (None before the first JOIN)
    pub nickname: Option<String>,
    /// Outbound line channel, drained by the writer task
    sender: mpsc::Sender<String>,
}

impl Connection {
    /// Create a new connection with the given ID and outbound channel
    pub fn new(id: ConnId, sender: mpsc::Sender<String>) -> Self {
        Self {
            id,
            nickname: None,
            sender,
        }
    }

    /// Get the display name for this connection
    ///
    /// Returns the nickname if set, otherwise `client <id>`.
    pub fn display_name(&self) -> String {
        match &self.nickname {
            Some(name) => name.clone(),
            None => format!("client {}", self.id),
        }
    }

    /// Check if this connection has registered a nickname
    pub fn has_nickname(&self) -> bool {
        self.nickname.is_some()
    }

    /// Set the connection's nickname, returning the previous one
    pub fn set_nickname(&mut self, nickname: String) -> Option<String> {
        self.nickname.replace(nickname)
    }

    /// Best-effort non-blocking send of one protocol line.
    ///
    /// Queues the line for the writer task. A full backlog (slow peer) or a
    /// closed channel (writer gone) is returned to the caller; it is never
    /// treated as grounds to tear the connection down here — removal happens
    /// on the connection's own read path.
    pub fn try_send_line(&self, line: &str) -> Result<(), SendError> {
        self.sender.try_send(line.to_string()).map_err(|e| match e {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}
