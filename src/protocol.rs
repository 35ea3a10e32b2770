//! Line protocol codec
//!
//! Stateless pure functions over the newline-delimited text protocol:
//! classify an inbound line into a [`Frame`] and render outbound broadcast
//! strings.
//!
//! The wire format is deliberately minimal:
//! - a line whose first byte is `#` is the disconnect sentinel (both
//!   directions; the server sends it to every client during shutdown)
//! - `JOIN <name>` registers a nickname
//! - any other non-empty line is broadcast text

/// First byte of a voluntary-disconnect line
pub const SENTINEL: u8 = b'#';

/// Sentinel line the server sends to clients during shutdown
pub const SENTINEL_LINE: &str = "#";

/// Command prefix for nickname registration
pub const JOIN_PREFIX: &str = "JOIN ";

/// Maximum accepted line length in bytes; longer lines are a protocol
/// violation and drop the connection
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Logical protocol event derived from one inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Nickname registration (`JOIN <name>`)
    Join(String),
    /// Voluntary disconnect (line starts with the sentinel byte)
    Disconnect,
    /// Ordinary broadcast text
    Message(String),
}

/// Classify one complete line (without its trailing newline).
///
/// Returns `None` for empty lines, which produce no event. A bare `JOIN `
/// with nothing after the prefix is treated as ordinary message text rather
/// than a nickname registration.
pub fn parse_line(line: &str) -> Option<Frame> {
    if line.is_empty() {
        return None;
    }
    if line.as_bytes()[0] == SENTINEL {
        return Some(Frame::Disconnect);
    }
    if let Some(name) = line.strip_prefix(JOIN_PREFIX) {
        let name = name.trim();
        if !name.is_empty() {
            return Some(Frame::Join(name.to_string()));
        }
    }
    Some(Frame::Message(line.to_string()))
}

/// Render a message echo for its own sender
pub fn render_self(text: &str) -> String {
    format!("You: {}", text)
}

/// Render a message for everyone except its sender
pub fn render_other(sender: &str, text: &str) -> String {
    format!("{}: {}", sender, text)
}

/// Render a join notice
pub fn render_joined(name: &str) -> String {
    format!("{} has joined the chat", name)
}

/// Render a leave notice
pub fn render_left(name: &str) -> String {
    format!("{} has left the chat", name)
}

/// Render a server-origin (admin console) broadcast
pub fn render_server(text: &str) -> String {
    format!("[SERVER]: {}", text)
}
