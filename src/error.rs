//! Error types for the chat relay
//!
//! Defines application-level errors and outbound send errors. Uses thiserror
//! for ergonomic error definitions.
//!
//! Only setup-time failures (bind/listen) are allowed to terminate the
//! process; everything that happens on an individual connection is contained
//! at that connection's boundary and never surfaces as a `RelayError`.

use thiserror::Error;

/// Application-level errors
///
/// Covers the process-fatal setup path. Per-connection I/O faults are handled
/// inline by the reader tasks and never reach this type.
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO error during setup (bind, listen, local-address lookup)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound send errors
///
/// Occurs when queueing a line for a connection's writer task fails. Both
/// cases are best-effort drops, never grounds for removal from the
/// broadcast path.
#[derive(Debug, Error)]
pub enum SendError {
    /// The writer task's backlog is full (slow peer)
    #[error("Outbound backlog full")]
    ChannelFull,

    /// The writer task is gone (connection tearing down)
    #[error("Channel closed")]
    ChannelClosed,
}
