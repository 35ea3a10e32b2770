//! Per-connection reader and writer tasks
//!
//! Drives one client connection: the reader awaits read readiness on the
//! tokio reactor, pulls available bytes with a non-blocking `try_read`,
//! reassembles newline-delimited frames from the pending buffer, and
//! dispatches them. The writer drains the connection's outbound channel and
//! completes every write. All faults are contained here; nothing a single
//! client does can take the process down.

use std::io::ErrorKind;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::broadcast::Broadcaster;
use crate::protocol::{self, Frame};
use crate::registry::Registry;
use crate::shutdown::Shutdown;
use crate::types::ConnId;

/// Read chunk size per `try_read` call
const READ_BUF_SIZE: usize = 1024;

/// Why the reader loop is ending; decides the log line and whether a leave
/// notice goes out
enum Exit {
    /// Peer sent the `#` sentinel
    Sentinel,
    /// Peer closed the connection (zero-length read)
    Closed,
    /// Unrecoverable I/O error
    Error(std::io::Error),
    /// Oversized line, protocol violation
    LineTooLong,
    /// Global shutdown observed; the server drains the registry itself
    Shutdown,
}

/// Run the reader loop for one registered connection.
///
/// Returns when the peer disconnects (sentinel, orderly close, or error) or
/// when global shutdown is observed. On disconnect the connection is removed
/// from the registry and a leave notice is fanned out; removal is idempotent,
/// so a handle that was already cleaned up produces no further broadcasts.
pub async fn handle_connection(
    id: ConnId,
    reader: OwnedReadHalf,
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    shutdown: Arc<Shutdown>,
) {
    let exit = read_loop(id, &reader, &registry, &broadcaster, &shutdown).await;

    if matches!(exit, Exit::Shutdown) {
        // server-side teardown sends the sentinel and drains the registry
        debug!("Reader for client {} stopping for shutdown", id);
        return;
    }

    // first removal wins; a second event for this id does nothing
    let Some(conn) = registry.remove(id) else {
        return;
    };
    let name = conn.display_name();
    drop(conn);

    match exit {
        Exit::Sentinel => info!(
            "Client {} sent disconnect (total: {})",
            id,
            registry.len()
        ),
        Exit::Closed => info!(
            "Client {} closed connection (total: {})",
            id,
            registry.len()
        ),
        Exit::Error(e) => error!(
            "Client {} error on recv: {} (total: {})",
            id,
            e,
            registry.len()
        ),
        Exit::LineTooLong => warn!(
            "Client {} sent an oversized line, dropping (total: {})",
            id,
            registry.len()
        ),
        Exit::Shutdown => unreachable!(),
    }

    broadcaster.announce(&protocol::render_left(&name));
}

/// Drain the outbound channel onto the write half, completing every write.
///
/// Ends when every sender is gone (connection removed and all broadcast
/// snapshots released) or the peer stops accepting data; queued lines,
/// including the shutdown sentinel, are flushed before the write half drops
/// and closes the transport.
pub async fn write_connection(id: ConnId, mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<String>) {
    while let Some(line) = rx.recv().await {
        let mut buf = line.into_bytes();
        buf.push(b'\n');
        if let Err(e) = writer.write_all(&buf).await {
            debug!("Write to client {} failed: {}", id, e);
            break;
        }
    }
    debug!("Writer for client {} ended", id);
}

async fn read_loop(
    id: ConnId,
    reader: &OwnedReadHalf,
    registry: &Registry,
    broadcaster: &Broadcaster,
    shutdown: &Shutdown,
) -> Exit {
    let mut pending: Vec<u8> = Vec::with_capacity(READ_BUF_SIZE);
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.stopping() => return Exit::Shutdown,
            ready = reader.ready(Interest::READABLE) => {
                if let Err(e) = ready {
                    return Exit::Error(e);
                }
                match reader.try_read(&mut buf) {
                    Ok(0) => return Exit::Closed,
                    Ok(n) => {
                        pending.extend_from_slice(&buf[..n]);
                        if let Some(exit) = drain_lines(id, &mut pending, registry, broadcaster) {
                            return exit;
                        }
                    }
                    // readiness was stale; re-poll
                    Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Exit::Error(e),
                }
            }
        }
    }
}

/// Process every complete line sitting in the pending buffer, in arrival
/// order. Returns `Some` when a frame ends the session: a terminal frame, or
/// a line (terminated or not) past the length bound.
fn drain_lines(
    id: ConnId,
    pending: &mut Vec<u8>,
    registry: &Registry,
    broadcaster: &Broadcaster,
) -> Option<Exit> {
    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        if pos > protocol::MAX_LINE_LEN {
            return Some(Exit::LineTooLong);
        }
        let raw: Vec<u8> = pending.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw[..pos]);
        let line = line.trim_end_matches('\r');

        let Some(frame) = protocol::parse_line(line) else {
            continue;
        };
        match frame {
            Frame::Disconnect => return Some(Exit::Sentinel),
            Frame::Join(name) => handle_join(id, name, registry, broadcaster),
            Frame::Message(text) => broadcaster.message(id, &text),
        }
    }
    // an unterminated prefix past the bound can never become a valid line
    if pending.len() > protocol::MAX_LINE_LEN {
        return Some(Exit::LineTooLong);
    }
    None
}

fn handle_join(id: ConnId, name: String, registry: &Registry, broadcaster: &Broadcaster) {
    match registry.set_nickname(id, name.clone()) {
        Some(None) => {
            info!("Client {} joined as '{}'", id, name);
            broadcaster.announce(&protocol::render_joined(&name));
        }
        // repeat JOIN overwrites the nickname with no notice to others
        Some(Some(old)) => debug!("Client {} renamed '{}' -> '{}'", id, old, name),
        None => debug!("JOIN from client {} after removal, ignoring", id),
    }
}
