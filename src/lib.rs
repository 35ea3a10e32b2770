//! Multiplexed TCP Chat Relay Library
//!
//! A line-oriented chat relay server: clients connect over TCP, register a
//! nickname with `JOIN <name>`, and every message they send is fanned out to
//! all other connected clients.
//!
//! # Features
//! - Readiness-driven connection multiplexing (no thread per connection)
//! - Newline-delimited text protocol with partial-read reassembly
//! - Nickname registration and self/other message framing
//! - `#` sentinel for voluntary disconnect in both directions
//! - Capacity-capped connection registry
//! - Admin console input broadcast to all clients
//! - Graceful shutdown draining every connection
//!
//! # Architecture
//! One accept loop plus one reader and one writer task per connection, all
//! cooperative tokio tasks scheduled by the reactor's readiness events:
//! - `Registry` is the single source of truth for live connections, behind
//!   one coarse mutex held only for map operations and snapshot copies
//! - `Broadcaster` fans messages out from a registry snapshot by queueing
//!   onto each connection's bounded outbound channel, never suspending
//! - each writer task drains its channel and completes every write
//! - `Shutdown` coordinates cooperative teardown from a Ctrl-C signal
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use chat_relay::{RelayServer, Shutdown};
//!
//! #[tokio::main]
//! async fn main() {
//!     let shutdown = Arc::new(Shutdown::new());
//!     let server = RelayServer::bind("127.0.0.1:1500", 100, shutdown.clone())
//!         .await
//!         .unwrap();
//!
//!     let sig = shutdown.clone();
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         sig.begin();
//!     });
//!
//!     server.run().await.unwrap();
//! }
//! ```

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod types;

// Re-export main types for convenience
pub use broadcast::Broadcaster;
pub use connection::Connection;
pub use error::{RelayError, SendError};
pub use handler::{handle_connection, write_connection};
pub use protocol::Frame;
pub use registry::Registry;
pub use server::{relay_admin_input, RelayServer};
pub use shutdown::{Shutdown, State};
pub use types::ConnId;
