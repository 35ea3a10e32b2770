//! Chat Relay Server - Entry Point
//!
//! Binds the listener, wires up shutdown on Ctrl-C, spawns the admin-input
//! relay, and runs the accept loop.

use std::env;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat_relay::{relay_admin_input, RelayError, RelayServer, Shutdown};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:1500";

/// Default maximum concurrent client count
const DEFAULT_MAX_CLIENTS: usize = 100;

/// Environment variable overriding the connection cap
const MAX_CLIENTS_ENV: &str = "CHAT_RELAY_MAX_CLIENTS";

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let max_clients = match env::var(MAX_CLIENTS_ENV) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(
                "Invalid {}={:?}, using default {}",
                MAX_CLIENTS_ENV, raw, DEFAULT_MAX_CLIENTS
            );
            DEFAULT_MAX_CLIENTS
        }),
        Err(_) => DEFAULT_MAX_CLIENTS,
    };

    let shutdown = Arc::new(Shutdown::new());

    // Bind/listen failures are the only process-fatal errors
    let server = RelayServer::bind(&addr, max_clients, shutdown.clone()).await?;

    // Ctrl-C requests cooperative shutdown; the handler does nothing beyond
    // the atomic transition
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down server...");
                shutdown.begin();
            }
        });
    }

    // Second execution context: console lines broadcast to every client
    tokio::spawn(relay_admin_input(server.broadcaster(), shutdown.clone()));

    server.run().await
}
