//! Relay server: accept loop and lifecycle
//!
//! Owns the listener, the connection registry, and the broadcaster. The
//! accept loop runs until shutdown is requested, registering each accepted
//! connection (capacity cap applied before registration) and spawning its
//! reader and writer tasks. Teardown sends the disconnect sentinel to every
//! live client, drains the registry, flushes the writers, and releases the
//! listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::broadcast::Broadcaster;
use crate::connection::{Connection, OUTBOUND_BUFFER};
use crate::error::RelayError;
use crate::handler::{handle_connection, write_connection};
use crate::protocol;
use crate::registry::Registry;
use crate::shutdown::Shutdown;
use crate::types::ConnId;

/// How long teardown waits for writer tasks to flush queued lines (the
/// shutdown sentinel included) before giving up on slow peers
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// The chat relay server
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    shutdown: Arc<Shutdown>,
}

impl RelayServer {
    /// Bind the listening endpoint.
    ///
    /// Bind/listen failures are the only process-fatal errors in the system;
    /// everything after this point is contained per connection.
    pub async fn bind(
        addr: &str,
        max_clients: usize,
        shutdown: Arc<Shutdown>,
    ) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr).await?;
        let registry = Arc::new(Registry::new(max_clients));
        let broadcaster = Broadcaster::new(registry.clone());
        Ok(Self {
            listener,
            registry,
            broadcaster,
            shutdown,
        })
    }

    /// Address the server is actually bound to (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the connection registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Broadcaster over this server's registry, for the admin-input context
    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    /// Run the accept loop until shutdown, then tear everything down.
    ///
    /// No new connections are accepted once shutdown is observed; every live
    /// client is sent the `#` sentinel and its transport released before
    /// this returns.
    pub async fn run(self) -> Result<(), RelayError> {
        info!(
            "Chat relay listening on {} (max clients: {})",
            self.listener.local_addr()?,
            self.registry.capacity()
        );

        let mut writers = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.stopping() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.register(stream, addr, &mut writers),
                        // a single failed accept must not abort the loop
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }
            }
        }

        let live = self.registry.drain();
        info!("Shutting down, notifying {} clients", live.len());
        for conn in live {
            // best-effort; queued behind anything already in the backlog
            if let Err(e) = conn.try_send_line(protocol::SENTINEL_LINE) {
                debug!("Sentinel to client {} failed: {}", conn.id, e);
            }
        }
        drop(self.listener);

        // every sender is gone now, so writers flush their queues and exit;
        // a peer that stopped reading forfeits its sentinel
        let flush = async {
            while writers.join_next().await.is_some() {}
        };
        if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, flush).await.is_err() {
            warn!("Writer flush timed out, dropping remaining transports");
        }

        self.shutdown.complete();
        info!("Server shutdown complete");
        Ok(())
    }

    /// Register one accepted connection and spawn its reader and writer
    /// tasks, or close it immediately when the registry is at capacity.
    fn register(&self, stream: TcpStream, addr: SocketAddr, writers: &mut JoinSet<()>) {
        let id = ConnId::next();
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let conn = Connection::new(id, tx);

        match self.registry.insert(conn) {
            Ok(total) => {
                info!("Client {} connected from {} (total: {})", id, addr, total);
                writers.spawn(write_connection(id, writer, rx));
                tokio::spawn(handle_connection(
                    id,
                    reader,
                    self.registry.clone(),
                    self.broadcaster.clone(),
                    self.shutdown.clone(),
                ));
            }
            Err(_rejected) => {
                // dropping both halves closes the socket, no handshake
                warn!(
                    "Max clients reached ({}), rejecting connection from {}",
                    self.registry.capacity(),
                    addr
                );
            }
        }
    }
}

/// Relay lines typed on the server's console to every connected client.
///
/// Runs as its own execution context next to the accept loop; it only ever
/// touches shared state through the broadcaster, which serializes on the
/// registry lock.
pub async fn relay_admin_input(broadcaster: Broadcaster, shutdown: Arc<Shutdown>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = shutdown.stopping() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if !line.is_empty() => broadcaster.server_line(&line),
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!("Admin input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read admin input: {}", e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::task::JoinHandle;

    struct TestServer {
        addr: SocketAddr,
        registry: Arc<Registry>,
        shutdown: Arc<Shutdown>,
        handle: JoinHandle<Result<(), RelayError>>,
    }

    async fn start(max_clients: usize) -> TestServer {
        let shutdown = Arc::new(Shutdown::new());
        let server = RelayServer::bind("127.0.0.1:0", max_clients, shutdown.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let registry = server.registry();
        let handle = tokio::spawn(server.run());
        TestServer {
            addr,
            registry,
            shutdown,
            handle,
        }
    }

    struct TestClient {
        reader: BufReader<TcpStream>,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            Self {
                reader: BufReader::new(stream),
            }
        }

        async fn send(&mut self, line: &str) {
            let mut buf = line.as_bytes().to_vec();
            buf.push(b'\n');
            self.reader.get_mut().write_all(&buf).await.unwrap();
        }

        async fn recv(&mut self) -> String {
            let mut line = String::new();
            let n = tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
                .await
                .expect("recv timed out")
                .unwrap();
            assert!(n > 0, "connection closed by server");
            line.trim_end().to_string()
        }

        /// JOIN and wait for the server to echo the join notice back, which
        /// proves registration is complete
        async fn join(&mut self, name: &str) {
            self.send(&format!("JOIN {}", name)).await;
            assert_eq!(self.recv().await, format!("{} has joined the chat", name));
        }

        async fn expect_silence(&mut self) {
            let mut line = String::new();
            let read = tokio::time::timeout(
                Duration::from_millis(150),
                self.reader.read_line(&mut line),
            )
            .await;
            assert!(read.is_err(), "unexpected data: {:?}", line);
        }
    }

    #[tokio::test]
    async fn test_three_client_scenario() {
        let server = start(8).await;

        let mut alice = TestClient::connect(server.addr).await;
        alice.join("alice").await;
        let mut bob = TestClient::connect(server.addr).await;
        bob.join("bob").await;
        assert_eq!(alice.recv().await, "bob has joined the chat");
        let mut carol = TestClient::connect(server.addr).await;
        carol.join("carol").await;
        assert_eq!(alice.recv().await, "carol has joined the chat");
        assert_eq!(bob.recv().await, "carol has joined the chat");
        assert_eq!(server.registry.len(), 3);

        alice.send("hi").await;
        assert_eq!(alice.recv().await, "You: hi");
        assert_eq!(bob.recv().await, "alice: hi");
        assert_eq!(carol.recv().await, "alice: hi");

        bob.send("#").await;
        assert_eq!(alice.recv().await, "bob has left the chat");
        assert_eq!(carol.recv().await, "bob has left the chat");

        // registry settles at 2 and bob got no non-self duplicate
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.registry.len(), 2);

        server.shutdown.begin();
        server.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_fanout_exactly_once() {
        let server = start(8).await;

        let mut alice = TestClient::connect(server.addr).await;
        alice.join("alice").await;
        let mut bob = TestClient::connect(server.addr).await;
        bob.join("bob").await;
        assert_eq!(alice.recv().await, "bob has joined the chat");

        alice.send("one").await;
        alice.send("two").await;

        // per-origin order is preserved, each message delivered exactly once
        assert_eq!(bob.recv().await, "alice: one");
        assert_eq!(bob.recv().await, "alice: two");
        assert_eq!(alice.recv().await, "You: one");
        assert_eq!(alice.recv().await, "You: two");
        bob.expect_silence().await;

        server.shutdown.begin();
        server.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_capacity_bound() {
        let server = start(1).await;

        let mut only = TestClient::connect(server.addr).await;
        only.join("only").await;

        // the (max+1)-th connection is closed without a handshake
        let mut rejected = TestClient::connect(server.addr).await;
        let mut line = String::new();
        let n = tokio::time::timeout(
            Duration::from_secs(2),
            rejected.reader.read_line(&mut line),
        )
        .await
        .expect("rejected client not closed")
        .unwrap();
        assert_eq!(n, 0, "over-cap client got data: {:?}", line);

        // and it never appears in any broadcast
        only.send("anyone there").await;
        assert_eq!(only.recv().await, "You: anyone there");
        assert_eq!(server.registry.len(), 1);

        server.shutdown.begin();
        server.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_slot_freed_after_disconnect() {
        let server = start(1).await;

        let mut first = TestClient::connect(server.addr).await;
        first.join("first").await;
        first.send("#").await;
        drop(first);

        // wait for the slot to free, then a new client fits
        tokio::time::timeout(Duration::from_secs(2), async {
            while server.registry.len() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("slot never freed");

        let mut second = TestClient::connect(server.addr).await;
        second.join("second").await;

        server.shutdown.begin();
        server.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains() {
        let server = start(8).await;

        let mut alice = TestClient::connect(server.addr).await;
        alice.join("alice").await;
        let mut bob = TestClient::connect(server.addr).await;
        bob.join("bob").await;
        assert_eq!(alice.recv().await, "bob has joined the chat");

        server.shutdown.begin();

        // every connected client receives the sentinel
        assert_eq!(alice.recv().await, "#");
        assert_eq!(bob.recv().await, "#");

        server.handle.await.unwrap().unwrap();
        assert_eq!(server.shutdown.state(), crate::shutdown::State::Stopped);
        assert!(server.registry.is_empty());

        // no new connections once stopped: the listener is gone, so the
        // connect either fails outright or is closed without service
        match TcpStream::connect(server.addr).await {
            Err(_) => {}
            Ok(stream) => {
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                let n = tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
                    .await
                    .expect("late client not closed")
                    .unwrap();
                assert_eq!(n, 0);
            }
        }
    }

    #[tokio::test]
    async fn test_admin_broadcast_via_broadcaster() {
        let server = start(8).await;
        let broadcaster = {
            // same path relay_admin_input takes for a console line
            Broadcaster::new(server.registry.clone())
        };

        let mut alice = TestClient::connect(server.addr).await;
        alice.join("alice").await;

        broadcaster.server_line("server going down at noon");
        assert_eq!(alice.recv().await, "[SERVER]: server going down at noon");

        server.shutdown.begin();
        server.handle.await.unwrap().unwrap();
    }
}
