//! Loopback duplex channel between the controller and the overlay process.
//!
//! A single-client TCP server bound to `127.0.0.1` carrying one JSON
//! envelope per line. Sends are best-effort: with no live client they are a
//! silent no-op, and nothing is queued or replayed across reconnects.
//! Malformed frames are logged and dropped without disturbing the
//! connection.
//!
//! A new client connection supersedes the previous one; the superseded
//! socket is dropped without a handshake. Each client carries a generation
//! number so a stale reader's exit can never clear liveness for the client
//! that replaced it.

use crate::protocol::{ControllerBound, OverlayBound};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Connection lifecycle and inbound traffic, surfaced to the event loop.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A client connected (possibly superseding a previous one).
    Connected,
    /// The current client disconnected.
    Disconnected,
    /// A well-formed inbound envelope.
    Message(ControllerBound),
}

struct Shared {
    connected: AtomicBool,
    generation: AtomicU64,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

/// Cheap-clone sending side of the channel.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<Shared>,
}

impl ChannelHandle {
    /// Whether a client is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Send an envelope to the connected overlay, if any.
    ///
    /// Never fails: with no live client this is a no-op, and a write error
    /// drops the client and is otherwise swallowed. Caller-invocation order
    /// is preserved by the writer mutex.
    pub async fn send(&self, envelope: &OverlayBound) {
        let mut frame = match serde_json::to_string(envelope) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "cannot serialize overlay envelope; dropping");
                return;
            }
        };
        frame.push('\n');

        let mut guard = self.shared.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            debug!("no overlay client; dropping outbound envelope");
            return;
        };
        if let Err(e) = writer.write_all(frame.as_bytes()).await {
            warn!(error = %e, "overlay write failed; dropping client");
            *guard = None;
            self.shared.connected.store(false, Ordering::SeqCst);
        }
    }
}

/// Single-client overlay channel server.
pub struct OverlayChannel {
    port: u16,
    shared: Arc<Shared>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl OverlayChannel {
    /// Bind the loopback listener and start accepting clients.
    ///
    /// `port` 0 picks an ephemeral port; the assigned port is available via
    /// [`OverlayChannel::port`]. Lifecycle and inbound messages are
    /// delivered on `events`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CompanionError::Channel`] when the listener cannot
    /// be bound; the proactive subsystem must not start in that case.
    pub async fn start(
        port: u16,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> crate::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| crate::CompanionError::Channel(format!("cannot bind port {port}: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| crate::CompanionError::Channel(format!("cannot read local addr: {e}")))?
            .port();

        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            writer: Mutex::new(None),
        });

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(accept_loop(listener, accept_shared, events));

        info!(port, "overlay channel listening");
        Ok(Self {
            port,
            shared,
            accept_task,
        })
    }

    /// Assigned loopback port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sending handle, cloneable across components.
    #[must_use]
    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether a client is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Stop accepting clients and drop the live connection. Idempotent.
    pub async fn stop(&self) {
        self.accept_task.abort();
        let mut guard = self.shared.writer.lock().await;
        *guard = None;
        self.shared.connected.store(false, Ordering::SeqCst);
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "overlay accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                continue;
            }
        };

        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (read_half, write_half) = stream.into_split();

        {
            let mut guard = shared.writer.lock().await;
            if guard.replace(write_half).is_some() {
                info!("new overlay client supersedes the previous connection");
            }
        }
        shared.connected.store(true, Ordering::SeqCst);
        debug!(%peer, generation, "overlay connected");

        if events.send(ChannelEvent::Connected).is_err() {
            // Event loop is gone; keep serving sends but stop reading.
            return;
        }

        tokio::spawn(read_client(
            read_half,
            Arc::clone(&shared),
            generation,
            events.clone(),
        ));
    }
}

async fn read_client(
    read_half: OwnedReadHalf,
    shared: Arc<Shared>,
    generation: u64,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ControllerBound>(line) {
                    Ok(msg) => {
                        if events.send(ChannelEvent::Message(msg)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "dropping malformed overlay frame");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, generation, "overlay read error");
                break;
            }
        }
    }

    // Only the latest client clears liveness; a superseded reader exits
    // without touching state.
    if shared.generation.load(Ordering::SeqCst) == generation {
        {
            let mut guard = shared.writer.lock().await;
            *guard = None;
        }
        shared.connected.store(false, Ordering::SeqCst);
        debug!(generation, "overlay disconnected");
        let _ = events.send(ChannelEvent::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::protocol::Emotion;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    async fn recv_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("event channel closed")
    }

    async fn read_frame(stream: &mut TcpStream) -> serde_json::Value {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut byte))
                .await
                .expect("timed out reading frame")
                .expect("read failed");
            assert!(n > 0, "connection closed mid-frame");
            if byte[0] == b'\n' {
                break;
            }
            buf.push(byte[0]);
        }
        serde_json::from_slice(&buf).expect("frame is not valid JSON")
    }

    #[tokio::test]
    async fn send_without_client_is_a_silent_noop() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let channel = OverlayChannel::start(0, tx).await.unwrap();
        assert!(!channel.is_connected());

        // Must not panic or error.
        channel
            .handle()
            .send(&OverlayBound::Status { connected: true })
            .await;

        channel.stop().await;
    }

    #[tokio::test]
    async fn no_replay_after_reconnect() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = OverlayChannel::start(0, tx).await.unwrap();
        let handle = channel.handle();

        // Sent while nobody is connected; must never be observed later.
        handle.send(&OverlayBound::Status { connected: true }).await;

        let mut client = TcpStream::connect(("127.0.0.1", channel.port()))
            .await
            .unwrap();
        assert!(matches!(recv_event(&mut rx).await, ChannelEvent::Connected));

        handle
            .send(&OverlayBound::EmotionChange {
                emotion: Emotion::Happy,
            })
            .await;

        let frame = read_frame(&mut client).await;
        assert_eq!(frame["type"], "emotion_change");

        channel.stop().await;
    }

    #[tokio::test]
    async fn inbound_frames_are_parsed_and_malformed_ones_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = OverlayChannel::start(0, tx).await.unwrap();

        let mut client = TcpStream::connect(("127.0.0.1", channel.port()))
            .await
            .unwrap();
        assert!(matches!(recv_event(&mut rx).await, ChannelEvent::Connected));

        client
            .write_all(b"this is not json\n{\"type\":\"chat_request\",\"text\":\"hi\"}\n")
            .await
            .unwrap();

        match recv_event(&mut rx).await {
            ChannelEvent::Message(ControllerBound::ChatRequest { text }) => {
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        drop(client);
        assert!(matches!(
            recv_event(&mut rx).await,
            ChannelEvent::Disconnected
        ));
        assert!(!channel.is_connected());

        channel.stop().await;
    }

    #[tokio::test]
    async fn second_client_supersedes_first() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = OverlayChannel::start(0, tx).await.unwrap();
        let handle = channel.handle();

        let _first = TcpStream::connect(("127.0.0.1", channel.port()))
            .await
            .unwrap();
        assert!(matches!(recv_event(&mut rx).await, ChannelEvent::Connected));

        let mut second = TcpStream::connect(("127.0.0.1", channel.port()))
            .await
            .unwrap();
        assert!(matches!(recv_event(&mut rx).await, ChannelEvent::Connected));
        assert!(channel.is_connected());

        handle.send(&OverlayBound::Status { connected: true }).await;
        let frame = read_frame(&mut second).await;
        assert_eq!(frame["type"], "status");

        // The superseded client's teardown must not clear liveness for the
        // new client.
        drop(_first);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(channel.is_connected());

        channel.stop().await;
    }
}
