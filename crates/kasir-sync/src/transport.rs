//! # WebSocket Link
//!
//! Keeps one WebSocket to the backing store open for as long as the agent
//! runs, redialling after every drop.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Disconnected ──dial──► Dialing ──ok, Hello sent──► Connected          │
//! │        ▲                    │                           │               │
//! │        │ shutdown           │ refused / timeout         │ drop / error  │
//! │        │                    ▼                           │               │
//! │        └─────────────── Waiting { attempt } ◄───────────┘               │
//! │                         sleep: 0.5s, 1s, 2s ... capped, jittered        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! State changes go out on a `watch` channel. The outbox uploader flushes
//! whenever it sees `Connected`.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::SyncMessage;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Writer = SplitSink<Socket, Frame>;

const CHANNEL_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Dialing,
    Connected,
    /// Sleeping before redial number `attempt`.
    Waiting { attempt: u32 },
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Dialing => f.write_str("dialing"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Waiting { attempt } => write!(f, "waiting (attempt {})", attempt),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub ping_interval: Duration,
    /// Sent before anything else on every fresh socket.
    pub hello: Option<SyncMessage>,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        TransportConfig {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
            hello: None,
        }
    }

    pub fn from_sync_config(config: &SyncConfig, url: &str) -> Self {
        let s = &config.sync;
        TransportConfig {
            connect_timeout: s.connect_timeout(),
            initial_backoff: s.initial_backoff(),
            max_backoff: s.max_backoff(),
            ping_interval: Duration::from_secs(s.ping_interval_secs.max(1)),
            hello: Some(SyncMessage::hello(
                config.device_id(),
                &config.device.name,
                config.store_id(),
            )),
            ..TransportConfig::new(url)
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// The uploader's and the agent's side of the link.
#[derive(Clone)]
pub struct TransportHandle {
    outgoing_tx: mpsc::Sender<SyncMessage>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: mpsc::Sender<()>,
}

impl TransportHandle {
    /// Queues a message for the current socket. Messages queued while
    /// disconnected go out after the next `Hello`.
    pub async fn send(&self, message: SyncMessage) -> SyncResult<()> {
        self.outgoing_tx
            .send(message)
            .await
            .map_err(|_| SyncError::ChannelClosed("Outgoing message"))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelClosed("Shutdown"))
    }

    /// No socket behind it: tests read what was sent and drive the state.
    #[cfg(test)]
    pub(crate) fn detached() -> (
        Self,
        mpsc::Receiver<SyncMessage>,
        watch::Sender<ConnectionState>,
    ) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (shutdown_tx, _) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        (
            TransportHandle {
                outgoing_tx,
                state_rx,
                shutdown_tx,
            },
            outgoing_rx,
            state_tx,
        )
    }
}

// =============================================================================
// Link Task
// =============================================================================

pub struct Transport {
    config: TransportConfig,
    state_tx: watch::Sender<ConnectionState>,
    outgoing_rx: mpsc::Receiver<SyncMessage>,
    incoming_tx: mpsc::Sender<SyncMessage>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Why a socket stopped being pumped.
enum Ended {
    Shutdown,
    Dropped(Option<SyncError>),
}

impl Transport {
    /// Starts the link task. Messages from the remote arrive on the
    /// returned receiver.
    pub fn spawn(config: TransportConfig) -> (TransportHandle, mpsc::Receiver<SyncMessage>) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (incoming_tx, incoming_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        tokio::spawn(
            Transport {
                config,
                state_tx,
                outgoing_rx,
                incoming_tx,
                shutdown_rx,
            }
            .run(),
        );

        (
            TransportHandle {
                outgoing_tx,
                state_rx,
                shutdown_tx,
            },
            incoming_rx,
        )
    }

    async fn run(mut self) {
        info!(url = %self.config.url, "Sync link starting");
        let mut retry = new_backoff(self.config.initial_backoff, self.config.max_backoff);
        let mut failures = 0u32;

        loop {
            self.state_tx.send_replace(ConnectionState::Dialing);

            match self.dial().await {
                Ok(socket) => {
                    retry.reset();
                    failures = 0;
                    match self.pump(socket).await {
                        Ended::Shutdown => break,
                        Ended::Dropped(None) => info!("Backing store closed the link"),
                        Ended::Dropped(Some(e)) => warn!(%e, "Sync link dropped"),
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(%e, failures, "Could not reach backing store");
                }
            }

            // No retry limit: queued writes stay pending until a dial succeeds.
            let pause = retry.next_backoff().unwrap_or(self.config.max_backoff);
            self.state_tx.send_replace(ConnectionState::Waiting {
                attempt: failures.saturating_add(1),
            });
            debug!(?pause, "Redial scheduled");

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.shutdown_rx.recv() => break,
            }
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!("Sync link stopped");
    }

    async fn dial(&self) -> SyncResult<Socket> {
        let attempt = tokio::time::timeout(self.config.connect_timeout, connect_async(&self.config.url));
        match attempt.await {
            Ok(Ok((socket, response))) => {
                debug!(status = ?response.status(), "Handshake complete");
                Ok(socket)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(SyncError::ConnectTimeout(self.config.connect_timeout.as_secs())),
        }
    }

    async fn pump(&mut self, socket: Socket) -> Ended {
        let (mut writer, mut reader) = socket.split();

        if let Some(hello) = self.config.hello.clone() {
            if let Err(e) = write(&mut writer, &hello).await {
                return Ended::Dropped(Some(e));
            }
        }
        self.state_tx.send_replace(ConnectionState::Connected);
        info!("Sync link up");

        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping.tick().await;

        loop {
            let step = tokio::select! {
                Some(msg) = self.outgoing_rx.recv() => write(&mut writer, &msg).await.map(|_| None),
                frame = reader.next() => self.receive(&mut writer, frame).await,
                _ = ping.tick() => writer
                    .send(Frame::Ping(Vec::new().into()))
                    .await
                    .map(|_| None)
                    .map_err(SyncError::from),
                _ = self.shutdown_rx.recv() => {
                    let _ = writer.send(Frame::Close(None)).await;
                    return Ended::Shutdown;
                }
            };

            match step {
                Ok(None) => {}
                Ok(Some(ended)) => return ended,
                Err(e) => return Ended::Dropped(Some(e)),
            }
        }
    }

    /// `Ok(Some(_))` when the socket is finished.
    async fn receive(
        &self,
        writer: &mut Writer,
        frame: Option<Result<Frame, tokio_tungstenite::tungstenite::Error>>,
    ) -> SyncResult<Option<Ended>> {
        match frame {
            None | Some(Ok(Frame::Close(_))) => Ok(Some(Ended::Dropped(None))),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(Frame::Text(text))) => {
                match SyncMessage::from_json(&text) {
                    Ok(msg) => {
                        debug!(msg_type = %msg.type_name(), "Received");
                        self.incoming_tx
                            .send(msg)
                            .await
                            .map_err(|_| SyncError::ChannelClosed("Incoming message"))?;
                    }
                    Err(e) => warn!(%e, "Unreadable message skipped"),
                }
                Ok(None)
            }
            Some(Ok(Frame::Ping(data))) => {
                writer.send(Frame::Pong(data)).await?;
                Ok(None)
            }
            Some(Ok(_)) => Ok(None),
        }
    }
}

async fn write(writer: &mut Writer, msg: &SyncMessage) -> SyncResult<()> {
    debug!(msg_type = %msg.type_name(), "Sending");
    writer.send(Frame::Text(msg.to_json()?.into())).await?;
    Ok(())
}

/// Jittered exponential backoff that never gives up on its own.
pub(crate) fn new_backoff(initial: Duration, max: Duration) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: initial,
        current_interval: initial,
        max_interval: max,
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
