//! # Sync Agent
//!
//! Starts and stops the sync tasks and keeps the indicator's `SyncStatus`.
//!
//! ```text
//!                    ┌────────────── SyncAgent ──────────────┐
//!                    │  status: Arc<RwLock<SyncStatus>>       │
//!                    └──┬──────────────┬──────────────┬───────┘
//!                       │ spawn        │ spawn        │ spawn
//!                       ▼              ▼              ▼
//!   backing ◄──ws──► Transport ──► dispatch ──► OutboxProcessor  (BatchAck)
//!   store               │            │     └──► InboundHandler   (EntityUpdate)
//!                       └─ watch ────┘          status / emitter (Welcome, Error)
//!
//!   offline mode: nothing spawned, outbox just accumulates
//! ```
//!
//! The application only ever sees a `SyncAgentHandle`: status, nudge and the
//! per-record reporter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

use kasir_db::Database;

use crate::config::{SyncConfig, SyncMode};
use crate::error::{SyncError, SyncResult};
use crate::inbound::{InboundHandler, InboundHandlerHandle};
use crate::outbox::{OutboxProcessor, OutboxProcessorHandle};
use crate::protocol::SyncMessage;
use crate::reporter::SyncReporter;
use crate::transport::{ConnectionState, Transport, TransportConfig, TransportHandle};

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub mode: SyncMode,
    pub connection_state: ConnectionState,
    pub is_connected: bool,
    pub remote_url: Option<String>,
    /// Outbox entries not yet acknowledged.
    pub pending_count: i64,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            mode: SyncMode::Online,
            connection_state: ConnectionState::Disconnected,
            is_connected: false,
            remote_url: None,
            pending_count: 0,
            last_sync: None,
            last_error: None,
        }
    }
}

/// Where status changes go. The terminal logs them; a UI shell would
/// repaint its indicator.
pub trait SyncEventEmitter: Send + Sync {
    fn emit_status(&self, status: &SyncStatus);
    fn emit_progress(&self, pending: i64, synced: i64);
    fn emit_error(&self, message: &str, retryable: bool);
}

pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _: &SyncStatus) {}
    fn emit_progress(&self, _: i64, _: i64) {}
    fn emit_error(&self, _: &str, _: bool) {}
}

type SharedStatus = Arc<RwLock<SyncStatus>>;

/// Applies `change` and hands the emitter the result.
async fn publish(
    status: &SharedStatus,
    emitter: &dyn SyncEventEmitter,
    change: impl FnOnce(&mut SyncStatus),
) {
    let snapshot = {
        let mut s = status.write().await;
        change(&mut s);
        s.clone()
    };
    emitter.emit_status(&snapshot);
}

// =============================================================================
// Agent
// =============================================================================

/// Handles to the spawned tasks, present only while online.
struct Running {
    stop_dispatch: mpsc::Sender<()>,
    transport: TransportHandle,
    outbox: OutboxProcessorHandle,
    inbound: InboundHandlerHandle,
}

pub struct SyncAgent {
    config: Arc<SyncConfig>,
    db: Arc<Database>,
    status: SharedStatus,
    emitter: Arc<dyn SyncEventEmitter>,
    running: Option<Running>,
}

impl SyncAgent {
    pub fn new(config: SyncConfig, db: Arc<Database>) -> Self {
        Self::with_emitter(config, db, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        config: SyncConfig,
        db: Arc<Database>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let status = SyncStatus {
            mode: config.mode(),
            remote_url: config.remote_url().map(str::to_string),
            ..SyncStatus::default()
        };
        SyncAgent {
            config: Arc::new(config),
            db,
            status: Arc::new(RwLock::new(status)),
            emitter,
            running: None,
        }
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Take this after `start`; before it, `nudge` does nothing.
    pub fn handle(&self) -> SyncAgentHandle {
        SyncAgentHandle {
            status: self.status.clone(),
            outbox: self.running.as_ref().map(|r| r.outbox.clone()),
            reporter: SyncReporter::new(self.db.clone()),
        }
    }

    pub async fn start(&mut self) -> SyncResult<()> {
        let pending = self.db.sync_outbox().count_pending().await?;

        if !self.config.is_sync_enabled() {
            info!(pending, "Sync off, sales stay on this till");
            publish(&self.status, self.emitter.as_ref(), |s| s.pending_count = pending).await;
            return Ok(());
        }
        self.status.write().await.pending_count = pending;

        self.config.validate()?;
        let url = self
            .config
            .remote_url()
            .ok_or_else(|| SyncError::InvalidConfig("online mode needs sync.remote_url".into()))?
            .to_string();

        info!(
            device_id = %self.config.device_id(),
            store_id = %self.config.store_id(),
            %url,
            pending,
            "Sync agent starting"
        );

        let (transport, incoming) = Transport::spawn(TransportConfig::from_sync_config(&self.config, &url));
        let (uploader, outbox) = OutboxProcessor::new(
            self.db.clone(),
            self.config.clone(),
            transport.clone(),
            self.status.clone(),
            self.emitter.clone(),
        );
        let (applier, inbound) = InboundHandler::new(self.db.clone(), self.config.clone());
        let (stop_dispatch, stop_rx) = mpsc::channel(1);

        tokio::spawn(uploader.run());
        tokio::spawn(applier.run());
        tokio::spawn(
            Dispatch {
                status: self.status.clone(),
                emitter: self.emitter.clone(),
                transport: transport.clone(),
                outbox: outbox.clone(),
                inbound: inbound.clone(),
            }
            .run(incoming, transport.subscribe(), stop_rx),
        );

        self.running = Some(Running {
            stop_dispatch,
            transport,
            outbox,
            inbound,
        });
        Ok(())
    }

    /// Unsent entries stay in the outbox for the next start.
    pub async fn shutdown(&mut self) -> SyncResult<()> {
        if let Some(running) = self.running.take() {
            info!("Sync agent stopping");
            let _ = running.stop_dispatch.send(()).await;
            let _ = running.outbox.shutdown().await;
            let _ = running.inbound.shutdown().await;
            let _ = running.transport.shutdown().await;
        }

        let mut s = self.status.write().await;
        s.connection_state = ConnectionState::Disconnected;
        s.is_connected = false;
        Ok(())
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Routes what the remote sends to the task that owns it.
struct Dispatch {
    status: SharedStatus,
    emitter: Arc<dyn SyncEventEmitter>,
    transport: TransportHandle,
    outbox: OutboxProcessorHandle,
    inbound: InboundHandlerHandle,
}

impl Dispatch {
    async fn run(
        self,
        mut incoming: mpsc::Receiver<SyncMessage>,
        mut link: watch::Receiver<ConnectionState>,
        mut stop: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                changed = link.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *link.borrow_and_update();
                    publish(&self.status, self.emitter.as_ref(), |s| {
                        s.connection_state = state;
                        s.is_connected = state == ConnectionState::Connected;
                    })
                    .await;
                }
                Some(msg) = incoming.recv() => self.route(msg).await,
                _ = stop.recv() => break,
            }
        }
        debug!("Sync dispatch stopped");
    }

    async fn route(&self, msg: SyncMessage) {
        let kind = msg.type_name();
        let routed = match msg {
            SyncMessage::Welcome(welcome) => {
                info!(store_id = %welcome.store_id, "Backing store accepted this till");
                publish(&self.status, self.emitter.as_ref(), |s| s.last_error = None).await;
                Ok(())
            }
            SyncMessage::BatchAck(ack) => self.outbox.handle_ack(ack).await,
            SyncMessage::EntityUpdate(update) => self.inbound.handle_update(update).await,
            SyncMessage::Ping { timestamp } => self.transport.send(SyncMessage::pong(&timestamp)).await,
            SyncMessage::Error { code, message } => {
                let text = format!("{}: {}", code, message);
                warn!(%code, %message, "Backing store reported an error");
                self.status.write().await.last_error = Some(text.clone());
                self.emitter.emit_error(&text, true);
                Ok(())
            }
            _ => {
                debug!(msg_type = kind, "Nothing to do");
                Ok(())
            }
        };

        if let Err(e) = routed {
            warn!(%e, msg_type = kind, "Could not route message");
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

#[derive(Clone)]
pub struct SyncAgentHandle {
    status: SharedStatus,
    outbox: Option<OutboxProcessorHandle>,
    reporter: SyncReporter,
}

impl SyncAgentHandle {
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// A local commit just queued work. No-op offline.
    pub fn nudge(&self) {
        if let Some(outbox) = &self.outbox {
            outbox.nudge();
        }
    }

    pub fn reporter(&self) -> &SyncReporter {
        &self.reporter
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
