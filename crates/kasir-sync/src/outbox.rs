//! # Outbox Processor
//!
//! Uploads the `sync_outbox` table to the backing store.
//!
//! ## Outbox Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Processor Flow                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    sync_outbox Table                            │   │
//! │  │                                                                 │   │
//! │  │  id | entity_type     | record_id | attempts | synced | reject │   │
//! │  │  ───┼─────────────────┼───────────┼──────────┼────────┼────────│   │
//! │  │  1  │ transaction     │ t-001     │ 0        │ NULL   │ NULL   │   │
//! │  │  2  │ inventory_delta │ t-001     │ 0        │ NULL   │ NULL   │   │
//! │  │  3  │ hold_order      │ h-004     │ 3        │ NULL   │ NULL   │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │        TRIGGERS (no fixed polling)                                     │
//! │        • transport watch: → Connected                                  │
//! │        • nudge() after a local commit                                  │
//! │        • BatchAck with more work remaining                             │
//! │        • backoff timer after a retryable failure / ack timeout         │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    OutboxProcessor                              │   │
//! │  │                                                                 │   │
//! │  │  1. Read: unsynced, unrejected, oldest first, LIMIT batch_size │   │
//! │  │  2. Send: OutboxBatch { batchSeq }   (one batch in flight)      │   │
//! │  │  3. Await: BatchAck { batchSeq } or ack timeout                │   │
//! │  │  4. Mark: acked     → synced_at                                │   │
//! │  │           retryable → attempts += 1, back off                  │   │
//! │  │           refused   → rejected_at (record becomes Failed)      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Entries are never dropped for their retry count. Acked entries are    │
//! │  pruned after `retention_days`, at start and whenever the outbox       │
//! │  drains.                                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify, RwLock};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use kasir_db::Database;

use crate::agent::{SyncEventEmitter, SyncStatus};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{BatchAck, SyncMessage};
use crate::transport::{new_backoff, ConnectionState, TransportHandle};

// =============================================================================
// Uploader (batch building and ack bookkeeping)
// =============================================================================

/// What one `BatchAck` did to the outbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckOutcome {
    pub synced: usize,
    /// Will be resent after backoff.
    pub retry: usize,
    pub rejected: usize,
}

/// The batch that has been sent and not yet acknowledged.
#[derive(Debug, Clone)]
struct InFlight {
    batch_seq: u64,
    deadline: Instant,
}

/// Reads pending entries into batches and applies acknowledgements.
pub struct OutboxUploader {
    db: Arc<Database>,
    config: Arc<SyncConfig>,
    batch_seq: u64,
}

impl OutboxUploader {
    pub fn new(db: Arc<Database>, config: Arc<SyncConfig>) -> Self {
        OutboxUploader {
            db,
            config,
            batch_seq: 0,
        }
    }

    /// The next batch to upload, or `None` when nothing is pending.
    pub async fn next_batch(&mut self) -> SyncResult<Option<(u64, SyncMessage)>> {
        let limit = u32::try_from(self.config.sync.batch_size).unwrap_or(u32::MAX);
        let entries = self.db.sync_outbox().get_pending(limit).await?;

        if entries.is_empty() {
            return Ok(None);
        }

        self.batch_seq += 1;
        let message = SyncMessage::outbox_batch(self.config.device_id(), self.batch_seq, &entries);
        debug!(count = entries.len(), batch_seq = self.batch_seq, "Built outbox batch");

        Ok(Some((self.batch_seq, message)))
    }

    /// Marks every entry named in `ack`.
    ///
    /// Acked ids are marked synced even when the ack belongs to an older
    /// batch: the remote has applied them either way.
    pub async fn apply_ack(&self, ack: &BatchAck) -> SyncResult<AckOutcome> {
        let outbox = self.db.sync_outbox();
        let mut outcome = AckOutcome::default();

        for id in &ack.acked_ids {
            outbox.mark_synced(id).await?;
            outcome.synced += 1;
        }

        for failed in &ack.failed {
            if failed.retryable {
                outbox.mark_failed(&failed.id, &failed.error).await?;
                outcome.retry += 1;
            } else {
                warn!(id = %failed.id, error = %failed.error, "Outbox entry rejected by remote");
                outbox.mark_rejected(&failed.id, &failed.error).await?;
                outcome.rejected += 1;
            }
        }

        info!(
            batch_seq = ack.batch_seq,
            synced = outcome.synced,
            retry = outcome.retry,
            rejected = outcome.rejected,
            "Received batch acknowledgement"
        );

        Ok(outcome)
    }

    pub async fn pending_count(&self) -> SyncResult<i64> {
        Ok(self.db.sync_outbox().count_pending().await?)
    }

    /// Deletes acknowledged entries past the retention window. Pending and
    /// rejected entries are kept.
    pub async fn prune(&self) -> SyncResult<u64> {
        let removed = self
            .db
            .sync_outbox()
            .cleanup_old_entries(self.config.sync.retention_days, Utc::now())
            .await?;
        if removed > 0 {
            debug!(removed, "Pruned acknowledged outbox entries");
        }
        Ok(removed)
    }
}

// =============================================================================
// Outbox Processor
// =============================================================================

/// Handle for controlling the outbox processor.
#[derive(Clone)]
pub struct OutboxProcessorHandle {
    nudge: Arc<Notify>,
    ack_tx: mpsc::Sender<BatchAck>,
    shutdown_tx: mpsc::Sender<()>,
}

impl OutboxProcessorHandle {
    /// Asks for a flush soon; coalesces with any pending request.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }

    pub async fn handle_ack(&self, ack: BatchAck) -> SyncResult<()> {
        self.ack_tx
            .send(ack)
            .await
            .map_err(|_| SyncError::ChannelClosed("Ack"))
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelClosed("Shutdown"))
    }
}

pub struct OutboxProcessor {
    uploader: OutboxUploader,
    config: Arc<SyncConfig>,
    transport: TransportHandle,
    state_rx: watch::Receiver<ConnectionState>,
    status: Arc<RwLock<SyncStatus>>,
    emitter: Arc<dyn SyncEventEmitter>,
    nudge: Arc<Notify>,
    ack_rx: mpsc::Receiver<BatchAck>,
    shutdown_rx: mpsc::Receiver<()>,
    backoff: ExponentialBackoff,
    in_flight: Option<InFlight>,
    retry_at: Option<Instant>,
}

impl OutboxProcessor {
    pub fn new(
        db: Arc<Database>,
        config: Arc<SyncConfig>,
        transport: TransportHandle,
        status: Arc<RwLock<SyncStatus>>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> (Self, OutboxProcessorHandle) {
        let (ack_tx, ack_rx) = mpsc::channel(100);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let nudge = Arc::new(Notify::new());

        let processor = OutboxProcessor {
            uploader: OutboxUploader::new(db, config.clone()),
            backoff: new_backoff(config.sync.initial_backoff(), config.sync.max_backoff()),
            state_rx: transport.subscribe(),
            config,
            transport,
            status,
            emitter,
            nudge: nudge.clone(),
            ack_rx,
            shutdown_rx,
            in_flight: None,
            retry_at: None,
        };

        let handle = OutboxProcessorHandle {
            nudge,
            ack_tx,
            shutdown_tx,
        };

        (processor, handle)
    }

    /// Runs until shutdown or until the transport goes away.
    pub async fn run(mut self) {
        info!("Outbox processor starting");
        self.prune().await;

        if self.transport.is_connected() {
            self.flush().await;
        }

        loop {
            let ack_deadline = self.in_flight.as_ref().map(|f| f.deadline);
            let retry_at = self.retry_at;

            tokio::select! {
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        info!("Transport gone, outbox processor exiting");
                        break;
                    }
                    let state = *self.state_rx.borrow_and_update();
                    self.on_connection_change(state).await;
                }

                _ = self.nudge.notified() => {
                    if self.retry_at.is_none() {
                        self.flush().await;
                    }
                }

                Some(ack) = self.ack_rx.recv() => {
                    self.on_ack(ack).await;
                }

                _ = wait_until(retry_at) => {
                    self.retry_at = None;
                    self.flush().await;
                }

                _ = wait_until(ack_deadline) => {
                    if let Some(lost) = self.in_flight.take() {
                        self.fail(SyncError::AckTimeout { batch_seq: lost.batch_seq }).await;
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Outbox processor shutting down");
                    break;
                }
            }
        }

        info!("Outbox processor stopped");
    }

    async fn on_connection_change(&mut self, state: ConnectionState) {
        debug!(%state, "Connection state changed");
        match state {
            ConnectionState::Connected => {
                // A batch sent on the previous socket will never be acked.
                self.in_flight = None;
                self.retry_at = None;
                self.backoff.reset();
                self.flush().await;
            }
            _ => {
                self.in_flight = None;
            }
        }
    }

    async fn on_ack(&mut self, ack: BatchAck) {
        let expected = matches!(&self.in_flight, Some(f) if f.batch_seq == ack.batch_seq);

        let outcome = match self.uploader.apply_ack(&ack).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%e, "Failed to apply batch ack");
                return;
            }
        };

        let pending = self.publish_progress(outcome.synced).await;

        if !expected {
            debug!(batch_seq = ack.batch_seq, "Ack for a batch no longer in flight");
            return;
        }
        self.in_flight = None;

        if outcome.retry > 0 {
            self.fail(SyncError::BatchFailed(format!(
                "{} entries to retry",
                outcome.retry
            )))
            .await;
        } else {
            self.backoff.reset();
            if pending > 0 {
                self.flush().await;
            } else if outcome.synced > 0 {
                self.prune().await;
            }
        }
    }

    async fn prune(&self) {
        if let Err(e) = self.uploader.prune().await {
            warn!(%e, "Failed to prune outbox");
        }
    }

    /// Sends the next batch if connected and nothing is in flight.
    async fn flush(&mut self) {
        if self.in_flight.is_some() || !self.transport.is_connected() {
            return;
        }

        let (batch_seq, message) = match self.uploader.next_batch().await {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                debug!("No pending outbox entries");
                return;
            }
            Err(e) => {
                self.fail(e).await;
                return;
            }
        };

        match self.transport.send(message).await {
            Ok(()) => {
                self.in_flight = Some(InFlight {
                    batch_seq,
                    deadline: Instant::now() + self.config.sync.ack_timeout(),
                });
            }
            Err(e) => self.fail(e).await,
        }
    }

    /// Records the failure and schedules the backoff timer when worth retrying.
    async fn fail(&mut self, err: SyncError) {
        let retryable = err.is_retryable();
        warn!(%err, retryable, "Outbox upload failed");

        self.status.write().await.last_error = Some(err.to_string());
        self.emitter.emit_error(&err.to_string(), retryable);

        if retryable {
            if let Some(delay) = self.backoff.next_backoff() {
                debug!(?delay, "Scheduling outbox retry");
                self.retry_at = Some(Instant::now() + delay);
            }
        }
    }

    async fn publish_progress(&self, synced: usize) -> i64 {
        let pending = match self.uploader.pending_count().await {
            Ok(n) => n,
            Err(e) => {
                error!(%e, "Failed to count pending outbox entries");
                return 0;
            }
        };

        {
            let mut status = self.status.write().await;
            status.pending_count = pending;
            if synced > 0 {
                status.last_sync = Some(Utc::now());
            }
        }
        self.emitter.emit_progress(pending, synced as i64);

        pending
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending::<()>().await,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
