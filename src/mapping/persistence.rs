//! Persistence actor for debounced mapping writes
//!
//! Mapping mutations hand a snapshot of the table to this actor instead of writing the
//! config file themselves, so MIDI handling never waits on disk I/O.
//!
//! # Debouncing Strategy
//!
//! 1. A save request stores the snapshot as "pending" and records the current time.
//!
//! 2. Another save within the debounce window replaces the pending snapshot
//!    (last-write-wins), so bursts of learn/remove calls become one write.
//!
//! 3. Once the window expires without new requests, the pending snapshot is merged into
//!    the config file (only the `midiMappings` key is replaced) and written atomically.
//!
//! A failed write keeps the snapshot pending and is reported through the failure
//! callback. It is retried on the next save or explicit flush, not on every tick.
//!
//! # Example
//!
//! ```ignore
//! use midi_dmx_bridge::mapping::PersistenceActor;
//!
//! let handle = PersistenceActor::spawn("data/config.json", 250, None);
//! handle.save(table.clone());
//! handle.flush().await?;
//! handle.shutdown();
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use super::document::merge_into_document;
use super::MappingTable;
use crate::error::{Error, Result};

/// Default debounce window in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// Called whenever a snapshot could not be persisted
pub type FailureCallback = Arc<dyn Fn(Error) + Send + Sync>;

/// Commands sent to the persistence actor
#[derive(Debug)]
pub enum PersistenceCommand {
    /// Save a mapping snapshot (debounced)
    Save(MappingTable),
    /// Force flush any pending snapshot and report the outcome
    Flush(oneshot::Sender<Result<()>>),
    /// Flush pending snapshot and stop
    Shutdown,
}

/// Persistence actor that owns the config file writes
pub struct PersistenceActor {
    /// Config file holding the `midiMappings` section
    path: PathBuf,
    /// Command receiver channel
    command_rx: mpsc::UnboundedReceiver<PersistenceCommand>,
    /// Pending snapshot awaiting flush
    pending: Option<MappingTable>,
    /// Last write failed; wait for a new save or an explicit flush before retrying
    retry_blocked: bool,
    /// Timestamp of last save request
    last_save_ts: Instant,
    /// Debounce window in milliseconds
    debounce_ms: u64,
    /// Total number of writes performed
    write_count: u64,
    on_failure: Option<FailureCallback>,
}

/// Handle to communicate with the persistence actor
///
/// This handle is cheap to clone and can be shared across tasks.
#[derive(Clone)]
pub struct PersistenceHandle {
    cmd_tx: mpsc::UnboundedSender<PersistenceCommand>,
    on_failure: Option<FailureCallback>,
}

impl PersistenceActor {
    /// Spawn a new persistence actor writing to `path`.
    ///
    /// `debounce_ms == 0` writes on every save. Must be called inside a Tokio runtime.
    pub fn spawn(
        path: impl Into<PathBuf>,
        debounce_ms: u64,
        on_failure: Option<FailureCallback>,
    ) -> PersistenceHandle {
        let path = path.into();
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();

        let actor = PersistenceActor {
            path,
            command_rx,
            pending: None,
            retry_blocked: false,
            last_save_ts: Instant::now(),
            debounce_ms,
            write_count: 0,
            on_failure: on_failure.clone(),
        };

        tokio::spawn(actor.run());

        PersistenceHandle { cmd_tx, on_failure }
    }

    /// Main actor run loop
    async fn run(mut self) {
        info!(
            "Mapping persistence started for {} (debounce: {}ms)",
            self.path.display(),
            self.debounce_ms
        );

        let tick_interval = if self.debounce_ms > 0 { self.debounce_ms } else { 1000 };
        let mut ticker = tokio::time::interval(Duration::from_millis(tick_interval));

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        // Every handle dropped
                        self.flush_pending().await.ok();
                        return;
                    };
                    match cmd {
                        PersistenceCommand::Save(table) => {
                            trace!("Queuing mapping snapshot ({} entries)", table.len());
                            self.pending = Some(table);
                            self.retry_blocked = false;
                            self.last_save_ts = Instant::now();

                            if self.debounce_ms == 0 {
                                self.flush_pending().await.ok();
                            }
                        }
                        PersistenceCommand::Flush(response_tx) => {
                            trace!("Received flush command");
                            let result = self.flush_pending().await;
                            // Best-effort send, receiver may have dropped
                            let _ = response_tx.send(result);
                        }
                        PersistenceCommand::Shutdown => {
                            info!("Mapping persistence shutting down, flushing pending snapshot");
                            self.flush_pending().await.ok();
                            info!(
                                "Mapping persistence stopped (total writes: {})",
                                self.write_count
                            );
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if self.pending.is_some() && !self.retry_blocked && self.debounce_ms > 0 {
                        let elapsed = self.last_save_ts.elapsed();
                        if elapsed >= Duration::from_millis(self.debounce_ms) {
                            trace!("Debounce window expired ({:?}), flushing", elapsed);
                            self.flush_pending().await.ok();
                        }
                    }
                }
            }
        }
    }

    /// Write the pending snapshot, if any
    async fn flush_pending(&mut self) -> Result<()> {
        let Some(table) = self.pending.take() else {
            trace!("No pending mapping snapshot to flush");
            return Ok(());
        };

        match write_table(&self.path, &table).await {
            Ok(()) => {
                self.write_count += 1;
                debug!(
                    "Wrote {} mappings to {} (write #{})",
                    table.len(),
                    self.path.display(),
                    self.write_count
                );
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                self.pending = Some(table);
                self.retry_blocked = true;
                if let Some(callback) = &self.on_failure {
                    callback(e.clone());
                }
                Err(e)
            }
        }
    }
}

/// Merge `table` into the config at `path` and replace the file atomically
async fn write_table(path: &Path, table: &MappingTable) -> Result<()> {
    let io_err = |what: &str, e: std::io::Error| {
        Error::Persistence(format!("{} {}: {}", what, path.display(), e))
    };

    let existing = match fs::read_to_string(path).await {
        Ok(text) => Some(text),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(io_err("failed to read", e)),
    };

    let json = merge_into_document(existing.as_deref(), table)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err("failed to create directory for", e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json)
        .await
        .map_err(|e| io_err("failed to write", e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| io_err("failed to replace", e))?;

    Ok(())
}

impl PersistenceHandle {
    /// Queue a snapshot for writing (debounced, fire-and-forget).
    ///
    /// If the actor is gone the failure callback receives a `Persistence` error.
    pub fn save(&self, table: MappingTable) {
        if self.cmd_tx.send(PersistenceCommand::Save(table)).is_err() {
            warn!("Mapping persistence actor stopped, snapshot not saved");
            if let Some(callback) = &self.on_failure {
                callback(Error::Persistence("persistence actor stopped".to_string()));
            }
        }
    }

    /// Force flush any pending snapshot and wait for the write result
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(PersistenceCommand::Flush(tx))
            .map_err(|_| Error::Persistence("persistence actor stopped".to_string()))?;

        rx.await
            .map_err(|_| Error::Persistence("persistence actor dropped flush".to_string()))?
    }

    /// Signal the actor to flush and stop
    ///
    /// Fire-and-forget; call [`flush`](Self::flush) first to observe the final write.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(PersistenceCommand::Shutdown);
    }
}
