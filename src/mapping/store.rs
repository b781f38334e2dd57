//! Canonical mapping table with durable updates

use std::path::PathBuf;
use tracing::{debug, info};

use super::persistence::{FailureCallback, PersistenceActor, PersistenceHandle};
use super::{load_table, DmxChannel, Mapping, MappingTable, MidiTrigger, SetOutcome};
use crate::error::Result;

/// Owner of all mappings and sole writer of the config's `midiMappings` section.
///
/// Mutations apply in memory immediately and schedule a coalesced write. Write failures
/// are reported asynchronously through the persistence failure callback.
pub struct MappingStore {
    table: MappingTable,
    persistence: Option<PersistenceHandle>,
}

impl MappingStore {
    /// Store that never touches disk
    pub fn in_memory(table: MappingTable) -> Self {
        Self {
            table,
            persistence: None,
        }
    }

    /// Load mappings from `path` and spawn the persistence actor for it.
    ///
    /// Fails with `ConfigCorrupt` if the file cannot be parsed; the caller decides whether
    /// to fall back to [`MappingStore::open_empty`].
    pub async fn open(
        path: impl Into<PathBuf>,
        debounce_ms: u64,
        on_failure: Option<FailureCallback>,
    ) -> Result<Self> {
        let path = path.into();
        let table = load_table(&path).await?;
        let persistence = PersistenceActor::spawn(path, debounce_ms, on_failure);
        Ok(Self {
            table,
            persistence: Some(persistence),
        })
    }

    /// Persisted store that starts empty regardless of what is on disk
    pub fn open_empty(
        path: impl Into<PathBuf>,
        debounce_ms: u64,
        on_failure: Option<FailureCallback>,
    ) -> Self {
        let persistence = PersistenceActor::spawn(path.into(), debounce_ms, on_failure);
        Self {
            table: MappingTable::new(),
            persistence: Some(persistence),
        }
    }

    /// Bind `channel` to `trigger` (last binding of a trigger wins).
    ///
    /// Out-of-range triggers are rejected with `InvalidTrigger` so nothing unloadable is
    /// ever written.
    pub fn set(&mut self, channel: DmxChannel, trigger: MidiTrigger) -> Result<SetOutcome> {
        let trigger = trigger.validate()?;
        let outcome = self.table.set(channel, trigger);
        debug!(
            channel = channel.index(),
            trigger = %trigger,
            superseded = ?outcome.superseded,
            "Mapping set"
        );
        self.persist();
        Ok(outcome)
    }

    /// Remove the mapping for `channel`; absent mappings are a no-op without a write
    pub fn remove(&mut self, channel: DmxChannel) -> Option<MidiTrigger> {
        let removed = self.table.remove(channel);
        if removed.is_some() {
            debug!(channel = channel.index(), "Mapping removed");
            self.persist();
        }
        removed
    }

    pub fn clear(&mut self) -> usize {
        let count = self.table.clear();
        info!("Cleared {} MIDI mappings", count);
        self.persist();
        count
    }

    pub fn lookup_by_trigger(&self, trigger: &MidiTrigger) -> Vec<DmxChannel> {
        self.table.lookup_by_trigger(trigger)
    }

    pub fn trigger_for(&self, channel: DmxChannel) -> Option<MidiTrigger> {
        self.table.trigger_for(channel)
    }

    pub fn mappings(&self) -> Vec<Mapping> {
        self.table.mappings()
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Write any pending snapshot now and report the result
    pub async fn flush(&self) -> Result<()> {
        match &self.persistence {
            Some(persistence) => persistence.flush().await,
            None => Ok(()),
        }
    }

    /// Stop the persistence actor after a final flush
    pub fn shutdown(&self) {
        if let Some(persistence) = &self.persistence {
            persistence.shutdown();
        }
    }

    fn persist(&self) {
        if let Some(persistence) = &self.persistence {
            persistence.save(self.table.clone());
        }
    }
}
