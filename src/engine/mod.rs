//! Engine: the single owner of mappings, learn state and DMX output
//!
//! Everything that mutates core state goes through one actor task, so MIDI events,
//! learn commands and the learn timeout are handled strictly one at a time.
//! Collaborators hold an [`EngineHandle`] and observe results through [`Notification`]s.

mod actor;
mod commands;
mod handle;

pub use actor::{Engine, EngineOptions};
pub use commands::EngineCommand;
pub use handle::{EngineHandle, SIMULATED_PORT};

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::dmx::DmxWrite;
use crate::error::Error;
use crate::mapping::{DmxChannel, FailureCallback, Mapping, MidiTrigger};
use crate::midi::MidiEvent;

/// Default capacity of the notification channel
pub const NOTIFICATION_CAPACITY: usize = 256;

/// Boundary events published by the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Notification {
    /// Every decoded MIDI event, learned or translated or neither
    MidiMessage(MidiEvent),
    LearnStarted {
        channel: DmxChannel,
        timeout_ms: u64,
    },
    MappingLearned {
        mapping: Mapping,
        superseded: Vec<DmxChannel>,
    },
    LearnTimedOut {
        channel: DmxChannel,
    },
    LearnCancelled {
        channel: DmxChannel,
    },
    MappingSet {
        mapping: Mapping,
        superseded: Vec<DmxChannel>,
    },
    MappingRemoved {
        channel: DmxChannel,
        trigger: MidiTrigger,
    },
    MappingsCleared {
        count: usize,
    },
    DmxWrite(DmxWrite),
    PersistenceFailed {
        error: String,
    },
}

/// Publisher side of the notification channel.
///
/// Created before the mapping store so persistence failures can be routed to the same
/// subscribers as everything else.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers; having none is not an error
    pub fn publish(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            trace!("No notification subscribers");
        }
    }

    /// Failure callback for the persistence actor
    pub fn persistence_callback(&self) -> FailureCallback {
        let notifier = self.clone();
        Arc::new(move |error: Error| {
            notifier.publish(Notification::PersistenceFailed {
                error: error.to_string(),
            });
        })
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(NOTIFICATION_CAPACITY)
    }
}

#[cfg(test)]
mod tests;
