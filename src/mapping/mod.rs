//! DMX channel → MIDI trigger mappings
//!
//! - [`MidiTrigger`]: the note/controller identity a DMX channel listens to
//! - [`MappingTable`]: in-memory table with lookups in both directions
//! - [`MappingStore`]: the table plus debounced persistence to the shared JSON config
//! - [`persistence`]: the actor that coalesces and writes mapping snapshots

mod document;
pub mod persistence;
mod store;
mod table;
mod trigger;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

pub use document::{load_table, merge_into_document, parse_document, MAPPINGS_KEY};
pub use persistence::{FailureCallback, PersistenceActor, PersistenceHandle, DEFAULT_DEBOUNCE_MS};
pub use store::MappingStore;
pub use table::{MappingTable, SetOutcome};
pub use trigger::MidiTrigger;

/// Index into a 512-slot DMX universe (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct DmxChannel(u16);

impl DmxChannel {
    /// Number of channels in a universe
    pub const COUNT: usize = 512;

    pub fn new(index: u16) -> Result<Self> {
        if (index as usize) < Self::COUNT {
            Ok(Self(index))
        } else {
            Err(Error::InvalidChannel(index))
        }
    }

    pub fn index(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for DmxChannel {
    type Error = Error;

    fn try_from(index: u16) -> Result<Self> {
        Self::new(index)
    }
}

impl From<DmxChannel> for u16 {
    fn from(channel: DmxChannel) -> u16 {
        channel.0
    }
}

impl fmt::Display for DmxChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One DMX channel bound to one MIDI trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub channel: DmxChannel,
    pub trigger: MidiTrigger,
}
