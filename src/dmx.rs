//! DMX output side: the sink the translator writes into.
//!
//! The core only issues channel writes. Forwarding a universe to ArtNet (or anywhere
//! else) is the surrounding application's job.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::mapping::DmxChannel;

/// A single channel write produced by the translator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmxWrite {
    pub channel: DmxChannel,
    pub value: u8,
}

/// Receiver of DMX channel writes.
///
/// Called from the engine's event loop, so implementations must not block.
pub trait DmxChannelSink: Send + Sync {
    fn write(&self, channel: DmxChannel, value: u8);
}

/// In-memory 512-channel universe buffer
#[derive(Clone)]
pub struct DmxUniverse {
    values: Arc<Mutex<[u8; DmxChannel::COUNT]>>,
}

impl DmxUniverse {
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new([0; DmxChannel::COUNT])),
        }
    }

    pub fn get(&self, channel: DmxChannel) -> u8 {
        self.values.lock()[channel.index() as usize]
    }

    /// Copy of the whole universe, e.g. for an ArtNet sender
    pub fn snapshot(&self) -> Vec<u8> {
        self.values.lock().to_vec()
    }

    pub fn blackout(&self) {
        *self.values.lock() = [0; DmxChannel::COUNT];
    }
}

impl Default for DmxUniverse {
    fn default() -> Self {
        Self::new()
    }
}

impl DmxChannelSink for DmxUniverse {
    fn write(&self, channel: DmxChannel, value: u8) {
        self.values.lock()[channel.index() as usize] = value;
    }
}
