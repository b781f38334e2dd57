//! Commands accepted by the engine actor

use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::learn::{ArmedSession, LearnState};
use crate::mapping::{DmxChannel, Mapping, MidiTrigger, SetOutcome};
use crate::midi::MidiEvent;

#[derive(Debug)]
pub enum EngineCommand {
    /// Arm MIDI learn for a DMX channel (`None` uses the engine default timeout)
    StartLearn {
        target: DmxChannel,
        timeout: Option<Duration>,
        reply: oneshot::Sender<Result<ArmedSession>>,
    },
    CancelLearn {
        reply: oneshot::Sender<Option<DmxChannel>>,
    },
    /// Decoded input event (fire-and-forget)
    Midi(MidiEvent),
    SetMapping {
        channel: DmxChannel,
        trigger: MidiTrigger,
        reply: oneshot::Sender<Result<SetOutcome>>,
    },
    RemoveMapping {
        channel: DmxChannel,
        reply: oneshot::Sender<Option<MidiTrigger>>,
    },
    ClearMappings {
        reply: oneshot::Sender<usize>,
    },
    ListMappings {
        reply: oneshot::Sender<Vec<Mapping>>,
    },
    Lookup {
        trigger: MidiTrigger,
        reply: oneshot::Sender<Vec<DmxChannel>>,
    },
    LearnStatus {
        reply: oneshot::Sender<LearnState>,
    },
    /// Write pending mappings now
    Flush {
        reply: oneshot::Sender<Result<()>>,
    },
    /// Flush, stop persistence and exit the loop
    Shutdown {
        reply: oneshot::Sender<Result<()>>,
    },
}
