//! MIDI trigger identity (channel + note, or channel + controller)

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::midi::MidiMessage;

/// The MIDI control source a DMX channel is bound to.
///
/// Persisted as `{ "channel": n, "note": n }` or `{ "channel": n, "controller": n }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTrigger", into = "RawTrigger")]
pub enum MidiTrigger {
    Note { channel: u8, note: u8 },
    Controller { channel: u8, controller: u8 },
}

/// Wire shape shared with the rest of the console's config file
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawTrigger {
    channel: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    note: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    controller: Option<u8>,
}

impl MidiTrigger {
    pub fn note(channel: u8, note: u8) -> Result<Self> {
        check_channel(channel)?;
        check_data("note", note)?;
        Ok(MidiTrigger::Note { channel, note })
    }

    pub fn controller(channel: u8, controller: u8) -> Result<Self> {
        check_channel(channel)?;
        check_data("controller", controller)?;
        Ok(MidiTrigger::Controller { channel, controller })
    }

    /// Check the ranges of a trigger built from the enum variants directly
    pub fn validate(self) -> Result<Self> {
        match self {
            MidiTrigger::Note { channel, note } => MidiTrigger::note(channel, note),
            MidiTrigger::Controller { channel, controller } => {
                MidiTrigger::controller(channel, controller)
            }
        }
    }

    /// Trigger identity of a note or CC message.
    ///
    /// `None` for other message types and for out-of-range fields.
    pub fn from_message(message: &MidiMessage) -> Option<Self> {
        match *message {
            MidiMessage::NoteOn { channel, note, .. } | MidiMessage::NoteOff { channel, note, .. } => {
                MidiTrigger::note(channel, note).ok()
            }
            MidiMessage::ControlChange { channel, controller, .. } => {
                MidiTrigger::controller(channel, controller).ok()
            }
            _ => None,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiTrigger::Note { channel, .. } | MidiTrigger::Controller { channel, .. } => channel,
        }
    }
}

fn check_channel(channel: u8) -> Result<()> {
    if channel > 15 {
        return Err(Error::InvalidTrigger(format!(
            "MIDI channel {} out of range (0-15)",
            channel
        )));
    }
    Ok(())
}

fn check_data(what: &str, value: u8) -> Result<()> {
    if value > 127 {
        return Err(Error::InvalidTrigger(format!(
            "{} {} out of range (0-127)",
            what, value
        )));
    }
    Ok(())
}

impl TryFrom<RawTrigger> for MidiTrigger {
    type Error = Error;

    fn try_from(raw: RawTrigger) -> Result<Self> {
        match (raw.note, raw.controller) {
            (Some(note), None) => MidiTrigger::note(raw.channel, note),
            (None, Some(controller)) => MidiTrigger::controller(raw.channel, controller),
            (Some(_), Some(_)) => Err(Error::InvalidTrigger(
                "mapping has both note and controller".to_string(),
            )),
            (None, None) => Err(Error::InvalidTrigger(
                "mapping has neither note nor controller".to_string(),
            )),
        }
    }
}

impl From<MidiTrigger> for RawTrigger {
    fn from(trigger: MidiTrigger) -> Self {
        match trigger {
            MidiTrigger::Note { channel, note } => RawTrigger {
                channel,
                note: Some(note),
                controller: None,
            },
            MidiTrigger::Controller { channel, controller } => RawTrigger {
                channel,
                note: None,
                controller: Some(controller),
            },
        }
    }
}

impl fmt::Display for MidiTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiTrigger::Note { channel, note } => write!(f, "Note ch:{} n:{}", channel + 1, note),
            MidiTrigger::Controller { channel, controller } => {
                write!(f, "CC ch:{} cc:{}", channel + 1, controller)
            }
        }
    }
}
