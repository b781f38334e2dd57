//! MIDI learn session state machine
//!
//! `Idle → Armed(target) → {Committed | Cancelled | TimedOut} → Idle`
//!
//! Each arming gets a new generation number. Timeouts carry the generation they were
//! scheduled for, so a timer from an earlier session can never end a newer one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::mapping::{DmxChannel, Mapping, MidiTrigger};
use crate::midi::{MidiEvent, MidiMessage};

/// Default time to wait for a controller before giving up
pub const DEFAULT_LEARN_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot of an armed session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmedSession {
    pub target: DmxChannel,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    pub timeout: Duration,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnState {
    Idle,
    Armed(ArmedSession),
}

/// The single learn session of a running engine
#[derive(Debug)]
pub struct LearnSession {
    state: LearnState,
    next_generation: u64,
}

impl LearnSession {
    pub fn new() -> Self {
        Self {
            state: LearnState::Idle,
            next_generation: 1,
        }
    }

    pub fn state(&self) -> LearnState {
        self.state
    }

    pub fn armed(&self) -> Option<ArmedSession> {
        match self.state {
            LearnState::Armed(session) => Some(session),
            LearnState::Idle => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed().is_some()
    }

    /// Arm the session for `target`.
    ///
    /// Fails with `LearnAlreadyActive` while another target is armed; that session is
    /// left as it was.
    pub fn start(&mut self, target: DmxChannel, timeout: Duration) -> Result<ArmedSession> {
        if let LearnState::Armed(active) = self.state {
            return Err(Error::LearnAlreadyActive {
                active: active.target,
            });
        }

        let session = ArmedSession {
            target,
            started_at: Utc::now(),
            timeout,
            generation: self.next_generation,
        };
        self.next_generation += 1;
        self.state = LearnState::Armed(session);

        info!(
            "MIDI learn armed for DMX channel {} (timeout {:?})",
            target, timeout
        );
        Ok(session)
    }

    /// Offer an incoming event to the session.
    ///
    /// The first Note On (velocity > 0) or Control Change while armed commits and
    /// returns the mapping to store. Everything else is ignored.
    pub fn observe(&mut self, event: &MidiEvent) -> Option<Mapping> {
        let LearnState::Armed(session) = self.state else {
            return None;
        };

        let trigger = match event.message {
            MidiMessage::NoteOn { channel, note, velocity } if velocity > 0 => {
                MidiTrigger::note(channel, note)
            }
            MidiMessage::ControlChange { channel, controller, .. } => {
                MidiTrigger::controller(channel, controller)
            }
            _ => {
                debug!("Ignoring {} from {} for MIDI learn", event.message, event.source);
                return None;
            }
        };
        let trigger = match trigger {
            Ok(trigger) => trigger,
            Err(e) => {
                warn!("Ignoring {} from {} for MIDI learn: {}", event.message, event.source, e);
                return None;
            }
        };

        self.state = LearnState::Idle;
        info!(
            "MIDI learn committed: DMX channel {} <- {} (from {})",
            session.target, trigger, event.source
        );

        Some(Mapping {
            channel: session.target,
            trigger,
        })
    }

    /// Cancel the armed session. Returns the cancelled target, `None` if idle.
    pub fn cancel(&mut self) -> Option<DmxChannel> {
        let LearnState::Armed(session) = self.state else {
            return None;
        };
        self.state = LearnState::Idle;
        info!("MIDI learn cancelled for DMX channel {}", session.target);
        Some(session.target)
    }

    /// Time out the session armed as `generation`.
    ///
    /// Stale generations (session already committed, cancelled or re-armed) are ignored.
    pub fn expire(&mut self, generation: u64) -> Option<DmxChannel> {
        match self.state {
            LearnState::Armed(session) if session.generation == generation => {
                self.state = LearnState::Idle;
                info!("MIDI learn for DMX channel {} timed out", session.target);
                Some(session.target)
            }
            _ => {
                debug!("Ignoring stale learn timeout (generation {})", generation);
                None
            }
        }
    }
}

impl Default for LearnSession {
    fn default() -> Self {
        Self::new()
    }
}
