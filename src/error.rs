//! Error type for the mapping/learn core.
//!
//! Every variant is recoverable at the boundary; the core never aborts the process.
//! The binary wraps these in `anyhow` with context, library callers match on them.

use std::path::PathBuf;
use thiserror::Error;

use crate::mapping::DmxChannel;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// MIDI input could not be opened (missing, disconnected or claimed by another app)
    #[error("MIDI port '{port}' unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },

    /// A learn session is already armed; the running session is left untouched
    #[error("MIDI learn already active for DMX channel {active}")]
    LearnAlreadyActive { active: DmxChannel },

    /// Mapping file could not be written; in-memory mappings stay authoritative
    #[error("failed to persist MIDI mappings: {0}")]
    Persistence(String),

    /// Mapping file exists but cannot be understood
    #[error("mapping file {} is corrupt: {reason}", path.display())]
    ConfigCorrupt { path: PathBuf, reason: String },

    #[error("DMX channel {0} out of range (0-511)")]
    InvalidChannel(u16),

    #[error("invalid MIDI trigger: {0}")]
    InvalidTrigger(String),

    /// The engine actor has shut down and can no longer accept commands
    #[error("engine stopped")]
    EngineStopped,
}

pub type Result<T> = std::result::Result<T, Error>;
