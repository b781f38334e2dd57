//! MIDI DMX Bridge
//!
//! Maps MIDI controls onto DMX channels. A control is bound either by hand or by
//! MIDI learn (arm a DMX channel, move a fader), bindings persist in a shared JSON config,
//! and mapped MIDI input is translated into DMX channel writes.

pub mod config;
pub mod decoder;
pub mod dmx;
pub mod engine;
pub mod error;
pub mod learn;
pub mod mapping;
pub mod midi;
pub mod paths;
pub mod translator;

pub use error::{Error, Result};
