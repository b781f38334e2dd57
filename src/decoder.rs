//! MIDI input ports → unified stream of [`MidiEvent`]s
//!
//! Any number of inputs can be attached at once. Every parsed channel message is tagged
//! with its port and handed to the event callback (normally
//! [`EngineHandle::dispatch_midi`](crate::engine::EngineHandle::dispatch_midi)).

use midir::{Ignore, MidiInput, MidiInputConnection};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::midi::{format_hex, MidiEvent, PortId};

/// Callback receiving every decoded event
pub type EventCallback = Arc<dyn Fn(MidiEvent) + Send + Sync>;

/// Callback receiving raw bytes from one open port
pub type RawCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// An open input; dropping or closing it stops delivery
pub trait InputConnection {
    fn close(self: Box<Self>);
}

/// Access to the platform's MIDI inputs
pub trait InputBackend {
    /// Names of the inputs currently available
    fn port_names(&self) -> Result<Vec<String>>;

    /// Open `port_name` (an exact name from [`port_names`](Self::port_names))
    fn open(&self, port_name: &str, on_data: RawCallback) -> Result<Box<dyn InputConnection>>;
}

/// Handle describing an attached port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortHandle {
    pub id: PortId,
    /// Name the port was requested with
    pub requested: String,
}

struct AttachedPort {
    handle: PortHandle,
    connection: Box<dyn InputConnection>,
}

/// Set of attached inputs feeding one event callback
pub struct MidiDecoder {
    backend: Box<dyn InputBackend>,
    ports: BTreeMap<PortId, AttachedPort>,
    on_event: EventCallback,
}

impl MidiDecoder {
    pub fn new(backend: Box<dyn InputBackend>, on_event: EventCallback) -> Self {
        Self {
            backend,
            ports: BTreeMap::new(),
            on_event,
        }
    }

    /// Decoder on the system MIDI inputs
    pub fn with_midir(client_name: &str, on_event: EventCallback) -> Self {
        Self::new(Box::new(MidirBackend::new(client_name)), on_event)
    }

    /// Input ports available to attach
    pub fn available_ports(&self) -> Result<Vec<String>> {
        self.backend.port_names()
    }

    /// Open `port_name` and start forwarding its events.
    ///
    /// The name is matched exactly first, then as a case-insensitive substring.
    /// Attaching a port that is already attached returns the existing handle.
    pub fn attach(&mut self, port_name: &str) -> Result<PortHandle> {
        let available = self.backend.port_names()?;
        let resolved = resolve_port(&available, port_name).ok_or_else(|| Error::PortUnavailable {
            port: port_name.to_string(),
            reason: "no matching input port".to_string(),
        })?;

        let id = PortId::new(resolved);
        if let Some(existing) = self.ports.get(&id) {
            debug!("MIDI input '{}' already attached", id);
            return Ok(existing.handle.clone());
        }

        let on_event = self.on_event.clone();
        let source = id.clone();
        let connection = self.backend.open(
            id.as_str(),
            Box::new(move |data: &[u8]| match MidiEvent::from_raw(&source, data) {
                Some(event) => {
                    trace!("{} <- {}", event.source, event.message);
                    on_event(event);
                }
                None => trace!("Dropping non-channel MIDI from {}: {}", source, format_hex(data)),
            }),
        )?;

        let handle = PortHandle {
            id: id.clone(),
            requested: port_name.to_string(),
        };
        self.ports.insert(
            id.clone(),
            AttachedPort {
                handle: handle.clone(),
                connection,
            },
        );

        info!("MIDI input attached: {}", id);
        Ok(handle)
    }

    /// Close a port. Unknown ports are a no-op; returns whether anything was closed.
    ///
    /// Accepts the resolved port id or the name it was attached with.
    pub fn detach(&mut self, port_name: &str) -> bool {
        let key = self
            .ports
            .values()
            .find(|p| p.handle.id.as_str() == port_name || p.handle.requested == port_name)
            .map(|p| p.handle.id.clone());

        match key.and_then(|id| self.ports.remove(&id)) {
            Some(port) => {
                port.connection.close();
                info!("MIDI input detached: {}", port.handle.id);
                true
            }
            None => {
                debug!("detach: '{}' is not attached", port_name);
                false
            }
        }
    }

    pub fn attached(&self) -> Vec<PortHandle> {
        self.ports.values().map(|p| p.handle.clone()).collect()
    }

    /// Detach every port
    pub fn detach_all(&mut self) {
        let ids: Vec<PortId> = self.ports.keys().cloned().collect();
        for id in ids {
            self.detach(id.as_str());
        }
    }
}

impl Drop for MidiDecoder {
    fn drop(&mut self) {
        self.detach_all();
    }
}

/// Exact match, then case-insensitive substring match
fn resolve_port<'a>(available: &'a [String], pattern: &str) -> Option<&'a str> {
    if let Some(exact) = available.iter().find(|name| name.as_str() == pattern) {
        return Some(exact);
    }
    let needle = pattern.to_lowercase();
    available
        .iter()
        .find(|name| name.to_lowercase().contains(&needle))
        .map(String::as_str)
}

// ============================================================================
// midir backend
// ============================================================================

/// System MIDI inputs via `midir`
pub struct MidirBackend {
    client_name: String,
}

impl MidirBackend {
    pub fn new(client_name: &str) -> Self {
        Self {
            client_name: client_name.to_string(),
        }
    }

    fn client(&self, suffix: &str) -> Result<MidiInput> {
        MidiInput::new(&format!("{}-{}", self.client_name, suffix)).map_err(|e| {
            Error::PortUnavailable {
                port: suffix.to_string(),
                reason: format!("failed to create MIDI client: {}", e),
            }
        })
    }
}

struct MidirConnection(MidiInputConnection<()>);

impl InputConnection for MidirConnection {
    fn close(self: Box<Self>) {
        self.0.close();
    }
}

impl InputBackend for MidirBackend {
    fn port_names(&self) -> Result<Vec<String>> {
        let midi_in = self.client("Scanner")?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    fn open(&self, port_name: &str, mut on_data: RawCallback) -> Result<Box<dyn InputConnection>> {
        let unavailable = |reason: String| Error::PortUnavailable {
            port: port_name.to_string(),
            reason,
        };

        let mut midi_in = self.client("Input")?;
        midi_in.ignore(Ignore::All);

        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).map(|n| n == port_name).unwrap_or(false))
            .ok_or_else(|| unavailable("port disappeared".to_string()))?;

        let connection = midi_in
            .connect(
                &port,
                &self.client_name,
                move |_timestamp, data, _| on_data(data),
                (),
            )
            .map_err(|e| {
                warn!("Failed to open MIDI input '{}': {}", port_name, e);
                unavailable(e.to_string())
            })?;

        Ok(Box::new(MidirConnection(connection)))
    }
}
