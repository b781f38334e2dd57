//! Cloneable handle to the engine actor

use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

use super::commands::EngineCommand;
use super::{Notification, Notifier};
use crate::error::{Error, Result};
use crate::learn::{ArmedSession, LearnState};
use crate::mapping::{DmxChannel, Mapping, MidiTrigger, SetOutcome};
use crate::midi::{MidiEvent, MidiMessage, PortId};

/// Port id attached to events injected with [`EngineHandle::simulate`]
pub const SIMULATED_PORT: &str = "simulated";

#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    notifier: Notifier,
}

impl EngineHandle {
    pub(super) fn new(cmd_tx: mpsc::UnboundedSender<EngineCommand>, notifier: Notifier) -> Self {
        Self { cmd_tx, notifier }
    }

    /// Subscribe to engine notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Hand a decoded event to the engine without waiting.
    ///
    /// Safe to call from MIDI driver threads.
    pub fn dispatch_midi(&self, event: MidiEvent) {
        if self.cmd_tx.send(EngineCommand::Midi(event)).is_err() {
            warn!("Engine stopped, dropping MIDI event");
        }
    }

    /// Inject a synthetic message as if it came from a port named `simulated`
    pub fn simulate(&self, message: MidiMessage) {
        self.dispatch_midi(MidiEvent::new(message, PortId::new(SIMULATED_PORT)));
    }

    pub async fn start_learn(
        &self,
        target: DmxChannel,
        timeout: Option<Duration>,
    ) -> Result<ArmedSession> {
        self.request(|reply| EngineCommand::StartLearn {
            target,
            timeout,
            reply,
        })
        .await?
    }

    /// Cancel learning; returns the cancelled target, `None` if nothing was armed
    pub async fn cancel_learn(&self) -> Result<Option<DmxChannel>> {
        self.request(|reply| EngineCommand::CancelLearn { reply })
            .await
    }

    pub async fn set_mapping(&self, channel: DmxChannel, trigger: MidiTrigger) -> Result<SetOutcome> {
        self.request(|reply| EngineCommand::SetMapping {
            channel,
            trigger,
            reply,
        })
        .await?
    }

    pub async fn remove_mapping(&self, channel: DmxChannel) -> Result<Option<MidiTrigger>> {
        self.request(|reply| EngineCommand::RemoveMapping { channel, reply })
            .await
    }

    pub async fn clear_mappings(&self) -> Result<usize> {
        self.request(|reply| EngineCommand::ClearMappings { reply })
            .await
    }

    pub async fn mappings(&self) -> Result<Vec<Mapping>> {
        self.request(|reply| EngineCommand::ListMappings { reply })
            .await
    }

    pub async fn lookup(&self, trigger: MidiTrigger) -> Result<Vec<DmxChannel>> {
        self.request(|reply| EngineCommand::Lookup { trigger, reply })
            .await
    }

    pub async fn learn_status(&self) -> Result<LearnState> {
        self.request(|reply| EngineCommand::LearnStatus { reply })
            .await
    }

    /// Write pending mappings and wait for the result
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| EngineCommand::Flush { reply })
            .await?
    }

    /// Flush mappings and stop the engine
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| EngineCommand::Shutdown { reply })
            .await?
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| Error::EngineStopped)?;
        rx.await.map_err(|_| Error::EngineStopped)
    }
}
