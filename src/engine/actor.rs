use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{info, trace, warn};

use super::commands::EngineCommand;
use super::handle::EngineHandle;
use super::{Notification, Notifier};
use crate::dmx::DmxChannelSink;
use crate::error::Result;
use crate::learn::{ArmedSession, LearnSession, DEFAULT_LEARN_TIMEOUT};
use crate::mapping::{DmxChannel, Mapping, MappingStore};
use crate::midi::MidiEvent;
use crate::translator::DmxTranslator;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Learn timeout used when a start request doesn't name one
    pub learn_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            learn_timeout: DEFAULT_LEARN_TIMEOUT,
        }
    }
}

/// Learn deadline and the session generation it belongs to
#[derive(Debug, Clone, Copy)]
struct LearnDeadline {
    at: Instant,
    generation: u64,
}

/// The engine actor. Spawn it with [`Engine::spawn`] and talk to it through the handle.
pub struct Engine {
    store: MappingStore,
    learn: LearnSession,
    translator: DmxTranslator,
    sink: Arc<dyn DmxChannelSink>,
    notifier: Notifier,
    options: EngineOptions,
    deadline: Option<LearnDeadline>,
    cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
}

impl Engine {
    /// Spawn the actor on the current Tokio runtime
    pub fn spawn(
        store: MappingStore,
        sink: Arc<dyn DmxChannelSink>,
        notifier: Notifier,
        options: EngineOptions,
    ) -> EngineHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let engine = Engine {
            store,
            learn: LearnSession::new(),
            translator: DmxTranslator::new(),
            sink,
            notifier: notifier.clone(),
            options,
            deadline: None,
            cmd_rx,
        };
        tokio::spawn(engine.run());

        EngineHandle::new(cmd_tx, notifier)
    }

    async fn run(mut self) {
        info!(
            "Engine started ({} mappings, learn timeout {:?})",
            self.store.len(),
            self.options.learn_timeout
        );

        loop {
            let deadline = self.deadline;

            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(EngineCommand::Shutdown { reply }) => {
                            let result = self.shutdown().await;
                            let _ = reply.send(result);
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            // Every handle dropped
                            let _ = self.shutdown().await;
                            break;
                        }
                    }
                }
                _ = sleep_until(deadline.map(|d| d.at).unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(deadline) = deadline {
                        self.on_learn_timeout(deadline.generation);
                    }
                }
            }
        }

        info!("Engine stopped");
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::StartLearn {
                target,
                timeout,
                reply,
            } => {
                let result = self.start_learn(target, timeout);
                let _ = reply.send(result);
            }
            EngineCommand::CancelLearn { reply } => {
                let _ = reply.send(self.cancel_learn());
            }
            EngineCommand::Midi(event) => self.on_midi(event),
            EngineCommand::SetMapping {
                channel,
                trigger,
                reply,
            } => {
                let result = self.store.set(channel, trigger);
                if let Ok(outcome) = &result {
                    self.notifier.publish(Notification::MappingSet {
                        mapping: Mapping { channel, trigger },
                        superseded: outcome.superseded.clone(),
                    });
                }
                let _ = reply.send(result);
            }
            EngineCommand::RemoveMapping { channel, reply } => {
                let removed = self.store.remove(channel);
                if let Some(trigger) = removed {
                    self.notifier
                        .publish(Notification::MappingRemoved { channel, trigger });
                }
                let _ = reply.send(removed);
            }
            EngineCommand::ClearMappings { reply } => {
                let count = self.store.clear();
                self.notifier
                    .publish(Notification::MappingsCleared { count });
                let _ = reply.send(count);
            }
            EngineCommand::ListMappings { reply } => {
                let _ = reply.send(self.store.mappings());
            }
            EngineCommand::Lookup { trigger, reply } => {
                let _ = reply.send(self.store.lookup_by_trigger(&trigger));
            }
            EngineCommand::LearnStatus { reply } => {
                let _ = reply.send(self.learn.state());
            }
            EngineCommand::Flush { reply } => {
                let _ = reply.send(self.store.flush().await);
            }
            EngineCommand::Shutdown { .. } => {
                // Handled in the run loop
            }
        }
    }

    fn start_learn(
        &mut self,
        target: DmxChannel,
        timeout: Option<Duration>,
    ) -> Result<ArmedSession> {
        let timeout = timeout.unwrap_or(self.options.learn_timeout);
        let session = self.learn.start(target, timeout)?;

        self.deadline = Some(LearnDeadline {
            at: Instant::now() + timeout,
            generation: session.generation,
        });
        self.notifier.publish(Notification::LearnStarted {
            channel: target,
            timeout_ms: timeout.as_millis() as u64,
        });
        Ok(session)
    }

    fn cancel_learn(&mut self) -> Option<DmxChannel> {
        let cancelled = self.learn.cancel();
        if let Some(channel) = cancelled {
            self.deadline = None;
            self.notifier
                .publish(Notification::LearnCancelled { channel });
        }
        cancelled
    }

    fn on_learn_timeout(&mut self, generation: u64) {
        self.deadline = None;
        if let Some(channel) = self.learn.expire(generation) {
            self.notifier.publish(Notification::LearnTimedOut { channel });
        }
    }

    fn on_midi(&mut self, event: MidiEvent) {
        trace!("Engine <- {} from {}", event.message, event.source);
        self.notifier
            .publish(Notification::MidiMessage(event.clone()));

        // An armed session consumes every event; nothing is translated while learning
        if self.learn.is_armed() {
            if let Some(mapping) = self.learn.observe(&event) {
                self.deadline = None;
                let outcome = match self.store.set(mapping.channel, mapping.trigger) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!("Learned mapping rejected: {}", e);
                        return;
                    }
                };
                if !outcome.superseded.is_empty() {
                    warn!(
                        "Trigger {} moved to DMX channel {} (was {:?})",
                        mapping.trigger, mapping.channel, outcome.superseded
                    );
                }
                self.notifier.publish(Notification::MappingLearned {
                    mapping,
                    superseded: outcome.superseded,
                });
            }
            return;
        }

        for write in self.translator.translate(self.store.table(), &event.message) {
            trace!(channel = write.channel.index(), value = write.value, "DMX write");
            self.sink.write(write.channel, write.value);
            self.notifier.publish(Notification::DmxWrite(write));
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        info!("Engine shutting down, flushing mappings");
        if self.learn.cancel().is_some() {
            self.deadline = None;
        }
        let result = self.store.flush().await;
        self.store.shutdown();
        result
    }
}
