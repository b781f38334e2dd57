//! Scenario tests for the engine actor

use super::*;
use crate::dmx::DmxChannelSink;
use crate::error::Error;
use crate::learn::LearnState;
use crate::mapping::{load_table, MappingStore, MappingTable};
use crate::midi::MidiMessage;
use parking_lot::Mutex;
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;

#[derive(Default)]
struct RecordingSink {
    writes: Mutex<Vec<(u16, u8)>>,
}

impl RecordingSink {
    fn writes(&self) -> Vec<(u16, u8)> {
        self.writes.lock().clone()
    }
}

impl DmxChannelSink for RecordingSink {
    fn write(&self, channel: DmxChannel, value: u8) {
        self.writes.lock().push((channel.index(), value));
    }
}

struct Harness {
    engine: EngineHandle,
    sink: Arc<RecordingSink>,
    notifications: broadcast::Receiver<Notification>,
}

impl Harness {
    fn new(table: MappingTable) -> Self {
        let notifier = Notifier::default();
        let notifications = notifier.subscribe();
        let sink = Arc::new(RecordingSink::default());
        let engine = Engine::spawn(
            MappingStore::in_memory(table),
            sink.clone(),
            notifier,
            EngineOptions::default(),
        );
        Self {
            engine,
            sink,
            notifications,
        }
    }

    /// Notifications published so far, excluding raw MIDI echoes
    fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            if !matches!(n, Notification::MidiMessage(_)) {
                out.push(n);
            }
        }
        out
    }

    /// Round-trip through the actor so every earlier command has been handled
    async fn settle(&self) -> LearnState {
        self.engine.learn_status().await.unwrap()
    }
}

fn ch(i: u16) -> DmxChannel {
    DmxChannel::new(i).unwrap()
}

fn cc(channel: u8, controller: u8, value: u8) -> MidiMessage {
    MidiMessage::ControlChange { channel, controller, value }
}

fn table_with(channel: u16, trigger: MidiTrigger) -> MappingTable {
    let mut table = MappingTable::new();
    table.set(ch(channel), trigger);
    table
}

#[tokio::test(start_paused = true)]
async fn test_learn_commits_control_change() {
    let mut h = Harness::new(MappingTable::new());

    h.engine.start_learn(ch(5), None).await.unwrap();
    h.engine.simulate(cc(1, 7, 64));
    assert_eq!(h.settle().await, LearnState::Idle);

    let mappings = h.engine.mappings().await.unwrap();
    assert_eq!(
        mappings,
        vec![Mapping {
            channel: ch(5),
            trigger: MidiTrigger::Controller { channel: 1, controller: 7 },
        }]
    );

    let notifications = h.drain();
    assert!(matches!(
        notifications.as_slice(),
        [
            Notification::LearnStarted { .. },
            Notification::MappingLearned { .. }
        ]
    ));

    // The committing event is not translated
    assert!(h.sink.writes().is_empty());

    // Nothing fires once the first timeout passes
    tokio::time::sleep(Duration::from_secs(30)).await;
    h.settle().await;
    assert!(h.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_learn_times_out_without_mapping() {
    let mut h = Harness::new(MappingTable::new());

    h.engine
        .start_learn(ch(5), Some(Duration::from_millis(500)))
        .await
        .unwrap();
    // Non-qualifying input keeps the session armed
    h.engine.simulate(MidiMessage::PitchBend { channel: 0, value: 8192 });

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(h.settle().await, LearnState::Idle);
    assert!(h.engine.mappings().await.unwrap().is_empty());
    assert_eq!(
        h.drain(),
        vec![
            Notification::LearnStarted { channel: ch(5), timeout_ms: 500 },
            Notification::LearnTimedOut { channel: ch(5) },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_while_armed_fails() {
    let mut h = Harness::new(MappingTable::new());

    h.engine.start_learn(ch(3), None).await.unwrap();
    let err = h.engine.start_learn(ch(5), None).await.unwrap_err();
    assert_eq!(err, Error::LearnAlreadyActive { active: ch(3) });

    match h.settle().await {
        LearnState::Armed(session) => assert_eq!(session.target, ch(3)),
        other => panic!("expected armed session, got {:?}", other),
    }
    assert_eq!(h.drain().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_learn_while_idle_is_silent() {
    let mut h = Harness::new(MappingTable::new());

    assert_eq!(h.engine.cancel_learn().await.unwrap(), None);
    assert_eq!(h.settle().await, LearnState::Idle);
    assert!(h.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stale_timeout_cannot_end_new_session() {
    let mut h = Harness::new(MappingTable::new());

    h.engine
        .start_learn(ch(1), Some(Duration::from_millis(100)))
        .await
        .unwrap();
    assert_eq!(h.engine.cancel_learn().await.unwrap(), Some(ch(1)));
    h.engine
        .start_learn(ch(2), Some(Duration::from_secs(5)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    match h.settle().await {
        LearnState::Armed(session) => assert_eq!(session.target, ch(2)),
        other => panic!("expected armed session, got {:?}", other),
    }
    assert!(!h
        .drain()
        .iter()
        .any(|n| matches!(n, Notification::LearnTimedOut { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_translates_mapped_control_change() {
    let trigger = MidiTrigger::controller(0, 1).unwrap();
    let mut h = Harness::new(table_with(10, trigger));

    h.engine.simulate(cc(0, 1, 127));
    h.settle().await;
    assert_eq!(h.sink.writes(), vec![(10, 255)]);

    h.engine.simulate(cc(0, 1, 0));
    h.engine.simulate(cc(0, 1, 64));
    h.engine.simulate(cc(0, 2, 64)); // unmapped
    h.settle().await;

    assert_eq!(h.sink.writes(), vec![(10, 255), (10, 0), (10, 128)]);
    assert_eq!(
        h.drain()
            .into_iter()
            .filter(|n| matches!(n, Notification::DmxWrite(_)))
            .count(),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn test_learning_shadows_translation_and_moves_trigger() {
    let trigger = MidiTrigger::controller(0, 1).unwrap();
    let mut h = Harness::new(table_with(10, trigger));

    h.engine.start_learn(ch(5), None).await.unwrap();
    h.engine.simulate(cc(0, 1, 127));
    h.settle().await;

    assert!(h.sink.writes().is_empty());
    assert_eq!(h.engine.lookup(trigger).await.unwrap(), vec![ch(5)]);

    let learned = h
        .drain()
        .into_iter()
        .find(|n| matches!(n, Notification::MappingLearned { .. }));
    assert_eq!(
        learned,
        Some(Notification::MappingLearned {
            mapping: Mapping { channel: ch(5), trigger },
            superseded: vec![ch(10)],
        })
    );

    h.engine.simulate(cc(0, 1, 127));
    h.settle().await;
    assert_eq!(h.sink.writes(), vec![(5, 255)]);
}

#[tokio::test(start_paused = true)]
async fn test_note_on_and_off() {
    let mut h = Harness::new(table_with(20, MidiTrigger::note(9, 36).unwrap()));

    h.engine.simulate(MidiMessage::NoteOn { channel: 9, note: 36, velocity: 90 });
    h.engine.simulate(MidiMessage::NoteOff { channel: 9, note: 36, velocity: 0 });
    h.settle().await;

    assert_eq!(h.sink.writes(), vec![(20, 255), (20, 0)]);
    h.drain();
}

#[tokio::test(start_paused = true)]
async fn test_remove_twice_is_noop() {
    let trigger = MidiTrigger::note(0, 60).unwrap();
    let mut h = Harness::new(table_with(3, trigger));

    assert_eq!(h.engine.remove_mapping(ch(3)).await.unwrap(), Some(trigger));
    assert_eq!(h.engine.remove_mapping(ch(3)).await.unwrap(), None);
    assert!(h.engine.mappings().await.unwrap().is_empty());

    assert_eq!(
        h.drain(),
        vec![Notification::MappingRemoved { channel: ch(3), trigger }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_manual_set_and_clear() {
    let mut h = Harness::new(MappingTable::new());

    h.engine
        .set_mapping(ch(1), MidiTrigger::controller(0, 1).unwrap())
        .await
        .unwrap();
    h.engine
        .set_mapping(ch(2), MidiTrigger::note(0, 60).unwrap())
        .await
        .unwrap();
    assert_eq!(h.engine.clear_mappings().await.unwrap(), 2);
    assert!(h.engine.mappings().await.unwrap().is_empty());

    let notifications = h.drain();
    assert_eq!(notifications.len(), 3);
    assert_eq!(notifications[2], Notification::MappingsCleared { count: 2 });
}

#[tokio::test]
async fn test_learned_mapping_survives_restart() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.json");
    std::fs::write(&path, json!({ "artNetConfig": { "port": 6454 } }).to_string()).unwrap();

    let notifier = Notifier::default();
    let store = MappingStore::open(&path, 10_000, Some(notifier.persistence_callback()))
        .await
        .unwrap();
    let engine = Engine::spawn(
        store,
        Arc::new(RecordingSink::default()),
        notifier,
        EngineOptions::default(),
    );

    engine.start_learn(ch(5), None).await.unwrap();
    engine.simulate(cc(1, 7, 64));
    engine.shutdown().await.unwrap();

    let table = load_table(&path).await.unwrap();
    assert_eq!(
        table.lookup_by_trigger(&MidiTrigger::controller(1, 7).unwrap()),
        vec![ch(5)]
    );

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["artNetConfig"]["port"], 6454);
}

#[tokio::test]
async fn test_out_of_range_input_is_never_persisted() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.json");

    let notifier = Notifier::default();
    let mut notifications = notifier.subscribe();
    let store = MappingStore::open(&path, 10_000, Some(notifier.persistence_callback()))
        .await
        .unwrap();
    let engine = Engine::spawn(
        store,
        Arc::new(RecordingSink::default()),
        notifier,
        EngineOptions::default(),
    );

    // Learning ignores the event and stays armed
    engine.start_learn(ch(5), None).await.unwrap();
    engine.simulate(cc(20, 200, 1));
    assert!(matches!(
        engine.learn_status().await.unwrap(),
        LearnState::Armed(_)
    ));
    engine.cancel_learn().await.unwrap();

    let err = engine
        .set_mapping(ch(6), MidiTrigger::Controller { channel: 20, controller: 200 })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTrigger(_)));
    let err = engine
        .set_mapping(ch(7), MidiTrigger::Note { channel: 0, note: 128 })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTrigger(_)));
    assert!(engine.mappings().await.unwrap().is_empty());

    engine.flush().await.unwrap();
    let table = load_table(&path).await.unwrap();
    assert!(table.is_empty());

    while let Ok(n) = notifications.try_recv() {
        assert!(!matches!(
            n,
            Notification::MappingLearned { .. } | Notification::MappingSet { .. }
        ));
    }
}

#[tokio::test]
async fn test_persistence_failure_is_notified() {
    let temp = tempdir().unwrap();
    let blocker = temp.path().join("blocker");
    std::fs::write(&blocker, "x").unwrap();
    let path = blocker.join("config.json");

    let notifier = Notifier::default();
    let mut notifications = notifier.subscribe();
    let store = MappingStore::open_empty(&path, 10_000, Some(notifier.persistence_callback()));
    let engine = Engine::spawn(
        store,
        Arc::new(RecordingSink::default()),
        notifier,
        EngineOptions::default(),
    );

    // The mutation itself succeeds in memory
    engine
        .set_mapping(ch(1), MidiTrigger::controller(0, 1).unwrap())
        .await
        .unwrap();
    assert!(matches!(engine.flush().await, Err(Error::Persistence(_))));
    assert_eq!(engine.mappings().await.unwrap().len(), 1);

    let mut failed = false;
    while let Ok(n) = notifications.try_recv() {
        failed |= matches!(n, Notification::PersistenceFailed { .. });
    }
    assert!(failed);
}

#[tokio::test(start_paused = true)]
async fn test_handle_after_shutdown() {
    let h = Harness::new(MappingTable::new());

    h.engine.shutdown().await.unwrap();
    assert_eq!(h.engine.mappings().await.unwrap_err(), Error::EngineStopped);
}

#[test]
fn test_notification_wire_shape() {
    let value = serde_json::to_value(Notification::LearnStarted {
        channel: ch(5),
        timeout_ms: 10_000,
    })
    .unwrap();
    assert_eq!(
        value,
        json!({ "event": "learnStarted", "channel": 5, "timeoutMs": 10000 })
    );

    let value = serde_json::to_value(Notification::DmxWrite(crate::dmx::DmxWrite {
        channel: ch(10),
        value: 255,
    }))
    .unwrap();
    assert_eq!(value, json!({ "event": "dmxWrite", "channel": 10, "value": 255 }));
}
