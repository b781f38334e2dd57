//! MIDI → DMX translation for mapped controls

use crate::dmx::DmxWrite;
use crate::mapping::{MappingTable, MidiTrigger};
use crate::midi::MidiMessage;

/// DMX value written for a Note On
pub const NOTE_ON_VALUE: u8 = 255;
/// DMX value written for a Note Off
pub const NOTE_OFF_VALUE: u8 = 0;

/// Scale a 7-bit CC value to a DMX level: `floor(value / 127 * 255)`
pub fn cc_to_dmx(value: u8) -> u8 {
    let value = value.min(127) as u16;
    (value * 255 / 127) as u8
}

/// Stateless translator from MIDI messages to DMX channel writes.
///
/// Only reads the mapping table; learning happens elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct DmxTranslator;

impl DmxTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Writes for every DMX channel bound to the message's trigger.
    ///
    /// Control changes scale linearly, notes are binary on/off. Unmapped messages and
    /// other message types produce nothing.
    pub fn translate(&self, table: &MappingTable, message: &MidiMessage) -> Vec<DmxWrite> {
        let value = match *message {
            MidiMessage::ControlChange { value, .. } => cc_to_dmx(value),
            MidiMessage::NoteOn { velocity, .. } if velocity > 0 => NOTE_ON_VALUE,
            MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. } => NOTE_OFF_VALUE,
            _ => return Vec::new(),
        };

        let Some(trigger) = MidiTrigger::from_message(message) else {
            return Vec::new();
        };

        table
            .lookup_by_trigger(&trigger)
            .into_iter()
            .map(|channel| DmxWrite { channel, value })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::DmxChannel;
    use proptest::prelude::*;

    fn ch(i: u16) -> DmxChannel {
        DmxChannel::new(i).unwrap()
    }

    fn cc(channel: u8, controller: u8, value: u8) -> MidiMessage {
        MidiMessage::ControlChange { channel, controller, value }
    }

    #[test]
    fn test_scaling_boundaries() {
        assert_eq!(cc_to_dmx(0), 0);
        assert_eq!(cc_to_dmx(64), 128);
        assert_eq!(cc_to_dmx(127), 255);
    }

    #[test]
    fn test_translate_cc() {
        let mut table = MappingTable::new();
        table.set(ch(10), MidiTrigger::controller(0, 1).unwrap());
        let translator = DmxTranslator::new();

        assert_eq!(
            translator.translate(&table, &cc(0, 1, 127)),
            vec![DmxWrite { channel: ch(10), value: 255 }]
        );
        assert_eq!(
            translator.translate(&table, &cc(0, 1, 0)),
            vec![DmxWrite { channel: ch(10), value: 0 }]
        );
        assert_eq!(
            translator.translate(&table, &cc(0, 1, 64)),
            vec![DmxWrite { channel: ch(10), value: 128 }]
        );
    }

    #[test]
    fn test_translate_notes_are_binary() {
        let mut table = MappingTable::new();
        table.set(ch(20), MidiTrigger::note(9, 36).unwrap());
        let translator = DmxTranslator::new();

        let on = MidiMessage::NoteOn { channel: 9, note: 36, velocity: 1 };
        let off = MidiMessage::NoteOff { channel: 9, note: 36, velocity: 64 };

        assert_eq!(translator.translate(&table, &on), vec![DmxWrite { channel: ch(20), value: 255 }]);
        assert_eq!(translator.translate(&table, &off), vec![DmxWrite { channel: ch(20), value: 0 }]);
    }

    #[test]
    fn test_unmapped_and_other_kinds_ignored() {
        let mut table = MappingTable::new();
        table.set(ch(1), MidiTrigger::controller(0, 1).unwrap());
        let translator = DmxTranslator::new();

        // Same controller number on a different MIDI channel
        assert!(translator.translate(&table, &cc(1, 1, 100)).is_empty());
        // A note never matches a controller trigger
        let note = MidiMessage::NoteOn { channel: 0, note: 1, velocity: 100 };
        assert!(translator.translate(&table, &note).is_empty());
        let pb = MidiMessage::PitchBend { channel: 0, value: 16383 };
        assert!(translator.translate(&table, &pb).is_empty());
    }

    #[test]
    fn test_writes_every_bound_channel() {
        let mut table = MappingTable::new();
        let trigger = MidiTrigger::controller(0, 1).unwrap();
        table.insert_unchecked(ch(4), trigger);
        table.insert_unchecked(ch(2), trigger);

        let writes = DmxTranslator::new().translate(&table, &cc(0, 1, 127));
        assert_eq!(
            writes,
            vec![
                DmxWrite { channel: ch(2), value: 255 },
                DmxWrite { channel: ch(4), value: 255 },
            ]
        );
    }

    proptest! {
        #[test]
        fn scaling_is_monotonic_and_matches_floor(value in 0u8..=127) {
            let expected = ((value as f64 / 127.0) * 255.0).floor() as u8;
            prop_assert_eq!(cc_to_dmx(value), expected);
            if value > 0 {
                prop_assert!(cc_to_dmx(value) > cc_to_dmx(value - 1));
            }
        }
    }
}
