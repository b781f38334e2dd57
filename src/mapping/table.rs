//! In-memory mapping table with lookups in both directions

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{DmxChannel, Mapping, MidiTrigger};

/// Result of [`MappingTable::set`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOutcome {
    /// Trigger previously bound to the same DMX channel
    pub previous: Option<MidiTrigger>,
    /// Other DMX channels that were bound to the same trigger and got unbound
    pub superseded: Vec<DmxChannel>,
}

/// DMX channel → trigger table.
///
/// `set` keeps at most one channel per trigger (last binding wins). Tables loaded from a
/// hand-edited file may still hold several channels for one trigger, so
/// [`lookup_by_trigger`](Self::lookup_by_trigger) always returns a set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    by_channel: BTreeMap<DmxChannel, MidiTrigger>,
    by_trigger: HashMap<MidiTrigger, BTreeSet<DmxChannel>>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `channel` to `trigger`, unbinding any other channel that used `trigger`
    pub fn set(&mut self, channel: DmxChannel, trigger: MidiTrigger) -> SetOutcome {
        let superseded: Vec<DmxChannel> = self
            .lookup_by_trigger(&trigger)
            .into_iter()
            .filter(|&c| c != channel)
            .collect();

        for &other in &superseded {
            self.remove(other);
        }

        let previous = self.insert_unchecked(channel, trigger);

        SetOutcome {
            previous,
            superseded,
        }
    }

    /// Insert without enforcing trigger uniqueness (used when loading from disk)
    pub(crate) fn insert_unchecked(
        &mut self,
        channel: DmxChannel,
        trigger: MidiTrigger,
    ) -> Option<MidiTrigger> {
        let previous = self.by_channel.insert(channel, trigger);
        if let Some(old) = previous {
            self.unindex(&old, channel);
        }
        self.by_trigger.entry(trigger).or_default().insert(channel);
        previous
    }

    pub fn remove(&mut self, channel: DmxChannel) -> Option<MidiTrigger> {
        let removed = self.by_channel.remove(&channel)?;
        self.unindex(&removed, channel);
        Some(removed)
    }

    /// Remove everything, returning how many mappings were dropped
    pub fn clear(&mut self) -> usize {
        let count = self.by_channel.len();
        self.by_channel.clear();
        self.by_trigger.clear();
        count
    }

    /// DMX channels bound to `trigger`, ascending
    pub fn lookup_by_trigger(&self, trigger: &MidiTrigger) -> Vec<DmxChannel> {
        self.by_trigger
            .get(trigger)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn trigger_for(&self, channel: DmxChannel) -> Option<MidiTrigger> {
        self.by_channel.get(&channel).copied()
    }

    pub fn mappings(&self) -> Vec<Mapping> {
        self.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Mapping> + '_ {
        self.by_channel
            .iter()
            .map(|(&channel, &trigger)| Mapping { channel, trigger })
    }

    pub fn len(&self) -> usize {
        self.by_channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_channel.is_empty()
    }

    fn unindex(&mut self, trigger: &MidiTrigger, channel: DmxChannel) {
        if let Some(set) = self.by_trigger.get_mut(trigger) {
            set.remove(&channel);
            if set.is_empty() {
                self.by_trigger.remove(trigger);
            }
        }
    }
}
