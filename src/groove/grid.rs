// Rhythm Grid - Drums, channel mapping, and the flat semiquaver grid
// Provides the symbolic structure that quantization fills and the hierarchy consumes

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Drum kit pieces recognised by the rhythm grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Drum {
    Snare,
    TomHigh,
    TomMid,
    TomLow,
    HatOpen,
    HatClosed,
    HatClosing,
    CrashLeft,
    CrashRight,
    Kick,
}

impl Drum {
    /// Every drum in enumeration order
    pub const ALL: [Drum; 10] = [
        Drum::Snare,
        Drum::TomHigh,
        Drum::TomMid,
        Drum::TomLow,
        Drum::HatOpen,
        Drum::HatClosed,
        Drum::HatClosing,
        Drum::CrashLeft,
        Drum::CrashRight,
        Drum::Kick,
    ];

    /// Short tag used in JSON and text output
    pub fn as_str(&self) -> &'static str {
        match self {
            Drum::Snare => "snare",
            Drum::TomHigh => "tom_high",
            Drum::TomMid => "tom_mid",
            Drum::TomLow => "tom_low",
            Drum::HatOpen => "hat_open",
            Drum::HatClosed => "hat_closed",
            Drum::HatClosing => "hat_closing",
            Drum::CrashLeft => "crash_left",
            Drum::CrashRight => "crash_right",
            Drum::Kick => "kick",
        }
    }
}

impl fmt::Display for Drum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drums struck together in one slot, kept in enumeration order
pub type DrumSet = BTreeSet<Drum>;

/// Write a drum set as `{kick snare}`
pub(crate) fn fmt_drum_set(f: &mut fmt::Formatter<'_>, drums: &DrumSet) -> fmt::Result {
    f.write_str("{")?;
    for (i, drum) in drums.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}", drum)?;
    }
    f.write_str("}")
}

/// Channel to drum table
///
/// For MIDI kits the channel is the key number. Channels missing from the
/// table are ignored when building the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrumMap {
    entries: BTreeMap<u8, Drum>,
}

impl DrumMap {
    /// General MIDI percussion keys of a standard kit
    pub fn general_midi() -> Self {
        let entries = [
            (38, Drum::Snare),
            (48, Drum::TomHigh),
            (45, Drum::TomMid),
            (43, Drum::TomLow),
            (46, Drum::HatOpen),
            (44, Drum::HatClosing),
            (42, Drum::HatClosed),
            (49, Drum::CrashLeft),
            (51, Drum::CrashRight),
            (36, Drum::Kick),
        ]
        .into_iter()
        .collect();

        DrumMap { entries }
    }

    /// Map a channel, replacing any previous drum for it
    pub fn insert(&mut self, channel: u8, drum: Drum) -> Option<Drum> {
        self.entries.insert(channel, drum)
    }

    /// Drum for a channel, if mapped
    pub fn drum_for(&self, channel: u8) -> Option<Drum> {
        self.entries.get(&channel).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DrumMap {
    fn default() -> Self {
        DrumMap::general_midi()
    }
}

/// Flat rhythm grid - one drum set per slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmStructure {
    /// Nominal duration of every slot in milliseconds
    pub beat_interval: f64,

    /// Drums struck in each slot
    pub slots: Vec<DrumSet>,
}

impl RhythmStructure {
    /// Create an empty grid with a given slot duration
    pub fn new(beat_interval: f64) -> Self {
        RhythmStructure {
            beat_interval,
            slots: Vec::new(),
        }
    }

    /// Create a grid from existing slots
    pub fn with_slots(beat_interval: f64, slots: Vec<DrumSet>) -> Self {
        RhythmStructure {
            beat_interval,
            slots,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drums in slot `index`, if the grid reaches that far
    pub fn slot(&self, index: usize) -> Option<&DrumSet> {
        self.slots.get(index)
    }

    /// Pad with empty slots until the grid holds at least `len` slots
    pub fn extend_to(&mut self, len: usize) {
        if self.slots.len() < len {
            self.slots.resize_with(len, DrumSet::new);
        }
    }

    /// Record a drum at slot `index`, growing the grid as needed
    pub fn add_drum(&mut self, index: usize, drum: Drum) {
        self.extend_to(index + 1);
        self.slots[index].insert(drum);
    }

    /// Copy `len` slots starting at `start`, truncated at the end of the grid
    pub fn copy_sub(&self, start: usize, len: usize) -> RhythmStructure {
        let start = start.min(self.slots.len());
        let end = start.saturating_add(len).min(self.slots.len());
        RhythmStructure::with_slots(self.beat_interval, self.slots[start..end].to_vec())
    }

    /// Whether the slots from `offset` agree with `pattern`
    ///
    /// Only the overlap is compared, so a pattern running past the end of the
    /// grid matches when the remaining slots equal its prefix.
    pub fn matches_at(&self, offset: usize, pattern: &RhythmStructure) -> bool {
        if offset > self.slots.len() {
            return false;
        }
        self.slots[offset..]
            .iter()
            .zip(pattern.slots.iter())
            .all(|(a, b)| a == b)
    }

    /// Merge every run of `factor` slots into one
    pub fn simplify(&self, factor: usize) -> RhythmStructure {
        if factor <= 1 {
            return self.clone();
        }

        let slots = self
            .slots
            .chunks(factor)
            .map(|chunk| chunk.iter().flatten().copied().collect())
            .collect();

        RhythmStructure::with_slots(self.beat_interval * factor as f64, slots)
    }

    /// Total number of drum hits across all slots
    pub fn hit_count(&self) -> usize {
        self.slots.iter().map(|s| s.len()).sum()
    }

    /// Slots in which `drum` is struck
    pub fn positions_of(&self, drum: Drum) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.contains(&drum))
            .map(|(i, _)| i)
            .collect()
    }
}

impl fmt::Display for RhythmStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, drums) in self.slots.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            fmt_drum_set(f, drums)?;
        }
        Ok(())
    }
}
