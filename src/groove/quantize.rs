// Quantization - Places beat events on the semiquaver grid
// Slot width comes from the winning tracker's beat interval

use serde::{Deserialize, Serialize};

use super::grid::{DrumMap, RhythmStructure};
use crate::events::BeatEvent;

/// Settings for grid quantization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeSettings {
    /// Slots per tracked beat (4 = semiquavers)
    pub subdivisions_per_beat: u32,
}

impl Default for QuantizeSettings {
    fn default() -> Self {
        QuantizeSettings {
            subdivisions_per_beat: 4,
        }
    }
}

impl QuantizeSettings {
    /// Duration of one slot for a beat interval
    pub fn slot_width(&self, beat_interval: f64) -> f64 {
        beat_interval / self.subdivisions_per_beat.max(1) as f64
    }
}

/// Build the flat rhythm grid for a beat interval
///
/// Every beat event lands in slot `floor(time / slot_width)`, including
/// events the tracker never matched. Notes on channels missing from
/// `drum_map` are skipped.
pub fn quantize_events(
    beat_interval: f64,
    events: &[BeatEvent],
    drum_map: &DrumMap,
    settings: &QuantizeSettings,
) -> RhythmStructure {
    let slot_width = settings.slot_width(beat_interval);
    let mut rhythm = RhythmStructure::new(slot_width);

    if !(slot_width.is_finite() && slot_width > 0.0) {
        log::warn!("Cannot quantize with a slot width of {}ms", slot_width);
        return rhythm;
    }

    let mut unmapped = 0usize;

    for event in events {
        let index = (event.time_ms / slot_width).floor().max(0.0) as usize;
        rhythm.extend_to(index + 1);

        for note in &event.notes {
            match drum_map.drum_for(note.source_id) {
                Some(drum) => rhythm.add_drum(index, drum),
                None => unmapped += 1,
            }
        }
    }

    if unmapped > 0 {
        log::debug!("Ignored {} notes on unmapped channels", unmapped);
    }

    rhythm
}
