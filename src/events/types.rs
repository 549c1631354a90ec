// Strike event types
// Raw strikes from a capture session and the beat events merged from them

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single percussion strike as delivered by a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrikeEvent {
    /// Device channel that produced the strike
    /// For MIDI drum kits this is the key number (36 = kick, 38 = snare, ...)
    pub source_id: u8,

    /// Strike velocity [0, 127]
    pub intensity: u8,

    /// Time since the start of the capture
    /// Serialized as fractional milliseconds
    #[serde(rename = "timestamp_ms", with = "duration_ms")]
    pub timestamp: Duration,
}

impl StrikeEvent {
    /// Create a strike at an exact capture offset
    pub fn new(source_id: u8, intensity: u8, timestamp: Duration) -> Self {
        StrikeEvent {
            source_id,
            intensity,
            timestamp,
        }
    }

    /// Create a strike from a millisecond offset (negative offsets clamp to zero)
    pub fn at_ms(source_id: u8, intensity: u8, timestamp_ms: f64) -> Self {
        StrikeEvent::new(source_id, intensity, duration_from_ms(timestamp_ms))
    }

    /// Timestamp in milliseconds from start of capture
    pub fn timestamp_ms(&self) -> f64 {
        duration_to_ms(self.timestamp)
    }
}

/// One strike inside a beat event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub source_id: u8,
    pub intensity: u8,
}

/// A set of near-simultaneous strikes treated as one rhythmic onset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatEvent {
    /// Onset time in milliseconds, taken from the strike that opened the event
    pub time_ms: f64,

    /// Strikes merged into this event, in arrival order
    pub notes: Vec<Note>,
}

impl BeatEvent {
    /// Create an empty beat event at a given time
    pub fn new(time_ms: f64) -> Self {
        BeatEvent {
            time_ms,
            notes: Vec::new(),
        }
    }

    /// Open a new beat event seeded by a strike
    pub fn from_strike(strike: &StrikeEvent) -> Self {
        let mut event = BeatEvent::new(strike.timestamp_ms());
        event.add_strike(strike);
        event
    }

    /// Attach a strike to this event without moving its onset time
    pub fn add_strike(&mut self, strike: &StrikeEvent) {
        self.notes.push(Note {
            source_id: strike.source_id,
            intensity: strike.intensity,
        });
    }

    /// Sum of the intensities of every note in the event
    pub fn total_intensity(&self) -> u32 {
        self.notes.iter().map(|n| n.intensity as u32).sum()
    }
}

pub(crate) fn duration_to_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

pub(crate) fn duration_from_ms(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_nanos((ms * 1_000_000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(super::duration_to_ms(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "timestamp must be a non-negative number of milliseconds, got {}",
                ms
            )));
        }
        Ok(super::duration_from_ms(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strike_timestamp_ms() {
        let strike = StrikeEvent::at_ms(36, 100, 1500.0);
        assert_eq!(strike.timestamp, Duration::from_millis(1500));
        assert_eq!(strike.timestamp_ms(), 1500.0);
    }

    #[test]
    fn test_negative_offset_clamps_to_zero() {
        let strike = StrikeEvent::at_ms(36, 100, -20.0);
        assert_eq!(strike.timestamp, Duration::ZERO);
    }

    #[test]
    fn test_beat_event_from_strike() {
        let strike = StrikeEvent::at_ms(38, 90, 250.0);
        let mut event = BeatEvent::from_strike(&strike);
        event.add_strike(&StrikeEvent::at_ms(42, 40, 260.0));

        assert_eq!(event.time_ms, 250.0);
        assert_eq!(event.notes.len(), 2);
        assert_eq!(event.notes[1], Note { source_id: 42, intensity: 40 });
        assert_eq!(event.total_intensity(), 130);
    }

    #[test]
    fn test_strike_json_uses_milliseconds() {
        let strike = StrikeEvent::at_ms(36, 127, 12.5);
        let json = serde_json::to_value(strike).unwrap();
        assert_eq!(json["timestamp_ms"], 12.5);
        assert_eq!(json["source_id"], 36);

        let parsed: StrikeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, strike);
    }

    #[test]
    fn test_strike_json_rejects_negative_timestamp() {
        let result: Result<StrikeEvent, _> = serde_json::from_str(
            r#"{"source_id": 36, "intensity": 100, "timestamp_ms": -1.0}"#,
        );
        assert!(result.is_err());
    }
}
