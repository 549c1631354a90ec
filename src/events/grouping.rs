// Strike grouping
// Merges near-simultaneous strikes into beat events

use serde::{Deserialize, Serialize};

use super::types::{BeatEvent, StrikeEvent};

/// Default grouping window in milliseconds
pub const EVENT_WIDTH_MS: f64 = 70.0;

/// Configuration for strike grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// A strike closer than this to an existing beat event joins it
    pub event_width_ms: f64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        GroupingConfig {
            event_width_ms: EVENT_WIDTH_MS,
        }
    }
}

/// Group strikes into beat events
///
/// Each strike joins the first existing beat event (in creation order) whose
/// onset lies strictly within `event_width_ms`, even when a later event would
/// be a tighter match. Otherwise it opens a new event at its own timestamp.
/// No strike is ever dropped.
pub fn group_strikes(strikes: &[StrikeEvent], config: &GroupingConfig) -> Vec<BeatEvent> {
    let mut events: Vec<BeatEvent> = Vec::new();
    let mut previous_ms: Option<f64> = None;

    for strike in strikes {
        let timestamp_ms = strike.timestamp_ms();

        if let Some(prev) = previous_ms {
            if timestamp_ms < prev {
                log::warn!(
                    "Strike at {:.1}ms arrived after a later strike at {:.1}ms",
                    timestamp_ms,
                    prev
                );
            }
        }
        previous_ms = Some(timestamp_ms);

        match events
            .iter_mut()
            .find(|event| (timestamp_ms - event.time_ms).abs() < config.event_width_ms)
        {
            Some(event) => event.add_strike(strike),
            None => events.push(BeatEvent::from_strike(strike)),
        }
    }

    events
}
