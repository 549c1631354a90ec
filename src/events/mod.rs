// Event module
// Strike events from a capture and their grouping into beat events

pub mod grouping;
pub mod types;

pub use grouping::{group_strikes, GroupingConfig, EVENT_WIDTH_MS};
pub use types::{BeatEvent, Note, StrikeEvent};
