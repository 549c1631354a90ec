// Drumgrid - Drum strike stream to tempo, rhythm grid and hierarchical rhythm
// Module declarations

pub mod capture;
pub mod config;
pub mod events;
pub mod groove;
pub mod pipeline;

pub use config::{AnalysisConfig, ConfigError};
pub use events::{BeatEvent, Note, StrikeEvent};
pub use groove::{Drum, DrumMap, HierarchicalRhythm, RhythmStructure};
pub use pipeline::{analyze, Analysis, Diagnostics, PipelineError};
