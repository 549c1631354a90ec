// Groove Engine - Tempo, tracking, grid, and hierarchy
// Turns beat events into a tempo, a flat rhythm grid and its binary-tree form

pub mod grid;
pub mod hierarchy;
pub mod quantize;
pub mod tempo;
pub mod tracker;

pub use grid::{Drum, DrumMap, DrumSet, RhythmStructure};
pub use hierarchy::{find_repeating_unit, induce_hierarchy, repeating_unit_length, HierarchicalRhythm, NodeRef};
pub use quantize::{quantize_events, QuantizeSettings};
pub use tempo::{cluster_intervals, rate_clusters, ClusterSummary, EventInterval, IntervalCluster, TempoConfig};
pub use tracker::{find_beat, rank_trackers, BeatTracker, ScoreNormalization, TrackerConfig, TrackerSummary, TrackingError};
