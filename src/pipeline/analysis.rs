// Analysis pipeline
// Strikes -> beat events -> tempo hypotheses -> winning tracker -> rhythm grid -> hierarchy

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::trace::{Stage, TraceBuilder, TraceEntry};
use crate::config::{AnalysisConfig, ConfigError};
use crate::events::{group_strikes, BeatEvent, StrikeEvent};
use crate::groove::{
    cluster_intervals, find_repeating_unit, induce_hierarchy, quantize_events, rank_trackers, rate_clusters,
    HierarchicalRhythm, IntervalCluster, RhythmStructure, TrackerSummary, TrackingError,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No strike events to analyze")]
    EmptyInput,

    #[error("No plausible tempo found in the performance")]
    NoTempoHypothesis,

    #[error("Beat tracking failed: {0}")]
    Tracking(#[from] TrackingError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Which intermediate artifacts to record in the trace
///
/// Flags only add trace entries and debug log lines; results are unaffected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Beat events after grouping
    pub events: bool,

    /// Interval clusters before rating
    pub clusters: bool,

    /// Clusters that survived rating, best first
    pub rated_clusters: bool,

    /// Final tracker population, best first
    pub trackers: bool,
}

impl Diagnostics {
    pub fn none() -> Self {
        Diagnostics::default()
    }

    pub fn all() -> Self {
        Diagnostics {
            events: true,
            clusters: true,
            rated_clusters: true,
            trackers: true,
        }
    }
}

/// The tempo the winning tracker settled on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempoSummary {
    /// Final beat interval in milliseconds
    pub beat_interval_ms: f64,
    pub bpm: f64,

    /// Onset the winning tracker was seeded on
    pub phase_ms: Option<f64>,

    /// Beat events the winning tracker matched, seed included
    pub matched_events: usize,

    /// Final score after seed rating weighting
    pub score: f64,

    /// Tempo hypotheses that survived rating
    pub hypothesis_count: usize,
}

/// Everything one run produces
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,

    /// SHA-256 of the input file when the strikes came from disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_sha256: Option<String>,

    pub strike_count: usize,
    pub beat_events: Vec<BeatEvent>,
    pub tempo: TempoSummary,
    pub rhythm: RhythmStructure,
    pub repeating_unit: RhythmStructure,
    pub hierarchy: HierarchicalRhythm,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TraceEntry>,
}

impl Analysis {
    pub fn with_input_sha256(mut self, sha256: String) -> Self {
        self.input_sha256 = Some(sha256);
        self
    }
}

/// Collects trace entries for one run and mirrors them to the log
struct Tracer {
    run_id: Uuid,
    entries: Vec<TraceEntry>,
}

impl Tracer {
    fn new(run_id: Uuid) -> Self {
        Tracer {
            run_id,
            entries: Vec::new(),
        }
    }

    fn stage(&self, stage: Stage) -> TraceBuilder {
        TraceBuilder::new(self.run_id, stage)
    }

    fn start(&mut self, stage: Stage, message: impl Into<String>) {
        let entry = self.stage(stage).start(message);
        self.entries.push(entry);
    }

    fn complete(&mut self, stage: Stage, message: impl Into<String>) {
        let entry = self.stage(stage).complete(message);
        log::info!("[{}] {}", stage.as_str(), entry.message);
        self.entries.push(entry);
    }

    /// Record an intermediate artifact
    fn detail<T: Serialize>(&mut self, stage: Stage, message: impl Into<String>, data: &T) {
        let data = serde_json::to_value(data).unwrap_or(serde_json::Value::Null);
        let entry = self.stage(stage).progress(0.5, message).with_data(data);
        log::debug!("[{}] {}: {}", stage.as_str(), entry.message, entry.data.as_ref().unwrap_or(&serde_json::Value::Null));
        self.entries.push(entry);
    }
}

/// Run the whole analysis over one capture
pub fn analyze(
    strikes: &[StrikeEvent],
    config: &AnalysisConfig,
    diagnostics: &Diagnostics,
) -> Result<Analysis, PipelineError> {
    config.validate()?;

    if strikes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let id = Uuid::new_v4();
    let mut tracer = Tracer::new(id);

    tracer.start(Stage::Grouping, format!("Grouping {} strikes", strikes.len()));
    let mut beat_events = group_strikes(strikes, &config.grouping);
    if beat_events.windows(2).any(|w| w[1].time_ms < w[0].time_ms) {
        log::warn!("Beat events out of time order; sorting before tempo analysis");
        beat_events.sort_by(|a, b| a.time_ms.partial_cmp(&b.time_ms).unwrap_or(std::cmp::Ordering::Equal));
    }
    if diagnostics.events {
        tracer.detail(Stage::Grouping, "Beat events", &beat_events);
    }
    tracer.complete(Stage::Grouping, format!("{} beat events", beat_events.len()));

    let (tempo, winning_interval) = track_tempo(&beat_events, config, diagnostics, &mut tracer)?;

    tracer.start(Stage::Quantization, "Building rhythm grid");
    let rhythm = quantize_events(winning_interval, &beat_events, &config.drum_map, &config.rhythm);
    tracer.complete(
        Stage::Quantization,
        format!("{} slots of {:.1}ms, {} hits", rhythm.len(), rhythm.beat_interval, rhythm.hit_count()),
    );

    tracer.start(Stage::Hierarchy, "Inducing hierarchy");
    let repeating_unit = find_repeating_unit(&rhythm);
    let hierarchy = induce_hierarchy(&rhythm);
    tracer.complete(
        Stage::Hierarchy,
        format!("Repeating unit of {} slots, tree depth {}", repeating_unit.len(), hierarchy.depth()),
    );

    Ok(Analysis {
        id,
        created_at: Utc::now(),
        input_sha256: None,
        strike_count: strikes.len(),
        beat_events,
        tempo,
        rhythm,
        repeating_unit,
        hierarchy,
        trace: tracer.entries,
    })
}

/// Clustering, rating and tracking; everything here borrows the beat events
fn track_tempo(
    beat_events: &[BeatEvent],
    config: &AnalysisConfig,
    diagnostics: &Diagnostics,
    tracer: &mut Tracer,
) -> Result<(TempoSummary, f64), PipelineError> {
    tracer.start(Stage::Clustering, "Clustering inter-onset intervals");
    let clusters = cluster_intervals(beat_events, &config.tempo);
    if diagnostics.clusters {
        tracer.detail(Stage::Clustering, "Interval clusters", &summaries(&clusters));
    }
    tracer.complete(Stage::Clustering, format!("{} interval clusters", clusters.len()));

    tracer.start(Stage::Rating, "Rating tempo hypotheses");
    let rated = rate_clusters(clusters, &config.tempo);
    if diagnostics.rated_clusters {
        tracer.detail(Stage::Rating, "Rated clusters", &summaries(&rated));
    }
    if rated.is_empty() {
        return Err(PipelineError::NoTempoHypothesis);
    }
    tracer.complete(
        Stage::Rating,
        format!("{} tempo hypotheses, best {:.1} BPM", rated.len(), rated[0].bpm()),
    );

    tracer.start(Stage::Tracking, "Tracking beats");
    let ranked = rank_trackers(&rated, beat_events, &config.tracker)?;
    if diagnostics.trackers {
        let population: Vec<TrackerSummary> = ranked.iter().map(|t| t.summary()).collect();
        tracer.detail(Stage::Tracking, "Surviving trackers", &population);
    }
    let winner = ranked.first().ok_or(TrackingError::LostTrack)?;

    let tempo = TempoSummary {
        beat_interval_ms: winner.interval,
        bpm: winner.bpm(),
        phase_ms: winner.history.first().map(|e| e.time_ms),
        matched_events: winner.history.len(),
        score: winner.score,
        hypothesis_count: rated.len(),
    };
    tracer.complete(
        Stage::Tracking,
        format!(
            "{:.1} BPM ({:.1}ms), {} of {} beat events matched",
            tempo.bpm,
            tempo.beat_interval_ms,
            tempo.matched_events,
            beat_events.len()
        ),
    );

    Ok((tempo, winner.interval))
}

fn summaries(clusters: &[IntervalCluster<'_>]) -> Vec<crate::groove::ClusterSummary> {
    clusters.iter().map(|c| c.summary()).collect()
}
