// Beat Tracking - competing tempo/phase hypotheses
// Seeds a tracker for every tempo hypothesis at every early onset, then walks
// the beat events in order: trackers skip missed beats, absorb matching
// onsets with exponential tempo correction, fork on imprecise matches, and
// are pruned or merged until the best-scoring one is left

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tempo::IntervalCluster;
use crate::events::BeatEvent;

/// How the timing error of a matched onset is scaled when scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// Divide by twice the absolute predicted time
    /// Late onsets are penalized less and less over a long performance
    PredictedTime,

    /// Divide by twice the beat interval, independent of position
    Interval,
}

/// Configuration for the beat tracker population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Deviation above which a match also forks the pre-match tracker
    pub inner_window_ms: f64,

    /// Half-width of the acceptance window as a fraction of the interval
    pub outer_window_factor: f64,

    /// Onsets before this time seed trackers
    pub initial_period_ms: f64,

    /// A tracker with no match for longer than this is pruned
    pub max_gap_ms: f64,

    /// Fraction of the timing error folded back into the interval
    pub correction_factor: f64,

    /// Trackers closer than this in interval...
    pub duplicate_interval_ms: f64,

    /// ...and closer than this in next prediction are merged
    pub duplicate_prediction_ms: f64,

    /// Floor for a corrected interval; keeps prediction advance finite
    pub min_interval_ms: f64,

    pub score_normalization: ScoreNormalization,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            inner_window_ms: 40.0,
            outer_window_factor: 0.3,
            initial_period_ms: 5000.0,
            max_gap_ms: 3000.0,
            correction_factor: 0.2,
            duplicate_interval_ms: 10.0,
            duplicate_prediction_ms: 20.0,
            min_interval_ms: 1.0,
            score_normalization: ScoreNormalization::PredictedTime,
        }
    }
}

/// Errors that can occur during beat tracking
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingError {
    #[error("No beat events to track")]
    NoEvents,

    #[error("No tempo hypotheses to seed trackers from")]
    NoHypotheses,

    #[error("Every beat tracker lost the beat before the end of the performance")]
    LostTrack,
}

/// One "this tempo, starting at this phase" hypothesis
#[derive(Debug, Clone)]
pub struct BeatTracker<'a> {
    /// Current beat interval in milliseconds
    pub interval: f64,

    /// Time at which the next beat is expected
    pub next_prediction: f64,

    /// Beat events matched so far, seed first
    pub history: Vec<&'a BeatEvent>,

    /// Accumulated match score
    pub score: f64,

    /// Rating of the tempo cluster this tracker was seeded from
    pub seed_rating: f64,
}

impl<'a> BeatTracker<'a> {
    /// Seed a tracker on an onset with a starting interval
    pub fn new(interval: f64, seed: &'a BeatEvent, seed_rating: f64) -> Self {
        BeatTracker {
            interval,
            next_prediction: seed.time_ms + interval,
            history: vec![seed],
            score: seed.total_intensity() as f64,
            seed_rating,
        }
    }

    /// Tempo implied by the current interval
    pub fn bpm(&self) -> f64 {
        60000.0 / self.interval
    }

    /// Time of the most recently matched event
    pub fn last_matched_ms(&self) -> Option<f64> {
        self.history.last().map(|e| e.time_ms)
    }

    fn outer_window(&self, config: &TrackerConfig) -> f64 {
        config.outer_window_factor * self.interval
    }

    fn is_stale(&self, time_ms: f64, config: &TrackerConfig) -> bool {
        match self.last_matched_ms() {
            Some(last) => time_ms - last > config.max_gap_ms,
            None => true,
        }
    }

    /// Skip predicted beats that have fallen behind the window for `time_ms`
    fn advance_to(&mut self, time_ms: f64, config: &TrackerConfig) {
        if self.interval <= 0.0 {
            return;
        }
        while self.next_prediction + self.outer_window(config) < time_ms {
            self.next_prediction += self.interval;
        }
    }

    fn accepts(&self, time_ms: f64, config: &TrackerConfig) -> bool {
        let outer = self.outer_window(config);
        time_ms > self.next_prediction - outer && time_ms < self.next_prediction + outer
    }

    fn absorb(&mut self, event: &'a BeatEvent, config: &TrackerConfig) {
        let error = event.time_ms - self.next_prediction;
        self.interval = (self.interval + error * config.correction_factor).max(config.min_interval_ms);
        self.next_prediction = event.time_ms + self.interval;
        self.history.push(event);

        let scale = match config.score_normalization {
            ScoreNormalization::PredictedTime => self.next_prediction,
            ScoreNormalization::Interval => self.interval,
        };
        self.score += (1.0 - error.abs() / (2.0 * scale)) * event.total_intensity() as f64;
    }

    fn is_duplicate_of(&self, other: &BeatTracker<'_>, config: &TrackerConfig) -> bool {
        (self.interval - other.interval).abs() < config.duplicate_interval_ms
            && (self.next_prediction - other.next_prediction).abs() < config.duplicate_prediction_ms
    }

    /// Keep whichever of the two has the strictly higher score
    fn take_best(&mut self, other: BeatTracker<'a>) {
        if other.score > self.score {
            *self = other;
        }
    }

    /// Owned snapshot for logging and traces
    pub fn summary(&self) -> TrackerSummary {
        TrackerSummary {
            interval_ms: self.interval,
            bpm: self.bpm(),
            next_prediction_ms: self.next_prediction,
            first_event_ms: self.history.first().map(|e| e.time_ms),
            matched_events: self.history.len(),
            score: self.score,
            seed_rating: self.seed_rating,
        }
    }
}

/// Serializable snapshot of a tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSummary {
    pub interval_ms: f64,
    pub bpm: f64,
    pub next_prediction_ms: f64,
    pub first_event_ms: Option<f64>,
    pub matched_events: usize,
    pub score: f64,
    pub seed_rating: f64,
}

/// Find the tracker that best explains the beat events
///
/// `events` must be in time order. See `rank_trackers` for the full population.
pub fn find_beat<'a>(
    hypotheses: &[IntervalCluster<'_>],
    events: &'a [BeatEvent],
    config: &TrackerConfig,
) -> Result<BeatTracker<'a>, TrackingError> {
    rank_trackers(hypotheses, events, config)?
        .into_iter()
        .next()
        .ok_or(TrackingError::LostTrack)
}

/// Run the whole tracker population and return survivors, best first
///
/// Final scores are multiplied by each tracker's seed rating before ranking,
/// so trackers from strongly rated tempo clusters win ties.
pub fn rank_trackers<'a>(
    hypotheses: &[IntervalCluster<'_>],
    events: &'a [BeatEvent],
    config: &TrackerConfig,
) -> Result<Vec<BeatTracker<'a>>, TrackingError> {
    if events.is_empty() {
        return Err(TrackingError::NoEvents);
    }
    if hypotheses.is_empty() {
        return Err(TrackingError::NoHypotheses);
    }

    let mut trackers = seed_trackers(hypotheses, events, config);
    log::debug!("Seeded {} beat trackers", trackers.len());

    for event in events {
        step(&mut trackers, event, config);
    }

    if trackers.is_empty() {
        return Err(TrackingError::LostTrack);
    }

    for tracker in trackers.iter_mut() {
        tracker.score *= tracker.seed_rating;
    }

    trackers.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(trackers)
}

/// One tracker per (hypothesis, onset in the initial period)
fn seed_trackers<'a>(
    hypotheses: &[IntervalCluster<'_>],
    events: &'a [BeatEvent],
    config: &TrackerConfig,
) -> Vec<BeatTracker<'a>> {
    let mut trackers = Vec::new();

    for cluster in hypotheses {
        let interval = cluster.mean_length.max(config.min_interval_ms);
        for seed in events.iter().filter(|e| e.time_ms < config.initial_period_ms) {
            trackers.push(BeatTracker::new(interval, seed, cluster.rating as f64));
        }
    }

    trackers
}

/// Feed one beat event to the whole population
fn step<'a>(trackers: &mut Vec<BeatTracker<'a>>, event: &'a BeatEvent, config: &TrackerConfig) {
    trackers.retain(|t| !t.is_stale(event.time_ms, config));

    let mut forks = Vec::new();

    for tracker in trackers.iter_mut().rev() {
        tracker.advance_to(event.time_ms, config);

        if tracker.accepts(event.time_ms, config) {
            // The onset might belong to a different beat: keep the unmatched state too
            if (event.time_ms - tracker.next_prediction).abs() > config.inner_window_ms {
                forks.push(tracker.clone());
            }
            tracker.absorb(event, config);
        }
    }

    trackers.extend(forks);
    merge_duplicates(trackers, config);
}

/// Collapse near-identical trackers, first match in population order
fn merge_duplicates(trackers: &mut Vec<BeatTracker<'_>>, config: &TrackerConfig) {
    let mut merged: Vec<BeatTracker<'_>> = Vec::with_capacity(trackers.len());

    for tracker in trackers.drain(..) {
        match merged.iter_mut().find(|m| m.is_duplicate_of(&tracker, config)) {
            Some(existing) => existing.take_best(tracker),
            None => merged.push(tracker),
        }
    }

    *trackers = merged;
}
