// Tempo Hypotheses - interval clustering and harmonic rating
// Builds inter-event intervals, clusters them by length, and rates each
// cluster by how many other intervals it explains as small-integer multiples

use serde::{Deserialize, Serialize};

use crate::events::BeatEvent;

/// Default cluster width in milliseconds
pub const CLUSTER_WIDTH_MS: f64 = 70.0;

/// Configuration for tempo hypothesis generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// An interval joins a cluster whose mean is strictly within this distance
    pub cluster_width_ms: f64,

    /// Intervals of this length or longer are never clustered
    pub max_interval_ms: f64,

    /// Slowest tempo kept after rating (60 BPM = 1000ms)
    pub min_bpm: f64,

    /// Fastest tempo kept after rating (240 BPM = 250ms)
    pub max_bpm: f64,

    /// Largest integer ratio tested when rating clusters against each other
    pub max_multiple: u32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        TempoConfig {
            cluster_width_ms: CLUSTER_WIDTH_MS,
            max_interval_ms: 2000.0,
            min_bpm: 60.0,
            max_bpm: 240.0,
            max_multiple: 8,
        }
    }
}

impl TempoConfig {
    /// Shortest beat interval kept after rating
    pub fn min_beat_interval_ms(&self) -> f64 {
        60000.0 / self.max_bpm
    }

    /// Longest beat interval kept after rating
    pub fn max_beat_interval_ms(&self) -> f64 {
        60000.0 / self.min_bpm
    }
}

/// Time between two beat events
#[derive(Debug, Clone, Copy)]
pub struct EventInterval<'a> {
    pub length: f64,
    pub start: &'a BeatEvent,
    pub end: &'a BeatEvent,
}

impl<'a> EventInterval<'a> {
    pub fn new(start: &'a BeatEvent, end: &'a BeatEvent) -> Self {
        EventInterval {
            length: end.time_ms - start.time_ms,
            start,
            end,
        }
    }
}

/// A group of intervals with similar lengths - one tempo hypothesis
#[derive(Debug, Clone)]
pub struct IntervalCluster<'a> {
    /// Member intervals in insertion order
    pub members: Vec<EventInterval<'a>>,

    /// Running mean of member lengths, updated as members are added
    pub mean_length: f64,

    /// Harmonic-consistency rating, assigned by `rate_clusters`
    pub rating: u32,
}

impl<'a> IntervalCluster<'a> {
    /// Start a singleton cluster
    pub fn new(interval: EventInterval<'a>) -> Self {
        IntervalCluster {
            members: vec![interval],
            mean_length: interval.length,
            rating: 0,
        }
    }

    /// Add an interval and update the running mean incrementally
    pub fn add(&mut self, interval: EventInterval<'a>) {
        self.members.push(interval);
        let n = self.members.len() as f64;
        self.mean_length = (self.mean_length * (n - 1.0) + interval.length) / n;
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Tempo implied by the mean interval
    pub fn bpm(&self) -> f64 {
        60000.0 / self.mean_length
    }

    /// Population standard deviation of member lengths around the mean
    pub fn standard_deviation(&self) -> f64 {
        if self.members.len() <= 1 {
            return 0.0;
        }

        let sum: f64 = self
            .members
            .iter()
            .map(|m| {
                let deviation = m.length - self.mean_length;
                deviation * deviation
            })
            .sum();

        (sum / self.members.len() as f64).sqrt()
    }

    /// Owned summary for logging and traces
    pub fn summary(&self) -> ClusterSummary {
        ClusterSummary {
            mean_length_ms: self.mean_length,
            bpm: self.bpm(),
            interval_count: self.members.len(),
            rating: self.rating,
            standard_deviation_ms: self.standard_deviation(),
        }
    }
}

/// Serializable snapshot of a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub mean_length_ms: f64,
    pub bpm: f64,
    pub interval_count: usize,
    pub rating: u32,
    pub standard_deviation_ms: f64,
}

/// Cluster every pairwise interval between beat events
///
/// Every pair (i, j) with j after i is visited, so this is O(n²) in the number
/// of beat events; the `max_interval_ms` cap bounds how many intervals are kept,
/// not how many pairs are scanned. An interval joins the first cluster (in
/// creation order) whose mean is within `cluster_width_ms`, not the nearest.
pub fn cluster_intervals<'a>(
    events: &'a [BeatEvent],
    config: &TempoConfig,
) -> Vec<IntervalCluster<'a>> {
    let mut clusters: Vec<IntervalCluster<'a>> = Vec::new();

    for (i, start) in events.iter().enumerate() {
        for end in &events[i + 1..] {
            let interval = EventInterval::new(start, end);

            if interval.length <= 0.0 || interval.length >= config.max_interval_ms {
                continue;
            }

            match clusters
                .iter_mut()
                .find(|c| (c.mean_length - interval.length).abs() < config.cluster_width_ms)
            {
                Some(cluster) => cluster.add(interval),
                None => clusters.push(IntervalCluster::new(interval)),
            }
        }
    }

    clusters
}

/// Weight given to a cluster explained at ratio `i`
/// Small ratios count most: 5, 4, 3, 2 for 1..=4, then 1 up to 8
pub fn multiple_weight(i: u32) -> u32 {
    match i {
        1..=4 => 6 - i,
        5..=8 => 1,
        _ => 0,
    }
}

/// Rate clusters by harmonic consistency, then keep plausible tempos
///
/// For every ordered pair (base, other), self-pairs included, and every
/// multiplier i in 1..=max_multiple: when base's mean is within the cluster
/// width of i times other's mean, base earns `weight(i) * |other|`.
/// The result is sorted by descending rating (stable) and restricted to
/// beat intervals between the configured BPM bounds, inclusive.
pub fn rate_clusters<'a>(
    clusters: Vec<IntervalCluster<'a>>,
    config: &TempoConfig,
) -> Vec<IntervalCluster<'a>> {
    let ratings: Vec<u32> = clusters
        .iter()
        .map(|base| {
            clusters
                .iter()
                .map(|other| {
                    (1..=config.max_multiple)
                        .filter(|&i| {
                            (base.mean_length - i as f64 * other.mean_length).abs()
                                < config.cluster_width_ms
                        })
                        .map(|i| multiple_weight(i) * other.members.len() as u32)
                        .sum::<u32>()
                })
                .sum()
        })
        .collect();

    let mut rated: Vec<IntervalCluster<'a>> = clusters
        .into_iter()
        .zip(ratings)
        .map(|(mut cluster, rating)| {
            cluster.rating += rating;
            cluster
        })
        .collect();

    rated.sort_by(|a, b| b.rating.cmp(&a.rating));

    let min_interval = config.min_beat_interval_ms();
    let max_interval = config.max_beat_interval_ms();
    rated.retain(|c| c.mean_length >= min_interval && c.mean_length <= max_interval);

    rated
}
