// Capture ingestion module
// Reads finished strike captures from Standard MIDI files or JSON strike lists

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::events::StrikeEvent;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to read capture file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse MIDI file: {0}")]
    Midi(#[from] midly::Error),

    #[error("Failed to parse strike list: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported capture format: {0}")]
    UnsupportedFormat(String),
}

/// Capture file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// Decide from the file extension, then from the content
    Auto,

    /// Standard MIDI file
    Midi,

    /// JSON array of strike events
    Json,
}

impl InputFormat {
    /// Resolve `Auto` into a concrete format
    pub fn resolve(self, path: &Path, data: &[u8]) -> Result<InputFormat, CaptureError> {
        if self != InputFormat::Auto {
            return Ok(self);
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("mid") | Some("midi") | Some("smf") => return Ok(InputFormat::Midi),
            Some("json") => return Ok(InputFormat::Json),
            _ => {}
        }

        if data.starts_with(b"MThd") {
            return Ok(InputFormat::Midi);
        }
        if data.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'[') {
            return Ok(InputFormat::Json);
        }

        Err(CaptureError::UnsupportedFormat(format!(
            "cannot tell the format of {}",
            path.display()
        )))
    }
}

/// A capture loaded from disk
#[derive(Debug, Clone)]
pub struct CaptureFile {
    pub path: PathBuf,

    /// Concrete format the file was read as
    pub format: InputFormat,

    /// SHA-256 of the raw file bytes, hex encoded
    pub sha256: String,

    pub strikes: Vec<StrikeEvent>,
}

/// Read a capture file and decode its strikes
pub fn ingest_file(path: &Path, format: InputFormat) -> Result<CaptureFile, CaptureError> {
    let data = std::fs::read(path)?;
    let format = format.resolve(path, &data)?;

    let strikes = match format {
        InputFormat::Midi => ingest_midi(&data)?,
        InputFormat::Json => ingest_json(&data)?,
        InputFormat::Auto => {
            return Err(CaptureError::UnsupportedFormat("unresolved format".to_string()));
        }
    };

    log::info!(
        "Loaded {} strikes from {} ({:?})",
        strikes.len(),
        path.display(),
        format
    );

    Ok(CaptureFile {
        path: path.to_path_buf(),
        format,
        sha256: calculate_sha256(&data),
        strikes,
    })
}

/// Decode a JSON array of strike events, keeping file order
pub fn ingest_json(data: &[u8]) -> Result<Vec<StrikeEvent>, CaptureError> {
    Ok(serde_json::from_slice(data)?)
}

/// Decode every Note-On with non-zero velocity from a Standard MIDI file
///
/// All tracks are merged onto one timeline. Tick times are converted with
/// the file's tempo map (120 BPM until the first tempo event), or directly
/// for SMPTE timecode files. Strikes come back in time order; ties keep
/// track order.
pub fn ingest_midi(data: &[u8]) -> Result<Vec<StrikeEvent>, CaptureError> {
    let smf = Smf::parse(data)?;

    let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
    let mut notes: Vec<(u64, u8, u8)> = Vec::new();

    for track in &smf.tracks {
        let mut tick: u64 = 0;
        for event in track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    tempo_changes.push((tick, tempo.as_int()));
                }
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, vel },
                    ..
                } if vel.as_int() > 0 => {
                    notes.push((tick, key.as_int(), vel.as_int()));
                }
                _ => {}
            }
        }
    }

    let tempo_map = TempoMap::new(smf.header.timing, tempo_changes);
    notes.sort_by_key(|&(tick, _, _)| tick);

    log::debug!(
        "MIDI file: {} tracks, {} tempo segments, {} note-ons",
        smf.tracks.len(),
        tempo_map.segments.len(),
        notes.len()
    );

    Ok(notes
        .into_iter()
        .map(|(tick, key, vel)| StrikeEvent::at_ms(key, vel, tempo_map.ms_at(tick)))
        .collect())
}

/// Default tempo: 120 BPM = 500000 microseconds per beat
const DEFAULT_TEMPO_US: u32 = 500_000;

#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    start_tick: u64,
    start_ms: f64,
    ms_per_tick: f64,
}

/// Piecewise-linear tick to millisecond conversion
#[derive(Debug, Clone)]
struct TempoMap {
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    fn new(timing: Timing, mut tempo_changes: Vec<(u64, u32)>) -> Self {
        let ticks_per_beat = match timing {
            Timing::Metrical(tpb) => tpb.as_int().max(1) as f64,
            Timing::Timecode(fps, subframe) => {
                let ticks_per_second = (fps.as_f32() as f64 * subframe as f64).max(1.0);
                return TempoMap {
                    segments: vec![TempoSegment {
                        start_tick: 0,
                        start_ms: 0.0,
                        ms_per_tick: 1000.0 / ticks_per_second,
                    }],
                };
            }
        };

        let ms_per_tick = |tempo_us: u32| tempo_us as f64 / 1000.0 / ticks_per_beat;

        tempo_changes.sort_by_key(|&(tick, _)| tick);

        let mut segments = vec![TempoSegment {
            start_tick: 0,
            start_ms: 0.0,
            ms_per_tick: ms_per_tick(DEFAULT_TEMPO_US),
        }];

        for (tick, tempo_us) in tempo_changes {
            let start_ms = segments
                .last()
                .map_or(0.0, |s| s.start_ms + (tick - s.start_tick) as f64 * s.ms_per_tick);
            let segment = TempoSegment {
                start_tick: tick,
                start_ms,
                ms_per_tick: ms_per_tick(tempo_us),
            };

            // A later change at the same tick overrides the earlier one
            match segments.last_mut() {
                Some(last) if last.start_tick == tick => *last = segment,
                _ => segments.push(segment),
            }
        }

        TempoMap { segments }
    }

    fn ms_at(&self, tick: u64) -> f64 {
        let index = self.segments.partition_point(|s| s.start_tick <= tick);
        match index.checked_sub(1).and_then(|i| self.segments.get(i)) {
            Some(s) => s.start_ms + (tick - s.start_tick) as f64 * s.ms_per_tick,
            None => 0.0,
        }
    }
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u15, u24, u28, u4, u7};
    use midly::{Format, Header, TrackEvent};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn note_on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(9),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        }
    }

    fn tempo(delta: u32, us_per_beat: u32) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us_per_beat))),
        }
    }

    fn end_of_track() -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }
    }

    fn write_smf(tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(480))));
        smf.tracks = tracks;
        let mut bytes = Vec::new();
        smf.write(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_default_tempo() {
        let bytes = write_smf(vec![vec![note_on(0, 36, 100), note_on(480, 38, 90), end_of_track()]]);

        let strikes = ingest_midi(&bytes).unwrap();

        assert_eq!(strikes.len(), 2);
        assert_eq!(strikes[0].source_id, 36);
        assert_eq!(strikes[0].timestamp, Duration::ZERO);
        assert_eq!(strikes[1].source_id, 38);
        assert_eq!(strikes[1].intensity, 90);
        assert_eq!(strikes[1].timestamp_ms(), 500.0);
    }

    #[test]
    fn test_tempo_change_mid_file() {
        // 120 BPM for the first beat, then 60 BPM
        let bytes = write_smf(vec![vec![
            note_on(0, 36, 100),
            tempo(480, 1_000_000),
            note_on(0, 36, 100),
            note_on(480, 36, 100),
            end_of_track(),
        ]]);

        let strikes = ingest_midi(&bytes).unwrap();
        let times: Vec<f64> = strikes.iter().map(|s| s.timestamp_ms()).collect();

        assert_eq!(times, vec![0.0, 500.0, 1500.0]);
    }

    #[test]
    fn test_tracks_are_merged_in_time_order() {
        let conductor = vec![tempo(0, 250_000), end_of_track()];
        let kicks = vec![note_on(0, 36, 100), note_on(960, 36, 100), end_of_track()];
        let hats = vec![note_on(480, 42, 60), end_of_track()];

        let strikes = ingest_midi(&write_smf(vec![conductor, kicks, hats])).unwrap();
        let keys: Vec<u8> = strikes.iter().map(|s| s.source_id).collect();
        let times: Vec<f64> = strikes.iter().map(|s| s.timestamp_ms()).collect();

        assert_eq!(keys, vec![36, 42, 36]);
        assert_eq!(times, vec![0.0, 250.0, 500.0]);
    }

    #[test]
    fn test_zero_velocity_note_on_is_release() {
        let bytes = write_smf(vec![vec![note_on(0, 36, 100), note_on(100, 36, 0), end_of_track()]]);

        let strikes = ingest_midi(&bytes).unwrap();

        assert_eq!(strikes.len(), 1);
    }

    #[test]
    fn test_invalid_midi() {
        let result = ingest_midi(b"MThd garbage");

        assert!(matches!(result, Err(CaptureError::Midi(_))));
    }

    #[test]
    fn test_ingest_json() {
        let json = br#"[
            {"source_id": 36, "intensity": 100, "timestamp_ms": 0},
            {"source_id": 42, "intensity": 50, "timestamp_ms": 250.5}
        ]"#;

        let strikes = ingest_json(json).unwrap();

        assert_eq!(strikes.len(), 2);
        assert_eq!(strikes[1].timestamp_ms(), 250.5);
    }

    #[test]
    fn test_format_detection() {
        let path = Path::new("capture.bin");

        assert_eq!(InputFormat::Auto.resolve(Path::new("a.MID"), b"").unwrap(), InputFormat::Midi);
        assert_eq!(InputFormat::Auto.resolve(Path::new("a.json"), b"").unwrap(), InputFormat::Json);
        assert_eq!(InputFormat::Auto.resolve(path, b"MThd....").unwrap(), InputFormat::Midi);
        assert_eq!(InputFormat::Auto.resolve(path, b"  \n[ ]").unwrap(), InputFormat::Json);
        assert_eq!(InputFormat::Json.resolve(path, b"MThd").unwrap(), InputFormat::Json);
        assert!(matches!(
            InputFormat::Auto.resolve(path, b"hello"),
            Err(CaptureError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_ingest_file_hashes_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("groove.mid");
        let bytes = write_smf(vec![vec![note_on(0, 36, 100), end_of_track()]]);
        fs::write(&path, &bytes).unwrap();

        let capture = ingest_file(&path, InputFormat::Auto).unwrap();

        assert_eq!(capture.format, InputFormat::Midi);
        assert_eq!(capture.strikes.len(), 1);
        assert_eq!(capture.sha256, calculate_sha256(&bytes));
    }

    #[test]
    fn test_calculate_sha256() {
        let data = b"hello world";
        let hash = calculate_sha256(data);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
