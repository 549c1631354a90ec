// Capture module
// Loads recorded strike streams from disk

pub mod ingest;

pub use ingest::{calculate_sha256, ingest_file, ingest_json, ingest_midi, CaptureError, CaptureFile, InputFormat};
