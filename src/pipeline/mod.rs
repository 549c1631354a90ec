// Pipeline execution and monitoring module
// Orchestrates the full strike-to-hierarchy analysis

pub mod analysis;
pub mod trace;

pub use analysis::{analyze, Analysis, Diagnostics, PipelineError, TempoSummary};
pub use trace::{read_trace_file, Stage, TraceBuilder, TraceEntry, TraceError, TraceWriter};
