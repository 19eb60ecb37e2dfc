//! Post-mortem diagnostics for process invocations.
//!
//! Every invocation, whatever its outcome, leaves behind one
//! [`DiagnosticsRecord`]. Only the most recent record is kept: each
//! [`DiagnosticsRecorder::record`] overwrites the previous one.

mod model;
mod store;

pub use model::{DIAGNOSTICS_SCHEMA_VERSION, DiagnosticsRecord, StreamStats};
pub use store::{DiagnosticsRecorder, FileDiagnosticsStore, MemoryDiagnosticsStore};
