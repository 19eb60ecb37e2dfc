use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::ErrorKind;
use std::sync::Mutex;
use tracing::{debug, warn};

use execwarden_utils::atomic_write::write_file_atomic;
use execwarden_utils::paths;

use crate::model::{DIAGNOSTICS_SCHEMA_VERSION, DiagnosticsRecord};

/// Process-wide sink for the latest invocation's diagnostics.
///
/// Implementations are last-write-wins: concurrent invocations may race to
/// record, and whichever write lands last is what `load_last` returns.
pub trait DiagnosticsRecorder: Send + Sync {
    /// Store `record`, replacing whatever was stored before.
    fn record(&self, record: &DiagnosticsRecord) -> Result<()>;

    /// The most recently stored record, or `None` if nothing usable is stored.
    ///
    /// Never fails: unreadable or corrupt data reads as `None`.
    fn load_last(&self) -> Option<DiagnosticsRecord>;
}

/// JSON file store that survives process restarts.
#[derive(Debug, Clone)]
pub struct FileDiagnosticsStore {
    path: Utf8PathBuf,
}

impl FileDiagnosticsStore {
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<EXECWARDEN_HOME>/diagnostics/last-invocation.json`.
    #[must_use]
    pub fn at_default_location() -> Self {
        Self::new(paths::last_invocation_path())
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn decode(&self, bytes: &[u8]) -> Option<DiagnosticsRecord> {
        let record: DiagnosticsRecord = match serde_json::from_slice(bytes) {
            Ok(record) => record,
            Err(err) => {
                warn!(path = %self.path, error = %err, "Ignoring undecodable diagnostics record");
                return None;
            }
        };
        if record.schema_version != DIAGNOSTICS_SCHEMA_VERSION {
            warn!(
                path = %self.path,
                schema_version = %record.schema_version,
                "Ignoring diagnostics record with unsupported schema version"
            );
            return None;
        }
        Some(record)
    }
}

impl DiagnosticsRecorder for FileDiagnosticsStore {
    fn record(&self, record: &DiagnosticsRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record).context("Failed to serialize diagnostics")?;
        let outcome = write_file_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write diagnostics to {}", self.path))?;
        for warning in &outcome.warnings {
            debug!(path = %self.path, warning = %warning, "Diagnostics write warning");
        }
        Ok(())
    }

    fn load_last(&self) -> Option<DiagnosticsRecord> {
        match fs::read(&self.path) {
            Ok(bytes) => self.decode(&bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %self.path, error = %err, "Failed to read diagnostics record");
                None
            }
        }
    }
}

/// In-process store; nothing outlives the process.
#[derive(Debug, Default)]
pub struct MemoryDiagnosticsStore {
    last: Mutex<Option<DiagnosticsRecord>>,
}

impl MemoryDiagnosticsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticsRecorder for MemoryDiagnosticsStore {
    fn record(&self, record: &DiagnosticsRecord) -> Result<()> {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        *last = Some(record.clone());
        Ok(())
    }

    fn load_last(&self) -> Option<DiagnosticsRecord> {
        self.last
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}
