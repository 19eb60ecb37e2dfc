use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Schema version written into every record. Records carrying any other
/// version are ignored on load.
pub const DIAGNOSTICS_SCHEMA_VERSION: &str = "1";

/// Byte accounting for one captured output stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Bytes the process wrote to the stream
    pub total_bytes: u64,
    /// Bytes retained in memory after applying the capture limit
    pub captured_bytes: u64,
    /// Whether older bytes were evicted
    pub truncated: bool,
}

/// Snapshot of the most recent process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsRecord {
    pub schema_version: String,
    /// When the invocation finished
    pub timestamp: DateTime<Utc>,
    /// Program and arguments, quoted for display
    pub command_line: String,
    /// Exit code reported by the process; absent when it never started
    pub exit_code: Option<i32>,
    pub was_cancelled: bool,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub stdout: StreamStats,
    pub stderr: StreamStats,
    /// Per-stream capture limit in effect; absent when unbounded
    pub capture_limit_bytes: Option<u64>,
    /// OS error description when the process could not be started
    pub launch_error: Option<String>,
}

impl DiagnosticsRecord {
    /// Record for an invocation that reached the process-running stage.
    #[must_use]
    pub fn completed(
        command_line: impl Into<String>,
        capture_limit_bytes: Option<usize>,
        exit_code: i32,
        duration: Duration,
    ) -> Self {
        Self {
            exit_code: Some(exit_code),
            ..Self::base(command_line.into(), capture_limit_bytes, duration)
        }
    }

    /// Record for an invocation whose process could not be spawned.
    #[must_use]
    pub fn launch_failure(
        command_line: impl Into<String>,
        capture_limit_bytes: Option<usize>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            launch_error: Some(error.into()),
            ..Self::base(command_line.into(), capture_limit_bytes, duration)
        }
    }

    fn base(command_line: String, capture_limit_bytes: Option<usize>, duration: Duration) -> Self {
        Self {
            schema_version: DIAGNOSTICS_SCHEMA_VERSION.to_string(),
            timestamp: Utc::now(),
            command_line,
            exit_code: None,
            was_cancelled: false,
            timed_out: false,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            stdout: StreamStats::default(),
            stderr: StreamStats::default(),
            capture_limit_bytes: capture_limit_bytes.map(|limit| limit as u64),
            launch_error: None,
        }
    }

    /// Short status label for operator output.
    #[must_use]
    pub fn status(&self) -> &'static str {
        if self.launch_error.is_some() {
            "launch_failed"
        } else if self.timed_out {
            "timed_out"
        } else if self.was_cancelled {
            "cancelled"
        } else if self.exit_code == Some(0) {
            "succeeded"
        } else {
            "failed"
        }
    }
}

impl fmt::Display for DiagnosticsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Last invocation: {}", self.command_line)?;
        writeln!(f, "  finished:   {}", self.timestamp.to_rfc3339())?;
        writeln!(f, "  status:     {}", self.status())?;
        match self.exit_code {
            Some(code) => writeln!(f, "  exit code:  {code}")?,
            None => writeln!(f, "  exit code:  -")?,
        }
        writeln!(f, "  duration:   {} ms", self.duration_ms)?;
        for (name, stats) in [("stdout", &self.stdout), ("stderr", &self.stderr)] {
            writeln!(
                f,
                "  {name}:     {} of {} bytes captured{}",
                stats.captured_bytes,
                stats.total_bytes,
                if stats.truncated { " (truncated)" } else { "" }
            )?;
        }
        match self.capture_limit_bytes {
            Some(limit) => writeln!(f, "  cap:        {limit} bytes per stream")?,
            None => writeln!(f, "  cap:        unbounded")?,
        }
        if let Some(err) = &self.launch_error {
            writeln!(f, "  launch error: {err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_failure_has_no_exit_code() {
        let record = DiagnosticsRecord::launch_failure(
            "missing-tool --flag",
            Some(1024),
            "No such file or directory (os error 2)",
            Duration::from_millis(3),
        );
        assert_eq!(record.exit_code, None);
        assert_eq!(record.status(), "launch_failed");
        assert_eq!(record.capture_limit_bytes, Some(1024));
        assert_eq!(record.schema_version, DIAGNOSTICS_SCHEMA_VERSION);
    }

    #[test]
    fn test_status_precedence() {
        let mut record =
            DiagnosticsRecord::completed("sleep 10", None, -1, Duration::from_secs(1));
        assert_eq!(record.status(), "failed");

        record.was_cancelled = true;
        assert_eq!(record.status(), "cancelled");

        record.timed_out = true;
        assert_eq!(record.status(), "timed_out");

        let ok = DiagnosticsRecord::completed("true", None, 0, Duration::ZERO);
        assert_eq!(ok.status(), "succeeded");
    }

    #[test]
    fn test_display_mentions_truncation_and_launch_error() {
        let mut record =
            DiagnosticsRecord::completed("yes", Some(8), 0, Duration::from_millis(12));
        record.stdout = StreamStats {
            total_bytes: 100,
            captured_bytes: 8,
            truncated: true,
        };
        let text = record.to_string();
        assert!(text.contains("8 of 100 bytes captured (truncated)"));
        assert!(text.contains("cap:        8 bytes per stream"));

        let failed =
            DiagnosticsRecord::launch_failure("nope", None, "permission denied", Duration::ZERO);
        let text = failed.to_string();
        assert!(text.contains("launch error: permission denied"));
        assert!(text.contains("exit code:  -"));
    }

    #[test]
    fn test_serde_field_names_are_stable() {
        let record = DiagnosticsRecord::completed("echo hi", None, 0, Duration::from_millis(5));
        let value = serde_json::to_value(&record).unwrap();
        for key in [
            "schema_version",
            "timestamp",
            "command_line",
            "exit_code",
            "was_cancelled",
            "timed_out",
            "duration_ms",
            "stdout",
            "stderr",
            "capture_limit_bytes",
            "launch_error",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }
}
