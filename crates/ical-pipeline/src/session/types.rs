//! Session bookkeeping types.

use std::time::SystemTime;

use ical_core::SceneId;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Lightweight operation log entry.
///
/// Intended for debugging and audit trail, not for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix timestamp of the operation (seconds since epoch).
    pub timestamp: u64,
    /// Operation name (e.g. "start", "collect", "run").
    pub operation: String,
    pub success: bool,
    /// Optional notes or error message.
    pub notes: Option<String>,
}

impl LogEntry {
    pub fn success(operation: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success: true,
            notes: None,
        }
    }

    pub fn success_with_notes(operation: impl Into<String>, notes: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success: true,
            notes: Some(notes.into()),
        }
    }

    pub fn failure(operation: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success: false,
            notes: Some(error.into()),
        }
    }
}

/// Get the current Unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Outcome of one camera in a collection round.
#[derive(Debug)]
pub enum CameraCollectOutcome {
    Accepted { found: usize },
    Rejected { error: SessionError },
}

/// Per-camera results of [`CalibrationSession::collect_observations`](super::CalibrationSession::collect_observations).
#[derive(Debug)]
pub struct CollectReport {
    pub scene: SceneId,
    pub cameras: Vec<(String, CameraCollectOutcome)>,
    pub residuals_added: usize,
    /// Observations in the problem after this round.
    pub total_observations: usize,
}

impl CollectReport {
    pub fn accepted(&self) -> usize {
        self.cameras
            .iter()
            .filter(|(_, o)| matches!(o, CameraCollectOutcome::Accepted { .. }))
            .count()
    }

    pub fn rejected(&self) -> impl Iterator<Item = (&str, &SessionError)> {
        self.cameras.iter().filter_map(|(name, o)| match o {
            CameraCollectOutcome::Rejected { error } => Some((name.as_str(), error)),
            CameraCollectOutcome::Accepted { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_constructors() {
        let ok = LogEntry::success("start");
        assert!(ok.success && ok.notes.is_none() && ok.timestamp > 0);

        let noted = LogEntry::success_with_notes("collect", "4 observations");
        assert_eq!(noted.notes.as_deref(), Some("4 observations"));

        let failed = LogEntry::failure("run", "no observations collected");
        assert!(!failed.success);
        assert_eq!(failed.operation, "run");
    }

    #[test]
    fn collect_report_counts() {
        let report = CollectReport {
            scene: 0,
            cameras: vec![
                ("a".into(), CameraCollectOutcome::Accepted { found: 4 }),
                (
                    "b".into(),
                    CameraCollectOutcome::Rejected {
                        error: SessionError::ObservationCountMismatch {
                            camera: "b".into(),
                            found: 3,
                            expected: 4,
                        },
                    },
                ),
            ],
            residuals_added: 4,
            total_observations: 4,
        };
        assert_eq!(report.accepted(), 1);
        let rejected: Vec<_> = report.rejected().map(|(n, _)| n).collect();
        assert_eq!(rejected, vec!["b"]);
    }
}
