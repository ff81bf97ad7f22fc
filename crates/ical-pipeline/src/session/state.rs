use serde::{Deserialize, Serialize};

/// Lifecycle of a [`CalibrationSession`](super::CalibrationSession).
///
/// `Uninitialized -> Initialized -> ObservationsAdded -> Solved | SolveFailed`;
/// `start` returns to `Initialized` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Uninitialized,
    Initialized,
    ObservationsAdded,
    Solved,
    SolveFailed,
}

impl SessionState {
    pub fn is_started(self) -> bool {
        self != SessionState::Uninitialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_uninitialized_is_not_started() {
        assert!(!SessionState::default().is_started());
        for s in [
            SessionState::Initialized,
            SessionState::ObservationsAdded,
            SessionState::Solved,
            SessionState::SolveFailed,
        ] {
            assert!(s.is_started());
        }
    }
}
