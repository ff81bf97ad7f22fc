use std::time::Duration;

use ical_core::SceneId;
use thiserror::Error;

use crate::session::SessionState;

/// Errors raised by the registry, the residual builder and the session.
///
/// A camera whose observations are rejected does not abort a collection; the
/// error is reported per camera in the collect report instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("camera {camera} names left stereo camera {left:?}, which is not registered")]
    UnresolvedReference { camera: String, left: String },
    #[error("{entity} is already registered as {existing}")]
    DuplicateRegistration {
        entity: String,
        existing: &'static str,
    },
    #[error("block handle from generation {handle} used with registry generation {current}")]
    StaleBlock { handle: u64, current: u64 },
    #[error("block {block} expects {expected} values, got {found}")]
    BlockDimension {
        block: String,
        expected: usize,
        found: usize,
    },
    #[error("no {kind} named {name} is registered")]
    UnknownEntity { kind: &'static str, name: String },
    #[error("session not started")]
    NotStarted,
    #[error("{operation} is not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("no observations collected")]
    NoObservations,
    #[error("camera {camera}: found {found} observations, expected {expected}")]
    ObservationCountMismatch {
        camera: String,
        found: usize,
        expected: usize,
    },
    #[error("camera {camera}: invalid observation: {reason}")]
    InvalidObservation { camera: String, reason: String },
    #[error("camera {camera}: collector failed: {message}")]
    Collector { camera: String, message: String },
    #[error("camera {camera}: observations not ready after {timeout:?}")]
    AcquisitionTimeout { camera: String, timeout: Duration },
    #[error("camera {camera}: acquisition cancelled")]
    AcquisitionCancelled { camera: String },
    #[error("scene {scene} is not registered for {entity}")]
    MissingScene { entity: String, scene: SceneId },
    #[error("optimization did not converge")]
    Convergence,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
