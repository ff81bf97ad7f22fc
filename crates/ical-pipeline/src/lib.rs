//! Calibration session engine.
//!
//! - [`registry`]: parameter blocks for camera intrinsics and camera/target
//!   poses, keyed by entity and scene.
//! - [`observer`]: the observation collector interface, bounded acquisition
//!   and two built-in collectors (synthetic and replay).
//! - [`residuals`]: the live problem and the observation-to-residual builder.
//! - [`solve`]: IR assembly, normalized cost and acceptance.
//! - [`session`]: the Start → Collect → Run → Save state machine.

pub mod error;
pub mod observer;
pub mod registry;
pub mod residuals;
pub mod session;
pub mod solve;

pub use error::{SessionError, SessionResult};
pub use observer::{
    AcquisitionOptions, CancelToken, ObservationCollector, ReplayCollector, SyntheticCollector,
};
pub use registry::{BlockId, BlockKey, BlockRole, ParameterBlock, Registry};
pub use residuals::{CalibrationProblem, Residual};
pub use session::{
    CalibrationSession, CameraCollectOutcome, CollectReport, LogEntry, SessionConfig,
    SessionState,
};
pub use solve::{RunOutcome, SolveOptions, SolveReport};
