//! Observation collectors and bounded acquisition.
//!
//! A collector stands in for a camera plus its target detector: the session
//! tells it which targets to look for, triggers a capture, waits until the
//! detections are ready and then reads the matched 2-D/3-D correspondences.

mod replay;
mod synthetic;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ical_core::{CameraInfo, CostModel, Observation, Roi, SceneId, Target};
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

pub use replay::{load_recording, RecordedFrame, Recording, ReplayCollector};
pub use synthetic::SyntheticCollector;

/// Source of target observations for one camera.
pub trait ObservationCollector {
    fn clear_targets(&mut self);

    fn clear_observations(&mut self);

    /// Look for `target` inside `roi` and report measurements for `cost_model`.
    fn add_target(&mut self, target: &Target, roi: Roi, cost_model: CostModel);

    /// Scene the following acquisitions belong to. Live sources can ignore it.
    fn set_scene(&mut self, _scene: SceneId) {}

    /// Start an acquisition. Completion is polled with [`Self::observations_done`].
    fn trigger_camera(&mut self) -> anyhow::Result<()>;

    fn observations_done(&self) -> bool;

    /// Observations of the last completed acquisition.
    fn observations(&self) -> Vec<Observation>;

    /// Hand the current calibration back to the camera driver.
    fn push_camera_info(&mut self, info: &CameraInfo) -> anyhow::Result<()>;
}

/// Bounds on waiting for a collector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Shared flag that aborts a pending acquisition.
///
/// Clones share the flag, so a token handed to another thread cancels the
/// session's waits.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Poll `collector` until its observations are ready, the timeout expires or
/// `cancel` fires.
pub fn wait_for_observations(
    collector: &dyn ObservationCollector,
    camera: &str,
    opts: &AcquisitionOptions,
    cancel: &CancelToken,
) -> SessionResult<()> {
    let deadline = Instant::now() + opts.timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(SessionError::AcquisitionCancelled {
                camera: camera.to_string(),
            });
        }
        if collector.observations_done() {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(SessionError::AcquisitionTimeout {
                camera: camera.to_string(),
                timeout: opts.timeout,
            });
        }
        thread::sleep(opts.poll_interval.min(deadline - now));
    }
}
