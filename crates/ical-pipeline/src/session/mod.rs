//! Calibration session: the Start → Collect → Run → Save lifecycle.
//!
//! ```no_run
//! use ical_core::Rig;
//! use ical_pipeline::observer::SyntheticCollector;
//! use ical_pipeline::session::CalibrationSession;
//! # fn main() -> anyhow::Result<()> {
//! let rig = Rig::load("cameras.yaml", "targets.yaml")?;
//! let params = rig.cameras[0].parameters;
//! let mut session = CalibrationSession::new(rig);
//! session.set_collector("cam0", Box::new(SyntheticCollector::new(params)));
//!
//! session.start()?;
//! session.collect_observations()?;
//! let outcome = session.run(1e-3)?;
//! let cameras = session.save()?;
//! # Ok(())
//! # }
//! ```

mod state;
mod types;

use std::collections::BTreeMap;

use ical_core::{CameraConfig, Rig, SceneId, STATIC_SCENE};
use ical_optim::backend::{OptimBackend, TinySolverBackend};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};
use crate::observer::{AcquisitionOptions, CancelToken, ObservationCollector};
use crate::registry::Registry;
use crate::residuals::CalibrationProblem;
use crate::solve::{self, RunOutcome, SolveOptions};

pub use state::SessionState;
pub use types::{current_timestamp, CameraCollectOutcome, CollectReport, LogEntry};

/// Tunables of a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub acquisition: AcquisitionOptions,
    #[serde(default)]
    pub solve: SolveOptions,
}

/// One calibration session over a rig of cameras and targets.
///
/// The session owns the parameter registry and the live problem. Camera and
/// target configuration is kept across restarts; [`Self::save`] commits solved
/// intrinsics back into it.
pub struct CalibrationSession {
    pub config: SessionConfig,
    rig: Rig,
    registry: Registry,
    problem: Option<CalibrationProblem>,
    collectors: BTreeMap<String, Box<dyn ObservationCollector>>,
    backend: Box<dyn OptimBackend>,
    state: SessionState,
    scene: SceneId,
    cancel: CancelToken,
    /// Operation log (lightweight audit trail).
    pub log: Vec<LogEntry>,
}

impl CalibrationSession {
    /// Session solving with the tiny-solver backend.
    pub fn new(rig: Rig) -> Self {
        Self::with_backend(rig, Box::new(TinySolverBackend))
    }

    pub fn with_backend(rig: Rig, backend: Box<dyn OptimBackend>) -> Self {
        Self {
            config: SessionConfig::default(),
            rig,
            registry: Registry::new(),
            problem: None,
            collectors: BTreeMap::new(),
            backend,
            state: SessionState::Uninitialized,
            scene: STATIC_SCENE,
            cancel: CancelToken::new(),
            log: Vec::new(),
        }
    }

    /// Attach the observation source of `camera`, replacing any previous one.
    pub fn set_collector(
        &mut self,
        camera: impl Into<String>,
        collector: Box<dyn ObservationCollector>,
    ) {
        self.collectors.insert(camera.into(), collector);
    }

    pub fn collector(&self, camera: &str) -> Option<&dyn ObservationCollector> {
        self.collectors.get(camera).map(|c| c.as_ref())
    }

    pub fn rig(&self) -> &Rig {
        &self.rig
    }

    /// Replace the configuration; takes effect at the next [`Self::start`].
    pub fn set_rig(&mut self, rig: Rig) {
        self.rig = rig;
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn problem(&self) -> Option<&CalibrationProblem> {
        self.problem.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn scene(&self) -> SceneId {
        self.scene
    }

    pub fn total_observations(&self) -> usize {
        self.problem
            .as_ref()
            .map_or(0, CalibrationProblem::total_observations)
    }

    /// Token that aborts a pending acquisition from another thread.
    ///
    /// A cancellation lasts for the rest of the current collect round; the
    /// token is re-armed when the next round begins.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Begin a new problem: drop the old one and re-seed every block from configuration.
    pub fn start(&mut self) -> SessionResult<()> {
        self.problem = None;
        self.registry.clear_cameras_targets();
        self.scene = STATIC_SCENE;
        self.cancel.reset();

        if let Err(err) = self.registry.init_blocks(&self.rig) {
            self.registry.clear_cameras_targets();
            self.state = SessionState::Uninitialized;
            self.log.push(LogEntry::failure("start", err.to_string()));
            return Err(err);
        }

        self.problem = Some(CalibrationProblem::new());
        self.state = SessionState::Initialized;
        info!(
            "session started with {} cameras, {} targets, {} parameter blocks",
            self.rig.cameras.len(),
            self.rig.targets.len(),
            self.registry.len()
        );
        self.log.push(LogEntry::success_with_notes(
            "start",
            format!("{} parameter blocks", self.registry.len()),
        ));
        Ok(())
    }

    /// Register pose blocks for every moving camera and target at `scene` and
    /// make it the scene new observations are bound to.
    pub fn advance_scene(&mut self, scene: SceneId) -> SessionResult<()> {
        if !self.state.is_started() {
            return Err(SessionError::NotStarted);
        }
        for camera in self.rig.cameras.iter().filter(|c| c.is_moving) {
            self.registry.add_moving_camera(camera, scene)?;
        }
        for target in self.rig.targets.iter().filter(|t| t.is_moving) {
            self.registry.add_moving_target(target, scene)?;
        }
        self.scene = scene;
        info!("advanced to scene {scene}");
        self.log
            .push(LogEntry::success_with_notes("advance_scene", scene.to_string()));
        Ok(())
    }

    /// Gather one batch of observations from every camera at the current scene.
    ///
    /// A camera whose batch is rejected contributes nothing; the others still
    /// add their residuals. Once the problem has been run, a new one must be
    /// started before collecting again.
    pub fn collect_observations(&mut self) -> SessionResult<CollectReport> {
        let problem = match (self.state, self.problem.as_mut()) {
            (SessionState::Initialized | SessionState::ObservationsAdded, Some(problem)) => {
                problem
            }
            (state, _) => {
                let err = if state.is_started() {
                    SessionError::InvalidState {
                        operation: "collect_observations",
                        state,
                    }
                } else {
                    SessionError::NotStarted
                };
                self.log.push(LogEntry::failure("collect", err.to_string()));
                return Err(err);
            }
        };

        self.cancel.reset();
        let before = problem.residuals().len();
        let mut cameras = Vec::with_capacity(self.rig.cameras.len());
        for camera in &self.rig.cameras {
            let result = match self.collectors.get_mut(&camera.name) {
                Some(collector) => problem.add_observations(
                    &self.registry,
                    &self.rig,
                    camera,
                    collector.as_mut(),
                    self.scene,
                    &self.config.acquisition,
                    &self.cancel,
                ),
                None => Err(SessionError::Config(format!(
                    "no observation collector for camera {}",
                    camera.name
                ))),
            };
            let outcome = match result {
                Ok(found) => CameraCollectOutcome::Accepted { found },
                Err(error) => {
                    warn!("camera {}: {}", camera.name, error);
                    CameraCollectOutcome::Rejected { error }
                }
            };
            cameras.push((camera.name.clone(), outcome));
        }

        let report = CollectReport {
            scene: self.scene,
            cameras,
            residuals_added: problem.residuals().len() - before,
            total_observations: problem.total_observations(),
        };
        self.state = SessionState::ObservationsAdded;
        self.log.push(LogEntry::success_with_notes(
            "collect",
            format!(
                "scene {}: {} of {} cameras accepted, {} observations total",
                report.scene,
                report.accepted(),
                report.cameras.len(),
                report.total_observations
            ),
        ));
        Ok(report)
    }

    /// Solve the accumulated problem and judge it against
    /// `allowable_cost_per_observation`.
    pub fn run(&mut self, allowable_cost_per_observation: f64) -> SessionResult<RunOutcome> {
        let problem = match (self.state.is_started(), self.problem.as_ref()) {
            (true, Some(problem)) => problem,
            _ => {
                self.log
                    .push(LogEntry::failure("run", SessionError::NotStarted.to_string()));
                return Err(SessionError::NotStarted);
            }
        };

        let result = solve::run(
            problem,
            &mut self.registry,
            &self.rig,
            self.backend.as_ref(),
            &self.config.solve,
            allowable_cost_per_observation,
        );
        match &result {
            Ok(RunOutcome::Accepted(report)) => {
                self.state = SessionState::Solved;
                self.log.push(LogEntry::success_with_notes(
                    "run",
                    format!("accepted, final cost {:.6e}", report.final_cost),
                ));
            }
            Ok(RunOutcome::Rejected {
                final_cost_per_observation,
                ..
            }) => {
                self.state = SessionState::SolveFailed;
                self.log.push(LogEntry::failure(
                    "run",
                    format!("rejected, final cost {final_cost_per_observation:.6e}"),
                ));
            }
            Err(SessionError::NoObservations) => {
                self.log.push(LogEntry::failure(
                    "run",
                    SessionError::NoObservations.to_string(),
                ));
            }
            Err(err) => {
                self.state = SessionState::SolveFailed;
                self.log.push(LogEntry::failure("run", err.to_string()));
            }
        }
        result
    }

    /// Commit current intrinsics into the camera configuration and push them
    /// to each camera's collector.
    ///
    /// Cameras without a registered block keep their configured intrinsics.
    pub fn save(&mut self) -> SessionResult<Vec<CameraConfig>> {
        let mut configs = Vec::with_capacity(self.rig.cameras.len());
        for camera in &mut self.rig.cameras {
            if self.registry.camera_by_name(&camera.name).is_some() {
                camera.parameters = self
                    .registry
                    .camera_parameters(&camera.name, &camera.parameters)?;
            }
            if let Some(collector) = self.collectors.get_mut(&camera.name) {
                if let Err(err) = collector.push_camera_info(&camera.camera_info()) {
                    warn!("camera {}: failed to push camera info: {err:#}", camera.name);
                }
            }
            configs.push(CameraConfig::from_camera(camera));
        }
        info!("saved intrinsics of {} cameras", configs.len());
        self.log.push(LogEntry::success_with_notes(
            "save",
            format!("{} cameras", configs.len()),
        ));
        Ok(configs)
    }
}
