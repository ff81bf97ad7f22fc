//! Turning collected observations into residual terms.

use std::collections::HashSet;

use ical_core::{Camera, CostModel, Observation, Pt2, Pt3, Real, Rig, Roi, SceneId};
use log::{info, warn};

use crate::error::{SessionError, SessionResult};
use crate::observer::{wait_for_observations, AcquisitionOptions, CancelToken, ObservationCollector};
use crate::registry::{BlockId, Registry};

/// One circle-center reprojection term.
#[derive(Debug, Clone, PartialEq)]
pub struct Residual {
    pub camera: String,
    pub target: String,
    pub point_id: usize,
    pub scene: SceneId,
    pub intrinsics: BlockId,
    pub target_pose: BlockId,
    /// Circle center in the target frame.
    pub point: Pt3,
    pub measured: Pt2,
    pub circle_diameter: Real,
}

/// The live least-squares problem of a session.
///
/// Residuals are append-only; a new problem replaces this one on restart.
#[derive(Debug, Clone, Default)]
pub struct CalibrationProblem {
    residuals: Vec<Residual>,
    total_observations: usize,
}

impl CalibrationProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn residuals(&self) -> &[Residual] {
        &self.residuals
    }

    pub fn total_observations(&self) -> usize {
        self.total_observations
    }

    /// Acquire observations from `camera`'s collector and add one residual per point.
    ///
    /// The batch is accepted only if the camera reports exactly one observation
    /// per target point and every observation refers to a distinct, known
    /// target point; otherwise nothing is added. Returns the number of observations added.
    #[allow(clippy::too_many_arguments)]
    pub fn add_observations(
        &mut self,
        registry: &Registry,
        rig: &Rig,
        camera: &Camera,
        collector: &mut dyn ObservationCollector,
        scene: SceneId,
        acquisition: &AcquisitionOptions,
        cancel: &CancelToken,
    ) -> SessionResult<usize> {
        let roi = Roi::full_image(camera.parameters.width, camera.parameters.height);
        collector.clear_targets();
        collector.clear_observations();
        for target in &rig.targets {
            collector.add_target(target, roi, CostModel::CameraReprojErrorWithDistortion);
        }
        collector.set_scene(scene);

        collector
            .trigger_camera()
            .map_err(|err| SessionError::Collector {
                camera: camera.name.clone(),
                message: format!("{err:#}"),
            })?;
        wait_for_observations(&*collector, &camera.name, acquisition, cancel)?;

        let observations = collector.observations();
        let expected = rig.expected_points();
        let found = observations.len();
        if found != expected {
            warn!(
                "camera {}: found {} observations, expected {}; dropping them",
                camera.name, found, expected
            );
            return Err(SessionError::ObservationCountMismatch {
                camera: camera.name.clone(),
                found,
                expected,
            });
        }

        let batch = build_residuals(registry, rig, camera, scene, &observations)?;
        let added = batch.len();
        self.residuals.extend(batch);
        self.total_observations += found;
        info!(
            "camera {}: added {} observations ({} total)",
            camera.name, added, self.total_observations
        );
        Ok(added)
    }
}

fn build_residuals(
    registry: &Registry,
    rig: &Rig,
    camera: &Camera,
    scene: SceneId,
    observations: &[Observation],
) -> SessionResult<Vec<Residual>> {
    let intrinsics = registry
        .camera_by_name(&camera.name)
        .ok_or_else(|| SessionError::UnknownEntity {
            kind: "camera",
            name: camera.name.clone(),
        })?
        .intrinsics;

    let mut seen = HashSet::new();
    observations
        .iter()
        .map(|obs| {
            let invalid = |reason: String| SessionError::InvalidObservation {
                camera: camera.name.clone(),
                reason,
            };
            if !seen.insert((obs.target.as_str(), obs.point_id)) {
                return Err(invalid(format!(
                    "point {} of target {} reported twice",
                    obs.point_id, obs.target
                )));
            }
            let target = rig
                .target(&obs.target)
                .ok_or_else(|| invalid(format!("unknown target {}", obs.target)))?;
            let point = target.points.get(obs.point_id).ok_or_else(|| {
                invalid(format!(
                    "target {} has no point {}",
                    obs.target, obs.point_id
                ))
            })?;
            let target_pose = registry
                .target_by_name(&target.name)
                .and_then(|t| t.pose_at(scene))
                .ok_or_else(|| SessionError::MissingScene {
                    entity: format!("target {}", target.name),
                    scene,
                })?;
            Ok(Residual {
                camera: camera.name.clone(),
                target: target.name.clone(),
                point_id: obs.point_id,
                scene,
                intrinsics,
                target_pose,
                point: *point,
                measured: obs.image,
                circle_diameter: target.circle_diameter(),
            })
        })
        .collect()
}
