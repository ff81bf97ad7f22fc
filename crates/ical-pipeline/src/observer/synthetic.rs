use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use ical_core::synthetic::observe_target;
use ical_core::{CameraInfo, CameraParameters, CostModel, Iso3, Observation, Roi, Target};
use log::debug;

use super::ObservationCollector;

/// Collector that renders noise-free detections from known ground truth.
///
/// Detections are the imaged circle centers a blob detector would report,
/// whatever cost model the session asks for. Points outside the ROI are not
/// reported, and `drop_points` removes the last detections to mimic a
/// detector that missed some circles.
#[derive(Debug, Clone)]
pub struct SyntheticCollector {
    camera: CameraParameters,
    target_poses: HashMap<String, VecDeque<Iso3>>,
    targets: Vec<(Target, Roi, CostModel)>,
    observations: Vec<Observation>,
    done: bool,
    drop_points: usize,
    last_camera_info: Option<CameraInfo>,
}

impl SyntheticCollector {
    pub fn new(camera: CameraParameters) -> Self {
        Self {
            camera,
            target_poses: HashMap::new(),
            targets: Vec::new(),
            observations: Vec::new(),
            done: false,
            drop_points: 0,
            last_camera_info: None,
        }
    }

    /// Ground-truth target-to-camera pose; targets without one use their configured pose.
    pub fn with_target_pose(self, target: impl Into<String>, pose: Iso3) -> Self {
        self.with_target_trajectory(target, [pose])
    }

    /// One ground-truth pose per trigger; the last pose repeats once the sequence is used up.
    pub fn with_target_trajectory(
        mut self,
        target: impl Into<String>,
        poses: impl IntoIterator<Item = Iso3>,
    ) -> Self {
        self.target_poses
            .insert(target.into(), poses.into_iter().collect());
        self
    }

    pub fn with_dropped_points(mut self, n: usize) -> Self {
        self.drop_points = n;
        self
    }

    pub fn last_camera_info(&self) -> Option<&CameraInfo> {
        self.last_camera_info.as_ref()
    }
}

impl ObservationCollector for SyntheticCollector {
    fn clear_targets(&mut self) {
        self.targets.clear();
    }

    fn clear_observations(&mut self) {
        self.observations.clear();
        self.done = false;
    }

    fn add_target(&mut self, target: &Target, roi: Roi, cost_model: CostModel) {
        self.targets.push((target.clone(), roi, cost_model));
    }

    fn trigger_camera(&mut self) -> Result<()> {
        let mut observations = Vec::new();
        for (target, roi, _) in &self.targets {
            let pose = self
                .target_poses
                .get(&target.name)
                .and_then(|poses| poses.front())
                .unwrap_or(&target.pose);
            let detected = observe_target(
                &self.camera,
                target,
                pose,
                CostModel::CircleReprojErrorWithDistortion,
            )?;
            observations.extend(detected.into_iter().filter(|o| roi.contains(&o.image)));
        }
        for poses in self.target_poses.values_mut() {
            if poses.len() > 1 {
                poses.pop_front();
            }
        }
        let keep = observations.len().saturating_sub(self.drop_points);
        observations.truncate(keep);
        debug!("synthetic collector produced {} observations", observations.len());
        self.observations = observations;
        self.done = true;
        Ok(())
    }

    fn observations_done(&self) -> bool {
        self.done
    }

    fn observations(&self) -> Vec<Observation> {
        self.observations.clone()
    }

    fn push_camera_info(&mut self, info: &CameraInfo) -> Result<()> {
        self.last_camera_info = Some(info.clone());
        Ok(())
    }
}
