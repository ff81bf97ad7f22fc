use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ical_core::{CameraInfo, CostModel, Observation, Roi, SceneId, Target};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::ObservationCollector;

/// Detections of one camera at one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub camera: String,
    #[serde(default)]
    pub scene: SceneId,
    pub observations: Vec<Observation>,
}

/// Previously captured detections, replayed instead of a live detector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub frames: Vec<RecordedFrame>,
}

impl Recording {
    /// Scenes present in the recording, ascending.
    pub fn scenes(&self) -> Vec<SceneId> {
        let scenes: BTreeSet<SceneId> = self.frames.iter().map(|f| f.scene).collect();
        scenes.into_iter().collect()
    }

    /// Frames of `camera` ordered by scene, keeping file order within a scene.
    pub fn frames_for<'a>(&'a self, camera: &'a str) -> impl Iterator<Item = &'a RecordedFrame> {
        let mut frames: Vec<&RecordedFrame> =
            self.frames.iter().filter(|f| f.camera == camera).collect();
        frames.sort_by_key(|f| f.scene);
        frames.into_iter()
    }
}

/// Load a JSON recording.
pub fn load_recording(path: impl AsRef<Path>) -> Result<Recording> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read recording {}", path.display()))?;
    let recording: Recording = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse recording {}", path.display()))?;
    info!(
        "loaded {} recorded frames from {}",
        recording.frames.len(),
        path.display()
    );
    Ok(recording)
}

/// Collector that plays back one camera's recorded frames, one per trigger.
///
/// Frames taken from a [`Recording`] are tied to their scene and only replay
/// while the collector is at that scene. Frames given to [`Self::new`] carry no
/// scene and replay in order wherever the collector is. Only detections of
/// targets added since the last [`ObservationCollector::clear_targets`] are
/// reported.
#[derive(Debug, Clone, Default)]
pub struct ReplayCollector {
    frames: VecDeque<(Option<SceneId>, Vec<Observation>)>,
    scene: SceneId,
    targets: HashSet<String>,
    observations: Vec<Observation>,
    done: bool,
    pushed: Vec<CameraInfo>,
}

impl ReplayCollector {
    pub fn new(frames: impl IntoIterator<Item = Vec<Observation>>) -> Self {
        Self {
            frames: frames.into_iter().map(|f| (None, f)).collect(),
            ..Self::default()
        }
    }

    pub fn from_recording(recording: &Recording, camera: &str) -> Self {
        Self {
            frames: recording
                .frames_for(camera)
                .map(|f| (Some(f.scene), f.observations.clone()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn remaining_frames(&self) -> usize {
        self.frames.len()
    }

    /// Camera infos received through [`ObservationCollector::push_camera_info`].
    pub fn pushed_camera_info(&self) -> &[CameraInfo] {
        &self.pushed
    }
}

impl ObservationCollector for ReplayCollector {
    fn clear_targets(&mut self) {
        self.targets.clear();
    }

    fn clear_observations(&mut self) {
        self.observations.clear();
        self.done = false;
    }

    fn add_target(&mut self, target: &Target, _roi: Roi, _cost_model: CostModel) {
        self.targets.insert(target.name.clone());
    }

    fn set_scene(&mut self, scene: SceneId) {
        self.scene = scene;
    }

    fn trigger_camera(&mut self) -> Result<()> {
        let scene = self.scene;
        let (_, frame) = self
            .frames
            .iter()
            .position(|(recorded, _)| recorded.map_or(true, |s| s == scene))
            .and_then(|index| self.frames.remove(index))
            .ok_or_else(|| anyhow!("no recorded frame for scene {scene}"))?;
        self.observations = frame
            .into_iter()
            .filter(|o| self.targets.contains(&o.target))
            .collect();
        debug!(
            "replaying {} observations at scene {}",
            self.observations.len(),
            scene
        );
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
        self.pushed.push(info.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ical_core::{Iso3, Pt2, Pt3};

    const RECORDING: &str = r#"{
        "frames": [
            { "camera": "cam", "scene": 1, "observations": [
                { "target": "board", "point_id": 1, "image": [11.0, 21.0] } ] },
            { "camera": "other", "observations": [] },
            { "camera": "cam", "observations": [
                { "target": "board", "point_id": 0, "image": [10.0, 20.0] },
                { "target": "unused", "point_id": 0, "image": [1.0, 2.0] } ] }
        ]
    }"#;

    fn board() -> Target {
        Target::new("board", vec![Pt3::origin(), Pt3::new(0.1, 0.0, 0.0)], Iso3::identity())
    }

    #[test]
    fn plays_frames_of_the_current_scene() {
        let recording: Recording = serde_json::from_str(RECORDING).unwrap();
        assert_eq!(recording.scenes(), vec![0, 1]);

        let mut c = ReplayCollector::from_recording(&recording, "cam");
        assert_eq!(c.remaining_frames(), 2);
        c.add_target(&board(), Roi::full_image(64, 48), CostModel::CameraReprojErrorWithDistortion);

        c.trigger_camera().unwrap();
        assert!(c.observations_done());
        let first = c.observations();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].image, Pt2::new(10.0, 20.0));

        // The scene 1 frame is not handed out while still at scene 0.
        c.clear_observations();
        assert!(c.trigger_camera().is_err());
        assert!(!c.observations_done());
        assert_eq!(c.remaining_frames(), 1);

        c.set_scene(1);
        c.trigger_camera().unwrap();
        assert_eq!(c.observations()[0].point_id, 1);
        assert_eq!(c.remaining_frames(), 0);
    }

    #[test]
    fn skipped_scene_does_not_consume_later_frames() {
        let recording: Recording = serde_json::from_str(RECORDING).unwrap();
        let mut c = ReplayCollector::from_recording(&recording, "other");
        c.add_target(&board(), Roi::full_image(64, 48), CostModel::CameraReprojErrorWithDistortion);

        c.set_scene(1);
        let err = c.trigger_camera().unwrap_err();
        assert!(err.to_string().contains("scene 1"));
        assert_eq!(c.remaining_frames(), 1);

        c.set_scene(0);
        c.trigger_camera().unwrap();
        assert!(c.observations().is_empty());
    }

    #[test]
    fn unscened_frames_play_at_any_scene() {
        let obs = vec![Observation::new("board", 0, Pt2::new(1.0, 2.0))];
        let mut c = ReplayCollector::new([obs.clone(), obs]);
        c.add_target(&board(), Roi::full_image(64, 48), CostModel::CameraReprojErrorWithDistortion);
        c.trigger_camera().unwrap();
        c.set_scene(7);
        c.clear_observations();
        c.trigger_camera().unwrap();
        assert_eq!(c.observations().len(), 1);
        assert!(c.trigger_camera().is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.json");
        fs::write(&path, RECORDING).unwrap();
        let recording = load_recording(&path).unwrap();
        assert_eq!(recording.frames.len(), 3);
        assert!(load_recording(dir.path().join("missing.json")).is_err());
    }
}
