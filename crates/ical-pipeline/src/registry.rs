//! Parameter block registry.
//!
//! The registry owns every optimizable vector of a session: one intrinsics
//! block per camera and one SE(3) pose block per (entity, scene). Static
//! entities live at [`STATIC_SCENE`] forever; moving entities get a new pose
//! block for each scene they are registered at.
//!
//! Blocks are addressed through [`BlockId`] handles. Each handle carries the
//! registry generation it was issued in, and [`Registry::clear_cameras_targets`]
//! bumps the generation, so a handle kept across a restart is rejected instead
//! of silently aliasing a new block.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use ical_core::{Camera, CameraParameters, Iso3, Rig, SceneId, Target, STATIC_SCENE};
use ical_optim::params::intrinsics::{pack_intrinsics, INTRINSICS_DIM};
use ical_optim::params::pose_se3::{iso3_to_se3_dvec, SE3_DIM};
use ical_optim::ManifoldKind;
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Generation-checked handle to a parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    generation: u64,
    index: usize,
}

impl BlockId {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Camera,
    Target,
}

impl EntityKind {
    fn as_str(self) -> &'static str {
        match self {
            EntityKind::Camera => "camera",
            EntityKind::Target => "target",
        }
    }
}

/// What a block parameterizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockRole {
    /// `[fx, fy, cx, cy, k1, k2, k3, p1, p2]`
    Intrinsics,
    /// Camera pose in the rig frame.
    CameraPose,
    /// Target-to-camera pose.
    TargetPose,
}

/// Identity of a block: entity, role and effective scene.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    pub kind: EntityKind,
    pub name: String,
    pub role: BlockRole,
    pub scene: SceneId,
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            BlockRole::Intrinsics => "intrinsics",
            BlockRole::CameraPose | BlockRole::TargetPose => "pose",
        };
        write!(
            f,
            "{}/{}/{}@{}",
            self.kind.as_str(),
            self.name,
            role,
            self.scene
        )
    }
}

/// An addressable numeric vector the solver may adjust.
#[derive(Debug, Clone)]
pub struct ParameterBlock {
    pub key: BlockKey,
    pub values: DVector<f64>,
    pub manifold: ManifoldKind,
    /// Indices held constant during optimization.
    pub fixed: Vec<usize>,
}

impl ParameterBlock {
    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mobility {
    Static,
    Moving,
}

impl Mobility {
    fn as_str(self) -> &'static str {
        match self {
            Mobility::Static => "static",
            Mobility::Moving => "moving",
        }
    }
}

/// Resolved link from a right stereo camera to its left partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StereoLink {
    pub left_camera: String,
    pub left_intrinsics: BlockId,
}

/// Blocks registered for one camera.
#[derive(Debug, Clone)]
pub struct RegisteredCamera {
    pub name: String,
    pub mobility: Mobility,
    pub intrinsics: BlockId,
    poses: BTreeMap<SceneId, BlockId>,
    pub stereo_left: Option<StereoLink>,
}

impl RegisteredCamera {
    /// Pose block at `scene`; static cameras answer every scene with their only block.
    pub fn pose_at(&self, scene: SceneId) -> Option<BlockId> {
        pose_at(self.mobility, &self.poses, scene)
    }

    pub fn scenes(&self) -> impl Iterator<Item = SceneId> + '_ {
        self.poses.keys().copied()
    }
}

/// Blocks registered for one target.
#[derive(Debug, Clone)]
pub struct RegisteredTarget {
    pub name: String,
    pub mobility: Mobility,
    poses: BTreeMap<SceneId, BlockId>,
}

impl RegisteredTarget {
    /// Pose block at `scene`; static targets answer every scene with their only block.
    pub fn pose_at(&self, scene: SceneId) -> Option<BlockId> {
        pose_at(self.mobility, &self.poses, scene)
    }

    pub fn scenes(&self) -> impl Iterator<Item = SceneId> + '_ {
        self.poses.keys().copied()
    }
}

fn pose_at(
    mobility: Mobility,
    poses: &BTreeMap<SceneId, BlockId>,
    scene: SceneId,
) -> Option<BlockId> {
    match mobility {
        Mobility::Static => poses.get(&STATIC_SCENE).copied(),
        Mobility::Moving => poses.get(&scene).copied(),
    }
}

/// Owner of all parameter blocks of a session.
#[derive(Debug, Default)]
pub struct Registry {
    generation: u64,
    blocks: Vec<ParameterBlock>,
    index: HashMap<BlockKey, usize>,
    cameras: BTreeMap<String, RegisteredCamera>,
    targets: BTreeMap<String, RegisteredTarget>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Register a static camera: one intrinsics block and one pose block at scene 0.
    ///
    /// Returns the intrinsics block.
    pub fn add_static_camera(&mut self, camera: &Camera) -> SessionResult<BlockId> {
        if let Some(existing) = self.cameras.get(&camera.name) {
            return Err(duplicate(EntityKind::Camera, &camera.name, existing.mobility));
        }
        let intrinsics = self.push_intrinsics(camera);
        let pose = self.push_pose(
            EntityKind::Camera,
            &camera.name,
            BlockRole::CameraPose,
            STATIC_SCENE,
            &camera.pose,
        );
        self.cameras.insert(
            camera.name.clone(),
            RegisteredCamera {
                name: camera.name.clone(),
                mobility: Mobility::Static,
                intrinsics,
                poses: BTreeMap::from([(STATIC_SCENE, pose)]),
                stereo_left: None,
            },
        );
        debug!("registered static camera {}", camera.name);
        Ok(intrinsics)
    }

    /// Register a moving camera at `scene` and return its pose block for that scene.
    ///
    /// Repeating the call for a known scene returns the existing block.
    pub fn add_moving_camera(&mut self, camera: &Camera, scene: SceneId) -> SessionResult<BlockId> {
        if let Some(existing) = self.cameras.get(&camera.name) {
            if existing.mobility != Mobility::Moving {
                return Err(duplicate(EntityKind::Camera, &camera.name, existing.mobility));
            }
            if let Some(id) = existing.poses.get(&scene) {
                return Ok(*id);
            }
            let pose = self.push_pose(
                EntityKind::Camera,
                &camera.name,
                BlockRole::CameraPose,
                scene,
                &camera.pose,
            );
            if let Some(entry) = self.cameras.get_mut(&camera.name) {
                entry.poses.insert(scene, pose);
            }
            debug!("camera {} registered at scene {}", camera.name, scene);
            return Ok(pose);
        }

        let intrinsics = self.push_intrinsics(camera);
        let pose = self.push_pose(
            EntityKind::Camera,
            &camera.name,
            BlockRole::CameraPose,
            scene,
            &camera.pose,
        );
        self.cameras.insert(
            camera.name.clone(),
            RegisteredCamera {
                name: camera.name.clone(),
                mobility: Mobility::Moving,
                intrinsics,
                poses: BTreeMap::from([(scene, pose)]),
                stereo_left: None,
            },
        );
        debug!("registered moving camera {} at scene {}", camera.name, scene);
        Ok(pose)
    }

    /// Register a static target with one pose block at scene 0.
    pub fn add_static_target(&mut self, target: &Target) -> SessionResult<BlockId> {
        if let Some(existing) = self.targets.get(&target.name) {
            return Err(duplicate(EntityKind::Target, &target.name, existing.mobility));
        }
        let pose = self.push_pose(
            EntityKind::Target,
            &target.name,
            BlockRole::TargetPose,
            STATIC_SCENE,
            &target.pose,
        );
        self.targets.insert(
            target.name.clone(),
            RegisteredTarget {
                name: target.name.clone(),
                mobility: Mobility::Static,
                poses: BTreeMap::from([(STATIC_SCENE, pose)]),
            },
        );
        debug!("registered static target {}", target.name);
        Ok(pose)
    }

    /// Register a moving target at `scene` and return its pose block for that scene.
    ///
    /// Repeating the call for a known scene returns the existing block.
    pub fn add_moving_target(&mut self, target: &Target, scene: SceneId) -> SessionResult<BlockId> {
        match self.targets.get(&target.name) {
            Some(existing) if existing.mobility != Mobility::Moving => {
                return Err(duplicate(EntityKind::Target, &target.name, existing.mobility));
            }
            Some(existing) => {
                if let Some(id) = existing.poses.get(&scene) {
                    return Ok(*id);
                }
            }
            None => {}
        }

        let pose = self.push_pose(
            EntityKind::Target,
            &target.name,
            BlockRole::TargetPose,
            scene,
            &target.pose,
        );
        self.targets
            .entry(target.name.clone())
            .or_insert_with(|| RegisteredTarget {
                name: target.name.clone(),
                mobility: Mobility::Moving,
                poses: BTreeMap::new(),
            })
            .poses
            .insert(scene, pose);
        debug!("target {} registered at scene {}", target.name, scene);
        Ok(pose)
    }

    pub fn camera_by_name(&self, name: &str) -> Option<&RegisteredCamera> {
        self.cameras.get(name)
    }

    pub fn target_by_name(&self, name: &str) -> Option<&RegisteredTarget> {
        self.targets.get(name)
    }

    pub fn cameras(&self) -> impl Iterator<Item = &RegisteredCamera> {
        self.cameras.values()
    }

    pub fn targets(&self) -> impl Iterator<Item = &RegisteredTarget> {
        self.targets.values()
    }

    /// Link every right stereo camera to its registered left camera.
    ///
    /// Must run after all cameras are registered. A right camera without a
    /// left name, or naming an unregistered camera, is an error.
    pub fn resolve_stereo_links(&mut self, cameras: &[Camera]) -> SessionResult<()> {
        for camera in cameras.iter().filter(|c| c.is_right_stereo_camera) {
            let left = camera.left_stereo_camera_name.clone().unwrap_or_default();
            let left_intrinsics = self
                .cameras
                .get(&left)
                .filter(|_| left != camera.name)
                .map(|entry| entry.intrinsics)
                .ok_or_else(|| SessionError::UnresolvedReference {
                    camera: camera.name.clone(),
                    left: left.clone(),
                })?;
            let entry = self
                .cameras
                .get_mut(&camera.name)
                .ok_or_else(|| SessionError::UnknownEntity {
                    kind: "camera",
                    name: camera.name.clone(),
                })?;
            entry.stereo_left = Some(StereoLink {
                left_camera: left,
                left_intrinsics,
            });
        }
        Ok(())
    }

    /// Drop all blocks and entity bookkeeping. Outstanding handles become stale.
    pub fn clear_cameras_targets(&mut self) {
        self.blocks.clear();
        self.index.clear();
        self.cameras.clear();
        self.targets.clear();
        self.generation += 1;
    }

    /// Register every camera and target of `rig` at scene 0 and resolve stereo links.
    pub fn init_blocks(&mut self, rig: &Rig) -> SessionResult<()> {
        for camera in &rig.cameras {
            if camera.is_moving {
                self.add_moving_camera(camera, STATIC_SCENE)?;
            } else {
                self.add_static_camera(camera)?;
            }
        }
        for target in &rig.targets {
            if target.is_moving {
                self.add_moving_target(target, STATIC_SCENE)?;
            } else {
                self.add_static_target(target)?;
            }
        }
        self.resolve_stereo_links(&rig.cameras)
    }

    pub fn block(&self, id: BlockId) -> SessionResult<&ParameterBlock> {
        self.check(id)?;
        Ok(&self.blocks[id.index])
    }

    pub fn values(&self, id: BlockId) -> SessionResult<&DVector<f64>> {
        self.block(id).map(|b| &b.values)
    }

    /// Overwrite a block's values; the dimension must match.
    pub fn set_values(&mut self, id: BlockId, values: DVector<f64>) -> SessionResult<()> {
        self.check(id)?;
        let block = &mut self.blocks[id.index];
        if block.values.len() != values.len() {
            return Err(SessionError::BlockDimension {
                block: block.key.to_string(),
                expected: block.values.len(),
                found: values.len(),
            });
        }
        block.values = values;
        Ok(())
    }

    /// Handle for a block by key, if registered in the current generation.
    pub fn find(&self, key: &BlockKey) -> Option<BlockId> {
        self.index.get(key).map(|&index| BlockId {
            generation: self.generation,
            index,
        })
    }

    /// Intrinsics of a registered camera applied on top of `base` (image size is kept).
    pub fn camera_parameters(
        &self,
        name: &str,
        base: &CameraParameters,
    ) -> SessionResult<CameraParameters> {
        let entry = self
            .camera_by_name(name)
            .ok_or_else(|| SessionError::UnknownEntity {
                kind: "camera",
                name: name.to_string(),
            })?;
        let values = self.values(entry.intrinsics)?;
        let mut params = *base;
        params.set_intrinsics(values.as_view())?;
        Ok(params)
    }

    fn check(&self, id: BlockId) -> SessionResult<()> {
        if id.generation != self.generation || id.index >= self.blocks.len() {
            return Err(SessionError::StaleBlock {
                handle: id.generation,
                current: self.generation,
            });
        }
        Ok(())
    }

    fn push_intrinsics(&mut self, camera: &Camera) -> BlockId {
        let mut fixed: Vec<usize> = camera
            .fixed_intrinsics
            .iter()
            .copied()
            .filter(|&i| i < INTRINSICS_DIM)
            .collect();
        fixed.sort_unstable();
        fixed.dedup();
        self.push(ParameterBlock {
            key: BlockKey {
                kind: EntityKind::Camera,
                name: camera.name.clone(),
                role: BlockRole::Intrinsics,
                scene: STATIC_SCENE,
            },
            values: pack_intrinsics(&camera.parameters),
            manifold: ManifoldKind::Euclidean,
            fixed,
        })
    }

    fn push_pose(
        &mut self,
        kind: EntityKind,
        name: &str,
        role: BlockRole,
        scene: SceneId,
        pose: &Iso3,
    ) -> BlockId {
        let values = iso3_to_se3_dvec(pose);
        debug_assert_eq!(values.len(), SE3_DIM);
        self.push(ParameterBlock {
            key: BlockKey {
                kind,
                name: name.to_string(),
                role,
                scene,
            },
            values,
            manifold: ManifoldKind::SE3,
            fixed: Vec::new(),
        })
    }

    fn push(&mut self, block: ParameterBlock) -> BlockId {
        let index = self.blocks.len();
        self.index.insert(block.key.clone(), index);
        self.blocks.push(block);
        BlockId {
            generation: self.generation,
            index,
        }
    }
}

fn duplicate(kind: EntityKind, name: &str, existing: Mobility) -> SessionError {
    SessionError::DuplicateRegistration {
        entity: format!("{} {}", kind.as_str(), name),
        existing: existing.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ical_core::synthetic::square_points;

    fn camera(name: &str) -> Camera {
        Camera::new(
            name,
            CameraParameters {
                fx: 500.0,
                fy: 500.0,
                cx: 320.0,
                cy: 240.0,
                k1: 0.0,
                k2: 0.0,
                k3: 0.0,
                p1: 0.0,
                p2: 0.0,
                width: 640,
                height: 480,
            },
        )
    }

    fn target(name: &str) -> Target {
        Target::new(name, square_points(0.1), Iso3::identity())
    }

    #[test]
    fn moving_target_registration_is_idempotent() {
        let mut reg = Registry::new();
        let t = target("board");
        let a = reg.add_moving_target(&t, 3).unwrap();
        let b = reg.add_moving_target(&t, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);

        let c = reg.add_moving_target(&t, 4).unwrap();
        assert_ne!(a, c);
        assert_eq!(reg.len(), 2);
        let entry = reg.target_by_name("board").unwrap();
        assert_eq!(entry.scenes().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(entry.pose_at(4), Some(c));
        assert_eq!(entry.pose_at(5), None);
    }

    #[test]
    fn moving_camera_shares_intrinsics_across_scenes() {
        let mut reg = Registry::new();
        let cam = camera("cam");
        let p0 = reg.add_moving_camera(&cam, 0).unwrap();
        let p1 = reg.add_moving_camera(&cam, 1).unwrap();
        assert_ne!(p0, p1);
        assert_eq!(reg.add_moving_camera(&cam, 1).unwrap(), p1);
        // one intrinsics block plus two pose blocks
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn static_entities_answer_every_scene() {
        let mut reg = Registry::new();
        let pose = reg.add_static_target(&target("board")).unwrap();
        let entry = reg.target_by_name("board").unwrap();
        assert_eq!(entry.pose_at(0), Some(pose));
        assert_eq!(entry.pose_at(7), Some(pose));
    }

    #[test]
    fn duplicate_and_conflicting_registrations_fail() {
        let mut reg = Registry::new();
        let cam = camera("cam");
        reg.add_static_camera(&cam).unwrap();
        assert!(matches!(
            reg.add_static_camera(&cam),
            Err(SessionError::DuplicateRegistration { existing: "static", .. })
        ));
        assert!(reg.add_moving_camera(&cam, 1).is_err());

        let t = target("board");
        reg.add_moving_target(&t, 0).unwrap();
        assert!(matches!(
            reg.add_static_target(&t),
            Err(SessionError::DuplicateRegistration { existing: "moving", .. })
        ));
    }

    #[test]
    fn stale_handles_are_rejected_after_clear() {
        let mut reg = Registry::new();
        let id = reg.add_static_camera(&camera("cam")).unwrap();
        assert_eq!(reg.values(id).unwrap().len(), INTRINSICS_DIM);

        reg.clear_cameras_targets();
        assert!(reg.is_empty());
        assert!(matches!(
            reg.values(id),
            Err(SessionError::StaleBlock { handle: 0, current: 1 })
        ));

        // A new block at the same index must not be reachable through the old handle.
        let fresh = reg.add_static_camera(&camera("cam")).unwrap();
        assert_ne!(fresh, id);
        assert!(reg.set_values(id, DVector::zeros(INTRINSICS_DIM)).is_err());
    }

    #[test]
    fn set_values_checks_dimension() {
        let mut reg = Registry::new();
        let id = reg.add_static_target(&target("board")).unwrap();
        assert!(matches!(
            reg.set_values(id, DVector::zeros(6)),
            Err(SessionError::BlockDimension { expected: 7, found: 6, .. })
        ));
        let mut v = reg.values(id).unwrap().clone();
        v[6] = 1.5;
        reg.set_values(id, v).unwrap();
        assert_eq!(reg.values(id).unwrap()[6], 1.5);
    }

    #[test]
    fn fixed_intrinsics_are_carried_into_the_block() {
        let mut reg = Registry::new();
        let mut cam = camera("cam");
        cam.fixed_intrinsics = vec![8, 4, 4, 12];
        let id = reg.add_static_camera(&cam).unwrap();
        assert_eq!(reg.block(id).unwrap().fixed, vec![4, 8]);
    }

    #[test]
    fn stereo_link_resolves_to_left_intrinsics() {
        let left = camera("left");
        let mut right = camera("right");
        right.is_right_stereo_camera = true;
        right.left_stereo_camera_name = Some("left".into());
        let rig = Rig::new(vec![right, left], vec![target("board")]);

        let mut reg = Registry::new();
        reg.init_blocks(&rig).unwrap();
        let left_entry = reg.camera_by_name("left").unwrap();
        let link = reg
            .camera_by_name("right")
            .unwrap()
            .stereo_left
            .clone()
            .unwrap();
        assert_eq!(link.left_camera, "left");
        assert_eq!(link.left_intrinsics, left_entry.intrinsics);
    }

    #[test]
    fn unresolved_stereo_link_is_reported() {
        let mut right = camera("right");
        right.is_right_stereo_camera = true;
        right.left_stereo_camera_name = Some("missing".into());
        let rig = Rig::new(vec![right], vec![]);

        let mut reg = Registry::new();
        let err = reg.init_blocks(&rig).unwrap_err();
        assert!(matches!(
            err,
            SessionError::UnresolvedReference { ref camera, ref left }
                if camera == "right" && left == "missing"
        ));
    }

    #[test]
    fn block_keys_render_as_ir_names() {
        let mut reg = Registry::new();
        let id = reg.add_moving_target(&target("board"), 2).unwrap();
        assert_eq!(reg.block(id).unwrap().key.to_string(), "target/board/pose@2");
        assert_eq!(reg.find(&reg.block(id).unwrap().key.clone()), Some(id));
    }
}
