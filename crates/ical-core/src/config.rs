//! Camera and target description files.
//!
//! Both files are YAML documents (JSON is accepted as well) holding a list of
//! entities. Poses are written as a translation plus an angle-axis rotation.
//!
//! ```yaml
//! cameras:
//!   - name: left
//!     intrinsics: { fx: 500.0, fy: 500.0, cx: 320.0, cy: 240.0, width: 640, height: 480 }
//!   - name: right
//!     intrinsics: { fx: 500.0, fy: 500.0, cx: 320.0, cy: 240.0, width: 640, height: 480 }
//!     is_right_stereo_camera: true
//!     left_stereo_camera_name: left
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::{
    iso3_from_angle_axis, iso3_to_angle_axis, Camera, CameraParameters, CircleGridParameters,
    Iso3, Pt3, Real, Target,
};

/// Pose as translation `(x, y, z)` and angle-axis rotation `(ax, ay, az)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseConfig {
    #[serde(default)]
    pub x: Real,
    #[serde(default)]
    pub y: Real,
    #[serde(default)]
    pub z: Real,
    #[serde(default)]
    pub ax: Real,
    #[serde(default)]
    pub ay: Real,
    #[serde(default)]
    pub az: Real,
}

impl PoseConfig {
    pub fn to_iso3(&self) -> Iso3 {
        iso3_from_angle_axis([self.x, self.y, self.z], [self.ax, self.ay, self.az])
    }

    pub fn from_iso3(pose: &Iso3) -> Self {
        let ([x, y, z], [ax, ay, az]) = iso3_to_angle_axis(pose);
        Self {
            x,
            y,
            z,
            ax,
            ay,
            az,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    pub intrinsics: CameraParameters,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub is_moving: bool,
    #[serde(default)]
    pub is_right_stereo_camera: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_stereo_camera_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixed_intrinsics: Vec<usize>,
}

impl CameraConfig {
    pub fn to_camera(&self) -> Result<Camera> {
        let p = &self.intrinsics;
        ensure!(!self.name.is_empty(), "camera name must not be empty");
        ensure!(
            p.fx > 0.0 && p.fy > 0.0,
            "camera {}: focal lengths must be positive",
            self.name
        );
        ensure!(
            p.width > 0 && p.height > 0,
            "camera {}: image size must be non-zero",
            self.name
        );
        for &idx in &self.fixed_intrinsics {
            ensure!(
                idx < CameraParameters::INTRINSICS_DIM,
                "camera {}: fixed intrinsics index {} out of range",
                self.name,
                idx
            );
        }
        if self.is_right_stereo_camera && self.left_stereo_camera_name.is_none() {
            bail!(
                "camera {} is a right stereo camera but names no left camera",
                self.name
            );
        }
        Ok(Camera {
            name: self.name.clone(),
            parameters: *p,
            pose: self.pose.to_iso3(),
            is_moving: self.is_moving,
            is_right_stereo_camera: self.is_right_stereo_camera,
            left_stereo_camera_name: self.left_stereo_camera_name.clone(),
            fixed_intrinsics: self.fixed_intrinsics.clone(),
        })
    }

    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            name: camera.name.clone(),
            intrinsics: camera.parameters,
            pose: PoseConfig::from_iso3(&camera.pose),
            is_moving: camera.is_moving,
            is_right_stereo_camera: camera.is_right_stereo_camera,
            left_stereo_camera_name: camera.left_stereo_camera_name.clone(),
            fixed_intrinsics: camera.fixed_intrinsics.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    /// Explicit point list. When absent, points are generated from `circle_grid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<[Real; 3]>>,
    #[serde(default)]
    pub circle_grid: CircleGridParameters,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub is_moving: bool,
    #[serde(default)]
    pub pub_rviz_vis: bool,
}

impl TargetConfig {
    pub fn to_target(&self) -> Result<Target> {
        ensure!(!self.name.is_empty(), "target name must not be empty");
        ensure!(
            self.circle_grid.circle_diameter >= 0.0,
            "target {}: circle diameter must be non-negative",
            self.name
        );
        let points: Vec<Pt3> = match &self.points {
            Some(points) => points.iter().map(|p| Pt3::new(p[0], p[1], p[2])).collect(),
            None => self.circle_grid.grid_points(),
        };
        ensure!(!points.is_empty(), "target {} has no points", self.name);
        Ok(Target {
            name: self.name.clone(),
            points,
            pose: self.pose.to_iso3(),
            circle_grid: self.circle_grid,
            is_moving: self.is_moving,
            pub_rviz_vis: self.pub_rviz_vis,
        })
    }

    pub fn from_target(target: &Target) -> Self {
        Self {
            name: target.name.clone(),
            points: Some(target.points.iter().map(|p| [p.x, p.y, p.z]).collect()),
            circle_grid: target.circle_grid,
            pose: PoseConfig::from_iso3(&target.pose),
            is_moving: target.is_moving,
            pub_rviz_vis: target.pub_rviz_vis,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraFile {
    pub cameras: Vec<CameraConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetFile {
    pub targets: Vec<TargetConfig>,
}

fn ensure_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        ensure!(seen.insert(name), "duplicate {} name {}", kind, name);
    }
    Ok(())
}

/// Parse a camera description document.
pub fn parse_cameras(text: &str) -> Result<Vec<Camera>> {
    let file: CameraFile = serde_yaml::from_str(text).context("invalid camera description")?;
    let cameras = file
        .cameras
        .iter()
        .map(CameraConfig::to_camera)
        .collect::<Result<Vec<_>>>()?;
    ensure_unique("camera", cameras.iter().map(|c| c.name.as_str()))?;
    Ok(cameras)
}

/// Parse a target description document.
pub fn parse_targets(text: &str) -> Result<Vec<Target>> {
    let file: TargetFile = serde_yaml::from_str(text).context("invalid target description")?;
    let targets = file
        .targets
        .iter()
        .map(TargetConfig::to_target)
        .collect::<Result<Vec<_>>>()?;
    ensure_unique("target", targets.iter().map(|t| t.name.as_str()))?;
    Ok(targets)
}

pub fn load_cameras(path: impl AsRef<Path>) -> Result<Vec<Camera>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read camera file {}", path.display()))?;
    parse_cameras(&text).with_context(|| format!("failed to parse cameras from {}", path.display()))
}

pub fn load_targets(path: impl AsRef<Path>) -> Result<Vec<Target>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read target file {}", path.display()))?;
    parse_targets(&text).with_context(|| format!("failed to parse targets from {}", path.display()))
}

/// Write cameras back in the description file format.
pub fn save_cameras(path: impl AsRef<Path>, cameras: &[Camera]) -> Result<()> {
    let path = path.as_ref();
    let file = CameraFile {
        cameras: cameras.iter().map(CameraConfig::from_camera).collect(),
    };
    let text = serde_yaml::to_string(&file)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// All cameras and targets of one calibration setup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rig {
    pub cameras: Vec<Camera>,
    pub targets: Vec<Target>,
}

impl Rig {
    pub fn new(cameras: Vec<Camera>, targets: Vec<Target>) -> Self {
        Self { cameras, targets }
    }

    /// Load both description files, failing on the first error.
    pub fn load(camera_file: impl AsRef<Path>, target_file: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            cameras: load_cameras(camera_file)?,
            targets: load_targets(target_file)?,
        })
    }

    /// Load both description files, keeping an empty list for a file that fails.
    ///
    /// Load errors are logged and returned so a long-running service can keep
    /// going and report them.
    pub fn load_lenient(
        camera_file: impl AsRef<Path>,
        target_file: impl AsRef<Path>,
    ) -> (Self, Vec<anyhow::Error>) {
        let mut errors = Vec::new();
        let cameras = load_cameras(camera_file).unwrap_or_else(|err| {
            error!("can't load cameras: {err:#}");
            errors.push(err);
            Vec::new()
        });
        let targets = load_targets(target_file).unwrap_or_else(|err| {
            error!("can't load targets: {err:#}");
            errors.push(err);
            Vec::new()
        });
        info!(
            "loaded {} cameras and {} targets",
            cameras.len(),
            targets.len()
        );
        (Self { cameras, targets }, errors)
    }

    pub fn camera(&self, name: &str) -> Option<&Camera> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn camera_mut(&mut self, name: &str) -> Option<&mut Camera> {
        self.cameras.iter_mut().find(|c| c.name == name)
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Total number of target points a camera should detect per collection.
    pub fn expected_points(&self) -> usize {
        self.targets.iter().map(Target::num_points).sum()
    }
}
