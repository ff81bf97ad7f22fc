use anyhow::{ensure, Result};
use nalgebra::DVectorView;
use serde::{Deserialize, Serialize};

use super::BrownConrady5;
use crate::{Iso3, Pt2, Pt3, Real, Vec2, Vec3};

/// Depths at or below this value are treated as behind the camera.
const MIN_DEPTH: Real = 1e-9;

/// Pinhole intrinsics, Brown-Conrady distortion and image size of one camera.
///
/// The optimizer sees the first nine fields as a single intrinsics block
/// ordered `[fx, fy, cx, cy, k1, k2, k3, p1, p2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraParameters {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    #[serde(default)]
    pub k1: Real,
    #[serde(default)]
    pub k2: Real,
    #[serde(default)]
    pub k3: Real,
    #[serde(default)]
    pub p1: Real,
    #[serde(default)]
    pub p2: Real,
    pub width: u32,
    pub height: u32,
}

impl CameraParameters {
    /// Length of the intrinsics parameter vector.
    pub const INTRINSICS_DIM: usize = 9;

    /// Intrinsics as `[fx, fy, cx, cy, k1, k2, k3, p1, p2]`.
    pub fn intrinsics_vec(&self) -> [Real; 9] {
        [
            self.fx, self.fy, self.cx, self.cy, self.k1, self.k2, self.k3, self.p1, self.p2,
        ]
    }

    /// Overwrite the nine intrinsics from a parameter vector; image size is kept.
    pub fn set_intrinsics(&mut self, v: DVectorView<'_, Real>) -> Result<()> {
        ensure!(
            v.len() == Self::INTRINSICS_DIM,
            "expected intrinsics vector of length {}, got {}",
            Self::INTRINSICS_DIM,
            v.len()
        );
        self.fx = v[0];
        self.fy = v[1];
        self.cx = v[2];
        self.cy = v[3];
        self.k1 = v[4];
        self.k2 = v[5];
        self.k3 = v[6];
        self.p1 = v[7];
        self.p2 = v[8];
        Ok(())
    }

    pub fn distortion(&self) -> BrownConrady5 {
        BrownConrady5 {
            k1: self.k1,
            k2: self.k2,
            k3: self.k3,
            p1: self.p1,
            p2: self.p2,
        }
    }

    /// Map normalized (undistorted) image coordinates to pixels.
    pub fn normalized_to_pixel(&self, n: &Vec2) -> Pt2 {
        let d = self.distortion().distort(n);
        Pt2::new(self.fx * d.x + self.cx, self.fy * d.y + self.cy)
    }

    /// Project a point given in the camera frame. `None` if it is behind the camera.
    pub fn project(&self, p_c: &Vec3) -> Option<Pt2> {
        if p_c.z <= MIN_DEPTH {
            return None;
        }
        Some(self.normalized_to_pixel(&Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z)))
    }

    /// Pixel location of the center of the image of a circle.
    ///
    /// The circle has diameter `diameter`, is centered on `point` and lies in the
    /// target's `z = 0` plane; `target_to_camera` maps target coordinates into
    /// the camera frame. The imaged ellipse center is the pole of the line at
    /// infinity, which reduces to the plain point projection for `diameter = 0`.
    pub fn project_circle_center(
        &self,
        target_to_camera: &Iso3,
        point: &Pt3,
        diameter: Real,
    ) -> Option<Pt2> {
        let c = (target_to_camera * point).coords;
        if c.z <= MIN_DEPTH {
            return None;
        }
        let rot = target_to_camera.rotation.to_rotation_matrix();
        let u: Vec3 = rot.matrix().column(0).into_owned();
        let v: Vec3 = rot.matrix().column(1).into_owned();
        let r2 = 0.25 * diameter * diameter;
        let h = u * (r2 * u.z) + v * (r2 * v.z) - c * c.z;
        if h.z.abs() <= MIN_DEPTH {
            return None;
        }
        Some(self.normalized_to_pixel(&Vec2::new(h.x / h.z, h.y / h.z)))
    }
}

/// A calibrated (or to-be-calibrated) camera.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Unique camera name.
    pub name: String,
    pub parameters: CameraParameters,
    /// Camera pose in the rig frame.
    pub pose: Iso3,
    /// Moving cameras get a new pose block for every scene.
    pub is_moving: bool,
    pub is_right_stereo_camera: bool,
    /// Name of the left camera of the stereo pair; resolved after all cameras are registered.
    pub left_stereo_camera_name: Option<String>,
    /// Indices of intrinsics (`[fx, fy, cx, cy, k1, k2, k3, p1, p2]`) held constant.
    pub fixed_intrinsics: Vec<usize>,
}

impl Camera {
    /// Static, non-stereo camera at the rig origin.
    pub fn new(name: impl Into<String>, parameters: CameraParameters) -> Self {
        Self {
            name: name.into(),
            parameters,
            pose: Iso3::identity(),
            is_moving: false,
            is_right_stereo_camera: false,
            left_stereo_camera_name: None,
            fixed_intrinsics: Vec::new(),
        }
    }

    /// Camera-info record for the current intrinsics.
    pub fn camera_info(&self) -> CameraInfo {
        CameraInfo::from_parameters(&self.name, &self.parameters)
    }
}

/// Intrinsics in the layout camera drivers consume.
///
/// `d` follows the plumb-bob ordering `[k1, k2, p1, p2, k3]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub camera: String,
    pub width: u32,
    pub height: u32,
    /// Row-major 3x3 camera matrix.
    pub k: [Real; 9],
    pub d: [Real; 5],
    /// Row-major 3x4 projection matrix.
    pub p: [Real; 12],
}

impl CameraInfo {
    pub fn from_parameters(camera: &str, params: &CameraParameters) -> Self {
        let CameraParameters {
            fx, fy, cx, cy, k1, k2, k3, p1, p2, width, height,
        } = *params;
        Self {
            camera: camera.to_string(),
            width,
            height,
            k: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            d: [k1, k2, p1, p2, k3],
            p: [fx, 0.0, cx, 0.0, 0.0, fy, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iso3_from_angle_axis;

    fn params() -> CameraParameters {
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
        }
    }

    #[test]
    fn project_optical_axis_hits_principal_point() {
        let p = params().project(&Vec3::new(0.0, 0.0, 2.0)).unwrap();
        assert_eq!(p, Pt2::new(320.0, 240.0));
        assert!(params().project(&Vec3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn circle_center_matches_point_for_zero_diameter() {
        let pose = iso3_from_angle_axis([0.05, -0.02, 1.0], [0.2, -0.1, 0.05]);
        let pt = Pt3::new(0.03, 0.02, 0.0);
        let a = params().project(&(pose * pt).coords).unwrap();
        let b = params().project_circle_center(&pose, &pt, 0.0).unwrap();
        assert!((a - b).norm() < 1e-9);
    }

    #[test]
    fn circle_center_fronto_parallel_has_no_bias() {
        let pose = iso3_from_angle_axis([0.0, 0.0, 1.0], [0.0, 0.0, 0.0]);
        let pt = Pt3::new(0.1, 0.05, 0.0);
        let a = params().project(&(pose * pt).coords).unwrap();
        let b = params().project_circle_center(&pose, &pt, 0.02).unwrap();
        assert!((a - b).norm() < 1e-9);
    }

    #[test]
    fn circle_center_shifts_under_tilt() {
        let pose = iso3_from_angle_axis([0.0, 0.0, 0.5], [0.6, 0.0, 0.0]);
        let pt = Pt3::new(0.05, 0.05, 0.0);
        let a = params().project(&(pose * pt).coords).unwrap();
        let b = params().project_circle_center(&pose, &pt, 0.04).unwrap();
        assert!((a - b).norm() > 1e-6);
    }

    #[test]
    fn camera_info_uses_plumb_bob_order() {
        let mut p = params();
        p.k1 = 0.1;
        p.k3 = 0.3;
        p.p1 = 0.01;
        let info = CameraInfo::from_parameters("cam", &p);
        assert_eq!(info.d, [0.1, 0.0, 0.01, 0.0, 0.3]);
        assert_eq!(info.k[2], 320.0);
        assert_eq!(info.p[6], 240.0);
    }

    #[test]
    fn set_intrinsics_rejects_wrong_length() {
        let mut p = params();
        let v = nalgebra::DVector::from_element(4, 1.0);
        assert!(p.set_intrinsics(v.as_view()).is_err());
    }
}
