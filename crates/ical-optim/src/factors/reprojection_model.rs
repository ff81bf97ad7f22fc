//! Backend-independent reprojection residual models.
//!
//! Parameter layout shared by every model here:
//! - `intr`: `[fx, fy, cx, cy, k1, k2, k3, p1, p2]`
//! - `pose`: SE3 target-to-camera transform `[qx, qy, qz, qw, tx, ty, tz]`

use crate::math::projection::{circle_center_normalized, distort_brown_conrady, normalize_point};
use nalgebra::{
    DVector, DVectorView, Quaternion, RealField, SVector, UnitQuaternion, Vector2, Vector3,
};

/// Point measurement carried by a reprojection factor.
#[derive(Debug, Clone, Copy)]
pub struct ObservationData {
    /// Point in the target frame.
    pub pw: [f64; 3],
    /// Measured pixel.
    pub uv: [f64; 2],
    /// Residual weight.
    pub w: f64,
}

fn pose_parts<T: RealField>(pose: &DVectorView<'_, T>) -> (UnitQuaternion<T>, Vector3<T>) {
    let quat = Quaternion::new(
        pose[3].clone(),
        pose[0].clone(),
        pose[1].clone(),
        pose[2].clone(),
    );
    let t = Vector3::new(pose[4].clone(), pose[5].clone(), pose[6].clone());
    (UnitQuaternion::from_quaternion(quat), t)
}

fn target_point<T: RealField>(pw: [f64; 3]) -> Vector3<T> {
    Vector3::new(
        T::from_f64(pw[0]).unwrap(),
        T::from_f64(pw[1]).unwrap(),
        T::from_f64(pw[2]).unwrap(),
    )
}

/// Distort normalized coordinates, apply intrinsics and form the weighted residual.
fn pixel_residual<T: RealField>(
    intr: &DVectorView<'_, T>,
    n: Vector2<T>,
    obs: &ObservationData,
) -> SVector<T, 2> {
    let dist = [
        intr[4].clone(),
        intr[5].clone(),
        intr[6].clone(),
        intr[7].clone(),
        intr[8].clone(),
    ];
    let d = distort_brown_conrady(n, dist);

    let u_proj = intr[0].clone() * d.x.clone() + intr[2].clone();
    let v_proj = intr[1].clone() * d.y.clone() + intr[3].clone();

    let sqrt_w = T::from_f64(obs.w.sqrt()).unwrap();
    let u_meas = T::from_f64(obs.uv[0]).unwrap();
    let v_meas = T::from_f64(obs.uv[1]).unwrap();
    SVector::<T, 2>::new(
        (u_meas - u_proj) * sqrt_w.clone(),
        (v_meas - v_proj) * sqrt_w,
    )
}

/// Generic point reprojection residual for backend adapters.
///
/// The residual is scaled by `sqrt(w)` and ordered `[u_residual, v_residual]`.
pub(crate) fn reproj_residual_point_dist9_se3_generic<T: RealField>(
    intr: DVectorView<'_, T>,
    pose: DVectorView<'_, T>,
    obs: &ObservationData,
) -> SVector<T, 2> {
    debug_assert!(intr.len() == 9, "intrinsics must have 9 params");
    debug_assert!(pose.len() == 7, "pose must have 7 params");

    let (rot, t) = pose_parts(&pose);
    let pc = rot.transform_vector(&target_point(obs.pw)) + t;
    pixel_residual(&intr, normalize_point(&pc), obs)
}

/// Generic circle-center reprojection residual for backend adapters.
///
/// The measured pixel is the detected center of a circle of `diameter` drawn
/// around `pw` on the target plane. Under perspective the circle images to an
/// ellipse whose center is not the projection of `pw`; the model predicts the
/// ellipse center instead.
pub(crate) fn reproj_residual_circle_dist9_se3_generic<T: RealField>(
    intr: DVectorView<'_, T>,
    pose: DVectorView<'_, T>,
    diameter: f64,
    obs: &ObservationData,
) -> SVector<T, 2> {
    debug_assert!(intr.len() == 9, "intrinsics must have 9 params");
    debug_assert!(pose.len() == 7, "pose must have 7 params");

    let (rot, t) = pose_parts(&pose);
    let pc = rot.transform_vector(&target_point(obs.pw)) + t;
    let r2 = T::from_f64(0.25 * diameter * diameter).unwrap();
    let rot_m = rot.to_rotation_matrix().into_inner();
    pixel_residual(&intr, circle_center_normalized(&rot_m, &pc, r2), obs)
}

/// Point reprojection residual evaluated on `f64` parameter vectors.
pub fn reproj_residual_point_dist9_se3(
    intr: &DVector<f64>,
    pose: &DVector<f64>,
    obs: &ObservationData,
) -> SVector<f64, 2> {
    reproj_residual_point_dist9_se3_generic(intr.as_view(), pose.as_view(), obs)
}

/// Circle-center reprojection residual evaluated on `f64` parameter vectors.
pub fn reproj_residual_circle_dist9_se3(
    intr: &DVector<f64>,
    pose: &DVector<f64>,
    diameter: f64,
    obs: &ObservationData,
) -> SVector<f64, 2> {
    reproj_residual_circle_dist9_se3_generic(intr.as_view(), pose.as_view(), diameter, obs)
}
