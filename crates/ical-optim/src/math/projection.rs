//! Minimal projection helpers, generic over [`RealField`] for autodiff.

use nalgebra::{Matrix3, RealField, Vector2, Vector3};

/// Lower bound on depth (or on the conic pole's homogeneous weight).
pub const PROJECTION_EPS: f64 = 1.0e-12;

/// Apply Brown-Conrady distortion to normalized coordinates.
///
/// `dist` is ordered `[k1, k2, k3, p1, p2]`.
pub fn distort_brown_conrady<T: RealField>(n: Vector2<T>, dist: [T; 5]) -> Vector2<T> {
    let [k1, k2, k3, p1, p2] = dist;
    let x = n.x.clone();
    let y = n.y.clone();
    let r2 = x.clone() * x.clone() + y.clone() * y.clone();
    let r4 = r2.clone() * r2.clone();
    let r6 = r4.clone() * r2.clone();

    let radial = T::one() + k1 * r2.clone() + k2 * r4 + k3 * r6;

    let two = T::one() + T::one();
    let x2 = x.clone() * x.clone();
    let y2 = y.clone() * y.clone();
    let xy = x.clone() * y.clone();

    let x_tan =
        two.clone() * p1.clone() * xy.clone() + p2.clone() * (r2.clone() + two.clone() * x2);
    let y_tan = p1 * (r2 + two.clone() * y2) + two * p2 * xy;

    Vector2::new(x * radial.clone() + x_tan, y * radial + y_tan)
}

/// Normalized coordinates of a camera-frame point, with depth clamped to `PROJECTION_EPS`.
pub fn normalize_point<T: RealField>(pc: &Vector3<T>) -> Vector2<T> {
    let eps = T::from_f64(PROJECTION_EPS).unwrap();
    let z = if pc.z.clone() > eps.clone() {
        pc.z.clone()
    } else {
        eps
    };
    Vector2::new(pc.x.clone() / z.clone(), pc.y.clone() / z)
}

/// Normalized coordinates of the imaged center of a circle.
///
/// The circle of squared radius `r2` is centered on `pc` (camera frame) and lies
/// in the plane spanned by the first two columns of `rot`. The image of the
/// circle is a conic whose center is the pole of the line at infinity:
/// `h = r2 * (u_z u + v_z v) - c_z c`.
pub fn circle_center_normalized<T: RealField>(
    rot: &Matrix3<T>,
    pc: &Vector3<T>,
    r2: T,
) -> Vector2<T> {
    let u: Vector3<T> = rot.column(0).into_owned();
    let v: Vector3<T> = rot.column(1).into_owned();
    let h = u.clone() * (r2.clone() * u.z.clone()) + v.clone() * (r2 * v.z.clone())
        - pc * pc.z.clone();

    let eps = T::from_f64(PROJECTION_EPS).unwrap();
    let w = if h.z.clone() < -eps.clone() {
        h.z.clone()
    } else {
        -eps
    };
    Vector2::new(h.x.clone() / w.clone(), h.y.clone() / w)
}
