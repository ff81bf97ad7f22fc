use nalgebra::{Isometry3, Matrix3, Point2, Point3, Translation3, UnitQuaternion, Vector2, Vector3};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Iso3 = Isometry3<Real>;

/// Build an isometry from a translation and an angle-axis rotation vector.
pub fn iso3_from_angle_axis(translation: [Real; 3], angle_axis: [Real; 3]) -> Iso3 {
    Iso3::from_parts(
        Translation3::new(translation[0], translation[1], translation[2]),
        UnitQuaternion::from_scaled_axis(Vec3::new(angle_axis[0], angle_axis[1], angle_axis[2])),
    )
}

/// Split an isometry into `(translation, angle_axis)`.
pub fn iso3_to_angle_axis(pose: &Iso3) -> ([Real; 3], [Real; 3]) {
    let t = pose.translation.vector;
    let aa = pose.rotation.scaled_axis();
    ([t.x, t.y, t.z], [aa.x, aa.y, aa.z])
}

/// Rotation angle (radians) of `a^-1 * b`.
pub fn rotation_distance(a: &Iso3, b: &Iso3) -> Real {
    a.rotation.angle_to(&b.rotation)
}

/// Euclidean distance between the translation parts of two poses.
pub fn translation_distance(a: &Iso3, b: &Iso3) -> Real {
    (a.translation.vector - b.translation.vector).norm()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_axis_roundtrip_preserves_pose() {
        let pose = iso3_from_angle_axis([0.1, -0.2, 1.5], [0.05, -0.1, 0.2]);
        let (t, aa) = iso3_to_angle_axis(&pose);
        let back = iso3_from_angle_axis(t, aa);
        assert!(translation_distance(&pose, &back) < 1e-12);
        assert!(rotation_distance(&pose, &back) < 1e-12);
    }
}
