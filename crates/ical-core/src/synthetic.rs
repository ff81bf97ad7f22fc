//! Noise-free synthetic observations.
//!
//! The helpers here project target points through a camera to produce the
//! observations a perfect detector would report. Tests and demos use them to
//! drive calibration sessions without image data.

use anyhow::{anyhow, Result};

use crate::{CameraParameters, CostModel, Iso3, Observation, Target};

/// Project every point of `target`, posed by `target_to_camera`, into the image.
///
/// With [`CostModel::CircleReprojErrorWithDistortion`] the measured location is
/// the imaged circle center, otherwise the projected point. Fails if any point
/// lands behind the camera.
pub fn observe_target(
    camera: &CameraParameters,
    target: &Target,
    target_to_camera: &Iso3,
    cost_model: CostModel,
) -> Result<Vec<Observation>> {
    let diameter = match cost_model {
        CostModel::CameraReprojErrorWithDistortion => 0.0,
        CostModel::CircleReprojErrorWithDistortion => target.circle_diameter(),
    };
    target
        .points
        .iter()
        .enumerate()
        .map(|(point_id, pt)| {
            camera
                .project_circle_center(target_to_camera, pt, diameter)
                .map(|image| Observation::new(&target.name, point_id, image))
                .ok_or_else(|| {
                    anyhow!(
                        "target {} point {} projects behind the camera",
                        target.name,
                        point_id
                    )
                })
        })
        .collect()
}

/// Four non-collinear points on the `z = 0` plane spanning `size x size`.
pub fn square_points(size: f64) -> Vec<crate::Pt3> {
    vec![
        crate::Pt3::new(0.0, 0.0, 0.0),
        crate::Pt3::new(size, 0.0, 0.0),
        crate::Pt3::new(size, size, 0.0),
        crate::Pt3::new(0.0, size, 0.0),
    ]
}
