use serde::{Deserialize, Serialize};

use crate::Pt2;

/// Scene identifier. Moving entities get a fresh pose block per scene.
pub type SceneId = u32;

/// Scene used by static entities, and the first scene of every session.
pub const STATIC_SCENE: SceneId = 0;

/// Image region in which a collector should look for target points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl Roi {
    /// Region covering the whole `width x height` image.
    pub fn full_image(width: u32, height: u32) -> Self {
        Self {
            x_min: 0,
            y_min: 0,
            x_max: width,
            y_max: height,
        }
    }

    pub fn contains(&self, p: &Pt2) -> bool {
        p.x >= self.x_min as f64
            && p.x <= self.x_max as f64
            && p.y >= self.y_min as f64
            && p.y <= self.y_max as f64
    }
}

/// Cost model a collector is asked to produce observations for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostModel {
    /// Point reprojection through pinhole intrinsics and Brown-Conrady distortion.
    CameraReprojErrorWithDistortion,
    /// As above, but the measured point is the center of an imaged circle.
    CircleReprojErrorWithDistortion,
}

/// One detected target point in one camera image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Name of the observed target.
    pub target: String,
    /// Index into the target's ordered point list.
    pub point_id: usize,
    /// Measured pixel location.
    pub image: Pt2,
}

impl Observation {
    pub fn new(target: impl Into<String>, point_id: usize, image: Pt2) -> Self {
        Self {
            target: target.into(),
            point_id,
            image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_image_roi_contains_corners() {
        let roi = Roi::full_image(640, 480);
        assert!(roi.contains(&Pt2::new(0.0, 0.0)));
        assert!(roi.contains(&Pt2::new(640.0, 480.0)));
        assert!(!roi.contains(&Pt2::new(640.5, 10.0)));
    }

    #[test]
    fn cost_model_serializes_snake_case() {
        let json = serde_yaml::to_string(&CostModel::CircleReprojErrorWithDistortion).unwrap();
        assert_eq!(json.trim(), "circle_reproj_error_with_distortion");
    }
}
