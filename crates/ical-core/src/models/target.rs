use serde::{Deserialize, Serialize};

use crate::{Iso3, Pt3, Real};

/// Geometry of a circle-grid target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CircleGridParameters {
    /// Circle diameter in target units. Zero degrades the circle model to point reprojection.
    pub circle_diameter: Real,
    #[serde(default)]
    pub rows: usize,
    #[serde(default)]
    pub cols: usize,
    #[serde(default)]
    pub spacing: Real,
}

impl CircleGridParameters {
    /// Grid point centers in row-major order on the `z = 0` plane.
    pub fn grid_points(&self) -> Vec<Pt3> {
        let mut points = Vec::with_capacity(self.rows * self.cols);
        for row in 0..self.rows {
            for col in 0..self.cols {
                points.push(Pt3::new(
                    col as Real * self.spacing,
                    row as Real * self.spacing,
                    0.0,
                ));
            }
        }
        points
    }
}

/// A calibration target: an ordered set of points rigidly attached to one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// Unique target name.
    pub name: String,
    /// Points in the target frame. Observations refer to them by index.
    pub points: Vec<Pt3>,
    /// Target-to-camera transform used as the initial pose estimate.
    pub pose: Iso3,
    pub circle_grid: CircleGridParameters,
    /// Moving targets get a new pose block for every scene.
    pub is_moving: bool,
    /// Publish a visualization marker for this target. Carried, not acted upon.
    pub pub_rviz_vis: bool,
}

impl Target {
    pub fn new(name: impl Into<String>, points: Vec<Pt3>, pose: Iso3) -> Self {
        Self {
            name: name.into(),
            points,
            pose,
            circle_grid: CircleGridParameters::default(),
            is_moving: false,
            pub_rviz_vis: false,
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn circle_diameter(&self) -> Real {
        self.circle_grid.circle_diameter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_points_are_row_major() {
        let grid = CircleGridParameters {
            circle_diameter: 0.01,
            rows: 2,
            cols: 3,
            spacing: 0.05,
        };
        let pts = grid.grid_points();
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[1], Pt3::new(0.05, 0.0, 0.0));
        assert_eq!(pts[3], Pt3::new(0.0, 0.05, 0.0));
    }
}
