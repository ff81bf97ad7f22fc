//! Entity model shared by every calibration stage.
//!
//! Cameras and targets are configuration: they are loaded once and outlive any
//! number of calibration sessions. The optimizer never holds references into
//! them; parameter blocks are seeded from their values and written back on save.

mod camera;
mod distortion;
mod observation;
mod target;

pub use camera::{Camera, CameraInfo, CameraParameters};
pub use distortion::BrownConrady5;
pub use observation::{CostModel, Observation, Roi, SceneId, STATIC_SCENE};
pub use target::{CircleGridParameters, Target};
