//! Core types for the `ical` calibration engine.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Pt2`, `Pt3`, `Iso3`, ...),
//! - the entity model: [`Camera`], [`Target`], [`Observation`] and scene ids,
//! - a pinhole + Brown-Conrady projection used to seed and check calibrations,
//! - the camera / target description files and their loaders ([`config`]),
//! - synthetic observation helpers for tests and demos ([`synthetic`]).
//!
//! Camera pipeline:
//! `pixel = K ∘ distortion ∘ projection(pose * point)`

/// Camera and target description files.
pub mod config;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Entity model: cameras, targets, observations.
pub mod models;
/// Noise-free synthetic observations.
pub mod synthetic;

pub use config::{CameraConfig, CameraFile, PoseConfig, Rig, TargetConfig, TargetFile};
pub use math::*;
pub use models::*;
