//! Parameter block packing.
//!
//! - [`intrinsics::pack_intrinsics`] / [`intrinsics::unpack_intrinsics`] - 9D camera intrinsics
//! - [`pose_se3::iso3_to_se3_dvec`] / [`pose_se3::se3_dvec_to_iso3`] - SE(3) pose conversions

pub mod intrinsics;
pub mod pose_se3;
