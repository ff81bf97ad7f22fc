//! Camera intrinsics parameter blocks.

use anyhow::Result;
use ical_core::CameraParameters;
use nalgebra::{DVector, DVectorView};

/// Dimension of the intrinsics block.
pub const INTRINSICS_DIM: usize = CameraParameters::INTRINSICS_DIM;

/// Pack into `[fx, fy, cx, cy, k1, k2, k3, p1, p2]`.
pub fn pack_intrinsics(params: &CameraParameters) -> DVector<f64> {
    DVector::from_row_slice(&params.intrinsics_vec())
}

/// Return a copy of `base` with its intrinsics replaced by `v`.
pub fn unpack_intrinsics(base: &CameraParameters, v: DVectorView<'_, f64>) -> Result<CameraParameters> {
    let mut out = *base;
    out.set_intrinsics(v)?;
    Ok(out)
}
