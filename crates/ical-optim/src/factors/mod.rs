//! Residual factor implementations with automatic differentiation support.
//!
//! Factor functions are generic over [`nalgebra::RealField`] so the same code
//! evaluates plain `f64` residuals and dual-number Jacobians inside tiny-solver.
//!
//! ## Key Guidelines
//!
//! - Use `.clone()` liberally on `T: RealField` values
//! - Convert constants with `T::from_f64().unwrap()`
//! - Include `debug_assert!` for parameter dimension checks

pub mod reprojection_model;
