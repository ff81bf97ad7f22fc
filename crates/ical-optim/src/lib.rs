//! Non-linear optimization for the `ical` calibration engine, built on tiny-solver.
//!
//! Problems are described in a backend-independent IR ([`ir::ProblemIR`]): named
//! parameter blocks plus residual blocks that reference them. A backend compiles
//! the IR, runs the solver and reports initial/final cost together with the
//! optimized parameter vectors keyed by block name.

pub mod backend;
pub mod factors;
pub mod ir;
pub mod math;
pub mod params;

pub use crate::backend::{
    BackendSolution, BackendSolveOptions, LinearSolverKind, OptimBackend, Termination,
    TinySolverBackend,
};
pub use crate::ir::{FactorKind, FixedMask, ManifoldKind, ParamId, ProblemIR, ResidualBlock, RobustLoss};
