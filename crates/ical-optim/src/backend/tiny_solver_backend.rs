use crate::backend::{
    BackendSolution, BackendSolveOptions, LinearSolverKind, OptimBackend, Termination,
};
use crate::factors::reprojection_model::{
    reproj_residual_circle_dist9_se3_generic, reproj_residual_point_dist9_se3_generic,
    ObservationData,
};
use crate::ir::{FactorKind, ManifoldKind, ProblemIR, ResidualBlock, RobustLoss};
use anyhow::{anyhow, ensure, Result};
use log::{debug, warn};
use nalgebra::DVector;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_solver::factors::Factor;
use tiny_solver::loss_functions::{CauchyLoss, HuberLoss, Loss};
use tiny_solver::manifold::se3::SE3Manifold;
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::{linear::sparse::LinearSolverType, LevenbergMarquardtOptimizer};

/// tiny-solver backend adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TinySolverBackend;

impl TinySolverBackend {
    fn compile(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
    ) -> Result<(Problem, HashMap<String, DVector<f64>>)> {
        ir.validate()?;

        let mut problem = Problem::new();
        let mut initial_map = HashMap::with_capacity(ir.params.len());

        for param in &ir.params {
            let init = initial.get(&param.name).ok_or_else(|| {
                anyhow!(
                    "initial values missing parameter {} (id {:?})",
                    param.name,
                    param.id
                )
            })?;
            ensure!(
                init.len() == param.dim,
                "initial dimension mismatch for {}: expected {}, got {}",
                param.name,
                param.dim,
                init.len()
            );

            match param.manifold {
                ManifoldKind::Euclidean => {}
                ManifoldKind::SE3 => {
                    if param.fixed.is_empty() {
                        problem.set_variable_manifold(&param.name, Arc::new(SE3Manifold));
                    } else if !param.fixed.is_all_fixed(param.dim) {
                        return Err(anyhow!(
                            "tiny-solver cannot partially fix SE3 manifold {}",
                            param.name
                        ));
                    }
                }
            }

            for idx in param.fixed.iter() {
                problem.fix_variable(&param.name, idx);
            }
            initial_map.insert(param.name.clone(), init.clone());
        }

        for residual in &ir.residuals {
            let (factor, loss) = compile_factor(residual)?;
            let param_names: Vec<&str> = residual
                .params
                .iter()
                .map(|id| ir.params[id.0].name.as_str())
                .collect();
            problem.add_residual_block(residual.residual_dim, &param_names, factor, loss);
        }

        Ok((problem, initial_map))
    }
}

fn total_cost(problem: &Problem, values: &HashMap<String, DVector<f64>>) -> f64 {
    let blocks = problem.initialize_parameter_blocks(values);
    let residuals = problem.compute_residuals(&blocks, true);
    0.5 * residuals.as_ref().squared_norm_l2()
}

impl OptimBackend for TinySolverBackend {
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution> {
        let (problem, initial_map) = self.compile(ir, initial)?;
        let initial_cost = total_cost(&problem, &initial_map);

        let all_fixed = ir.params.iter().all(|p| p.fixed.is_all_fixed(p.dim));
        if all_fixed {
            debug!("every parameter block is fixed, skipping optimization");
            return Ok(BackendSolution {
                params: initial_map,
                initial_cost,
                final_cost: initial_cost,
                termination: Termination::Converged,
            });
        }

        let optimizer = LevenbergMarquardtOptimizer::default();
        let options = to_optimizer_options(opts);
        match optimizer.optimize(&problem, &initial_map, Some(options)) {
            Some(solution) => {
                let final_cost = total_cost(&problem, &solution);
                debug!(
                    "tiny-solver finished: cost {:.6e} -> {:.6e}",
                    initial_cost, final_cost
                );
                Ok(BackendSolution {
                    params: solution,
                    initial_cost,
                    final_cost,
                    termination: Termination::Converged,
                })
            }
            None => {
                warn!("tiny-solver failed to converge (initial cost {initial_cost:.6e})");
                Ok(BackendSolution {
                    params: initial_map,
                    initial_cost,
                    final_cost: initial_cost,
                    termination: Termination::NoConvergence,
                })
            }
        }
    }
}

fn to_optimizer_options(opts: &BackendSolveOptions) -> OptimizerOptions {
    let mut options = OptimizerOptions {
        max_iteration: opts.max_iters,
        verbosity_level: opts.verbosity,
        ..OptimizerOptions::default()
    };
    if let Some(solver) = opts.linear_solver {
        options.linear_solver_type = match solver {
            LinearSolverKind::SparseCholesky => LinearSolverType::SparseCholesky,
            LinearSolverKind::SparseQR => LinearSolverType::SparseQR,
        };
    }
    if let Some(v) = opts.min_abs_decrease {
        options.min_abs_error_decrease_threshold = v;
    }
    if let Some(v) = opts.min_rel_decrease {
        options.min_rel_error_decrease_threshold = v;
    }
    if let Some(v) = opts.min_error {
        options.min_error_threshold = v;
    }
    options
}

fn compile_loss(loss: RobustLoss) -> Result<Option<Box<dyn Loss + Send>>> {
    match loss {
        RobustLoss::None => Ok(None),
        RobustLoss::Huber { scale } => {
            ensure!(scale > 0.0, "Huber scale must be positive");
            Ok(Some(Box::new(HuberLoss::new(scale))))
        }
        RobustLoss::Cauchy { scale } => {
            ensure!(scale > 0.0, "Cauchy scale must be positive");
            Ok(Some(Box::new(CauchyLoss::new(scale))))
        }
    }
}

type CompiledFactor = (
    Box<dyn tiny_solver::factors::FactorImpl + Send>,
    Option<Box<dyn Loss + Send>>,
);

fn compile_factor(residual: &ResidualBlock) -> Result<CompiledFactor> {
    let loss = compile_loss(residual.loss)?;
    match &residual.factor {
        FactorKind::ReprojPointPinholeDist9 { pw, uv, w } => {
            let factor = TinyReprojPointFactor {
                obs: ObservationData {
                    pw: *pw,
                    uv: *uv,
                    w: *w,
                },
            };
            Ok((Box::new(factor), loss))
        }
        FactorKind::ReprojCirclePinholeDist9 {
            pw,
            uv,
            diameter,
            w,
        } => {
            ensure!(*diameter >= 0.0, "circle diameter must be non-negative");
            let factor = TinyReprojCircleFactor {
                obs: ObservationData {
                    pw: *pw,
                    uv: *uv,
                    w: *w,
                },
                diameter: *diameter,
            };
            Ok((Box::new(factor), loss))
        }
    }
}

#[derive(Debug, Clone)]
struct TinyReprojPointFactor {
    obs: ObservationData,
}

impl<T: nalgebra::RealField> Factor<T> for TinyReprojPointFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(params.len(), 2, "expected [intrinsics, pose] parameter blocks");
        let r = reproj_residual_point_dist9_se3_generic(
            params[0].as_view(),
            params[1].as_view(),
            &self.obs,
        );
        DVector::from_row_slice(r.as_slice())
    }
}

#[derive(Debug, Clone)]
struct TinyReprojCircleFactor {
    obs: ObservationData,
    diameter: f64,
}

impl<T: nalgebra::RealField> Factor<T> for TinyReprojCircleFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(params.len(), 2, "expected [intrinsics, pose] parameter blocks");
        let r = reproj_residual_circle_dist9_se3_generic(
            params[0].as_view(),
            params[1].as_view(),
            self.diameter,
            &self.obs,
        );
        DVector::from_row_slice(r.as_slice())
    }
}
