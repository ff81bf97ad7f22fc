//! Solve orchestration: IR assembly, backend call, cost normalization and
//! acceptance.

use std::collections::HashMap;

use ical_core::{CameraParameters, PoseConfig, Rig, SceneId};
use ical_optim::backend::{BackendSolveOptions, LinearSolverKind, OptimBackend, Termination};
use ical_optim::ir::{FactorKind, FixedMask, ProblemIR, ResidualBlock, RobustLoss};
use ical_optim::params::pose_se3::se3_dvec_to_iso3;
use log::{info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};
use crate::registry::{BlockId, BlockRole, Registry};
use crate::residuals::CalibrationProblem;

/// Solver settings used by [`run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveOptions {
    pub max_iters: usize,
    pub linear_solver: LinearSolverKind,
    pub robust_loss: RobustLoss,
    pub verbosity: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            linear_solver: LinearSolverKind::SparseCholesky,
            robust_loss: RobustLoss::None,
            verbosity: 0,
        }
    }
}

impl SolveOptions {
    fn backend_options(&self) -> BackendSolveOptions {
        BackendSolveOptions {
            max_iters: self.max_iters,
            verbosity: self.verbosity,
            linear_solver: Some(self.linear_solver),
            min_abs_decrease: Some(1e-12),
            min_rel_decrease: Some(1e-12),
            min_error: Some(1e-16),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraResult {
    pub name: String,
    pub parameters: CameraParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    pub name: String,
    pub scene: SceneId,
    /// Target-to-camera pose.
    pub pose: PoseConfig,
}

/// Costs and solved values of one run.
///
/// Costs are `0.5 * sum(r^2)` divided by the number of observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub initial_cost: f64,
    pub final_cost: f64,
    pub total_observations: usize,
    pub max_iters: usize,
    pub cameras: Vec<CameraResult>,
    pub targets: Vec<TargetResult>,
}

/// Result of a run that produced a solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunOutcome {
    Accepted(SolveReport),
    Rejected {
        final_cost_per_observation: f64,
        report: SolveReport,
    },
}

impl RunOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RunOutcome::Accepted(_))
    }

    pub fn report(&self) -> &SolveReport {
        match self {
            RunOutcome::Accepted(report) => report,
            RunOutcome::Rejected { report, .. } => report,
        }
    }
}

/// A solve is accepted when the normalized final cost does not exceed `allowable`.
pub fn accept(final_cost_per_observation: f64, allowable: f64) -> bool {
    final_cost_per_observation <= allowable
}

/// IR over the blocks referenced by `problem`, with their current values.
pub fn build_ir(
    problem: &CalibrationProblem,
    registry: &Registry,
    loss: RobustLoss,
) -> SessionResult<(ProblemIR, HashMap<String, DVector<f64>>, HashMap<String, BlockId>)> {
    let mut ir = ProblemIR::new();
    let mut initial = HashMap::new();
    let mut handles = HashMap::new();
    let mut param_ids = HashMap::new();

    for residual in problem.residuals() {
        let mut params = Vec::with_capacity(2);
        for id in [residual.intrinsics, residual.target_pose] {
            let block = registry.block(id)?;
            let param = match param_ids.get(&id) {
                Some(param) => *param,
                None => {
                    let name = block.key.to_string();
                    let param = ir.add_param_block(
                        name.clone(),
                        block.dim(),
                        block.manifold,
                        FixedMask::fix_indices(&block.fixed),
                    );
                    initial.insert(name.clone(), block.values.clone());
                    handles.insert(name, id);
                    param_ids.insert(id, param);
                    param
                }
            };
            params.push(param);
        }

        let pw = [residual.point.x, residual.point.y, residual.point.z];
        let uv = [residual.measured.x, residual.measured.y];
        ir.add_residual_block(ResidualBlock::new(
            params,
            FactorKind::ReprojCirclePinholeDist9 {
                pw,
                uv,
                diameter: residual.circle_diameter,
                w: 1.0,
            },
            loss,
        ));
    }

    Ok((ir, initial, handles))
}

/// Solve the accumulated problem and write the solution into the registry.
///
/// Solved values are kept whether or not the result is accepted. A solver that
/// gives up leaves the registry untouched and yields [`SessionError::Convergence`].
pub fn run(
    problem: &CalibrationProblem,
    registry: &mut Registry,
    rig: &Rig,
    backend: &dyn OptimBackend,
    opts: &SolveOptions,
    allowable_cost_per_observation: f64,
) -> SessionResult<RunOutcome> {
    let n = problem.total_observations();
    if n == 0 {
        return Err(SessionError::NoObservations);
    }

    let (ir, initial, handles) = build_ir(problem, registry, opts.robust_loss)?;
    info!(
        "solving {} residuals over {} parameter blocks",
        ir.residuals.len(),
        ir.params.len()
    );
    let solution = backend.solve(&ir, &initial, &opts.backend_options())?;
    if solution.termination == Termination::NoConvergence {
        warn!("solver did not converge");
        return Err(SessionError::Convergence);
    }

    for (name, id) in &handles {
        let values = solution.params.get(name).ok_or_else(|| {
            SessionError::Backend(anyhow::anyhow!("solution is missing block {name}"))
        })?;
        registry.set_values(*id, values.clone())?;
    }

    let initial_cost = solution.initial_cost / n as f64;
    let final_cost = solution.final_cost / n as f64;
    let report = report(registry, rig, initial_cost, final_cost, n, opts.max_iters)?;

    if accept(final_cost, allowable_cost_per_observation) {
        info!(
            "calibration accepted: cost per observation {:.6e} -> {:.6e}",
            initial_cost, final_cost
        );
        Ok(RunOutcome::Accepted(report))
    } else {
        warn!(
            "calibration rejected: cost per observation {:.6e} exceeds {:.6e}",
            final_cost, allowable_cost_per_observation
        );
        Ok(RunOutcome::Rejected {
            final_cost_per_observation: final_cost,
            report,
        })
    }
}

fn report(
    registry: &Registry,
    rig: &Rig,
    initial_cost: f64,
    final_cost: f64,
    total_observations: usize,
    max_iters: usize,
) -> SessionResult<SolveReport> {
    let mut cameras = Vec::new();
    for camera in &rig.cameras {
        if registry.camera_by_name(&camera.name).is_some() {
            cameras.push(CameraResult {
                name: camera.name.clone(),
                parameters: registry.camera_parameters(&camera.name, &camera.parameters)?,
            });
        }
    }

    let mut targets = Vec::new();
    for target in registry.targets() {
        for scene in target.scenes() {
            let Some(id) = target.pose_at(scene) else {
                continue;
            };
            let block = registry.block(id)?;
            debug_assert_eq!(block.key.role, BlockRole::TargetPose);
            let pose = se3_dvec_to_iso3(block.values.as_view())?;
            targets.push(TargetResult {
                name: target.name.clone(),
                scene,
                pose: PoseConfig::from_iso3(&pose),
            });
        }
    }

    Ok(SolveReport {
        initial_cost,
        final_cost,
        total_observations,
        max_iters,
        cameras,
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{AcquisitionOptions, CancelToken, ReplayCollector};
    use ical_core::synthetic::square_points;
    use ical_core::{Camera, Iso3, Observation, Pt2, Target};
    use ical_optim::backend::BackendSolution;

    /// Returns the initial values with a fixed raw final cost.
    struct FixedCostBackend {
        raw_final: f64,
        termination: Termination,
    }

    impl OptimBackend for FixedCostBackend {
        fn solve(
            &self,
            _ir: &ProblemIR,
            initial: &HashMap<String, DVector<f64>>,
            _opts: &BackendSolveOptions,
        ) -> anyhow::Result<BackendSolution> {
            let mut params = initial.clone();
            for (name, v) in params.iter_mut() {
                if name.starts_with("target/") {
                    v[6] += 0.5;
                }
            }
            Ok(BackendSolution {
                params,
                initial_cost: 4.0,
                final_cost: self.raw_final,
                termination: self.termination,
            })
        }
    }

    fn setup() -> (Rig, Registry, CalibrationProblem) {
        let camera = Camera::new(
            "cam",
            CameraParameters {
                fx: 500.0,
                fy: 500.0,
                cx: 320.0,
                cy: 240.0,
                k1: 0.0,
                k2: 0.0,
                k3: 0.0,
                p1: 0.0,
                p2: 0.0,
                width: 640,
                height: 480,
            },
        );
        let target = Target::new("board", square_points(0.1), Iso3::identity());
        let rig = Rig::new(vec![camera], vec![target]);
        let mut registry = Registry::new();
        registry.init_blocks(&rig).unwrap();

        let frame: Vec<Observation> = (0..4)
            .map(|i| Observation::new("board", i, Pt2::new(320.0, 240.0)))
            .collect();
        let mut collector = ReplayCollector::new([frame]);
        let mut problem = CalibrationProblem::new();
        problem
            .add_observations(
                &registry,
                &rig,
                &rig.cameras[0],
                &mut collector,
                0,
                &AcquisitionOptions::default(),
                &CancelToken::new(),
            )
            .unwrap();
        (rig, registry, problem)
    }

    #[test]
    fn cost_equal_to_threshold_is_accepted() {
        let (rig, mut registry, problem) = setup();
        let backend = FixedCostBackend {
            raw_final: 2.0,
            termination: Termination::Converged,
        };
        let outcome = run(&problem, &mut registry, &rig, &backend, &SolveOptions::default(), 0.5)
            .unwrap();
        assert!(outcome.is_accepted());
        assert_eq!(outcome.report().final_cost, 0.5);
        assert_eq!(outcome.report().initial_cost, 1.0);
        assert_eq!(outcome.report().total_observations, 4);
    }

    #[test]
    fn cost_just_above_threshold_is_rejected_but_kept() {
        let (rig, mut registry, problem) = setup();
        let backend = FixedCostBackend {
            raw_final: 2.0,
            termination: Termination::Converged,
        };
        let outcome = run(
            &problem,
            &mut registry,
            &rig,
            &backend,
            &SolveOptions::default(),
            0.5 - 1e-9,
        )
        .unwrap();
        match &outcome {
            RunOutcome::Rejected {
                final_cost_per_observation,
                ..
            } => assert_eq!(*final_cost_per_observation, 0.5),
            other => panic!("expected rejection, got {other:?}"),
        }

        // no rollback: the solved translation is in the registry
        let pose = registry.target_by_name("board").unwrap().pose_at(0).unwrap();
        assert_eq!(registry.values(pose).unwrap()[6], 0.5);
        assert_eq!(outcome.report().targets[0].pose.z, 0.5);
    }

    #[test]
    fn non_convergence_leaves_registry_untouched() {
        let (rig, mut registry, problem) = setup();
        let backend = FixedCostBackend {
            raw_final: 0.0,
            termination: Termination::NoConvergence,
        };
        let err = run(&problem, &mut registry, &rig, &backend, &SolveOptions::default(), 1.0)
            .unwrap_err();
        assert!(matches!(err, SessionError::Convergence));
        let pose = registry.target_by_name("board").unwrap().pose_at(0).unwrap();
        assert_eq!(registry.values(pose).unwrap()[6], 0.0);
    }

    #[test]
    fn empty_problem_is_refused() {
        let (rig, mut registry, _) = setup();
        let backend = FixedCostBackend {
            raw_final: 0.0,
            termination: Termination::Converged,
        };
        let err = run(
            &CalibrationProblem::new(),
            &mut registry,
            &rig,
            &backend,
            &SolveOptions::default(),
            1.0,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::NoObservations));
    }

    #[test]
    fn ir_contains_only_referenced_blocks() {
        let (_, registry, problem) = setup();
        let (ir, initial, handles) = build_ir(&problem, &registry, RobustLoss::None).unwrap();
        // camera pose block is registered but unused by residuals
        assert_eq!(registry.len(), 3);
        assert_eq!(ir.params.len(), 2);
        assert_eq!(ir.residuals.len(), 4);
        assert_eq!(initial.len(), 2);
        assert!(handles.contains_key("camera/cam/intrinsics@0"));
        assert!(handles.contains_key("target/board/pose@0"));
        ir.validate().unwrap();
    }

    #[test]
    fn acceptance_boundary() {
        assert!(accept(0.5, 0.5));
        assert!(!accept(0.5 + 1e-12, 0.5));
    }
}
