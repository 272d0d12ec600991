//! Integration tests for the SCP planners
//!
//! These tests run both planner variants end to end on small analytic
//! models where the expected behavior is known in closed form.
//!
//! # Test Coverage
//!
//! - Exploration variant: convergence on a quadratic goal-seeking problem,
//!   trust-region ratio near 1 on an exactly quadratic model, monotonic
//!   merit across accepted steps, iteration-limit behavior including
//!   all-rejected runs
//! - Belief variant: convergence from a dynamically inconsistent
//!   straight-line initialization, penalty schedule behavior when the
//!   dynamics cannot be satisfied cheaply
//! - Failure paths: inconsistent linearizations, invalid configurations,
//!   malformed trajectories
//! - Subproblem-level trust-region boundedness of QP candidates

use nalgebra::{dvector, DMatrix, DVector};
use scp_planner::core::{Bounds, ExplorationModel, Linearization, Trajectory};
use scp_planner::planner::{BeliefConfig, BeliefPlanner, ExploreConfig, ExplorePlanner};
use scp_planner::qp::{AdmmSolver, QpSolver};
use scp_planner::subproblem;
use scp_planner::{BeliefModel, PlanStatus, PlannerError};
use std::sync::Once;

static LOGGER: Once = Once::new();

/// The global tracing subscriber can only be installed once per process.
fn init_test_logging() {
    LOGGER.call_once(scp_planner::init_logger);
}

/// Scalar integrator with quadratic goal-seeking cost
/// `Σ (x_t - goal)² + w_u Σ u_t²`, in the stacked `[x_t, u_t]` layout.
struct GoalSeeker {
    goal: f64,
    control_weight: f64,
}

impl GoalSeeker {
    fn new(goal: f64) -> Self {
        Self {
            goal,
            control_weight: 0.1,
        }
    }
}

impl ExplorationModel for GoalSeeker {
    fn state_dim(&self) -> usize {
        1
    }
    fn control_dim(&self) -> usize {
        1
    }
    fn cost(&self, traj: &Trajectory) -> f64 {
        traj.states
            .iter()
            .map(|x| (x[0] - self.goal).powi(2))
            .sum::<f64>()
            + self.control_weight
                * traj.controls.iter().map(|u| u[0] * u[0]).sum::<f64>()
    }
    fn gradient(&self, traj: &Trajectory) -> DVector<f64> {
        let mut g = DVector::zeros(2 * traj.horizon() - 1);
        for t in 0..traj.horizon() {
            g[2 * t] = 2.0 * (traj.states[t][0] - self.goal);
            if t < traj.horizon() - 1 {
                g[2 * t + 1] = 2.0 * self.control_weight * traj.controls[t][0];
            }
        }
        g
    }
    fn hessian_diag(&self, traj: &Trajectory) -> Option<DVector<f64>> {
        let n = 2 * traj.horizon() - 1;
        let mut h = DVector::from_element(n, 2.0);
        for t in 0..traj.horizon() - 1 {
            h[2 * t + 1] = 2.0 * self.control_weight;
        }
        Some(h)
    }
    fn dynamics(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        x + u
    }
    fn linearize(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> Linearization {
        Linearization::linear(DMatrix::identity(1, 1), DMatrix::identity(1, 1))
    }
    fn bounds(&self) -> Bounds {
        Bounds::unbounded(1, 1)
    }
}

/// GoalSeeker with a linearization that disagrees with its dynamics: the
/// affine term claims every step adds a large constant drift.
struct DriftingLinearization(GoalSeeker);

impl ExplorationModel for DriftingLinearization {
    fn state_dim(&self) -> usize {
        1
    }
    fn control_dim(&self) -> usize {
        1
    }
    fn cost(&self, traj: &Trajectory) -> f64 {
        self.0.cost(traj)
    }
    fn gradient(&self, traj: &Trajectory) -> DVector<f64> {
        self.0.gradient(traj)
    }
    fn hessian_diag(&self, traj: &Trajectory) -> Option<DVector<f64>> {
        self.0.hessian_diag(traj)
    }
    fn dynamics(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        self.0.dynamics(x, u)
    }
    fn linearize(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> Linearization {
        Linearization {
            f_x: DMatrix::identity(1, 1),
            f_u: DMatrix::identity(1, 1),
            affine: dvector![50.0],
        }
    }
    fn bounds(&self) -> Bounds {
        Bounds::unbounded(1, 1)
    }
}

/// Constant-cost model whose gradient promises a descent that the true
/// cost never delivers, so no candidate ever improves the merit.
struct OverpromisingGradient;

impl ExplorationModel for OverpromisingGradient {
    fn state_dim(&self) -> usize {
        1
    }
    fn control_dim(&self) -> usize {
        1
    }
    fn cost(&self, _traj: &Trajectory) -> f64 {
        7.0
    }
    fn gradient(&self, traj: &Trajectory) -> DVector<f64> {
        DVector::from_element(2 * traj.horizon() - 1, 100.0)
    }
    fn dynamics(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        x + u
    }
    fn linearize(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> Linearization {
        Linearization::linear(DMatrix::identity(1, 1), DMatrix::identity(1, 1))
    }
    fn bounds(&self) -> Bounds {
        Bounds::unbounded(1, 1)
    }
}

/// Scalar integrator belief with diagonal quadratic weights.
struct IntegratorBelief {
    stage_belief_weight: f64,
    control_weight: f64,
    terminal_weight: f64,
    control_effective: bool,
}

impl BeliefModel for IntegratorBelief {
    fn state_dim(&self) -> usize {
        1
    }
    fn control_dim(&self) -> usize {
        1
    }
    fn dynamics(&self, b: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        if self.control_effective {
            b + u
        } else {
            b.clone()
        }
    }
    fn linearize(&self, _b: &DVector<f64>, _u: &DVector<f64>) -> Linearization {
        let g = if self.control_effective {
            DMatrix::identity(1, 1)
        } else {
            DMatrix::zeros(1, 1)
        };
        Linearization::linear(DMatrix::identity(1, 1), g)
    }
    fn stage_weights(&self) -> (DVector<f64>, DVector<f64>) {
        (
            dvector![self.stage_belief_weight],
            dvector![self.control_weight],
        )
    }
    fn terminal_weights(&self) -> DVector<f64> {
        dvector![self.terminal_weight]
    }
    fn bounds(&self) -> Bounds {
        Bounds::unbounded(1, 1)
    }
}

fn straight_line(from: f64, to: f64, horizon: usize) -> Trajectory {
    let states = (0..horizon)
        .map(|t| {
            let alpha = t as f64 / (horizon - 1) as f64;
            dvector![from + alpha * (to - from)]
        })
        .collect();
    let controls = vec![dvector![0.0]; horizon - 1];
    Trajectory::new(states, controls)
}

#[test]
fn test_explore_converges_on_quadratic_goal() {
    init_test_logging();
    let model = GoalSeeker::new(2.0);
    let mut traj = Trajectory::rollout(dvector![0.0], vec![dvector![0.0]; 4], |x, u| x + u);
    let initial_cost = model.cost(&traj);

    let planner = ExplorePlanner::with_config(
        ExploreConfig::new()
            .with_initial_trust_widths(10.0, 10.0)
            .with_max_iterations(30),
    );
    let summary = planner.plan(&model, &mut traj).expect("planning failed");

    assert_eq!(summary.status, PlanStatus::Converged);
    assert!(summary.final_cost < initial_cost);
    assert!(summary.final_cost.is_finite());
    // The initial state is pinned; the rest approach the goal.
    assert_eq!(traj.states[0], dvector![0.0]);
    assert!((traj.states[4][0] - 2.0).abs() < 0.2);
}

#[test]
fn test_explore_ratio_is_one_on_exact_quadratic() {
    // Cost model and dynamics are both exact, so predicted and actual
    // improvement must agree on the first step.
    let model = GoalSeeker::new(1.0);
    let mut traj = Trajectory::rollout(dvector![0.0], vec![dvector![0.0]; 3], |x, u| x + u);

    let planner = ExplorePlanner::with_config(
        ExploreConfig::new().with_initial_trust_widths(10.0, 10.0),
    );
    let summary = planner.plan(&model, &mut traj).expect("planning failed");

    let first = &summary.iteration_history[1];
    assert!(first.accepted);
    assert!((first.tr_ratio - 1.0).abs() < 1e-5);
    assert_eq!(summary.status, PlanStatus::Converged);
}

#[test]
fn test_explore_merit_monotonic_across_accepted_steps() {
    let model = GoalSeeker::new(3.0);
    let mut traj = Trajectory::rollout(dvector![0.0], vec![dvector![0.0]; 5], |x, u| x + u);

    // Small trust region forces several accepted steps.
    let planner = ExplorePlanner::with_config(
        ExploreConfig::new()
            .with_initial_trust_widths(0.5, 0.5)
            .with_max_iterations(100),
    );
    let summary = planner.plan(&model, &mut traj).expect("planning failed");

    for stats in summary.iteration_history.iter().skip(1) {
        if stats.accepted {
            assert!(
                stats.merit_change <= 1e-3,
                "accepted step increased merit by {}",
                stats.merit_change
            );
        }
    }
    assert!(summary.accepted_steps >= 2);
    assert!(summary.final_cost < summary.initial_cost);
}

#[test]
fn test_explore_iteration_limit_returns_best_effort() {
    let model = GoalSeeker::new(50.0);
    let mut traj = Trajectory::rollout(dvector![0.0], vec![dvector![0.0]; 4], |x, u| x + u);
    let initial_cost = model.cost(&traj);

    let planner = ExplorePlanner::with_config(
        ExploreConfig::new()
            .with_initial_trust_widths(0.1, 0.1)
            .with_max_iterations(2),
    );
    let summary = planner.plan(&model, &mut traj).expect("planning failed");

    assert_eq!(summary.status, PlanStatus::IterationLimit);
    assert_eq!(summary.iterations, 2);
    // Best trajectory found so far, not a failure.
    assert!(summary.final_cost <= initial_cost);
}

#[test]
fn test_explore_all_rejected_run_exhausts_iteration_budget() {
    // Every candidate predicts improvement but delivers none, so every
    // step is rejected and the trust region only shrinks. The planner must
    // spend its full budget and report the limit, not convergence, no
    // matter how small the trust region gets.
    init_test_logging();
    let model = OverpromisingGradient;
    let mut traj = Trajectory::rollout(dvector![0.0], vec![dvector![0.0]; 3], |x, u| x + u);

    let planner = ExplorePlanner::with_config(
        ExploreConfig::new()
            .with_initial_trust_widths(0.5, 0.5)
            .with_max_iterations(15),
    );
    let summary = planner.plan(&model, &mut traj).expect("planning failed");

    assert_eq!(summary.status, PlanStatus::IterationLimit);
    assert_eq!(summary.iterations, 15);
    assert_eq!(summary.rejected_steps, 15);
    assert_eq!(summary.accepted_steps, 0);
    // The trust region shrank far below any plausible width floor.
    assert!(summary.final_state_width < 1e-4);
    assert_eq!(summary.final_cost, summary.initial_cost);
    // Nothing was accepted, so the input trajectory is untouched.
    assert_eq!(traj.states[0], dvector![0.0]);
    assert_eq!(traj.controls[0], dvector![0.0]);
}

#[test]
fn test_explore_inconsistent_linearization_fails_fast() {
    let model = DriftingLinearization(GoalSeeker::new(0.0));
    let mut traj = Trajectory::rollout(dvector![5.0], vec![dvector![-1.0]; 3], |x, u| x + u);

    let planner = ExplorePlanner::with_config(
        ExploreConfig::new().with_initial_trust_widths(100.0, 100.0),
    );
    let err = planner.plan(&model, &mut traj).expect_err("should fail");
    assert!(matches!(err, PlannerError::Scp(_)));
    assert!(err.to_string().contains("Convexification"));
}

#[test]
fn test_belief_converges_from_inconsistent_straight_line() {
    init_test_logging();
    let model = IntegratorBelief {
        stage_belief_weight: 1.0,
        control_weight: 0.1,
        terminal_weight: 1.0,
        control_effective: true,
    };
    // Straight-line interpolation with zero controls violates the
    // dynamics everywhere.
    let mut traj = straight_line(1.0, 0.0, 10);
    let initial_cost = scp_planner::merit::belief_cost(&model, &traj);

    let planner = BeliefPlanner::with_config(
        BeliefConfig::new()
            .with_initial_trust_widths(1.0, 1.0)
            .with_min_approx_improve(1e-3),
    );
    let summary = planner.plan(&model, &mut traj).expect("planning failed");

    assert_eq!(summary.status, PlanStatus::Converged);
    assert!(summary.iterations <= 20);
    assert!(summary.final_cost < initial_cost);
    let violation = summary.constraint_violation.expect("belief summary");
    assert!(violation < 1e-4, "violation {violation} above tolerance");
    assert_eq!(traj.states[0], dvector![1.0]);
}

#[test]
fn test_belief_penalty_schedule_reduces_violation() {
    // Controls cannot influence the dynamics, so satisfying them means
    // keeping the belief at its pinned value while the terminal cost pulls
    // it to zero. At low penalties the planner trades violation for
    // terminal cost; each penalty increase buys some of it back.
    let model = IntegratorBelief {
        stage_belief_weight: 0.0,
        control_weight: 1.0,
        terminal_weight: 10.0,
        control_effective: false,
    };
    let mut traj = Trajectory::new(
        vec![dvector![1.0], dvector![1.0], dvector![1.0]],
        vec![dvector![0.0], dvector![0.0]],
    );

    let planner = BeliefPlanner::with_config(
        BeliefConfig::new().with_penalty_schedule(1e-3, 5.0, 3),
    );
    let summary = planner.plan(&model, &mut traj).expect("planning failed");

    assert_eq!(summary.status, PlanStatus::ConstraintToleranceUnmet);
    assert_eq!(summary.penalty_history.len(), 4);
    for pair in summary.penalty_history.windows(2) {
        assert!(
            pair[1].violation <= pair[0].violation + 1e-9,
            "violation increased across a penalty increase: {} -> {}",
            pair[0].violation,
            pair[1].violation
        );
        assert!(pair[1].penalty_coeff > pair[0].penalty_coeff);
    }
    let final_violation = summary.constraint_violation.expect("belief summary");
    assert!(final_violation >= 1e-4);
}

#[test]
fn test_belief_feasible_start_converges_immediately() {
    let model = IntegratorBelief {
        stage_belief_weight: 1.0,
        control_weight: 1.0,
        terminal_weight: 1.0,
        control_effective: true,
    };
    // Already at a local optimum: everything at zero.
    let mut traj = Trajectory::rollout(dvector![0.0], vec![dvector![0.0]; 3], |b, u| b + u);

    let summary = BeliefPlanner::new()
        .plan(&model, &mut traj)
        .expect("planning failed");

    assert_eq!(summary.status, PlanStatus::Converged);
    assert_eq!(summary.penalty_history.len(), 1);
    assert!(summary.final_cost.abs() < 1e-9);
}

#[test]
fn test_qp_candidate_stays_inside_trust_region() {
    let model = GoalSeeker::new(10.0);
    let traj = Trajectory::rollout(dvector![0.0], vec![dvector![0.0]; 4], |x, u| x + u);

    let sub = subproblem::explore::build(&model, &traj, 0.5, 0.25);
    let solution = AdmmSolver::new().solve(&sub.qp).expect("QP failed");
    for i in 0..sub.qp.num_vars() {
        assert!(solution.primal[i] >= sub.qp.lower[i] - 1e-9);
        assert!(solution.primal[i] <= sub.qp.upper[i] + 1e-9);
    }
    // The goal is far away, so the candidate presses against the box.
    let candidate = sub.extract(&solution.primal);
    assert!((candidate.states[4][0] - 0.5).abs() < 1e-6);
}

#[test]
fn test_invalid_config_is_rejected() {
    let model = GoalSeeker::new(1.0);
    let mut traj = Trajectory::rollout(dvector![0.0], vec![dvector![0.0]; 2], |x, u| x + u);

    let planner =
        ExplorePlanner::with_config(ExploreConfig::new().with_trust_factors(1.5, 1.5));
    let err = planner.plan(&model, &mut traj).expect_err("should fail");
    assert!(err.to_string().contains("trust_shrink_ratio"));

    let planner = BeliefPlanner::with_config(BeliefConfig::new().with_max_iterations(0));
    let model = IntegratorBelief {
        stage_belief_weight: 1.0,
        control_weight: 1.0,
        terminal_weight: 1.0,
        control_effective: true,
    };
    let err = planner.plan(&model, &mut traj).expect_err("should fail");
    assert!(err.to_string().contains("max_iterations"));
}

#[test]
fn test_malformed_trajectory_is_rejected() {
    let model = GoalSeeker::new(1.0);
    // Control count does not match the horizon.
    let mut traj = Trajectory::new(
        vec![dvector![0.0], dvector![1.0], dvector![2.0]],
        vec![dvector![1.0]],
    );
    let err = ExplorePlanner::new()
        .plan(&model, &mut traj)
        .expect_err("should fail");
    assert!(matches!(err, PlannerError::Core(_)));
}
