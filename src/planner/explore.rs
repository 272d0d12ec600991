//! Trust-region SCP planner for the exploration variant.
//!
//! Each outer iteration linearizes the dynamics and the trajectory cost
//! around the current trajectory, solves one convex QP inside the trust
//! region, and accepts or rejects the candidate from the agreement between
//! predicted and actual merit improvement. Linearized dynamics are hard
//! equality constraints, so every candidate is consistent with the local
//! dynamics model by construction.

use crate::core::{ExplorationModel, Trajectory};
use crate::error::PlannerResult;
use crate::planner::{
    classify_step, IterationStats, PlanStatus, PlanSummary, ScpError, StepDecision, TrustRegion,
};
use crate::qp::{AdmmSolver, QpSolver};
use crate::subproblem::explore;
use std::time;
use tracing::debug;

/// Configuration parameters for [`ExplorePlanner`].
///
/// All options can be set with the builder pattern:
///
/// ```
/// use scp_planner::planner::ExploreConfig;
///
/// let config = ExploreConfig::new()
///     .with_max_iterations(100)
///     .with_initial_trust_widths(0.5, 0.5)
///     .with_min_approx_improve(1e-4);
/// ```
#[derive(Debug, Clone)]
pub struct ExploreConfig {
    /// Maximum number of outer iterations (one QP solve each)
    pub max_iterations: usize,
    /// Predicted improvement below which the planner declares convergence
    pub min_approx_improve: f64,
    /// Minimum ratio of actual to predicted improvement for acceptance
    pub improve_ratio_threshold: f64,
    /// Trust region multiplier on rejection, in (0, 1)
    pub trust_shrink_ratio: f64,
    /// Trust region multiplier on acceptance, greater than 1
    pub trust_expand_ratio: f64,
    /// Initial state trust-region half-width
    pub initial_state_width: f64,
    /// Initial control trust-region half-width
    pub initial_control_width: f64,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            min_approx_improve: 1e-4,
            improve_ratio_threshold: 0.1,
            trust_shrink_ratio: 0.5,
            trust_expand_ratio: 1.5,
            initial_state_width: 0.5,
            initial_control_width: 0.5,
        }
    }
}

impl ExploreConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of outer iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence threshold on the predicted improvement.
    pub fn with_min_approx_improve(mut self, min_approx_improve: f64) -> Self {
        self.min_approx_improve = min_approx_improve;
        self
    }

    /// Set the acceptance threshold on the improvement ratio.
    pub fn with_improve_ratio_threshold(mut self, threshold: f64) -> Self {
        self.improve_ratio_threshold = threshold;
        self
    }

    /// Set the trust region shrink and expand multipliers.
    pub fn with_trust_factors(mut self, shrink: f64, expand: f64) -> Self {
        self.trust_shrink_ratio = shrink;
        self.trust_expand_ratio = expand;
        self
    }

    /// Set the initial trust-region half-widths.
    pub fn with_initial_trust_widths(mut self, state_width: f64, control_width: f64) -> Self {
        self.initial_state_width = state_width;
        self.initial_control_width = control_width;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), ScpError> {
        if self.max_iterations == 0 {
            return Err(ScpError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.trust_shrink_ratio > 0.0 && self.trust_shrink_ratio < 1.0) {
            return Err(ScpError::InvalidConfig(format!(
                "trust_shrink_ratio must be in (0, 1), got {}",
                self.trust_shrink_ratio
            )));
        }
        if self.trust_expand_ratio <= 1.0 {
            return Err(ScpError::InvalidConfig(format!(
                "trust_expand_ratio must be greater than 1, got {}",
                self.trust_expand_ratio
            )));
        }
        if !(self.improve_ratio_threshold > 0.0 && self.improve_ratio_threshold < 1.0) {
            return Err(ScpError::InvalidConfig(format!(
                "improve_ratio_threshold must be in (0, 1), got {}",
                self.improve_ratio_threshold
            )));
        }
        for (value, what) in [
            (self.min_approx_improve, "min_approx_improve"),
            (self.initial_state_width, "initial_state_width"),
            (self.initial_control_width, "initial_control_width"),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ScpError::InvalidConfig(format!(
                    "{what} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }

    fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Planner:        SCP (exploration)\n\nConvergence Criteria:\n  Max iterations:     {}\n  Min approx improve: {:.2e}\n\nTrust Region:\n  Initial widths:     state {:.2e}, control {:.2e}\n  Shrink / expand:    {:.2} / {:.2}\n  Ratio threshold:    {:.2}",
            self.max_iterations,
            self.min_approx_improve,
            self.initial_state_width,
            self.initial_control_width,
            self.trust_shrink_ratio,
            self.trust_expand_ratio,
            self.improve_ratio_threshold
        );
    }
}

/// Trust-region SCP planner minimizing a nonlinear trajectory cost under
/// hard linearized dynamics.
pub struct ExplorePlanner<S: QpSolver = AdmmSolver> {
    config: ExploreConfig,
    solver: S,
}

impl ExplorePlanner<AdmmSolver> {
    /// Create a planner with default configuration and the reference QP
    /// subsolver.
    pub fn new() -> Self {
        Self::with_config(ExploreConfig::default())
    }

    /// Create a planner with the given configuration and the reference QP
    /// subsolver.
    pub fn with_config(config: ExploreConfig) -> Self {
        Self {
            config,
            solver: AdmmSolver::new(),
        }
    }
}

impl Default for ExplorePlanner<AdmmSolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: QpSolver> ExplorePlanner<S> {
    /// Create a planner with a caller-supplied QP backend.
    pub fn with_solver(config: ExploreConfig, solver: S) -> Self {
        Self { config, solver }
    }

    /// Optimize `traj` in place.
    ///
    /// On success the trajectory holds the best accepted iterate; on error
    /// it holds the last accepted iterate (the input, if nothing was
    /// accepted).
    pub fn plan<M: ExplorationModel>(
        &self,
        model: &M,
        traj: &mut Trajectory,
    ) -> PlannerResult<PlanSummary> {
        self.config.validate()?;
        traj.validate(model.state_dim(), model.control_dim())?;

        let start = time::Instant::now();
        let mut merit = model.cost(traj);
        let initial_cost = merit;
        let mut trust = TrustRegion::new(
            self.config.initial_state_width,
            self.config.initial_control_width,
        );

        let mut history = Vec::with_capacity(self.config.max_iterations + 1);
        if tracing::enabled!(tracing::Level::DEBUG) {
            self.config.print_configuration();
            IterationStats::print_header();
        }
        let initial_stats = IterationStats {
            iteration: 0,
            merit,
            merit_change: 0.0,
            approx_improve: 0.0,
            exact_improve: 0.0,
            tr_ratio: 0.0,
            tr_width: trust.state_width,
            qp_iter: 0,
            iter_time_ms: 0.0,
            total_time_ms: 0.0,
            accepted: true,
        };
        if tracing::enabled!(tracing::Level::DEBUG) {
            initial_stats.print_line();
        }
        history.push(initial_stats);

        let mut status = PlanStatus::IterationLimit;
        let mut accepted_steps = 0;
        let mut rejected_steps = 0;
        let mut iterations = 0;
        // Rebuilt only after an accepted step; rejection just retightens
        // the box bounds around the unchanged expansion point.
        let mut sub = explore::build(model, traj, trust.state_width, trust.control_width);
        let mut rebuild = false;

        for iteration in 1..=self.config.max_iterations {
            let iter_start = time::Instant::now();
            iterations = iteration;

            if rebuild {
                sub = explore::build(model, traj, trust.state_width, trust.control_width);
                rebuild = false;
            } else if iteration > 1 {
                sub.retighten(model, traj, trust.state_width, trust.control_width);
            }
            let solution = self.solver.solve(&sub.qp)?;
            let mut candidate = sub.extract(&solution.primal);
            // The QP pins the initial state only to solver tolerance; the
            // caller's initial condition is exact.
            candidate.states[0] = traj.states[0].clone();
            let model_merit = sub.model_merit(solution.objective);
            let new_merit = model.cost(&candidate);
            let approx_improve = merit - model_merit;
            let exact_improve = merit - new_merit;

            let decision = classify_step(
                approx_improve,
                exact_improve,
                self.config.min_approx_improve,
                self.config.improve_ratio_threshold,
            );

            let accepted = matches!(
                decision,
                StepDecision::Accepted { .. } | StepDecision::Converged
            );
            let stats = IterationStats {
                iteration,
                merit,
                merit_change: if accepted { new_merit - merit } else { 0.0 },
                approx_improve,
                exact_improve,
                tr_ratio: match decision {
                    StepDecision::Accepted { ratio } | StepDecision::Rejected { ratio } => ratio,
                    _ => 0.0,
                },
                tr_width: trust.state_width,
                qp_iter: solution.iterations,
                iter_time_ms: iter_start.elapsed().as_secs_f64() * 1000.0,
                total_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                accepted,
            };
            if tracing::enabled!(tracing::Level::DEBUG) {
                stats.print_line();
            }
            history.push(stats);

            match decision {
                StepDecision::Diverged { approx_improve } => {
                    return Err(ScpError::Convexification { approx_improve }.log().into());
                }
                StepDecision::Converged => {
                    *traj = candidate;
                    merit = new_merit;
                    accepted_steps += 1;
                    status = PlanStatus::Converged;
                    break;
                }
                StepDecision::Rejected { .. } => {
                    trust.shrink(self.config.trust_shrink_ratio);
                    rejected_steps += 1;
                }
                StepDecision::Accepted { .. } => {
                    *traj = candidate;
                    merit = new_merit;
                    trust.expand(self.config.trust_expand_ratio);
                    accepted_steps += 1;
                    rebuild = true;
                }
            }
        }

        let summary = PlanSummary {
            status,
            initial_cost,
            final_cost: merit,
            iterations,
            accepted_steps,
            rejected_steps,
            final_state_width: trust.state_width,
            final_control_width: trust.control_width,
            final_penalty_coeff: None,
            constraint_violation: None,
            penalty_history: Vec::new(),
            elapsed_time: start.elapsed(),
            iteration_history: history,
        };
        debug!("{}", summary);
        Ok(summary)
    }
}
