//! Penalty SCP planner for the belief variant.
//!
//! Two nested loops around the trust-region controller: the inner loop is
//! the same accept/reject/shrink/expand scheme as the exploration variant,
//! run on the penalty merit; the outer loop checks the true dynamics
//! violation after each convergence and, while it exceeds tolerance,
//! multiplies the penalty coefficient and resets the trust region. The
//! iteration budget counts QP solves across the whole schedule.

use crate::core::{BeliefModel, Trajectory};
use crate::error::PlannerResult;
use crate::merit::{belief_cost, belief_merit, constraint_violation};
use crate::planner::{
    classify_step, IterationStats, PenaltyStats, PlanStatus, PlanSummary, ScpError, StepDecision,
    TrustRegion,
};
use crate::qp::{AdmmSolver, QpSolver};
use crate::subproblem::belief;
use std::time;
use tracing::debug;

/// Configuration parameters for [`BeliefPlanner`].
///
/// All options can be set with the builder pattern:
///
/// ```
/// use scp_planner::planner::BeliefConfig;
///
/// let config = BeliefConfig::new()
///     .with_max_iterations(50)
///     .with_penalty_schedule(5.0, 5.0, 3)
///     .with_constraint_tolerance(1e-4);
/// ```
#[derive(Debug, Clone)]
pub struct BeliefConfig {
    /// Maximum total outer iterations across all penalty attempts
    pub max_iterations: usize,
    /// Predicted improvement below which the inner loop declares convergence
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
    /// Trust-region width below which the inner loop declares convergence
    pub min_trust_box_size: f64,
    /// Initial L1 penalty coefficient
    pub initial_penalty_coeff: f64,
    /// Multiplier applied to the penalty coefficient per failed attempt
    pub penalty_increase_ratio: f64,
    /// Maximum number of penalty increases before giving up
    pub max_penalty_increases: usize,
    /// Dynamics violation below which the constraints count as satisfied
    pub constraint_tolerance: f64,
}

impl Default for BeliefConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            min_approx_improve: 1e-3,
            improve_ratio_threshold: 0.1,
            trust_shrink_ratio: 0.5,
            trust_expand_ratio: 1.5,
            initial_state_width: 1.0,
            initial_control_width: 1.0,
            min_trust_box_size: 1e-3,
            initial_penalty_coeff: 5.0,
            penalty_increase_ratio: 5.0,
            max_penalty_increases: 3,
            constraint_tolerance: 1e-4,
        }
    }
}

impl BeliefConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum total number of outer iterations.
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

    /// Set the minimum trust-region width.
    pub fn with_min_trust_box_size(mut self, min_trust_box_size: f64) -> Self {
        self.min_trust_box_size = min_trust_box_size;
        self
    }

    /// Set the penalty schedule: initial coefficient, increase ratio, and
    /// maximum number of increases.
    pub fn with_penalty_schedule(
        mut self,
        initial_coeff: f64,
        increase_ratio: f64,
        max_increases: usize,
    ) -> Self {
        self.initial_penalty_coeff = initial_coeff;
        self.penalty_increase_ratio = increase_ratio;
        self.max_penalty_increases = max_increases;
        self
    }

    /// Set the dynamics violation tolerance.
    pub fn with_constraint_tolerance(mut self, tolerance: f64) -> Self {
        self.constraint_tolerance = tolerance;
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
        if self.penalty_increase_ratio <= 1.0 {
            return Err(ScpError::InvalidConfig(format!(
                "penalty_increase_ratio must be greater than 1, got {}",
                self.penalty_increase_ratio
            )));
        }
        for (value, what) in [
            (self.min_approx_improve, "min_approx_improve"),
            (self.initial_state_width, "initial_state_width"),
            (self.initial_control_width, "initial_control_width"),
            (self.min_trust_box_size, "min_trust_box_size"),
            (self.initial_penalty_coeff, "initial_penalty_coeff"),
            (self.constraint_tolerance, "constraint_tolerance"),
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
            "Configuration:\n  Planner:        SCP (belief, L1 penalty)\n\nConvergence Criteria:\n  Max iterations:       {}\n  Min approx improve:   {:.2e}\n  Min trust width:      {:.2e}\n  Constraint tolerance: {:.2e}\n\nTrust Region:\n  Initial widths:     state {:.2e}, control {:.2e}\n  Shrink / expand:    {:.2} / {:.2}\n  Ratio threshold:    {:.2}\n\nPenalty Schedule:\n  Initial coefficient: {:.2e}\n  Increase ratio:      {:.2}\n  Max increases:       {}",
            self.max_iterations,
            self.min_approx_improve,
            self.min_trust_box_size,
            self.constraint_tolerance,
            self.initial_state_width,
            self.initial_control_width,
            self.trust_shrink_ratio,
            self.trust_expand_ratio,
            self.improve_ratio_threshold,
            self.initial_penalty_coeff,
            self.penalty_increase_ratio,
            self.max_penalty_increases
        );
    }
}

/// Penalty SCP planner for belief-space collocation.
pub struct BeliefPlanner<S: QpSolver = AdmmSolver> {
    config: BeliefConfig,
    solver: S,
}

impl BeliefPlanner<AdmmSolver> {
    /// Create a planner with default configuration and the reference QP
    /// subsolver.
    pub fn new() -> Self {
        Self::with_config(BeliefConfig::default())
    }

    /// Create a planner with the given configuration and the reference QP
    /// subsolver.
    pub fn with_config(config: BeliefConfig) -> Self {
        Self {
            config,
            solver: AdmmSolver::new(),
        }
    }
}

impl Default for BeliefPlanner<AdmmSolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: QpSolver> BeliefPlanner<S> {
    /// Create a planner with a caller-supplied QP backend.
    pub fn with_solver(config: BeliefConfig, solver: S) -> Self {
        Self { config, solver }
    }

    /// Optimize `traj` in place.
    ///
    /// Returns the true trajectory cost with the penalty term excluded in
    /// the summary; `PlanStatus::ConstraintToleranceUnmet` flags a
    /// best-effort result whose dynamics violation is above tolerance.
    pub fn plan<M: BeliefModel>(
        &self,
        model: &M,
        traj: &mut Trajectory,
    ) -> PlannerResult<PlanSummary> {
        self.config.validate()?;
        traj.validate(model.state_dim(), model.control_dim())?;

        let cfg = &self.config;
        let start = time::Instant::now();
        let initial_trust = TrustRegion::new(cfg.initial_state_width, cfg.initial_control_width);
        let mut trust = initial_trust;
        let mut penalty_coeff = cfg.initial_penalty_coeff;
        let initial_cost = belief_cost(model, traj);

        let mut history = Vec::with_capacity(cfg.max_iterations + 1);
        if tracing::enabled!(tracing::Level::DEBUG) {
            cfg.print_configuration();
            IterationStats::print_header();
        }
        let initial_stats = IterationStats {
            iteration: 0,
            merit: belief_merit(model, traj, penalty_coeff),
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

        let mut penalty_history = Vec::with_capacity(cfg.max_penalty_increases + 1);
        let mut accepted_steps = 0;
        let mut rejected_steps = 0;
        let mut iterations = 0;
        let mut increases = 0;
        let violation;
        let status;

        'schedule: loop {
            // Inner trust-region loop at the current penalty coefficient.
            let mut merit = belief_merit(model, traj, penalty_coeff);
            let mut inner_status = PlanStatus::IterationLimit;
            let mut attempt_iterations = 0;
            let mut sub = belief::build(
                model,
                traj,
                penalty_coeff,
                trust.state_width,
                trust.control_width,
            );
            let mut rebuild = false;

            while iterations < cfg.max_iterations {
                let iter_start = time::Instant::now();
                iterations += 1;
                attempt_iterations += 1;

                if rebuild {
                    sub = belief::build(
                        model,
                        traj,
                        penalty_coeff,
                        trust.state_width,
                        trust.control_width,
                    );
                    rebuild = false;
                } else if attempt_iterations > 1 {
                    sub.retighten(model, traj, trust.state_width, trust.control_width);
                }
                let solution = self.solver.solve(&sub.qp)?;
                let mut candidate = sub.extract(&solution.primal);
                // The QP pins the initial state only to solver tolerance;
                // the caller's initial condition is exact.
                candidate.states[0] = traj.states[0].clone();
                let model_merit = sub.model_merit(solution.objective);
                let new_merit = belief_merit(model, &candidate, penalty_coeff);
                let approx_improve = merit - model_merit;
                let exact_improve = merit - new_merit;

                let decision = classify_step(
                    approx_improve,
                    exact_improve,
                    cfg.min_approx_improve,
                    cfg.improve_ratio_threshold,
                );

                let accepted = matches!(
                    decision,
                    StepDecision::Accepted { .. } | StepDecision::Converged
                );
                let stats = IterationStats {
                    iteration: iterations,
                    merit,
                    merit_change: if accepted { new_merit - merit } else { 0.0 },
                    approx_improve,
                    exact_improve,
                    tr_ratio: match decision {
                        StepDecision::Accepted { ratio } | StepDecision::Rejected { ratio } => {
                            ratio
                        }
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
                        accepted_steps += 1;
                        inner_status = PlanStatus::Converged;
                        break;
                    }
                    StepDecision::Rejected { .. } => {
                        trust.shrink(cfg.trust_shrink_ratio);
                        rejected_steps += 1;
                    }
                    StepDecision::Accepted { .. } => {
                        *traj = candidate;
                        merit = new_merit;
                        trust.expand(cfg.trust_expand_ratio);
                        accepted_steps += 1;
                        rebuild = true;
                    }
                }

                if trust.below(cfg.min_trust_box_size) {
                    inner_status = PlanStatus::Converged;
                    break;
                }
            }

            // The merit drove the inner loop; the schedule decides on the
            // true violation.
            let attempt_violation = constraint_violation(model, traj);
            penalty_history.push(PenaltyStats {
                penalty_coeff,
                violation: attempt_violation,
                iterations: attempt_iterations,
            });

            if attempt_violation < cfg.constraint_tolerance {
                violation = attempt_violation;
                status = inner_status;
                break 'schedule;
            }
            if iterations >= cfg.max_iterations {
                violation = attempt_violation;
                status = PlanStatus::IterationLimit;
                break 'schedule;
            }
            if increases >= cfg.max_penalty_increases {
                violation = attempt_violation;
                status = PlanStatus::ConstraintToleranceUnmet;
                break 'schedule;
            }
            penalty_coeff *= cfg.penalty_increase_ratio;
            increases += 1;
            trust.reset(initial_trust);
            debug!(
                "Dynamics violation {:.6e} above tolerance, raising penalty to {:.6e}",
                attempt_violation, penalty_coeff
            );
        }

        let summary = PlanSummary {
            status,
            initial_cost,
            final_cost: belief_cost(model, traj),
            iterations,
            accepted_steps,
            rejected_steps,
            final_state_width: trust.state_width,
            final_control_width: trust.control_width,
            final_penalty_coeff: Some(penalty_coeff),
            constraint_violation: Some(violation),
            penalty_history,
            elapsed_time: start.elapsed(),
            iteration_history: history,
        };
        debug!("{}", summary);
        Ok(summary)
    }
}
