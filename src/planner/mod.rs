//! Sequential convex programming planners.
//!
//! This module provides the two trust-region SCP variants:
//! - Exploration planner (hard linearized dynamics, Taylor cost model)
//! - Belief planner (L1 penalty on dynamics violation, scheduled penalty)
//!
//! Both share the trust-region step classification, the iteration statistics
//! table, and the plan summary defined here.

use std::{
    fmt,
    fmt::{Display, Formatter},
    time,
};
use thiserror::Error;
use tracing::{debug, error};

pub mod belief;
pub mod explore;

pub use belief::{BeliefConfig, BeliefPlanner};
pub use explore::{ExploreConfig, ExplorePlanner};

/// Slack below zero tolerated in the predicted improvement before the
/// quadratic model is declared invalid.
pub(crate) const CONVEXIFICATION_SLACK: f64 = 1e-5;

/// SCP-level error types.
#[derive(Debug, Clone, Error)]
pub enum ScpError {
    /// The convex model predicts a merit increase at its own optimizer,
    /// which means the linearization is inconsistent with the cost
    #[error(
        "Convexification failure: quadratic model predicts merit increase \
         (approximate improvement {approx_improve:.6e})"
    )]
    Convexification { approx_improve: f64 },

    /// Invalid planner configuration provided
    #[error("Invalid planner configuration: {0}")]
    InvalidConfig(String),
}

impl ScpError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Terminal status of a planning call.
///
/// Only [`PlanStatus::Converged`] means the planner is confident in the
/// result; the other two return the best trajectory found and leave the
/// judgement to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStatus {
    /// Predicted improvement fell below tolerance (or the trust region
    /// collapsed below its minimum width)
    Converged,
    /// Iteration budget exhausted before convergence
    IterationLimit,
    /// Penalty schedule exhausted with dynamics violation above tolerance
    ConstraintToleranceUnmet,
}

impl Display for PlanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PlanStatus::Converged => write!(f, "Converged"),
            PlanStatus::IterationLimit => write!(f, "Iteration limit reached"),
            PlanStatus::ConstraintToleranceUnmet => {
                write!(f, "Constraint tolerance not met")
            }
        }
    }
}

/// Box trust region: scalar half-widths for state and control entries.
///
/// Mutated only by the step decision logic; both widths move together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustRegion {
    /// Half-width applied to every state component.
    pub state_width: f64,
    /// Half-width applied to every control component.
    pub control_width: f64,
}

impl TrustRegion {
    pub fn new(state_width: f64, control_width: f64) -> Self {
        Self {
            state_width,
            control_width,
        }
    }

    /// Multiply both widths by `ratio` (rejected step).
    pub fn shrink(&mut self, ratio: f64) {
        self.state_width *= ratio;
        self.control_width *= ratio;
    }

    /// Multiply both widths by `ratio` (accepted step).
    pub fn expand(&mut self, ratio: f64) {
        self.state_width *= ratio;
        self.control_width *= ratio;
    }

    /// Restore the initial widths (penalty increase).
    pub fn reset(&mut self, initial: TrustRegion) {
        *self = initial;
    }

    /// True when both widths are below `min_width`.
    pub fn below(&self, min_width: f64) -> bool {
        self.state_width < min_width && self.control_width < min_width
    }
}

/// Outcome of one trust-region step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepDecision {
    /// Predicted improvement is meaningfully negative: convexification
    /// failure, abort the planning call
    Diverged { approx_improve: f64 },
    /// Predicted improvement below tolerance: accept and stop
    Converged,
    /// Actual improvement negative or ratio below threshold: reject and
    /// shrink the trust region
    Rejected { ratio: f64 },
    /// Sufficient agreement between model and merit: accept and expand
    Accepted { ratio: f64 },
}

/// Classify one trust-region step from its predicted and actual merit
/// improvements.
///
/// The checks run in a fixed order; in particular the improvement ratio is
/// only formed after `approx_improve < min_approx_improve` has been ruled
/// out, so the division cannot see a vanishing denominator.
pub fn classify_step(
    approx_improve: f64,
    exact_improve: f64,
    min_approx_improve: f64,
    improve_ratio_threshold: f64,
) -> StepDecision {
    if approx_improve < -CONVEXIFICATION_SLACK {
        return StepDecision::Diverged { approx_improve };
    }
    if approx_improve < min_approx_improve {
        return StepDecision::Converged;
    }
    let ratio = exact_improve / approx_improve;
    if exact_improve < 0.0 || ratio < improve_ratio_threshold {
        StepDecision::Rejected { ratio }
    } else {
        StepDecision::Accepted { ratio }
    }
}

/// Per-iteration statistics for detailed logging (Ceres-style output).
#[derive(Debug, Clone)]
pub struct IterationStats {
    /// Outer iteration number (0-indexed; 0 is the initial evaluation)
    pub iteration: usize,
    /// Merit value at the start of this iteration
    pub merit: f64,
    /// Change in merit from the previous iteration
    pub merit_change: f64,
    /// Improvement predicted by the convex model
    pub approx_improve: f64,
    /// Improvement actually achieved by the candidate
    pub exact_improve: f64,
    /// Trust region ratio (exact / approx)
    pub tr_ratio: f64,
    /// State trust-region half-width during this iteration
    pub tr_width: f64,
    /// QP subsolver iterations spent
    pub qp_iter: usize,
    /// Time taken for this iteration in milliseconds
    pub iter_time_ms: f64,
    /// Total elapsed time since planning started in milliseconds
    pub total_time_ms: f64,
    /// Whether the candidate was accepted
    pub accepted: bool,
}

impl IterationStats {
    /// Print table header in Ceres-style format
    pub fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>13}  {:>13}  {:>13}  {:>11}  {:>11}  {:>7}  {:>11}  {:>13}  {:>6}",
            "iter",
            "merit",
            "merit_change",
            "approx_impr",
            "exact_impr",
            "tr_ratio",
            "tr_width",
            "qp_iter",
            "iter_time",
            "total_time",
            "status"
        );
    }

    /// Print single iteration line in Ceres-style format with scientific notation
    pub fn print_line(&self) {
        let status = if self.iteration == 0 {
            "-"
        } else if self.accepted {
            "✓"
        } else {
            "✗"
        };

        debug!(
            "{:>4}  {:>13.6e}  {:>13.2e}  {:>13.2e}  {:>13.2e}  {:>11.2e}  {:>11.2e}  {:>7}  {:>9.2}ms  {:>11.2}ms  {:>6}",
            self.iteration,
            self.merit,
            self.merit_change,
            self.approx_improve,
            self.exact_improve,
            self.tr_ratio,
            self.tr_width,
            self.qp_iter,
            self.iter_time_ms,
            self.total_time_ms,
            status
        );
    }
}

/// Per-attempt statistics of the penalty schedule (belief variant).
#[derive(Debug, Clone)]
pub struct PenaltyStats {
    /// Penalty coefficient during this attempt
    pub penalty_coeff: f64,
    /// True dynamics violation at the end of the attempt
    pub violation: f64,
    /// Outer iterations spent in this attempt
    pub iterations: usize,
}

/// Summary statistics for one planning call.
#[derive(Debug, Clone)]
pub struct PlanSummary {
    /// Terminal status
    pub status: PlanStatus,
    /// True cost of the initial trajectory (penalty excluded)
    pub initial_cost: f64,
    /// True cost of the returned trajectory (penalty excluded)
    pub final_cost: f64,
    /// Total outer iterations performed (one QP solve each)
    pub iterations: usize,
    /// Number of accepted steps
    pub accepted_steps: usize,
    /// Number of rejected steps
    pub rejected_steps: usize,
    /// Final state trust-region half-width
    pub final_state_width: f64,
    /// Final control trust-region half-width
    pub final_control_width: f64,
    /// Final penalty coefficient (belief variant only)
    pub final_penalty_coeff: Option<f64>,
    /// Final true dynamics violation (belief variant only)
    pub constraint_violation: Option<f64>,
    /// Per-attempt penalty schedule history (empty for the exploration
    /// variant)
    pub penalty_history: Vec<PenaltyStats>,
    /// Total time elapsed
    pub elapsed_time: time::Duration,
    /// Detailed per-iteration statistics history
    pub iteration_history: Vec<IterationStats>,
}

impl Display for PlanSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "SCP Planning Final Result")?;
        match self.status {
            PlanStatus::Converged => writeln!(f, "CONVERGED")?,
            status => writeln!(f, "NOT CONVERGED ({status})")?,
        }

        writeln!(f)?;
        writeln!(f, "Cost:")?;
        writeln!(f, "  Initial:   {:.6e}", self.initial_cost)?;
        writeln!(f, "  Final:     {:.6e}", self.final_cost)?;
        writeln!(
            f,
            "  Reduction: {:.6e} ({:.2}%)",
            self.initial_cost - self.final_cost,
            100.0 * (self.initial_cost - self.final_cost) / self.initial_cost.abs().max(1e-12)
        )?;
        writeln!(f)?;
        writeln!(f, "Iterations:")?;
        writeln!(f, "  Total:          {}", self.iterations)?;
        writeln!(
            f,
            "  Accepted steps: {} ({:.1}%)",
            self.accepted_steps,
            100.0 * self.accepted_steps as f64 / self.iterations.max(1) as f64
        )?;
        writeln!(
            f,
            "  Rejected steps: {} ({:.1}%)",
            self.rejected_steps,
            100.0 * self.rejected_steps as f64 / self.iterations.max(1) as f64
        )?;
        writeln!(f)?;
        writeln!(f, "Trust Region:")?;
        writeln!(f, "  Final state width:   {:.6e}", self.final_state_width)?;
        writeln!(f, "  Final control width: {:.6e}", self.final_control_width)?;
        if let Some(penalty) = self.final_penalty_coeff {
            writeln!(f)?;
            writeln!(f, "Penalty Schedule:")?;
            writeln!(f, "  Final coefficient: {:.6e}", penalty)?;
            if let Some(violation) = self.constraint_violation {
                writeln!(f, "  Final violation:   {:.6e}", violation)?;
            }
            writeln!(f, "  Attempts:          {}", self.penalty_history.len())?;
        }
        writeln!(f)?;
        writeln!(f, "Performance:")?;
        writeln!(
            f,
            "  Total time:            {:.2}ms",
            self.elapsed_time.as_secs_f64() * 1000.0
        )?;
        writeln!(
            f,
            "  Average per iteration: {:.2}ms",
            self.elapsed_time.as_secs_f64() * 1000.0 / self.iterations.max(1) as f64
        )?;

        Ok(())
    }
}
