//! Convex QP subsolver contract.
//!
//! The SCP engine consumes a quadratic-program solver as an external
//! collaborator: one call per outer iteration, taking a convex subproblem
//! description and returning an optimal point plus its objective value. The
//! engine depends on nothing beyond this contract, so the shipped
//! [`AdmmSolver`] can be swapped for any other backend.
//!
//! Every failure mode is a typed [`QpError`] that the planner propagates to
//! its caller; a subsolver must never terminate the process.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::error;

pub mod admm;

pub use admm::{AdmmConfig, AdmmSolver};

/// One convex quadratic subproblem:
///
/// ```text
/// minimize   ½ xᵀ diag(hessian_diag) x + gradientᵀ x
/// subject to eq_mat x = eq_rhs
///            lower <= x <= upper
/// ```
///
/// `hessian_diag` must be elementwise non-negative (the subproblem builders
/// clamp it), so the problem is always convex. Bounds may be infinite.
#[derive(Debug, Clone, PartialEq)]
pub struct QpProblem {
    /// Diagonal of the quadratic cost term, non-negative.
    pub hessian_diag: DVector<f64>,
    /// Linear cost term.
    pub gradient: DVector<f64>,
    /// Elementwise lower bounds (may be `-inf`).
    pub lower: DVector<f64>,
    /// Elementwise upper bounds (may be `+inf`).
    pub upper: DVector<f64>,
    /// Dense equality constraint matrix, `m x n`.
    pub eq_mat: DMatrix<f64>,
    /// Equality right-hand side, length `m`.
    pub eq_rhs: DVector<f64>,
    /// Optional primal warm start (the builders pass the stacked reference
    /// trajectory). Solvers may ignore it.
    pub warm_start: Option<DVector<f64>>,
}

impl QpProblem {
    /// Number of decision variables.
    pub fn num_vars(&self) -> usize {
        self.gradient.len()
    }

    /// Number of equality constraint rows.
    pub fn num_eq(&self) -> usize {
        self.eq_rhs.len()
    }

    /// Evaluate the quadratic objective at a point.
    pub fn objective(&self, x: &DVector<f64>) -> f64 {
        0.5 * self.hessian_diag.dot(&x.component_mul(x)) + self.gradient.dot(x)
    }

    /// Check internal dimension consistency.
    pub fn validate(&self) -> Result<(), QpError> {
        let n = self.num_vars();
        for (len, what) in [
            (self.hessian_diag.len(), "hessian diagonal"),
            (self.lower.len(), "lower bounds"),
            (self.upper.len(), "upper bounds"),
            (self.eq_mat.ncols(), "equality matrix columns"),
        ] {
            if len != n {
                return Err(QpError::Dimension(format!(
                    "{what}: expected {n} entries, got {len}"
                )));
            }
        }
        if self.eq_mat.nrows() != self.eq_rhs.len() {
            return Err(QpError::Dimension(format!(
                "equality rows: matrix has {}, rhs has {}",
                self.eq_mat.nrows(),
                self.eq_rhs.len()
            )));
        }
        if let Some(x0) = &self.warm_start {
            if x0.len() != n {
                return Err(QpError::Dimension(format!(
                    "warm start: expected {n} entries, got {}",
                    x0.len()
                )));
            }
        }
        if self.hessian_diag.iter().any(|&h| h < 0.0) {
            return Err(QpError::NotConvex);
        }
        Ok(())
    }
}

/// Optimal point returned by a [`QpSolver`].
#[derive(Debug, Clone)]
pub struct QpSolution {
    /// Primal optimizer.
    pub primal: DVector<f64>,
    /// Objective value at the optimizer.
    pub objective: f64,
    /// Solver iterations spent (0 for direct methods).
    pub iterations: usize,
}

/// Subsolver failure modes.
///
/// Whether the subproblem was infeasible or the solve failed numerically,
/// the planner treats every error here as fatal for the current planning
/// call.
#[derive(Debug, Clone, Error)]
pub enum QpError {
    /// Inconsistent subproblem dimensions
    #[error("QP dimension error: {0}")]
    Dimension(String),

    /// Negative entry on the cost diagonal
    #[error("QP cost is not convex: hessian diagonal has a negative entry")]
    NotConvex,

    /// The normal-equations factorization failed
    #[error("QP factorization failed: {0}")]
    Factorization(String),

    /// Iteration budget exhausted before reaching tolerance
    #[error(
        "QP did not converge in {iterations} iterations \
         (primal residual {primal_residual:.3e}, dual residual {dual_residual:.3e})"
    )]
    Unconverged {
        iterations: usize,
        primal_residual: f64,
        dual_residual: f64,
    },
}

impl QpError {
    /// Log the error at error level and return self for chaining.
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// A convex QP backend.
///
/// `solve` is a pure function of the subproblem: it must not retain state
/// across calls that affects the result.
pub trait QpSolver {
    fn solve(&self, qp: &QpProblem) -> Result<QpSolution, QpError>;
}
