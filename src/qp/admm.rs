//! Dense operator-splitting QP solver.
//!
//! Reference subsolver for the SCP planners: an ADMM iteration in the
//! OSQP/SCS family specialized to the subproblem shape produced by the
//! builders (diagonal cost, dense equality rows, box bounds). The splitting
//! keeps two constraint blocks with separate penalty parameters:
//!
//! ```text
//! minimize   ½ xᵀPx + qᵀx
//! subject to A x = b        (penalty ρ_eq)
//!            l <= x <= u    (penalty ρ_box)
//! ```
//!
//! Each solve factors `P + (σ + ρ_box) I + ρ_eq AᵀA` once with a dense
//! Cholesky decomposition and then iterates cheap matrix-vector updates with
//! over-relaxation until the infinity-norm primal and dual residuals fall
//! below tolerance. Equality rows get a much stiffer penalty than box rows,
//! which drives the dynamics-consistency constraints to tight feasibility in
//! few iterations.
//!
//! The problems produced by the subproblem builders are always feasible when
//! the reference trajectory respects the physical bounds (the reference
//! point itself is feasible), so hitting the iteration budget signals
//! numerical trouble rather than a badly posed subproblem.

use crate::qp::{QpError, QpProblem, QpSolution, QpSolver};
use nalgebra::{Cholesky, DMatrix, DVector};
use tracing::debug;

/// Configuration for [`AdmmSolver`].
#[derive(Debug, Clone)]
pub struct AdmmConfig {
    /// Penalty parameter on equality rows.
    pub rho_eq: f64,
    /// Penalty parameter on box rows.
    pub rho_box: f64,
    /// Proximal regularization on the primal update.
    pub sigma: f64,
    /// Over-relaxation parameter, in (0, 2).
    pub relaxation: f64,
    /// Absolute residual tolerance.
    pub eps_abs: f64,
    /// Relative residual tolerance.
    pub eps_rel: f64,
    /// Iteration budget.
    pub max_iterations: usize,
    /// Residuals are evaluated every this many iterations.
    pub check_interval: usize,
}

impl Default for AdmmConfig {
    fn default() -> Self {
        Self {
            rho_eq: 1e3,
            rho_box: 1.0,
            sigma: 1e-6,
            relaxation: 1.6,
            eps_abs: 1e-8,
            eps_rel: 1e-10,
            max_iterations: 50_000,
            check_interval: 25,
        }
    }
}

impl AdmmConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the residual tolerances.
    pub fn with_tolerance(mut self, eps_abs: f64, eps_rel: f64) -> Self {
        self.eps_abs = eps_abs;
        self.eps_rel = eps_rel;
        self
    }

    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the penalty parameters for equality and box rows.
    pub fn with_penalty_params(mut self, rho_eq: f64, rho_box: f64) -> Self {
        self.rho_eq = rho_eq;
        self.rho_box = rho_box;
        self
    }

    /// Set the over-relaxation parameter.
    pub fn with_relaxation(mut self, relaxation: f64) -> Self {
        self.relaxation = relaxation;
        self
    }
}

/// Dense ADMM solver implementing [`QpSolver`].
#[derive(Debug, Clone, Default)]
pub struct AdmmSolver {
    config: AdmmConfig,
}

impl AdmmSolver {
    /// Create a solver with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a solver with the given configuration.
    pub fn with_config(config: AdmmConfig) -> Self {
        Self { config }
    }

    fn inf_norm(v: &DVector<f64>) -> f64 {
        if v.is_empty() { 0.0 } else { v.amax() }
    }

    fn clamp(v: &DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) -> DVector<f64> {
        v.zip_zip_map(lower, upper, |x, lo, hi| x.max(lo).min(hi))
    }
}

impl QpSolver for AdmmSolver {
    fn solve(&self, qp: &QpProblem) -> Result<QpSolution, QpError> {
        qp.validate()?;

        let cfg = &self.config;
        let n = qp.num_vars();
        let m = qp.num_eq();
        let a = &qp.eq_mat;
        let a_t = a.transpose();

        // KKT matrix: P + (σ + ρ_box) I + ρ_eq AᵀA. Positive definite for
        // any non-negative P because σ + ρ_box > 0.
        let mut kkt = &a_t * a * cfg.rho_eq;
        for i in 0..n {
            kkt[(i, i)] += qp.hessian_diag[i] + cfg.sigma + cfg.rho_box;
        }
        let factor = Cholesky::new(kkt).ok_or_else(|| {
            QpError::Factorization("Cholesky of the ADMM KKT matrix failed".to_string()).log()
        })?;

        let mut x = match &qp.warm_start {
            Some(x0) => Self::clamp(x0, &qp.lower, &qp.upper),
            None => Self::clamp(&DVector::zeros(n), &qp.lower, &qp.upper),
        };
        let mut z_box = x.clone();
        let mut y_eq = DVector::zeros(m);
        let mut y_box = DVector::zeros(n);
        // The equality-block auxiliary variable projects onto {b}, so it is
        // identically b and only its dual is iterated.
        let z_eq = qp.eq_rhs.clone();

        let alpha = cfg.relaxation;
        let mut iteration = 0;

        while iteration < cfg.max_iterations {
            for _ in 0..cfg.check_interval {
                // Primal update.
                let mut rhs = cfg.sigma * &x - &qp.gradient + cfg.rho_box * &z_box - &y_box;
                if m > 0 {
                    rhs += &a_t * (cfg.rho_eq * &z_eq - &y_eq);
                }
                let x_tilde = factor.solve(&rhs);

                // Relaxed auxiliary/dual updates, equality block first.
                if m > 0 {
                    let az = a * &x_tilde;
                    let z_hat = alpha * az + (1.0 - alpha) * &z_eq;
                    y_eq += cfg.rho_eq * (z_hat - &z_eq);
                }

                let z_hat = alpha * &x_tilde + (1.0 - alpha) * &z_box;
                let new_z_box =
                    Self::clamp(&(&z_hat + &y_box / cfg.rho_box), &qp.lower, &qp.upper);
                y_box += cfg.rho_box * (z_hat - &new_z_box);
                z_box = new_z_box;

                x = alpha * x_tilde + (1.0 - alpha) * x;
                iteration += 1;
            }

            // Residual check, OSQP-style infinity norms.
            let px = qp.hessian_diag.component_mul(&x);
            let mut dual = &px + &qp.gradient + &y_box;
            let mut prim_eq = 0.0;
            let mut ax_norm = 0.0;
            if m > 0 {
                let ax = a * &x;
                prim_eq = Self::inf_norm(&(&ax - &qp.eq_rhs));
                ax_norm = Self::inf_norm(&ax);
                dual += &a_t * &y_eq;
            }
            let prim_box = Self::inf_norm(&(&x - &z_box));
            let prim = prim_eq.max(prim_box);
            let dual_norm = Self::inf_norm(&dual);

            let eps_prim = cfg.eps_abs
                + cfg.eps_rel * ax_norm.max(Self::inf_norm(&x)).max(Self::inf_norm(&qp.eq_rhs));
            let eps_dual = cfg.eps_abs
                + cfg.eps_rel * Self::inf_norm(&px).max(Self::inf_norm(&qp.gradient));

            if prim <= eps_prim && dual_norm <= eps_dual {
                // The box block is satisfied exactly after projection; the
                // equality block keeps its residual-level violation.
                let primal = Self::clamp(&x, &qp.lower, &qp.upper);
                let objective = qp.objective(&primal);
                debug!(
                    "ADMM converged: {} iterations, primal residual {:.3e}, dual residual {:.3e}",
                    iteration, prim, dual_norm
                );
                return Ok(QpSolution {
                    primal,
                    objective,
                    iterations: iteration,
                });
            }
        }

        // Final residuals for the error report.
        let prim = {
            let prim_box = Self::inf_norm(&(&x - &z_box));
            if m > 0 {
                Self::inf_norm(&(a * &x - &qp.eq_rhs)).max(prim_box)
            } else {
                prim_box
            }
        };
        let mut dual = qp.hessian_diag.component_mul(&x) + &qp.gradient + &y_box;
        if m > 0 {
            dual += &a_t * &y_eq;
        }
        Err(QpError::Unconverged {
            iterations: iteration,
            primal_residual: prim,
            dual_residual: Self::inf_norm(&dual),
        }
        .log())
    }
}
