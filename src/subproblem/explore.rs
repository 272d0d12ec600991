//! Exploration subproblem builder.
//!
//! Builds the trust-region QP for the simple variant: a second-order Taylor
//! model of the nonlinear trajectory cost, hard linearized-dynamics equality
//! constraints, and box bounds tightened by the trust region. The diagonal
//! Hessian is clamped elementwise at zero so the local model is always
//! convex; near strong negative curvature the model degrades toward linear
//! and the trust-region controller compensates by shrinking the box.

use crate::core::{ExplorationModel, Trajectory};
use crate::qp::QpProblem;
use crate::subproblem::trust_bounds;
use nalgebra::{DMatrix, DVector};

/// One convex exploration subproblem plus the bookkeeping needed to map the
/// QP back onto trajectory space.
#[derive(Debug, Clone)]
pub struct ExploreSubproblem {
    /// The convex QP handed to the subsolver.
    pub qp: QpProblem,
    /// Constant making `qp` objective values comparable to the true merit:
    /// `model_merit = objective + cost_offset` agrees with the true cost to
    /// first order at the expansion point.
    pub cost_offset: f64,
    state_dim: usize,
    control_dim: usize,
    horizon: usize,
}

/// Stack a trajectory into the exploration decision layout.
pub fn stack(traj: &Trajectory) -> DVector<f64> {
    let dx = traj.state_dim();
    let du = traj.control_dim();
    let t_max = traj.horizon();
    let mut z = DVector::zeros((t_max - 1) * (dx + du) + dx);
    for t in 0..t_max - 1 {
        let base = t * (dx + du);
        z.rows_mut(base, dx).copy_from(&traj.states[t]);
        z.rows_mut(base + dx, du).copy_from(&traj.controls[t]);
    }
    z.rows_mut((t_max - 1) * (dx + du), dx)
        .copy_from(&traj.states[t_max - 1]);
    z
}

/// Build the subproblem around `traj` with trust-region half-widths
/// `state_eps` / `control_eps`.
pub fn build<M: ExplorationModel>(
    model: &M,
    traj: &Trajectory,
    state_eps: f64,
    control_eps: f64,
) -> ExploreSubproblem {
    let dx = model.state_dim();
    let du = model.control_dim();
    let t_max = traj.horizon();
    let n = (t_max - 1) * (dx + du) + dx;

    let reference = stack(traj);
    let gradient = model.gradient(traj);
    let hessian = model
        .hessian_diag(traj)
        .map_or_else(|| DVector::zeros(n), |h| h.map(|v| v.max(0.0)));

    // Taylor model around the reference: with H the clamped diagonal and d
    // the gradient, the QP cost ½zᵀHz + (d - H∘z̄)ᵀz plus this constant
    // reproduces the true cost at z = z̄.
    let merit = model.cost(traj);
    let cost_offset = merit - gradient.dot(&reference)
        + 0.5 * hessian.dot(&reference.component_mul(&reference));
    let q = &gradient - hessian.component_mul(&reference);

    // Box bounds: trust region intersected with the physical limits.
    let bounds = model.bounds();
    let mut lower = DVector::zeros(n);
    let mut upper = DVector::zeros(n);
    for t in 0..t_max {
        let base = t * (dx + du);
        let (lo, hi) = trust_bounds(
            &traj.states[t],
            &bounds.state_lower,
            &bounds.state_upper,
            state_eps,
        );
        lower.rows_mut(base, dx).copy_from(&lo);
        upper.rows_mut(base, dx).copy_from(&hi);
        if t < t_max - 1 {
            let (lo, hi) = trust_bounds(
                &traj.controls[t],
                &bounds.control_lower,
                &bounds.control_upper,
                control_eps,
            );
            lower.rows_mut(base + dx, du).copy_from(&lo);
            upper.rows_mut(base + dx, du).copy_from(&hi);
        }
    }

    // Equality rows: pin x_0, then one linearized-dynamics block per step.
    let m = dx + (t_max - 1) * dx;
    let mut eq_mat = DMatrix::zeros(m, n);
    let mut eq_rhs = DVector::zeros(m);
    eq_mat
        .view_mut((0, 0), (dx, dx))
        .copy_from(&DMatrix::identity(dx, dx));
    eq_rhs.rows_mut(0, dx).copy_from(&traj.states[0]);
    for t in 0..t_max - 1 {
        let row = dx + t * dx;
        let base = t * (dx + du);
        let next = (t + 1) * (dx + du);
        let lin = model.linearize(&traj.states[t], &traj.controls[t]);
        eq_mat.view_mut((row, base), (dx, dx)).copy_from(&(-&lin.f_x));
        eq_mat
            .view_mut((row, base + dx), (dx, du))
            .copy_from(&(-&lin.f_u));
        eq_mat
            .view_mut((row, next), (dx, dx))
            .copy_from(&DMatrix::identity(dx, dx));
        eq_rhs.rows_mut(row, dx).copy_from(&lin.affine);
    }

    ExploreSubproblem {
        qp: QpProblem {
            hessian_diag: hessian,
            gradient: q,
            lower,
            upper,
            eq_mat,
            eq_rhs,
            warm_start: Some(reference),
        },
        cost_offset,
        state_dim: dx,
        control_dim: du,
        horizon: t_max,
    }
}

impl ExploreSubproblem {
    /// Merit predicted by the quadratic model for a QP objective value.
    pub fn model_merit(&self, qp_objective: f64) -> f64 {
        qp_objective + self.cost_offset
    }

    /// Recompute only the box bounds for new trust-region half-widths.
    ///
    /// After a rejected step the expansion point is unchanged, so the cost
    /// model and equality rows stay valid and only the box tightens.
    pub fn retighten<M: ExplorationModel>(
        &mut self,
        model: &M,
        traj: &Trajectory,
        state_eps: f64,
        control_eps: f64,
    ) {
        let (dx, du) = (self.state_dim, self.control_dim);
        let bounds = model.bounds();
        for t in 0..self.horizon {
            let base = t * (dx + du);
            let (lo, hi) = trust_bounds(
                &traj.states[t],
                &bounds.state_lower,
                &bounds.state_upper,
                state_eps,
            );
            self.qp.lower.rows_mut(base, dx).copy_from(&lo);
            self.qp.upper.rows_mut(base, dx).copy_from(&hi);
            if t < self.horizon - 1 {
                let (lo, hi) = trust_bounds(
                    &traj.controls[t],
                    &bounds.control_lower,
                    &bounds.control_upper,
                    control_eps,
                );
                self.qp.lower.rows_mut(base + dx, du).copy_from(&lo);
                self.qp.upper.rows_mut(base + dx, du).copy_from(&hi);
            }
        }
    }

    /// Unstack a QP primal point into a candidate trajectory.
    pub fn extract(&self, primal: &DVector<f64>) -> Trajectory {
        let (dx, du) = (self.state_dim, self.control_dim);
        let mut states = Vec::with_capacity(self.horizon);
        let mut controls = Vec::with_capacity(self.horizon - 1);
        for t in 0..self.horizon - 1 {
            let base = t * (dx + du);
            states.push(primal.rows(base, dx).into_owned());
            controls.push(primal.rows(base + dx, du).into_owned());
        }
        states.push(
            primal
                .rows((self.horizon - 1) * (dx + du), dx)
                .into_owned(),
        );
        Trajectory::new(states, controls)
    }
}
