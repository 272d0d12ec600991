//! Penalty subproblem builder for the belief variant.
//!
//! The belief cost is an exact diagonal quadratic, so the QP cost block
//! reproduces it with no offset constant. The nonlinear belief dynamics are
//! softened: each linearized-dynamics residual component gets a pair of
//! non-negative slack variables whose sum is charged linearly at the current
//! penalty coefficient, which makes the QP objective equal to the penalty
//! merit of the candidate under the linearized dynamics.

use crate::core::{BeliefModel, Trajectory};
use crate::qp::QpProblem;
use crate::subproblem::trust_bounds;
use nalgebra::{DMatrix, DVector};

/// One convex penalty subproblem plus the layout bookkeeping needed to map
/// the QP back onto trajectory space.
#[derive(Debug, Clone)]
pub struct BeliefSubproblem {
    /// The convex QP handed to the subsolver.
    pub qp: QpProblem,
    state_dim: usize,
    control_dim: usize,
    horizon: usize,
}

/// Per-timestep block size: belief, control, and the two slack vectors.
fn block(dx: usize, du: usize) -> usize {
    dx + du + 2 * dx
}

/// Build the subproblem around `traj` at the given penalty coefficient and
/// trust-region half-widths.
pub fn build<M: BeliefModel>(
    model: &M,
    traj: &Trajectory,
    penalty_coeff: f64,
    state_eps: f64,
    control_eps: f64,
) -> BeliefSubproblem {
    let dx = model.state_dim();
    let du = model.control_dim();
    let t_max = traj.horizon();
    let bs = block(dx, du);
    let n = (t_max - 1) * bs + dx;

    // Cost: ½zᵀdiag(H)z with H = 2w reproduces w·z² exactly; slacks carry
    // the linear penalty instead.
    let (w_b, w_u) = model.stage_weights();
    let w_terminal = model.terminal_weights();
    let mut hessian = DVector::zeros(n);
    let mut gradient = DVector::zeros(n);
    for t in 0..t_max - 1 {
        let base = t * bs;
        hessian.rows_mut(base, dx).copy_from(&(2.0 * &w_b));
        hessian.rows_mut(base + dx, du).copy_from(&(2.0 * &w_u));
        gradient
            .rows_mut(base + dx + du, 2 * dx)
            .fill(penalty_coeff);
    }
    hessian
        .rows_mut((t_max - 1) * bs, dx)
        .copy_from(&(2.0 * &w_terminal));

    // Box bounds: trust region on beliefs and controls, `[0, inf)` slacks.
    let bounds = model.bounds();
    let mut lower = DVector::zeros(n);
    let mut upper = DVector::from_element(n, f64::INFINITY);
    for t in 0..t_max {
        let base = t * bs;
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

    // Equality rows: pin b_0, then per step
    // `b_{t+1} - F b_t - G u_t - s+_t + s-_t = h_t`. The warm start splits
    // the current dynamics residual across the slack pair so the reference
    // point is always feasible.
    let m = dx + (t_max - 1) * dx;
    let mut eq_mat = DMatrix::zeros(m, n);
    let mut eq_rhs = DVector::zeros(m);
    let mut warm = DVector::zeros(n);
    eq_mat
        .view_mut((0, 0), (dx, dx))
        .copy_from(&DMatrix::identity(dx, dx));
    eq_rhs.rows_mut(0, dx).copy_from(&traj.states[0]);
    for t in 0..t_max - 1 {
        let row = dx + t * dx;
        let base = t * bs;
        let next = (t + 1) * bs;
        let lin = model.linearize(&traj.states[t], &traj.controls[t]);
        eq_mat.view_mut((row, base), (dx, dx)).copy_from(&(-&lin.f_x));
        eq_mat
            .view_mut((row, base + dx), (dx, du))
            .copy_from(&(-&lin.f_u));
        for i in 0..dx {
            eq_mat[(row + i, base + dx + du + i)] = -1.0;
            eq_mat[(row + i, base + dx + du + dx + i)] = 1.0;
        }
        eq_mat
            .view_mut((row, next), (dx, dx))
            .copy_from(&DMatrix::identity(dx, dx));
        eq_rhs.rows_mut(row, dx).copy_from(&lin.affine);

        warm.rows_mut(base, dx).copy_from(&traj.states[t]);
        warm.rows_mut(base + dx, du).copy_from(&traj.controls[t]);
        let residual =
            &traj.states[t + 1] - model.dynamics(&traj.states[t], &traj.controls[t]);
        warm.rows_mut(base + dx + du, dx)
            .copy_from(&residual.map(|r| r.max(0.0)));
        warm.rows_mut(base + dx + du + dx, dx)
            .copy_from(&residual.map(|r| (-r).max(0.0)));
    }
    warm.rows_mut((t_max - 1) * bs, dx)
        .copy_from(&traj.states[t_max - 1]);

    BeliefSubproblem {
        qp: QpProblem {
            hessian_diag: hessian,
            gradient,
            lower,
            upper,
            eq_mat,
            eq_rhs,
            warm_start: Some(warm),
        },
        state_dim: dx,
        control_dim: du,
        horizon: t_max,
    }
}

impl BeliefSubproblem {
    /// Merit predicted by the quadratic model for a QP objective value.
    ///
    /// The cost block is exact, so the objective itself is the model merit.
    pub fn model_merit(&self, qp_objective: f64) -> f64 {
        qp_objective
    }

    /// Recompute only the box bounds for new trust-region half-widths.
    ///
    /// After a rejected step the expansion point is unchanged, so the cost
    /// model, slack layout, and equality rows stay valid and only the box
    /// tightens. Slack bounds are untouched.
    pub fn retighten<M: BeliefModel>(
        &mut self,
        model: &M,
        traj: &Trajectory,
        state_eps: f64,
        control_eps: f64,
    ) {
        let (dx, du) = (self.state_dim, self.control_dim);
        let bs = block(dx, du);
        let bounds = model.bounds();
        for t in 0..self.horizon {
            let base = t * bs;
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

    /// Unstack a QP primal point into a candidate trajectory, dropping the
    /// slack entries.
    pub fn extract(&self, primal: &DVector<f64>) -> Trajectory {
        let (dx, du) = (self.state_dim, self.control_dim);
        let bs = block(dx, du);
        let mut states = Vec::with_capacity(self.horizon);
        let mut controls = Vec::with_capacity(self.horizon - 1);
        for t in 0..self.horizon - 1 {
            let base = t * bs;
            states.push(primal.rows(base, dx).into_owned());
            controls.push(primal.rows(base + dx, du).into_owned());
        }
        states.push(primal.rows((self.horizon - 1) * bs, dx).into_owned());
        Trajectory::new(states, controls)
    }
}
