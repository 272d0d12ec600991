//! Problem model interfaces.
//!
//! The planners are generic over the domain physics: a model supplies
//! dynamics evaluation, its linearization, cost information, and variable
//! bounds. Everything else (finite differencing, environment maps,
//! kinematics) lives behind these traits.

use crate::core::trajectory::{Bounds, Trajectory};
use nalgebra::{DMatrix, DVector};

/// First-order expansion of the dynamics around one trajectory point:
/// `next ≈ f_x * state + f_u * control + affine`.
///
/// Valid only in the trust-region neighborhood of the expansion point;
/// the planners recompute it once per outer iteration and discard it after
/// any trajectory update.
#[derive(Debug, Clone, PartialEq)]
pub struct Linearization {
    /// Jacobian of the dynamics with respect to the state, `D_x x D_x`.
    pub f_x: DMatrix<f64>,
    /// Jacobian of the dynamics with respect to the control, `D_x x D_u`.
    pub f_u: DMatrix<f64>,
    /// Affine residual `h = dynamics(x̄, ū) - f_x x̄ - f_u ū`.
    pub affine: DVector<f64>,
}

impl Linearization {
    /// Exact linearization of affine dynamics `next = f_x x + f_u u`.
    pub fn linear(f_x: DMatrix<f64>, f_u: DMatrix<f64>) -> Self {
        let rows = f_x.nrows();
        Self {
            f_x,
            f_u,
            affine: DVector::zeros(rows),
        }
    }

    /// Evaluate the affine model at a point.
    pub fn predict(&self, state: &DVector<f64>, control: &DVector<f64>) -> DVector<f64> {
        &self.f_x * state + &self.f_u * control + &self.affine
    }
}

/// Model interface for the simple trust-region variant.
///
/// The cost is an arbitrary nonlinear functional over the whole trajectory
/// (typically an information or entropy measure); the model exposes it as a
/// value, a gradient, and an optional diagonal Hessian approximation, all in
/// the stacked layout `[x_0, u_0, x_1, u_1, .., x_{T-1}]`.
pub trait ExplorationModel {
    /// State dimension `D_x`.
    fn state_dim(&self) -> usize;

    /// Control dimension `D_u`.
    fn control_dim(&self) -> usize;

    /// True nonlinear trajectory cost.
    fn cost(&self, traj: &Trajectory) -> f64;

    /// Gradient of [`ExplorationModel::cost`] in the stacked layout.
    fn gradient(&self, traj: &Trajectory) -> DVector<f64>;

    /// Diagonal Hessian approximation in the stacked layout, or `None` to
    /// fall back to a zero quadratic term.
    ///
    /// Negative entries are clamped to zero by the subproblem builder so the
    /// local model stays convex.
    fn hessian_diag(&self, _traj: &Trajectory) -> Option<DVector<f64>> {
        None
    }

    /// Evaluate the dynamics at one timestep.
    fn dynamics(&self, state: &DVector<f64>, control: &DVector<f64>) -> DVector<f64>;

    /// Linearize the dynamics around one timestep.
    fn linearize(&self, state: &DVector<f64>, control: &DVector<f64>) -> Linearization;

    /// Global physical limits.
    fn bounds(&self) -> Bounds;
}

/// Model interface for the belief-space penalty variant.
///
/// The true cost is a diagonal quadratic in the belief and control entries
/// (covariance and control-effort terms), so the model supplies the diagonal
/// weights directly and the subproblem reproduces the cost exactly. The
/// nonlinearity lives entirely in the belief dynamics, which the planner
/// treats as a soft constraint.
pub trait BeliefModel {
    /// Belief dimension `D_x` (mean plus stacked sqrt-covariance entries in
    /// the usual belief parameterization).
    fn state_dim(&self) -> usize;

    /// Control dimension `D_u`.
    fn control_dim(&self) -> usize;

    /// Propagate the belief through one timestep.
    fn dynamics(&self, belief: &DVector<f64>, control: &DVector<f64>) -> DVector<f64>;

    /// Linearize the belief dynamics around one timestep.
    fn linearize(&self, belief: &DVector<f64>, control: &DVector<f64>) -> Linearization;

    /// Diagonal quadratic weights `(w_b, w_u)` of the per-step cost
    /// `w_b · b² + w_u · u²`.
    fn stage_weights(&self) -> (DVector<f64>, DVector<f64>);

    /// Diagonal quadratic weights of the final-step cost `w_T · b²`.
    fn terminal_weights(&self) -> DVector<f64>;

    /// Per-step cost. The default evaluates the diagonal quadratic defined
    /// by [`BeliefModel::stage_weights`].
    fn stage_cost(&self, belief: &DVector<f64>, control: &DVector<f64>) -> f64 {
        let (w_b, w_u) = self.stage_weights();
        w_b.dot(&belief.component_mul(belief)) + w_u.dot(&control.component_mul(control))
    }

    /// Final-step cost. The default evaluates the diagonal quadratic defined
    /// by [`BeliefModel::terminal_weights`].
    fn terminal_cost(&self, belief: &DVector<f64>) -> f64 {
        self.terminal_weights().dot(&belief.component_mul(belief))
    }

    /// Global physical limits.
    fn bounds(&self) -> Bounds;
}
