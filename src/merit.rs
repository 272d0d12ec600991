//! Merit evaluation for the belief-space penalty variant.
//!
//! The penalty merit is the true trajectory cost plus an L1 measure of how
//! far the trajectory is from satisfying the nonlinear belief dynamics,
//! scaled by the current penalty coefficient. All three functions here are
//! pure: same trajectory in, bit-identical value out, no caching and no
//! mutation.

use crate::core::{BeliefModel, Trajectory};

/// True trajectory cost with the penalty term excluded: the sum of per-step
/// costs over all `(b_t, u_t)` pairs plus the final-step cost.
pub fn belief_cost<M: BeliefModel>(model: &M, traj: &Trajectory) -> f64 {
    let mut cost = 0.0;
    for (b, u) in traj.states.iter().zip(&traj.controls) {
        cost += model.stage_cost(b, u);
    }
    cost + model.terminal_cost(&traj.states[traj.states.len() - 1])
}

/// Total L1 dynamics violation: `Σ_t |b_{t+1} - dynamics(b_t, u_t)|₁`.
///
/// Zero exactly when the trajectory is a rollout of its own controls.
pub fn constraint_violation<M: BeliefModel>(model: &M, traj: &Trajectory) -> f64 {
    let mut violation = 0.0;
    for (t, u) in traj.controls.iter().enumerate() {
        let predicted = model.dynamics(&traj.states[t], u);
        violation += (&traj.states[t + 1] - predicted).abs().sum();
    }
    violation
}

/// Penalty merit: [`belief_cost`] plus `penalty_coeff` times
/// [`constraint_violation`].
pub fn belief_merit<M: BeliefModel>(model: &M, traj: &Trajectory, penalty_coeff: f64) -> f64 {
    belief_cost(model, traj) + penalty_coeff * constraint_violation(model, traj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Bounds, Linearization, Trajectory};
    use nalgebra::{dvector, DMatrix, DVector};

    /// Scalar integrator belief with unit weights.
    struct Integrator;

    impl BeliefModel for Integrator {
        fn state_dim(&self) -> usize {
            1
        }
        fn control_dim(&self) -> usize {
            1
        }
        fn dynamics(&self, b: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
            b + u
        }
        fn linearize(&self, _b: &DVector<f64>, _u: &DVector<f64>) -> Linearization {
            Linearization::linear(DMatrix::identity(1, 1), DMatrix::identity(1, 1))
        }
        fn stage_weights(&self) -> (DVector<f64>, DVector<f64>) {
            (dvector![1.0], dvector![1.0])
        }
        fn terminal_weights(&self) -> DVector<f64> {
            dvector![1.0]
        }
        fn bounds(&self) -> Bounds {
            Bounds::unbounded(1, 1)
        }
    }

    fn consistent_traj() -> Trajectory {
        Trajectory::rollout(dvector![1.0], vec![dvector![0.5], dvector![-1.0]], |b, u| {
            Integrator.dynamics(b, u)
        })
    }

    #[test]
    fn test_violation_is_zero_on_rollout() {
        assert_eq!(constraint_violation(&Integrator, &consistent_traj()), 0.0);
    }

    #[test]
    fn test_violation_sums_absolute_residuals() {
        let mut traj = consistent_traj();
        traj.states[1][0] += 0.25;
        traj.states[2][0] -= 0.5;
        // |b_1 - (b_0 + u_0)| = 0.25, |b_2 - (b_1 + u_1)| = |-0.5 - 0.25| = 0.75
        assert_eq!(constraint_violation(&Integrator, &traj), 1.0);
    }

    #[test]
    fn test_belief_cost_excludes_penalty() {
        let traj = consistent_traj();
        // states 1, 1.5, 0.5; controls 0.5, -1
        // stage: 1 + 0.25 + 2.25 + 1 = 4.5; terminal: 0.25
        assert_eq!(belief_cost(&Integrator, &traj), 4.75);
        assert_eq!(
            belief_merit(&Integrator, &traj, 100.0),
            belief_cost(&Integrator, &traj)
        );
    }

    #[test]
    fn test_merit_scales_with_penalty() {
        let mut traj = consistent_traj();
        traj.states[2][0] += 2.0;
        let cost = belief_cost(&Integrator, &traj);
        assert_eq!(belief_merit(&Integrator, &traj, 5.0), cost + 10.0);
        assert_eq!(belief_merit(&Integrator, &traj, 25.0), cost + 50.0);
    }

    #[test]
    fn test_merit_is_idempotent() {
        let traj = {
            let mut t = consistent_traj();
            t.states[1][0] = 0.123456789;
            t
        };
        let first = belief_merit(&Integrator, &traj, 5.0);
        for _ in 0..10 {
            assert_eq!(belief_merit(&Integrator, &traj, 5.0), first);
        }
    }
}
