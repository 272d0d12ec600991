//! Trajectory and bound types shared by both planner variants.
//!
//! A [`Trajectory`] is the quantity being optimized: `T` state (or belief)
//! vectors and `T - 1` control vectors. The planners receive it by mutable
//! reference and overwrite it only when an iteration is accepted; the first
//! state is the caller-supplied initial condition and is never modified.

use crate::core::CoreError;
use nalgebra::DVector;

/// Ordered state and control sequences over a fixed planning horizon.
///
/// Invariants (checked by [`Trajectory::validate`]):
/// - `states.len() >= 2` and `controls.len() == states.len() - 1`
/// - all states share one dimension, all controls share one dimension
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    /// State (or belief) vectors `x_0 .. x_{T-1}`.
    pub states: Vec<DVector<f64>>,
    /// Control vectors `u_0 .. u_{T-2}`.
    pub controls: Vec<DVector<f64>>,
}

impl Trajectory {
    /// Create a trajectory from explicit state and control sequences.
    pub fn new(states: Vec<DVector<f64>>, controls: Vec<DVector<f64>>) -> Self {
        Self { states, controls }
    }

    /// Create a trajectory by propagating `controls` from `initial_state`
    /// through `dynamics`.
    ///
    /// This is the standard way to seed the planners with a
    /// dynamically-consistent initial guess.
    pub fn rollout<F>(initial_state: DVector<f64>, controls: Vec<DVector<f64>>, dynamics: F) -> Self
    where
        F: Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64>,
    {
        let mut states = Vec::with_capacity(controls.len() + 1);
        states.push(initial_state);
        for u in &controls {
            let next = dynamics(&states[states.len() - 1], u);
            states.push(next);
        }
        Self { states, controls }
    }

    /// Number of timesteps `T` (state count).
    pub fn horizon(&self) -> usize {
        self.states.len()
    }

    /// State dimension `D_x`.
    pub fn state_dim(&self) -> usize {
        self.states.first().map_or(0, DVector::len)
    }

    /// Control dimension `D_u`.
    pub fn control_dim(&self) -> usize {
        self.controls.first().map_or(0, DVector::len)
    }

    /// Check the structural invariants against the expected dimensions.
    pub fn validate(&self, state_dim: usize, control_dim: usize) -> Result<(), CoreError> {
        if self.states.len() < 2 {
            return Err(CoreError::Trajectory(format!(
                "horizon must be at least 2, got {}",
                self.states.len()
            )));
        }
        if self.controls.len() + 1 != self.states.len() {
            return Err(CoreError::Trajectory(format!(
                "expected {} controls for {} states, got {}",
                self.states.len() - 1,
                self.states.len(),
                self.controls.len()
            )));
        }
        for (t, x) in self.states.iter().enumerate() {
            if x.len() != state_dim {
                return Err(CoreError::Dimension {
                    expected: state_dim,
                    actual: x.len(),
                    context: format!("state at timestep {t}"),
                });
            }
        }
        for (t, u) in self.controls.iter().enumerate() {
            if u.len() != control_dim {
                return Err(CoreError::Dimension {
                    expected: control_dim,
                    actual: u.len(),
                    context: format!("control at timestep {t}"),
                });
            }
        }
        Ok(())
    }
}

/// Global physical limits on states and controls.
///
/// These are hard per-step clamps: the trust region only ever tightens them,
/// never relaxes them. Entries may be `±f64::INFINITY` for unbounded
/// components (e.g. belief covariance entries).
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub state_lower: DVector<f64>,
    pub state_upper: DVector<f64>,
    pub control_lower: DVector<f64>,
    pub control_upper: DVector<f64>,
}

impl Bounds {
    /// Fully unbounded states and controls of the given dimensions.
    pub fn unbounded(state_dim: usize, control_dim: usize) -> Self {
        Self {
            state_lower: DVector::from_element(state_dim, f64::NEG_INFINITY),
            state_upper: DVector::from_element(state_dim, f64::INFINITY),
            control_lower: DVector::from_element(control_dim, f64::NEG_INFINITY),
            control_upper: DVector::from_element(control_dim, f64::INFINITY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    #[test]
    fn test_rollout_propagates_dynamics() {
        let controls = vec![dvector![1.0], dvector![2.0]];
        let traj = Trajectory::rollout(dvector![0.0], controls, |x, u| x + u);

        assert_eq!(traj.horizon(), 3);
        assert_eq!(traj.states[0], dvector![0.0]);
        assert_eq!(traj.states[1], dvector![1.0]);
        assert_eq!(traj.states[2], dvector![3.0]);
    }

    #[test]
    fn test_validate_accepts_consistent_trajectory() {
        let traj = Trajectory::new(
            vec![dvector![0.0, 0.0], dvector![1.0, 1.0]],
            vec![dvector![0.5]],
        );
        assert!(traj.validate(2, 1).is_ok());
    }

    #[test]
    fn test_validate_rejects_short_horizon() {
        let traj = Trajectory::new(vec![dvector![0.0]], vec![]);
        assert!(matches!(traj.validate(1, 1), Err(CoreError::Trajectory(_))));
    }

    #[test]
    fn test_validate_rejects_control_count_mismatch() {
        let traj = Trajectory::new(
            vec![dvector![0.0], dvector![1.0], dvector![2.0]],
            vec![dvector![0.5]],
        );
        assert!(traj.validate(1, 1).is_err());
    }

    #[test]
    fn test_validate_rejects_dimension_mismatch() {
        let traj = Trajectory::new(
            vec![dvector![0.0, 0.0], dvector![1.0, 1.0]],
            vec![dvector![0.5]],
        );
        let err = traj.validate(2, 2).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Dimension {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }
}
