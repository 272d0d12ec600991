//! Convex subproblem builders.
//!
//! Each outer SCP iteration turns the nonlinear planning problem into one
//! convex QP by linearizing the dynamics around the reference trajectory and
//! intersecting the physical bounds with a box trust region. The two
//! variants differ in their stacked decision layout:
//!
//! ```text
//! exploration, per timestep t < T-1:   [x_t, u_t]            then x_{T-1}
//! belief,      per timestep t < T-1:   [b_t, u_t, s+_t, s-_t] then b_{T-1}
//! ```
//!
//! where `s+` and `s-` are the non-negative slack pair absorbing the
//! linearized dynamics residual of the penalty variant.
//!
//! The builders are pure data transformations: identical inputs produce
//! identical [`QpProblem`](crate::qp::QpProblem)s, and nothing here mutates
//! the reference trajectory.

pub mod belief;
pub mod explore;

pub use belief::BeliefSubproblem;
pub use explore::ExploreSubproblem;

use nalgebra::DVector;

/// Intersect a trust-region box of half-width `eps` around `reference` with
/// the global bounds. The trust region only ever tightens the physical
/// limits.
pub(crate) fn trust_bounds(
    reference: &DVector<f64>,
    global_lower: &DVector<f64>,
    global_upper: &DVector<f64>,
    eps: f64,
) -> (DVector<f64>, DVector<f64>) {
    let lower = reference.zip_map(global_lower, |r, g| (r - eps).max(g));
    let upper = reference.zip_map(global_upper, |r, g| (r + eps).min(g));
    (lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    #[test]
    fn test_trust_bounds_tighten_only() {
        let reference = dvector![0.0, 5.0];
        let global_lower = dvector![-1.0, f64::NEG_INFINITY];
        let global_upper = dvector![1.0, 5.2];
        let (lower, upper) = trust_bounds(&reference, &global_lower, &global_upper, 0.5);
        // First entry: trust box inside global bounds.
        assert_eq!(lower[0], -0.5);
        assert_eq!(upper[0], 0.5);
        // Second entry: global upper bound is the tighter one.
        assert_eq!(lower[1], 4.5);
        assert_eq!(upper[1], 5.2);
    }

    #[test]
    fn test_trust_bounds_contain_reference() {
        let reference = dvector![0.3, -2.0];
        let (lower, upper) = trust_bounds(
            &reference,
            &dvector![f64::NEG_INFINITY, -10.0],
            &dvector![f64::INFINITY, 10.0],
            1.0,
        );
        for i in 0..2 {
            assert!(lower[i] <= reference[i] && reference[i] <= upper[i]);
        }
    }
}
