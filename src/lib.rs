//! # SCP Planner
//!
//! A Rust library for trust-region Sequential Convex Programming (SCP) over
//! robot trajectories, covering both deterministic exploration planning and
//! belief-space collocation with soft dynamics constraints.
//!
//! ## Features
//!
//! - **Two Planner Variants**: exploration (hard linearized dynamics) and
//!   belief-space (L1 penalty on dynamics violation with a scheduled
//!   penalty coefficient)
//! - **Box Trust Region**: per-component state/control boxes that shrink on
//!   rejected steps, expand on accepted steps, and never relax the physical
//!   limits
//! - **Pluggable QP Backend**: convex subproblems go through the
//!   [`qp::QpSolver`] trait; a dense operator-splitting reference solver is
//!   included
//! - **Model-Agnostic Core**: dynamics, costs, and bounds come in through
//!   the [`core::ExplorationModel`] and [`core::BeliefModel`] traits
//!
//! ## Quick Start
//!
//! ```ignore
//! use scp_planner::core::Trajectory;
//! use scp_planner::planner::{BeliefConfig, BeliefPlanner};
//!
//! let planner = BeliefPlanner::with_config(
//!     BeliefConfig::new()
//!         .with_max_iterations(50)
//!         .with_constraint_tolerance(1e-4),
//! );
//! let mut trajectory = Trajectory::rollout(b0, controls, |b, u| model.dynamics(b, u));
//! let summary = planner.plan(&model, &mut trajectory)?;
//! println!("{summary}");
//! ```

pub mod core;
pub mod error;
#[cfg(feature = "logging")]
pub mod logger;
pub mod merit;
pub mod planner;
pub mod qp;
pub mod subproblem;

// Re-export core types
pub use core::{BeliefModel, Bounds, ExplorationModel, Linearization, Trajectory};
pub use error::{PlannerError, PlannerResult};

#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
pub use planner::{
    BeliefConfig, BeliefPlanner, ExploreConfig, ExplorePlanner, PlanStatus, PlanSummary,
};
pub use qp::{AdmmConfig, AdmmSolver, QpProblem, QpSolution, QpSolver};
