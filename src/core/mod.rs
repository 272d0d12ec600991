//! Core data types: trajectories, bounds, and problem model interfaces.

pub mod problem;
pub mod trajectory;

pub use problem::{BeliefModel, ExplorationModel, Linearization};
pub use trajectory::{Bounds, Trajectory};

use thiserror::Error;

/// Errors in trajectory and problem construction.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Structurally invalid trajectory (horizon, state/control count)
    #[error("Invalid trajectory: {0}")]
    Trajectory(String),

    /// A vector or matrix has the wrong dimension for its role
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    Dimension {
        expected: usize,
        actual: usize,
        context: String,
    },
}
