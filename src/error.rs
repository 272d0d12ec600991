//! Error types for the scp-planner library
//!
//! This module provides the main error and result types used throughout the
//! library. All errors use the `thiserror` crate for automatic trait
//! implementations.
//!
//! # Error Hierarchy
//!
//! The library uses a hierarchical error system where:
//! - **`PlannerError`** is the top-level error exposed to users via public APIs
//! - **Module errors** (`CoreError`, `ScpError`, `QpError`) are wrapped inside PlannerError
//! - **Error sources** are preserved, allowing full error chain inspection
//!
//! Example error chain:
//! ```text
//! PlannerError::Subsolver(
//!     QpError::Unconverged {
//!         iterations: 50000,
//!         primal_residual: 1.3e-2,
//!         dual_residual: 8.1e-7,
//!     }
//! )
//! ```

use crate::{core::CoreError, planner::ScpError, qp::QpError};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the scp-planner library
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Main error type for the scp-planner library
///
/// This is the top-level error type exposed by public APIs. It wraps
/// module-specific errors while preserving the full error chain for
/// debugging.
///
/// # Error Chain Access
///
/// You can access the full error chain using the `chain()` method:
///
/// ```rust,ignore
/// if let Err(e) = planner.plan(&model, &mut trajectory) {
///     warn!("Error: {}", e);
///     warn!("Full chain: {}", e.chain());
/// }
/// ```
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Core errors (trajectory structure, model dimensions)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// SCP loop errors (convexification failure, invalid configuration)
    #[error(transparent)]
    Scp(#[from] ScpError),

    /// QP subsolver errors (infeasibility, numerical failure)
    #[error(transparent)]
    Subsolver(#[from] QpError),
}

impl PlannerError {
    /// Get the full error chain as a string for logging and debugging.
    ///
    /// Traverses the error source chain and returns a formatted string
    /// showing the hierarchy of errors from the top-level PlannerError down
    /// to the root cause.
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Get a compact single-line error chain for logging
    ///
    /// Similar to `chain()` but formats as a single line with arrow
    /// separators.
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}
