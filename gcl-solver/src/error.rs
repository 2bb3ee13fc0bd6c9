/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Failures a solver backend can report instead of a verdict.
//!
//! An unsatisfiable problem is **not** an error: it is the
//! [`Verdict::Unsat`](crate::Verdict::Unsat) answer.  These variants cover the
//! cases where no answer could be produced at all.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// The deadline in [`SolveControl`](crate::SolveControl) passed before a
    /// verdict was reached.
    #[error("solver timed out after {elapsed_ms} ms ({nodes} search nodes explored)")]
    Timeout { elapsed_ms: u128, nodes: usize },

    /// The cancellation token was raised by the caller.
    #[error("solve was cancelled after {nodes} search nodes")]
    Cancelled { nodes: usize },

    /// The configured node budget was exhausted.
    #[error("search node limit {limit} reached without a verdict")]
    NodeLimit { limit: usize },

    /// A formula referenced a variable the problem never declared.
    #[error("formula references undeclared variable index {index} (problem has {declared})")]
    UnknownVariable { index: usize, declared: usize },

    /// The LP kernel failed to converge (iteration cap hit).
    #[error("LP relaxation did not converge: {0}")]
    Numerical(String),
}
