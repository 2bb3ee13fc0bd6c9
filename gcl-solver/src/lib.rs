/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! gcl-solver – constraint IR and solver backends for GCL synthesis
//!
//! ```text
//! lib.rs
//! ├── expr      – linear expressions, atoms, boolean formulas
//! ├── problem   – variables + grouped constraints + objective, models
//! ├── solver    – the `Solver` trait, verdicts, deadline / cancellation
//! ├── simplex   – dense two-phase LP kernel (crate-private)
//! ├── search    – `BranchingSolver`, the built-in backend
//! └── error     – `SolverError`
//! ```
//!
//! The synthesis crate only talks to [`Solver`]; any engine able to decide
//! linear arithmetic with disjunctions can be plugged in behind it.

pub mod error;
pub mod expr;
pub mod problem;
pub mod search;
mod simplex;
pub mod solver;

pub use error::SolverError;
pub use expr::{Atom, Cmp, Formula, LinExpr, VarId, VarKind, DEFAULT_TOLERANCE};
pub use problem::{Constraint, Model, Problem, SolveStats, VarDecl};
pub use search::BranchingSolver;
pub use solver::{CancelToken, SolveControl, Solver, Verdict};
