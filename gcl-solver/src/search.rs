/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Built-in backend: LP relaxation with lazy disjunctive branching.
//!
//! Every asserted formula is flattened into hard atoms (the conjunctive
//! part) and clauses (its disjunctions).  A search node is the set of hard
//! atoms plus the atoms of the disjuncts chosen on the way down.  At each
//! node the LP over the hard atoms is solved; if its optimum already
//! satisfies every clause and every integer variable is integral the node is
//! a model.  Otherwise the search branches on the first violated clause (one
//! child per disjunct) or, failing that, on the first fractional integer
//! variable (`x ≤ ⌊v⌋` / `x ≥ ⌈v⌉`).
//!
//! Clauses are only branched on when the current LP point violates them, so
//! constraints that the objective already satisfies (for instance exclusion
//! between slots that collapsed to zero length) never grow the tree.
//!
//! | Property | Value |
//! |---|---|
//! | Soundness | every returned model satisfies all formulas within `tolerance` |
//! | Completeness | exhaustive depth-first search; `Unsat` only after the tree is closed |
//! | Determinism | children are explored in disjunct order, clauses in assertion order |

use tracing::{debug, trace};

use crate::error::SolverError;
use crate::expr::{Atom, Cmp, Formula, LinExpr, VarKind, DEFAULT_TOLERANCE};
use crate::problem::{Model, Problem, SolveStats};
use crate::simplex::{self, LinearRow, LpOutcome};
use crate::solver::{SolveControl, Solver, Verdict};

/// Default cap on explored search nodes.
pub const DEFAULT_NODE_LIMIT: usize = 200_000;

/// Default cap on simplex pivots per LP.
pub const DEFAULT_LP_ITERATION_LIMIT: usize = 100_000;

// ── Flattening ────────────────────────────────────────────────────────────────

/// Hard atoms and open clauses contributed by one formula.
#[derive(Debug, Clone, Default)]
struct Flat {
    atoms: Vec<Atom>,
    clauses: Vec<Vec<Formula>>,
}

impl Flat {
    /// Add `formula`; returns `false` when a conjunct is `False`.
    fn push(&mut self, formula: &Formula) -> bool {
        match formula {
            Formula::True => true,
            Formula::False => false,
            Formula::Atom(a) => {
                self.atoms.push(a.clone());
                true
            }
            Formula::And(parts) => parts.iter().all(|p| self.push(p)),
            Formula::Or(parts) => {
                self.clauses.push(parts.clone());
                true
            }
        }
    }
}

// ── Search node ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Node {
    atoms: Vec<Atom>,
    clauses: Vec<Vec<Formula>>,
    depth: usize,
}

impl Node {
    fn child(&self, extra: Flat) -> Node {
        let mut atoms = self.atoms.clone();
        atoms.extend(extra.atoms);
        let mut clauses = self.clauses.clone();
        clauses.extend(extra.clauses);
        Node {
            atoms,
            clauses,
            depth: self.depth + 1,
        }
    }
}

fn to_row(atom: &Atom) -> LinearRow {
    LinearRow {
        coeffs: atom.expr.terms().iter().map(|(v, c)| (v.index(), *c)).collect(),
        cmp: atom.cmp,
        rhs: -atom.expr.constant_part(),
    }
}

fn clause_holds(clause: &[Formula], x: &[f64], tolerance: f64) -> bool {
    clause.iter().any(|d| d.holds(x, tolerance))
}

// ── BranchingSolver ───────────────────────────────────────────────────────────

/// Pure-Rust [`Solver`] backend.
#[derive(Debug, Clone)]
pub struct BranchingSolver {
    node_limit: usize,
    lp_iteration_limit: usize,
    tolerance: f64,
}

impl BranchingSolver {
    pub fn new() -> Self {
        Self {
            node_limit: DEFAULT_NODE_LIMIT,
            lp_iteration_limit: DEFAULT_LP_ITERATION_LIMIT,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_node_limit(mut self, limit: usize) -> Self {
        self.node_limit = limit;
        self
    }

    pub fn with_lp_iteration_limit(mut self, limit: usize) -> Self {
        self.lp_iteration_limit = limit;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn check_vars(problem: &Problem) -> Result<(), SolverError> {
        let declared = problem.var_count();
        fn max_in(f: &Formula) -> Option<usize> {
            match f {
                Formula::True | Formula::False => None,
                Formula::Atom(a) => a.expr.max_var().map(|v| v.index()),
                Formula::And(p) | Formula::Or(p) => p.iter().filter_map(max_in).max(),
            }
        }
        let objective_max = problem
            .objective()
            .and_then(LinExpr::max_var)
            .map(|v| v.index());
        let max = problem
            .constraints()
            .iter()
            .filter_map(|c| max_in(&c.formula))
            .chain(objective_max)
            .max();
        match max {
            Some(index) if index >= declared => Err(SolverError::UnknownVariable { index, declared }),
            _ => Ok(()),
        }
    }

    fn first_fractional(&self, problem: &Problem, x: &[f64]) -> Option<(usize, f64)> {
        problem
            .vars()
            .iter()
            .enumerate()
            .filter(|(_, d)| d.kind == VarKind::Integer)
            .map(|(i, _)| (i, x[i]))
            .find(|(_, v)| (v - v.round()).abs() > self.tolerance)
    }
}

impl Default for BranchingSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for BranchingSolver {
    fn name(&self) -> &str {
        "branching-lp"
    }

    fn submit(&self, problem: &Problem, control: &SolveControl) -> Result<Verdict, SolverError> {
        Self::check_vars(problem)?;

        let n = problem.var_count();
        let mut root = Flat::default();
        for c in problem.constraints() {
            if !root.push(&c.formula) {
                debug!(group = c.group, "constraint folded to false, problem is unsatisfiable");
                return Ok(Verdict::Unsat);
            }
        }
        let base_rows: Vec<LinearRow> = root.atoms.iter().map(to_row).collect();
        let root_clauses = root.clauses;
        let objective: Option<Vec<(usize, f64)>> = problem
            .objective()
            .map(|o| o.terms().iter().map(|(v, c)| (v.index(), *c)).collect());

        debug!(
            vars = n,
            hard_atoms = base_rows.len(),
            clauses = root_clauses.len(),
            "branching search started"
        );

        let mut stats = SolveStats::default();
        let mut stack = vec![Node::default()];

        while let Some(node) = stack.pop() {
            control.check(stats.nodes)?;
            stats.nodes += 1;
            if stats.nodes > self.node_limit {
                return Err(SolverError::NodeLimit {
                    limit: self.node_limit,
                });
            }

            let mut rows = base_rows.clone();
            rows.extend(node.atoms.iter().map(to_row));
            let (outcome, _pivots) =
                simplex::solve(n, &rows, objective.as_deref(), self.lp_iteration_limit)?;
            stats.lp_solves += 1;

            let x = match outcome {
                LpOutcome::Infeasible => {
                    trace!(depth = node.depth, "node infeasible");
                    continue;
                }
                LpOutcome::Feasible(x) => x,
            };

            let violated = root_clauses
                .iter()
                .chain(node.clauses.iter())
                .find(|c| !clause_holds(c, &x, self.tolerance));

            if let Some(clause) = violated {
                stats.branches += 1;
                trace!(depth = node.depth, options = clause.len(), "branching on clause");
                // Push in reverse so the first disjunct is explored first.
                for disjunct in clause.iter().rev() {
                    let mut extra = Flat::default();
                    if extra.push(disjunct) {
                        stack.push(node.child(extra));
                    }
                }
                continue;
            }

            if let Some((var, value)) = self.first_fractional(problem, &x) {
                stats.branches += 1;
                trace!(depth = node.depth, var, value, "branching on fractional integer");
                let v = crate::expr::VarId(var);
                let up = Atom {
                    expr: LinExpr::var(v) - value.ceil(),
                    cmp: Cmp::Ge,
                };
                let down = Atom {
                    expr: LinExpr::var(v) - value.floor(),
                    cmp: Cmp::Le,
                };
                stack.push(node.child(Flat {
                    atoms: vec![up],
                    clauses: vec![],
                }));
                stack.push(node.child(Flat {
                    atoms: vec![down],
                    clauses: vec![],
                }));
                continue;
            }

            debug!(
                nodes = stats.nodes,
                lp_solves = stats.lp_solves,
                branches = stats.branches,
                depth = node.depth,
                "model found"
            );
            let mut values = x;
            for (i, d) in problem.vars().iter().enumerate() {
                if d.kind == VarKind::Integer {
                    values[i] = values[i].round();
                }
            }
            return Ok(Verdict::Sat(Model::new(values, stats)));
        }

        debug!(
            nodes = stats.nodes,
            lp_solves = stats.lp_solves,
            "search tree closed without a model"
        );
        Ok(Verdict::Unsat)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::solver::CancelToken;

    fn solve(problem: &Problem) -> Verdict {
        BranchingSolver::new()
            .submit(problem, &SolveControl::unbounded())
            .unwrap()
    }

    #[test]
    fn satisfies_plain_conjunction() {
        let mut p = Problem::new();
        let x = p.new_real("x");
        let y = p.new_real("y");
        p.assert("g", Formula::ge(LinExpr::var(x) + LinExpr::var(y), 10.0));
        p.assert("g", Formula::le(LinExpr::var(x), 3.0));
        p.minimize(LinExpr::var(x) + LinExpr::var(y));
        let m = solve(&p).into_model().unwrap();
        assert!(m.value(x) <= 3.0 + 1e-6);
        assert!((m.value(x) + m.value(y) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn picks_feasible_disjunct() {
        // Two transmissions of length 10 on one wire: a before b or b before a,
        // with a pinned to start at 0.
        let mut p = Problem::new();
        let a = p.new_real("a");
        let b = p.new_real("b");
        p.assert("pin", Formula::eq(LinExpr::var(a), 0.0));
        p.assert(
            "exclusion",
            Formula::or(vec![
                Formula::le(LinExpr::var(a) + 10.0, LinExpr::var(b)),
                Formula::le(LinExpr::var(b) + 10.0, LinExpr::var(a)),
            ]),
        );
        p.minimize(LinExpr::var(b));
        let m = solve(&p).into_model().unwrap();
        assert!((m.value(b) - 10.0).abs() < 1e-6, "b = {}", m.value(b));
    }

    #[test]
    fn reports_unsat_when_every_disjunct_fails() {
        let mut p = Problem::new();
        let x = p.new_real("x");
        p.assert("bound", Formula::le(LinExpr::var(x), 5.0));
        p.assert(
            "choice",
            Formula::or(vec![
                Formula::ge(LinExpr::var(x), 6.0),
                Formula::ge(LinExpr::var(x), 7.0),
            ]),
        );
        assert!(!solve(&p).is_sat());
    }

    #[test]
    fn constant_false_constraint_is_unsat_without_search() {
        let mut p = Problem::new();
        p.new_real("x");
        p.assert("g", Formula::le(2.0, 1.0));
        assert!(!solve(&p).is_sat());
    }

    #[test]
    fn integer_variables_are_integral() {
        let mut p = Problem::new();
        let k = p.new_int("k");
        p.assert("g", Formula::ge(LinExpr::term(k, 2.0), 3.0));
        p.minimize(LinExpr::var(k));
        let m = solve(&p).into_model().unwrap();
        assert_eq!(m.value(k), 2.0);
    }

    #[test]
    fn nested_disjunction_inside_disjunct() {
        // (x = 1 ∧ (y = 2 ∨ y = 3)) ∨ x = 5, with y ≥ 3
        let mut p = Problem::new();
        let x = p.new_real("x");
        let y = p.new_real("y");
        p.assert("g", Formula::ge(LinExpr::var(y), 3.0));
        p.assert(
            "g",
            Formula::or(vec![
                Formula::and(vec![
                    Formula::eq(LinExpr::var(x), 1.0),
                    Formula::or(vec![
                        Formula::eq(LinExpr::var(y), 2.0),
                        Formula::eq(LinExpr::var(y), 3.0),
                    ]),
                ]),
                Formula::eq(LinExpr::var(x), 5.0),
            ]),
        );
        let m = solve(&p).into_model().unwrap();
        assert!((m.value(x) - 1.0).abs() < 1e-6);
        assert!((m.value(y) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn undeclared_variable_is_rejected() {
        let mut p = Problem::new();
        p.assert("g", Formula::le(LinExpr::var(crate::expr::VarId(4)), 1.0));
        let err = BranchingSolver::new()
            .submit(&p, &SolveControl::unbounded())
            .unwrap_err();
        assert_eq!(err, SolverError::UnknownVariable { index: 4, declared: 0 });
    }

    #[test]
    fn cancelled_control_stops_search() {
        let mut p = Problem::new();
        let x = p.new_real("x");
        p.assert("g", Formula::le(LinExpr::var(x), 1.0));
        let token = CancelToken::new();
        token.cancel();
        let control = SolveControl::with_timeout(Duration::from_secs(5)).with_cancel(token);
        let err = BranchingSolver::new().submit(&p, &control).unwrap_err();
        assert!(matches!(err, SolverError::Cancelled { .. }));
    }

    #[test]
    fn node_limit_is_enforced() {
        // Forces at least one branch, so a limit of one node cannot finish.
        let mut p = Problem::new();
        let x = p.new_real("x");
        p.assert(
            "g",
            Formula::or(vec![
                Formula::ge(LinExpr::var(x), 6.0),
                Formula::ge(LinExpr::var(x), 7.0),
            ]),
        );
        let err = BranchingSolver::new()
            .with_node_limit(1)
            .submit(&p, &SolveControl::unbounded())
            .unwrap_err();
        assert_eq!(err, SolverError::NodeLimit { limit: 1 });
    }
}
