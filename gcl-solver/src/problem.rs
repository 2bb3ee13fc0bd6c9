/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Constraint sets and satisfying assignments.

use std::collections::BTreeSet;

use crate::expr::{Formula, LinExpr, VarId, VarKind};

// ── Problem ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub kind: VarKind,
}

/// One asserted formula together with the group it was emitted under.
///
/// Groups let a caller re-submit the same problem with a whole family of
/// constraints removed (see [`Problem::without_groups`]).
#[derive(Debug, Clone)]
pub struct Constraint {
    pub group: &'static str,
    pub formula: Formula,
}

/// A constraint set: declared variables, asserted formulas and an optional
/// objective to minimise.
///
/// The problem is plain data: it is `Send`, cloneable, and holds no solver
/// state, so it can be moved onto a worker thread for a blocking solve.
#[derive(Debug, Clone, Default)]
pub struct Problem {
    vars: Vec<VarDecl>,
    constraints: Vec<Constraint>,
    objective: Option<LinExpr>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_var(&mut self, name: impl Into<String>, kind: VarKind) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(VarDecl {
            name: name.into(),
            kind,
        });
        id
    }

    pub fn new_real(&mut self, name: impl Into<String>) -> VarId {
        self.new_var(name, VarKind::Real)
    }

    pub fn new_int(&mut self, name: impl Into<String>) -> VarId {
        self.new_var(name, VarKind::Integer)
    }

    /// Assert `formula` under `group`.  `True` is dropped on the spot.
    pub fn assert(&mut self, group: &'static str, formula: Formula) {
        if formula.is_true() {
            return;
        }
        self.constraints.push(Constraint { group, formula });
    }

    /// Minimise `expr` once every constraint is satisfied.
    ///
    /// The built-in backend requires the objective to be bounded below over
    /// the feasible region; non-negative weights on non-negative variables
    /// always are.
    pub fn minimize(&mut self, expr: LinExpr) {
        self.objective = Some(expr);
    }

    pub fn objective(&self) -> Option<&LinExpr> {
        self.objective.as_ref()
    }

    pub fn vars(&self) -> &[VarDecl] {
        &self.vars
    }

    pub fn var(&self, id: VarId) -> Option<&VarDecl> {
        self.vars.get(id.0)
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Distinct groups present, sorted.
    pub fn groups(&self) -> BTreeSet<&'static str> {
        self.constraints.iter().map(|c| c.group).collect()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.constraints.iter().any(|c| c.group == group)
    }

    /// `true` if some asserted formula folded to `False`.
    pub fn is_trivially_unsat(&self) -> bool {
        self.constraints.iter().any(|c| c.formula.is_false())
    }

    /// Copy of this problem with every constraint of the listed groups
    /// removed.  Variable handles stay valid.
    pub fn without_groups(&self, groups: &[&str]) -> Problem {
        Problem {
            vars: self.vars.clone(),
            constraints: self
                .constraints
                .iter()
                .filter(|c| !groups.contains(&c.group))
                .cloned()
                .collect(),
            objective: self.objective.clone(),
        }
    }
}

// ── Model ─────────────────────────────────────────────────────────────────────

/// Counters reported by a backend alongside its verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveStats {
    pub nodes: usize,
    pub lp_solves: usize,
    pub branches: usize,
}

/// A satisfying assignment returned by a [`Solver`](crate::Solver).
#[derive(Debug, Clone)]
pub struct Model {
    values: Vec<f64>,
    stats: SolveStats,
}

impl Model {
    pub fn new(values: Vec<f64>, stats: SolveStats) -> Self {
        Self { values, stats }
    }

    /// Concrete value of `expr` under this assignment.
    pub fn evaluate(&self, expr: &LinExpr) -> f64 {
        expr.eval(&self.values)
    }

    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.0).copied().unwrap_or(0.0)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn stats(&self) -> SolveStats {
        self.stats
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_formulas_are_not_stored() {
        let mut p = Problem::new();
        p.assert("g", Formula::True);
        assert_eq!(p.constraint_count(), 0);
    }

    #[test]
    fn without_groups_filters_and_keeps_vars() {
        let mut p = Problem::new();
        let x = p.new_real("x");
        p.assert("latency", Formula::le(LinExpr::var(x), 5.0));
        p.assert("order", Formula::ge(LinExpr::var(x), 1.0));
        let relaxed = p.without_groups(&["latency"]);
        assert_eq!(relaxed.var_count(), 1);
        assert_eq!(relaxed.constraint_count(), 1);
        assert!(!relaxed.has_group("latency"));
        assert!(relaxed.has_group("order"));
    }

    #[test]
    fn trivially_unsat_is_detected() {
        let mut p = Problem::new();
        p.assert("g", Formula::le(3.0, 1.0));
        assert!(p.is_trivially_unsat());
    }

    #[test]
    fn model_evaluates_expressions() {
        let mut p = Problem::new();
        let x = p.new_real("x");
        let y = p.new_real("y");
        let m = Model::new(vec![2.0, 3.0], SolveStats::default());
        let e = LinExpr::var(x) * 2.0 + LinExpr::var(y) + 1.0;
        assert_eq!(m.evaluate(&e), 8.0);
        assert_eq!(m.value(y), 3.0);
    }
}
