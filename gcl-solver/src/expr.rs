/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Linear expressions and boolean formulas over solver variables.
//!
//! Every constraint handed to a [`Solver`](crate::Solver) is a [`Formula`]:
//! a tree of conjunctions and disjunctions whose leaves are linear
//! [`Atom`]s of the form `expr ⋈ 0` with `⋈ ∈ {≤, ≥, =}`.
//!
//! Constant atoms are folded as soon as they are built, so constraints that
//! only mention frozen (already solved) values collapse to [`Formula::True`]
//! or [`Formula::False`] before they ever reach the backend.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Absolute tolerance used when folding constant atoms and when checking a
/// candidate assignment against a formula.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

// ── Variables ─────────────────────────────────────────────────────────────────

/// Handle to a variable declared on a [`Problem`](crate::Problem).
///
/// Handles are dense indices; they are only meaningful for the problem that
/// issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    /// Position of the variable in the problem's declaration order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Domain of a variable.  All variables are implicitly non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarKind {
    #[default]
    Real,
    Integer,
}

// ── LinExpr ───────────────────────────────────────────────────────────────────

/// `constant + Σ coefficient·variable`.
///
/// Terms are kept merged and sorted by variable, with zero coefficients
/// dropped, so two expressions that differ only in term order compare equal
/// and `x - x` is recognised as the constant `0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinExpr {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn var(var: VarId) -> Self {
        Self::term(var, 1.0)
    }

    pub fn term(var: VarId, coefficient: f64) -> Self {
        let mut expr = Self::zero();
        expr.add_term(var, coefficient);
        expr
    }

    /// Sum of an iterator of expressions.
    pub fn sum<I: IntoIterator<Item = LinExpr>>(items: I) -> Self {
        items.into_iter().fold(Self::zero(), |acc, e| acc + e)
    }

    pub fn add_term(&mut self, var: VarId, coefficient: f64) {
        if coefficient == 0.0 {
            return;
        }
        match self.terms.binary_search_by_key(&var, |(v, _)| *v) {
            Ok(pos) => {
                self.terms[pos].1 += coefficient;
                if self.terms[pos].1.abs() < 1e-12 {
                    self.terms.remove(pos);
                }
            }
            Err(pos) => self.terms.insert(pos, (var, coefficient)),
        }
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant_part(&self) -> f64 {
        self.constant
    }

    /// `Some(value)` when the expression mentions no variable.
    pub fn as_constant(&self) -> Option<f64> {
        if self.terms.is_empty() {
            Some(self.constant)
        } else {
            None
        }
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        if factor == 0.0 {
            return Self::zero();
        }
        for (_, c) in &mut self.terms {
            *c *= factor;
        }
        self.constant *= factor;
        self
    }

    pub fn plus(mut self, value: f64) -> Self {
        self.constant += value;
        self
    }

    /// Evaluate under a dense assignment indexed by [`VarId::index`].
    ///
    /// Variables outside the assignment evaluate to `0.0`.
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms.iter().fold(self.constant, |acc, (v, c)| {
            acc + c * values.get(v.0).copied().unwrap_or(0.0)
        })
    }

    /// Largest variable index mentioned, if any.
    pub fn max_var(&self) -> Option<VarId> {
        self.terms.last().map(|(v, _)| *v)
    }
}

impl From<VarId> for LinExpr {
    fn from(var: VarId) -> Self {
        LinExpr::var(var)
    }
}

impl From<f64> for LinExpr {
    fn from(value: f64) -> Self {
        LinExpr::constant(value)
    }
}

impl AddAssign<LinExpr> for LinExpr {
    fn add_assign(&mut self, rhs: LinExpr) {
        for (v, c) in rhs.terms {
            self.add_term(v, c);
        }
        self.constant += rhs.constant;
    }
}

impl Add<LinExpr> for LinExpr {
    type Output = LinExpr;
    fn add(mut self, rhs: LinExpr) -> LinExpr {
        self += rhs;
        self
    }
}

impl Add<f64> for LinExpr {
    type Output = LinExpr;
    fn add(self, rhs: f64) -> LinExpr {
        self.plus(rhs)
    }
}

impl Sub<LinExpr> for LinExpr {
    type Output = LinExpr;
    fn sub(self, rhs: LinExpr) -> LinExpr {
        self + rhs.scaled(-1.0)
    }
}

impl Sub<f64> for LinExpr {
    type Output = LinExpr;
    fn sub(self, rhs: f64) -> LinExpr {
        self.plus(-rhs)
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;
    fn mul(self, rhs: f64) -> LinExpr {
        self.scaled(rhs)
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;
    fn neg(self) -> LinExpr {
        self.scaled(-1.0)
    }
}

impl fmt::Display for LinExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (v, c) in &self.terms {
            if first {
                write!(f, "{c}·{v}")?;
                first = false;
            } else if *c < 0.0 {
                write!(f, " - {}·{v}", -c)?;
            } else {
                write!(f, " + {c}·{v}")?;
            }
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant < 0.0 {
            write!(f, " - {}", -self.constant)
        } else if self.constant > 0.0 {
            write!(f, " + {}", self.constant)
        } else {
            Ok(())
        }
    }
}

// ── Atoms ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Le,
    Ge,
    Eq,
}

/// `expr ⋈ 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub expr: LinExpr,
    pub cmp: Cmp,
}

impl Atom {
    pub fn holds(&self, values: &[f64], tolerance: f64) -> bool {
        let v = self.expr.eval(values);
        match self.cmp {
            Cmp::Le => v <= tolerance,
            Cmp::Ge => v >= -tolerance,
            Cmp::Eq => v.abs() <= tolerance,
        }
    }
}

// ── Formula ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    True,
    False,
    Atom(Atom),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    fn compare(lhs: LinExpr, rhs: LinExpr, cmp: Cmp) -> Formula {
        let expr = lhs - rhs;
        if let Some(v) = expr.as_constant() {
            let atom = Atom { expr, cmp };
            return if atom.holds(&[], DEFAULT_TOLERANCE) {
                Formula::True
            } else {
                tracing::trace!(value = v, ?cmp, "constant atom folded to false");
                Formula::False
            };
        }
        Formula::Atom(Atom { expr, cmp })
    }

    /// `lhs ≤ rhs`
    pub fn le(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Formula {
        Self::compare(lhs.into(), rhs.into(), Cmp::Le)
    }

    /// `lhs ≥ rhs`
    pub fn ge(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Formula {
        Self::compare(lhs.into(), rhs.into(), Cmp::Ge)
    }

    /// `lhs = rhs`
    pub fn eq(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Formula {
        Self::compare(lhs.into(), rhs.into(), Cmp::Eq)
    }

    /// `lo ≤ expr ≤ hi`
    pub fn between(expr: impl Into<LinExpr>, lo: impl Into<LinExpr>, hi: impl Into<LinExpr>) -> Formula {
        let expr = expr.into();
        Formula::and(vec![Formula::ge(expr.clone(), lo), Formula::le(expr, hi)])
    }

    /// Conjunction with `True`/`False` folding and nested-`And` flattening.
    pub fn and(parts: Vec<Formula>) -> Formula {
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::True,
            1 => out.pop().unwrap_or(Formula::True),
            _ => Formula::And(out),
        }
    }

    /// Disjunction with `True`/`False` folding and nested-`Or` flattening.
    pub fn or(parts: Vec<Formula>) -> Formula {
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Formula::True => return Formula::True,
                Formula::False => {}
                Formula::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::False,
            1 => out.pop().unwrap_or(Formula::False),
            _ => Formula::Or(out),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Formula::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Formula::False)
    }

    /// Truth value under a dense assignment.
    pub fn holds(&self, values: &[f64], tolerance: f64) -> bool {
        match self {
            Formula::True => true,
            Formula::False => false,
            Formula::Atom(a) => a.holds(values, tolerance),
            Formula::And(parts) => parts.iter().all(|p| p.holds(values, tolerance)),
            Formula::Or(parts) => parts.iter().any(|p| p.holds(values, tolerance)),
        }
    }

    /// Number of atoms in the tree.
    pub fn atom_count(&self) -> usize {
        match self {
            Formula::True | Formula::False => 0,
            Formula::Atom(_) => 1,
            Formula::And(parts) | Formula::Or(parts) => parts.iter().map(Self::atom_count).sum(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn v(i: usize) -> VarId {
        VarId(i)
    }

    #[test]
    fn terms_are_merged_and_cancelled() {
        let e = LinExpr::var(v(1)) + LinExpr::term(v(0), 2.0) - LinExpr::var(v(1));
        assert_eq!(e.terms(), &[(v(0), 2.0)]);
        let zero = LinExpr::var(v(3)) - LinExpr::var(v(3));
        assert!(zero.is_constant());
    }

    #[test]
    fn eval_uses_dense_assignment() {
        let e = LinExpr::term(v(0), 2.0) + LinExpr::term(v(2), -1.0) + 5.0;
        assert_eq!(e.eval(&[1.0, 100.0, 3.0]), 4.0);
    }

    #[test]
    fn constant_comparisons_fold() {
        assert!(Formula::le(1.0, 2.0).is_true());
        assert!(Formula::ge(1.0, 2.0).is_false());
        assert!(Formula::eq(LinExpr::var(v(0)), LinExpr::var(v(0))).is_true());
    }

    #[test]
    fn and_or_folding() {
        let a = Formula::le(LinExpr::var(v(0)), 3.0);
        assert!(Formula::and(vec![a.clone(), Formula::False]).is_false());
        assert!(Formula::or(vec![a.clone(), Formula::True]).is_true());
        assert_eq!(Formula::or(vec![Formula::False, a.clone()]), a);
        assert!(Formula::or(vec![]).is_false());
        assert!(Formula::and(vec![]).is_true());
    }

    #[test]
    fn nested_or_is_flattened() {
        let a = Formula::le(LinExpr::var(v(0)), 3.0);
        let b = Formula::ge(LinExpr::var(v(1)), 3.0);
        let c = Formula::eq(LinExpr::var(v(2)), 1.0);
        let f = Formula::or(vec![a, Formula::or(vec![b, c])]);
        match f {
            Formula::Or(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn holds_respects_tolerance() {
        let f = Formula::eq(LinExpr::var(v(0)), 10.0);
        assert!(f.holds(&[10.0 + 1e-9], DEFAULT_TOLERANCE));
        assert!(!f.holds(&[10.1], DEFAULT_TOLERANCE));
    }
}
