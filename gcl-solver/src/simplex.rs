/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Dense two-phase primal simplex over non-negative variables.
//!
//! Used by the branching backend to decide the conjunction of linear atoms
//! active at one search node and, optionally, to minimise the problem
//! objective over it.
//!
//! Pricing is Dantzig (most negative reduced cost); after a run of degenerate
//! pivots it switches to Bland's rule, which cannot cycle.

use crate::error::SolverError;
use crate::expr::Cmp;

const PIVOT_EPS: f64 = 1e-9;
const COST_EPS: f64 = 1e-9;
const DEGENERATE_RUN_BEFORE_BLAND: usize = 50;

/// `Σ coeffs ⋈ rhs`.
#[derive(Debug, Clone)]
pub(crate) struct LinearRow {
    pub coeffs: Vec<(usize, f64)>,
    pub cmp: Cmp,
    pub rhs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LpOutcome {
    /// A feasible point; optimal for the objective when one was given.
    Feasible(Vec<f64>),
    Infeasible,
}

enum Iteration {
    Optimal,
    Unbounded,
}

struct Tableau {
    rows: usize,
    width: usize,
    data: Vec<f64>,
    basis: Vec<usize>,
    cost: Vec<f64>,
    iterations: usize,
    max_iterations: usize,
}

impl Tableau {
    fn at(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.width + c]
    }

    fn rhs_col(&self) -> usize {
        self.width - 1
    }

    fn pivot(&mut self, r: usize, c: usize) {
        let w = self.width;
        let p = self.data[r * w + c];
        for j in 0..w {
            self.data[r * w + j] /= p;
        }
        let pivot_row: Vec<f64> = self.data[r * w..(r + 1) * w].to_vec();
        for i in 0..self.rows {
            if i == r {
                continue;
            }
            let f = self.data[i * w + c];
            if f.abs() < 1e-15 {
                continue;
            }
            let row = &mut self.data[i * w..(i + 1) * w];
            for (j, pv) in pivot_row.iter().enumerate() {
                if *pv != 0.0 {
                    row[j] -= f * pv;
                }
            }
            row[c] = 0.0;
        }
        let f = self.cost[c];
        if f != 0.0 {
            for (j, pv) in pivot_row.iter().enumerate() {
                if *pv != 0.0 {
                    self.cost[j] -= f * pv;
                }
            }
            self.cost[c] = 0.0;
        }
        self.basis[r] = c;
    }

    /// Run primal simplex on the current cost row over columns `< allowed`.
    fn optimise(&mut self, allowed: usize) -> Result<Iteration, SolverError> {
        let rhs = self.rhs_col();
        let mut degenerate_run = 0usize;
        loop {
            if self.iterations >= self.max_iterations {
                return Err(SolverError::Numerical(format!(
                    "simplex iteration cap {} reached",
                    self.max_iterations
                )));
            }
            let bland = degenerate_run >= DEGENERATE_RUN_BEFORE_BLAND;

            let entering = if bland {
                (0..allowed).find(|&j| self.cost[j] < -COST_EPS)
            } else {
                let mut best: Option<(usize, f64)> = None;
                for j in 0..allowed {
                    let c = self.cost[j];
                    if c < -COST_EPS && best.map_or(true, |(_, b)| c < b) {
                        best = Some((j, c));
                    }
                }
                best.map(|(j, _)| j)
            };
            let Some(col) = entering else {
                return Ok(Iteration::Optimal);
            };

            let mut leaving: Option<(usize, f64)> = None;
            for r in 0..self.rows {
                let a = self.at(r, col);
                if a > PIVOT_EPS {
                    let ratio = self.at(r, rhs).max(0.0) / a;
                    let better = match leaving {
                        None => true,
                        Some((lr, lratio)) => {
                            ratio < lratio - 1e-12
                                || ((ratio - lratio).abs() <= 1e-12 && self.basis[r] < self.basis[lr])
                        }
                    };
                    if better {
                        leaving = Some((r, ratio));
                    }
                }
            }
            let Some((row, ratio)) = leaving else {
                return Ok(Iteration::Unbounded);
            };

            if ratio.abs() <= 1e-12 {
                degenerate_run += 1;
            } else {
                degenerate_run = 0;
            }
            self.pivot(row, col);
            self.iterations += 1;
        }
    }
}

/// Decide `rows` over `n` non-negative variables and, when `objective` is
/// given, minimise it.
///
/// Returns the outcome and the number of pivots performed.
pub(crate) fn solve(
    n: usize,
    rows: &[LinearRow],
    objective: Option<&[(usize, f64)]>,
    max_iterations: usize,
) -> Result<(LpOutcome, usize), SolverError> {
    // Normalise to rhs ≥ 0.
    let normalised: Vec<LinearRow> = rows
        .iter()
        .map(|r| {
            if r.rhs < 0.0 {
                LinearRow {
                    coeffs: r.coeffs.iter().map(|(j, c)| (*j, -c)).collect(),
                    cmp: match r.cmp {
                        Cmp::Le => Cmp::Ge,
                        Cmp::Ge => Cmp::Le,
                        Cmp::Eq => Cmp::Eq,
                    },
                    rhs: -r.rhs,
                }
            } else {
                r.clone()
            }
        })
        .collect();

    let m = normalised.len();
    let slack_count = normalised.iter().filter(|r| r.cmp != Cmp::Eq).count();
    let art_count = normalised.iter().filter(|r| r.cmp != Cmp::Le).count();
    let slack_start = n;
    let art_start = n + slack_count;
    let width = art_start + art_count + 1;

    let mut t = Tableau {
        rows: m,
        width,
        data: vec![0.0; m * width],
        basis: vec![0; m],
        cost: vec![0.0; width],
        iterations: 0,
        max_iterations,
    };

    let mut next_slack = slack_start;
    let mut next_art = art_start;
    let mut max_rhs = 1.0f64;
    for (i, row) in normalised.iter().enumerate() {
        for (j, c) in &row.coeffs {
            t.data[i * width + j] += c;
        }
        t.data[i * width + width - 1] = row.rhs;
        max_rhs = max_rhs.max(row.rhs.abs());
        match row.cmp {
            Cmp::Le => {
                t.data[i * width + next_slack] = 1.0;
                t.basis[i] = next_slack;
                next_slack += 1;
            }
            Cmp::Ge => {
                t.data[i * width + next_slack] = -1.0;
                next_slack += 1;
                t.data[i * width + next_art] = 1.0;
                t.basis[i] = next_art;
                next_art += 1;
            }
            Cmp::Eq => {
                t.data[i * width + next_art] = 1.0;
                t.basis[i] = next_art;
                next_art += 1;
            }
        }
    }

    // ── Phase 1: minimise the sum of artificials ──────────────────────────────
    if art_count > 0 {
        for i in 0..m {
            if t.basis[i] >= art_start {
                for j in 0..width {
                    if j < art_start || j == width - 1 {
                        t.cost[j] -= t.data[i * width + j];
                    }
                }
            }
        }
        t.optimise(art_start + art_count)?;
        let infeasibility = -t.cost[width - 1];
        if infeasibility > 1e-7 * max_rhs {
            return Ok((LpOutcome::Infeasible, t.iterations));
        }

        // Drive zero-valued artificials out of the basis where possible.
        for i in 0..m {
            if t.basis[i] >= art_start {
                if let Some(j) = (0..art_start).find(|&j| t.at(i, j).abs() > PIVOT_EPS) {
                    t.pivot(i, j);
                }
            }
        }
    }

    // ── Phase 2: minimise the objective ───────────────────────────────────────
    if let Some(obj) = objective {
        t.cost = vec![0.0; width];
        for (j, c) in obj {
            t.cost[*j] += c;
        }
        for i in 0..m {
            let b = t.basis[i];
            let cb = if b < n { t.cost[b] } else { 0.0 };
            if cb != 0.0 {
                for j in 0..width {
                    let a = t.data[i * width + j];
                    if a != 0.0 {
                        t.cost[j] -= cb * a;
                    }
                }
                t.cost[b] = 0.0;
            }
        }
        // An unbounded objective still leaves a feasible basis to report.
        let _ = t.optimise(art_start)?;
    }

    let mut x = vec![0.0; n];
    for i in 0..m {
        let b = t.basis[i];
        if b < n {
            let v = t.at(i, width - 1);
            x[b] = if v.abs() < 1e-10 { 0.0 } else { v };
        }
    }
    Ok((LpOutcome::Feasible(x), t.iterations))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
