/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the network scheduler.
//!
//! Two types model the two failure layers:
//!
//! * [`Bottleneck`]: which declared bound most likely makes the network
//!   unschedulable (carried inside [`SchedulerError::ModelInfeasible`]).
//! * [`SchedulerError`]: top-level failure returned from
//!   [`NetworkScheduler::schedule()`](super::NetworkScheduler::schedule).
//!
//! **Do not** replace these with `anyhow::Error` inside the library; the
//! binary maps them to exit diagnostics.

use gcl_solver::SolverError;
use thiserror::Error;

use crate::hyperperiod::SizingError;
use crate::model::ModelError;

// ── Bottleneck ────────────────────────────────────────────────────────────────

/// Constraint groups the diagnosis may drop, in the order they are tried.
pub const RELAXABLE_GROUPS: [&str; 6] = [
    "latency",
    "jitter",
    "best-effort",
    "first-hop-collision",
    "wrap",
    "carry",
];

/// The declared bound identified as the reason no schedule exists.
///
/// The first four variants come from the analytic screening and carry exact
/// values; the rest come from the relaxed re-solve and name a constraint
/// family.
#[derive(Debug, Clone, PartialEq)]
pub enum Bottleneck {
    /// Wire time demanded on a port exceeds what the port can give.
    PortUtilisation {
        port: String,
        utilisation: f64,
        limit: f64,
    },

    /// Transmission plus propagation along a route already exceeds the
    /// flow's latency budget.
    MinimumLatency {
        flow: String,
        minimum: f64,
        limit: f64,
    },

    /// The sized cycle duration falls outside the switch's cycle bounds.
    CycleBounds {
        port: String,
        duration: f64,
        lower: f64,
        upper: f64,
    },

    /// A single packet does not fit the port's longest allowed slot.
    SlotTooShort {
        port: String,
        required: f64,
        limit: f64,
    },

    LatencyBudget,
    JitterBudget,
    BestEffortReservation,
    FirstHopCollision,
    WrapPolicy,
    /// Values kept by a port's reset policy no longer admit a schedule.
    CarriedValues,

    /// Still infeasible with every relaxable group dropped (or diagnosis off).
    Undetermined,
}

impl Bottleneck {
    /// Bottleneck named by a relaxable constraint group.
    pub fn from_group(group: &str) -> Option<Self> {
        match group {
            "latency" => Some(Bottleneck::LatencyBudget),
            "jitter" => Some(Bottleneck::JitterBudget),
            "best-effort" => Some(Bottleneck::BestEffortReservation),
            "first-hop-collision" => Some(Bottleneck::FirstHopCollision),
            "wrap" => Some(Bottleneck::WrapPolicy),
            "carry" => Some(Bottleneck::CarriedValues),
            _ => None,
        }
    }
}

impl std::fmt::Display for Bottleneck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bottleneck::PortUtilisation {
                port,
                utilisation,
                limit,
            } => write!(
                f,
                "port '{}' needs {:.1}% of its wire time (limit {:.1}%)",
                port,
                utilisation * 100.0,
                limit * 100.0
            ),
            Bottleneck::MinimumLatency {
                flow,
                minimum,
                limit,
            } => write!(
                f,
                "flow '{}' needs at least {:.3} us end to end but allows {:.3} us",
                flow, minimum, limit
            ),
            Bottleneck::CycleBounds {
                port,
                duration,
                lower,
                upper,
            } => write!(
                f,
                "port '{}' cycle of {:.3} us is outside [{:.3}, {:.3}] us",
                port, duration, lower, upper
            ),
            Bottleneck::SlotTooShort {
                port,
                required,
                limit,
            } => write!(
                f,
                "port '{}' needs a {:.3} us slot but slots are capped at {:.3} us",
                port, required, limit
            ),
            Bottleneck::LatencyBudget => write!(f, "flow latency budgets"),
            Bottleneck::JitterBudget => write!(f, "flow jitter budgets"),
            Bottleneck::BestEffortReservation => write!(f, "best-effort bandwidth reservation"),
            Bottleneck::FirstHopCollision => write!(f, "shared source links"),
            Bottleneck::WrapPolicy => write!(f, "wrap policy"),
            Bottleneck::CarriedValues => write!(f, "values carried over by port reset policies"),
            Bottleneck::Undetermined => write!(f, "no single relaxable bound identified"),
        }
    }
}

// ── SchedulerError ────────────────────────────────────────────────────────────

/// Top-level error type returned by the scheduler.
///
/// | Variant | Taxonomy |
/// |---|---|
/// | `ModelInfeasible` | no schedule exists; nothing is materialised |
/// | `Malformed` | topology or flow definition is broken |
/// | `Sizing` | a port's periods cannot be sized |
/// | `Solver` | the backend gave no verdict (timeout, limits) |
/// | `NotSolved` | incremental solve on a network never solved |
/// | `SolveTaskFailed` | the blocking solve task panicked or was aborted |
/// | `UnmodeledEntity` | an expression referenced something never declared |
/// | `CollisionPairLimit` | two flows share a source link over too many packet pairs |
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The solver proved that no schedule satisfies the constraints.
    #[error("network is unschedulable: {bottleneck}")]
    ModelInfeasible { bottleneck: Bottleneck },

    #[error("malformed topology: {0}")]
    Malformed(#[from] ModelError),

    #[error("cannot size cycle of port '{port}': {source}")]
    Sizing {
        port: String,
        #[source]
        source: SizingError,
    },

    #[error("solver failed: {0}")]
    Solver(#[from] SolverError),

    /// `schedule_incremental()` needs a previously solved network.
    #[error("network has no solved schedule to start from")]
    NotSolved,

    #[error("solve task failed: {0}")]
    SolveTaskFailed(String),

    /// Internal ordering fault: a fragment's timing was read before its
    /// port was declared in the solving session.
    #[error("{entity} was referenced before it was modeled")]
    UnmodeledEntity { entity: String },

    /// Two flows leave one device over one link with more packet pairs per
    /// joint hypercycle than the collision rules are emitted for.
    #[error("flows '{a}' and '{b}' share source link '{link}' over {pairs} packet pairs (limit {limit})")]
    CollisionPairLimit {
        link: String,
        a: String,
        b: String,
        pairs: usize,
        limit: usize,
    },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_relaxable_group_maps_to_a_bottleneck() {
        for g in RELAXABLE_GROUPS {
            assert!(Bottleneck::from_group(g).is_some(), "{g}");
        }
        assert_eq!(Bottleneck::from_group("containment"), None);
    }

    #[test]
    fn utilisation_message_shows_percentages() {
        let b = Bottleneck::PortUtilisation {
            port: "s0->d1".into(),
            utilisation: 1.25,
            limit: 1.0,
        };
        assert_eq!(b.to_string(), "port 's0->d1' needs 125.0% of its wire time (limit 100.0%)");
    }
}
