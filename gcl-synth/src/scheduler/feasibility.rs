/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Analytic pre-solve screening.
//!
//! These are necessary conditions only: a network that passes may still be
//! unschedulable, but one that fails certainly is, and the failing bound is
//! known exactly without a solver run.
//!
//! | Check | Condition |
//! |---|---|
//! | Port utilisation | `Σ (size / speed) / period ≤ 1` (or `≤ 1 − f` with best-effort reservation `f`) |
//! | Cycle bounds | sized cycle duration inside the switch's `[min, max]` |
//! | Slot length | largest packet on the port fits the longest allowed slot |
//! | Minimum latency | `Σ transmission + Σ propagation ≤ max-latency` along every route |

use tracing::{debug, info};

use super::Bottleneck;
use crate::model::{Network, Port};

const SCREEN_TOLERANCE: f64 = 1e-9;

/// Wire-time share a port's fragments demand.
///
/// Returns `0.0` for a port without fragments.
pub fn port_utilisation(net: &Network, port: &Port) -> f64 {
    port.fragments
        .iter()
        .map(|&f| net.fragment(f))
        .filter(|f| f.period > 0.0)
        .map(|f| port.transmission_time(f.packet_size) / f.period)
        .sum()
}

/// Lower bound on the end-to-end latency of the route ending in `leaf`:
/// every hop's transmission time plus every link delay.
pub fn minimum_latency(net: &Network, leaf: crate::model::FragmentId) -> f64 {
    net.chain_to(leaf)
        .into_iter()
        .map(|f| {
            let frag = net.fragment(f);
            let egress = net.port(frag.port);
            net.port(frag.ingress).propagation_delay + egress.transmission_time(frag.packet_size)
        })
        .sum()
}

fn check_port(net: &Network, port: &Port, best_effort_fraction: f64) -> Option<Bottleneck> {
    let sizing = port.cycle.sizing.as_ref()?;

    let duration = sizing.cycle_duration_us;
    if duration + SCREEN_TOLERANCE < port.cycle.lower_bound || duration > port.cycle.upper_bound + SCREEN_TOLERANCE {
        return Some(Bottleneck::CycleBounds {
            port: port.name.clone(),
            duration,
            lower: port.cycle.lower_bound,
            upper: port.cycle.upper_bound,
        });
    }

    let utilisation = port_utilisation(net, port);
    let limit = 1.0 - best_effort_fraction.max(0.0);
    if utilisation > limit + SCREEN_TOLERANCE {
        return Some(Bottleneck::PortUtilisation {
            port: port.name.clone(),
            utilisation,
            limit,
        });
    }

    let required = port
        .fragments
        .iter()
        .map(|&f| port.transmission_time(net.fragment(f).packet_size))
        .fold(0.0, f64::max);
    if let Some(max_slot) = port.cycle.max_slot() {
        if required > max_slot + SCREEN_TOLERANCE {
            return Some(Bottleneck::SlotTooShort {
                port: port.name.clone(),
                required,
                limit: max_slot,
            });
        }
    }

    debug!(port = %port.name, utilisation, limit, "port screened");
    None
}

/// Screen every port that will be solved and every flow with a latency
/// budget.
///
/// Returns `None` if nothing is provably infeasible, otherwise the first
/// bottleneck found.
pub fn screen(net: &Network, best_effort_fraction: f64) -> Option<Bottleneck> {
    for port in net.ports().iter().filter(|p| p.needs_solving()) {
        if let Some(b) = check_port(net, port, best_effort_fraction) {
            info!(bottleneck = %b, "screening rejected the network");
            return Some(b);
        }
    }

    for flow in net.flows() {
        let Some(limit) = flow.max_latency else {
            continue;
        };
        for leaf in net.leaf_fragments(flow.id) {
            let minimum = minimum_latency(net, leaf);
            if minimum > limit + SCREEN_TOLERANCE {
                let b = Bottleneck::MinimumLatency {
                    flow: flow.name.clone(),
                    minimum,
                    limit,
                };
                info!(bottleneck = %b, "screening rejected the network");
                return Some(b);
            }
        }
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────
