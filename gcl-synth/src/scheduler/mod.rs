/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Gate-control schedule synthesis for a whole network.
//!
//! [`NetworkScheduler`] turns a [`Network`] into one constraint set, submits
//! it to a [`Solver`] and writes the answer back into the model:
//!
//! ```text
//! validate ─► size cycles ─► screen ─► declare ─► emit ─► solve ─► materialise ─► verify
//!                                                           │
//!                                                     Unsat ─► relaxed re-solves ─► Bottleneck
//! ```
//!
//! # Run kinds
//!
//! | Entry point | Starting state | Solved ports |
//! |---|---|---|
//! | [`schedule`](NetworkScheduler::schedule) | everything discarded | every sized port |
//! | [`schedule_incremental`](NetworkScheduler::schedule_incremental) | previous solve kept | only ports not frozen; frozen ports are constants |
//! | [`schedule_async`](NetworkScheduler::schedule_async) | as `schedule` | solve on a blocking worker under a timeout |
//!
//! # Example
//! ```rust,ignore
//! let scheduler = NetworkScheduler::with_builtin(SchedulerOptions::default());
//! let summary = scheduler.schedule(&mut network)?;
//! ```

pub mod error;
pub mod extract;
pub mod feasibility;
mod network_rules;
mod port_rules;
pub mod session;
pub mod verify;

pub use error::{Bottleneck, SchedulerError, RELAXABLE_GROUPS};
pub use network_rules::MAX_COLLISION_PAIRS;
pub use session::SolvingSession;
pub use verify::{verify, Violation};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcl_solver::{
    BranchingSolver, Model, Problem, SolveControl, SolveStats, Solver, SolverError, Verdict,
};
use tracing::{debug, info, warn};

use crate::hyperperiod::{CycleSizer, LanePolicy, DEFAULT_HYPERCYCLE_LIMIT_US};
use crate::model::{EntityState, Network, PortId};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Tolerance of the post-solve schedule check, µs.
pub const VERIFY_TOLERANCE: f64 = 1e-5;

// ── Options ───────────────────────────────────────────────────────────────────

/// Knobs of a scheduling run.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Wall-clock budget of one solve; `None` waits for a verdict.
    pub timeout: Option<Duration>,
    /// Search-node budget of the built-in backend.
    pub node_limit: usize,
    /// Jitter budget for flows that declare none; `None` leaves them free.
    pub default_max_jitter: Option<f64>,
    /// Idle time between same-lane packets, µs.
    pub interframe_gap: f64,
    /// Only start transmissions on an arrival, a slot start or right after
    /// another packet.
    pub wrap: bool,
    /// Share of every cycle kept free for best-effort traffic, `0.0..1.0`.
    pub best_effort_fraction: f64,
    /// Overrides every solved port's lane policy.
    pub lane_policy: Option<LanePolicy>,
    /// On Unsat, re-solve with relaxed groups to name a bottleneck.
    pub diagnose_infeasibility: bool,
    pub hypercycle_limit_us: f64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            node_limit: gcl_solver::search::DEFAULT_NODE_LIMIT,
            default_max_jitter: None,
            interframe_gap: 0.0,
            wrap: false,
            best_effort_fraction: 0.0,
            lane_policy: None,
            diagnose_infeasibility: true,
            hypercycle_limit_us: DEFAULT_HYPERCYCLE_LIMIT_US,
        }
    }
}

/// What one scheduling run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleSummary {
    pub solved_ports: usize,
    /// Ports kept as constants (incremental runs only).
    pub frozen_ports: usize,
    pub variables: usize,
    pub constraints: usize,
    pub stats: SolveStats,
    /// Post-solve check failures; zero for a sound backend.
    pub violations: usize,
    pub elapsed: Duration,
}

// ── Solve ─────────────────────────────────────────────────────────────────────

/// Submit `problem`; on Unsat, name the bottleneck by dropping one relaxable
/// group at a time (when `diagnose` is set).
///
/// # Errors
/// * [`SchedulerError::ModelInfeasible`] – no model exists.
/// * [`SchedulerError::Solver`] – the backend gave up (timeout, limits).
pub fn solve_with_diagnosis(
    solver: &dyn Solver,
    problem: &Problem,
    control: &SolveControl,
    diagnose: bool,
) -> Result<Model, SchedulerError> {
    info!(
        solver = solver.name(),
        variables = problem.var_count(),
        constraints = problem.constraint_count(),
        "Submitting constraint set"
    );
    match solver.submit(problem, control)? {
        Verdict::Sat(model) => {
            let stats = model.stats();
            debug!(
                nodes = stats.nodes,
                lp_solves = stats.lp_solves,
                branches = stats.branches,
                "solver found a model"
            );
            Ok(model)
        }
        Verdict::Unsat => {
            let bottleneck = if diagnose {
                diagnose_unsat(solver, problem, control)?
            } else {
                Bottleneck::Undetermined
            };
            warn!(bottleneck = %bottleneck, "No schedule satisfies the network");
            Err(SchedulerError::ModelInfeasible { bottleneck })
        }
    }
}

fn diagnose_unsat(solver: &dyn Solver, problem: &Problem, control: &SolveControl) -> Result<Bottleneck, SchedulerError> {
    for group in RELAXABLE_GROUPS {
        if !problem.has_group(group) {
            continue;
        }
        let relaxed = problem.without_groups(&[group]);
        let sat = solver.submit(&relaxed, control)?.is_sat();
        debug!(group, sat, "relaxed re-solve");
        if sat {
            return Ok(Bottleneck::from_group(group).unwrap_or(Bottleneck::Undetermined));
        }
    }
    Ok(Bottleneck::Undetermined)
}

// ── NetworkScheduler ──────────────────────────────────────────────────────────

/// Synthesises gate-control schedules.
///
/// Holds only the backend and the options; every per-run value lives in the
/// [`SolvingSession`] built inside a call, so one scheduler can serve many
/// networks.
pub struct NetworkScheduler {
    solver: Arc<dyn Solver>,
    options: SchedulerOptions,
}

impl NetworkScheduler {
    pub fn new(solver: Arc<dyn Solver>, options: SchedulerOptions) -> Self {
        Self { solver, options }
    }

    /// Scheduler backed by [`BranchingSolver`] with the options' node limit.
    pub fn with_builtin(options: SchedulerOptions) -> Self {
        let solver = BranchingSolver::new().with_node_limit(options.node_limit);
        Self::new(Arc::new(solver), options)
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    fn control(&self) -> SolveControl {
        match self.options.timeout {
            Some(t) => SolveControl::with_timeout(t),
            None => SolveControl::unbounded(),
        }
    }

    // ── Public entry points ───────────────────────────────────────────────────

    /// Discard any previous schedule and solve the whole network.
    ///
    /// # Errors
    /// Any [`SchedulerError`]; on error no port is left Solved.
    pub fn schedule(&self, network: &mut Network) -> Result<ScheduleSummary, SchedulerError> {
        network.reset_all();
        self.run(network)
    }

    /// Solve only what is not frozen, keeping every other port's values.
    ///
    /// Ports still marked Solved are frozen first, so calling this without
    /// any edit leaves the schedule untouched.
    ///
    /// # Errors
    /// [`SchedulerError::NotSolved`] if the network has no schedule yet.
    pub fn schedule_incremental(&self, network: &mut Network) -> Result<ScheduleSummary, SchedulerError> {
        if !network.is_solved() {
            return Err(SchedulerError::NotSolved);
        }
        let solved: Vec<PortId> = network
            .ports()
            .iter()
            .filter(|p| p.state == EntityState::Solved)
            .map(|p| p.id)
            .collect();
        for port in solved {
            network.set_port_state(port, EntityState::Frozen);
        }
        self.run(network)
    }

    /// [`schedule`](Self::schedule) with the solve on a blocking worker.
    ///
    /// When the options carry a timeout the worker is raced against it; on
    /// expiry the worker's cancel token is raised and
    /// [`SolverError::Timeout`] is returned.
    pub async fn schedule_async(&self, network: &mut Network) -> Result<ScheduleSummary, SchedulerError> {
        network.reset_all();
        let started = Instant::now();
        let Some(session) = self.prepare(network)? else {
            return Ok(self.finish_idle(network, started));
        };

        let problem = session.problem().clone();
        let control = self.control();
        let cancel = control.cancel_token();
        let solver = Arc::clone(&self.solver);
        let diagnose = self.options.diagnose_infeasibility;
        let task = tokio::task::spawn_blocking(move || {
            solve_with_diagnosis(solver.as_ref(), &problem, &control, diagnose)
        });

        let joined = match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancel.cancel();
                    warn!(timeout_ms = limit.as_millis(), "Solve timed out, worker cancelled");
                    return Err(SolverError::Timeout {
                        elapsed_ms: started.elapsed().as_millis(),
                        nodes: 0,
                    }
                    .into());
                }
            },
            None => task.await,
        };
        let model = joined.map_err(|e| SchedulerError::SolveTaskFailed(e.to_string()))??;
        self.finish(network, &session, &model, started)
    }

    // ── Pipeline ──────────────────────────────────────────────────────────────

    fn run(&self, network: &mut Network) -> Result<ScheduleSummary, SchedulerError> {
        let started = Instant::now();
        let Some(session) = self.prepare(network)? else {
            return Ok(self.finish_idle(network, started));
        };
        let model = solve_with_diagnosis(
            self.solver.as_ref(),
            session.problem(),
            &self.control(),
            self.options.diagnose_infeasibility,
        )?;
        self.finish(network, &session, &model, started)
    }

    /// Size, screen and build the constraint set.
    ///
    /// Returns `None` when no port needs solving.
    fn prepare(&self, network: &mut Network) -> Result<Option<SolvingSession>, SchedulerError> {
        network.validate()?;

        if let Some(policy) = self.options.lane_policy {
            let ids: Vec<PortId> = network.ports().iter().filter(|p| !p.is_frozen()).map(|p| p.id).collect();
            for id in ids {
                network.port_mut(id).lane_policy = policy;
            }
        }

        let sizer = CycleSizer::with_limit(self.options.hypercycle_limit_us);
        if let Err((port, source)) = network.size_ports(&sizer) {
            return Err(SchedulerError::Sizing {
                port: network.port(port).name.clone(),
                source,
            });
        }

        if let Some(bottleneck) = feasibility::screen(network, self.options.best_effort_fraction) {
            return Err(SchedulerError::ModelInfeasible { bottleneck });
        }

        let ports: Vec<PortId> = network
            .ports()
            .iter()
            .filter(|p| p.needs_solving())
            .map(|p| p.id)
            .collect();
        if ports.is_empty() {
            return Ok(None);
        }

        let mut session = SolvingSession::new();
        for &port in &ports {
            session.declare_port(network, port);
        }
        let touched: HashSet<PortId> = ports.iter().copied().collect();
        let flows: Vec<_> = network
            .flows()
            .iter()
            .filter(|f| f.fragments.iter().any(|&fr| touched.contains(&network.fragment(fr).port)))
            .map(|f| f.id)
            .collect();
        for &flow in &flows {
            session.declare_flow(network, flow);
        }

        for &port in &ports {
            port_rules::emit_port(&mut session, network, port, &self.options)?;
        }
        network_rules::emit_network(&mut session, network, &self.options)?;
        session.set_objective();

        for &port in &ports {
            network.set_port_state(port, EntityState::Modeled);
        }
        for &flow in &flows {
            network.set_flow_state(flow, EntityState::Modeled);
        }

        info!(
            ports = ports.len(),
            flows = flows.len(),
            variables = session.var_count(),
            constraints = session.constraint_count(),
            "Constraint set assembled"
        );
        Ok(Some(session))
    }

    /// Frozen entities go back to Solved; returns how many ports were frozen.
    fn thaw(network: &mut Network) -> usize {
        let frozen: Vec<PortId> = network.ports().iter().filter(|p| p.is_frozen()).map(|p| p.id).collect();
        for &port in &frozen {
            network.set_port_state(port, EntityState::Solved);
        }
        let flows: Vec<_> = network
            .flows()
            .iter()
            .filter(|f| matches!(f.state, EntityState::Frozen | EntityState::Dirty))
            .map(|f| f.id)
            .collect();
        for flow in flows {
            network.set_flow_state(flow, EntityState::Solved);
        }
        frozen.len()
    }

    fn finish(
        &self,
        network: &mut Network,
        session: &SolvingSession,
        model: &Model,
        started: Instant,
    ) -> Result<ScheduleSummary, SchedulerError> {
        extract::materialize(session, network, model)?;
        let frozen_ports = Self::thaw(network);
        let violations = verify::verify_and_log(network, VERIFY_TOLERANCE);
        let summary = ScheduleSummary {
            solved_ports: session.modeled_ports().len(),
            frozen_ports,
            variables: session.var_count(),
            constraints: session.constraint_count(),
            stats: model.stats(),
            violations,
            elapsed: started.elapsed(),
        };
        info!(
            solved_ports = summary.solved_ports,
            frozen_ports = summary.frozen_ports,
            nodes = summary.stats.nodes,
            violations = summary.violations,
            elapsed_ms = summary.elapsed.as_millis(),
            "=== Scheduling complete ==="
        );
        Ok(summary)
    }

    fn finish_idle(&self, network: &mut Network, started: Instant) -> ScheduleSummary {
        let frozen_ports = Self::thaw(network);
        network.mark_solved();
        info!(frozen_ports, "=== Nothing to schedule ===");
        ScheduleSummary {
            frozen_ports,
            elapsed: started.elapsed(),
            ..Default::default()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceSpec, FlowSpec, Route, SwitchSpec};

    /// d0 ── s0 ── d1, one 10 µs packet every 200 µs.
    fn single_flow() -> Network {
        let mut net = Network::new();
        let d0 = net
            .add_device(DeviceSpec::new("d0").period(200.0).packet_size(1250.0))
            .unwrap();
        let d1 = net.add_device(DeviceSpec::new("d1")).unwrap();
        net.add_switch(SwitchSpec::new("s0").speed(125.0).priority_lanes(1)).unwrap();
        net.connect_by_name("d0", "s0").unwrap();
        net.connect_by_name("s0", "d1").unwrap();
        net.add_flow(FlowSpec::new("f", d0, Route::Destinations(vec![d1])))
            .unwrap();
        net
    }

    #[test]
    fn single_flow_gets_one_slot() {
        let mut net = single_flow();
        let scheduler = NetworkScheduler::with_builtin(SchedulerOptions::default());
        let summary = scheduler.schedule(&mut net).unwrap();
        assert_eq!(summary.violations, 0);

        let port = net.port(net.port_by_name("s0->d1").unwrap());
        assert_eq!(port.state, EntityState::Solved);
        let cycle = port.cycle.solved.as_ref().unwrap();
        let open = cycle.open_slots(1e-6);
        assert_eq!(open.len(), 1);
        assert!(open[0].1.duration >= 10.0 - 1e-6);
    }

    #[test]
    fn empty_network_has_nothing_to_schedule() {
        let mut net = Network::new();
        net.add_switch(SwitchSpec::new("s0")).unwrap();
        let summary = NetworkScheduler::with_builtin(SchedulerOptions::default())
            .schedule(&mut net)
            .unwrap();
        assert_eq!(summary.solved_ports, 0);
    }

    #[test]
    fn incremental_without_solve_is_rejected() {
        let mut net = single_flow();
        let err = NetworkScheduler::with_builtin(SchedulerOptions::default())
            .schedule_incremental(&mut net)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NotSolved));
    }

    #[test]
    fn screening_short_circuits_the_solver() {
        let mut net = single_flow();
        let flow = net.flow_by_name("f").unwrap();
        net.flow_mut(flow).max_latency = Some(1.0);
        let err = NetworkScheduler::with_builtin(SchedulerOptions::default())
            .schedule(&mut net)
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::ModelInfeasible {
                bottleneck: Bottleneck::MinimumLatency { .. }
            }
        ));
    }

    #[test]
    fn diagnosis_names_the_relaxable_group() {
        let mut p = Problem::new();
        let x = p.new_real("x");
        p.assert("transmission", gcl_solver::Formula::ge(x, 10.0));
        p.assert("latency", gcl_solver::Formula::le(x, 5.0));
        let err = solve_with_diagnosis(&BranchingSolver::new(), &p, &SolveControl::unbounded(), true).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::ModelInfeasible {
                bottleneck: Bottleneck::LatencyBudget
            }
        ));
    }
}
