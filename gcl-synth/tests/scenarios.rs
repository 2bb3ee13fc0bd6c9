/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! End-to-end scheduling runs against the built-in solver.

use std::time::Duration;

use gcl_solver::SolverError;
use gcl_synth::hyperperiod::{CycleSizer, SizingPolicy};
use gcl_synth::model::{DeviceSpec, EntityState, FlowSpec, Network, Route, SwitchSpec};
use gcl_synth::schedule::ScheduleReport;
use gcl_synth::scheduler::{
    verify, Bottleneck, NetworkScheduler, SchedulerError, SchedulerOptions,
};

const TOL: f64 = 1e-5;

fn scheduler() -> NetworkScheduler {
    NetworkScheduler::with_builtin(SchedulerOptions::default())
}

/// `talkers` ── s0 ── d1, 125 B/µs, 2 µs links, 1250 B every 200 µs.
fn star(talkers: &[&str], lanes: usize) -> Network {
    let mut net = Network::new();
    let d1 = net.add_device(DeviceSpec::new("d1")).unwrap();
    net.add_switch(SwitchSpec::new("s0").speed(125.0).propagation_delay(2.0).priority_lanes(lanes))
        .unwrap();
    net.connect_by_name("s0", "d1").unwrap();
    for (i, name) in talkers.iter().enumerate() {
        let d = net
            .add_device(DeviceSpec::new(*name).period(200.0).packet_size(1250.0))
            .unwrap();
        net.connect_by_name(name, "s0").unwrap();
        net.add_flow(FlowSpec::new(format!("f{i}"), d, Route::Destinations(vec![d1])))
            .unwrap();
    }
    net
}

/// Wire windows `(start, end)` of every packet leaving `port`.
fn windows(net: &Network, port: &str) -> Vec<(f64, f64)> {
    let p = net.port(net.port_by_name(port).unwrap());
    p.fragments
        .iter()
        .flat_map(|&f| {
            let frag = net.fragment(f);
            let t = frag.solved.clone().unwrap();
            let tx = p.transmission_time(frag.packet_size);
            t.scheduled.into_iter().map(move |s| (s - tx, s))
        })
        .collect()
}

#[test]
fn single_unicast_flow_gets_a_ten_microsecond_slot() {
    let mut net = star(&["d0"], 1);
    let summary = scheduler().schedule(&mut net).unwrap();
    assert_eq!(summary.violations, 0);

    let port = net.port(net.port_by_name("s0->d1").unwrap());
    assert_eq!(port.state, EntityState::Solved);
    let open = port.cycle.solved.as_ref().unwrap().open_slots(TOL);
    assert_eq!(open.len(), 1);
    assert!(open[0].1.duration >= 10.0 - TOL);
    assert!(verify(&net, TOL).is_empty());
}

#[test]
fn three_flows_to_one_destination_never_overlap() {
    let mut net = star(&["d0", "d2", "d3"], 2);
    scheduler().schedule(&mut net).unwrap();
    assert!(verify(&net, TOL).is_empty());

    let w = windows(&net, "s0->d1");
    assert_eq!(w.len(), 3);
    for (i, a) in w.iter().enumerate() {
        for b in &w[i + 1..] {
            assert!(a.1 <= b.0 + TOL || b.1 <= a.0 + TOL, "{a:?} overlaps {b:?}");
        }
    }
    let port = net.port_by_name("s0->d1").unwrap();
    for &f in &net.port(port).fragments {
        let prio = net.fragment(f).solved.as_ref().unwrap().priority;
        assert!(usize::from(prio) < 2);
    }
}

#[test]
fn multicast_leaves_meet_their_own_budgets() {
    let mut net = Network::new();
    let d0 = net
        .add_device(DeviceSpec::new("d0").period(200.0).packet_size(125.0))
        .unwrap();
    let d1 = net.add_device(DeviceSpec::new("d1")).unwrap();
    let d2 = net.add_device(DeviceSpec::new("d2")).unwrap();
    for s in ["s0", "s1", "s2"] {
        net.add_switch(SwitchSpec::new(s).speed(125.0).propagation_delay(1.0).priority_lanes(1))
            .unwrap();
    }
    for (a, b) in [("d0", "s0"), ("s0", "s1"), ("s0", "s2"), ("s1", "d1"), ("s2", "d2")] {
        net.connect_by_name(a, b).unwrap();
    }
    let flow = net
        .add_flow(
            FlowSpec::new("mc", d0, Route::Destinations(vec![d1, d2]))
                .max_latency(50.0)
                .max_jitter(5.0),
        )
        .unwrap();
    assert_eq!(net.flow(flow).fragments.len(), 4);

    scheduler().schedule(&mut net).unwrap();
    let stats = &net.flow(flow).stats;
    assert_eq!(stats.len(), 2);
    let mut destinations: Vec<_> = stats.iter().map(|s| s.destination).collect();
    destinations.sort();
    assert_eq!(destinations, vec![d1, d2]);
    for leaf in stats {
        assert!(leaf.average_latency >= 4.0 - TOL);
        assert!(leaf.average_latency <= 50.0 + TOL);
        assert!(leaf.jitter <= 5.0 + TOL);
    }
    assert!(verify(&net, TOL).is_empty());
}

#[test]
fn microcycle_sizing_of_mixed_periods() {
    let mut net = Network::new();
    let d1 = net.add_device(DeviceSpec::new("d1")).unwrap();
    net.add_switch(
        SwitchSpec::new("s0")
            .speed(125.0)
            .sizing(SizingPolicy::Microcycle)
            .priority_lanes(1),
    )
    .unwrap();
    net.connect_by_name("s0", "d1").unwrap();
    for (name, period) in [("a", 1000.0), ("b", 1500.0)] {
        let d = net
            .add_device(DeviceSpec::new(name).period(period).packet_size(125.0))
            .unwrap();
        net.connect_by_name(name, "s0").unwrap();
        net.add_flow(FlowSpec::new(name, d, Route::Destinations(vec![d1])))
            .unwrap();
    }
    net.size_ports(&CycleSizer::new()).unwrap();

    let port = net.port(net.port_by_name("s0->d1").unwrap());
    let sizing = port.cycle.sizing.as_ref().unwrap();
    assert_eq!(sizing.cycle_duration_us, 500.0);
    assert_eq!(sizing.hypercycle_us, 3000.0);
    assert_eq!(sizing.repetitions, 6);
    let counts: Vec<usize> = port
        .fragments
        .iter()
        .map(|&f| net.fragment(f).packet_count)
        .collect();
    assert_eq!(counts, vec![3, 2]);
}

#[test]
fn same_lane_packets_leave_in_arrival_order() {
    // d0 sends at 0, d2 at 5: d2's packet must wait for d0's
    let mut net = Network::new();
    let d1 = net.add_device(DeviceSpec::new("d1")).unwrap();
    let d0 = net
        .add_device(DeviceSpec::new("d0").period(200.0).packet_size(1250.0).first_send(0.0))
        .unwrap();
    let d2 = net
        .add_device(DeviceSpec::new("d2").period(200.0).packet_size(1250.0).first_send(5.0))
        .unwrap();
    net.add_switch(SwitchSpec::new("s0").speed(125.0).priority_lanes(1))
        .unwrap();
    for (a, b) in [("d0", "s0"), ("d2", "s0"), ("s0", "d1")] {
        net.connect_by_name(a, b).unwrap();
    }
    let first = net
        .add_flow(FlowSpec::new("first", d0, Route::Destinations(vec![d1])))
        .unwrap();
    let second = net
        .add_flow(FlowSpec::new("second", d2, Route::Destinations(vec![d1])))
        .unwrap();

    scheduler().schedule(&mut net).unwrap();
    assert!(verify(&net, TOL).is_empty());
    let sched = |f| net.fragment(net.flow(f).fragments[0]).solved.as_ref().unwrap().scheduled[0];
    assert!(sched(first) <= sched(second) - 10.0 + TOL);
}

#[test]
fn tight_latency_budget_is_reported_as_the_bottleneck() {
    // both packets arrive at 0; whichever goes second needs 20 µs
    let mut net = Network::new();
    let d1 = net.add_device(DeviceSpec::new("d1")).unwrap();
    net.add_switch(SwitchSpec::new("s0").speed(125.0).priority_lanes(1))
        .unwrap();
    net.connect_by_name("s0", "d1").unwrap();
    for name in ["d0", "d2"] {
        let d = net
            .add_device(
                DeviceSpec::new(name)
                    .period(200.0)
                    .packet_size(1250.0)
                    .first_send(0.0)
                    .hard_latency(15.0),
            )
            .unwrap();
        net.connect_by_name(name, "s0").unwrap();
        net.add_flow(FlowSpec::new(name, d, Route::Destinations(vec![d1])))
            .unwrap();
    }

    let err = scheduler().schedule(&mut net).unwrap_err();
    assert!(
        matches!(
            err,
            SchedulerError::ModelInfeasible {
                bottleneck: Bottleneck::LatencyBudget
            }
        ),
        "{err}"
    );
    assert!(!net.is_solved());
}

#[test]
fn latency_budget_holds_for_every_packet() {
    let mut net = Network::new();
    let d1 = net.add_device(DeviceSpec::new("d1")).unwrap();
    net.add_switch(SwitchSpec::new("s0").speed(125.0).propagation_delay(2.0).priority_lanes(1))
        .unwrap();
    net.connect_by_name("s0", "d1").unwrap();
    for name in ["d0", "d2"] {
        let d = net
            .add_device(DeviceSpec::new(name).period(100.0).packet_size(1250.0).hard_latency(40.0))
            .unwrap();
        net.connect_by_name(name, "s0").unwrap();
        net.add_flow(FlowSpec::new(name, d, Route::Destinations(vec![d1])))
            .unwrap();
    }

    scheduler().schedule(&mut net).unwrap();
    for flow in net.flows() {
        assert_eq!(flow.max_latency, Some(40.0));
        for leaf in &flow.stats {
            for &l in &leaf.latencies {
                assert!((12.0 - TOL..=40.0 + TOL).contains(&l), "{}: latency {l}", flow.name);
            }
        }
    }
    assert!(verify(&net, TOL).is_empty());
}

#[test]
fn report_round_trips_through_yaml() {
    let mut net = star(&["d0", "d2"], 2);
    scheduler().schedule(&mut net).unwrap();
    let report = ScheduleReport::from_network(&net, true);
    assert!(!report.slot_tuples().is_empty());
    assert_eq!(report.flow("f0").unwrap().hops.len(), 1);

    let back = ScheduleReport::from_yaml(&report.to_yaml().unwrap()).unwrap();
    assert_eq!(back.slot_tuples(), report.slot_tuples());
    assert_eq!(back, report);
}

#[test]
fn zero_timeout_gives_up_before_a_verdict() {
    let mut net = star(&["d0"], 1);
    let options = SchedulerOptions {
        timeout: Some(Duration::ZERO),
        ..SchedulerOptions::default()
    };
    let err = NetworkScheduler::with_builtin(options)
        .schedule(&mut net)
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Solver(SolverError::Timeout { .. })), "{err}");
}

#[tokio::test]
async fn async_schedule_solves_on_a_worker() {
    let mut net = star(&["d0"], 1);
    let summary = scheduler().schedule_async(&mut net).await.unwrap();
    assert_eq!(summary.solved_ports, net.ports().iter().filter(|p| p.cycle.is_solved()).count());
    assert!(verify(&net, TOL).is_empty());
}

#[tokio::test]
async fn async_schedule_times_out() {
    let mut net = star(&["d0", "d2"], 1);
    let options = SchedulerOptions {
        timeout: Some(Duration::ZERO),
        ..SchedulerOptions::default()
    };
    let err = NetworkScheduler::with_builtin(options)
        .schedule_async(&mut net)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Solver(SolverError::Timeout { .. })), "{err}");
}
