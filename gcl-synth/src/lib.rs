/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! gcl-synth – gate-control list synthesis for time-aware switched networks
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── units/         – unit-suffixed times, sizes and speeds
//! ├── hyperperiod/   – LCM / GCD helpers and cycle sizing
//! ├── model/         – devices, switches, ports, flows, fragments
//! ├── scheduler/     – constraint emission, solve, materialisation
//! ├── incremental/   – edits to an already solved network
//! ├── schedule/      – persistable schedule report
//! └── config/        – YAML network descriptions
//! ```

pub mod config;
pub mod hyperperiod;
pub mod incremental;
pub mod model;
pub mod schedule;
pub mod scheduler;
pub mod units;
