/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Malformed-topology errors.
//!
//! Raised while the model is being built, before any constraint is emitted.
//! A failed `add_*` call leaves the network unchanged.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("unknown switch '{0}'")]
    UnknownSwitch(String),

    /// A name that is neither a device nor a switch.
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    /// Two consecutive nodes of a path are not linked by a port.
    #[error("flow '{flow}': no link from '{from}' to '{to}'")]
    PathGap { flow: String, from: String, to: String },

    /// A path visits the same node twice.
    #[error("flow '{flow}': path visits '{node}' more than once")]
    PathLoop { flow: String, node: String },

    #[error("name '{0}' is already in use")]
    DuplicateName(String),

    #[error("flow '{0}' has no destination")]
    EmptyPath(String),

    #[error("'{name}': period must be positive, got {period}")]
    InvalidPeriod { name: String, period: f64 },

    #[error("flow '{flow}': priority {priority} exceeds the {lanes} lanes of port '{port}'")]
    InvalidPriority {
        flow: String,
        port: String,
        priority: u8,
        lanes: usize,
    },
}
