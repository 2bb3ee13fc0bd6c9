/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The network model: devices, switches, ports, flows and their fragments.
//!
//! All entities live in arenas owned by [`Network`] and are addressed by
//! typed ids issued by it.  Nothing in the model holds solver state; the
//! concrete (solved) values stored here are plain numbers and can be
//! persisted or reported at any time.

pub mod cycle;
pub mod device;
pub mod error;
pub mod flow;
pub mod fragment;
pub mod network;
pub mod path;
pub mod port;
pub mod switch;

pub use cycle::{Cycle, Slot, SolvedCycle};
pub use device::{Device, DeviceSpec};
pub use error::ModelError;
pub use flow::{Flow, FlowEdit, FlowSpec, Hop, LeafStats, Route};
pub use fragment::{FlowFragment, FragmentTiming};
pub use network::Network;
pub use path::{PathNode, PathTree};
pub use port::{Port, PortSpec, ResetPolicy};
pub use switch::{Switch, SwitchSpec};

use serde::{Deserialize, Serialize};

// ── Ids ───────────────────────────────────────────────────────────────────────

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// End device (talker / listener).
    DeviceId,
    "device"
);
arena_id!(SwitchId, "switch");
arena_id!(
    /// Egress port of a switch.
    PortId,
    "port"
);
arena_id!(FlowId, "flow");
arena_id!(
    /// One flow's hop through one egress port.
    FragmentId,
    "fragment"
);
arena_id!(
    /// Node inside a single flow's [`PathTree`].
    PathNodeId,
    "path-node"
);

/// A vertex of the topology graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRef {
    Device(DeviceId),
    Switch(SwitchId),
}

impl NodeRef {
    pub fn as_switch(self) -> Option<SwitchId> {
        match self {
            NodeRef::Switch(s) => Some(s),
            NodeRef::Device(_) => None,
        }
    }

    pub fn as_device(self) -> Option<DeviceId> {
        match self {
            NodeRef::Device(d) => Some(d),
            NodeRef::Switch(_) => None,
        }
    }

    pub fn is_device(self) -> bool {
        matches!(self, NodeRef::Device(_))
    }
}

// ── Entity state ──────────────────────────────────────────────────────────────

/// Where an entity's timing values are in their lifecycle.
///
/// ```text
/// Unbound ──► Modeled ──► Solved ──► Dirty ──► Modeled ──► Solved
///                            │                    ▲
///                            └──► Frozen ─────────┘ (constants only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityState {
    /// No constraints emitted yet.
    #[default]
    Unbound,
    /// Constraints emitted into the current solving session.
    Modeled,
    /// Concrete values materialised from a model.
    Solved,
    /// Concrete values cleared by an edit; must be re-solved.
    Dirty,
    /// Concrete values kept and fed to the solver as constants.
    Frozen,
}

impl EntityState {
    /// `true` when concrete values are present and authoritative.
    pub fn has_values(self) -> bool {
        matches!(self, EntityState::Solved | EntityState::Frozen)
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityState::Unbound => "unbound",
            EntityState::Modeled => "modeled",
            EntityState::Solved => "solved",
            EntityState::Dirty => "dirty",
            EntityState::Frozen => "frozen",
        };
        f.write_str(s)
    }
}
