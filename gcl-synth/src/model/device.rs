/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use super::DeviceId;

/// Parameters of a new end device.  Times in µs, sizes in bytes.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub name: String,
    /// Default sending period for flows sourced here.
    pub period: f64,
    /// Default packet size for flows sourced here.
    pub packet_size: f64,
    /// Fixed first-send offset; `None` lets the solver choose.
    pub first_send: Option<f64>,
    /// Default latency budget for flows sourced here.
    pub hard_latency: Option<f64>,
}

impl DeviceSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            period: 0.0,
            packet_size: 0.0,
            first_send: None,
            hard_latency: None,
        }
    }

    pub fn period(mut self, period: f64) -> Self {
        self.period = period;
        self
    }

    pub fn packet_size(mut self, size: f64) -> Self {
        self.packet_size = size;
        self
    }

    pub fn first_send(mut self, offset: f64) -> Self {
        self.first_send = Some(offset);
        self
    }

    pub fn hard_latency(mut self, latency: f64) -> Self {
        self.hard_latency = Some(latency);
        self
    }
}

/// An end device (talker or listener).
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub period: f64,
    pub packet_size: f64,
    pub first_send: Option<f64>,
    pub hard_latency: Option<f64>,
}

impl Device {
    pub(crate) fn from_spec(id: DeviceId, spec: DeviceSpec) -> Self {
        Self {
            id,
            name: spec.name,
            period: spec.period,
            packet_size: spec.packet_size,
            first_send: spec.first_send,
            hard_latency: spec.hard_latency,
        }
    }
}
