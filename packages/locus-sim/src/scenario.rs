//! scenario.rs — simulation configuration
//!
//! TOML-loadable description of one demo run: protocol tunables, airspace
//! impairments, and the course the operator walks the reference beacon
//! through. Defaults reproduce the canonical three-waypoint course whose
//! solution is (3, 3) for every listening device.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

use locus_node::ProtocolConfig;

use crate::airspace::AirspaceConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub protocol: ProtocolConfig,
    pub airspace: AirspaceConfig,
    pub course: CourseConfig,
}

impl SimConfig {
    /// Load from a TOML file; a missing file falls back to the built-in
    /// defaults so the demo runs out of the box.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            info!("config {path} not found, using built-in defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {path}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CourseConfig {
    /// Beacon waypoints the operator reports, in order. Three waypoints
    /// give every node exactly its three samples.
    pub waypoints: Vec<[f32; 2]>,
    /// Gaussian jitter (σ, meters) on each reported waypoint; 0 disables.
    pub jitter_sigma_m: f32,
    /// How long the beacon keeps broadcasting at a waypoint, milliseconds.
    pub dwell_ms: u64,
    /// Radio-silent gap between waypoints, milliseconds. Must exceed
    /// `protocol.retry_limit × airspace.rx_timeout_ms` or the ranging
    /// nodes' chord gate never opens.
    pub gap_ms: u64,
    /// Hardware-unique ids of the ranging devices on the course. Each must
    /// be present in the device map.
    pub device_hw_ids: Vec<u32>,
    /// How long estimate broadcasts stay audible to the gateway after the
    /// release, milliseconds. After this window the operator walks off with
    /// the gateway and the aggregation timeout can run out.
    pub collect_window_ms: u64,
    /// How long the operator waits for the collect response, milliseconds.
    pub collect_timeout_ms: u64,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            waypoints: vec![[0.0, 0.0], [6.0, 0.0], [6.0, 6.0]],
            jitter_sigma_m: 0.0,
            dwell_ms: 150,
            // Default protocol retry_limit (1000) × default rx window (5 ms),
            // plus slack.
            gap_ms: 6_000,
            device_hw_ids: vec![0xc3f58103, 0xc4351729, 0xc3f50d8a],
            collect_window_ms: 500,
            collect_timeout_ms: 30_000,
        }
    }
}
