//! demo.rs — full-protocol demo run
//!
//! Spawns one thread per simulated device over the shared airspace, walks
//! the operator script (waypoints, release, collect), and returns the
//! aggregated table the gateway published — the same 60-byte payload a real
//! host collector would read off the peripheral link.
//!
//! Two wirings:
//! - relay (default): the gateway device doubles as the beacon transmitter,
//!   mirroring the deployed two-in-one TX/GW device.
//! - split: a dedicated reference-beacon device broadcasts; the gateway
//!   only floods and aggregates.

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use rand_distr::{Distribution, Normal};
use tracing::{debug, info};

use locus_node::beacon::BeaconRole;
use locus_node::gateway::GatewayRole;
use locus_node::ranging::RangingNode;
use locus_types::{decode_collect, DeviceMap, HostCommand, Position, N_DEVS};

use crate::airspace::Airspace;
use crate::host_bus::{host_bus, OperatorHandle};
use crate::scenario::SimConfig;

/// Grace period for a host command to cross the peripheral link before the
/// script takes its next step.
const COMMAND_SETTLE: Duration = Duration::from_millis(10);

/// Run one localization round; returns the collect table, one slot per
/// device identity.
pub fn run(cfg: &SimConfig, split: bool) -> anyhow::Result<[Position; N_DEVS]> {
    let air = Airspace::new(cfg.airspace.clone());
    let map = DeviceMap::default();

    // Gateway device.
    let gw_radio = air.join();
    let gw_index = gw_radio.index();
    let (gw_operator, gw_port) = host_bus();
    let gw_cfg = cfg.protocol.clone();
    let gw_thread = thread::Builder::new()
        .name("gateway".into())
        .spawn(move || {
            let mut radio = gw_radio;
            let mut port = gw_port;
            let mut role = GatewayRole::new(gw_cfg);
            role.run(&mut radio, &mut port)
        })
        .context("spawning gateway")?;

    // Ranging devices. Identity resolution happens before any radio use;
    // an unmapped hardware id aborts the whole run.
    let mut node_indices = Vec::new();
    for &hw_id in &cfg.course.device_hw_ids {
        let node = RangingNode::new(cfg.protocol.clone(), &map, hw_id)
            .map_err(|e| anyhow!("device 0x{hw_id:08x}: {e}"))?;
        let radio = air.join();
        node_indices.push(radio.index());
        thread::Builder::new()
            .name(format!("node-{:02}", node.identity()))
            .spawn(move || {
                let mut node = node;
                let mut radio = radio;
                match node.run(&mut radio) {
                    Ok(outcome) => debug!(?outcome, "ranging node finished"),
                    Err(e) => debug!(%e, "ranging node stopped"),
                }
            })
            .context("spawning ranging node")?;
    }

    // Optional dedicated beacon device.
    let (beacon_operator, beacon_index, beacon_thread) = if split {
        let radio = air.join();
        let index = radio.index();
        let (operator, port) = host_bus();
        let beacon_cfg = cfg.protocol.clone();
        let handle = thread::Builder::new()
            .name("beacon".into())
            .spawn(move || {
                let mut radio = radio;
                let mut port = port;
                BeaconRole::new(beacon_cfg).run(&mut radio, &mut port)
            })
            .context("spawning beacon")?;
        (Some(operator), index, Some(handle))
    } else {
        (None, gw_index, None)
    };

    // The operator script: report each waypoint, dwell, then carry the
    // beacon out of range long enough for the chord gate to open. The
    // position command must land before the transmitter becomes audible
    // again, or a stale-position frame could slip out at the new waypoint.
    let waypoint_target: &OperatorHandle = beacon_operator.as_ref().unwrap_or(&gw_operator);
    let jitter = waypoint_jitter(cfg.course.jitter_sigma_m);
    for (i, wp) in cfg.course.waypoints.iter().enumerate() {
        let pos = jitter(Position::new(wp[0], wp[1]));
        info!(waypoint = i, x = pos.x, y = pos.y, "operator reports waypoint");
        waypoint_target
            .send(&HostCommand::SetBeacon { pos, scan: i as u8 })
            .map_err(|e| anyhow!("beacon command: {e}"))?;
        thread::sleep(COMMAND_SETTLE);
        air.set_muffled(beacon_index, false);
        thread::sleep(Duration::from_millis(cfg.course.dwell_ms));
        air.set_muffled(beacon_index, true);
        thread::sleep(Duration::from_millis(cfg.course.gap_ms));
    }
    air.set_muffled(beacon_index, false);

    // Release everything and leave the estimate broadcasts audible for the
    // collection window. Solved nodes announce forever, so the gateway's
    // aggregation timeout can only run out once they fall silent: muffling
    // them stands in for the operator walking off with the gateway.
    if let Some(op) = &beacon_operator {
        op.send(&HostCommand::GatewayStart).map_err(|e| anyhow!("beacon release: {e}"))?;
    }
    gw_operator.send(&HostCommand::GatewayStart).map_err(|e| anyhow!("gateway start: {e}"))?;
    thread::sleep(Duration::from_millis(cfg.course.collect_window_ms));
    for &index in &node_indices {
        air.set_muffled(index, true);
    }
    gw_operator.send(&HostCommand::Collect).map_err(|e| anyhow!("collect request: {e}"))?;

    let response = gw_operator
        .read_response(Duration::from_millis(cfg.course.collect_timeout_ms))
        .map_err(|e| anyhow!("collect response: {e}"))?
        .ok_or_else(|| anyhow!("gateway did not answer the collect request in time"))?;
    let slots = decode_collect(&response).context("decoding collect response")?;

    // Wind the world down; detached node threads observe the closed link.
    air.shutdown();
    if let Err(e) = gw_thread.join().map_err(|_| anyhow!("gateway thread panicked"))? {
        return Err(anyhow!("gateway failed: {e}"));
    }
    if let Some(handle) = beacon_thread {
        if let Err(e) = handle.join().map_err(|_| anyhow!("beacon thread panicked"))? {
            return Err(anyhow!("beacon failed: {e}"));
        }
    }

    Ok(slots)
}

/// Waypoint jitter: the operator's position fix is itself noisy.
fn waypoint_jitter(sigma_m: f32) -> impl Fn(Position) -> Position {
    let normal = (sigma_m > 0.0).then(|| Normal::new(0.0f32, sigma_m).expect("valid sigma"));
    move |p: Position| match normal {
        Some(n) => {
            let mut rng = rand::thread_rng();
            Position::new(p.x + n.sample(&mut rng), p.y + n.sample(&mut rng))
        }
        None => p,
    }
}

/// Render the table the way the deployed host tool prints it.
pub fn render_table(slots: &[Position; N_DEVS]) -> String {
    let mut out = String::new();
    for (id, pos) in slots.iter().enumerate() {
        if pos.is_empty() {
            out.push_str(&format!("ID={id} Estimated=No data\n"));
        } else {
            out.push_str(&format!("ID={id} Estimated=({:.2}, {:.2})\n", pos.x, pos.y));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airspace::AirspaceConfig;
    use crate::scenario::CourseConfig;
    use locus_node::{ProtocolConfig, SignMode};

    /// A configuration fast enough for CI: millisecond receive windows and
    /// a gate that opens after five quiet windows.
    fn fast_cfg(n_devices: usize) -> SimConfig {
        SimConfig {
            protocol: ProtocolConfig {
                threshold_m: 5.0,
                retry_limit: 5,
                flood_count: 50,
                listen_abort_limit: 100_000,
                sign_mode: SignMode::ForcePositive,
            },
            airspace: AirspaceConfig {
                loss_rate: 0.0,
                error_rate: 0.0,
                rx_timeout_ms: 1,
                air_time_us: 200,
                seed: None,
            },
            course: CourseConfig {
                waypoints: vec![[0.0, 0.0], [6.0, 0.0], [6.0, 6.0]],
                jitter_sigma_m: 0.0,
                dwell_ms: 40,
                gap_ms: 40,
                device_hw_ids: vec![0xc3f58103, 0xc4351729, 0xc3f50d8a][..n_devices].to_vec(),
                collect_window_ms: 50,
                collect_timeout_ms: 20_000,
            },
        }
    }

    #[test]
    fn relay_round_localizes_every_device() {
        let slots = run(&fast_cfg(3), false).unwrap();
        for id in 0..3 {
            assert_eq!(slots[id], Position::new(3.0, 3.0), "identity {id}");
        }
        for id in 3..N_DEVS {
            assert!(slots[id].is_empty(), "identity {id} should have no data");
        }
    }

    #[test]
    fn split_round_exercises_the_dedicated_beacon() {
        let slots = run(&fast_cfg(2), true).unwrap();
        assert_eq!(slots[0], Position::new(3.0, 3.0));
        assert_eq!(slots[1], Position::new(3.0, 3.0));
        assert!(slots[2].is_empty());
    }

    #[test]
    fn lossy_airspace_still_converges() {
        let mut cfg = fast_cfg(3);
        cfg.airspace.loss_rate = 0.2;
        cfg.airspace.error_rate = 0.05;
        cfg.airspace.seed = Some(0x10c5);
        // The gate must demand a longer quiet run than a loss streak can
        // fake, while the inter-waypoint gap still dwarfs it.
        cfg.protocol.retry_limit = 12;
        cfg.course.dwell_ms = 60;

        let slots = run(&cfg, false).unwrap();
        for id in 0..3 {
            assert_eq!(slots[id], Position::new(3.0, 3.0), "identity {id}");
        }
    }

    #[test]
    fn unknown_device_id_aborts_before_any_radio_traffic() {
        let mut cfg = fast_cfg(1);
        cfg.course.device_hw_ids = vec![0x12345678];
        let err = run(&cfg, false).unwrap_err();
        assert!(err.to_string().contains("0x12345678"));
    }

    #[test]
    fn renders_the_host_tool_format() {
        let mut slots = [Position::default(); N_DEVS];
        slots[0] = Position::new(3.0, 3.0);
        let text = render_table(&slots);
        assert!(text.starts_with("ID=0 Estimated=(3.00, 3.00)\n"));
        assert!(text.contains("ID=9 Estimated=No data"));
    }
}
