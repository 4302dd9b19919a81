//! airspace.rs — shared in-process radio medium
//!
//! Every device that joins the airspace gets a [`SimRadio`] endpoint whose
//! blocking semantics match the hardware the protocol core was written
//! against: `transmit` returns after the frame's airtime, `receive` blocks
//! until a delivery, a reception error, or the receive window elapses.
//!
//! The medium models the two impairments the protocol must survive:
//! probabilistic frame loss and reception errors. A transmitter can also be
//! "muffled" — its frames still leave the antenna but reach nobody — which
//! is how the demo reproduces the reference beacon moving out of range
//! between waypoints.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::debug;

use locus_node::link::{LinkError, RadioLink, RxOutcome};
use locus_types::MAX_FRAME_LEN;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AirspaceConfig {
    /// Probability that any single delivery is lost on the air.
    pub loss_rate: f64,
    /// Probability that a delivery arrives as a reception error instead of
    /// a frame.
    pub error_rate: f64,
    /// Receive window before the radio reports a timeout, milliseconds.
    pub rx_timeout_ms: u64,
    /// Per-frame airtime: how long a blocking transmit takes, microseconds.
    pub air_time_us: u64,
    /// Seed for the loss/garble draws. `None` seeds from entropy; set it to
    /// make a run's impairment pattern reproducible.
    pub seed: Option<u64>,
}

impl Default for AirspaceConfig {
    fn default() -> Self {
        Self { loss_rate: 0.0, error_rate: 0.0, rx_timeout_ms: 5, air_time_us: 100, seed: None }
    }
}

// ── Medium ────────────────────────────────────────────────────────────────────

enum Delivery {
    Frame(Vec<u8>),
    Garbled,
}

struct Shared {
    endpoints: Vec<Sender<Delivery>>,
    muffled: Vec<bool>,
    closed: bool,
    rng: StdRng,
}

/// The shared medium. Clone-cheap handle; joins hand out endpoints.
#[derive(Clone)]
pub struct Airspace {
    cfg: AirspaceConfig,
    shared: Arc<Mutex<Shared>>,
}

impl Airspace {
    pub fn new(cfg: AirspaceConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            cfg,
            shared: Arc::new(Mutex::new(Shared {
                endpoints: Vec::new(),
                muffled: Vec::new(),
                closed: false,
                rng,
            })),
        }
    }

    /// Add a device to the medium.
    pub fn join(&self) -> SimRadio {
        let (tx, rx) = mpsc::channel();
        let mut shared = self.shared.lock().expect("airspace lock");
        shared.endpoints.push(tx);
        shared.muffled.push(false);
        SimRadio {
            index: shared.endpoints.len() - 1,
            cfg: self.cfg.clone(),
            shared: self.shared.clone(),
            rx,
        }
    }

    /// Mute or restore one transmitter's reach (beacon out of range).
    pub fn set_muffled(&self, index: usize, muffled: bool) {
        let mut shared = self.shared.lock().expect("airspace lock");
        if let Some(slot) = shared.muffled.get_mut(index) {
            *slot = muffled;
        }
    }

    /// Tear the medium down: every blocked receive and every further
    /// transmit observes a closed link, so detached device threads exit.
    pub fn shutdown(&self) {
        let mut shared = self.shared.lock().expect("airspace lock");
        shared.closed = true;
        shared.endpoints.clear();
    }
}

/// One device's radio endpoint.
pub struct SimRadio {
    index: usize,
    cfg: AirspaceConfig,
    shared: Arc<Mutex<Shared>>,
    rx: Receiver<Delivery>,
}

impl SimRadio {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl RadioLink for SimRadio {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        // Airtime first: transmission-complete only after the frame is out.
        std::thread::sleep(Duration::from_micros(self.cfg.air_time_us));

        let mut guard = self.shared.lock().expect("airspace lock");
        let shared = &mut *guard;
        if shared.closed {
            return Err(LinkError::Closed);
        }
        if shared.muffled[self.index] {
            debug!(from = self.index, "frame transmitted out of range");
            return Ok(());
        }

        for (i, endpoint) in shared.endpoints.iter().enumerate() {
            if i == self.index {
                continue;
            }
            if self.cfg.loss_rate > 0.0 && shared.rng.gen_bool(self.cfg.loss_rate) {
                continue;
            }
            let delivery = if self.cfg.error_rate > 0.0 && shared.rng.gen_bool(self.cfg.error_rate)
            {
                Delivery::Garbled
            } else {
                Delivery::Frame(frame.to_vec())
            };
            // A receiver that has gone away is not the transmitter's problem.
            let _ = endpoint.send(delivery);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8; MAX_FRAME_LEN]) -> Result<RxOutcome, LinkError> {
        match self.rx.recv_timeout(Duration::from_millis(self.cfg.rx_timeout_ms)) {
            Ok(Delivery::Frame(bytes)) => {
                let n = bytes.len().min(MAX_FRAME_LEN);
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(RxOutcome::Frame(bytes.len()))
            }
            Ok(Delivery::Garbled) => Ok(RxOutcome::Error),
            Err(RecvTimeoutError::Timeout) => Ok(RxOutcome::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_node::link::send_frame;
    use locus_types::{Position, RadioFrame};

    fn fast() -> AirspaceConfig {
        AirspaceConfig { rx_timeout_ms: 1, air_time_us: 1, ..AirspaceConfig::default() }
    }

    #[test]
    fn frames_reach_every_other_endpoint() {
        let air = Airspace::new(fast());
        let mut a = air.join();
        let mut b = air.join();
        let mut c = air.join();

        let frame = RadioFrame::Beacon { pos: Position::new(1.0, 2.0), scan: 0 };
        send_frame(&mut a, &frame).unwrap();

        let mut buf = [0u8; MAX_FRAME_LEN];
        for radio in [&mut b, &mut c] {
            match radio.receive(&mut buf).unwrap() {
                RxOutcome::Frame(len) => {
                    assert_eq!(RadioFrame::decode(&buf[..len]), Ok(frame));
                }
                other => panic!("expected a frame, got {other:?}"),
            }
        }
        // No self-delivery.
        assert_eq!(a.receive(&mut buf).unwrap(), RxOutcome::TimedOut);
    }

    #[test]
    fn muffled_transmitter_reaches_nobody() {
        let air = Airspace::new(fast());
        let mut a = air.join();
        let mut b = air.join();

        air.set_muffled(a.index(), true);
        send_frame(&mut a, &RadioFrame::Release).unwrap();
        let mut buf = [0u8; MAX_FRAME_LEN];
        assert_eq!(b.receive(&mut buf).unwrap(), RxOutcome::TimedOut);

        air.set_muffled(a.index(), false);
        send_frame(&mut a, &RadioFrame::Release).unwrap();
        assert!(matches!(b.receive(&mut buf).unwrap(), RxOutcome::Frame(_)));
    }

    #[test]
    fn shutdown_closes_both_directions() {
        let air = Airspace::new(fast());
        let mut a = air.join();
        let mut b = air.join();

        air.shutdown();
        assert!(matches!(a.transmit(&[0xCC]), Err(LinkError::Closed)));
        let mut buf = [0u8; MAX_FRAME_LEN];
        assert!(matches!(b.receive(&mut buf), Err(LinkError::Closed)));
    }

    #[test]
    fn seeded_airspace_reproduces_its_loss_pattern() {
        let deliveries = |seed: u64| {
            let air = Airspace::new(AirspaceConfig { loss_rate: 0.5, seed: Some(seed), ..fast() });
            let mut a = air.join();
            let mut b = air.join();
            let mut buf = [0u8; MAX_FRAME_LEN];
            (0..32)
                .map(|_| {
                    send_frame(&mut a, &RadioFrame::Release).unwrap();
                    matches!(b.receive(&mut buf).unwrap(), RxOutcome::Frame(_))
                })
                .collect::<Vec<bool>>()
        };

        let pattern = deliveries(7);
        assert_eq!(pattern, deliveries(7));
        assert_ne!(pattern, deliveries(8));
    }

    #[test]
    fn total_loss_looks_like_silence() {
        let air = Airspace::new(AirspaceConfig { loss_rate: 1.0, ..fast() });
        let mut a = air.join();
        let mut b = air.join();

        send_frame(&mut a, &RadioFrame::Release).unwrap();
        let mut buf = [0u8; MAX_FRAME_LEN];
        assert_eq!(b.receive(&mut buf).unwrap(), RxOutcome::TimedOut);
    }
}
