//! Ranging node role — the stationary device that localizes itself.
//!
//! The node listens for beacon broadcasts and accumulates three samples of
//! the beacon's position. Consecutive samples must be separated by at least
//! the configured chord length; the beacon has no way to signal "I have
//! moved", so the separation between sample 0 and sample 1 is inferred from
//! radio silence: a long run of receive timeouts means the operator has
//! carried the beacon out of range (or paused it), and the most recently
//! seen position is then re-checked against the chord gate. With three
//! samples the node solves for its own position and announces the estimate
//! forever, tagged with its device identity.

use locus_types::{DeviceMap, Position, RadioFrame, WireError, MAX_FRAME_LEN};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ProtocolConfig;
use crate::link::{send_frame, LinkError, RadioLink, RxOutcome};
use crate::solver::{self, SolveError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangingState {
    /// Accumulating beacon samples.
    Listening,
    /// Three samples collected, invoking the solver.
    Solving,
    /// Announcing the estimate. Terminal in normal operation; the device is
    /// power-cycled to re-run localization.
    Transmitting,
    /// The solver could not resolve a position. Terminal: the device stops
    /// producing protocol output rather than emit a corrupted estimate.
    Halted,
}

/// How a listening phase ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListenOutcome {
    /// Three gated samples collected, in acceptance order.
    Acquired([Position; 3]),
    /// A release frame arrived before localization completed; the cycle is
    /// abandoned and the sample slots reset.
    Released,
}

#[derive(Debug, Error)]
pub enum RangingError {
    /// Fatal for this cycle: no estimate is ever transmitted.
    #[error("solver failed: {0}")]
    Solve(#[from] SolveError),
    /// The listening phase made no progress within its bound.
    #[error("listening window exhausted with no usable beacon")]
    Timeout,
    #[error(transparent)]
    Link(#[from] LinkError),
}

#[derive(Debug)]
pub struct RangingNode {
    cfg: ProtocolConfig,
    id: u8,
    state: RangingState,
    estimate: Option<Position>,
}

impl RangingNode {
    /// Build the role for the device with the given hardware-unique id.
    /// An id missing from the map is a configuration error: the node
    /// refuses to start and must perform no radio activity.
    pub fn new(cfg: ProtocolConfig, map: &DeviceMap, hw_id: u32) -> Result<Self, WireError> {
        let id = map.identity(hw_id)?;
        info!(hw_id = format_args!("0x{hw_id:08x}"), id, "ranging node identity resolved");
        Ok(Self { cfg, id, state: RangingState::Listening, estimate: None })
    }

    pub fn state(&self) -> RangingState {
        self.state
    }

    pub fn identity(&self) -> u8 {
        self.id
    }

    /// The resolved estimate, once Solving has succeeded.
    pub fn estimate(&self) -> Option<Position> {
        self.estimate
    }

    /// Run one localization cycle to its end: listen, solve, then announce
    /// the estimate until the link goes away. Returns `Ok(Released)` when a
    /// release frame cut the cycle short.
    pub fn run<R: RadioLink>(&mut self, radio: &mut R) -> Result<ListenOutcome, RangingError> {
        self.state = RangingState::Listening;
        self.estimate = None;

        let samples = match self.listen(radio)? {
            ListenOutcome::Released => {
                info!("release observed while listening, cycle abandoned");
                return Ok(ListenOutcome::Released);
            }
            ListenOutcome::Acquired(samples) => samples,
        };

        self.state = RangingState::Solving;
        let est = match solver::solve(&samples, self.cfg.sign_mode) {
            Ok(est) => est,
            Err(e) => {
                self.state = RangingState::Halted;
                error!(%e, "halting without an estimate");
                return Err(e.into());
            }
        };
        info!(x = est.x, y = est.y, "position resolved");
        self.estimate = Some(est);

        self.state = RangingState::Transmitting;
        loop {
            send_frame(radio, &RadioFrame::Estimate { pos: est, id: self.id })?;
        }
    }

    /// The listening phase: fill the three sample slots in order, applying
    /// the chord gate, until acquired, released, or out of patience.
    fn listen<R: RadioLink>(&mut self, radio: &mut R) -> Result<ListenOutcome, RangingError> {
        let mut slots: [Option<Position>; 3] = [None; 3];
        // Most recently seen beacon position since the last accepted sample;
        // only promoted to slot 1 after a quiet window passes the gate.
        let mut candidate: Option<Position> = None;
        // Consecutive receive timeouts since the last successful reception.
        let mut idle: u32 = 0;
        let mut buf = [0u8; MAX_FRAME_LEN];

        loop {
            match radio.receive(&mut buf)? {
                RxOutcome::Frame(len) => {
                    // Any successful reception ends the quiet window, even
                    // one that is then dropped.
                    idle = 0;
                    if len > MAX_FRAME_LEN {
                        debug!(len, "oversized frame dropped");
                        continue;
                    }
                    let frame = match RadioFrame::decode(&buf[..len]) {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!(%e, "frame dropped");
                            continue;
                        }
                    };
                    match frame {
                        RadioFrame::Beacon { pos, .. } => {
                            self.consider(&mut slots, &mut candidate, pos);
                            if let [Some(s0), Some(s1), Some(s2)] = slots {
                                return Ok(ListenOutcome::Acquired([s0, s1, s2]));
                            }
                        }
                        RadioFrame::Release => return Ok(ListenOutcome::Released),
                        // Another node already transmitting its estimate.
                        RadioFrame::Estimate { .. } => {}
                    }
                }
                RxOutcome::TimedOut => {
                    idle += 1;
                    if slots[0].is_some() && slots[1].is_none() && idle > self.cfg.retry_limit {
                        if let Some(cand) = candidate.take() {
                            let s0 = slots[0].expect("slot 0 filled");
                            let chord = cand.distance_to(&s0);
                            if chord >= self.cfg.threshold_m {
                                info!(chord, "sample 1 accepted after quiet window");
                                slots[1] = Some(cand);
                                idle = 0;
                            } else {
                                debug!(chord, "chord below threshold, candidate discarded");
                            }
                        }
                    }
                    if idle >= self.cfg.listen_abort_limit {
                        warn!(idle, "listening abort bound reached");
                        self.state = RangingState::Halted;
                        return Err(RangingError::Timeout);
                    }
                }
                // Cleared by the radio; neither advances nor resets the
                // quiet-window counter.
                RxOutcome::Error => {}
            }
        }
    }

    /// Slot-acceptance policy for one received beacon position.
    fn consider(
        &self,
        slots: &mut [Option<Position>; 3],
        candidate: &mut Option<Position>,
        pos: Position,
    ) {
        match (slots[0], slots[1], slots[2]) {
            (None, _, _) => {
                info!(x = pos.x, y = pos.y, "sample 0 accepted");
                slots[0] = Some(pos);
                *candidate = None;
            }
            (Some(_), None, _) => {
                // Held back until the quiet window re-checks it.
                *candidate = Some(pos);
            }
            (Some(s0), Some(_), None) => {
                let chord = pos.distance_to(&s0);
                if chord >= self.cfg.threshold_m {
                    info!(x = pos.x, y = pos.y, chord, "sample 2 accepted");
                    slots[2] = Some(pos);
                } else {
                    debug!(chord, "beacon too close for sample 2, ignored");
                }
            }
            _ => {}
        }
    }
}
