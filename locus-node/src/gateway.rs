//! Gateway role — bridges the host's peripheral link and the radio.
//!
//! Phase 1 relays beacon-position commands from the host onto the air and,
//! on the start command, floods release frames so every listener moves on.
//! Phase 2 collects estimate frames from the ranging nodes into a fixed
//! per-identity table, bounded by a consecutive-timeout counter, and packs
//! the table as the collect response the host reads back.

use locus_types::{
    encode_collect, HostCommand, Position, RadioFrame, MAX_FRAME_LEN, N_DEVS,
};
use tracing::{debug, info, warn};

use crate::config::ProtocolConfig;
use crate::link::{send_frame, HostPort, LinkError, RadioLink, RxOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    /// Relaying host beacon commands onto the radio.
    Relaying,
    /// Collecting estimate frames from the ranging nodes.
    Aggregating,
    /// Waiting for the host to read the aggregate table back.
    Serving,
    Done,
}

/// Fixed-size aggregation table, one slot per device identity. A slot is
/// marked filled on its first write; later writes overwrite the value but
/// not the fill state. Unfilled slots stay at the zero position, which the
/// host reads as "no data".
#[derive(Debug, Clone)]
pub struct AggregateTable {
    slots: [Position; N_DEVS],
    filled: [bool; N_DEVS],
}

impl AggregateTable {
    fn new() -> Self {
        Self { slots: [Position::default(); N_DEVS], filled: [false; N_DEVS] }
    }

    /// Record an estimate. Returns true if this identity's slot was
    /// previously unfilled.
    fn record(&mut self, id: u8, pos: Position) -> bool {
        let i = id as usize;
        self.slots[i] = pos;
        let first = !self.filled[i];
        self.filled[i] = true;
        first
    }

    pub fn is_complete(&self) -> bool {
        self.filled.iter().all(|&f| f)
    }

    pub fn filled_count(&self) -> usize {
        self.filled.iter().filter(|&&f| f).count()
    }

    pub fn slots(&self) -> &[Position; N_DEVS] {
        &self.slots
    }
}

pub struct GatewayRole {
    cfg: ProtocolConfig,
    state: GatewayState,
    beacon: Option<(Position, u8)>,
    table: AggregateTable,
}

impl GatewayRole {
    pub fn new(cfg: ProtocolConfig) -> Self {
        Self {
            cfg,
            state: GatewayState::Relaying,
            beacon: None,
            table: AggregateTable::new(),
        }
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    pub fn table(&self) -> &AggregateTable {
        &self.table
    }

    /// Run both phases back-to-back, then serve the collect response.
    pub fn run<R: RadioLink, H: HostPort>(
        &mut self,
        radio: &mut R,
        host: &mut H,
    ) -> Result<(), LinkError> {
        self.relay(radio, host)?;
        self.aggregate(radio)?;
        self.serve_collect(host)
    }

    /// Phase 1: mirror the beacon's Broadcasting state on behalf of the
    /// host until the start command, then flood release frames and stop
    /// transmitting.
    pub fn relay<R: RadioLink, H: HostPort>(
        &mut self,
        radio: &mut R,
        host: &mut H,
    ) -> Result<(), LinkError> {
        self.state = GatewayState::Relaying;
        loop {
            match host.poll_command()? {
                Some(HostCommand::SetBeacon { pos, scan }) => {
                    info!(x = pos.x, y = pos.y, scan, "relaying beacon position");
                    self.beacon = Some((pos, scan));
                }
                Some(HostCommand::GatewayStart) => break,
                Some(HostCommand::Echo(payload)) => host.publish(&payload)?,
                Some(HostCommand::Collect) => {
                    // Nothing aggregated yet; the host gets the empty table.
                    host.publish(&encode_collect(self.table.slots()))?;
                }
                None => {}
            }
            if let Some((pos, scan)) = self.beacon {
                send_frame(radio, &RadioFrame::Beacon { pos, scan })?;
            }
        }

        info!(count = self.cfg.flood_count, "gateway start, flooding release");
        for _ in 0..self.cfg.flood_count {
            send_frame(radio, &RadioFrame::Release)?;
        }
        Ok(())
    }

    /// Phase 2: accumulate estimate frames until every identity has
    /// reported or the consecutive non-success bound is exhausted.
    pub fn aggregate<R: RadioLink>(&mut self, radio: &mut R) -> Result<&AggregateTable, LinkError> {
        self.state = GatewayState::Aggregating;
        let mut idle: u32 = 0;
        let mut buf = [0u8; MAX_FRAME_LEN];

        while !self.table.is_complete() && idle < self.cfg.retry_limit {
            match radio.receive(&mut buf)? {
                RxOutcome::Frame(len) => {
                    idle = 0;
                    if len > MAX_FRAME_LEN {
                        debug!(len, "oversized frame dropped");
                        continue;
                    }
                    match RadioFrame::decode(&buf[..len]) {
                        Ok(RadioFrame::Estimate { pos, id }) => {
                            if (id as usize) < N_DEVS {
                                if self.table.record(id, pos) {
                                    info!(
                                        id,
                                        x = pos.x,
                                        y = pos.y,
                                        filled = self.table.filled_count(),
                                        "estimate collected"
                                    );
                                }
                            } else {
                                warn!(id, "estimate with out-of-range identity dropped");
                            }
                        }
                        // Our own flood, or a beacon still on the air.
                        Ok(_) => {}
                        Err(e) => debug!(%e, "frame dropped"),
                    }
                }
                RxOutcome::TimedOut => idle += 1,
                // A reception error is also a non-success event here.
                RxOutcome::Error => idle += 1,
            }
        }

        if self.table.is_complete() {
            info!("aggregation complete, all {N_DEVS} identities reported");
        } else {
            info!(filled = self.table.filled_count(), "aggregation timed out");
        }
        Ok(&self.table)
    }

    /// Final phase: answer the host's collect request with the packed
    /// table.
    pub fn serve_collect<H: HostPort>(&mut self, host: &mut H) -> Result<(), LinkError> {
        self.state = GatewayState::Serving;
        loop {
            match host.poll_command()? {
                Some(HostCommand::Collect) => {
                    host.publish(&encode_collect(self.table.slots()))?;
                    self.state = GatewayState::Done;
                    info!("collect response published");
                    return Ok(());
                }
                Some(HostCommand::Echo(payload)) => host.publish(&payload)?,
                Some(cmd) => debug!(?cmd, "command ignored while collect pending"),
                None => {}
            }
        }
    }
}
