//! Reference beacon role — the moving node whose known position seeds the
//! whole localization round.
//!
//! The operator walks the beacon along a path and updates its position over
//! the peripheral link; the beacon broadcasts that position continuously
//! until the release command arrives, floods release frames, and then goes
//! permanently quiet. Before the first position command nothing is put on
//! the air: a beacon-tagged frame always carries an operator-supplied
//! position, never a placeholder.

use locus_types::{HostCommand, Position, RadioFrame};
use tracing::{debug, info};

use crate::config::ProtocolConfig;
use crate::link::{send_frame, HostPort, LinkError, RadioLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconState {
    /// Repeatedly broadcasting the operator-supplied position, polling the
    /// peripheral link between transmissions.
    Broadcasting,
    /// Sending the fixed count of release frames back-to-back.
    Flooding,
    /// Terminal: no further radio activity.
    Done,
}

pub struct BeaconRole {
    cfg: ProtocolConfig,
    beacon: Option<(Position, u8)>,
    state: BeaconState,
}

impl BeaconRole {
    pub fn new(cfg: ProtocolConfig) -> Self {
        Self { cfg, beacon: None, state: BeaconState::Broadcasting }
    }

    pub fn state(&self) -> BeaconState {
        self.state
    }

    /// Drive the role to its terminal state: broadcast until the host
    /// releases, flood, done.
    pub fn run<R: RadioLink, H: HostPort>(
        &mut self,
        radio: &mut R,
        host: &mut H,
    ) -> Result<(), LinkError> {
        while self.state == BeaconState::Broadcasting {
            match host.poll_command()? {
                Some(HostCommand::SetBeacon { pos, scan }) => {
                    info!(x = pos.x, y = pos.y, scan, "beacon position updated");
                    self.beacon = Some((pos, scan));
                }
                Some(HostCommand::GatewayStart) => {
                    self.state = BeaconState::Flooding;
                    continue;
                }
                Some(HostCommand::Echo(payload)) => host.publish(&payload)?,
                Some(cmd) => debug!(?cmd, "host command not for the beacon role"),
                None => {}
            }
            if let Some((pos, scan)) = self.beacon {
                send_frame(radio, &RadioFrame::Beacon { pos, scan })?;
            }
        }

        info!(count = self.cfg.flood_count, "beacon released, flooding");
        for _ in 0..self.cfg.flood_count {
            send_frame(radio, &RadioFrame::Release)?;
        }
        self.state = BeaconState::Done;
        info!("beacon done");
        Ok(())
    }
}
