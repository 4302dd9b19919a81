//! host_bus.rs — channel-backed peripheral link
//!
//! Stands in for the byte-oriented link between a device and its host
//! collector. The operator side writes raw command buffers and reads raw
//! response buffers, exactly the byte layouts `locus-types` defines, so the
//! codec is exercised end to end.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use tracing::debug;

use locus_node::link::{HostPort, LinkError};
use locus_types::HostCommand;

/// Create a connected operator/device pair.
pub fn host_bus() -> (OperatorHandle, DevicePort) {
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (resp_tx, resp_rx) = mpsc::channel();
    (
        OperatorHandle { cmd_tx, resp_rx },
        DevicePort { cmd_rx, resp_tx, poll_wait: Duration::from_millis(1) },
    )
}

/// Device side: what a role polls and publishes to.
pub struct DevicePort {
    cmd_rx: Receiver<Vec<u8>>,
    resp_tx: Sender<Vec<u8>>,
    poll_wait: Duration,
}

impl HostPort for DevicePort {
    fn poll_command(&mut self) -> Result<Option<HostCommand>, LinkError> {
        match self.cmd_rx.recv_timeout(self.poll_wait) {
            Ok(bytes) => match HostCommand::decode(&bytes) {
                Ok(cmd) => Ok(Some(cmd)),
                Err(e) => {
                    debug!(%e, "host transfer dropped");
                    Ok(None)
                }
            },
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }

    fn publish(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.resp_tx.send(bytes.to_vec()).map_err(|_| LinkError::Closed)
    }
}

/// Operator (host collector) side.
pub struct OperatorHandle {
    cmd_tx: Sender<Vec<u8>>,
    resp_rx: Receiver<Vec<u8>>,
}

impl OperatorHandle {
    pub fn send(&self, cmd: &HostCommand) -> Result<(), LinkError> {
        self.cmd_tx.send(cmd.encode()).map_err(|_| LinkError::Closed)
    }

    /// Wait for the next response buffer from the device.
    pub fn read_response(&self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError> {
        match self.resp_rx.recv_timeout(timeout) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_types::Position;

    #[test]
    fn commands_and_responses_cross_the_bus() {
        let (operator, mut device) = host_bus();

        let cmd = HostCommand::SetBeacon { pos: Position::new(6.0, 0.0), scan: 1 };
        operator.send(&cmd).unwrap();
        assert_eq!(device.poll_command().unwrap(), Some(cmd));
        assert_eq!(device.poll_command().unwrap(), None);

        device.publish(&[0xDE, 0xAD]).unwrap();
        let resp = operator.read_response(Duration::from_millis(50)).unwrap();
        assert_eq!(resp, Some(vec![0xDE, 0xAD]));
    }

    #[test]
    fn dropped_operator_reads_as_closed() {
        let (operator, mut device) = host_bus();
        drop(operator);
        assert!(matches!(device.poll_command(), Err(LinkError::Closed)));
    }
}
