//! Link traits — the narrow seam between the protocol core and the
//! platform's radio transceiver and peripheral (host) link.
//!
//! The deployed devices busy-wait on hardware status flags; here that is
//! expressed as blocking operations with three reception outcomes. Any
//! implementation (interrupt-driven, async bridge, or the in-process
//! simulator) is acceptable as long as the blocking semantics and outcome
//! ordering are preserved.

use locus_types::{HostCommand, RadioFrame, MAX_FRAME_LEN};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    /// The other end of the link is gone (simulator shutdown, unplugged bus).
    #[error("link closed by peer")]
    Closed,
    #[error("link i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one blocking reception attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxOutcome {
    /// A frame landed in the buffer. The value is the length the radio
    /// reported, which may exceed [`MAX_FRAME_LEN`]; such frames must be
    /// dropped unprocessed by the caller.
    Frame(usize),
    /// The receive window elapsed with nothing on the air.
    TimedOut,
    /// The radio reported a reception error. Cleared by the time this
    /// returns; the caller simply retries.
    Error,
}

/// Blocking access to the ultra-wideband radio.
pub trait RadioLink {
    /// Transmit one frame, returning only after the radio signals
    /// transmission-complete.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    /// Enable reception and block until a frame, a receive timeout, or a
    /// radio error. At most `MAX_FRAME_LEN` bytes are written to `buf` even
    /// when the reported length is larger.
    fn receive(&mut self, buf: &mut [u8; MAX_FRAME_LEN]) -> Result<RxOutcome, LinkError>;
}

/// The device side of the byte-oriented peripheral link to the host
/// collector.
pub trait HostPort {
    /// Poll for a pending host command. May block briefly; returns `None`
    /// when no transfer is pending so the caller's loop can keep
    /// broadcasting.
    fn poll_command(&mut self) -> Result<Option<HostCommand>, LinkError>;

    /// Push a response buffer to the host side of the link.
    fn publish(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// Encode and transmit a frame in one step.
pub fn send_frame<R: RadioLink + ?Sized>(
    radio: &mut R,
    frame: &RadioFrame,
) -> Result<(), LinkError> {
    radio.transmit(&frame.encode())
}

// ── Scripted links for role tests ─────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testlink {
    use super::*;
    use std::collections::VecDeque;

    /// One scripted reception outcome.
    pub enum Rx {
        Frame(RadioFrame),
        /// Raw bytes with an explicitly reported length (oversized/garbage
        /// reception tests).
        Bytes(Vec<u8>, usize),
        TimedOut,
        Error,
    }

    /// Radio that replays a fixed reception script and records every
    /// transmitted frame. An exhausted script, or an exhausted transmit
    /// budget, behaves like a closed link.
    pub(crate) struct ScriptRadio {
        script: VecDeque<Rx>,
        pub sent: Vec<Vec<u8>>,
        tx_budget: Option<usize>,
    }

    impl ScriptRadio {
        pub fn new(script: Vec<Rx>) -> Self {
            Self { script: script.into(), sent: Vec::new(), tx_budget: None }
        }

        pub fn with_tx_budget(mut self, budget: usize) -> Self {
            self.tx_budget = Some(budget);
            self
        }

        pub fn sent_frames(&self) -> Vec<RadioFrame> {
            self.sent.iter().map(|b| RadioFrame::decode(b).expect("sent frame decodes")).collect()
        }
    }

    impl RadioLink for ScriptRadio {
        fn transmit(&mut self, frame: &[u8]) -> Result<(), LinkError> {
            if let Some(budget) = self.tx_budget {
                if self.sent.len() >= budget {
                    return Err(LinkError::Closed);
                }
            }
            self.sent.push(frame.to_vec());
            Ok(())
        }

        fn receive(&mut self, buf: &mut [u8; MAX_FRAME_LEN]) -> Result<RxOutcome, LinkError> {
            match self.script.pop_front() {
                None => Err(LinkError::Closed),
                Some(Rx::Frame(frame)) => {
                    let bytes = frame.encode();
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(RxOutcome::Frame(bytes.len()))
                }
                Some(Rx::Bytes(bytes, reported_len)) => {
                    let n = bytes.len().min(MAX_FRAME_LEN);
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(RxOutcome::Frame(reported_len))
                }
                Some(Rx::TimedOut) => Ok(RxOutcome::TimedOut),
                Some(Rx::Error) => Ok(RxOutcome::Error),
            }
        }
    }

    /// Host port that hands out queued commands and records publishes.
    pub(crate) struct ScriptHost {
        commands: VecDeque<Option<HostCommand>>,
        pub published: Vec<Vec<u8>>,
    }

    impl ScriptHost {
        pub fn new(commands: Vec<HostCommand>) -> Self {
            Self::gapped(commands.into_iter().map(Some).collect())
        }

        /// Script with idle polls (`None`) interleaved between commands.
        pub fn gapped(commands: Vec<Option<HostCommand>>) -> Self {
            Self { commands: commands.into(), published: Vec::new() }
        }
    }

    impl HostPort for ScriptHost {
        fn poll_command(&mut self) -> Result<Option<HostCommand>, LinkError> {
            Ok(self.commands.pop_front().flatten())
        }

        fn publish(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
            self.published.push(bytes.to_vec());
            Ok(())
        }
    }
}
