//! # locus-types
//!
//! Shared wire types for the Locus beacon-localization suite.
//!
//! These types are used by:
//! - `locus-node`: the role state machines (beacon, ranging node, gateway)
//! - `packages/locus-sim`: the in-process airspace and host-bus simulator
//! - the host collector, which speaks the same byte layout over the
//!   peripheral link as the radio frames use over the air
//!
//! ## Wire conventions
//!
//! - Positions are fixed-point: per axis one sign byte (0 = non-negative,
//!   anything else = negative), one integer byte, one hundredths byte.
//!   6 bytes per position, x before y.
//! - Radio frames are tag-prefixed: `0xAA` beacon, `0xBB` estimate,
//!   `0xCC` release. Maximum frame length is 127 bytes.
//! - Host messages reuse the same tag space plus `0xDD` (collect) and
//!   `0xEE` (diagnostic echo).
//!
//! Decoding is deliberately permissive where the deployed wire format is:
//! sign bytes are interpreted literally and integer/fraction bytes are never
//! range-checked. Tightening this would silently diverge from the devices
//! already in the field.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Wire constants ────────────────────────────────────────────────────────────

/// Number of ranging devices a deployment addresses (collect table size).
pub const N_DEVS: usize = 10;

/// Encoded length of one position: sign/int/frac for x, then for y.
pub const POSITION_WIRE_LEN: usize = 6;

/// Hard ceiling on radio frame length. Longer receptions are dropped
/// unprocessed.
pub const MAX_FRAME_LEN: usize = 127;

/// Payload length of a collect response: one position slot per device.
pub const COLLECT_PAYLOAD_LEN: usize = N_DEVS * POSITION_WIRE_LEN;

/// Radio tag: reference beacon broadcasting its own position.
pub const TAG_BEACON: u8 = 0xAA;
/// Radio tag: ranging node reporting its estimated position.
pub const TAG_ESTIMATE: u8 = 0xBB;
/// Radio tag: release flood, terminates the current phase of listeners.
pub const TAG_RELEASE: u8 = 0xCC;

/// Host command: set the reference beacon position / trigger a broadcast.
pub const CMD_SET_BEACON: u8 = 0xAA;
/// Host command: start the gateway release flood.
pub const CMD_GATEWAY_START: u8 = 0xCC;
/// Host command: read back the aggregated position table.
pub const CMD_COLLECT: u8 = 0xDD;
/// Host command: diagnostic echo of raw buffer contents.
pub const CMD_ECHO: u8 = 0xEE;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),
    #[error("frame 0x{tag:02x} truncated: need {need} bytes, got {got}")]
    Truncated { tag: u8, need: usize, got: usize },
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN}-byte ceiling")]
    Oversized(usize),
    #[error("hardware id 0x{0:08x} is not in the device map")]
    UnknownIdentity(u32),
}

// ── Fixed-point 2D position ───────────────────────────────────────────────────

/// A 2-D position with two decimal digits of precision per axis,
/// |axis| < 256. The all-zero position doubles as "no data" in the
/// gateway's collect table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position (chord length).
    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// True for the zero position that collect slots use to mean "no data".
    pub fn is_empty(&self) -> bool {
        self.x.abs() < 0.01 && self.y.abs() < 0.01
    }

    /// Encode to the 6-byte fixed-point wire form. Values are rounded to
    /// hundredths; magnitudes beyond 255.99 saturate.
    pub fn encode(&self) -> [u8; POSITION_WIRE_LEN] {
        let mut out = [0u8; POSITION_WIRE_LEN];
        encode_axis(self.x, &mut out[0..3]);
        encode_axis(self.y, &mut out[3..6]);
        out
    }

    /// Decode the 6-byte fixed-point wire form. Sign bytes are taken
    /// literally: any nonzero value negates the axis.
    pub fn decode(bytes: &[u8; POSITION_WIRE_LEN]) -> Self {
        Self {
            x: decode_axis(&bytes[0..3]),
            y: decode_axis(&bytes[3..6]),
        }
    }

    /// The position as it survives one encode/decode round trip.
    pub fn quantized(&self) -> Self {
        Self::decode(&self.encode())
    }
}

fn encode_axis(v: f32, out: &mut [u8]) {
    let sign = if v < 0.0 { 1u8 } else { 0u8 };
    // Work in hundredths so 0.1-style values round-trip exactly.
    let cents = (v.abs() * 100.0).round().min(25599.0) as u32;
    out[0] = sign;
    out[1] = (cents / 100) as u8;
    out[2] = (cents % 100) as u8;
}

fn decode_axis(b: &[u8]) -> f32 {
    let mag = b[1] as f32 + b[2] as f32 / 100.0;
    if b[0] == 0 {
        mag
    } else {
        -mag
    }
}

// ── Radio frames ──────────────────────────────────────────────────────────────

/// A tagged frame on the ultra-wideband radio link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RadioFrame {
    /// Reference beacon → ranging nodes: the beacon's current position plus
    /// a scan/sequence counter.
    Beacon { pos: Position, scan: u8 },
    /// Ranging node → gateway: the node's estimated position plus its
    /// device identity.
    Estimate { pos: Position, id: u8 },
    /// Broadcast that terminates the listeners' current phase.
    Release,
}

impl RadioFrame {
    pub fn tag(&self) -> u8 {
        match self {
            RadioFrame::Beacon { .. } => TAG_BEACON,
            RadioFrame::Estimate { .. } => TAG_ESTIMATE,
            RadioFrame::Release => TAG_RELEASE,
        }
    }

    /// Pack into the over-the-air byte layout.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RadioFrame::Beacon { pos, scan } => {
                let mut out = Vec::with_capacity(8);
                out.push(TAG_BEACON);
                out.extend_from_slice(&pos.encode());
                out.push(*scan);
                out
            }
            RadioFrame::Estimate { pos, id } => {
                let mut out = Vec::with_capacity(8);
                out.push(TAG_ESTIMATE);
                out.extend_from_slice(&pos.encode());
                out.push(*id);
                out
            }
            RadioFrame::Release => vec![TAG_RELEASE],
        }
    }

    /// Unpack a received frame. Fails only on an unknown tag, a buffer
    /// shorter than the tag's fixed payload, or a reception longer than the
    /// frame ceiling; payload bytes themselves are never validated.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(WireError::Oversized(bytes.len()));
        }
        let tag = *bytes.first().ok_or(WireError::Truncated {
            tag: 0,
            need: 1,
            got: 0,
        })?;
        match tag {
            TAG_BEACON => {
                let body = fixed_body(tag, bytes, 7)?;
                Ok(RadioFrame::Beacon {
                    pos: Position::decode(body[0..6].try_into().expect("6-byte slice")),
                    scan: body[6],
                })
            }
            TAG_ESTIMATE => {
                let body = fixed_body(tag, bytes, 7)?;
                Ok(RadioFrame::Estimate {
                    pos: Position::decode(body[0..6].try_into().expect("6-byte slice")),
                    id: body[6],
                })
            }
            TAG_RELEASE => Ok(RadioFrame::Release),
            other => Err(WireError::UnknownTag(other)),
        }
    }
}

/// Body of a tag-prefixed frame with a fixed payload size. Trailing bytes
/// are tolerated (the radio pads frames).
fn fixed_body(tag: u8, bytes: &[u8], need: usize) -> Result<&[u8], WireError> {
    if bytes.len() < 1 + need {
        return Err(WireError::Truncated {
            tag,
            need: 1 + need,
            got: bytes.len(),
        });
    }
    Ok(&bytes[1..1 + need])
}

// ── Host link messages ────────────────────────────────────────────────────────

/// A command arriving from the host collector on the peripheral link.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    /// Set the reference beacon position and scan flag.
    SetBeacon { pos: Position, scan: u8 },
    /// Trigger the gateway release flood.
    GatewayStart,
    /// Read back the aggregated position table.
    Collect,
    /// Diagnostic echo: the device answers with the raw payload bytes.
    Echo(Vec<u8>),
}

impl HostCommand {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            HostCommand::SetBeacon { pos, scan } => {
                let mut out = Vec::with_capacity(8);
                out.push(CMD_SET_BEACON);
                out.extend_from_slice(&pos.encode());
                out.push(*scan);
                out
            }
            HostCommand::GatewayStart => vec![CMD_GATEWAY_START],
            HostCommand::Collect => vec![CMD_COLLECT],
            HostCommand::Echo(payload) => {
                let mut out = Vec::with_capacity(1 + payload.len());
                out.push(CMD_ECHO);
                out.extend_from_slice(payload);
                out
            }
        }
    }

    /// Decode a host command buffer. The peripheral link transfers fixed
    /// buffer sizes, so trailing padding after the command payload is
    /// expected and ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let tag = *bytes.first().ok_or(WireError::Truncated {
            tag: 0,
            need: 1,
            got: 0,
        })?;
        match tag {
            CMD_SET_BEACON => {
                let body = fixed_body(tag, bytes, 7)?;
                Ok(HostCommand::SetBeacon {
                    pos: Position::decode(body[0..6].try_into().expect("6-byte slice")),
                    scan: body[6],
                })
            }
            CMD_GATEWAY_START => Ok(HostCommand::GatewayStart),
            CMD_COLLECT => Ok(HostCommand::Collect),
            CMD_ECHO => Ok(HostCommand::Echo(bytes[1..].to_vec())),
            other => Err(WireError::UnknownTag(other)),
        }
    }
}

/// Pack the gateway's aggregate table as a collect response: 6 bytes per
/// device identity, zero slots meaning "no data".
pub fn encode_collect(slots: &[Position; N_DEVS]) -> [u8; COLLECT_PAYLOAD_LEN] {
    let mut out = [0u8; COLLECT_PAYLOAD_LEN];
    for (i, pos) in slots.iter().enumerate() {
        out[i * POSITION_WIRE_LEN..(i + 1) * POSITION_WIRE_LEN].copy_from_slice(&pos.encode());
    }
    out
}

/// Unpack a collect response on the host side.
pub fn decode_collect(bytes: &[u8]) -> Result<[Position; N_DEVS], WireError> {
    if bytes.len() < COLLECT_PAYLOAD_LEN {
        return Err(WireError::Truncated {
            tag: CMD_COLLECT,
            need: COLLECT_PAYLOAD_LEN,
            got: bytes.len(),
        });
    }
    let mut slots = [Position::default(); N_DEVS];
    for (i, slot) in slots.iter_mut().enumerate() {
        let chunk: &[u8; POSITION_WIRE_LEN] = bytes
            [i * POSITION_WIRE_LEN..(i + 1) * POSITION_WIRE_LEN]
            .try_into()
            .expect("6-byte slice");
        *slot = Position::decode(chunk);
    }
    Ok(slots)
}

// ── Device identity ───────────────────────────────────────────────────────────

/// Maps the fixed hardware-unique 32-bit id burned into each ranging device
/// to its small integer identity in `[0, N_DEVS)`. The mapping is immutable
/// for the process lifetime; an unmapped hardware id is a configuration
/// error at startup, never coerced into a valid slot.
#[derive(Debug, Clone)]
pub struct DeviceMap {
    ids: [u32; N_DEVS],
}

impl Default for DeviceMap {
    fn default() -> Self {
        // OTP ids of the deployed ranging devices, in identity order.
        Self {
            ids: [
                0xc3f58103, // 00
                0xc4351729, // 01
                0xc3f50d8a, // 02
                0xc435021b, // 03
                0xc3f50f85, // 04
                0xc3f44b92, // 05
                0xc3f40789, // 06
                0xc3f55783, // 07
                0xc435028e, // 08
                0xc440912c, // 09
            ],
        }
    }
}

impl DeviceMap {
    pub fn new(ids: [u32; N_DEVS]) -> Self {
        Self { ids }
    }

    /// Resolve a hardware id to its device identity.
    pub fn identity(&self, hw_id: u32) -> Result<u8, WireError> {
        self.ids
            .iter()
            .position(|&id| id == hw_id)
            .map(|i| i as u8)
            .ok_or(WireError::UnknownIdentity(hw_id))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_round_trips_at_two_decimals() {
        for p in [
            Position::new(0.0, 0.0),
            Position::new(3.0, 3.0),
            Position::new(12.34, 250.07),
            Position::new(-0.5, -255.99),
            Position::new(255.99, -0.01),
        ] {
            assert_eq!(Position::decode(&p.encode()), p, "round trip of {p:?}");
        }
    }

    #[test]
    fn position_encoding_is_lossy_beyond_two_decimals() {
        let p = Position::new(1.005, -2.999);
        let q = Position::decode(&p.encode());
        assert_eq!(q, Position::new(1.0, -3.0));
        assert_eq!(q, p.quantized());
    }

    #[test]
    fn position_magnitude_saturates() {
        let p = Position::new(400.0, -1000.0);
        assert_eq!(Position::decode(&p.encode()), Position::new(255.99, -255.99));
    }

    #[test]
    fn sign_byte_is_taken_literally() {
        // Any nonzero sign byte means negative, mirroring the field format.
        assert_eq!(Position::decode(&[7, 3, 50, 0, 1, 25]), Position::new(-3.5, 1.25));
    }

    #[test]
    fn empty_position_means_no_data() {
        assert!(Position::default().is_empty());
        assert!(Position::new(0.009, -0.009).is_empty());
        assert!(!Position::new(0.02, 0.0).is_empty());
    }

    #[test]
    fn radio_frames_round_trip() {
        let frames = [
            RadioFrame::Beacon { pos: Position::new(6.0, -1.25), scan: 3 },
            RadioFrame::Estimate { pos: Position::new(3.0, 3.0), id: 7 },
            RadioFrame::Release,
        ];
        for f in frames {
            assert_eq!(RadioFrame::decode(&f.encode()), Ok(f));
        }
    }

    #[test]
    fn beacon_wire_layout_is_exact() {
        let f = RadioFrame::Beacon { pos: Position::new(3.0, 3.0), scan: 1 };
        assert_eq!(f.encode(), vec![0xAA, 0, 3, 0, 0, 3, 0, 1]);
    }

    #[test]
    fn decode_rejects_unknown_tag_and_truncation() {
        assert_eq!(RadioFrame::decode(&[0x42]), Err(WireError::UnknownTag(0x42)));
        assert_eq!(
            RadioFrame::decode(&[TAG_ESTIMATE, 0, 1]),
            Err(WireError::Truncated { tag: TAG_ESTIMATE, need: 8, got: 3 })
        );
        assert_eq!(RadioFrame::decode(&[]), Err(WireError::Truncated { tag: 0, need: 1, got: 0 }));
    }

    #[test]
    fn decode_drops_oversized_receptions() {
        let oversized = vec![TAG_RELEASE; MAX_FRAME_LEN + 1];
        assert_eq!(RadioFrame::decode(&oversized), Err(WireError::Oversized(128)));
    }

    #[test]
    fn decode_tolerates_radio_padding() {
        let mut bytes = RadioFrame::Release.encode();
        bytes.resize(MAX_FRAME_LEN, 0);
        assert_eq!(RadioFrame::decode(&bytes), Ok(RadioFrame::Release));
    }

    #[test]
    fn host_commands_round_trip() {
        let cmds = [
            HostCommand::SetBeacon { pos: Position::new(-4.5, 0.25), scan: 1 },
            HostCommand::GatewayStart,
            HostCommand::Collect,
            HostCommand::Echo(vec![1, 2, 3]),
        ];
        for c in cmds {
            assert_eq!(HostCommand::decode(&c.encode()), Ok(c));
        }
    }

    #[test]
    fn gateway_start_tolerates_padded_transfer() {
        // The host tool pads the release command to its transfer size.
        assert_eq!(
            HostCommand::decode(&[CMD_GATEWAY_START, 0, 0, 0, 0]),
            Ok(HostCommand::GatewayStart)
        );
    }

    #[test]
    fn collect_response_round_trips_with_empty_slots() {
        let mut slots = [Position::default(); N_DEVS];
        slots[0] = Position::new(3.0, 3.0);
        slots[9] = Position::new(-1.5, 2.25);
        let packed = encode_collect(&slots);
        assert_eq!(packed.len(), 60);
        let unpacked = decode_collect(&packed).unwrap();
        assert_eq!(unpacked, slots);
        assert!(unpacked[1].is_empty());
    }

    #[test]
    fn device_map_resolves_known_hardware_ids() {
        let map = DeviceMap::default();
        assert_eq!(map.identity(0xc3f58103), Ok(0));
        assert_eq!(map.identity(0xc440912c), Ok(9));
    }

    #[test]
    fn device_map_rejects_unknown_hardware_id() {
        let map = DeviceMap::default();
        assert_eq!(map.identity(0xdeadbeef), Err(WireError::UnknownIdentity(0xdeadbeef)));
    }
}
