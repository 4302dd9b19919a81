//! # locus-node
//!
//! Protocol core of the Locus beacon-localization suite: the three role
//! state machines (reference beacon, ranging node, gateway/aggregator), the
//! perpendicular-bisector trilateration solver, and the link traits that
//! isolate them from radio and peripheral hardware.
//!
//! ## Roles
//! - [`beacon::BeaconRole`]: broadcasts the operator-supplied position,
//!   floods release frames on command, then goes quiet.
//! - [`ranging::RangingNode`]: collects three beacon samples gated by a
//!   minimum chord length, solves for its own position, then announces the
//!   estimate forever.
//! - [`gateway::GatewayRole`]: relays host commands onto the radio, then
//!   aggregates estimate frames into a per-identity table for the host.
//!
//! Each role is a single-threaded synchronous loop: it blocks on
//! "transmission complete" or "reception outcome" through [`link::RadioLink`]
//! and owns all of its state. Devices coordinate only through radio frames;
//! cancellation is the release tag and bounded consecutive-timeout counters.

pub mod beacon;
pub mod config;
pub mod gateway;
pub mod link;
pub mod ranging;
pub mod solver;

pub use config::ProtocolConfig;
pub use link::{HostPort, LinkError, RadioLink, RxOutcome};
pub use solver::{SignMode, SolveError};
