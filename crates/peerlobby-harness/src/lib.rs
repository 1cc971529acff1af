//! Deterministic simulation harness for peerlobby rooms.
//!
//! Runs every participant's [`peerlobby_core::Session`] in one thread over an
//! in-process network, with a seeded environment, so a failing sequence
//! replays identically.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after any
//! sequence of operations. Use [`InvariantRegistry::standard()`] for the room
//! protocol invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod invariants;
pub mod sim_env;
pub mod sim_network;
pub mod sim_room;

pub use error::SimError;
pub use invariants::{
    HostRosterMatchesConnections, Invariant, InvariantRegistry, InvariantResult,
    MirrorConvergence, NodeSnapshot, RoomSnapshot, StartedOnce, UniqueRosterIds, Violation,
};
pub use sim_env::SimEnv;
pub use sim_network::{LinkState, SimChannel, SimNetwork, TracedFrame};
pub use sim_room::{MAX_SETTLE_STEPS, SimRoom};
