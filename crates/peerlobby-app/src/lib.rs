//! Application layer for peerlobby
//!
//! Runs a room [`peerlobby_core::Session`] on tokio: one task per participant
//! owns the session and its transport, front ends talk to it through a
//! [`RuntimeHandle`] and redraw from published [`RoomView`]s.
//!
//! # Components
//!
//! - [`Transport`]: Trait for peer-to-peer connection management
//! - [`LocalBroker`]: In-memory transport for participants in one process
//! - [`Runtime`]: Event loop binding a session to a transport
//! - [`RoomView`]: Render-ready room snapshot
//! - [`validate_nickname`], [`validate_room_code`]: Front-end input checks
//! - [`SystemEnv`]: OS-backed randomness for room codes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod error;
mod runtime;
mod system_env;
mod transport;
mod validation;
mod view;

pub use broker::{LocalBroker, LocalChannel, LocalTransport};
pub use error::{RuntimeError, TransportError};
pub use runtime::{Command, Runtime, RuntimeConfig, RuntimeHandle};
pub use system_env::SystemEnv;
pub use transport::{Transport, TransportEvent};
pub use validation::{
    NICKNAME_MAX_LEN, NICKNAME_MIN_LEN, ValidationError, validate_nickname, validate_room_code,
};
pub use view::{ChatLine, RoomView};
