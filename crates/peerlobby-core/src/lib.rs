//! Room synchronization core
//!
//! Host-authoritative replicated state for small peer-to-peer lobbies. One
//! participant creates a room and becomes the host; everyone else connects
//! only to the host (star topology). The host owns the roster, relays chat,
//! and decides when the room starts.
//!
//! # Architecture
//!
//! Sans-IO and action-based. Transport callbacks enter as [`SessionEvent`]s,
//! front-end intents as [`Session`] method calls, and the session returns
//! [`SessionAction`]s for the caller to execute. Nothing in this crate
//! performs I/O, spawns tasks, or reads the clock.
//!
//! # Components
//!
//! - [`RoomCode`]: Shareable five-character code and its peer id mapping
//! - [`ConnectionRegistry`]: Live direct connections with collect-and-continue
//!   fan-out
//! - [`Roster`]: Participant store, `Uninitialized` until first known
//! - [`RoomEngine`]: Protocol state machine, split by [`Role`]
//! - [`Session`]: Binds the above to one local participant

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod env;
pub mod error;
mod event;
pub mod identity;
pub mod registry;
pub mod roster;
mod session;

pub use engine::{HostRoom, JoinerRoom, Role, RoomAction, RoomEngine, RoomPhase};
pub use env::Environment;
pub use error::{
    ChannelError, DeliveryError, IdentityError, RegistryError, RejectedAction, SessionError,
};
pub use event::{SessionAction, SessionEvent};
pub use identity::{PEER_ID_PREFIX, ROOM_CODE_LEN, RoomCode};
pub use peerlobby_proto::{ChatMessage, Participant, PeerId, WireMessage};
pub use registry::{Channel, Connection, ConnectionRegistry, ConnectionState, DeliveryReport};
pub use roster::Roster;
pub use session::{RoomIntent, Session, SessionConfig, UNKNOWN_SENDER};
