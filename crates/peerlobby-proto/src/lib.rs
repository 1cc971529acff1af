//! Wire vocabulary for the peerlobby room protocol.
//!
//! Every participant in a room talks JSON over a direct point-to-point data
//! channel. Each frame is a tagged record whose `type` field selects the shape
//! of the rest:
//!
//! ```text
//! { "type": "user",      "user": { "id", "name", "ready" } }
//! { "type": "message",   "from": id, "text": string }
//! { "type": "user-list", "users": [ { "id", "name", "ready" }, ... ] }
//! { "type": "ready",     "id": id }
//! { "type": "start" }
//! ```
//!
//! # Invariants
//!
//! - Round-trip: decoding the encoding of any [`WireMessage`] yields an equal
//!   value.
//! - Forward compatibility: a frame with an unrecognized `type` decodes to
//!   [`ProtocolError::UnknownType`], never a panic, so receivers can drop it
//!   and keep going.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
mod message;
mod peer;

pub use errors::{ProtocolError, Result};
pub use message::{ChatMessage, MessageKind, WireMessage};
pub use peer::{Participant, PeerId};
