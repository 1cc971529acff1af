//! Error types for the application layer.

use peerlobby_core::{PeerId, SessionError};
use thiserror::Error;

/// Errors from a transport implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Another endpoint already holds the requested identifier.
    #[error("peer id {0} is already taken")]
    IdTaken(PeerId),

    /// No endpoint is listening on the dialed identifier.
    #[error("peer {0} is unavailable")]
    PeerUnavailable(PeerId),

    /// The transport has not been opened yet.
    #[error("transport not open")]
    NotOpen,
}

/// Errors that end a runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The session failed outright. Guard rejections never end up here.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// The runtime has already stopped.
    #[error("runtime stopped")]
    Stopped,
}
