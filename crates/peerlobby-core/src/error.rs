//! Error types for the room protocol core.
//!
//! Strongly-typed errors per concern: identity parsing, registry bookkeeping,
//! per-connection delivery, and rejected local actions. None of them is fatal
//! to a session. The worst outcome of any error here is a participant whose
//! connection silently stops working until the transport reports it closed.

use peerlobby_proto::{PeerId, ProtocolError};
use thiserror::Error;

/// Errors parsing room codes and peer identifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Room code has the wrong number of characters.
    #[error("room code must be {expected} characters, got {actual}")]
    InvalidLength {
        /// Required length
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Room code contains a character outside the code alphabet.
    #[error("room code contains invalid character {0:?}")]
    InvalidCharacter(char),

    /// Peer identifier is not in the room namespace.
    #[error("peer id {0} is not in the room namespace")]
    MissingPrefix(PeerId),
}

/// Errors from connection registry bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A connection to this remote is already registered.
    #[error("duplicate connection to {0}")]
    DuplicateConnection(PeerId),
}

/// Failure reported by a transport channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel was closed locally or by the remote.
    #[error("channel closed")]
    Closed,

    /// Transport-specific failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// A send to one connection failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// No open connection is registered for the remote.
    #[error("no open connection to {0}")]
    NotConnected(PeerId),

    /// The channel rejected the frame.
    #[error("delivery to {remote} failed: {source}")]
    Failed {
        /// Intended recipient
        remote: PeerId,
        /// Channel failure
        source: ChannelError,
    },
}

impl DeliveryError {
    /// Remote the frame was meant for.
    pub fn remote(&self) -> &PeerId {
        match self {
            Self::NotConnected(remote) | Self::Failed { remote, .. } => remote,
        }
    }
}

/// A local action violated a guard. Nothing was sent and no state changed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectedAction {
    /// Only the host may start the room.
    #[error("only the host can start the room")]
    NotHost,

    /// Some participants other than the host are not ready.
    #[error("waiting on {} participant(s) to get ready", waiting.len())]
    NotAllReady {
        /// Participants that are not ready yet, in roster order
        waiting: Vec<PeerId>,
    },

    /// The room has already started.
    #[error("room already started")]
    AlreadyStarted,

    /// The transport has not assigned a local identifier yet.
    #[error("local identity not assigned yet")]
    IdentityPending,

    /// A joiner's link to the host is not open.
    #[error("not connected to the host")]
    HostNotConnected,
}

/// Errors surfaced by the session controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Local action was rejected by a guard.
    #[error(transparent)]
    Rejected(#[from] RejectedAction),

    /// Local identifier assigned by the transport is unusable.
    #[error("unusable local identity: {0}")]
    Identity(#[from] IdentityError),

    /// Outbound message could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// True if this is a guard rejection rather than a failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}
