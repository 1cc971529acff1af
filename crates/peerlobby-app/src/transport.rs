//! Transport trait for abstracting peer-to-peer I/O.
//!
//! The [`Transport`] trait decouples the [`crate::Runtime`] from any specific
//! connection library. An implementation assigns the local identifier, dials
//! remote identifiers, and reports every connection callback as a
//! [`TransportEvent`] on one stream, so the runtime consumes them from a
//! single place.
//!
//! # Implementations
//!
//! - [`crate::LocalBroker`]: In-memory rendezvous for participants in one
//!   process
//! - A WebRTC or QUIC data-channel transport would implement the same trait

use std::future::Future;

use peerlobby_core::{Channel, PeerId, SessionEvent};

use crate::error::TransportError;

/// Callback from the transport.
#[derive(Debug)]
pub enum TransportEvent<C> {
    /// A remote dialed our identifier.
    Incoming {
        /// Dialing participant.
        remote: PeerId,
        /// Handle for the new connection.
        channel: C,
    },

    /// A connection is open. Emitted at most once per connection.
    Opened {
        /// Other end.
        remote: PeerId,
    },

    /// A frame arrived.
    Data {
        /// Sender.
        from: PeerId,
        /// Raw frame.
        frame: String,
    },

    /// A connection closed or failed. Emitted at most once per connection.
    Closed {
        /// Other end.
        remote: PeerId,
    },
}

impl<C> From<TransportEvent<C>> for SessionEvent<C> {
    fn from(event: TransportEvent<C>) -> Self {
        match event {
            TransportEvent::Incoming { remote, channel } => {
                SessionEvent::IncomingConnection { remote, channel }
            },
            TransportEvent::Opened { remote } => SessionEvent::ConnectionOpened { remote },
            TransportEvent::Data { from, frame } => SessionEvent::DataReceived { from, frame },
            TransportEvent::Closed { remote } => SessionEvent::ConnectionClosed { remote },
        }
    }
}

/// Abstracts peer-to-peer connection management.
pub trait Transport: Send {
    /// Connection handle.
    type Channel: Channel + Send + 'static;

    /// Claim a local identifier, preferably `hint`.
    ///
    /// Returns the identifier actually assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier cannot be claimed.
    fn open(&mut self, hint: &PeerId) -> impl Future<Output = Result<PeerId, TransportError>> + Send;

    /// Dial `remote`. The handle is usable once
    /// [`TransportEvent::Opened`] arrives for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not open or `remote` cannot be
    /// reached at all.
    fn connect(&mut self, remote: &PeerId) -> Result<Self::Channel, TransportError>;

    /// Next callback. `None` once the transport is shut down.
    ///
    /// Must be cancel-safe: the runtime polls it inside `select!`.
    fn next_event(&mut self) -> impl Future<Output = Option<TransportEvent<Self::Channel>>> + Send;

    /// Release the local identifier. Safe to call repeatedly.
    fn shutdown(&mut self);
}
