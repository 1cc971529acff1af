//! Session events and actions.

use peerlobby_proto::{Participant, PeerId};

/// Events the caller feeds into the session.
///
/// The caller is responsible for:
/// - Opening the transport with the session's identifier hint
/// - Dialing whatever [`SessionAction::Dial`] asks for
/// - Forwarding every transport callback, in order, from a single consumer
///
/// Generic over `C`, the transport's channel handle.
#[derive(Debug)]
pub enum SessionEvent<C> {
    /// Transport assigned the local identifier.
    LocalReady {
        /// Identifier other participants dial to reach us.
        local_id: PeerId,
    },

    /// Outbound dial returned a handle. The connection is not open yet.
    Dialed {
        /// Remote that was dialed.
        remote: PeerId,
        /// Handle for the new connection.
        channel: C,
    },

    /// A remote dialed our identifier. The connection is not open yet.
    IncomingConnection {
        /// Remote that dialed in.
        remote: PeerId,
        /// Handle for the new connection.
        channel: C,
    },

    /// A registered connection signalled open.
    ConnectionOpened {
        /// Remote on the other end.
        remote: PeerId,
    },

    /// A frame arrived on a connection.
    DataReceived {
        /// Remote the frame came from.
        from: PeerId,
        /// Raw frame text.
        frame: String,
    },

    /// A connection closed or failed. Emitted at most once per connection.
    ConnectionClosed {
        /// Remote on the other end.
        remote: PeerId,
    },
}

/// Actions the caller must execute after processing an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open an outbound connection to `remote` and report the handle via
    /// [`SessionEvent::Dialed`].
    Dial {
        /// Identifier to dial.
        remote: PeerId,
    },

    /// Visible state changed; re-read the session and redraw.
    Render,

    /// The room started. Hand the roster to whatever runs the game.
    Started {
        /// Roster at the moment of the start.
        roster: Vec<Participant>,
    },

    /// The host went away. The room cannot recover.
    HostLost {
        /// Host that was lost.
        host: PeerId,
    },
}
