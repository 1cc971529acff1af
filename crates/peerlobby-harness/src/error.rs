//! Simulation errors.

use peerlobby_core::{PeerId, SessionError};
use thiserror::Error;

/// Errors from driving a simulated room.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Another endpoint already holds this identifier.
    #[error("peer id {0} already taken")]
    IdTaken(PeerId),

    /// The simulated room already has a host.
    #[error("room already has a host")]
    HostExists,

    /// No participant with this identifier.
    #[error("no participant {0}")]
    UnknownParticipant(PeerId),

    /// The network did not go quiet within the step budget.
    #[error("network still busy after {steps} steps")]
    Diverged {
        /// Steps taken before giving up.
        steps: usize,
    },

    /// A session returned an error.
    #[error(transparent)]
    Session(#[from] SessionError),
}
