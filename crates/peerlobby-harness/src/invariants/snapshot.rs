//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture what every participant can see at one instant.
//! Invariants run against snapshots rather than live sessions so a check
//! never observes a half-processed event.

use peerlobby_core::{Participant, PeerId, Role, RoomPhase};

/// Snapshot of every participant in a simulated room.
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    /// Per-participant state, in join order.
    pub nodes: Vec<NodeSnapshot>,
    /// True if no event is in flight.
    pub quiescent: bool,
}

impl RoomSnapshot {
    /// The hosting participant, if still present.
    pub fn host(&self) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.role == Role::Host)
    }

    /// Every non-host participant.
    pub fn joiners(&self) -> impl Iterator<Item = &NodeSnapshot> {
        self.nodes.iter().filter(|n| n.role == Role::Participant)
    }

    /// Participant with `id`.
    pub fn node(&self, id: &PeerId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| &n.id == id)
    }
}

/// One participant's observable state.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    /// Local identifier.
    pub id: PeerId,
    /// Host or joiner.
    pub role: Role,
    /// Lobby or started.
    pub phase: RoomPhase,
    /// `false` while the roster is uninitialized.
    pub roster_known: bool,
    /// Roster in order.
    pub roster: Vec<Participant>,
    /// Remotes with open connections.
    pub connections: Vec<PeerId>,
    /// Chat log length.
    pub message_count: usize,
    /// Times the session reported the room started.
    pub started_notices: usize,
}

impl NodeSnapshot {
    /// Roster ids in order.
    pub fn roster_ids(&self) -> Vec<&PeerId> {
        self.roster.iter().map(|p| &p.id).collect()
    }

    /// Check for an open connection to `remote`.
    pub fn is_connected_to(&self, remote: &PeerId) -> bool {
        self.connections.contains(remote)
    }
}
