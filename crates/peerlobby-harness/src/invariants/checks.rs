//! Standard invariant checks.
//!
//! These invariants capture properties of the room protocol that must hold
//! after any sequence of joins, chats, readiness changes, starts, and link
//! failures. Some only hold once the network is quiet; those skip in-flight
//! snapshots.

use std::collections::BTreeSet;

use peerlobby_core::RoomPhase;

use super::{Invariant, InvariantResult, RoomSnapshot, Violation};

/// No roster holds two entries with the same id.
pub struct UniqueRosterIds;

impl Invariant for UniqueRosterIds {
    fn name(&self) -> &'static str {
        "unique_roster_ids"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        for node in &state.nodes {
            let ids = node.roster_ids();
            let distinct: BTreeSet<_> = ids.iter().collect();
            if distinct.len() != ids.len() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{}: duplicate roster ids {ids:?}", node.id),
                });
            }
        }
        Ok(())
    }
}

/// Once quiet, the host's roster is itself plus one entry per open
/// connection.
///
/// A stale entry means a disconnect was missed; a missing one means a join
/// announcement was lost.
pub struct HostRosterMatchesConnections;

impl Invariant for HostRosterMatchesConnections {
    fn name(&self) -> &'static str {
        "host_roster_matches_connections"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        let Some(host) = state.host() else {
            return Ok(());
        };
        if !state.quiescent {
            return Ok(());
        }

        let roster: BTreeSet<_> = host.roster_ids().into_iter().collect();
        let expected: BTreeSet<_> =
            host.connections.iter().chain(std::iter::once(&host.id)).collect();

        if roster != expected {
            return Err(Violation {
                invariant: self.name(),
                message: format!("host roster {roster:?} but connected to {expected:?}"),
            });
        }
        Ok(())
    }
}

/// Once quiet, every joiner still connected to the host mirrors its roster
/// exactly, order included.
pub struct MirrorConvergence;

impl Invariant for MirrorConvergence {
    fn name(&self) -> &'static str {
        "mirror_convergence"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        let Some(host) = state.host() else {
            return Ok(());
        };
        if !state.quiescent {
            return Ok(());
        }

        for joiner in state.joiners().filter(|j| j.is_connected_to(&host.id)) {
            if joiner.roster != host.roster {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{} sees {:?}, host has {:?}",
                        joiner.id,
                        joiner.roster_ids(),
                        host.roster_ids()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A joiner never reaches `Started` before its host, and every participant
/// reports the start exactly once.
pub struct StartedOnce;

impl Invariant for StartedOnce {
    fn name(&self) -> &'static str {
        "started_once"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        for node in &state.nodes {
            let started = node.phase == RoomPhase::Started;
            let expected_notices = usize::from(started);
            if node.started_notices != expected_notices {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{}: phase {:?} with {} start notices",
                        node.id, node.phase, node.started_notices
                    ),
                });
            }
        }

        if let Some(host) = state.host()
            && host.phase == RoomPhase::Lobby
            && let Some(ahead) = state.joiners().find(|j| j.phase == RoomPhase::Started)
        {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{} started while host {} is in the lobby", ahead.id, host.id),
            });
        }
        Ok(())
    }
}
