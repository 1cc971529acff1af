//! Roster store: participant id → {name, ready}, in arrival order.
//!
//! On the host the roster is authoritative. On a joiner it mirrors whatever
//! the host last broadcast, and starts out [`Roster::Uninitialized`] until the
//! joiner either announces itself or receives a snapshot. An uninitialized
//! roster is distinct from a known-but-empty one.
//!
//! # Invariants
//!
//! - No two entries share an id.
//! - Entries keep first-seen order; nothing re-sorts them.
//! - `upsert` never overwrites an existing entry. Only `set_ready` mutates one.

use peerlobby_proto::{Participant, PeerId};

/// Ordered participant collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Roster {
    /// No membership information yet.
    #[default]
    Uninitialized,
    /// Membership as last known, in arrival order.
    Known(Vec<Participant>),
}

impl Roster {
    /// Known roster holding a single participant.
    pub fn seeded(participant: Participant) -> Self {
        Self::Known(vec![participant])
    }

    /// True once membership information exists.
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Entries in arrival order. Empty while uninitialized.
    pub fn participants(&self) -> &[Participant] {
        match self {
            Self::Uninitialized => &[],
            Self::Known(entries) => entries,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.participants().len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.participants().is_empty()
    }

    /// Entry for `id`. `None` if absent.
    pub fn get(&self, id: &PeerId) -> Option<&Participant> {
        self.participants().iter().find(|p| &p.id == id)
    }

    /// Check if `id` has an entry.
    pub fn contains(&self, id: &PeerId) -> bool {
        self.get(id).is_some()
    }

    /// Append `participant` if its id is unseen.
    ///
    /// Returns `true` if the roster changed. An existing entry with the same id
    /// is left untouched, name and ready flag included.
    pub fn upsert(&mut self, participant: Participant) -> bool {
        match self {
            Self::Uninitialized => {
                *self = Self::seeded(participant);
                true
            },
            Self::Known(entries) => {
                if entries.iter().any(|p| p.id == participant.id) {
                    return false;
                }
                entries.push(participant);
                true
            },
        }
    }

    /// Mark `id` ready. No-op if absent.
    ///
    /// Returns `true` if the flag flipped.
    pub fn set_ready(&mut self, id: &PeerId) -> bool {
        let Self::Known(entries) = self else {
            return false;
        };

        match entries.iter_mut().find(|p| &p.id == id) {
            Some(entry) if !entry.ready => {
                entry.ready = true;
                true
            },
            _ => false,
        }
    }

    /// Replace the whole roster with a host snapshot. Not a merge.
    pub fn replace_all(&mut self, participants: Vec<Participant>) {
        *self = Self::Known(participants);
    }

    /// Drop the entry for `id`, returning it. `None` if absent.
    pub fn remove(&mut self, id: &PeerId) -> Option<Participant> {
        let Self::Known(entries) = self else {
            return None;
        };

        let index = entries.iter().position(|p| &p.id == id)?;
        Some(entries.remove(index))
    }

    /// True if every entry other than `self_id` is ready.
    ///
    /// Vacuously true for a roster holding only `self_id`.
    pub fn all_ready_except_self(&self, self_id: &PeerId) -> bool {
        self.participants().iter().all(|p| &p.id == self_id || p.ready)
    }

    /// Entries other than `self_id` that are not ready, in roster order.
    pub fn waiting_on(&self, self_id: &PeerId) -> Vec<PeerId> {
        self.participants()
            .iter()
            .filter(|p| &p.id != self_id && !p.ready)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Copy of the entries, as sent in a roster broadcast.
    pub fn snapshot(&self) -> Vec<Participant> {
        self.participants().to_vec()
    }
}
