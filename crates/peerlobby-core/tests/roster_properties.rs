//! Property-based tests for the roster store.
//!
//! These tests verify critical invariants:
//! - Upsert keeps exactly one entry per id, in first-seen order
//! - `set_ready` is idempotent
//! - The start gate holds trivially on a roster of one

use std::collections::HashSet;

use peerlobby_core::{Participant, PeerId, Roster};
use proptest::prelude::*;

fn arbitrary_peer_id() -> impl Strategy<Value = PeerId> {
    "user-[0-9A-F]{5}".prop_map(PeerId::new)
}

fn arbitrary_participant() -> impl Strategy<Value = Participant> {
    (arbitrary_peer_id(), "[a-zA-Z]{2,10}", any::<bool>())
        .prop_map(|(id, name, ready)| Participant { id, name, ready })
}

fn filled(participants: &[Participant]) -> Roster {
    let mut roster = Roster::default();
    for p in participants {
        roster.upsert(p.clone());
    }
    roster
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: one entry per distinct id, in first-seen order, first write wins
    #[test]
    fn prop_upsert_unique_first_seen(participants in prop::collection::vec(arbitrary_participant(), 0..32)) {
        let roster = filled(&participants);

        let mut seen = HashSet::new();
        let expected: Vec<_> =
            participants.iter().filter(|p| seen.insert(p.id.clone())).cloned().collect();

        prop_assert_eq!(roster.participants(), expected.as_slice());
    }

    /// Property: applying set_ready twice equals applying it once
    #[test]
    fn prop_set_ready_idempotent(
        participants in prop::collection::vec(arbitrary_participant(), 1..16),
        pick in any::<prop::sample::Index>(),
        stranger in arbitrary_peer_id(),
    ) {
        let roster = filled(&participants);
        let target = pick.get(&participants).id.clone();

        for id in [target, stranger] {
            let mut once = roster.clone();
            once.set_ready(&id);
            let mut twice = once.clone();
            prop_assert!(!twice.set_ready(&id));
            prop_assert_eq!(&once, &twice);
        }
    }

    /// Property: a roster holding only self always passes the start gate
    #[test]
    fn prop_singleton_all_ready(me in arbitrary_participant()) {
        let roster = Roster::seeded(me.clone());
        prop_assert!(roster.all_ready_except_self(&me.id));
        prop_assert!(roster.waiting_on(&me.id).is_empty());
    }

    /// Property: removing an id leaves the others in their original order
    #[test]
    fn prop_remove_preserves_order(
        participants in prop::collection::vec(arbitrary_participant(), 1..16),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut roster = filled(&participants);
        let target = pick.get(&participants).id.clone();
        let expected: Vec<_> =
            roster.participants().iter().filter(|p| p.id != target).cloned().collect();

        prop_assert!(roster.remove(&target).is_some());
        prop_assert_eq!(roster.participants(), expected.as_slice());
    }
}
