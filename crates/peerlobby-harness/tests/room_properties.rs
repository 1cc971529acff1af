//! Property-based tests for whole rooms.
//!
//! Applies arbitrary sequences of joins, chats, readiness, starts, leaves, and
//! link failures to a simulated room and checks the standard invariants after
//! every settled step.

use peerlobby_core::{PeerId, RoomPhase, SessionError};
use peerlobby_harness::{InvariantRegistry, SimError, SimRoom};
use proptest::prelude::*;

/// One operation against the room. Participant indices wrap around whoever
/// is present when the operation runs.
#[derive(Debug, Clone)]
enum RoomOp {
    Join,
    Chat(usize, String),
    Ready(usize),
    Start,
    Leave(usize),
    BreakLink(usize),
    DropLink(usize),
    /// Deliver a few events without settling.
    Step(u8),
}

fn op_strategy() -> impl Strategy<Value = RoomOp> {
    prop_oneof![
        3 => Just(RoomOp::Join),
        3 => (any::<usize>(), "[ -~]{0,16}").prop_map(|(i, text)| RoomOp::Chat(i, text)),
        3 => any::<usize>().prop_map(RoomOp::Ready),
        2 => Just(RoomOp::Start),
        1 => any::<usize>().prop_map(RoomOp::Leave),
        1 => any::<usize>().prop_map(RoomOp::BreakLink),
        1 => any::<usize>().prop_map(RoomOp::DropLink),
        2 => (1u8..6).prop_map(RoomOp::Step),
    ]
}

fn pick(room: &SimRoom, index: usize) -> Option<PeerId> {
    let ids = room.participants();
    if ids.is_empty() { None } else { Some(ids[index % ids.len()].clone()) }
}

/// Joiner at `index`, skipping the host.
fn pick_joiner(room: &SimRoom, index: usize) -> Option<PeerId> {
    let host = room.host()?.clone();
    let joiners: Vec<_> = room.participants().into_iter().filter(|id| id != &host).collect();
    if joiners.is_empty() { None } else { Some(joiners[index % joiners.len()].clone()) }
}

/// Guard rejections are expected under random operations; anything else is
/// a failure.
fn tolerate_rejection(result: Result<(), SimError>) -> Result<(), SimError> {
    match result {
        Err(SimError::Session(SessionError::Rejected(_))) => Ok(()),
        other => other,
    }
}

fn apply(room: &mut SimRoom, op: &RoomOp) -> Result<(), SimError> {
    match op {
        RoomOp::Join => {
            let Some(host) = room.host().cloned() else {
                return Ok(());
            };
            let code = room.session(&host).and_then(|s| s.room_code()).cloned();
            if let Some(code) = code {
                room.join("guest", &code)?;
            }
        },
        RoomOp::Chat(i, text) => {
            if let Some(id) = pick(room, *i) {
                room.send_chat(&id, text)?;
            }
        },
        RoomOp::Ready(i) => {
            if let Some(id) = pick(room, *i) {
                tolerate_rejection(room.mark_ready(&id))?;
            }
        },
        RoomOp::Start => {
            if let Some(host) = room.host().cloned() {
                tolerate_rejection(room.request_start(&host))?;
            }
        },
        RoomOp::Leave(i) => {
            if let Some(id) = pick_joiner(room, *i) {
                room.disconnect(&id)?;
            }
        },
        RoomOp::BreakLink(i) => {
            if let (Some(host), Some(id)) = (room.host().cloned(), pick_joiner(room, *i)) {
                room.break_link(&host, &id);
            }
        },
        RoomOp::DropLink(i) => {
            if let (Some(host), Some(id)) = (room.host().cloned(), pick_joiner(room, *i)) {
                room.drop_link(&host, &id);
            }
        },
        RoomOp::Step(n) => {
            for _ in 0..*n {
                room.step()?;
            }
        },
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Standard invariants hold after every operation, in flight or settled.
    #[test]
    fn prop_invariants_hold_under_arbitrary_ops(
        seed in any::<u64>(),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let registry = InvariantRegistry::standard();
        let mut room = SimRoom::new(seed);
        room.create_room("host")?;

        for (i, op) in ops.iter().enumerate() {
            apply(&mut room, op)?;
            registry.assert_all(&room.snapshot(), &format!("after op {i} {op:?}"));
        }

        room.settle()?;
        registry.assert_all(&room.snapshot(), "after final settle");
    }

    /// Once started, the host never goes back to the lobby.
    #[test]
    fn prop_started_is_final(
        seed in any::<u64>(),
        ops in prop::collection::vec(op_strategy(), 1..30),
    ) {
        let mut room = SimRoom::new(seed);
        room.create_room("host")?;
        let host = room.host().cloned();
        let mut started = false;

        for op in &ops {
            apply(&mut room, op)?;
            let phase = host.as_ref().and_then(|h| room.session(h)).map(|s| s.room_state());
            if started {
                prop_assert_eq!(phase, Some(RoomPhase::Started));
            }
            started |= phase == Some(RoomPhase::Started);
        }
    }

    /// Without link failures or departures, every joiner ends up with the
    /// host's roster and message count.
    #[test]
    fn prop_quiet_network_converges(
        seed in any::<u64>(),
        joins in 1usize..6,
        chats in prop::collection::vec((any::<usize>(), "[a-z]{1,8}"), 0..10),
    ) {
        let mut room = SimRoom::new(seed);
        let code = room.create_room("host")?;
        for _ in 0..joins {
            room.join("guest", &code)?;
        }
        room.settle()?;

        for (i, text) in &chats {
            if let Some(id) = pick(&room, *i) {
                room.send_chat(&id, text)?;
            }
        }
        room.settle()?;

        let snapshot = room.snapshot();
        let host = snapshot.host().cloned().unwrap();
        prop_assert_eq!(host.roster.len(), joins + 1);
        for joiner in snapshot.joiners() {
            prop_assert_eq!(&joiner.roster, &host.roster);
            prop_assert_eq!(joiner.message_count, chats.len());
        }
    }
}
