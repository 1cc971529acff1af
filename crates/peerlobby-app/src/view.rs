//! Render-ready snapshot of a session.
//!
//! The runtime publishes a fresh [`RoomView`] whenever the session asks for a
//! redraw. Front ends only ever read views; they never touch the session.

use peerlobby_core::{
    Channel, Participant, PeerId, RejectedAction, Role, RoomCode, RoomPhase, Session,
};

/// One chat line with its display label resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    /// Author.
    pub sender: PeerId,
    /// Display label: own nickname with `(me)`, roster name, or `Unknown`.
    pub label: String,
    /// Message body.
    pub text: String,
    /// True if the local participant wrote it.
    pub own: bool,
}

/// Everything a front end needs to draw the lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    /// Host or participant.
    pub role: Role,
    /// Local identifier, once assigned.
    pub local_id: Option<PeerId>,
    /// Shareable code, once known.
    pub room_code: Option<RoomCode>,
    /// Lobby or started.
    pub phase: RoomPhase,
    /// Roster in display order.
    pub roster: Vec<Participant>,
    /// False until the roster has been seeded or received.
    pub roster_known: bool,
    /// Chat log in arrival order.
    pub chat: Vec<ChatLine>,
    /// Local readiness.
    pub is_ready: bool,
    /// Whether the start button should be enabled.
    pub can_start: bool,
    /// Set once the host went away.
    pub host_lost: Option<PeerId>,
    /// Roster handed over when the room started.
    pub started_roster: Option<Vec<Participant>>,
    /// Most recent rejected local action.
    pub last_rejection: Option<RejectedAction>,
}

impl RoomView {
    /// Snapshot the session. Runtime-tracked notices start empty.
    pub fn from_session<C: Channel>(session: &Session<C>) -> Self {
        let local_id = session.local_id().cloned();
        let chat = session
            .messages()
            .iter()
            .map(|message| ChatLine {
                sender: message.from.clone(),
                label: session.sender_label(&message.from),
                text: message.text.clone(),
                own: local_id.as_ref() == Some(&message.from),
            })
            .collect();

        Self {
            role: session.role(),
            room_code: session.room_code().cloned(),
            phase: session.room_state(),
            roster: session.roster().snapshot(),
            roster_known: session.roster().is_known(),
            chat,
            is_ready: session.is_ready(),
            can_start: session.can_start(),
            local_id,
            host_lost: None,
            started_roster: None,
            last_rejection: None,
        }
    }

    /// True once the room has started.
    pub fn is_started(&self) -> bool {
        self.phase == RoomPhase::Started
    }

    /// Roster entry for `id`.
    pub fn participant(&self, id: &PeerId) -> Option<&Participant> {
        self.roster.iter().find(|p| &p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use peerlobby_core::{
        ChannelError, Environment, SessionAction, SessionConfig, SessionEvent,
    };

    use super::*;

    #[derive(Clone)]
    struct ZeroEnv;

    impl Environment for ZeroEnv {
        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(0);
        }
    }

    #[derive(Debug, Default)]
    struct NullChannel;

    impl Channel for NullChannel {
        fn send(&mut self, _frame: &str) -> Result<(), ChannelError> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    #[test]
    fn fresh_session_has_empty_view() {
        let session: Session<NullChannel> = Session::new(&ZeroEnv, SessionConfig::host("Alice"));
        let view = RoomView::from_session(&session);

        assert_eq!(view.role, Role::Host);
        assert!(view.local_id.is_none());
        assert!(view.room_code.is_none());
        assert!(!view.roster_known);
        assert!(view.chat.is_empty());
        assert!(!view.can_start);
    }

    #[test]
    fn own_lines_are_labelled() {
        let mut session: Session<NullChannel> =
            Session::new(&ZeroEnv, SessionConfig::host("Alice"));
        let local_id = session.local_id_hint().clone();
        let actions = session.handle(SessionEvent::LocalReady { local_id: local_id.clone() }).unwrap();
        assert_eq!(actions, vec![SessionAction::Render]);

        session.send_chat("hi").unwrap();
        let view = RoomView::from_session(&session);

        assert_eq!(view.room_code, RoomCode::from_peer_id(&local_id).ok());
        assert_eq!(view.chat.len(), 1);
        assert!(view.chat[0].own);
        assert_eq!(view.chat[0].label, "Alice (me)");
        assert!(view.participant(&local_id).is_some());
        assert!(view.can_start);
    }
}
