//! Session controller.
//!
//! Owns everything one local participant needs for one room: the role, the
//! connection registry, and the protocol engine. Transport callbacks come in
//! as [`SessionEvent`]s, front-end intents as method calls. Both run to
//! completion before returning, so a single consumer calling into the session
//! needs no locking.
//!
//! Engine effects are executed here against the registry. A send that fails
//! is treated as if the remote disconnected, and the resulting roster
//! rebroadcast is executed in turn until no further failure occurs.

use std::collections::VecDeque;

use peerlobby_proto::{ChatMessage, PeerId, WireMessage};

use crate::{
    engine::{Role, RoomAction, RoomEngine, RoomPhase},
    env::Environment,
    error::{DeliveryError, RejectedAction, SessionError},
    event::{SessionAction, SessionEvent},
    identity::RoomCode,
    registry::{Channel, ConnectionRegistry},
    roster::Roster,
};

/// Sender label used when a message's author is no longer in the roster.
pub const UNKNOWN_SENDER: &str = "Unknown";

static UNINITIALIZED: Roster = Roster::Uninitialized;

/// Whether the local participant creates a room or joins one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RoomIntent {
    /// Create a room and host it.
    #[default]
    Create,
    /// Join the room with this code.
    Join(RoomCode),
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Display name shown to other participants.
    pub nickname: String,
    /// Create or join.
    pub intent: RoomIntent,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { nickname: "Player".to_string(), intent: RoomIntent::Create }
    }
}

impl SessionConfig {
    /// Config for hosting a new room.
    pub fn host(nickname: impl Into<String>) -> Self {
        Self { nickname: nickname.into(), intent: RoomIntent::Create }
    }

    /// Config for joining `code`.
    pub fn join(nickname: impl Into<String>, code: RoomCode) -> Self {
        Self { nickname: nickname.into(), intent: RoomIntent::Join(code) }
    }
}

enum SessionState {
    AwaitingIdentity,
    Active { code: RoomCode, engine: RoomEngine },
}

/// One local participant's view of one room.
pub struct Session<C: Channel> {
    config: SessionConfig,
    local_id_hint: PeerId,
    state: SessionState,
    registry: ConnectionRegistry<C>,
}

impl<C: Channel> Session<C> {
    /// New session. Draws a fresh local identifier hint from `env`.
    ///
    /// Open the transport with [`Session::local_id_hint`] and feed back
    /// [`SessionEvent::LocalReady`].
    pub fn new<E: Environment>(env: &E, config: SessionConfig) -> Self {
        let local_id_hint = RoomCode::generate(env).peer_id();
        Self {
            config,
            local_id_hint,
            state: SessionState::AwaitingIdentity,
            registry: ConnectionRegistry::new(),
        }
    }

    /// Identifier to request from the transport.
    pub fn local_id_hint(&self) -> &PeerId {
        &self.local_id_hint
    }

    /// Process a transport event.
    ///
    /// # Errors
    ///
    /// - `SessionError::Identity` if a hosting participant is assigned an
    ///   identifier outside the room namespace
    /// - `SessionError::Protocol` if an outbound message fails to encode
    pub fn handle(&mut self, event: SessionEvent<C>) -> Result<Vec<SessionAction>, SessionError> {
        match event {
            SessionEvent::LocalReady { local_id } => self.handle_local_ready(local_id),
            SessionEvent::Dialed { remote, channel } => {
                self.handle_new_connection(remote, channel, false);
                Ok(vec![])
            },
            SessionEvent::IncomingConnection { remote, channel } => {
                self.handle_new_connection(remote, channel, true);
                Ok(vec![])
            },
            SessionEvent::ConnectionOpened { remote } => self.handle_opened(&remote),
            SessionEvent::DataReceived { from, frame } => self.handle_data(&from, &frame),
            SessionEvent::ConnectionClosed { remote } => self.handle_closed(&remote),
        }
    }

    fn handle_local_ready(&mut self, local_id: PeerId) -> Result<Vec<SessionAction>, SessionError> {
        if let SessionState::Active { engine, .. } = &self.state {
            tracing::warn!(%local_id, current = %engine.local_id(), "local identity already assigned");
            return Ok(vec![]);
        }

        let nickname = self.config.nickname.clone();
        let (code, engine, actions) = match &self.config.intent {
            RoomIntent::Create => {
                let code = RoomCode::from_peer_id(&local_id)?;
                tracing::info!(%code, %nickname, "room created");
                (code, RoomEngine::host(local_id, nickname), vec![SessionAction::Render])
            },
            RoomIntent::Join(code) => {
                let host = code.peer_id();
                tracing::info!(%code, %nickname, "joining room");
                let actions = vec![SessionAction::Dial { remote: host.clone() }];
                (code.clone(), RoomEngine::joiner(local_id, nickname, host), actions)
            },
        };

        self.state = SessionState::Active { code, engine };
        Ok(actions)
    }

    fn handle_new_connection(&mut self, remote: PeerId, mut channel: C, inbound: bool) {
        let accepted = match self.role() {
            Role::Host => inbound,
            Role::Participant => !inbound,
        };
        if !accepted || !self.is_active() {
            tracing::warn!(%remote, inbound, "unexpected connection refused");
            channel.close();
            return;
        }

        if let Err(e) = self.registry.add_opening(remote, channel) {
            tracing::warn!("{e}, second channel closed");
        }
    }

    fn handle_opened(&mut self, remote: &PeerId) -> Result<Vec<SessionAction>, SessionError> {
        if !self.registry.mark_open(remote) {
            tracing::warn!(%remote, "open signal for unknown or already open connection");
            return Ok(vec![]);
        }

        let actions = match &mut self.state {
            SessionState::Active { engine, .. } => engine.connection_opened(remote),
            SessionState::AwaitingIdentity => vec![],
        };
        self.execute(actions)
    }

    fn handle_data(&mut self, from: &PeerId, frame: &str) -> Result<Vec<SessionAction>, SessionError> {
        let SessionState::Active { engine, .. } = &mut self.state else {
            tracing::warn!(%from, "data before local identity, dropping");
            return Ok(vec![]);
        };

        if !self.registry.by_id(from).is_some_and(|c| c.is_open()) {
            tracing::warn!(%from, "data from unregistered connection, dropping");
            return Ok(vec![]);
        }

        let message = match WireMessage::decode(frame) {
            Ok(message) => message,
            Err(e) if e.is_unknown_type() => {
                tracing::debug!(%from, "{e}, dropping");
                return Ok(vec![]);
            },
            Err(e) => {
                tracing::warn!(%from, "{e}, dropping");
                return Ok(vec![]);
            },
        };

        let actions = engine.handle_message(from, message);
        self.execute(actions)
    }

    fn handle_closed(&mut self, remote: &PeerId) -> Result<Vec<SessionAction>, SessionError> {
        if !self.registry.contains(remote) {
            tracing::debug!(%remote, "close for unregistered connection");
            return Ok(vec![]);
        }

        let actions = self.drop_peer(remote);
        self.execute(actions)
    }

    /// Remove `remote` from the registry and let the engine react.
    fn drop_peer(&mut self, remote: &PeerId) -> Vec<RoomAction> {
        if let Some(conn) = self.registry.remove(remote) {
            conn.close();
        }

        match &mut self.state {
            SessionState::Active { engine, .. } => engine.connection_closed(remote),
            SessionState::AwaitingIdentity => vec![],
        }
    }

    fn execute(&mut self, actions: Vec<RoomAction>) -> Result<Vec<SessionAction>, SessionError> {
        let mut pending: VecDeque<RoomAction> = actions.into();
        let mut output = Vec::new();
        let mut render = false;

        while let Some(action) = pending.pop_front() {
            match action {
                RoomAction::Broadcast { message, except } => {
                    let frame = message.encode()?;
                    let report = match &except {
                        Some(excluded) => self.registry.send_to_all_except(excluded, &frame),
                        None => self.registry.send_to_all(&frame),
                    };
                    for remote in report.failed {
                        pending.extend(self.drop_peer(&remote));
                    }
                },
                RoomAction::SendTo { remote, message } => {
                    let frame = message.encode()?;
                    match self.registry.send_to(&remote, &frame) {
                        Ok(()) => {},
                        Err(DeliveryError::NotConnected(remote)) => {
                            tracing::warn!(%remote, "no open connection, message dropped");
                        },
                        Err(e) => {
                            tracing::warn!("{e}");
                            pending.extend(self.drop_peer(e.remote()));
                        },
                    }
                },
                RoomAction::RosterChanged | RoomAction::MessageAppended(_) => render = true,
                RoomAction::Started { roster } => {
                    render = true;
                    output.push(SessionAction::Started { roster });
                },
                RoomAction::HostLost { host } => {
                    render = true;
                    output.push(SessionAction::HostLost { host });
                },
            }
        }

        if render {
            output.push(SessionAction::Render);
        }
        Ok(output)
    }

    fn engine_mut(&mut self) -> Result<&mut RoomEngine, RejectedAction> {
        match &mut self.state {
            SessionState::Active { engine, .. } => Ok(engine),
            SessionState::AwaitingIdentity => Err(RejectedAction::IdentityPending),
        }
    }

    fn engine(&self) -> Option<&RoomEngine> {
        match &self.state {
            SessionState::Active { engine, .. } => Some(engine),
            SessionState::AwaitingIdentity => None,
        }
    }

    /// Send a chat line. Blank text is a no-op.
    ///
    /// # Errors
    ///
    /// - `SessionError::Rejected` with `IdentityPending` before the local
    ///   identity is assigned
    /// - `SessionError::Protocol` if the message fails to encode
    pub fn send_chat(&mut self, text: &str) -> Result<Vec<SessionAction>, SessionError> {
        let actions = self.engine_mut()?.send_chat(text);
        self.execute(actions)
    }

    /// Mark the local participant ready. Repeated calls are no-ops.
    ///
    /// # Errors
    ///
    /// - `SessionError::Rejected` with `IdentityPending` before the local
    ///   identity is assigned
    /// - `SessionError::Rejected` with `HostNotConnected` if a joiner's link
    ///   to the host is not open; the ready flag is left unset
    /// - `SessionError::Protocol` if the message fails to encode
    pub fn mark_ready(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        if let SessionState::Active { code, engine: RoomEngine::Joiner(_) } = &self.state {
            let host = code.peer_id();
            if !self.registry.open_remotes().any(|remote| remote == &host) {
                return Err(RejectedAction::HostNotConnected.into());
            }
        }
        let actions = self.engine_mut()?.mark_ready();
        self.execute(actions)
    }

    /// Start the room. Host only, and only once everyone else is ready.
    ///
    /// A rejected start sends nothing and changes nothing.
    ///
    /// # Errors
    ///
    /// - `SessionError::Rejected` with `NotHost`, `NotAllReady`,
    ///   `AlreadyStarted`, or `IdentityPending`
    /// - `SessionError::Protocol` if the message fails to encode
    pub fn request_start(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        let actions = self.engine_mut()?.request_start()?;
        self.execute(actions)
    }

    /// Close every connection. Safe to call at any time, repeatedly.
    pub fn teardown(&mut self) {
        tracing::debug!(connections = self.registry.len(), "tearing down session");
        self.registry.close_all();
    }

    /// Role fixed by the session's intent.
    pub fn role(&self) -> Role {
        match self.config.intent {
            RoomIntent::Create => Role::Host,
            RoomIntent::Join(_) => Role::Participant,
        }
    }

    /// True once the transport has assigned the local identifier.
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    /// Local identifier. `None` before [`SessionEvent::LocalReady`].
    pub fn local_id(&self) -> Option<&PeerId> {
        self.engine().map(RoomEngine::local_id)
    }

    /// Shareable room code. `None` before [`SessionEvent::LocalReady`].
    pub fn room_code(&self) -> Option<&RoomCode> {
        match &self.state {
            SessionState::Active { code, .. } => Some(code),
            SessionState::AwaitingIdentity => None,
        }
    }

    /// Local display name.
    pub fn nickname(&self) -> &str {
        &self.config.nickname
    }

    /// Current roster.
    pub fn roster(&self) -> &Roster {
        self.engine().map_or(&UNINITIALIZED, RoomEngine::roster)
    }

    /// Chat log in arrival order.
    pub fn messages(&self) -> &[ChatMessage] {
        self.engine().map(RoomEngine::messages).unwrap_or_default()
    }

    /// Lobby or started.
    pub fn room_state(&self) -> RoomPhase {
        self.engine().map_or(RoomPhase::Lobby, RoomEngine::phase)
    }

    /// Whether the local participant has marked itself ready.
    pub fn is_ready(&self) -> bool {
        self.engine().is_some_and(RoomEngine::is_ready)
    }

    /// True if [`Session::request_start`] would succeed now.
    pub fn can_start(&self) -> bool {
        self.engine().is_some_and(RoomEngine::can_start)
    }

    /// Label to render next to a chat line from `from`.
    pub fn sender_label(&self, from: &PeerId) -> String {
        if self.local_id() == Some(from) {
            return format!("{} (me)", self.config.nickname);
        }
        self.roster()
            .get(from)
            .map_or_else(|| UNKNOWN_SENDER.to_string(), |p| p.name.clone())
    }

    /// Live connections.
    pub fn connections(&self) -> &ConnectionRegistry<C> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use peerlobby_proto::Participant;

    use super::*;
    use crate::error::ChannelError;

    #[derive(Clone, Default)]
    struct FixedEnv;

    impl Environment for FixedEnv {
        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(0);
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Outbox {
        sent: Rc<RefCell<Vec<String>>>,
        closed: Rc<RefCell<bool>>,
        broken: bool,
    }

    impl Outbox {
        fn frames(&self) -> Vec<WireMessage> {
            self.sent.borrow().iter().map(|f| WireMessage::decode(f).unwrap()).collect()
        }
    }

    impl Channel for Outbox {
        fn send(&mut self, frame: &str) -> Result<(), ChannelError> {
            if self.broken {
                return Err(ChannelError::Closed);
            }
            self.sent.borrow_mut().push(frame.to_string());
            Ok(())
        }

        fn close(&mut self) {
            *self.closed.borrow_mut() = true;
        }
    }

    fn host_id() -> PeerId {
        PeerId::new("user-ABCDE")
    }

    fn bob_id() -> PeerId {
        PeerId::new("user-B0B00")
    }

    fn hosting() -> Session<Outbox> {
        let mut session = Session::new(&FixedEnv, SessionConfig::host("Alice"));
        session.handle(SessionEvent::LocalReady { local_id: host_id() }).unwrap();
        session
    }

    fn connect(session: &mut Session<Outbox>, remote: PeerId) -> Outbox {
        let channel = Outbox::default();
        session
            .handle(SessionEvent::IncomingConnection { remote: remote.clone(), channel: channel.clone() })
            .unwrap();
        session.handle(SessionEvent::ConnectionOpened { remote }).unwrap();
        channel
    }

    fn frame(message: &WireMessage) -> String {
        message.encode().unwrap()
    }

    #[test]
    fn hint_is_namespaced() {
        let session: Session<Outbox> = Session::new(&FixedEnv, SessionConfig::default());
        assert_eq!(session.local_id_hint().as_str(), "user-00000");
        assert!(!session.is_active());
    }

    #[test]
    fn actions_before_identity_are_rejected() {
        let mut session: Session<Outbox> = Session::new(&FixedEnv, SessionConfig::default());
        assert_eq!(
            session.send_chat("hi"),
            Err(SessionError::Rejected(RejectedAction::IdentityPending))
        );
        assert!(!session.roster().is_known());
    }

    #[test]
    fn hosting_uses_own_code() {
        let session = hosting();
        assert_eq!(session.room_code().map(RoomCode::as_str), Some("ABCDE"));
        assert_eq!(session.role(), Role::Host);
        assert_eq!(session.roster().participants(), &[Participant::new(host_id(), "Alice")]);
    }

    #[test]
    fn host_rejects_foreign_identity() {
        let mut session: Session<Outbox> = Session::new(&FixedEnv, SessionConfig::host("Alice"));
        let result = session.handle(SessionEvent::LocalReady { local_id: PeerId::new("anon") });
        assert!(matches!(result, Err(SessionError::Identity(_))));
    }

    #[test]
    fn joiner_dials_host_on_ready() {
        let code = RoomCode::parse("ABCDE").unwrap();
        let mut session: Session<Outbox> = Session::new(&FixedEnv, SessionConfig::join("Bob", code));

        let actions = session.handle(SessionEvent::LocalReady { local_id: bob_id() }).unwrap();

        assert_eq!(actions, vec![SessionAction::Dial { remote: host_id() }]);
        assert_eq!(session.role(), Role::Participant);
    }

    #[test]
    fn host_greets_then_broadcasts_join() {
        let mut session = hosting();
        let bob = connect(&mut session, bob_id());
        assert_eq!(
            bob.frames(),
            vec![WireMessage::User { user: Participant::new(host_id(), "Alice") }]
        );

        let announce = WireMessage::User { user: Participant::new(bob_id(), "Bob") };
        let actions = session
            .handle(SessionEvent::DataReceived { from: bob_id(), frame: frame(&announce) })
            .unwrap();

        assert_eq!(actions, vec![SessionAction::Render]);
        assert!(matches!(bob.frames().last(), Some(WireMessage::UserList { users }) if users.len() == 2));
    }

    #[test]
    fn garbage_frames_are_dropped() {
        let mut session = hosting();
        connect(&mut session, bob_id());
        let before = session.roster().clone();

        for junk in ["not json", r#"{"type":"teleport"}"#, r#"{"no":"type"}"#] {
            let actions = session
                .handle(SessionEvent::DataReceived { from: bob_id(), frame: junk.to_string() })
                .unwrap();
            assert!(actions.is_empty());
        }
        assert_eq!(session.roster(), &before);
    }

    #[test]
    fn data_from_unregistered_peer_is_dropped() {
        let mut session = hosting();
        let announce = WireMessage::User { user: Participant::new(bob_id(), "Bob") };

        session
            .handle(SessionEvent::DataReceived { from: bob_id(), frame: frame(&announce) })
            .unwrap();

        assert_eq!(session.roster().len(), 1);
    }

    #[test]
    fn failed_delivery_counts_as_disconnect() {
        let mut session = hosting();
        let carol_id = PeerId::new("user-CAR01");
        let carol = connect(&mut session, carol_id.clone());
        let broken = Outbox { broken: true, ..Outbox::default() };
        session
            .handle(SessionEvent::IncomingConnection { remote: bob_id(), channel: broken.clone() })
            .unwrap();
        session.handle(SessionEvent::ConnectionOpened { remote: bob_id() }).unwrap();
        assert!(!session.connections().contains(&bob_id()));

        session.send_chat("anyone?").unwrap();

        assert!(*broken.closed.borrow());
        assert_eq!(session.connections().len(), 1);
        assert!(carol.frames().iter().any(|m| matches!(m, WireMessage::Message { .. })));
        assert!(session.connections().contains(&carol_id));
    }

    #[test]
    fn host_close_rebroadcasts_roster() {
        let mut session = hosting();
        let carol_id = PeerId::new("user-CAR01");
        let carol = connect(&mut session, carol_id.clone());
        connect(&mut session, bob_id());
        for (id, name) in [(bob_id(), "Bob"), (carol_id.clone(), "Carol")] {
            let announce = WireMessage::User { user: Participant::new(id.clone(), name) };
            session.handle(SessionEvent::DataReceived { from: id, frame: frame(&announce) }).unwrap();
        }

        session.handle(SessionEvent::ConnectionClosed { remote: bob_id() }).unwrap();

        assert_eq!(session.roster().len(), 2);
        assert!(matches!(
            carol.frames().last(),
            Some(WireMessage::UserList { users }) if !users.iter().any(|u| u.id == bob_id())
        ));
    }

    #[test]
    fn joiner_reports_host_loss() {
        let code = RoomCode::parse("ABCDE").unwrap();
        let mut session = Session::new(&FixedEnv, SessionConfig::join("Bob", code));
        session.handle(SessionEvent::LocalReady { local_id: bob_id() }).unwrap();
        session
            .handle(SessionEvent::Dialed { remote: host_id(), channel: Outbox::default() })
            .unwrap();
        session.handle(SessionEvent::ConnectionOpened { remote: host_id() }).unwrap();

        let actions = session.handle(SessionEvent::ConnectionClosed { remote: host_id() }).unwrap();

        assert_eq!(
            actions,
            vec![SessionAction::HostLost { host: host_id() }, SessionAction::Render]
        );
    }

    #[test]
    fn joiner_refuses_inbound_connections() {
        let code = RoomCode::parse("ABCDE").unwrap();
        let mut session = Session::new(&FixedEnv, SessionConfig::join("Bob", code));
        session.handle(SessionEvent::LocalReady { local_id: bob_id() }).unwrap();
        let stranger = Outbox::default();

        session
            .handle(SessionEvent::IncomingConnection {
                remote: PeerId::new("user-ZZZZZ"),
                channel: stranger.clone(),
            })
            .unwrap();

        assert!(session.connections().is_empty());
        assert!(*stranger.closed.borrow());
    }

    #[test]
    fn duplicate_connection_is_closed() {
        let mut session = hosting();
        let original = connect(&mut session, bob_id());
        let second = Outbox::default();

        session
            .handle(SessionEvent::IncomingConnection { remote: bob_id(), channel: second.clone() })
            .unwrap();

        assert!(*second.closed.borrow());
        assert!(!*original.closed.borrow());
        assert_eq!(session.connections().len(), 1);
        let announce = WireMessage::User { user: Participant::new(bob_id(), "Bob") };
        session.handle(SessionEvent::DataReceived { from: bob_id(), frame: frame(&announce) }).unwrap();
        assert!(matches!(original.frames().last(), Some(WireMessage::UserList { users }) if users.len() == 2));
        assert!(second.sent.borrow().is_empty());
    }

    #[test]
    fn forged_announcement_leaves_no_ghost() {
        let mut session = hosting();
        connect(&mut session, bob_id());
        let ghost = WireMessage::User { user: Participant::new(PeerId::new("user-GHOST"), "Ghost") };

        let actions =
            session.handle(SessionEvent::DataReceived { from: bob_id(), frame: frame(&ghost) }).unwrap();
        assert!(actions.is_empty());

        session.handle(SessionEvent::ConnectionClosed { remote: bob_id() }).unwrap();
        assert_eq!(session.roster().participants(), &[Participant::new(host_id(), "Alice")]);
        assert!(session.can_start());
    }

    #[test]
    fn joiner_ready_waits_for_open_host_link() {
        let code = RoomCode::parse("ABCDE").unwrap();
        let mut session = Session::new(&FixedEnv, SessionConfig::join("Bob", code));
        session.handle(SessionEvent::LocalReady { local_id: bob_id() }).unwrap();
        let host = Outbox::default();
        session.handle(SessionEvent::Dialed { remote: host_id(), channel: host.clone() }).unwrap();

        assert_eq!(
            session.mark_ready(),
            Err(SessionError::Rejected(RejectedAction::HostNotConnected))
        );
        assert!(!session.is_ready());

        session.handle(SessionEvent::ConnectionOpened { remote: host_id() }).unwrap();
        session.mark_ready().unwrap();

        assert!(session.is_ready());
        assert_eq!(host.frames().last(), Some(&WireMessage::Ready { id: bob_id() }));
    }

    #[test]
    fn sender_labels() {
        let mut session = hosting();
        connect(&mut session, bob_id());
        let announce = WireMessage::User { user: Participant::new(bob_id(), "Bob") };
        session.handle(SessionEvent::DataReceived { from: bob_id(), frame: frame(&announce) }).unwrap();

        assert_eq!(session.sender_label(&host_id()), "Alice (me)");
        assert_eq!(session.sender_label(&bob_id()), "Bob");
        assert_eq!(session.sender_label(&PeerId::new("user-GHOST")), UNKNOWN_SENDER);
    }

    #[test]
    fn teardown_is_repeatable() {
        let mut session = hosting();
        let bob = connect(&mut session, bob_id());

        session.teardown();
        session.teardown();

        assert!(session.connections().is_empty());
        assert!(*bob.closed.borrow());
    }
}
