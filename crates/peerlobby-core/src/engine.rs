//! Room protocol engine.
//!
//! Sans-IO state machine for one participant's view of a room. It consumes
//! decoded [`WireMessage`]s, connection lifecycle signals, and local intents,
//! mutates the roster and message log, and returns [`RoomAction`]s for the
//! caller to execute. It never touches a transport.
//!
//! # Roles
//!
//! The engine is a [`RoomEngine::Host`] or a [`RoomEngine::Joiner`], fixed at
//! construction. Host-only transitions (roster broadcasts, chat relay, start)
//! live on [`HostRoom`]; a joiner only ever talks to its host.
//!
//! # Broadcasts
//!
//! Every transition that mutates the host's roster ends with one explicit
//! `user-list` broadcast of the full roster. Broadcasts are snapshots, so a
//! repeated one is harmless.
//!
//! # Phases
//!
//! `Lobby` → `Started`, never back. Chat and membership changes keep working
//! after the start.

use peerlobby_proto::{ChatMessage, Participant, PeerId, WireMessage};

use crate::{error::RejectedAction, roster::Roster};

/// Which side of the star topology the local participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Created the room; sole writer of the roster.
    Host,
    /// Dialed the host; mirrors the host's broadcasts.
    Participant,
}

/// Room session state. Monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomPhase {
    /// Waiting for everyone to get ready.
    #[default]
    Lobby,
    /// The host started the room.
    Started,
}

/// Effects produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomAction {
    /// Send to every open connection, optionally skipping one.
    Broadcast {
        /// Message to send
        message: WireMessage,
        /// Connection to skip, usually the one the message came from
        except: Option<PeerId>,
    },

    /// Send to a single connection.
    SendTo {
        /// Recipient
        remote: PeerId,
        /// Message to send
        message: WireMessage,
    },

    /// The roster changed.
    RosterChanged,

    /// A chat line was appended to the log.
    MessageAppended(ChatMessage),

    /// The room entered `Started`.
    Started {
        /// Roster at the moment of the start
        roster: Vec<Participant>,
    },

    /// A joiner lost its connection to the host. There is no recovery.
    HostLost {
        /// The host that went away
        host: PeerId,
    },
}

/// State shared by both roles.
#[derive(Debug, Clone)]
struct RoomCore {
    local: Participant,
    roster: Roster,
    messages: Vec<ChatMessage>,
    phase: RoomPhase,
}

impl RoomCore {
    fn new(local: Participant, roster: Roster) -> Self {
        Self { local, roster, messages: Vec::new(), phase: RoomPhase::Lobby }
    }

    fn append(&mut self, message: ChatMessage) -> RoomAction {
        self.messages.push(message.clone());
        RoomAction::MessageAppended(message)
    }

    /// Local chat line, or `None` if `text` is blank.
    fn local_chat(&self, text: &str) -> Option<ChatMessage> {
        if text.trim().is_empty() {
            return None;
        }
        Some(ChatMessage::new(self.local.id.clone(), text))
    }

    fn enter_started(&mut self) -> RoomAction {
        self.phase = RoomPhase::Started;
        RoomAction::Started { roster: self.roster.snapshot() }
    }
}

/// Host side of a room.
#[derive(Debug, Clone)]
pub struct HostRoom {
    core: RoomCore,
}

impl HostRoom {
    /// New room whose roster holds only the host.
    pub fn new(local_id: PeerId, name: impl Into<String>) -> Self {
        let local = Participant::new(local_id, name);
        let roster = Roster::seeded(local.clone());
        Self { core: RoomCore::new(local, roster) }
    }

    /// Full-roster broadcast to every connection.
    pub fn broadcast_roster(&self) -> RoomAction {
        RoomAction::Broadcast {
            message: WireMessage::UserList { users: self.core.roster.snapshot() },
            except: None,
        }
    }

    fn roster_changed(&self) -> Vec<RoomAction> {
        vec![RoomAction::RosterChanged, self.broadcast_roster()]
    }

    fn handle_message(&mut self, from: &PeerId, message: WireMessage) -> Vec<RoomAction> {
        match message {
            WireMessage::User { user } => {
                if &user.id != from {
                    tracing::warn!(%from, claimed = %user.id, "announcement id does not match connection");
                    return vec![];
                }
                let id = user.id.clone();
                if self.core.roster.upsert(user) {
                    tracing::info!(peer = %id, "participant joined");
                    self.roster_changed()
                } else {
                    tracing::debug!(peer = %id, "repeated announcement ignored");
                    vec![]
                }
            },
            WireMessage::Message { from: author, text } => {
                let line = ChatMessage::new(author, text);
                let relay = WireMessage::chat(&line);
                vec![
                    self.core.append(line),
                    RoomAction::Broadcast { message: relay, except: Some(from.clone()) },
                ]
            },
            WireMessage::Ready { id } => {
                if &id != from {
                    tracing::warn!(%from, claimed = %id, "ready for another participant dropped");
                    return vec![];
                }
                if !self.core.roster.set_ready(&id) {
                    tracing::debug!(peer = %id, "ready for unknown or already-ready participant");
                }
                self.roster_changed()
            },
            WireMessage::UserList { .. } => {
                tracing::warn!(%from, "host received a roster snapshot, ignoring");
                vec![]
            },
            WireMessage::Start => {
                tracing::warn!(%from, "host received start, ignoring");
                vec![]
            },
        }
    }

    /// Greet a newly opened inbound connection with the host's own record.
    fn connection_opened(&self, remote: &PeerId) -> Vec<RoomAction> {
        vec![RoomAction::SendTo {
            remote: remote.clone(),
            message: WireMessage::User { user: self.own_entry() },
        }]
    }

    fn connection_closed(&mut self, remote: &PeerId) -> Vec<RoomAction> {
        match self.core.roster.remove(remote) {
            Some(left) => {
                tracing::info!(peer = %left.id, name = %left.name, "participant left");
                self.roster_changed()
            },
            None => vec![],
        }
    }

    fn send_chat(&mut self, text: &str) -> Vec<RoomAction> {
        let Some(line) = self.core.local_chat(text) else {
            return vec![];
        };
        let message = WireMessage::chat(&line);
        vec![self.core.append(line), RoomAction::Broadcast { message, except: None }]
    }

    fn mark_ready(&mut self) -> Vec<RoomAction> {
        if self.core.local.ready {
            return vec![];
        }
        self.core.local.ready = true;
        self.core.roster.set_ready(&self.core.local.id);
        self.roster_changed()
    }

    /// True if the room may start now.
    pub fn can_start(&self) -> bool {
        self.core.phase == RoomPhase::Lobby
            && self.core.roster.all_ready_except_self(&self.core.local.id)
    }

    /// Start the room if everyone else is ready.
    ///
    /// # Errors
    ///
    /// - `RejectedAction::AlreadyStarted` if the room is past the lobby
    /// - `RejectedAction::NotAllReady` if some other participant is not ready
    pub fn request_start(&mut self) -> Result<Vec<RoomAction>, RejectedAction> {
        if self.core.phase == RoomPhase::Started {
            return Err(RejectedAction::AlreadyStarted);
        }

        let waiting = self.core.roster.waiting_on(&self.core.local.id);
        if !waiting.is_empty() {
            return Err(RejectedAction::NotAllReady { waiting });
        }

        tracing::info!(participants = self.core.roster.len(), "room started");
        Ok(vec![
            RoomAction::Broadcast { message: WireMessage::Start, except: None },
            self.core.enter_started(),
        ])
    }

    fn own_entry(&self) -> Participant {
        self.core.roster.get(&self.core.local.id).cloned().unwrap_or_else(|| self.core.local.clone())
    }
}

/// Joiner side of a room.
#[derive(Debug, Clone)]
pub struct JoinerRoom {
    core: RoomCore,
    host: PeerId,
    host_lost: bool,
}

impl JoinerRoom {
    /// New joiner with an uninitialized roster.
    pub fn new(local_id: PeerId, name: impl Into<String>, host: PeerId) -> Self {
        let local = Participant::new(local_id, name);
        Self { core: RoomCore::new(local, Roster::Uninitialized), host, host_lost: false }
    }

    /// Host this joiner dials.
    pub fn host(&self) -> &PeerId {
        &self.host
    }

    /// Announce ourselves to the host, appending our own entry locally
    /// until the host's first roster broadcast replaces it.
    pub fn announce_self(&mut self) -> Vec<RoomAction> {
        let user = self.core.local.clone();
        let mut actions = Vec::new();
        if self.core.roster.upsert(user.clone()) {
            actions.push(RoomAction::RosterChanged);
        }
        actions.push(RoomAction::SendTo { remote: self.host.clone(), message: WireMessage::User { user } });
        actions
    }

    fn handle_message(&mut self, from: &PeerId, message: WireMessage) -> Vec<RoomAction> {
        if from != &self.host {
            tracing::warn!(%from, kind = message.kind().as_str(), "message from non-host dropped");
            return vec![];
        }

        match message {
            WireMessage::User { user } => {
                if self.core.roster.upsert(user) { vec![RoomAction::RosterChanged] } else { vec![] }
            },
            WireMessage::Message { from: author, text } => {
                vec![self.core.append(ChatMessage::new(author, text))]
            },
            WireMessage::UserList { users } => {
                tracing::debug!(participants = users.len(), "roster snapshot applied");
                self.core.roster.replace_all(users);
                vec![RoomAction::RosterChanged]
            },
            WireMessage::Ready { id } => {
                tracing::warn!(peer = %id, "joiner received ready, ignoring");
                vec![]
            },
            WireMessage::Start => {
                if self.core.phase == RoomPhase::Started {
                    tracing::debug!("repeated start ignored");
                    return vec![];
                }
                tracing::info!("room started by host");
                vec![self.core.enter_started()]
            },
        }
    }

    fn connection_opened(&mut self, remote: &PeerId) -> Vec<RoomAction> {
        if remote == &self.host {
            self.announce_self()
        } else {
            tracing::warn!(%remote, "joiner opened a connection to a non-host");
            vec![]
        }
    }

    fn connection_closed(&mut self, remote: &PeerId) -> Vec<RoomAction> {
        if remote != &self.host || self.host_lost {
            return vec![];
        }
        self.host_lost = true;
        tracing::warn!(host = %self.host, "connection to host lost");
        vec![RoomAction::HostLost { host: self.host.clone() }]
    }

    fn send_chat(&mut self, text: &str) -> Vec<RoomAction> {
        let Some(line) = self.core.local_chat(text) else {
            return vec![];
        };
        let message = WireMessage::chat(&line);
        vec![self.core.append(line), RoomAction::SendTo { remote: self.host.clone(), message }]
    }

    fn mark_ready(&mut self) -> Vec<RoomAction> {
        if self.core.local.ready {
            return vec![];
        }
        self.core.local.ready = true;
        vec![RoomAction::SendTo {
            remote: self.host.clone(),
            message: WireMessage::Ready { id: self.core.local.id.clone() },
        }]
    }
}

/// One participant's room state machine.
#[derive(Debug, Clone)]
pub enum RoomEngine {
    /// Local participant created the room.
    Host(HostRoom),
    /// Local participant joined someone else's room.
    Joiner(JoinerRoom),
}

impl RoomEngine {
    /// Engine for the participant that created the room.
    pub fn host(local_id: PeerId, name: impl Into<String>) -> Self {
        Self::Host(HostRoom::new(local_id, name))
    }

    /// Engine for a participant joining `host`'s room.
    pub fn joiner(local_id: PeerId, name: impl Into<String>, host: PeerId) -> Self {
        Self::Joiner(JoinerRoom::new(local_id, name, host))
    }

    fn core(&self) -> &RoomCore {
        match self {
            Self::Host(room) => &room.core,
            Self::Joiner(room) => &room.core,
        }
    }

    /// Role fixed at construction.
    pub fn role(&self) -> Role {
        match self {
            Self::Host(_) => Role::Host,
            Self::Joiner(_) => Role::Participant,
        }
    }

    /// Local participant's identifier.
    pub fn local_id(&self) -> &PeerId {
        &self.core().local.id
    }

    /// Local participant's display name.
    pub fn local_name(&self) -> &str {
        &self.core().local.name
    }

    /// Whether the local participant has marked itself ready.
    pub fn is_ready(&self) -> bool {
        self.core().local.ready
    }

    /// Current roster.
    pub fn roster(&self) -> &Roster {
        &self.core().roster
    }

    /// Chat log in arrival order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.core().messages
    }

    /// Lobby or started.
    pub fn phase(&self) -> RoomPhase {
        self.core().phase
    }

    /// True if the local participant may start the room now.
    pub fn can_start(&self) -> bool {
        match self {
            Self::Host(room) => room.can_start(),
            Self::Joiner(_) => false,
        }
    }

    /// Apply a message received on the connection to `from`.
    pub fn handle_message(&mut self, from: &PeerId, message: WireMessage) -> Vec<RoomAction> {
        tracing::debug!(%from, kind = message.kind().as_str(), "message received");
        match self {
            Self::Host(room) => room.handle_message(from, message),
            Self::Joiner(room) => room.handle_message(from, message),
        }
    }

    /// A registered connection signalled open.
    pub fn connection_opened(&mut self, remote: &PeerId) -> Vec<RoomAction> {
        match self {
            Self::Host(room) => room.connection_opened(remote),
            Self::Joiner(room) => room.connection_opened(remote),
        }
    }

    /// A connection closed or failed.
    pub fn connection_closed(&mut self, remote: &PeerId) -> Vec<RoomAction> {
        match self {
            Self::Host(room) => room.connection_closed(remote),
            Self::Joiner(room) => room.connection_closed(remote),
        }
    }

    /// Send a chat line. Blank text is a no-op.
    pub fn send_chat(&mut self, text: &str) -> Vec<RoomAction> {
        match self {
            Self::Host(room) => room.send_chat(text),
            Self::Joiner(room) => room.send_chat(text),
        }
    }

    /// Mark the local participant ready. Repeated calls are no-ops.
    pub fn mark_ready(&mut self) -> Vec<RoomAction> {
        match self {
            Self::Host(room) => room.mark_ready(),
            Self::Joiner(room) => room.mark_ready(),
        }
    }

    /// Start the room.
    ///
    /// # Errors
    ///
    /// - `RejectedAction::NotHost` for a joiner
    /// - Any error from [`HostRoom::request_start`]
    pub fn request_start(&mut self) -> Result<Vec<RoomAction>, RejectedAction> {
        match self {
            Self::Host(room) => room.request_start(),
            Self::Joiner(_) => Err(RejectedAction::NotHost),
        }
    }
}
