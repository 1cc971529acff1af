//! Deterministic room driver.
//!
//! `SimRoom` owns one [`Session`] per participant, all wired to a shared
//! [`SimNetwork`]. Local intents run immediately; network deliveries run one
//! at a time when the test calls [`SimRoom::step`] or [`SimRoom::settle`].
//! The same seed always produces the same identifiers and the same event
//! order.

use std::collections::BTreeMap;

use peerlobby_core::{
    PeerId, Role, RoomCode, Session, SessionAction, SessionConfig, SessionEvent,
};

use crate::{
    error::SimError,
    invariants::{NodeSnapshot, RoomSnapshot},
    sim_env::SimEnv,
    sim_network::{NetEvent, SimChannel, SimNetwork},
};

/// Upper bound on deliveries per [`SimRoom::settle`].
pub const MAX_SETTLE_STEPS: usize = 10_000;

struct SimNode {
    session: Session<SimChannel>,
    notices: Vec<SessionAction>,
    joined: usize,
}

/// A simulated room: one host, any number of joiners.
pub struct SimRoom {
    env: SimEnv,
    network: SimNetwork,
    nodes: BTreeMap<PeerId, SimNode>,
    host: Option<PeerId>,
    joined: usize,
}

impl SimRoom {
    /// Empty room whose identifiers derive from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            env: SimEnv::with_seed(seed),
            network: SimNetwork::new(),
            nodes: BTreeMap::new(),
            host: None,
            joined: 0,
        }
    }

    /// Create the room with a generated code.
    ///
    /// # Errors
    ///
    /// - `SimError::HostExists` if the room already has a host
    /// - `SimError::IdTaken` if the generated identifier collides
    pub fn create_room(&mut self, nickname: &str) -> Result<RoomCode, SimError> {
        self.create(nickname, None)
    }

    /// Create the room under a fixed code.
    ///
    /// # Errors
    ///
    /// Same as [`SimRoom::create_room`].
    pub fn create_room_with_code(
        &mut self,
        nickname: &str,
        code: &RoomCode,
    ) -> Result<RoomCode, SimError> {
        self.create(nickname, Some(code.peer_id()))
    }

    fn create(&mut self, nickname: &str, id: Option<PeerId>) -> Result<RoomCode, SimError> {
        if self.host.is_some() {
            return Err(SimError::HostExists);
        }

        let id = self.open(SessionConfig::host(nickname), id)?;
        self.host = Some(id.clone());
        self.session(&id)
            .and_then(Session::room_code)
            .cloned()
            .ok_or(SimError::UnknownParticipant(id))
    }

    /// Add a participant that dials `code`. Nothing is delivered until the
    /// network is stepped.
    ///
    /// # Errors
    ///
    /// - `SimError::IdTaken` if the generated identifier collides
    pub fn join(&mut self, nickname: &str, code: &RoomCode) -> Result<PeerId, SimError> {
        self.open(SessionConfig::join(nickname, code.clone()), None)
    }

    fn open(&mut self, config: SessionConfig, id: Option<PeerId>) -> Result<PeerId, SimError> {
        let session = Session::new(&self.env, config);
        let id = id.unwrap_or_else(|| session.local_id_hint().clone());
        self.network.register(id.clone())?;

        self.joined += 1;
        self.nodes.insert(id.clone(), SimNode { session, notices: Vec::new(), joined: self.joined });
        self.deliver(&id, SessionEvent::LocalReady { local_id: id.clone() })?;
        Ok(id)
    }

    fn node_mut(&mut self, id: &PeerId) -> Result<&mut SimNode, SimError> {
        self.nodes.get_mut(id).ok_or_else(|| SimError::UnknownParticipant(id.clone()))
    }

    fn deliver(&mut self, to: &PeerId, event: SessionEvent<SimChannel>) -> Result<(), SimError> {
        let Some(node) = self.nodes.get_mut(to) else {
            tracing::debug!(%to, "delivery to departed participant dropped");
            return Ok(());
        };
        let actions = node.session.handle(event)?;
        self.apply(to, actions)
    }

    fn apply(&mut self, id: &PeerId, actions: Vec<SessionAction>) -> Result<(), SimError> {
        for action in actions {
            match action {
                SessionAction::Dial { remote } => {
                    let channel = self.network.dial(id, &remote);
                    self.deliver(id, SessionEvent::Dialed { remote, channel })?;
                },
                SessionAction::Render => {},
                notice @ (SessionAction::Started { .. } | SessionAction::HostLost { .. }) => {
                    self.node_mut(id)?.notices.push(notice);
                },
            }
        }
        Ok(())
    }

    /// Deliver the next queued network event.
    ///
    /// Returns `false` if nothing was queued.
    ///
    /// # Errors
    ///
    /// - `SimError::Session` if the recipient's session fails
    pub fn step(&mut self) -> Result<bool, SimError> {
        let Some(delivery) = self.network.pop() else {
            return Ok(false);
        };

        let event = match delivery.event {
            NetEvent::Incoming { remote, channel } => {
                SessionEvent::IncomingConnection { remote, channel }
            },
            NetEvent::Opened { remote } => SessionEvent::ConnectionOpened { remote },
            NetEvent::Data { from, frame } => SessionEvent::DataReceived { from, frame },
            NetEvent::Closed { remote } => SessionEvent::ConnectionClosed { remote },
        };
        self.deliver(&delivery.to, event)?;
        Ok(true)
    }

    /// Deliver queued events until the network is quiet.
    ///
    /// Returns the number of deliveries made.
    ///
    /// # Errors
    ///
    /// - `SimError::Diverged` if still busy after [`MAX_SETTLE_STEPS`]
    /// - Any error from [`SimRoom::step`]
    pub fn settle(&mut self) -> Result<usize, SimError> {
        for steps in 0..MAX_SETTLE_STEPS {
            if !self.step()? {
                return Ok(steps);
            }
        }
        Err(SimError::Diverged { steps: MAX_SETTLE_STEPS })
    }

    /// Send a chat line from `id`.
    ///
    /// # Errors
    ///
    /// - `SimError::UnknownParticipant` if `id` is not in the room
    /// - `SimError::Session` if the session rejects the action
    pub fn send_chat(&mut self, id: &PeerId, text: &str) -> Result<(), SimError> {
        let actions = self.node_mut(id)?.session.send_chat(text)?;
        self.apply(id, actions)
    }

    /// Mark `id` ready.
    ///
    /// # Errors
    ///
    /// Same as [`SimRoom::send_chat`].
    pub fn mark_ready(&mut self, id: &PeerId) -> Result<(), SimError> {
        let actions = self.node_mut(id)?.session.mark_ready()?;
        self.apply(id, actions)
    }

    /// Ask `id` to start the room.
    ///
    /// # Errors
    ///
    /// Same as [`SimRoom::send_chat`]. Guard rejections surface as
    /// `SimError::Session`.
    pub fn request_start(&mut self, id: &PeerId) -> Result<(), SimError> {
        let actions = self.node_mut(id)?.session.request_start()?;
        self.apply(id, actions)
    }

    /// Remove `id` from the room, closing all of its connections.
    ///
    /// # Errors
    ///
    /// - `SimError::UnknownParticipant` if `id` is not in the room
    pub fn disconnect(&mut self, id: &PeerId) -> Result<(), SimError> {
        let mut node = self.nodes.remove(id).ok_or_else(|| SimError::UnknownParticipant(id.clone()))?;
        node.session.teardown();
        self.network.unregister(id);
        if self.host.as_ref() == Some(id) {
            self.host = None;
        }
        tracing::debug!(%id, "participant disconnected");
        Ok(())
    }

    /// Make sends between `a` and `b` fail silently.
    pub fn break_link(&self, a: &PeerId, b: &PeerId) {
        self.network.break_link(a, b);
    }

    /// Close the link between `a` and `b`, telling both ends.
    pub fn drop_link(&self, a: &PeerId, b: &PeerId) {
        self.network.drop_link(a, b);
    }

    /// The host's identifier, while it is present.
    pub fn host(&self) -> Option<&PeerId> {
        self.host.as_ref()
    }

    /// Every present participant, in join order.
    pub fn participants(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.nodes.iter().map(|(id, node)| (node.joined, id.clone())).collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Session for `id`.
    pub fn session(&self, id: &PeerId) -> Option<&Session<SimChannel>> {
        self.nodes.get(id).map(|node| &node.session)
    }

    /// `Started` and `HostLost` notices reported by `id`, in order.
    pub fn notices(&self, id: &PeerId) -> &[SessionAction] {
        self.nodes.get(id).map(|node| node.notices.as_slice()).unwrap_or_default()
    }

    /// The underlying network.
    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    /// Observable state of every participant.
    pub fn snapshot(&self) -> RoomSnapshot {
        let nodes = self
            .participants()
            .into_iter()
            .filter_map(|id| self.nodes.get(&id).map(|node| (id, node)))
            .map(|(id, node)| {
                let session = &node.session;
                NodeSnapshot {
                    role: session.role(),
                    phase: session.room_state(),
                    roster_known: session.roster().is_known(),
                    roster: session.roster().snapshot(),
                    connections: session.connections().open_remotes().cloned().collect(),
                    message_count: session.messages().len(),
                    started_notices: node
                        .notices
                        .iter()
                        .filter(|n| matches!(n, SessionAction::Started { .. }))
                        .count(),
                    id,
                }
            })
            .collect();

        RoomSnapshot { nodes, quiescent: self.network.pending() == 0 }
    }

    /// Role of `id`, if present.
    pub fn role(&self, id: &PeerId) -> Option<Role> {
        self.session(id).map(Session::role)
    }
}
