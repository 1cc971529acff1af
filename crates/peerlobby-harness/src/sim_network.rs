//! In-process transport for simulation.
//!
//! `SimNetwork` stands in for the peer-to-peer transport: it hands out
//! [`SimChannel`] handles, queues every signal and frame in one global FIFO,
//! and lets tests break or drop individual links. A single queue keeps
//! per-link delivery in order, which is all the protocol assumes.
//!
//! Nothing is delivered until the driver pops it, so tests control exactly
//! when each participant observes each event.

use std::{
    cell::RefCell,
    collections::{BTreeSet, HashMap, VecDeque},
    fmt,
    rc::Rc,
};

use peerlobby_core::{Channel, ChannelError, PeerId, WireMessage};

use crate::error::SimError;

/// Signal or frame addressed to one endpoint.
#[derive(Debug)]
pub enum NetEvent {
    /// `remote` dialed this endpoint.
    Incoming {
        /// Dialing endpoint.
        remote: PeerId,
        /// This endpoint's half of the link.
        channel: SimChannel,
    },
    /// The link to `remote` is open.
    Opened {
        /// Other end of the link.
        remote: PeerId,
    },
    /// A frame from `from`.
    Data {
        /// Sending endpoint.
        from: PeerId,
        /// Raw frame.
        frame: String,
    },
    /// The link to `remote` closed.
    Closed {
        /// Other end of the link.
        remote: PeerId,
    },
}

/// Queued event and its recipient.
#[derive(Debug)]
pub struct Delivery {
    /// Recipient endpoint.
    pub to: PeerId,
    /// What happened.
    pub event: NetEvent,
}

/// Health of a link between two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Frames flow.
    Up,
    /// Sends fail, but neither end has been told.
    Broken,
    /// Closed; both ends were notified.
    Down,
}

/// One frame as it crossed the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedFrame {
    /// Sender.
    pub from: PeerId,
    /// Recipient.
    pub to: PeerId,
    /// Raw frame.
    pub frame: String,
}

impl TracedFrame {
    /// Decoded message. `None` for frames that do not decode.
    pub fn message(&self) -> Option<WireMessage> {
        WireMessage::decode(&self.frame).ok()
    }
}

type LinkKey = (PeerId, PeerId);

fn link_key(a: &PeerId, b: &PeerId) -> LinkKey {
    if a <= b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) }
}

#[derive(Default)]
struct NetState {
    endpoints: BTreeSet<PeerId>,
    links: HashMap<LinkKey, LinkState>,
    queue: VecDeque<Delivery>,
    trace: Vec<TracedFrame>,
}

impl NetState {
    fn push(&mut self, to: &PeerId, event: NetEvent) {
        self.queue.push_back(Delivery { to: to.clone(), event });
    }

    /// Take the link down, notifying each listed end. No-op if already down.
    fn close_link(&mut self, a: &PeerId, b: &PeerId, notify: &[(&PeerId, &PeerId)]) {
        let state = self.links.entry(link_key(a, b)).or_insert(LinkState::Down);
        if *state == LinkState::Down {
            return;
        }
        *state = LinkState::Down;
        for (to, remote) in notify {
            self.push(to, NetEvent::Closed { remote: (*remote).clone() });
        }
    }
}

/// Shared in-process network. Clones refer to the same network.
#[derive(Clone, Default)]
pub struct SimNetwork {
    state: Rc<RefCell<NetState>>,
}

impl SimNetwork {
    /// Empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id` for a new endpoint.
    ///
    /// # Errors
    ///
    /// - `SimError::IdTaken` if another endpoint already holds `id`
    pub fn register(&self, id: PeerId) -> Result<(), SimError> {
        let mut state = self.state.borrow_mut();
        if state.endpoints.contains(&id) {
            return Err(SimError::IdTaken(id));
        }
        state.endpoints.insert(id);
        Ok(())
    }

    /// Release `id`. Links are left to their channels to close.
    pub fn unregister(&self, id: &PeerId) {
        self.state.borrow_mut().endpoints.remove(id);
    }

    /// Check if `id` is held by an endpoint.
    pub fn is_registered(&self, id: &PeerId) -> bool {
        self.state.borrow().endpoints.contains(id)
    }

    /// Dial `to` from `from`.
    ///
    /// Returns the dialer's handle. If `to` is registered, the far end gets
    /// an incoming connection and both ends are then told the link is open.
    /// Otherwise the handle never opens.
    pub fn dial(&self, from: &PeerId, to: &PeerId) -> SimChannel {
        let mut state = self.state.borrow_mut();
        if state.endpoints.contains(to) {
            state.links.insert(link_key(from, to), LinkState::Up);
            let accepted = SimChannel::new(to.clone(), from.clone(), self.state.clone());
            state.push(to, NetEvent::Incoming { remote: from.clone(), channel: accepted });
            state.push(to, NetEvent::Opened { remote: from.clone() });
            state.push(from, NetEvent::Opened { remote: to.clone() });
        } else {
            tracing::debug!(%from, %to, "dial to unknown endpoint will never open");
        }
        SimChannel::new(from.clone(), to.clone(), self.state.clone())
    }

    /// Next queued delivery.
    pub fn pop(&self) -> Option<Delivery> {
        self.state.borrow_mut().queue.pop_front()
    }

    /// Number of queued deliveries.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Make sends between `a` and `b` fail without notifying either end.
    pub fn break_link(&self, a: &PeerId, b: &PeerId) {
        let mut state = self.state.borrow_mut();
        if let Some(link) = state.links.get_mut(&link_key(a, b))
            && *link == LinkState::Up
        {
            *link = LinkState::Broken;
        }
    }

    /// Close the link between `a` and `b`, notifying both ends.
    pub fn drop_link(&self, a: &PeerId, b: &PeerId) {
        let mut state = self.state.borrow_mut();
        if state.links.contains_key(&link_key(a, b)) {
            state.close_link(a, b, &[(a, b), (b, a)]);
        }
    }

    /// State of the link between `a` and `b`. `None` if never dialed.
    pub fn link_state(&self, a: &PeerId, b: &PeerId) -> Option<LinkState> {
        self.state.borrow().links.get(&link_key(a, b)).copied()
    }

    /// Every frame sent so far, in send order.
    pub fn trace(&self) -> Vec<TracedFrame> {
        self.state.borrow().trace.clone()
    }

    /// Drain the frame trace.
    pub fn take_trace(&self) -> Vec<TracedFrame> {
        std::mem::take(&mut self.state.borrow_mut().trace)
    }
}

/// One end of a simulated link.
pub struct SimChannel {
    local: PeerId,
    remote: PeerId,
    net: Rc<RefCell<NetState>>,
}

impl SimChannel {
    fn new(local: PeerId, remote: PeerId, net: Rc<RefCell<NetState>>) -> Self {
        Self { local, remote, net }
    }

    /// Remote end.
    pub fn remote(&self) -> &PeerId {
        &self.remote
    }
}

impl fmt::Debug for SimChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimChannel").field("local", &self.local).field("remote", &self.remote).finish()
    }
}

impl Channel for SimChannel {
    fn send(&mut self, frame: &str) -> Result<(), ChannelError> {
        let mut net = self.net.borrow_mut();
        match net.links.get(&link_key(&self.local, &self.remote)) {
            Some(LinkState::Up) => {},
            Some(LinkState::Broken) => return Err(ChannelError::Transport("link broken".into())),
            Some(LinkState::Down) | None => return Err(ChannelError::Closed),
        }

        net.trace.push(TracedFrame {
            from: self.local.clone(),
            to: self.remote.clone(),
            frame: frame.to_string(),
        });
        net.push(&self.remote, NetEvent::Data { from: self.local.clone(), frame: frame.to_string() });
        Ok(())
    }

    fn close(&mut self) {
        let (local, remote) = (self.local.clone(), self.remote.clone());
        self.net.borrow_mut().close_link(&local, &remote, &[(&remote, &local)]);
    }
}
