//! Connection registry for the local participant's direct links.
//!
//! The registry owns one [`Connection`] per remote participant, in the order
//! the connections were registered. Fan-out sends only reach connections that
//! have opened; a connection is dropped from the registry as soon as it is
//! observed closed.
//!
//! Fan-out is collect-and-continue: a failed send to one remote never stops
//! delivery to the rest. Failures come back as a [`DeliveryReport`] so the
//! caller can treat those remotes as disconnected.

use peerlobby_proto::PeerId;

use crate::error::{ChannelError, DeliveryError, RegistryError};

/// Transport handle for one direct connection.
///
/// Implemented by the transport collaborator. Delivery is assumed reliable and
/// FIFO per channel.
pub trait Channel {
    /// Queue a frame for the remote.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or the transport fails.
    fn send(&mut self, frame: &str) -> Result<(), ChannelError>;

    /// Release the channel. Must be idempotent.
    fn close(&mut self);
}

/// Lifecycle of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handle obtained, waiting for the transport's open signal.
    Opening,
    /// Open signal received; frames may flow.
    Open,
    /// Closed or failed. Never stored in the registry.
    Closed,
}

/// One direct link to a remote participant.
#[derive(Debug)]
pub struct Connection<C> {
    remote: PeerId,
    channel: C,
    state: ConnectionState,
}

impl<C: Channel> Connection<C> {
    /// Remote participant identifier.
    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True once the open signal has been observed.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Transport handle.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Close the channel and consume the connection.
    pub fn close(mut self) {
        self.channel.close();
    }

    fn send(&mut self, frame: &str) -> Result<(), DeliveryError> {
        self.channel
            .send(frame)
            .map_err(|source| DeliveryError::Failed { remote: self.remote.clone(), source })
    }
}

/// Outcome of a fan-out send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Number of connections the frame was handed to.
    pub delivered: usize,
    /// Remotes whose channel rejected the frame.
    pub failed: Vec<PeerId>,
}

impl DeliveryReport {
    /// True if no send failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registry of live direct connections, keyed by remote identifier.
///
/// Insertion order is preserved; rooms are small, so lookups scan.
#[derive(Debug)]
pub struct ConnectionRegistry<C> {
    connections: Vec<Connection<C>>,
}

impl<C> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self { connections: Vec::new() }
    }
}

impl<C: Channel> ConnectionRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection that is already open.
    ///
    /// # Errors
    ///
    /// - `RegistryError::DuplicateConnection` if `remote` is already present.
    ///   The registry is unchanged and `channel` is closed.
    pub fn add(&mut self, remote: PeerId, channel: C) -> Result<(), RegistryError> {
        self.insert(remote, channel, ConnectionState::Open)
    }

    /// Register a connection that has not signalled open yet.
    ///
    /// # Errors
    ///
    /// - `RegistryError::DuplicateConnection` if `remote` is already present.
    ///   `channel` is closed.
    pub fn add_opening(&mut self, remote: PeerId, channel: C) -> Result<(), RegistryError> {
        self.insert(remote, channel, ConnectionState::Opening)
    }

    fn insert(
        &mut self,
        remote: PeerId,
        mut channel: C,
        state: ConnectionState,
    ) -> Result<(), RegistryError> {
        if self.contains(&remote) {
            channel.close();
            return Err(RegistryError::DuplicateConnection(remote));
        }

        tracing::debug!(%remote, ?state, "connection registered");
        self.connections.push(Connection { remote, channel, state });
        Ok(())
    }

    /// Move an `Opening` connection to `Open`.
    ///
    /// Returns `false` if `remote` is unknown or already open.
    pub fn mark_open(&mut self, remote: &PeerId) -> bool {
        match self.connections.iter_mut().find(|c| &c.remote == remote) {
            Some(conn) if conn.state == ConnectionState::Opening => {
                conn.state = ConnectionState::Open;
                true
            },
            _ => false,
        }
    }

    /// Drop the connection to `remote`. Idempotent: `None` if absent.
    ///
    /// The channel is not closed; the caller decides via
    /// [`Connection::close`].
    pub fn remove(&mut self, remote: &PeerId) -> Option<Connection<C>> {
        let index = self.connections.iter().position(|c| &c.remote == remote)?;
        tracing::debug!(%remote, "connection removed");
        Some(self.connections.remove(index))
    }

    /// Connection to `remote`. `None` if not registered.
    pub fn by_id(&self, remote: &PeerId) -> Option<&Connection<C>> {
        self.connections.iter().find(|c| &c.remote == remote)
    }

    /// Check if a connection to `remote` is registered.
    pub fn contains(&self, remote: &PeerId) -> bool {
        self.by_id(remote).is_some()
    }

    /// Number of registered connections, open or not.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Remotes with open connections, in registration order.
    pub fn open_remotes(&self) -> impl Iterator<Item = &PeerId> + '_ {
        self.connections.iter().filter(|c| c.is_open()).map(|c| &c.remote)
    }

    /// Send a frame to one remote.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::NotConnected` if no open connection to `remote`
    /// - `DeliveryError::Failed` if the channel rejected the frame
    pub fn send_to(&mut self, remote: &PeerId, frame: &str) -> Result<(), DeliveryError> {
        match self.connections.iter_mut().find(|c| &c.remote == remote && c.is_open()) {
            Some(conn) => conn.send(frame),
            None => Err(DeliveryError::NotConnected(remote.clone())),
        }
    }

    /// Send a frame to every open connection.
    pub fn send_to_all(&mut self, frame: &str) -> DeliveryReport {
        self.fan_out(None, frame)
    }

    /// Send a frame to every open connection except `excluded`.
    pub fn send_to_all_except(&mut self, excluded: &PeerId, frame: &str) -> DeliveryReport {
        self.fan_out(Some(excluded), frame)
    }

    fn fan_out(&mut self, excluded: Option<&PeerId>, frame: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for conn in &mut self.connections {
            if !conn.is_open() || excluded == Some(&conn.remote) {
                continue;
            }

            match conn.send(frame) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("{e}");
                    report.failed.push(conn.remote.clone());
                },
            }
        }

        report
    }

    /// Close and drop every connection. Safe to call at any time, repeatedly.
    pub fn close_all(&mut self) {
        for conn in self.connections.drain(..) {
            tracing::debug!(remote = %conn.remote, "closing connection");
            conn.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    /// Records frames; fails every send once `broken` is set.
    #[derive(Debug, Clone, Default)]
    struct RecordingChannel {
        sent: Rc<RefCell<Vec<String>>>,
        broken: bool,
        closed: Rc<RefCell<u32>>,
    }

    impl RecordingChannel {
        fn broken() -> Self {
            Self { broken: true, ..Self::default() }
        }
    }

    impl Channel for RecordingChannel {
        fn send(&mut self, frame: &str) -> Result<(), ChannelError> {
            if self.broken {
                return Err(ChannelError::Transport("link down".into()));
            }
            self.sent.borrow_mut().push(frame.to_string());
            Ok(())
        }

        fn close(&mut self) {
            *self.closed.borrow_mut() += 1;
        }
    }

    fn id(s: &str) -> PeerId {
        PeerId::new(s)
    }

    #[test]
    fn add_rejects_duplicate_remote() {
        let mut registry = ConnectionRegistry::new();
        registry.add(id("bob"), RecordingChannel::default()).unwrap();

        let result = registry.add(id("bob"), RecordingChannel::default());
        assert_eq!(result, Err(RegistryError::DuplicateConnection(id("bob"))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_channel_is_closed_and_original_kept() {
        let mut registry = ConnectionRegistry::new();
        let original = RecordingChannel::default();
        let (original_sent, original_closed) = (original.sent.clone(), original.closed.clone());
        registry.add(id("bob"), original).unwrap();

        let duplicate = RecordingChannel::default();
        let duplicate_closed = duplicate.closed.clone();
        assert!(registry.add_opening(id("bob"), duplicate).is_err());

        assert_eq!(*duplicate_closed.borrow(), 1);
        assert_eq!(*original_closed.borrow(), 0);
        registry.send_to(&id("bob"), "still here").unwrap();
        assert_eq!(*original_sent.borrow(), vec!["still here".to_string()]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        registry.add(id("bob"), RecordingChannel::default()).unwrap();

        assert!(registry.remove(&id("bob")).is_some());
        assert!(registry.remove(&id("bob")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn opening_connections_receive_nothing_until_open() {
        let mut registry = ConnectionRegistry::new();
        let channel = RecordingChannel::default();
        let sent = channel.sent.clone();
        registry.add_opening(id("bob"), channel).unwrap();

        assert_eq!(registry.send_to_all("x").delivered, 0);
        assert!(matches!(registry.send_to(&id("bob"), "x"), Err(DeliveryError::NotConnected(_))));

        assert!(registry.mark_open(&id("bob")));
        assert!(!registry.mark_open(&id("bob")));
        assert_eq!(registry.send_to_all("y").delivered, 1);
        assert_eq!(*sent.borrow(), vec!["y".to_string()]);
    }

    #[test]
    fn send_to_all_except_skips_excluded() {
        let mut registry = ConnectionRegistry::new();
        let bob = RecordingChannel::default();
        let carol = RecordingChannel::default();
        let (bob_sent, carol_sent) = (bob.sent.clone(), carol.sent.clone());
        registry.add(id("bob"), bob).unwrap();
        registry.add(id("carol"), carol).unwrap();

        let report = registry.send_to_all_except(&id("bob"), "hi");

        assert_eq!(report.delivered, 1);
        assert!(bob_sent.borrow().is_empty());
        assert_eq!(carol_sent.borrow().len(), 1);
    }

    #[test]
    fn fan_out_continues_past_failures() {
        let mut registry = ConnectionRegistry::new();
        let carol = RecordingChannel::default();
        let carol_sent = carol.sent.clone();
        registry.add(id("bob"), RecordingChannel::broken()).unwrap();
        registry.add(id("carol"), carol).unwrap();

        let report = registry.send_to_all("hi");

        assert_eq!(report.failed, vec![id("bob")]);
        assert_eq!(report.delivered, 1);
        assert!(!report.is_clean());
        assert_eq!(carol_sent.borrow().len(), 1);
    }

    #[test]
    fn close_all_closes_each_channel_once() {
        let mut registry = ConnectionRegistry::new();
        let channel = RecordingChannel::default();
        let closed = channel.closed.clone();
        registry.add(id("bob"), channel).unwrap();

        registry.close_all();
        registry.close_all();

        assert!(registry.is_empty());
        assert_eq!(*closed.borrow(), 1);
    }

    #[test]
    fn preserves_registration_order() {
        let mut registry = ConnectionRegistry::new();
        for name in ["carol", "alice", "bob"] {
            registry.add(id(name), RecordingChannel::default()).unwrap();
        }

        let order: Vec<_> = registry.open_remotes().map(PeerId::as_str).collect();
        assert_eq!(order, vec!["carol", "alice", "bob"]);
    }
}
