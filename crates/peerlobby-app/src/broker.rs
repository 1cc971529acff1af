//! In-memory transport.
//!
//! [`LocalBroker`] is a rendezvous point for participants running in one
//! process. Each participant gets a [`LocalTransport`]; dialing an identifier
//! links the two transports with a pair of [`LocalChannel`]s that share one
//! closed flag. Callbacks travel over unbounded tokio channels, so a send
//! never waits and per-link order is preserved.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use peerlobby_core::{Channel, ChannelError, PeerId};
use tokio::sync::mpsc;

use crate::{
    error::TransportError,
    transport::{Transport, TransportEvent},
};

type EventSender = mpsc::UnboundedSender<TransportEvent<LocalChannel>>;
type EventReceiver = mpsc::UnboundedReceiver<TransportEvent<LocalChannel>>;

/// Shared registry of open local endpoints. Clones share the registry.
#[derive(Clone, Default)]
pub struct LocalBroker {
    endpoints: Arc<Mutex<HashMap<PeerId, EventSender>>>,
}

impl LocalBroker {
    /// Empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// New, unopened transport attached to this broker.
    pub fn transport(&self) -> LocalTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        LocalTransport { broker: self.clone(), local: None, tx, rx }
    }

    /// Number of open endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.lock().len()
    }

    /// Check if `id` is claimed.
    pub fn is_open(&self, id: &PeerId) -> bool {
        self.lock().contains_key(id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PeerId, EventSender>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One participant's endpoint on a [`LocalBroker`].
pub struct LocalTransport {
    broker: LocalBroker,
    local: Option<PeerId>,
    tx: EventSender,
    rx: EventReceiver,
}

impl LocalTransport {
    /// Identifier assigned by [`Transport::open`].
    pub fn local_id(&self) -> Option<&PeerId> {
        self.local.as_ref()
    }

    fn claim(&mut self, hint: &PeerId) -> Result<PeerId, TransportError> {
        if let Some(local) = &self.local {
            return Ok(local.clone());
        }

        let mut endpoints = self.broker.lock();
        if endpoints.contains_key(hint) {
            return Err(TransportError::IdTaken(hint.clone()));
        }
        endpoints.insert(hint.clone(), self.tx.clone());
        drop(endpoints);

        tracing::debug!(local = %hint, "endpoint open");
        self.local = Some(hint.clone());
        Ok(hint.clone())
    }
}

impl Transport for LocalTransport {
    type Channel = LocalChannel;

    fn open(&mut self, hint: &PeerId) -> impl Future<Output = Result<PeerId, TransportError>> + Send {
        std::future::ready(self.claim(hint))
    }

    fn connect(&mut self, remote: &PeerId) -> Result<LocalChannel, TransportError> {
        let local = self.local.clone().ok_or(TransportError::NotOpen)?;
        let peer = self
            .broker
            .lock()
            .get(remote)
            .cloned()
            .ok_or_else(|| TransportError::PeerUnavailable(remote.clone()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let theirs = LocalChannel {
            local: remote.clone(),
            remote: local.clone(),
            peer: self.tx.clone(),
            closed: closed.clone(),
        };

        peer.send(TransportEvent::Incoming { remote: local.clone(), channel: theirs })
            .and_then(|()| peer.send(TransportEvent::Opened { remote: local.clone() }))
            .map_err(|_| TransportError::PeerUnavailable(remote.clone()))?;

        if self.tx.send(TransportEvent::Opened { remote: remote.clone() }).is_err() {
            tracing::warn!(%remote, "own event queue closed before open signal");
        }

        tracing::debug!(%local, %remote, "link established");
        Ok(LocalChannel { local, remote: remote.clone(), peer, closed })
    }

    fn next_event(&mut self) -> impl Future<Output = Option<TransportEvent<LocalChannel>>> + Send {
        self.rx.recv()
    }

    fn shutdown(&mut self) {
        if let Some(local) = self.local.take() {
            self.broker.lock().remove(&local);
            tracing::debug!(%local, "endpoint closed");
        }
        self.rx.close();
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One end of an in-memory link.
pub struct LocalChannel {
    local: PeerId,
    remote: PeerId,
    peer: EventSender,
    closed: Arc<AtomicBool>,
}

impl LocalChannel {
    /// Other end of the link.
    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    /// True once either end closed the link.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for LocalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChannel")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Channel for LocalChannel {
    fn send(&mut self, frame: &str) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.peer
            .send(TransportEvent::Data { from: self.local.clone(), frame: frame.to_string() })
            .map_err(|_| ChannelError::Closed)
    }

    fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // The far end may already be gone; nothing left to tell it then.
        let _ = self.peer.send(TransportEvent::Closed { remote: self.local.clone() });
    }
}
