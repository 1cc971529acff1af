//! Async runtime for one participant.
//!
//! The Runtime owns a [`Session`] and a [`Transport`] and is the single
//! consumer of both:
//! - Transport callbacks are forwarded to the session in arrival order
//! - Front-end commands arrive over an mpsc channel from a [`RuntimeHandle`]
//! - Session actions are executed here (dials) or published as a fresh
//!   [`RoomView`] on a watch channel (redraws, start, host loss)
//!
//! Guard rejections from local commands are reported through the view and
//! never end the runtime.

use std::collections::VecDeque;

use peerlobby_core::{
    Environment, Participant, PeerId, RejectedAction, Session, SessionAction, SessionConfig,
    SessionError, SessionEvent,
};
use tokio::sync::{mpsc, watch};

use crate::{
    error::RuntimeError,
    transport::{Transport, TransportEvent},
    view::RoomView,
};

/// Runtime tuning.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Capacity of the command queue between handle and runtime.
    pub command_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { command_buffer: 64 }
    }
}

/// Front-end intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a chat line.
    SendChat(String),
    /// Mark the local participant ready.
    MarkReady,
    /// Start the room (host only).
    RequestStart,
    /// Leave the room and stop the runtime.
    Quit,
}

/// Cloneable front-end handle to a running [`Runtime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<RoomView>,
}

impl RuntimeHandle {
    /// Send a chat line.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Stopped` if the runtime has exited.
    pub async fn send_chat(&self, text: impl Into<String>) -> Result<(), RuntimeError> {
        self.send(Command::SendChat(text.into())).await
    }

    /// Mark the local participant ready.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Stopped` if the runtime has exited.
    pub async fn mark_ready(&self) -> Result<(), RuntimeError> {
        self.send(Command::MarkReady).await
    }

    /// Ask to start the room. A rejection shows up in
    /// [`RoomView::last_rejection`].
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Stopped` if the runtime has exited.
    pub async fn request_start(&self) -> Result<(), RuntimeError> {
        self.send(Command::RequestStart).await
    }

    /// Leave the room.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Stopped` if the runtime has already exited.
    pub async fn quit(&self) -> Result<(), RuntimeError> {
        self.send(Command::Quit).await
    }

    /// Queue an arbitrary command.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Stopped` if the runtime has exited.
    pub async fn send(&self, command: Command) -> Result<(), RuntimeError> {
        self.commands.send(command).await.map_err(|_| RuntimeError::Stopped)
    }

    /// Subscribe to view updates.
    pub fn view(&self) -> watch::Receiver<RoomView> {
        self.view.clone()
    }

    /// Latest published view.
    pub fn current(&self) -> RoomView {
        self.view.borrow().clone()
    }

    /// Wait until a published view satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Stopped` if the runtime exits first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&RoomView) -> bool,
    ) -> Result<RoomView, RuntimeError> {
        let mut view = self.view.clone();
        let matched = view.wait_for(predicate).await.map_err(|_| RuntimeError::Stopped)?;
        Ok(matched.clone())
    }
}

enum Step<C> {
    Transport(Option<TransportEvent<C>>),
    Command(Option<Command>),
}

/// Drives one participant's session over a transport.
pub struct Runtime<T: Transport> {
    transport: T,
    session: Session<T::Channel>,
    commands: mpsc::Receiver<Command>,
    view: watch::Sender<RoomView>,
    host_lost: Option<PeerId>,
    started_roster: Option<Vec<Participant>>,
    last_rejection: Option<RejectedAction>,
}

impl<T: Transport> Runtime<T> {
    /// Create a runtime and the handle that controls it.
    ///
    /// The local identifier hint is drawn from `env` here.
    pub fn new<E: Environment>(
        transport: T,
        env: &E,
        session: SessionConfig,
        config: RuntimeConfig,
    ) -> (Self, RuntimeHandle) {
        let session = Session::new(env, session);
        let (commands_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (view, view_rx) = watch::channel(RoomView::from_session(&session));

        let runtime = Self {
            transport,
            session,
            commands,
            view,
            host_lost: None,
            started_roster: None,
            last_rejection: None,
        };
        (runtime, RuntimeHandle { commands: commands_tx, view: view_rx })
    }

    /// Run until quit, transport shutdown, or every handle is dropped.
    ///
    /// Connections are closed and the transport is shut down on every exit
    /// path. Returns the final view.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Transport` if the identifier cannot be claimed or the
    ///   host cannot be dialed
    /// - `RuntimeError::Session` if the session fails outright
    pub async fn run(mut self) -> Result<RoomView, RuntimeError> {
        let result = self.drive().await;

        self.session.teardown();
        self.transport.shutdown();
        self.publish();

        match &result {
            Ok(()) => tracing::info!("runtime stopped"),
            Err(e) => tracing::error!("runtime failed: {e}"),
        }
        result.map(|()| self.snapshot())
    }

    async fn drive(&mut self) -> Result<(), RuntimeError> {
        let hint = self.session.local_id_hint().clone();
        let local_id = self.transport.open(&hint).await?;
        tracing::info!(%local_id, role = ?self.session.role(), "transport open");

        let actions = self.session.handle(SessionEvent::LocalReady { local_id })?;
        self.apply(actions)?;

        loop {
            let step = tokio::select! {
                event = self.transport.next_event() => Step::Transport(event),
                command = self.commands.recv() => Step::Command(command),
            };

            match step {
                Step::Transport(Some(event)) => {
                    let actions = self.session.handle(event.into())?;
                    self.apply(actions)?;
                },
                Step::Transport(None) => {
                    tracing::info!("transport closed");
                    return Ok(());
                },
                Step::Command(Some(Command::Quit) | None) => return Ok(()),
                Step::Command(Some(command)) => self.run_command(command)?,
            }
        }
    }

    fn run_command(&mut self, command: Command) -> Result<(), RuntimeError> {
        let result = match command {
            Command::SendChat(text) => self.session.send_chat(&text),
            Command::MarkReady => self.session.mark_ready(),
            Command::RequestStart => self.session.request_start(),
            Command::Quit => Ok(vec![]),
        };

        match result {
            Ok(actions) => self.apply(actions),
            Err(SessionError::Rejected(rejection)) => {
                tracing::info!("action rejected: {rejection}");
                self.last_rejection = Some(rejection);
                self.publish();
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }

    fn apply(&mut self, actions: Vec<SessionAction>) -> Result<(), RuntimeError> {
        let mut pending = VecDeque::from(actions);
        let mut render = false;

        while let Some(action) = pending.pop_front() {
            match action {
                SessionAction::Dial { remote } => {
                    tracing::debug!(%remote, "dialing");
                    let channel = self.transport.connect(&remote)?;
                    pending.extend(self.session.handle(SessionEvent::Dialed { remote, channel })?);
                },
                SessionAction::Render => render = true,
                SessionAction::Started { roster } => {
                    tracing::info!(participants = roster.len(), "room started");
                    self.started_roster = Some(roster);
                    render = true;
                },
                SessionAction::HostLost { host } => {
                    tracing::warn!(%host, "host left, room is gone");
                    self.host_lost = Some(host);
                    render = true;
                },
            }
        }

        if render {
            self.publish();
        }
        Ok(())
    }

    fn snapshot(&self) -> RoomView {
        let mut view = RoomView::from_session(&self.session);
        view.host_lost = self.host_lost.clone();
        view.started_roster = self.started_roster.clone();
        view.last_rejection = self.last_rejection.clone();
        view
    }

    fn publish(&self) {
        self.view.send_replace(self.snapshot());
    }
}
