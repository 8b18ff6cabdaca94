use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::{EventPayload, ServerEvent};
use super::config::{ClientConfig, StateCallback};
use super::listeners::{EventListeners, ListenerHandle};
use super::machine::{ConnectionMachine, Effect, Input, SocketId};
use super::state::ConnectionState;
use super::timers::{TimerSet, TimerTick};
use super::transport::{spawn_socket, Outgoing, SocketEvent};

enum Command {
    Connect,
    Disconnect(oneshot::Sender<()>),
    Subscribe(String),
    Unsubscribe(String),
}

/// Realtime client: one logical connection that reconnects on its own.
///
/// Cheap to clone; all clones drive the same connection. The background
/// task stops (and closes the socket) once the last clone is dropped.
#[derive(Clone)]
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    listeners: EventListeners,
}

impl RealtimeClient {
    /// Create the client. Must be called from within a Tokio runtime; no
    /// connection is attempted until [`connect`](Self::connect).
    pub fn new(config: ClientConfig) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let listeners = EventListeners::new();

        let driver = Driver::new(config, commands_rx, state_tx, listeners.clone());
        tokio::spawn(driver.run());

        Self { commands, state, listeners }
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Realtime driver stopped, command dropped");
        }
    }

    /// Start connecting. A no-op while a socket is already open or opening.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the connection for good: no reconnect, no polling. Resolves once
    /// the close has been applied.
    pub async fn disconnect(&self) {
        let (done, applied) = oneshot::channel();
        self.command(Command::Disconnect(done));
        let _ = applied.await;
    }

    /// Ask the server for events on `channel_id`. Dropped when not connected.
    pub fn subscribe(&self, channel_id: impl Into<String>) {
        self.command(Command::Subscribe(channel_id.into()));
    }

    pub fn unsubscribe(&self, channel_id: impl Into<String>) {
        self.command(Command::Unsubscribe(channel_id.into()));
    }

    pub fn on<E: EventPayload>(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerHandle {
        self.listeners.on(listener)
    }

    pub fn on_any(&self, listener: impl Fn(&ServerEvent) + Send + Sync + 'static) -> ListenerHandle {
        self.listeners.on_any(listener)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the connection reaches `target`. Returns `false` if the
    /// client shut down first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> bool {
        let mut state = self.watch_state();
        let reached = state.wait_for(|current| *current == target).await.is_ok();
        reached
    }
}

struct LiveSocket {
    id: SocketId,
    task: JoinHandle<()>,
    outgoing: Option<mpsc::UnboundedSender<Outgoing>>,
}

/// Owns the machine and carries out its effects.
struct Driver {
    machine: ConnectionMachine,
    timers: TimerSet,
    ticks: mpsc::UnboundedReceiver<TimerTick>,
    events_tx: mpsc::UnboundedSender<SocketEvent>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    on_change: Option<StateCallback>,
    listeners: EventListeners,
    socket: Option<LiveSocket>,
}

impl Driver {
    fn new(
        config: ClientConfig,
        commands: mpsc::UnboundedReceiver<Command>,
        state: watch::Sender<ConnectionState>,
        listeners: EventListeners,
    ) -> Self {
        let (ticks_tx, ticks) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            on_change: config.on_connection_change.clone(),
            machine: ConnectionMachine::new(config),
            timers: TimerSet::new(ticks_tx),
            ticks,
            events_tx,
            events,
            commands,
            state,
            listeners,
            socket: None,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(tick) = self.ticks.recv() => {
                    if self.timers.accept(&tick) {
                        self.apply(Input::TimerFired(tick.kind));
                    }
                }
                Some(event) = self.events.recv() => self.on_socket_event(event),
            }
        }

        debug!("All client handles dropped, shutting down");
        self.apply(Input::Disconnect);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.apply(Input::Connect),
            Command::Disconnect(done) => {
                self.apply(Input::Disconnect);
                let _ = done.send(());
            }
            Command::Subscribe(channel_id) => self.apply(Input::Subscribe(channel_id)),
            Command::Unsubscribe(channel_id) => self.apply(Input::Unsubscribe(channel_id)),
        }
    }

    fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened(id, outgoing) => {
                if let Some(socket) = self.socket.as_mut().filter(|s| s.id == id) {
                    socket.outgoing = Some(outgoing);
                }
                self.apply(Input::Opened(id));
            }
            SocketEvent::Message(id, text) => {
                if self.machine.is_open() && self.machine.current_socket() == Some(id) {
                    self.listeners.dispatch_raw(&text);
                }
            }
            SocketEvent::Error(id, error) => {
                warn!("Realtime socket {} error: {}", id, error);
                self.apply(Input::TransportError(id));
            }
            SocketEvent::Closed(id, code) => {
                if self.socket.as_ref().is_some_and(|s| s.id == id) {
                    self.socket = None;
                }
                self.apply(Input::Closed { socket: id, code });
            }
        }
    }

    fn apply(&mut self, input: Input) {
        for effect in self.machine.handle(input) {
            match effect {
                Effect::OpenSocket { socket, url } => {
                    if let Some(old) = self.socket.take() {
                        old.task.abort();
                    }
                    let task = spawn_socket(socket, url, self.events_tx.clone());
                    self.socket = Some(LiveSocket { id: socket, task, outgoing: None });
                }
                Effect::CloseSocket { socket, code } => {
                    if let Some(live) = self.socket.take_if(|s| s.id == socket) {
                        match live.outgoing {
                            // The task writes the close frame and exits
                            Some(outgoing) if outgoing.send(Outgoing::Close(code)).is_ok() => {}
                            _ => live.task.abort(),
                        }
                    }
                }
                Effect::Send { socket, message } => {
                    let sent = self
                        .socket
                        .as_ref()
                        .filter(|s| s.id == socket)
                        .and_then(|s| s.outgoing.as_ref())
                        .is_some_and(|outgoing| outgoing.send(Outgoing::Text(message.to_text())).is_ok());
                    if !sent {
                        debug!("Socket {} gone, dropping outbound frame", socket);
                    }
                }
                Effect::Schedule { timer, after } => self.timers.schedule(timer, after),
                Effect::Cancel(timer) => self.timers.cancel(timer),
                Effect::StateChanged(state) => {
                    if let Some(callback) = &self.on_change {
                        callback(state);
                    }
                    self.state.send_replace(state);
                }
            }
        }
    }
}
