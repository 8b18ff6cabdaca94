use std::collections::BTreeSet;
use std::time::Duration;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::models::ClientMessage;
use super::backoff::reconnect_delay;
use super::config::ClientConfig;
use super::state::ConnectionState;
use super::timers::TimerKind;

/// Close code for an intentional, clean shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the socket died without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Identifies one physical socket. Every (re)connect opens a new one.
pub type SocketId = u64;

/// Something that happened to the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Explicit connect by the application.
    Connect,
    /// Explicit disconnect by the application (e.g. logout).
    Disconnect,
    Opened(SocketId),
    Closed { socket: SocketId, code: u16 },
    TransportError(SocketId),
    TimerFired(TimerKind),
    Subscribe(String),
    Unsubscribe(String),
}

/// What the runtime must do in response.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenSocket { socket: SocketId, url: String },
    CloseSocket { socket: SocketId, code: u16 },
    Send { socket: SocketId, message: ClientMessage },
    Schedule { timer: TimerKind, after: Duration },
    Cancel(TimerKind),
    StateChanged(ConnectionState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketPhase {
    Idle,
    Opening(SocketId),
    Open(SocketId),
}

/// The connection lifecycle as a pure state machine.
///
/// It performs no I/O: every [`Input`] yields the [`Effect`]s the runtime
/// has to carry out. Socket events name the socket they came from, and
/// events from a socket that is no longer current are ignored, so a retired
/// socket can neither deliver messages nor trigger a reconnect.
pub struct ConnectionMachine {
    config: ClientConfig,
    state: ConnectionState,
    socket: SocketPhase,
    last_socket: SocketId,
    reconnect_enabled: bool,
    attempts: u32,
    timers: BTreeSet<TimerKind>,
}

impl ConnectionMachine {
    pub fn new(config: ClientConfig) -> Self {
        let reconnect_enabled = config.reconnect;
        Self {
            config,
            state: ConnectionState::Disconnected,
            socket: SocketPhase::Idle,
            last_socket: 0,
            reconnect_enabled,
            attempts: 0,
            timers: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_timer_active(&self, timer: TimerKind) -> bool {
        self.timers.contains(&timer)
    }

    pub fn active_timers(&self) -> Vec<TimerKind> {
        self.timers.iter().copied().collect()
    }

    /// The socket whose events are still meaningful, if any.
    pub fn current_socket(&self) -> Option<SocketId> {
        match self.socket {
            SocketPhase::Idle => None,
            SocketPhase::Opening(id) | SocketPhase::Open(id) => Some(id),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.socket, SocketPhase::Open(_))
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let mut effects = Vec::new();
        match input {
            Input::Connect => {
                self.reconnect_enabled = self.config.reconnect;
                self.connect(&mut effects);
            }
            Input::Disconnect => self.disconnect(&mut effects),
            Input::Opened(socket) => self.on_open(socket, &mut effects),
            Input::Closed { socket, code } => self.on_close(socket, code, &mut effects),
            Input::TransportError(socket) => {
                if self.current_socket() == Some(socket) {
                    self.set_state(ConnectionState::Error, &mut effects);
                }
            }
            Input::TimerFired(timer) => self.on_timer(timer, &mut effects),
            Input::Subscribe(channel_id) => {
                self.send(ClientMessage::subscribe(channel_id), &mut effects)
            }
            Input::Unsubscribe(channel_id) => {
                self.send(ClientMessage::unsubscribe(channel_id), &mut effects)
            }
        }
        effects
    }

    fn connect(&mut self, effects: &mut Vec<Effect>) {
        if self.socket != SocketPhase::Idle {
            debug!("Connect ignored, socket already {:?}", self.socket);
            return;
        }

        // A pending retry is superseded by this attempt
        self.cancel_timer(TimerKind::Reconnect, effects);

        let Some(credential) = self.config.credential() else {
            warn!("No credential available, not connecting");
            self.set_state(ConnectionState::Error, effects);
            return;
        };

        match self.config.endpoint_url(&credential) {
            Ok(url) => {
                self.set_state(ConnectionState::Connecting, effects);
                self.last_socket += 1;
                let socket = self.last_socket;
                self.socket = SocketPhase::Opening(socket);
                effects.push(Effect::OpenSocket { socket, url: url.to_string() });
            }
            Err(e) => {
                warn!("Cannot open realtime connection: {}", e);
                self.set_state(ConnectionState::Error, effects);
                if self.config.polling_fallback {
                    self.start_polling(effects);
                }
            }
        }
    }

    fn disconnect(&mut self, effects: &mut Vec<Effect>) {
        self.reconnect_enabled = false;
        for timer in TimerKind::ALL {
            self.cancel_timer(timer, effects);
        }
        if let Some(socket) = self.current_socket() {
            effects.push(Effect::CloseSocket { socket, code: CLOSE_NORMAL });
        }
        self.socket = SocketPhase::Idle;
        self.set_state(ConnectionState::Disconnected, effects);
    }

    fn on_open(&mut self, socket: SocketId, effects: &mut Vec<Effect>) {
        if self.socket != SocketPhase::Opening(socket) {
            debug!("Ignoring open of stale socket {}", socket);
            return;
        }
        self.socket = SocketPhase::Open(socket);
        self.set_state(ConnectionState::Connected, effects);
        self.attempts = 0;
        self.cancel_timer(TimerKind::Polling, effects);
        self.cancel_timer(TimerKind::Reconnect, effects);
        self.start_timer(TimerKind::Heartbeat, self.config.heartbeat_interval, effects);
    }

    fn on_close(&mut self, socket: SocketId, code: u16, effects: &mut Vec<Effect>) {
        if self.current_socket() != Some(socket) {
            debug!("Ignoring close of stale socket {}", socket);
            return;
        }
        self.socket = SocketPhase::Idle;
        self.set_state(ConnectionState::Disconnected, effects);
        self.cancel_timer(TimerKind::Heartbeat, effects);

        if self.reconnect_enabled && code != CLOSE_NORMAL {
            self.schedule_reconnect(effects);
        } else if self.config.polling_fallback {
            self.start_polling(effects);
        }
    }

    fn on_timer(&mut self, timer: TimerKind, effects: &mut Vec<Effect>) {
        if !self.timers.contains(&timer) {
            debug!("Ignoring cancelled {:?} timer", timer);
            return;
        }
        match timer {
            TimerKind::Reconnect => {
                self.timers.remove(&TimerKind::Reconnect);
                self.attempts = self.attempts.saturating_add(1);
                self.connect(effects);
            }
            TimerKind::Heartbeat => {
                self.send(ClientMessage::heartbeat(Utc::now().timestamp_millis()), effects);
            }
            TimerKind::Polling => {
                // Signal only: consumers refetch on their own when not realtime
                self.set_state(ConnectionState::Disconnected, effects);
            }
        }
    }

    fn send(&mut self, message: ClientMessage, effects: &mut Vec<Effect>) {
        match self.socket {
            SocketPhase::Open(socket) => effects.push(Effect::Send { socket, message }),
            _ => debug!("Socket not open, dropping {:?}", message),
        }
    }

    fn schedule_reconnect(&mut self, effects: &mut Vec<Effect>) {
        let delay = reconnect_delay(
            self.config.reconnect_delay,
            self.config.max_reconnect_delay,
            self.attempts,
        );
        info!("Reconnecting in {:?} (attempt {})", delay, self.attempts + 1);
        self.start_timer(TimerKind::Reconnect, delay, effects);
    }

    fn start_polling(&mut self, effects: &mut Vec<Effect>) {
        if self.timers.contains(&TimerKind::Polling) {
            return;
        }
        self.start_timer(TimerKind::Polling, self.config.polling_interval, effects);
    }

    fn start_timer(&mut self, timer: TimerKind, after: Duration, effects: &mut Vec<Effect>) {
        self.timers.insert(timer);
        effects.push(Effect::Schedule { timer, after });
    }

    fn cancel_timer(&mut self, timer: TimerKind, effects: &mut Vec<Effect>) {
        if self.timers.remove(&timer) {
            effects.push(Effect::Cancel(timer));
        }
    }

    fn set_state(&mut self, state: ConnectionState, effects: &mut Vec<Effect>) {
        if self.state != state {
            debug!("Connection state {} -> {}", self.state, state);
            self.state = state;
            effects.push(Effect::StateChanged(state));
        }
    }
}
