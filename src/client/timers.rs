use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The scheduled tasks a connection may own, keyed by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// One-shot: next reconnect attempt.
    Reconnect,
    /// Periodic: keep-alive frame while connected.
    Heartbeat,
    /// Periodic: "not realtime" signal while the socket is down.
    Polling,
}

impl TimerKind {
    pub const ALL: [TimerKind; 3] = [TimerKind::Reconnect, TimerKind::Heartbeat, TimerKind::Polling];

    pub fn is_periodic(&self) -> bool {
        !matches!(self, TimerKind::Reconnect)
    }
}

/// Shortest period a periodic timer may run with.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A timer firing. `token` identifies the scheduling it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub kind: TimerKind,
    token: u64,
}

/// Tokio-backed timers, at most one per [`TimerKind`].
///
/// Ticks are delivered over a channel. A tick that was already in flight
/// when its timer got cancelled or rescheduled is rejected by
/// [`TimerSet::accept`], so a cancelled timer can never act late.
pub struct TimerSet {
    active: HashMap<TimerKind, (u64, JoinHandle<()>)>,
    next_token: u64,
    ticks: mpsc::UnboundedSender<TimerTick>,
}

impl TimerSet {
    pub fn new(ticks: mpsc::UnboundedSender<TimerTick>) -> Self {
        Self {
            active: HashMap::new(),
            next_token: 0,
            ticks,
        }
    }

    /// (Re)start the timer for `kind`. Periodic kinds tick every `after`,
    /// never faster than [`MIN_PERIOD`].
    pub fn schedule(&mut self, kind: TimerKind, after: Duration) {
        self.cancel(kind);
        let after = if kind.is_periodic() { after.max(MIN_PERIOD) } else { after };
        self.next_token += 1;
        let tick = TimerTick { kind, token: self.next_token };
        let ticks = self.ticks.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(after).await;
                if ticks.send(tick).is_err() || !kind.is_periodic() {
                    break;
                }
            }
        });
        self.active.insert(kind, (tick.token, handle));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some((_, handle)) = self.active.remove(&kind) {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.active.drain() {
            handle.abort();
        }
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.active.contains_key(&kind)
    }

    /// Whether `tick` belongs to the live scheduling of its kind. A one-shot
    /// timer is retired once its tick is accepted.
    pub fn accept(&mut self, tick: &TimerTick) -> bool {
        let live = matches!(self.active.get(&tick.kind), Some((token, _)) if *token == tick.token);
        if live && !tick.kind.is_periodic() {
            self.active.remove(&tick.kind);
        }
        live
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
