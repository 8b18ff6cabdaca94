use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error};

use crate::models::{DecodeError, EventKind, EventPayload, ServerEvent};

type Callback = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    by_kind: HashMap<EventKind, Vec<(u64, Callback)>>,
    any: Vec<(u64, Callback)>,
}

impl ListenerTable {
    fn remove(&mut self, id: u64, kind: Option<EventKind>) {
        match kind {
            Some(kind) => {
                if let Some(listeners) = self.by_kind.get_mut(&kind) {
                    listeners.retain(|(listener_id, _)| *listener_id != id);
                    if listeners.is_empty() {
                        self.by_kind.remove(&kind);
                    }
                }
            }
            None => self.any.retain(|(listener_id, _)| *listener_id != id),
        }
    }
}

/// Typed event listeners, keyed by event name.
///
/// Listeners for one event run synchronously in registration order. The
/// table lock is released before any listener runs, so a listener may
/// register or remove listeners itself.
#[derive(Clone, Default)]
pub struct EventListeners {
    table: Arc<Mutex<ListenerTable>>,
}

/// Returned by [`EventListeners::on`]; removes exactly that listener.
#[must_use = "dropping the handle keeps the listener registered"]
pub struct ListenerHandle {
    id: u64,
    kind: Option<EventKind>,
    table: Weak<Mutex<ListenerTable>>,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {
        if let Some(table) = self.table.upgrade() {
            table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(self.id, self.kind);
        }
    }
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ListenerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, kind: Option<EventKind>, callback: Callback) -> ListenerHandle {
        let mut table = self.lock();
        table.next_id += 1;
        let id = table.next_id;
        match kind {
            Some(kind) => table.by_kind.entry(kind).or_default().push((id, callback)),
            None => table.any.push((id, callback)),
        }
        ListenerHandle { id, kind, table: Arc::downgrade(&self.table) }
    }

    /// Register a listener for the event carrying payload `E`.
    pub fn on<E: EventPayload>(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerHandle {
        let callback: Callback = Arc::new(move |event: &ServerEvent| {
            if let Some(payload) = E::from_event(event) {
                listener(payload);
            }
        });
        self.register(Some(E::KIND), callback)
    }

    /// Register a listener for every event, after the typed listeners.
    pub fn on_any(&self, listener: impl Fn(&ServerEvent) + Send + Sync + 'static) -> ListenerHandle {
        self.register(None, Arc::new(listener))
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Invoke the listeners for `event`; returns how many ran.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let snapshot: Vec<Callback> = {
            let table = self.lock();
            table
                .by_kind
                .get(&event.kind())
                .into_iter()
                .flatten()
                .chain(table.any.iter())
                .map(|(_, callback)| callback.clone())
                .collect()
        };

        for callback in &snapshot {
            // A panicking listener must not take the connection down with it
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!("Listener for {} panicked", event.kind());
            }
        }
        snapshot.len()
    }

    /// Decode a raw frame and dispatch it. Frames that do not decode are
    /// dropped without reaching any listener.
    pub fn dispatch_raw(&self, raw: &str) -> usize {
        match ServerEvent::decode(raw) {
            Ok(event) => self.dispatch(&event),
            Err(DecodeError::UnknownEvent(event)) => {
                debug!("No typed event for '{}', ignoring", event);
                0
            }
            Err(e) => {
                debug!("Discarding inbound frame: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentStatus, Subscribed};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn status(agent_id: &str) -> ServerEvent {
        ServerEvent::AgentStatus(AgentStatus {
            agent_id: agent_id.to_string(),
            status: "online".to_string(),
        })
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let listeners = EventListeners::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<ListenerHandle> = (0..3)
            .map(|i| {
                let order = order.clone();
                listeners.on::<AgentStatus>(move |_| order.lock().unwrap().push(i))
            })
            .collect();

        assert_eq!(listeners.dispatch(&status("a")), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        drop(handles);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let listeners = EventListeners::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let first = {
            let hits = hits.clone();
            listeners.on::<AgentStatus>(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _second = {
            let hits = hits.clone();
            listeners.on::<AgentStatus>(move |_| {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };

        first.unsubscribe();
        listeners.dispatch(&status("a"));

        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(listeners.listener_count(EventKind::AgentStatus), 1);
    }

    #[test]
    fn typed_listener_ignores_other_events() {
        let listeners = EventListeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _handle = {
            let seen = seen.clone();
            listeners.on::<AgentStatus>(move |payload| seen.lock().unwrap().push(payload.agent_id.clone()))
        };

        listeners.dispatch(&ServerEvent::Subscribed(Subscribed { channel_id: "c".to_string() }));
        listeners.dispatch(&status("agent-7"));

        assert_eq!(*seen.lock().unwrap(), vec!["agent-7".to_string()]);
    }

    #[test]
    fn malformed_frames_reach_no_listener() {
        let listeners = EventListeners::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _typed = {
            let hits = hits.clone();
            listeners.on::<AgentStatus>(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _any = {
            let hits = hits.clone();
            listeners.on_any(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert_eq!(listeners.dispatch_raw("this is not json"), 0);
        assert_eq!(listeners.dispatch_raw(r#"{"event":"agent:status","data":"oops"}"#), 0);
        assert_eq!(listeners.dispatch_raw(r#"{"event":"reaction:new","data":{}}"#), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert_eq!(
            listeners.dispatch_raw(r#"{"event":"agent:status","data":{"agentId":"a","status":"idle"}}"#),
            2
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_stop_the_rest() {
        let listeners = EventListeners::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _bad = listeners.on::<AgentStatus>(|_| panic!("listener bug"));
        let _good = {
            let hits = hits.clone();
            listeners.on::<AgentStatus>(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert_eq!(listeners.dispatch(&status("a")), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let listeners = EventListeners::new();
        let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));
        let handle = {
            let slot = slot.clone();
            let hits = hits.clone();
            listeners.on::<AgentStatus>(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = slot.lock().unwrap().take() {
                    handle.unsubscribe();
                }
            })
        };
        *slot.lock().unwrap() = Some(handle);

        listeners.dispatch(&status("a"));
        listeners.dispatch(&status("a"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
