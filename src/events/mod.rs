//! In-process typed pub/sub for job lifecycle events.
//!
//! Delivery is synchronous fan-out: `emit` invokes every current
//! subscriber on the calling task. Subscribers must be fast and must
//! dispatch long work themselves; there is no backpressure. Panicking
//! subscribers are caught and logged, never propagated.

pub mod wire;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{error, warn};

use crate::models::{Job, ProgressSnapshot};

/// Listener-count guard per event type. Exceeding it almost always means
/// a subscription leak, so it is logged loudly.
pub const MAX_LISTENERS: usize = 100;

/// Discriminant used for subscription routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    JobStatusChange,
    JobProgress,
    JobListChange,
    LibraryChange,
}

/// A bus event with its payload.
#[derive(Debug, Clone)]
pub enum Event {
    /// A job transitioned between lifecycle states.
    JobStatusChange(Job),
    /// A page finished processing within a running job.
    JobProgress {
        job: Job,
        progress: ProgressSnapshot,
    },
    /// The set of tracked jobs changed (enqueue or clear).
    JobListChange,
    /// A successful ingest may have changed the persisted library set.
    LibraryChange,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::JobStatusChange(_) => EventType::JobStatusChange,
            Event::JobProgress { .. } => EventType::JobProgress,
            Event::JobListChange => EventType::JobListChange,
            Event::LibraryChange => EventType::LibraryChange,
        }
    }
}

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

struct Listener {
    id: u64,
    once: bool,
    callback: Callback,
}

/// Handle returned by `on`/`once`; pass to `off` to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Synchronous in-process event bus.
///
/// Created once at application start and shared via `Arc`. `shutdown`
/// removes all listeners; the bus is never implicitly reinitialized.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<EventType, Vec<Listener>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to an event type. Returns an unsubscribe handle.
    pub fn on<F>(&self, event_type: EventType, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(event_type, Arc::new(callback), false)
    }

    /// Subscribe for a single delivery.
    pub fn once<F>(&self, event_type: EventType, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(event_type, Arc::new(callback), true)
    }

    fn subscribe(&self, event_type: EventType, callback: Callback, once: bool) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.listeners.lock().expect("event bus lock poisoned");
        let entry = listeners.entry(event_type).or_default();
        entry.push(Listener { id, once, callback });
        if entry.len() > MAX_LISTENERS {
            warn!(
                ?event_type,
                count = entry.len(),
                "listener count exceeds cap; possible subscription leak"
            );
        }
        ListenerId(id)
    }

    /// Remove one listener. Returns whether it was found.
    pub fn off(&self, event_type: EventType, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().expect("event bus lock poisoned");
        if let Some(entry) = listeners.get_mut(&event_type) {
            let before = entry.len();
            entry.retain(|l| l.id != id.0);
            return entry.len() != before;
        }
        false
    }

    /// Remove all listeners for one type, or every listener when `None`.
    pub fn remove_all_listeners(&self, event_type: Option<EventType>) {
        let mut listeners = self.listeners.lock().expect("event bus lock poisoned");
        match event_type {
            Some(t) => {
                listeners.remove(&t);
            }
            None => listeners.clear(),
        }
    }

    pub fn listener_count(&self, event_type: EventType) -> usize {
        let listeners = self.listeners.lock().expect("event bus lock poisoned");
        listeners.get(&event_type).map_or(0, Vec::len)
    }

    /// Deliver an event to all current subscribers of its type.
    pub fn emit(&self, event: Event) {
        let event_type = event.event_type();
        let callbacks: Vec<(u64, bool, Callback)> = {
            let listeners = self.listeners.lock().expect("event bus lock poisoned");
            listeners
                .get(&event_type)
                .map(|entry| {
                    entry
                        .iter()
                        .map(|l| (l.id, l.once, l.callback.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut spent = Vec::new();
        for (id, once, callback) in &callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                error!(?event_type, listener = id, "event subscriber panicked");
            }
            if *once {
                spent.push(*id);
            }
        }

        if !spent.is_empty() {
            let mut listeners = self.listeners.lock().expect("event bus lock poisoned");
            if let Some(entry) = listeners.get_mut(&event_type) {
                entry.retain(|l| !spent.contains(&l.id));
            }
        }
    }

    /// Flush and remove all listeners. Called once at application exit.
    pub fn shutdown(&self) {
        self.remove_all_listeners(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fan_out_and_unsubscribe() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = {
            let hits = hits.clone();
            bus.on(EventType::JobListChange, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _h2 = {
            let hits = hits.clone();
            bus.on(EventType::JobListChange, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        bus.emit(Event::JobListChange);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(bus.off(EventType::JobListChange, h1));
        assert!(!bus.off(EventType::JobListChange, h1));
        bus.emit(Event::JobListChange);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn once_fires_single_time() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = hits.clone();
            bus.once(EventType::LibraryChange, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.emit(Event::LibraryChange);
        bus.emit(Event::LibraryChange);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(EventType::LibraryChange), 0);
    }

    #[test]
    fn panicking_subscriber_does_not_poison_fanout() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.on(EventType::JobListChange, |_| panic!("subscriber bug"));
        {
            let hits = hits.clone();
            bus.on(EventType::JobListChange, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.emit(Event::JobListChange);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_all_listeners_by_type() {
        let bus = EventBus::new();
        bus.on(EventType::JobProgress, |_| {});
        bus.on(EventType::JobListChange, |_| {});
        bus.remove_all_listeners(Some(EventType::JobProgress));
        assert_eq!(bus.listener_count(EventType::JobProgress), 0);
        assert_eq!(bus.listener_count(EventType::JobListChange), 1);
        bus.shutdown();
        assert_eq!(bus.listener_count(EventType::JobListChange), 0);
    }
}
