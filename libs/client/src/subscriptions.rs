//! Event-subscription registry: multiple independent handlers per event
//! kind, invoked in registration order.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use palaver_common::proto::{EventKind, ServerEvent};

type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

struct Entry {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<Entry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a handler for one event kind. The handle removes the
    /// registration when dropped or explicitly unsubscribed.
    pub fn subscribe(
        self: &Arc<Self>,
        kind: EventKind,
        handler: impl Fn(&ServerEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.entry(kind).or_default().push(Entry {
            id,
            handler: Arc::new(handler),
        });
        SubscriptionHandle {
            registry: Arc::clone(self),
            kind,
            id,
        }
    }

    /// Invoke every handler registered for the event's kind, in registration
    /// order. A panicking handler is logged and skipped; later handlers still
    /// run. Handlers are cloned out of the lock, so a handler may subscribe
    /// or unsubscribe reentrantly without deadlocking.
    pub fn dispatch(&self, event: &ServerEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = match self.inner.lock().handlers.get(&kind) {
            Some(entries) => entries.iter().map(|e| Arc::clone(&e.handler)).collect(),
            None => return,
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(?kind, "event handler panicked");
            }
        }
    }

    fn unsubscribe(&self, kind: EventKind, id: u64) {
        let mut inner = self.inner.lock();
        if let Some(entries) = inner.handlers.get_mut(&kind) {
            entries.retain(|e| e.id != id);
            if entries.is_empty() {
                inner.handlers.remove(&kind);
            }
        }
    }

    #[cfg(test)]
    fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .lock()
            .handlers
            .get(&kind)
            .map_or(0, |entries| entries.len())
    }
}

/// Removes its registration on drop.
pub struct SubscriptionHandle {
    registry: Arc<SubscriptionRegistry>,
    kind: EventKind,
    id: u64,
}

impl SubscriptionHandle {
    /// Explicit removal; equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.kind, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handlers_run_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        let _a = registry.subscribe(EventKind::Error, move |_| o1.lock().push(1));
        let o2 = order.clone();
        let _b = registry.subscribe(EventKind::Error, move |_| o2.lock().push(2));

        registry.dispatch(&ServerEvent::error("x"));
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn dropping_handle_unsubscribes() {
        let registry = SubscriptionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let handle = registry.subscribe(EventKind::Error, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        registry.dispatch(&ServerEvent::error("x"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drop(handle);
        assert_eq!(registry.handler_count(EventKind::Error), 0);
        registry.dispatch(&ServerEvent::error("x"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_does_not_block_later_handlers() {
        let registry = SubscriptionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _a = registry.subscribe(EventKind::Error, |_| panic!("boom"));
        let c = calls.clone();
        let _b = registry.subscribe(EventKind::Error, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&ServerEvent::error("x"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_only_hits_matching_kind() {
        let registry = SubscriptionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let _a = registry.subscribe(EventKind::NewMessage, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&ServerEvent::error("x"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
