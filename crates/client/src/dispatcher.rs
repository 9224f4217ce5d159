//! In-process publish/subscribe registry keyed by event name.
//!
//! The transport publishes into it; the ride store and any UI-side watcher
//! subscribe. Handlers run synchronously on the publishing task, in
//! registration order. A handler that fails (returns `Err` or panics) is
//! logged and skipped; the remaining handlers still run.
//!
//! `publish` iterates over a snapshot of the handler list, so a handler may
//! subscribe or unsubscribe (itself included) while being invoked.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use ridewave_shared::ServerEvent;

pub type Handler<P> = Arc<dyn Fn(&P) -> anyhow::Result<()> + Send + Sync>;

/// Opaque handle returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registry<P> {
    next_id: u64,
    handlers: HashMap<String, Vec<(SubscriptionId, Handler<P>)>>,
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub invoked: usize,
    pub failed: usize,
}

pub struct EventDispatcher<P = ServerEvent> {
    registry: Arc<Mutex<Registry<P>>>,
}

impl<P> Clone for EventDispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<P> Default for EventDispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> EventDispatcher<P> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: HashMap::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry
            .handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove one handler, or every handler for `event` when `id` is `None`.
    /// Returns how many were removed; unknown names are a no-op.
    pub fn unsubscribe(&self, event: &str, id: Option<SubscriptionId>) -> usize {
        let mut registry = self.lock();
        match id {
            None => registry.handlers.remove(event).map_or(0, |h| h.len()),
            Some(id) => {
                let Some(handlers) = registry.handlers.get_mut(event) else {
                    return 0;
                };
                let before = handlers.len();
                handlers.retain(|(sid, _)| *sid != id);
                let removed = before - handlers.len();
                if handlers.is_empty() {
                    registry.handlers.remove(event);
                }
                removed
            }
        }
    }

    pub fn publish(&self, event: &str, payload: &P) -> Delivery {
        let snapshot: Vec<(SubscriptionId, Handler<P>)> = self
            .lock()
            .handlers
            .get(event)
            .cloned()
            .unwrap_or_default();

        let mut delivery = Delivery::default();
        for (id, handler) in snapshot {
            delivery.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    crate::log_error!("handler {:?} for '{}' failed: {:#}", id, event, e);
                }
                Err(panic) => {
                    delivery.failed += 1;
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    crate::log_error!("handler {:?} for '{}' panicked: {}", id, event, msg);
                }
            }
        }
        delivery
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.lock().handlers.get(event).map_or(0, |h| h.len())
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.lock().handlers.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Registry<P>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventDispatcher<ServerEvent> {
    /// Publish a server event under its own name.
    pub fn dispatch(&self, event: &ServerEvent) -> Delivery {
        self.publish(event.name(), event)
    }
}
