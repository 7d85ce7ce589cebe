//! Typed publish/subscribe routing.
//!
//! Subscribers register under an exact label. Publishing invokes every
//! callback registered for that label, in registration order, on the
//! caller's task. A panicking callback is caught and logged; delivery to the
//! remaining callbacks continues and the registry is left intact.
//!
//! The same callback may be registered more than once. Each registration
//! gets its own [`Subscription`], which removes exactly that registration.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

type Callback<P> = Arc<dyn Fn(&P) + Send + Sync>;

struct Registry<P> {
    next_id: u64,
    listeners: HashMap<String, Vec<(u64, Callback<P>)>>,
}

impl<P> Registry<P> {
    fn remove(&mut self, label: &str, id: u64) -> bool {
        let Some(set) = self.listeners.get_mut(label) else {
            return false;
        };
        let before = set.len();
        set.retain(|(entry, _)| *entry != id);
        let removed = set.len() != before;
        if set.is_empty() {
            self.listeners.remove(label);
        }
        removed
    }
}

/// Label-keyed listener registry.
///
/// Cheap to clone; clones share the registry.
pub struct EventDispatcher<P> {
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
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: HashMap::new(),
            })),
        }
    }
}

impl<P> fmt::Debug for EventDispatcher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("EventDispatcher")
            .field("labels", &registry.listeners.len())
            .finish()
    }
}

impl<P: 'static> EventDispatcher<P> {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `label`.
    ///
    /// Returns the handle that removes this registration.
    pub fn subscribe<F>(&self, label: &str, callback: F) -> Subscription
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry
                .listeners
                .entry(label.to_string())
                .or_default()
                .push((id, Arc::new(callback)));
            id
        };

        tracing::trace!(label = %label, id = id, "Subscribed");

        let registry = Arc::downgrade(&self.registry);
        let label = label.to_string();
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                if registry.lock().remove(&label, id) {
                    tracing::trace!(label = %label, id = id, "Unsubscribed");
                }
            }
        })
    }

    /// Invoke every callback registered under `label`.
    ///
    /// The listener set is snapshotted before delivery, so subscribing or
    /// unsubscribing from inside a callback affects later publishes only.
    /// Returns the number of callbacks that completed without panicking.
    pub fn publish(&self, label: &str, payload: &P) -> usize {
        let snapshot: Vec<Callback<P>> = {
            let registry = self.registry.lock();
            match registry.listeners.get(label) {
                Some(set) => set.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for callback in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => delivered += 1,
                Err(cause) => {
                    tracing::warn!(
                        label = %label,
                        panic = %panic_message(cause.as_ref()),
                        "Subscriber panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Number of registrations under `label`.
    #[must_use]
    pub fn subscriber_count(&self, label: &str) -> usize {
        self.registry
            .lock()
            .listeners
            .get(label)
            .map_or(0, Vec::len)
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = cause.downcast_ref::<&str>() {
        s
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Handle removing one registration.
///
/// Dropping the handle leaves the registration in place. Calling
/// [`Subscription::unsubscribe`] more than once is a no-op.
#[derive(Clone)]
pub struct Subscription {
    remove: Arc<dyn Fn() + Send + Sync>,
}

impl Subscription {
    fn new(remove: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            remove: Arc::new(remove),
        }
    }

    /// Remove the registration this handle was created for.
    pub fn unsubscribe(&self) {
        (self.remove)();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
