use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

// Source of process-wide unique listener identifiers.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier returned when subscribing to an [`Emitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A subscribed listener.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// An ordered list of listeners for a single kind of event.
///
/// Listeners are invoked outside of the internal lock, so they can
/// subscribe or unsubscribe while an event is being emitted.
pub struct Emitter<E> {
    listeners: Mutex<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.len())
            .finish()
    }
}

impl<E> Emitter<E> {
    /// Creates an [`Emitter`] without listeners.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Subscribes a listener.
    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        self.subscribe_arc(Arc::new(listener))
    }

    /// Subscribes a shared listener.
    pub fn subscribe_arc(&self, listener: Listener<E>) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.lock().push((id, listener));
        id
    }

    /// Unsubscribes a listener.
    ///
    /// Returns `false` if the listener was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let len = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != len
    }

    /// Invokes every listener in subscription order.
    ///
    /// Returns the number of invoked listeners.
    pub fn emit(&self, event: &E) -> usize {
        let listeners: Vec<Listener<E>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in &listeners {
            listener(event);
        }

        listeners.len()
    }

    /// Returns the number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Checks whether there are no listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::Emitter;

    #[test]
    fn ordered_emission() {
        let emitter = Emitter::<u32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let received = Arc::clone(&received);
            emitter.subscribe(move |value| received.lock().push(("first", *value)))
        };
        {
            let received = Arc::clone(&received);
            emitter.subscribe(move |value| received.lock().push(("second", *value)));
        }

        assert_eq!(emitter.emit(&1), 2);
        assert!(emitter.unsubscribe(first));
        assert!(!emitter.unsubscribe(first));
        assert_eq!(emitter.emit(&2), 1);

        assert_eq!(
            *received.lock(),
            [("first", 1), ("second", 1), ("second", 2)]
        );
    }

    #[test]
    fn reentrant_unsubscribe() {
        let emitter = Arc::new(Emitter::<()>::new());
        let id = Arc::new(Mutex::new(None));

        let listener_id = {
            let inner = Arc::clone(&emitter);
            let id = Arc::clone(&id);
            emitter.subscribe(move |_| {
                if let Some(id) = id.lock().take() {
                    inner.unsubscribe(id);
                }
            })
        };
        *id.lock() = Some(listener_id);

        assert_eq!(emitter.emit(&()), 1);
        assert!(emitter.is_empty());
        assert_eq!(emitter.emit(&()), 0);
    }
}
