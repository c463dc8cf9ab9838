//! Synchronous observer lists.
//!
//! Subscribers are dispatched on the calling thread, in subscription order,
//! while the emitting operation is still running. Handlers must not block.
//! Every subscription is removed explicitly through its [`SubscriberId`].

/// Handle returned by [`Observers::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

type Callback<E> = Box<dyn FnMut(&E) + Send>;

/// An ordered list of callbacks interested in events of type `E`.
pub struct Observers<E> {
    callbacks: Vec<(SubscriberId, Callback<E>)>,
    next_id: u64,
}

impl<E> Observers<E> {
    /// Creates an empty observer list.
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
            next_id: 0,
        }
    }

    /// Registers a callback. It stays registered until [`Self::unsubscribe`]
    /// is called with the returned id.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriberId
    where
        F: FnMut(&E) + Send + 'static,
    {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Removes a callback. Returns `false` if the id was not registered.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(existing, _)| *existing != id);
        self.callbacks.len() != before
    }

    /// Invokes every callback with `event`.
    pub fn emit(&mut self, event: &E) {
        for (_, callback) in &mut self.callbacks {
            callback(event);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Returns `true` if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_emit_reaches_all_subscribers_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut observers = Observers::<u32>::new();

        let first = Arc::clone(&log);
        observers.subscribe(move |v| first.lock().unwrap().push(("first", *v)));
        let second = Arc::clone(&log);
        observers.subscribe(move |v| second.lock().unwrap().push(("second", *v)));

        observers.emit(&7);
        assert_eq!(*log.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let count = Arc::new(Mutex::new(0));
        let mut observers = Observers::<()>::new();
        let counter = Arc::clone(&count);
        let id = observers.subscribe(move |_| *counter.lock().unwrap() += 1);

        observers.emit(&());
        assert!(observers.unsubscribe(id));
        observers.emit(&());

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_unsubscribe_unknown_id_reports_false() {
        let mut observers = Observers::<()>::new();
        let id = observers.subscribe(|_| {});
        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
    }
}
