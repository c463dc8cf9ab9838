//! Observable registry: an insertion-ordered set with change notifications.
//!
//! Used to track live items (players, for instance) without handing out
//! cross-references to them. Subscribers learn about additions and removals
//! synchronously, from inside `add` and `remove`.

use crate::observer::{Observers, SubscriberId};

/// Items stored in an [`ObservableRegistry`] expose an identity key.
pub trait RegistryItem {
    /// Identity used for duplicate detection and removal.
    type Key: PartialEq;

    /// Returns the identity of this item.
    fn key(&self) -> Self::Key;
}

/// Change notification emitted by an [`ObservableRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent<T> {
    /// The item was inserted.
    ItemAdded(T),
    /// The item was removed.
    ItemRemoved(T),
}

/// Insertion-ordered collection with no duplicate keys.
///
/// Queries are linear scans; the registry is bounded by the number of
/// concurrent sessions.
#[derive(Debug)]
pub struct ObservableRegistry<T: RegistryItem + Clone> {
    items: Vec<T>,
    observers: Observers<RegistryEvent<T>>,
}

impl<T: RegistryItem + Clone> ObservableRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            observers: Observers::new(),
        }
    }

    /// Inserts `item` unless an item with the same key is already present.
    /// Returns `true` (and notifies subscribers) if it was inserted.
    pub fn add(&mut self, item: T) -> bool {
        let key = item.key();
        if self.items.iter().any(|existing| existing.key() == key) {
            return false;
        }
        self.items.push(item.clone());
        self.observers.emit(&RegistryEvent::ItemAdded(item));
        true
    }

    /// Removes the item with `key`. Subscribers are notified only if an
    /// item was actually present.
    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        let index = self.items.iter().position(|item| item.key() == *key)?;
        let removed = self.items.remove(index);
        self.observers
            .emit(&RegistryEvent::ItemRemoved(removed.clone()));
        Some(removed)
    }

    /// Returns `true` if an item with `key` is present.
    pub fn contains(&self, key: &T::Key) -> bool {
        self.items.iter().any(|item| item.key() == *key)
    }

    /// Returns the item with `key`.
    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.items.iter().find(|item| item.key() == *key)
    }

    /// Returns the first item matching `predicate`.
    pub fn find<P>(&self, mut predicate: P) -> Option<&T>
    where
        P: FnMut(&T) -> bool,
    {
        self.items.iter().find(|item| predicate(item))
    }

    /// Iterates items in insertion order. Callers must not depend on it.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the registry holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Registers a change listener.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriberId
    where
        F: FnMut(&RegistryEvent<T>) + Send + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Removes a change listener.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.observers.unsubscribe(id)
    }
}

impl<T: RegistryItem + Clone> Default for ObservableRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    struct Tracked {
        id: u64,
        label: &'static str,
    }

    impl RegistryItem for Tracked {
        type Key = u64;

        fn key(&self) -> u64 {
            self.id
        }
    }

    fn recorded(
        registry: &mut ObservableRegistry<Tracked>,
    ) -> Arc<Mutex<Vec<RegistryEvent<Tracked>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        registry.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        events
    }

    #[test]
    fn test_add_emits_once_per_new_key() {
        let mut registry = ObservableRegistry::new();
        let events = recorded(&mut registry);

        assert!(registry.add(Tracked { id: 1, label: "a" }));
        assert!(!registry.add(Tracked { id: 1, label: "again" }));
        assert!(registry.add(Tracked { id: 2, label: "b" }));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&1).unwrap().label, "a");
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_remove_emits_only_when_present() {
        let mut registry = ObservableRegistry::new();
        registry.add(Tracked { id: 1, label: "a" });
        let events = recorded(&mut registry);

        assert!(registry.remove(&9).is_none());
        assert!(events.lock().unwrap().is_empty());

        let removed = registry.remove(&1).unwrap();
        assert_eq!(removed.label, "a");
        assert_eq!(
            *events.lock().unwrap(),
            vec![RegistryEvent::ItemRemoved(Tracked { id: 1, label: "a" })]
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_and_iteration_order() {
        let mut registry = ObservableRegistry::new();
        registry.add(Tracked { id: 3, label: "c" });
        registry.add(Tracked { id: 1, label: "a" });

        let labels: Vec<_> = registry.iter().map(|t| t.label).collect();
        assert_eq!(labels, vec!["c", "a"]);
        assert_eq!(registry.find(|t| t.label == "a").map(|t| t.id), Some(1));
        assert!(registry.contains(&3));
        assert!(!registry.contains(&2));
    }

    #[test]
    fn test_unsubscribed_listener_is_silent() {
        let mut registry = ObservableRegistry::new();
        let events = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&events);
        let id = registry.subscribe(move |_| *sink.lock().unwrap() += 1);

        registry.add(Tracked { id: 1, label: "a" });
        assert!(registry.unsubscribe(id));
        registry.add(Tracked { id: 2, label: "b" });

        assert_eq!(*events.lock().unwrap(), 1);
    }
}
