//! Server-to-observer state replication.
//!
//! The authoritative world turns dirty [`Replicated`] variables into
//! [`StateUpdate`] messages. An [`ObserverWorld`] applies them to read-only
//! replicas and notifies its subscribers; it never computes health or life
//! state itself.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::authority::GameEvent;
use crate::life_state::LifeState;
use crate::observer::{Observers, SubscriberId};
use crate::replicated::Replicated;

// ---------------------------------------------------------------------------
// NetworkId
// ---------------------------------------------------------------------------

/// Identifier of a replicated entity, allocated by the server from a
/// monotonically increasing counter. Observers only ever see this id.
#[derive(Component, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NetworkId(pub u64);

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity {}", self.0)
    }
}

// ---------------------------------------------------------------------------
// StateUpdate
// ---------------------------------------------------------------------------

/// Changed replicated values of one entity. Absent fields did not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Entity the values belong to.
    pub entity: NetworkId,
    /// New current health.
    pub health: Option<f32>,
    /// New life state.
    pub life_state: Option<LifeState>,
}

impl StateUpdate {
    /// Returns `true` if the update carries no value.
    pub fn is_empty(&self) -> bool {
        self.health.is_none() && self.life_state.is_none()
    }
}

// ---------------------------------------------------------------------------
// ObserverWorld
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ObservedEntity {
    health: Replicated<f32>,
    life_state: Replicated<LifeState>,
}

/// Passive mirror of replicated entity state.
#[derive(Debug, Default)]
pub struct ObserverWorld {
    entities: HashMap<NetworkId, ObservedEntity>,
    observers: Observers<GameEvent>,
}

impl ObserverWorld {
    /// Creates an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one update and emits `HealthChanged` / `LifeStateChanged`
    /// for every value that changed. Returns the number of events emitted.
    pub fn apply(&mut self, update: &StateUpdate) -> usize {
        let entity = update.entity;
        let mut events = Vec::new();

        let mut created = false;
        let observed = self.entities.entry(entity).or_insert_with(|| {
            created = true;
            events.extend(update.health.map(|current| GameEvent::HealthChanged { entity, current }));
            // A new replica starts out `Alive`; only a different state is a change.
            events.extend(
                update
                    .life_state
                    .filter(|&to| to != LifeState::default())
                    .map(|to| GameEvent::LifeStateChanged {
                        entity,
                        from: LifeState::default(),
                        to,
                    }),
            );
            ObservedEntity {
                health: Replicated::observer(update.health.unwrap_or_default()),
                life_state: Replicated::observer(update.life_state.unwrap_or_default()),
            }
        });

        if !created {
            if let Some(current) = update.health
                && matches!(observed.health.apply_remote(current), Ok(true))
            {
                events.push(GameEvent::HealthChanged { entity, current });
            }
            if let Some(to) = update.life_state {
                let from = *observed.life_state.get();
                if matches!(observed.life_state.apply_remote(to), Ok(true)) {
                    events.push(GameEvent::LifeStateChanged { entity, from, to });
                }
            }
        }

        for event in &events {
            self.observers.emit(event);
        }
        events.len()
    }

    /// Applies a batch of updates in order.
    pub fn apply_all<'a>(&mut self, updates: impl IntoIterator<Item = &'a StateUpdate>) -> usize {
        updates.into_iter().map(|u| self.apply(u)).sum()
    }

    /// Forgets an entity. Returns `false` if it was unknown.
    pub fn remove(&mut self, entity: NetworkId) -> bool {
        self.entities.remove(&entity).is_some()
    }

    /// Mirrored health of `entity`.
    pub fn health(&self, entity: NetworkId) -> Option<f32> {
        self.entities.get(&entity).map(|e| *e.health.get())
    }

    /// Mirrored life state of `entity`.
    pub fn life_state(&self, entity: NetworkId) -> Option<LifeState> {
        self.entities.get(&entity).map(|e| *e.life_state.get())
    }

    /// Registers a listener for mirrored changes.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriberId
    where
        F: FnMut(&GameEvent) + Send + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Removes a listener.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Number of mirrored entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if nothing is mirrored.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn update(entity: u64, health: Option<f32>, life_state: Option<LifeState>) -> StateUpdate {
        StateUpdate {
            entity: NetworkId(entity),
            health,
            life_state,
        }
    }

    #[test]
    fn test_first_update_creates_replica() {
        let mut mirror = ObserverWorld::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        mirror.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        assert_eq!(mirror.apply(&update(3, Some(100.0), Some(LifeState::Alive))), 1);
        assert_eq!(mirror.health(NetworkId(3)), Some(100.0));
        assert_eq!(mirror.life_state(NetworkId(3)), Some(LifeState::Alive));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![GameEvent::HealthChanged { entity: NetworkId(3), current: 100.0 }]
        );
    }

    #[test]
    fn test_first_update_of_downed_entity_reports_state() {
        let mut mirror = ObserverWorld::new();
        assert_eq!(mirror.apply(&update(4, Some(0.0), Some(LifeState::Incapacitated))), 2);
        assert_eq!(mirror.apply(&update(4, None, Some(LifeState::Incapacitated))), 0);
        assert_eq!(mirror.life_state(NetworkId(4)), Some(LifeState::Incapacitated));
    }

    #[test]
    fn test_changes_notify_subscribers() {
        let mut mirror = ObserverWorld::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        mirror.apply(&update(1, Some(100.0), Some(LifeState::Alive)));
        mirror.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        mirror.apply(&update(1, Some(40.0), None));
        mirror.apply(&update(1, Some(40.0), None)); // unchanged, no event
        mirror.apply(&update(1, Some(0.0), Some(LifeState::Dead)));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                GameEvent::HealthChanged { entity: NetworkId(1), current: 40.0 },
                GameEvent::HealthChanged { entity: NetworkId(1), current: 0.0 },
                GameEvent::LifeStateChanged {
                    entity: NetworkId(1),
                    from: LifeState::Alive,
                    to: LifeState::Dead,
                },
            ]
        );
    }

    #[test]
    fn test_remove_and_unsubscribe() {
        let mut mirror = ObserverWorld::new();
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let id = mirror.subscribe(move |_| *counter.lock().unwrap() += 1);

        mirror.apply(&update(5, Some(10.0), None));
        assert!(mirror.unsubscribe(id));
        mirror.apply(&update(5, Some(5.0), None));
        assert_eq!(*count.lock().unwrap(), 1);

        assert!(mirror.remove(NetworkId(5)));
        assert!(!mirror.remove(NetworkId(5)));
        assert!(mirror.is_empty());
    }

    #[test]
    fn test_state_update_wire_format() {
        let original = update(9, Some(12.5), Some(LifeState::Incapacitated));
        let bytes = postcard::to_allocvec(&original).unwrap();
        let decoded: StateUpdate = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, original);
        assert!(!decoded.is_empty());

        let json = serde_json::to_string(&update(1, None, None)).unwrap();
        assert_eq!(json, r#"{"entity":1,"health":null,"life_state":null}"#);
    }
}
