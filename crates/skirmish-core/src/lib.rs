//! Server-authoritative game state: action ids, entity health and life
//! state, status effects, client admission, deferred update dispatch, and
//! the replication of all of it to passive observers.

pub mod actions;
pub mod authority;
pub mod content;
pub mod context;
pub mod effect_definition;
pub mod health;
pub mod life_state;
pub mod messages;
pub mod observer;
pub mod registry;
pub mod replicated;
pub mod replication;
pub mod scheduler;
pub mod session;
pub mod status_effect;


pub use actions::{
    ActionCategory, ActionDefinition, ActionId, ActionRegistry, ActionRegistryError,
    WellKnownAction,
};
pub use authority::{
    AuthoritativeWorld, EntitySpec, GameEvent, ServerTickSchedule, TickRateError, WorldError,
};
pub use content::{ContentError, GameContent};
pub use context::{ContextError, GameContext, PlayerHandle};
pub use effect_definition::{
    EffectCategory, EffectHook, EffectKind, StackingType, StatusEffectCatalog,
    StatusEffectDefinition,
};
pub use health::{DamageOutcome, EntityHealth, HealthChange, HealthError};
pub use life_state::{LifeState, LifeStateError, LifeStateMachine};
pub use messages::{ClientMessage, ServerMessage, WireError};
pub use observer::{Observers, SubscriberId};
pub use registry::{ObservableRegistry, RegistryEvent, RegistryItem};
pub use replicated::{Authority, ReplicationError, Replicated};
pub use replication::{NetworkId, ObserverWorld, StateUpdate};
pub use scheduler::{SchedulerError, SchedulerHandle, SubscriptionHandle, UpdateScheduler};
pub use session::{AdmissionResult, ClientId, ClientRecord, LoadoutSelection, SessionError, SessionGate};
pub use status_effect::{ApplyOutcome, StatusEffects, TickPolicy};
