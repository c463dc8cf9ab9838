//! Server-authoritative entity state and the fixed-rate tick schedule.
//!
//! [`AuthoritativeWorld`] wraps a Bevy ECS [`World`]. Every entity carries a
//! [`NetworkId`], an [`EntityHealth`], a [`LifeStateMachine`] and a
//! [`StatusEffects`] set. All mutations go through this type so that health
//! changes, deaths, life-state transitions and effect hooks are reported to
//! subscribers as [`GameEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;

use bevy_ecs::prelude::*;

use crate::effect_definition::{EffectHook, StatusEffectDefinition};
use crate::health::{DamageOutcome, EntityHealth, HealthChange, HealthError};
use crate::life_state::{LifeState, LifeStateError, LifeStateMachine};
use crate::observer::{Observers, SubscriberId};
use crate::replication::{NetworkId, StateUpdate};
use crate::status_effect::{ApplyOutcome, EffectEvent, StatusEffects, TickPolicy};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default server tick rate in Hz.
pub const DEFAULT_TICK_RATE: u32 = 60;

// ---------------------------------------------------------------------------
// GameEvent
// ---------------------------------------------------------------------------

/// Fire-and-forget notification for visuals, UI and logging collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Health moved (damage or healing).
    DamageTaken {
        /// Affected entity.
        entity: NetworkId,
        /// Health before.
        previous: f32,
        /// Health after.
        current: f32,
    },
    /// Health reached zero.
    Died {
        /// Affected entity.
        entity: NetworkId,
    },
    /// Life state changed.
    LifeStateChanged {
        /// Affected entity.
        entity: NetworkId,
        /// Previous state.
        from: LifeState,
        /// New state.
        to: LifeState,
    },
    /// Replicated health arrived on an observer.
    HealthChanged {
        /// Affected entity.
        entity: NetworkId,
        /// Mirrored value.
        current: f32,
    },
    /// A status effect started (or retriggered).
    EffectStarted {
        /// Affected entity.
        entity: NetworkId,
        /// Effect name.
        effect: String,
    },
    /// A status effect ticked.
    EffectTicked {
        /// Affected entity.
        entity: NetworkId,
        /// Effect name.
        effect: String,
    },
    /// A status effect ran out.
    EffectEnded {
        /// Affected entity.
        entity: NetworkId,
        /// Effect name.
        effect: String,
    },
    /// A status effect was cancelled.
    EffectCancelled {
        /// Affected entity.
        entity: NetworkId,
        /// Effect name.
        effect: String,
    },
}

impl GameEvent {
    /// Entity the event is about.
    pub fn entity(&self) -> NetworkId {
        match self {
            Self::DamageTaken { entity, .. }
            | Self::Died { entity }
            | Self::LifeStateChanged { entity, .. }
            | Self::HealthChanged { entity, .. }
            | Self::EffectStarted { entity, .. }
            | Self::EffectTicked { entity, .. }
            | Self::EffectEnded { entity, .. }
            | Self::EffectCancelled { entity, .. } => *entity,
        }
    }

    fn from_effect(entity: NetworkId, event: &EffectEvent) -> Self {
        let effect = event.definition.name.clone();
        match event.hook {
            EffectHook::Start => Self::EffectStarted { entity, effect },
            EffectHook::Tick => Self::EffectTicked { entity, effect },
            EffectHook::End => Self::EffectEnded { entity, effect },
            EffectHook::Cancel => Self::EffectCancelled { entity, effect },
        }
    }
}

// ---------------------------------------------------------------------------
// WorldError
// ---------------------------------------------------------------------------

/// Failed world operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    /// No entity carries this id.
    #[error("unknown {0}")]
    UnknownEntity(NetworkId),

    /// No status effect definition has this name.
    #[error("unknown status effect '{0}'")]
    UnknownEffect(String),

    /// A life-state write was refused.
    #[error(transparent)]
    LifeState(#[from] LifeStateError),

    /// A health write was refused.
    #[error(transparent)]
    Health(#[from] HealthError),

    /// `Alive` was requested for an entity at zero health.
    #[error("{0} has no health left and must be revived")]
    NoHealth(NetworkId),
}

// ---------------------------------------------------------------------------
// EntitySpec
// ---------------------------------------------------------------------------

/// Initial configuration of a spawned entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitySpec {
    /// Max (and initial) health.
    pub max_health: f32,
    /// Starts invulnerable.
    pub invulnerable: bool,
    /// Accepts healing.
    pub healable: bool,
    /// Goes through `Incapacitated` on death.
    pub downable: bool,
    /// Health at or below this counts as zero.
    pub zero_epsilon: f32,
}

impl Default for EntitySpec {
    fn default() -> Self {
        Self {
            max_health: 100.0,
            invulnerable: false,
            healable: true,
            downable: false,
            zero_epsilon: crate::health::DEFAULT_ZERO_EPSILON,
        }
    }
}

impl EntitySpec {
    /// Default spec with the given max health.
    pub fn with_max_health(max_health: f32) -> Self {
        Self {
            max_health,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// AuthoritativeWorld
// ---------------------------------------------------------------------------

/// The server's canonical entity state.
pub struct AuthoritativeWorld {
    world: World,
    entities: HashMap<NetworkId, Entity>,
    next_network_id: u64,
    tick: u64,
    policy: TickPolicy,
    observers: Observers<GameEvent>,
}

impl AuthoritativeWorld {
    /// Creates an empty world with coarse effect ticks.
    pub fn new() -> Self {
        Self::with_policy(TickPolicy::Coarse)
    }

    /// Creates an empty world using `policy` for every entity's effects.
    pub fn with_policy(policy: TickPolicy) -> Self {
        Self {
            world: World::new(),
            entities: HashMap::new(),
            next_network_id: 0,
            tick: 0,
            policy,
            observers: Observers::new(),
        }
    }

    /// Current tick number.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advances the tick counter by one.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Spawns an entity at full health.
    pub fn spawn_entity(&mut self, spec: EntitySpec) -> Result<NetworkId, HealthError> {
        let mut health = EntityHealth::new(spec.max_health)?.with_zero_epsilon(spec.zero_epsilon);
        health.set_invulnerable(spec.invulnerable);
        health.set_healable(spec.healable);

        let id = NetworkId(self.next_network_id);
        self.next_network_id += 1;
        let entity = self
            .world
            .spawn((
                id,
                health,
                LifeStateMachine::new(spec.downable),
                StatusEffects::new(self.policy),
            ))
            .id();
        self.entities.insert(id, entity);
        tracing::debug!("Spawned {id} with {} max health", spec.max_health);
        Ok(id)
    }

    /// Removes an entity. Returns `false` if it was unknown.
    pub fn despawn_entity(&mut self, id: NetworkId) -> bool {
        match self.entities.remove(&id) {
            Some(entity) => self.world.despawn(entity),
            None => false,
        }
    }

    fn entity(&self, id: NetworkId) -> Result<Entity, WorldError> {
        self.entities
            .get(&id)
            .copied()
            .ok_or(WorldError::UnknownEntity(id))
    }

    /// Applies a signed health delta to `id`. A lethal change moves the
    /// entity into its death state.
    pub fn apply_health_change(&mut self, id: NetworkId, delta: f32) -> Result<DamageOutcome, WorldError> {
        let entity = self.entity(id)?;
        let mut query = self
            .world
            .query::<(&mut EntityHealth, &mut LifeStateMachine)>();
        let (mut health, mut life) = query
            .get_mut(&mut self.world, entity)
            .map_err(|_| WorldError::UnknownEntity(id))?;

        let change = health.apply_change(delta);
        let mut events = Vec::new();
        record_health(id, change, &mut life, &mut events);
        self.emit(&events);
        Ok(change.outcome)
    }

    /// Applies a status effect to `id`.
    pub fn apply_effect(
        &mut self,
        id: NetworkId,
        definition: &Arc<StatusEffectDefinition>,
    ) -> Result<ApplyOutcome, WorldError> {
        self.with_effects(id, |effects, health, events| effects.apply(definition, health, events))
    }

    /// Cancels every live instance of `name` on `id`. Returns how many were
    /// cancelled.
    pub fn cancel_effect(&mut self, id: NetworkId, name: &str) -> Result<usize, WorldError> {
        self.with_effects(id, |effects, health, events| effects.cancel(name, health, events))
    }

    fn with_effects<R>(
        &mut self,
        id: NetworkId,
        op: impl FnOnce(&mut StatusEffects, &mut EntityHealth, &mut Vec<EffectEvent>) -> R,
    ) -> Result<R, WorldError> {
        let entity = self.entity(id)?;
        let mut query = self
            .world
            .query::<(&mut EntityHealth, &mut LifeStateMachine, &mut StatusEffects)>();
        let (mut health, mut life, mut effects) = query
            .get_mut(&mut self.world, entity)
            .map_err(|_| WorldError::UnknownEntity(id))?;

        let mut effect_events = Vec::new();
        let result = op(&mut *effects, &mut *health, &mut effect_events);
        let mut events = Vec::new();
        translate_effect_events(id, &effect_events, &mut life, &mut events);
        self.emit(&events);
        Ok(result)
    }

    /// Advances the effects of every entity holding at least one instance.
    pub fn update_effects(&mut self, dt: f32) {
        let mut query = self.world.query::<(
            &NetworkId,
            &mut EntityHealth,
            &mut LifeStateMachine,
            &mut StatusEffects,
        )>();
        let mut events = Vec::new();
        let mut effect_events = Vec::new();
        for (&id, mut health, mut life, mut effects) in query.iter_mut(&mut self.world) {
            if effects.is_empty() {
                continue;
            }
            effect_events.clear();
            effects.update(dt, &mut health, &mut effect_events);
            translate_effect_events(id, &effect_events, &mut life, &mut events);
        }
        self.emit(&events);
    }

    /// Writes a life state from outside the health path, e.g. finishing a
    /// downed entity. Moving back to `Alive` at zero health is refused; use
    /// [`revive`](Self::revive).
    pub fn set_life_state(&mut self, id: NetworkId, to: LifeState) -> Result<(), WorldError> {
        let entity = self.entity(id)?;
        let dead = self
            .world
            .get::<EntityHealth>(entity)
            .is_some_and(EntityHealth::is_dead);
        if to == LifeState::Alive && dead {
            return Err(WorldError::NoHealth(id));
        }
        let transition = match self.world.get_mut::<LifeStateMachine>(entity) {
            Some(mut life) => life.transition(to)?,
            None => return Err(WorldError::UnknownEntity(id)),
        };
        if let Some(t) = transition {
            self.emit(&[GameEvent::LifeStateChanged {
                entity: id,
                from: t.from,
                to: t.to,
            }]);
        }
        Ok(())
    }

    /// Brings an `Incapacitated` entity back to `Alive` with `health`.
    pub fn revive(&mut self, id: NetworkId, health: f32) -> Result<(), WorldError> {
        let entity = self.entity(id)?;
        let mut query = self
            .world
            .query::<(&mut EntityHealth, &mut LifeStateMachine)>();
        let (mut entity_health, mut life) = query
            .get_mut(&mut self.world, entity)
            .map_err(|_| WorldError::UnknownEntity(id))?;

        let from = life.state();
        if from != LifeState::Incapacitated {
            return Err(LifeStateError::InvalidTransition {
                from,
                to: LifeState::Alive,
            }
            .into());
        }
        let change = entity_health.revive(health)?;
        let transition = life.transition(LifeState::Alive)?;

        let mut events = Vec::new();
        if change.changed() {
            events.push(GameEvent::DamageTaken {
                entity: id,
                previous: change.previous,
                current: change.current,
            });
        }
        if let Some(t) = transition {
            events.push(GameEvent::LifeStateChanged {
                entity: id,
                from: t.from,
                to: t.to,
            });
        }
        tracing::info!("{id} revived at {} health", change.current);
        self.emit(&events);
        Ok(())
    }

    /// Drains dirty replicated values into updates, ordered by entity.
    pub fn collect_updates(&mut self) -> Vec<StateUpdate> {
        let mut query = self
            .world
            .query::<(&NetworkId, &mut EntityHealth, &mut LifeStateMachine)>();
        let mut updates: Vec<StateUpdate> = query
            .iter_mut(&mut self.world)
            .filter_map(|(&entity, mut health, mut life)| {
                let update = StateUpdate {
                    entity,
                    health: health.take_dirty().then(|| health.current()),
                    life_state: life.take_dirty().then(|| life.state()),
                };
                (!update.is_empty()).then_some(update)
            })
            .collect();
        updates.sort_by_key(|u| u.entity);
        updates
    }

    /// Current health of `id`.
    pub fn health(&self, id: NetworkId) -> Option<&EntityHealth> {
        self.world.get::<EntityHealth>(*self.entities.get(&id)?)
    }

    /// Life state of `id`.
    pub fn life_state(&self, id: NetworkId) -> Option<LifeState> {
        self.world
            .get::<LifeStateMachine>(*self.entities.get(&id)?)
            .map(LifeStateMachine::state)
    }

    /// Status effects of `id`.
    pub fn effects(&self, id: NetworkId) -> Option<&StatusEffects> {
        self.world.get::<StatusEffects>(*self.entities.get(&id)?)
    }

    /// Returns `true` if `id` is a live entity.
    pub fn contains(&self, id: NetworkId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Registers a [`GameEvent`] listener.
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

    fn emit(&mut self, events: &[GameEvent]) {
        for event in events {
            self.observers.emit(event);
        }
    }
}

impl Default for AuthoritativeWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuthoritativeWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthoritativeWorld")
            .field("entities", &self.entities.len())
            .field("tick", &self.tick)
            .field("policy", &self.policy)
            .finish()
    }
}

fn record_health(
    entity: NetworkId,
    change: HealthChange,
    life: &mut LifeStateMachine,
    events: &mut Vec<GameEvent>,
) {
    if change.changed() {
        events.push(GameEvent::DamageTaken {
            entity,
            previous: change.previous,
            current: change.current,
        });
    }
    if change.outcome != DamageOutcome::Died {
        return;
    }
    tracing::info!("{entity} died");
    events.push(GameEvent::Died { entity });
    match life.transition(life.death_state()) {
        Ok(Some(t)) => events.push(GameEvent::LifeStateChanged {
            entity,
            from: t.from,
            to: t.to,
        }),
        Ok(None) => {}
        Err(e) => tracing::warn!("{entity} could not enter its death state: {e}"),
    }
}

fn translate_effect_events(
    entity: NetworkId,
    effect_events: &[EffectEvent],
    life: &mut LifeStateMachine,
    events: &mut Vec<GameEvent>,
) {
    for event in effect_events {
        events.push(GameEvent::from_effect(entity, event));
        if let Some(change) = event.health {
            record_health(entity, change, life, events);
        }
    }
}

// ---------------------------------------------------------------------------
// ServerTickSchedule
// ---------------------------------------------------------------------------

/// Most ticks one [`ServerTickSchedule::accumulate`] call may release. A
/// longer stall drops the backlog instead of simulating it all at once.
pub const MAX_TICKS_PER_FRAME: u32 = 8;

/// Rejected tick rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TickRateError {
    /// The rate must be at least 1 Hz.
    #[error("tick rate must be at least 1 Hz")]
    Zero,
}

/// Fixed-rate accumulator feeding effect updates and replication.
///
/// Wall-clock time is banked and released in whole simulation steps. After
/// a stall longer than [`MAX_TICKS_PER_FRAME`] steps the excess time is
/// dropped so the server resumes at the current moment.
#[derive(Debug, Clone)]
pub struct ServerTickSchedule {
    banked: f64,
    step: f64,
    total_ticks: u64,
    dropped_ticks: u64,
}

impl ServerTickSchedule {
    /// Schedule at [`DEFAULT_TICK_RATE`].
    pub fn new() -> Self {
        Self::from_step(1.0 / f64::from(DEFAULT_TICK_RATE))
    }

    /// Schedule at `hz` simulation steps per second.
    pub fn with_tick_rate(hz: u32) -> Result<Self, TickRateError> {
        if hz == 0 {
            return Err(TickRateError::Zero);
        }
        Ok(Self::from_step(1.0 / f64::from(hz)))
    }

    fn from_step(step: f64) -> Self {
        Self {
            banked: 0.0,
            step,
            total_ticks: 0,
            dropped_ticks: 0,
        }
    }

    /// Banks `dt_secs` of elapsed time and returns how many steps to run.
    /// Negative or NaN deltas bank nothing.
    pub fn accumulate(&mut self, dt_secs: f64) -> u32 {
        if dt_secs > 0.0 {
            self.banked += dt_secs;
        }
        let whole = (self.banked / self.step).floor();
        self.banked -= whole * self.step;

        let whole = whole as u64;
        let due = whole.min(u64::from(MAX_TICKS_PER_FRAME));
        if whole > due {
            let dropped = whole - due;
            self.dropped_ticks += dropped;
            tracing::warn!("Server fell {dropped} ticks behind, skipping them");
        }
        self.total_ticks += due;
        due as u32
    }

    /// Steps skipped after stalls.
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks
    }

    /// Ticks produced since creation.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Seconds per tick.
    pub fn tick_duration_secs(&self) -> f64 {
        self.step
    }
}

impl Default for ServerTickSchedule {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
