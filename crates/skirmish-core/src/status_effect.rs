//! Per-entity status effect instances and their timing.
//!
//! Each instance moves Pending -> Active -> Ending -> Removed. `OnStart`
//! fires when the instance is applied; the first update activates it;
//! `OnTick` fires every `retrigger_delay` seconds (once when the delay is
//! zero or less); `OnEnd` fires when the lifetime runs out. Cancelling skips
//! straight to Removed and fires `OnCancel` instead of `OnEnd`.
//!
//! Under [`TickPolicy::Coarse`] at most one tick fires per update, however
//! many periods elapsed; [`TickPolicy::CatchUp`] fires one per period.

use std::sync::Arc;

use bevy_ecs::prelude::*;

use crate::effect_definition::{
    EffectCategory, EffectHook, StackingType, StatusEffectDefinition, run_hook,
};
use crate::health::{EntityHealth, HealthChange};

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

/// Identifier of an instance, unique within one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectInstanceId(pub u64);

/// Lifecycle of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    /// Applied, `OnStart` fired, not yet updated.
    Pending,
    /// Counting down and ticking.
    Active,
    /// Lifetime elapsed, `OnEnd` firing.
    Ending,
    /// Finished or cancelled.
    Removed,
}

/// Runtime application of a definition to one entity.
#[derive(Debug, Clone)]
pub struct StatusEffectInstance {
    id: EffectInstanceId,
    definition: Arc<StatusEffectDefinition>,
    remaining: f32,
    since_last_tick: f32,
    state: InstanceState,
    single_tick_fired: bool,
}

impl StatusEffectInstance {
    fn new(id: EffectInstanceId, definition: Arc<StatusEffectDefinition>) -> Self {
        Self {
            id,
            remaining: definition.lifetime,
            definition,
            since_last_tick: 0.0,
            state: InstanceState::Pending,
            single_tick_fired: false,
        }
    }

    /// Instance identifier.
    pub fn id(&self) -> EffectInstanceId {
        self.id
    }

    /// Definition this instance runs.
    pub fn definition(&self) -> &Arc<StatusEffectDefinition> {
        &self.definition
    }

    /// Seconds of lifetime left.
    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    /// Seconds accumulated toward the next tick.
    pub fn since_last_tick(&self) -> f32 {
        self.since_last_tick
    }

    /// Lifecycle state.
    pub fn state(&self) -> InstanceState {
        self.state
    }

    fn is_live(&self) -> bool {
        matches!(self.state, InstanceState::Pending | InstanceState::Active)
    }

    fn restart_timers(&mut self) {
        self.remaining = self.definition.lifetime;
        self.since_last_tick = 0.0;
        self.single_tick_fired = false;
        self.state = InstanceState::Pending;
    }

    /// Number of ticks due after the clock advanced.
    fn due_ticks(&mut self, policy: TickPolicy) -> u32 {
        let delay = self.definition.retrigger_delay;
        if delay <= 0.0 {
            return if std::mem::replace(&mut self.single_tick_fired, true) {
                0
            } else {
                1
            };
        }
        if self.since_last_tick < delay {
            return 0;
        }
        match policy {
            TickPolicy::Coarse => {
                // Whole periods beyond the first are dropped; the phase is kept.
                self.since_last_tick = (self.since_last_tick - delay) % delay;
                1
            }
            TickPolicy::CatchUp => {
                let periods = (self.since_last_tick / delay).floor();
                self.since_last_tick -= periods * delay;
                periods as u32
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes and notifications
// ---------------------------------------------------------------------------

/// How an application was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyOutcome {
    /// A first instance was created.
    Started,
    /// The live instance's lifetime restarted.
    DurationReset,
    /// The live instance restarted and fired `OnStart` again.
    Retriggered,
    /// The application was dropped.
    Ignored,
    /// An additional concurrent instance was created.
    Stacked,
}

/// Tick catch-up behaviour after long frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TickPolicy {
    /// At most one tick per update.
    #[default]
    Coarse,
    /// One tick per elapsed period.
    CatchUp,
}

/// A hook that fired on one instance.
#[derive(Debug, Clone)]
pub struct EffectEvent {
    /// Which hook.
    pub hook: EffectHook,
    /// Which instance.
    pub instance: EffectInstanceId,
    /// Definition of the instance.
    pub definition: Arc<StatusEffectDefinition>,
    /// Health change performed by the hook, if any.
    pub health: Option<HealthChange>,
}

// ---------------------------------------------------------------------------
// StatusEffects (ECS component)
// ---------------------------------------------------------------------------

/// The live status effects of one entity.
#[derive(Component, Debug, Default)]
pub struct StatusEffects {
    instances: Vec<StatusEffectInstance>,
    next_id: u64,
    policy: TickPolicy,
}

impl StatusEffects {
    /// Creates an empty set using `policy` for ticks.
    pub fn new(policy: TickPolicy) -> Self {
        Self {
            instances: Vec::new(),
            next_id: 0,
            policy,
        }
    }

    /// Applies `definition`, resolving reapplication through its stacking
    /// type. Hooks run against `target`; fired hooks are appended to `events`.
    pub fn apply(
        &mut self,
        definition: &Arc<StatusEffectDefinition>,
        target: &mut EntityHealth,
        events: &mut Vec<EffectEvent>,
    ) -> ApplyOutcome {
        let existing = self
            .instances
            .iter_mut()
            .find(|i| i.is_live() && i.definition.name == definition.name);

        let Some(existing) = existing else {
            self.start(definition, target, events);
            return ApplyOutcome::Started;
        };

        match definition.stacking {
            StackingType::ResetDuration => {
                existing.remaining = existing.definition.lifetime;
                ApplyOutcome::DurationReset
            }
            StackingType::Retrigger => {
                existing.restart_timers();
                fire(existing, EffectHook::Start, target, events);
                ApplyOutcome::Retriggered
            }
            StackingType::Ignore => ApplyOutcome::Ignored,
            StackingType::Stack => {
                let live = self.count(&definition.name);
                if definition.max_stacks > 0 && live >= definition.max_stacks as usize {
                    return ApplyOutcome::Ignored;
                }
                self.start(definition, target, events);
                ApplyOutcome::Stacked
            }
        }
    }

    fn start(
        &mut self,
        definition: &Arc<StatusEffectDefinition>,
        target: &mut EntityHealth,
        events: &mut Vec<EffectEvent>,
    ) {
        let id = EffectInstanceId(self.next_id);
        self.next_id += 1;
        let mut instance = StatusEffectInstance::new(id, Arc::clone(definition));
        fire(&mut instance, EffectHook::Start, target, events);
        self.instances.push(instance);
    }

    /// Advances every instance by `dt` seconds.
    pub fn update(&mut self, dt: f32, target: &mut EntityHealth, events: &mut Vec<EffectEvent>) {
        let policy = self.policy;
        for instance in &mut self.instances {
            if instance.state == InstanceState::Pending {
                instance.state = InstanceState::Active;
            }
            if instance.state != InstanceState::Active {
                continue;
            }

            instance.remaining -= dt;
            instance.since_last_tick += dt;

            for _ in 0..instance.due_ticks(policy) {
                fire(instance, EffectHook::Tick, target, events);
            }

            if instance.remaining <= 0.0 {
                instance.state = InstanceState::Ending;
                fire(instance, EffectHook::End, target, events);
                instance.state = InstanceState::Removed;
            }
        }
        self.instances.retain(|i| i.state != InstanceState::Removed);
    }

    /// Cancels every live instance of the effect named `name`. Returns how
    /// many were cancelled.
    pub fn cancel(
        &mut self,
        name: &str,
        target: &mut EntityHealth,
        events: &mut Vec<EffectEvent>,
    ) -> usize {
        let mut cancelled = 0;
        for instance in &mut self.instances {
            if instance.is_live() && instance.definition.name == name {
                instance.state = InstanceState::Removed;
                fire(instance, EffectHook::Cancel, target, events);
                cancelled += 1;
            }
        }
        self.instances.retain(|i| i.state != InstanceState::Removed);
        cancelled
    }

    /// Number of live instances of `name`.
    pub fn count(&self, name: &str) -> usize {
        self.instances
            .iter()
            .filter(|i| i.is_live() && i.definition.name == name)
            .count()
    }

    /// Returns `true` if `name` has a live instance.
    pub fn has(&self, name: &str) -> bool {
        self.count(name) > 0
    }

    /// Returns `true` if any live instance belongs to `category`.
    pub fn has_category(&self, category: EffectCategory) -> bool {
        self.instances
            .iter()
            .any(|i| i.is_live() && i.definition.category == category)
    }

    /// Live instances.
    pub fn instances(&self) -> &[StatusEffectInstance] {
        &self.instances
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns `true` if no instance is live.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

fn fire(
    instance: &mut StatusEffectInstance,
    hook: EffectHook,
    target: &mut EntityHealth,
    events: &mut Vec<EffectEvent>,
) {
    let health = run_hook(&instance.definition.kind, hook, instance.id.0, target);
    match hook {
        EffectHook::Tick => tracing::trace!("{} tick ({:?})", instance.definition.name, instance.id),
        _ => tracing::debug!("{} {hook:?} ({:?})", instance.definition.name, instance.id),
    }
    events.push(EffectEvent {
        hook,
        instance: instance.id,
        definition: Arc::clone(&instance.definition),
        health,
    });
}
