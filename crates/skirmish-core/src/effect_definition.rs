//! Status effect definitions and the catalog they are looked up in.
//!
//! A definition is immutable configuration. The behaviour of each effect
//! kind lives in [`run_hook`], the single place where effects touch an
//! entity, always through [`EntityHealth`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::health::{EntityHealth, HealthChange};

/// What happens when a definition is applied to a target that already
/// holds a live instance of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackingType {
    /// Restart the remaining lifetime; `OnStart` is not fired again.
    ResetDuration,
    /// Fire `OnStart` again and restart every timer.
    Retrigger,
    /// Drop the new application.
    Ignore,
    /// Add an independent concurrent instance, up to `max_stacks`.
    Stack,
}

/// Broad grouping of effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectCategory {
    /// Beneficial.
    Buff,
    /// Harmful.
    Debuff,
    /// Restricts what the target may do.
    CrowdControl,
}

/// Effect behaviour, one variant per kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EffectKind {
    /// Deals `amount` damage on every tick.
    DamageOverTime {
        /// Damage per tick.
        amount: f32,
    },
    /// Restores `amount` health on every tick.
    HealOverTime {
        /// Healing per tick.
        amount: f32,
    },
    /// Deals `amount` damage when started.
    InstantDamage {
        /// Damage on start.
        amount: f32,
    },
    /// Target ignores damage while the effect runs.
    Invulnerability,
    /// Marker read by gameplay code; no health side effects.
    Stun,
}

/// The four notifications an instance goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectHook {
    /// Applied (or retriggered).
    Start,
    /// Retrigger delay elapsed.
    Tick,
    /// Lifetime elapsed.
    End,
    /// Cancelled before its lifetime elapsed.
    Cancel,
}

/// Immutable status effect configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffectDefinition {
    /// Unique name; two applications are "the same effect" iff names match.
    pub name: String,
    /// Seconds an instance stays active.
    pub lifetime: f32,
    /// Seconds between ticks; zero or less ticks exactly once.
    #[serde(default)]
    pub retrigger_delay: f32,
    /// Reapplication policy.
    pub stacking: StackingType,
    /// Grouping.
    pub category: EffectCategory,
    /// Behaviour.
    pub kind: EffectKind,
    /// Instance cap for [`StackingType::Stack`] (0 = unlimited).
    #[serde(default)]
    pub max_stacks: u32,
}

/// Runs the behaviour of `kind` for `hook` against `target`. `source`
/// identifies the instance firing the hook. Returns the health change if
/// the hook touched health.
pub fn run_hook(
    kind: &EffectKind,
    hook: EffectHook,
    source: u64,
    target: &mut EntityHealth,
) -> Option<HealthChange> {
    match (kind, hook) {
        (EffectKind::DamageOverTime { amount }, EffectHook::Tick)
        | (EffectKind::InstantDamage { amount }, EffectHook::Start) => {
            Some(target.apply_change(-amount.abs()))
        }
        (EffectKind::HealOverTime { amount }, EffectHook::Tick) => {
            Some(target.apply_change(amount.abs()))
        }
        (EffectKind::Invulnerability, EffectHook::Start) => {
            target.grant_invulnerability(source);
            None
        }
        (EffectKind::Invulnerability, EffectHook::End | EffectHook::Cancel) => {
            target.release_invulnerability(source);
            None
        }
        _ => None,
    }
}

/// Invalid catalog content.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EffectCatalogError {
    /// Two definitions share a name.
    #[error("duplicate status effect '{0}'")]
    Duplicate(String),

    /// Lifetime must be finite and non-negative.
    #[error("status effect '{name}' has invalid lifetime {lifetime}")]
    InvalidLifetime {
        /// Offending definition.
        name: String,
        /// Configured lifetime.
        lifetime: f32,
    },

    /// Retrigger delay must be finite.
    #[error("status effect '{name}' has invalid retrigger delay {delay}")]
    InvalidRetriggerDelay {
        /// Offending definition.
        name: String,
        /// Configured delay.
        delay: f32,
    },
}

/// Name-indexed set of shared definitions.
#[derive(Debug, Clone, Default)]
pub struct StatusEffectCatalog {
    definitions: Vec<Arc<StatusEffectDefinition>>,
    by_name: HashMap<String, usize>,
}

impl StatusEffectCatalog {
    /// Validates and indexes `definitions`.
    pub fn from_definitions<I>(definitions: I) -> Result<Self, EffectCatalogError>
    where
        I: IntoIterator<Item = StatusEffectDefinition>,
    {
        let mut catalog = Self::default();
        for definition in definitions {
            if !definition.lifetime.is_finite() || definition.lifetime < 0.0 {
                return Err(EffectCatalogError::InvalidLifetime {
                    lifetime: definition.lifetime,
                    name: definition.name,
                });
            }
            if !definition.retrigger_delay.is_finite() {
                return Err(EffectCatalogError::InvalidRetriggerDelay {
                    delay: definition.retrigger_delay,
                    name: definition.name,
                });
            }
            if catalog.by_name.contains_key(&definition.name) {
                return Err(EffectCatalogError::Duplicate(definition.name));
            }
            catalog
                .by_name
                .insert(definition.name.clone(), catalog.definitions.len());
            catalog.definitions.push(Arc::new(definition));
        }
        Ok(catalog)
    }

    /// Looks up a definition by name.
    pub fn get(&self, name: &str) -> Option<&Arc<StatusEffectDefinition>> {
        self.by_name.get(name).map(|&i| &self.definitions[i])
    }

    /// Iterates definitions in content order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<StatusEffectDefinition>> {
        self.definitions.iter()
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
