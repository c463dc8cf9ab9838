//! Authoritative entity health.
//!
//! [`EntityHealth`] is the single write path for an entity's health. It only
//! exists on the server; observers see the resulting value through the
//! replicated `current` variable and never compute it themselves.

use std::collections::BTreeSet;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::replicated::Replicated;

/// Health values at or below this are snapped to zero.
pub const DEFAULT_ZERO_EPSILON: f32 = 1e-4;

/// Result of [`EntityHealth::apply_health_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageOutcome {
    /// The change went through (possibly leaving the value unchanged).
    Applied,
    /// Damage ignored because the entity is invulnerable.
    BlockedByInvulnerability,
    /// Healing ignored because the entity cannot be healed.
    BlockedNotHealable,
    /// Health reached zero from a positive value.
    Died,
}

/// Before/after record of one health change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthChange {
    /// What happened.
    pub outcome: DamageOutcome,
    /// Health before the change.
    pub previous: f32,
    /// Health after the change.
    pub current: f32,
}

impl HealthChange {
    /// Returns `true` if the stored value moved.
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Invalid health construction or revive.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum HealthError {
    /// Max health must be finite and positive.
    #[error("invalid max health {0}")]
    InvalidMaxHealth(f32),

    /// Revive health must be finite and above zero.
    #[error("invalid revive health {0}")]
    InvalidReviveHealth(f32),
}

/// Canonical health of one entity.
#[derive(Component, Debug, Clone)]
pub struct EntityHealth {
    current: Replicated<f32>,
    max: f32,
    invulnerable: bool,
    /// Effect instances currently holding the entity invulnerable.
    shields: BTreeSet<u64>,
    healable: bool,
    zero_epsilon: f32,
}

impl EntityHealth {
    /// Creates a healable, vulnerable entity at full health.
    pub fn new(max: f32) -> Result<Self, HealthError> {
        if !max.is_finite() || max <= 0.0 {
            return Err(HealthError::InvalidMaxHealth(max));
        }
        Ok(Self {
            current: Replicated::authoritative(max),
            max,
            invulnerable: false,
            shields: BTreeSet::new(),
            healable: true,
            zero_epsilon: DEFAULT_ZERO_EPSILON,
        })
    }

    /// Overrides the tolerance under which health counts as zero.
    pub fn with_zero_epsilon(mut self, epsilon: f32) -> Self {
        self.zero_epsilon = epsilon.max(0.0);
        self
    }

    /// Current health, in `[0, max]`.
    pub fn current(&self) -> f32 {
        *self.current.get()
    }

    /// Configured max health.
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Returns `true` once health has reached zero.
    pub fn is_dead(&self) -> bool {
        self.current() == 0.0
    }

    /// Returns `true` if damage is currently ignored, either from the base
    /// flag or from a live effect.
    pub fn is_invulnerable(&self) -> bool {
        self.invulnerable || !self.shields.is_empty()
    }

    /// Sets the base invulnerability flag. Effect-held invulnerability is
    /// not affected.
    pub fn set_invulnerable(&mut self, invulnerable: bool) {
        self.invulnerable = invulnerable;
    }

    /// Marks `source` as holding the entity invulnerable. Granting twice
    /// from the same source is a no-op.
    pub fn grant_invulnerability(&mut self, source: u64) {
        self.shields.insert(source);
    }

    /// Releases the hold of `source`. Damage is accepted again once no
    /// source remains and the base flag is clear.
    pub fn release_invulnerability(&mut self, source: u64) {
        self.shields.remove(&source);
    }

    /// Returns `true` if healing is accepted.
    pub fn is_healable(&self) -> bool {
        self.healable
    }

    /// Sets whether healing is accepted.
    pub fn set_healable(&mut self, healable: bool) {
        self.healable = healable;
    }

    /// Applies a signed health delta and reports the outcome.
    pub fn apply_health_change(&mut self, delta: f32) -> DamageOutcome {
        self.apply_change(delta).outcome
    }

    /// Applies a signed health delta and reports the before/after values.
    ///
    /// Positive deltas require the entity to be healable and alive; negative
    /// deltas are dropped while invulnerable. The crossing to zero is
    /// reported as [`DamageOutcome::Died`] exactly once.
    pub fn apply_change(&mut self, delta: f32) -> HealthChange {
        debug_assert!(!delta.is_nan(), "health delta must be a number");
        let previous = self.current();
        let unchanged = |outcome| HealthChange {
            outcome,
            previous,
            current: previous,
        };

        if delta.is_nan() || delta == 0.0 {
            return unchanged(DamageOutcome::Applied);
        }
        if delta > 0.0 && (!self.healable || self.is_dead()) {
            return unchanged(DamageOutcome::BlockedNotHealable);
        }
        if delta < 0.0 && self.invulnerable {
            return unchanged(DamageOutcome::BlockedByInvulnerability);
        }

        let mut next = (previous + delta).clamp(0.0, self.max);
        if next <= self.zero_epsilon {
            next = 0.0;
        }
        self.write(next);

        let outcome = if next == 0.0 && previous > 0.0 {
            DamageOutcome::Died
        } else {
            DamageOutcome::Applied
        };
        HealthChange {
            outcome,
            previous,
            current: next,
        }
    }

    /// Brings a dead entity back at `health` (clamped to max). Does nothing
    /// to a living entity.
    pub fn revive(&mut self, health: f32) -> Result<HealthChange, HealthError> {
        if !health.is_finite() || health <= self.zero_epsilon {
            return Err(HealthError::InvalidReviveHealth(health));
        }
        let previous = self.current();
        let current = if self.is_dead() {
            let restored = health.min(self.max);
            self.write(restored);
            restored
        } else {
            previous
        };
        Ok(HealthChange {
            outcome: DamageOutcome::Applied,
            previous,
            current,
        })
    }

    fn write(&mut self, value: f32) {
        let written = self.current.set(value);
        debug_assert!(written.is_ok(), "EntityHealth owns the authoritative copy");
        debug_assert!(
            (0.0..=self.max).contains(&self.current()),
            "health {} outside [0, {}]",
            self.current(),
            self.max
        );
    }

    /// Returns `true` if the replicated value changed since the last call.
    pub(crate) fn take_dirty(&mut self) -> bool {
        self.current.take_dirty()
    }
}
