//! Replicated life state of an entity.
//!
//! The machine only stores the value and validates edges; deciding *when*
//! to move (death, revive, finishing a downed entity) is left to callers.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::replicated::{ReplicationError, Replicated};

/// Whether an entity is alive, downed, or dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LifeState {
    /// Initial state.
    #[default]
    Alive,
    /// Downed; can still be revived or finished.
    Incapacitated,
    /// Terminal.
    Dead,
}

impl LifeState {
    /// Returns `true` if `self -> to` is a legal edge.
    pub fn can_transition_to(self, to: LifeState) -> bool {
        matches!(
            (self, to),
            (LifeState::Alive, LifeState::Incapacitated)
                | (LifeState::Alive, LifeState::Dead)
                | (LifeState::Incapacitated, LifeState::Dead)
                | (LifeState::Incapacitated, LifeState::Alive)
        )
    }
}

/// Rejected life-state writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LifeStateError {
    /// The edge is not part of the machine.
    #[error("invalid life state transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state.
        from: LifeState,
        /// Requested state.
        to: LifeState,
    },

    /// The write came from a non-authoritative copy.
    #[error(transparent)]
    NotAuthoritative(#[from] ReplicationError),
}

/// A successful state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifeTransition {
    /// State before the change.
    pub from: LifeState,
    /// State after the change.
    pub to: LifeState,
}

/// Authoritative life state of one entity.
#[derive(Component, Debug, Clone)]
pub struct LifeStateMachine {
    state: Replicated<LifeState>,
    downable: bool,
}

impl LifeStateMachine {
    /// Creates an `Alive` machine. Downable entities pass through
    /// `Incapacitated` when they die.
    pub fn new(downable: bool) -> Self {
        Self {
            state: Replicated::authoritative(LifeState::Alive),
            downable,
        }
    }

    /// Current state.
    pub fn state(&self) -> LifeState {
        *self.state.get()
    }

    /// Returns `true` if the entity is downed before dying.
    pub fn is_downable(&self) -> bool {
        self.downable
    }

    /// State entered when health reaches zero.
    pub fn death_state(&self) -> LifeState {
        if self.downable {
            LifeState::Incapacitated
        } else {
            LifeState::Dead
        }
    }

    /// Moves to `to`. Writing the current value returns `Ok(None)`.
    pub fn transition(&mut self, to: LifeState) -> Result<Option<LifeTransition>, LifeStateError> {
        let from = self.state();
        if from == to {
            return Ok(None);
        }
        if !from.can_transition_to(to) {
            return Err(LifeStateError::InvalidTransition { from, to });
        }
        self.state.set(to)?;
        tracing::debug!("Life state {from:?} -> {to:?}");
        Ok(Some(LifeTransition { from, to }))
    }

    /// Returns `true` if the replicated value changed since the last call.
    pub(crate) fn take_dirty(&mut self) -> bool {
        self.state.take_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_alive() {
        let machine = LifeStateMachine::new(false);
        assert_eq!(machine.state(), LifeState::Alive);
        assert_eq!(LifeState::default(), LifeState::Alive);
    }

    #[test]
    fn test_downed_path() {
        let mut machine = LifeStateMachine::new(true);
        assert_eq!(machine.death_state(), LifeState::Incapacitated);

        let t = machine.transition(LifeState::Incapacitated).unwrap().unwrap();
        assert_eq!((t.from, t.to), (LifeState::Alive, LifeState::Incapacitated));

        machine.transition(LifeState::Dead).unwrap();
        assert_eq!(machine.state(), LifeState::Dead);
    }

    #[test]
    fn test_revive_from_incapacitated() {
        let mut machine = LifeStateMachine::new(true);
        machine.transition(LifeState::Incapacitated).unwrap();
        machine.transition(LifeState::Alive).unwrap();
        assert_eq!(machine.state(), LifeState::Alive);
    }

    #[test]
    fn test_instant_kill_edge() {
        let mut machine = LifeStateMachine::new(false);
        assert_eq!(machine.death_state(), LifeState::Dead);
        assert!(machine.transition(LifeState::Dead).unwrap().is_some());
    }

    #[test]
    fn test_dead_is_terminal() {
        let mut machine = LifeStateMachine::new(false);
        machine.transition(LifeState::Dead).unwrap();
        for to in [LifeState::Alive, LifeState::Incapacitated] {
            assert_eq!(
                machine.transition(to),
                Err(LifeStateError::InvalidTransition {
                    from: LifeState::Dead,
                    to
                })
            );
        }
    }

    #[test]
    fn test_same_state_write_is_noop() {
        let mut machine = LifeStateMachine::new(false);
        machine.take_dirty();
        assert_eq!(machine.transition(LifeState::Alive), Ok(None));
        assert!(!machine.take_dirty());
    }
}
