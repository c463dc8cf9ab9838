//! Action registry: compact numeric identifiers for action definitions.
//!
//! Every participant builds its own [`ActionRegistry`] from the same ordered
//! content list, so an [`ActionId`] sent over the wire resolves to the same
//! [`ActionDefinition`] on the server and on every client without the
//! definition itself ever being transmitted.
//!
//! Identifiers are assigned in content order, followed by the
//! [`WellKnownAction`] definitions that the content did not already supply.
//! They are stable for one process lifetime only.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ActionId
// ---------------------------------------------------------------------------

/// Wire identifier of a registered action. Serializes as a single unsigned
/// integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u16);

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ActionDefinition
// ---------------------------------------------------------------------------

/// Broad grouping of actions, used by gameplay code to filter loadouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionCategory {
    /// Weapon fire and melee.
    Weapon,
    /// Active abilities.
    Ability,
    /// Behaviours driven by server-side AI.
    Ai,
}

/// Immutable template of something an entity can perform. The `name` is the
/// identity used for deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Unique name.
    pub name: String,
    /// Grouping.
    pub category: ActionCategory,
    /// Seconds between two uses.
    #[serde(default)]
    pub cooldown_secs: f32,
    /// Maximum effective range in meters (0 = self).
    #[serde(default)]
    pub range: f32,
}

impl ActionDefinition {
    /// Creates a definition with no cooldown and self range.
    pub fn new(name: impl Into<String>, category: ActionCategory) -> Self {
        Self {
            name: name.into(),
            category,
            cooldown_secs: 0.0,
            range: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// WellKnownAction
// ---------------------------------------------------------------------------

/// Actions the server relies on regardless of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownAction {
    /// Move toward the current target.
    Chase,
    /// Acquire a target.
    Target,
    /// Placeholder action while crowd-controlled.
    Stunned,
}

impl WellKnownAction {
    /// All well-known actions, in registration order.
    pub const ALL: [WellKnownAction; 3] = [Self::Chase, Self::Target, Self::Stunned];

    /// Definition name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Chase => "chase",
            Self::Target => "target",
            Self::Stunned => "stunned",
        }
    }

    /// Built-in definition, used when the content does not override it.
    pub fn definition(self) -> ActionDefinition {
        let mut definition = ActionDefinition::new(self.name(), ActionCategory::Ai);
        if self == Self::Target {
            definition.range = 50.0;
        }
        definition
    }
}

// ---------------------------------------------------------------------------
// ActionRegistryError
// ---------------------------------------------------------------------------

/// Errors raised by the [`ActionRegistry`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionRegistryError {
    /// `register` was called a second time.
    #[error("action registry is already initialized")]
    AlreadyInitialized,

    /// A lookup ran before `register`.
    #[error("action registry has not been initialized")]
    NotInitialized,

    /// No action carries this identifier.
    #[error("no action registered with id {0}")]
    NotFound(ActionId),

    /// The definition was never registered.
    #[error("action '{0}' is not registered")]
    UnknownDefinition(String),

    /// Two configured definitions share a name but differ.
    #[error("conflicting definitions for action '{0}'")]
    ConflictingDefinition(String),

    /// More definitions than fit in an [`ActionId`].
    #[error("too many action definitions: {0}")]
    TooManyDefinitions(usize),
}

// ---------------------------------------------------------------------------
// ActionRegistry
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ActionTable {
    definitions: Vec<ActionDefinition>,
    by_name: HashMap<String, ActionId>,
}

impl ActionTable {
    fn build<I>(configured: I) -> Result<Self, ActionRegistryError>
    where
        I: IntoIterator<Item = ActionDefinition>,
    {
        let mut definitions: Vec<ActionDefinition> = Vec::new();
        let mut by_name = HashMap::new();

        for definition in configured {
            match by_name.get(&definition.name) {
                Some(&ActionId(existing)) => {
                    if definitions[existing as usize] != definition {
                        return Err(ActionRegistryError::ConflictingDefinition(definition.name));
                    }
                }
                None => Self::push(&mut definitions, &mut by_name, definition)?,
            }
        }

        // Content may override a well-known definition; it keeps its content slot.
        for well_known in WellKnownAction::ALL {
            if !by_name.contains_key(well_known.name()) {
                Self::push(&mut definitions, &mut by_name, well_known.definition())?;
            }
        }

        Ok(Self {
            definitions,
            by_name,
        })
    }

    fn push(
        definitions: &mut Vec<ActionDefinition>,
        by_name: &mut HashMap<String, ActionId>,
        definition: ActionDefinition,
    ) -> Result<(), ActionRegistryError> {
        let index = u16::try_from(definitions.len())
            .map_err(|_| ActionRegistryError::TooManyDefinitions(definitions.len() + 1))?;
        by_name.insert(definition.name.clone(), ActionId(index));
        definitions.push(definition);
        Ok(())
    }
}

/// Bidirectional mapping between [`ActionDefinition`]s and [`ActionId`]s.
///
/// Initialized exactly once; afterwards it is read-only and safe to share
/// across threads behind an `Arc` without further synchronization.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    table: OnceLock<ActionTable>,
}

impl ActionRegistry {
    /// Creates an uninitialized registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and initializes a registry in one step.
    pub fn with_definitions<I>(definitions: I) -> Result<Self, ActionRegistryError>
    where
        I: IntoIterator<Item = ActionDefinition>,
    {
        let registry = Self::new();
        registry.register(definitions)?;
        Ok(registry)
    }

    /// Assigns identifiers to `definitions` plus the well-known actions.
    ///
    /// Duplicate registrations of an identical definition collapse to one
    /// identifier. Fails with [`ActionRegistryError::AlreadyInitialized`] on
    /// any call after the first successful one.
    pub fn register<I>(&self, definitions: I) -> Result<(), ActionRegistryError>
    where
        I: IntoIterator<Item = ActionDefinition>,
    {
        if self.table.get().is_some() {
            return Err(ActionRegistryError::AlreadyInitialized);
        }
        let table = ActionTable::build(definitions)?;
        let count = table.definitions.len();
        self.table
            .set(table)
            .map_err(|_| ActionRegistryError::AlreadyInitialized)?;
        tracing::info!("Action registry initialized with {count} definitions");
        Ok(())
    }

    /// Returns `true` once `register` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.table.get().is_some()
    }

    fn table(&self) -> Result<&ActionTable, ActionRegistryError> {
        self.table.get().ok_or(ActionRegistryError::NotInitialized)
    }

    /// Resolves an identifier received over the wire.
    pub fn resolve(&self, id: ActionId) -> Result<&ActionDefinition, ActionRegistryError> {
        self.table()?
            .definitions
            .get(id.0 as usize)
            .ok_or(ActionRegistryError::NotFound(id))
    }

    /// Returns the identifier of a registered definition. The definition
    /// must match the registered one exactly, not just by name.
    pub fn id_of(&self, definition: &ActionDefinition) -> Result<ActionId, ActionRegistryError> {
        let table = self.table()?;
        match table.by_name.get(&definition.name) {
            Some(&id) if table.definitions[id.0 as usize] == *definition => Ok(id),
            _ => Err(ActionRegistryError::UnknownDefinition(
                definition.name.clone(),
            )),
        }
    }

    /// Returns the identifier registered under `name`.
    pub fn id_of_name(&self, name: &str) -> Result<ActionId, ActionRegistryError> {
        self.table()?
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| ActionRegistryError::UnknownDefinition(name.to_string()))
    }

    /// Identifier of a well-known action. Always present after `register`.
    pub fn well_known(&self, action: WellKnownAction) -> Result<ActionId, ActionRegistryError> {
        self.id_of_name(action.name())
    }

    /// Number of registered definitions (0 before initialization).
    pub fn len(&self) -> usize {
        self.table.get().map_or(0, |t| t.definitions.len())
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates `(id, definition)` pairs in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (ActionId, &ActionDefinition)> {
        self.table
            .get()
            .into_iter()
            .flat_map(|t| t.definitions.iter().enumerate())
            .map(|(i, d)| (ActionId(i as u16), d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weapon(name: &str) -> ActionDefinition {
        ActionDefinition::new(name, ActionCategory::Weapon)
    }

    #[test]
    fn test_ids_follow_configured_order_then_well_known() {
        let registry =
            ActionRegistry::with_definitions([weapon("rifle"), weapon("shotgun"), weapon("knife")])
                .unwrap();

        assert_eq!(registry.len(), 6);
        assert_eq!(registry.id_of_name("rifle").unwrap(), ActionId(0));
        assert_eq!(registry.id_of_name("shotgun").unwrap(), ActionId(1));
        assert_eq!(registry.id_of_name("knife").unwrap(), ActionId(2));
        assert_eq!(
            registry.well_known(WellKnownAction::Chase).unwrap(),
            ActionId(3)
        );
        assert_eq!(
            registry.well_known(WellKnownAction::Stunned).unwrap(),
            ActionId(5)
        );
    }

    #[test]
    fn test_duplicates_collapse_to_one_id() {
        let registry =
            ActionRegistry::with_definitions([weapon("rifle"), weapon("rifle"), weapon("knife")])
                .unwrap();
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.id_of(&weapon("knife")).unwrap(), ActionId(1));
    }

    #[test]
    fn test_conflicting_duplicate_is_rejected() {
        let mut faster = weapon("rifle");
        faster.cooldown_secs = 0.1;
        let err = ActionRegistry::with_definitions([weapon("rifle"), faster]).unwrap_err();
        assert_eq!(
            err,
            ActionRegistryError::ConflictingDefinition("rifle".into())
        );
    }

    #[test]
    fn test_content_overrides_well_known() {
        let mut chase = WellKnownAction::Chase.definition();
        chase.range = 12.0;
        let registry = ActionRegistry::with_definitions([weapon("rifle"), chase.clone()]).unwrap();

        assert_eq!(registry.len(), 4);
        let id = registry.well_known(WellKnownAction::Chase).unwrap();
        assert_eq!(id, ActionId(1));
        assert_eq!(registry.resolve(id).unwrap().range, 12.0);
    }

    #[test]
    fn test_bijection_over_registered_definitions() {
        let registry =
            ActionRegistry::with_definitions([weapon("rifle"), weapon("grenade")]).unwrap();
        for (id, definition) in registry.iter() {
            assert_eq!(registry.id_of(definition).unwrap(), id);
            assert_eq!(registry.resolve(id).unwrap(), definition);
        }
    }

    #[test]
    fn test_second_register_fails() {
        let registry = ActionRegistry::new();
        registry.register([weapon("rifle")]).unwrap();
        assert_eq!(
            registry.register([weapon("knife")]),
            Err(ActionRegistryError::AlreadyInitialized)
        );
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_lookups_before_register_fail() {
        let registry = ActionRegistry::new();
        assert_eq!(
            registry.resolve(ActionId(0)),
            Err(ActionRegistryError::NotInitialized)
        );
        assert!(registry.is_empty());
        assert!(!registry.is_initialized());
    }

    #[test]
    fn test_not_found_errors() {
        let registry = ActionRegistry::with_definitions([weapon("rifle")]).unwrap();
        assert_eq!(
            registry.resolve(ActionId(99)),
            Err(ActionRegistryError::NotFound(ActionId(99)))
        );
        assert_eq!(
            registry.id_of(&weapon("railgun")),
            Err(ActionRegistryError::UnknownDefinition("railgun".into()))
        );

        // Same name, different content is not the registered definition.
        let mut altered = weapon("rifle");
        altered.range = 300.0;
        assert!(registry.id_of(&altered).is_err());
    }

    #[test]
    fn test_independent_registries_agree() {
        let content = vec![weapon("rifle"), weapon("smg"), weapon("rifle"), weapon("rpg")];
        let server = ActionRegistry::with_definitions(content.clone()).unwrap();
        let client = ActionRegistry::with_definitions(content).unwrap();

        for (id, definition) in server.iter() {
            assert_eq!(client.id_of(definition).unwrap(), id);
        }
    }

    #[test]
    fn test_action_id_is_a_single_integer_on_the_wire() {
        let bytes = postcard::to_allocvec(&ActionId(5)).unwrap();
        assert_eq!(bytes, vec![5]);
        let json = serde_json::to_string(&ActionId(300)).unwrap();
        assert_eq!(json, "300");
    }
}
