//! Gameplay content: action and status effect definitions loaded from RON.
//!
//! File order is significant: it fixes the order in which the action
//! registry assigns ids, so server and clients must load the same file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::actions::{ActionCategory, ActionDefinition};
use crate::effect_definition::{
    EffectCatalogError, EffectCategory, EffectKind, StackingType, StatusEffectCatalog,
    StatusEffectDefinition,
};

/// Errors that can occur while loading content.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// Failed to read the content file.
    #[error("failed to read content: {0}")]
    ReadError(#[source] std::io::Error),

    /// Failed to parse RON content.
    #[error("failed to parse content: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    /// The status effect definitions are inconsistent.
    #[error(transparent)]
    Catalog(#[from] EffectCatalogError),
}

/// Versioned list of gameplay definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GameContent {
    /// Content revision; server and clients must agree on it.
    pub version: u32,
    /// Action definitions, in registration order.
    pub actions: Vec<ActionDefinition>,
    /// Status effect definitions.
    pub status_effects: Vec<StatusEffectDefinition>,
}

impl GameContent {
    /// Loads content from a RON file.
    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let contents = std::fs::read_to_string(path).map_err(ContentError::ReadError)?;
        let content = Self::from_ron(&contents)?;
        tracing::info!(
            "Loaded content v{} from {}: {} actions, {} status effects",
            content.version,
            path.display(),
            content.actions.len(),
            content.status_effects.len()
        );
        Ok(content)
    }

    /// Parses content from a RON string.
    pub fn from_ron(contents: &str) -> Result<Self, ContentError> {
        ron::from_str(contents).map_err(ContentError::ParseError)
    }

    /// Builds the status effect catalog.
    pub fn catalog(&self) -> Result<StatusEffectCatalog, ContentError> {
        Ok(StatusEffectCatalog::from_definitions(self.status_effects.iter().cloned())?)
    }

    /// Built-in content used by the headless server when no file exists.
    pub fn demo() -> Self {
        let action = |name: &str, category, cooldown_secs, range| ActionDefinition {
            name: name.into(),
            category,
            cooldown_secs,
            range,
        };
        let effect = |name: &str, lifetime, retrigger_delay, stacking, category, kind| {
            StatusEffectDefinition {
                name: name.into(),
                lifetime,
                retrigger_delay,
                stacking,
                category,
                kind,
                max_stacks: 0,
            }
        };

        Self {
            version: 1,
            actions: vec![
                action("rifle", ActionCategory::Weapon, 0.1, 80.0),
                action("shotgun", ActionCategory::Weapon, 0.9, 15.0),
                action("grenade", ActionCategory::Ability, 8.0, 25.0),
            ],
            status_effects: vec![
                effect(
                    "burning",
                    3.0,
                    1.0,
                    StackingType::ResetDuration,
                    EffectCategory::Debuff,
                    EffectKind::DamageOverTime { amount: 5.0 },
                ),
                effect(
                    "poisoned",
                    5.0,
                    2.0,
                    StackingType::Retrigger,
                    EffectCategory::Debuff,
                    EffectKind::DamageOverTime { amount: 4.0 },
                ),
                effect(
                    "regenerating",
                    4.0,
                    1.0,
                    StackingType::Ignore,
                    EffectCategory::Buff,
                    EffectKind::HealOverTime { amount: 3.0 },
                ),
                effect(
                    "shielded",
                    2.0,
                    0.0,
                    StackingType::ResetDuration,
                    EffectCategory::Buff,
                    EffectKind::Invulnerability,
                ),
                effect(
                    "stunned",
                    1.5,
                    0.0,
                    StackingType::Ignore,
                    EffectCategory::CrowdControl,
                    EffectKind::Stun,
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_content_is_consistent() {
        let content = GameContent::demo();
        assert_eq!(content.actions.len(), 3);
        let catalog = content.catalog().unwrap();
        assert_eq!(catalog.len(), content.status_effects.len());
        assert!(catalog.get("poisoned").is_some());
    }

    #[test]
    fn test_load_preserves_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.ron");
        std::fs::write(
            &path,
            r#"(
                version: 3,
                actions: [
                    (name: "zeta", category: Weapon),
                    (name: "alpha", category: Ability, cooldown_secs: 2.0),
                ],
                status_effects: [
                    (name: "burn", lifetime: 2.0, retrigger_delay: 1.0,
                     stacking: Stack, category: Debuff,
                     kind: DamageOverTime(amount: 1.0), max_stacks: 3),
                ],
            )"#,
        )
        .unwrap();

        let content = GameContent::load(&path).unwrap();
        assert_eq!(content.version, 3);
        let names: Vec<&str> = content.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(content.status_effects[0].max_stacks, 3);
    }

    #[test]
    fn test_missing_sections_default() {
        let content = GameContent::from_ron("(actions: [])").unwrap();
        assert!(content.status_effects.is_empty());
        assert_eq!(content.version, 0);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GameContent::load(&dir.path().join("missing.ron")),
            Err(ContentError::ReadError(_))
        ));
        assert!(matches!(
            GameContent::from_ron("(actions: 5)"),
            Err(ContentError::ParseError(_))
        ));

        let mut content = GameContent::demo();
        content.status_effects.push(content.status_effects[0].clone());
        assert!(matches!(content.catalog(), Err(ContentError::Catalog(_))));
    }
}
