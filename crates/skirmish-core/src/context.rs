//! The game context: every server-side component behind one explicitly
//! constructed owner.
//!
//! There are no process-wide singletons. The host builds a [`GameContext`]
//! from its [`Config`] and [`GameContent`] and passes it (or borrows from
//! it) wherever state is needed. The action registry is shared as an `Arc`
//! because it is read-only once built.

use std::sync::Arc;

use skirmish_config::Config;

use crate::actions::{ActionDefinition, ActionId, ActionRegistry, ActionRegistryError};
use crate::authority::{AuthoritativeWorld, EntitySpec, WorldError};
use crate::content::{ContentError, GameContent};
use crate::effect_definition::StatusEffectCatalog;
use crate::health::HealthError;
use crate::messages::{ClientMessage, ConnectRequest, Disconnect, ServerMessage};
use crate::registry::{ObservableRegistry, RegistryItem};
use crate::replication::{NetworkId, StateUpdate};
use crate::scheduler::UpdateScheduler;
use crate::session::{AdmissionResult, ClientId, LoadoutSelection, SessionError, SessionGate};
use crate::status_effect::{ApplyOutcome, TickPolicy};

// ---------------------------------------------------------------------------
// PlayerHandle
// ---------------------------------------------------------------------------

/// Link between an admitted client and its spawned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerHandle {
    /// Owning client.
    pub client_id: ClientId,
    /// Lobby slot of the client.
    pub slot: u32,
    /// Player entity.
    pub entity: NetworkId,
}

impl RegistryItem for PlayerHandle {
    type Key = ClientId;

    fn key(&self) -> ClientId {
        self.client_id
    }
}

// ---------------------------------------------------------------------------
// ContextError
// ---------------------------------------------------------------------------

/// Failures surfaced by [`GameContext`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Session gate refused the operation.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// World refused the operation.
    #[error(transparent)]
    World(#[from] WorldError),

    /// Invalid entity configuration.
    #[error(transparent)]
    Health(#[from] HealthError),

    /// Action lookup failed.
    #[error(transparent)]
    Actions(#[from] ActionRegistryError),

    /// Content was inconsistent.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// The client already controls an entity.
    #[error("{0} already has a player entity")]
    AlreadySpawned(ClientId),
}

// ---------------------------------------------------------------------------
// GameContext
// ---------------------------------------------------------------------------

/// Owner of the authoritative game state.
pub struct GameContext {
    actions: Arc<ActionRegistry>,
    catalog: StatusEffectCatalog,
    session: SessionGate,
    players: ObservableRegistry<PlayerHandle>,
    world: AuthoritativeWorld,
    scheduler: UpdateScheduler,
    player_spec: EntitySpec,
    clock: f64,
}

impl GameContext {
    /// Builds every component from `config` and `content`.
    pub fn new(config: &Config, content: GameContent) -> Result<Self, ContextError> {
        let catalog = content.catalog()?;
        let actions = ActionRegistry::with_definitions(content.actions)?;

        let policy = if config.effects.catch_up_ticks {
            TickPolicy::CatchUp
        } else {
            TickPolicy::Coarse
        };
        let player_spec = EntitySpec {
            max_health: config.health.default_max_health,
            downable: config.health.downed_before_death,
            zero_epsilon: config.health.zero_epsilon,
            ..EntitySpec::default()
        };

        tracing::info!(
            "Game context ready: {} actions, {} status effects, {policy:?} effect ticks",
            actions.len(),
            catalog.len()
        );
        Ok(Self {
            actions: Arc::new(actions),
            catalog,
            session: SessionGate::new(config.server.max_players),
            players: ObservableRegistry::new(),
            world: AuthoritativeWorld::with_policy(policy),
            scheduler: UpdateScheduler::new(),
            player_spec,
            clock: 0.0,
        })
    }

    // --- Sessions ---

    /// Handles a connection request.
    pub fn handle_connect(&mut self, request: ConnectRequest) -> AdmissionResult {
        self.session.admit(request.client_id)
    }

    /// Handles a disconnect: drops the session record, despawns the player
    /// entity and removes its handle. Returns `false` for unknown clients.
    pub fn handle_disconnect(&mut self, message: Disconnect) -> bool {
        let had_record = self.session.on_disconnect(message.client_id).is_some();
        let handle = self.players.remove(&message.client_id);
        if let Some(handle) = handle {
            self.world.despawn_entity(handle.entity);
        }
        had_record || handle.is_some()
    }

    /// Stores a lobby selection. Returns `false` if the client is gone.
    pub fn select_loadout(&mut self, client_id: ClientId, selection: LoadoutSelection) -> bool {
        self.session.set_selection(client_id, selection)
    }

    /// Dispatches one client message. Only connection requests get a reply.
    pub fn handle_message(&mut self, message: ClientMessage) -> Option<ServerMessage> {
        match message {
            ClientMessage::Connect(request) => {
                Some(ServerMessage::Admission(self.handle_connect(request)))
            }
            ClientMessage::Disconnect(message) => {
                self.handle_disconnect(message);
                None
            }
            ClientMessage::SelectLoadout(select) => {
                self.select_loadout(select.client_id, select.selection);
                None
            }
            ClientMessage::Action(request) => {
                if let Err(e) = self.perform_action(request.client_id, request.action) {
                    tracing::debug!("Ignored action {} from {}: {e}", request.action, request.client_id);
                }
                None
            }
        }
    }

    /// Closes the lobby.
    pub fn start_game(&mut self) -> Result<(), ContextError> {
        Ok(self.session.start_game()?)
    }

    /// Spawns the player entity of an admitted client.
    pub fn spawn_player(&mut self, client_id: ClientId) -> Result<NetworkId, ContextError> {
        let slot = self.session.require(client_id)?.slot;
        if self.players.contains(&client_id) {
            return Err(ContextError::AlreadySpawned(client_id));
        }
        let entity = self.world.spawn_entity(self.player_spec)?;
        self.players.add(PlayerHandle {
            client_id,
            slot,
            entity,
        });
        tracing::info!("Spawned {entity} for {client_id} (slot {slot})");
        Ok(entity)
    }

    /// Resolves an action sent by a present client.
    pub fn perform_action(
        &self,
        client_id: ClientId,
        action: ActionId,
    ) -> Result<&ActionDefinition, ContextError> {
        self.session.require(client_id)?;
        let definition = self.actions.resolve(action)?;
        tracing::trace!("{client_id} performs {}", definition.name);
        Ok(definition)
    }

    // --- Gameplay ---

    /// Applies the status effect named `name` to `entity`.
    pub fn apply_effect(&mut self, entity: NetworkId, name: &str) -> Result<ApplyOutcome, ContextError> {
        let definition = self
            .catalog
            .get(name)
            .ok_or_else(|| WorldError::UnknownEffect(name.to_string()))?;
        Ok(self.world.apply_effect(entity, definition)?)
    }

    /// Advances the simulation by `dt` seconds: status effects, then
    /// scheduled updates. Returns the replicated changes of this step.
    pub fn step(&mut self, dt: f32) -> Vec<StateUpdate> {
        self.world.update_effects(dt);
        self.clock += f64::from(dt);
        self.scheduler.tick(self.clock);
        self.world.advance_tick();
        self.world.collect_updates()
    }

    // --- Queries ---

    /// Player handle of `client_id`.
    pub fn find_by_client(&self, client_id: ClientId) -> Option<&PlayerHandle> {
        self.players.get(&client_id)
    }

    /// Player handle occupying `slot`.
    pub fn find_by_slot(&self, slot: u32) -> Option<&PlayerHandle> {
        self.players.find(|p| p.slot == slot)
    }

    /// Shared action registry.
    pub fn actions(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    /// Status effect definitions.
    pub fn catalog(&self) -> &StatusEffectCatalog {
        &self.catalog
    }

    /// Session gate.
    pub fn session(&self) -> &SessionGate {
        &self.session
    }

    /// Player registry.
    pub fn players(&self) -> &ObservableRegistry<PlayerHandle> {
        &self.players
    }

    /// Mutable player registry, for subscribing.
    pub fn players_mut(&mut self) -> &mut ObservableRegistry<PlayerHandle> {
        &mut self.players
    }

    /// Authoritative world.
    pub fn world(&self) -> &AuthoritativeWorld {
        &self.world
    }

    /// Mutable authoritative world.
    pub fn world_mut(&mut self) -> &mut AuthoritativeWorld {
        &mut self.world
    }

    /// Update scheduler.
    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    /// Seconds simulated so far.
    pub fn clock(&self) -> f64 {
        self.clock
    }
}

impl std::fmt::Debug for GameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameContext")
            .field("actions", &self.actions.len())
            .field("session", &self.session)
            .field("players", &self.players.len())
            .field("world", &self.world)
            .field("clock", &self.clock)
            .finish()
    }
}
