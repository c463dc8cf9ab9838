//! Headless authoritative host for Skirmish.
//!
//! Loads config and gameplay content, then runs a scripted session at the
//! configured tick rate: a lobby fills up, the game starts, players take
//! damage and status effects, and the replicated state is encoded and fed
//! to an observer mirror the way a client would receive it.
//!
//! Run with: `cargo run -p skirmish-server -- --seconds 5`

use std::process::ExitCode;

use clap::Parser;
use skirmish_config::{CliArgs, Config, default_config_dir};
use skirmish_core::messages::{self, ActionRequest, ConnectRequest, Disconnect, SelectLoadout};
use skirmish_core::{
    ClientId, ClientMessage, GameContent, GameContext, GameEvent, LoadoutSelection, NetworkId,
    ObserverWorld, ServerMessage, ServerTickSchedule, WellKnownAction,
};
use tracing::{error, info, warn};

/// Clients joining the scripted lobby.
const LOBBY: [ClientId; 4] = [ClientId(1), ClientId(2), ClientId(3), ClientId(4)];

/// A client that arrives after the game started.
const LATECOMER: ClientId = ClientId(99);

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    let (mut config, config_error) = match Config::load_or_create(&config_dir) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    config.apply_cli_overrides(&args);

    skirmish_log::init_logging(
        Some(&config_dir.join("logs")),
        cfg!(debug_assertions),
        Some(&config),
    );
    if let Some(e) = config_error {
        warn!("Using default config: {e}");
    }
    if let Err(e) = config.validate() {
        error!("Refusing to start: {e}");
        return ExitCode::FAILURE;
    }

    let content_path = config.content_path(&config_dir);
    let content = if content_path.exists() {
        match GameContent::load(&content_path) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to load {}: {e}", content_path.display());
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!("No content at {}, using built-in content", content_path.display());
        GameContent::demo()
    };

    let mut ctx = match GameContext::new(&config, content) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Failed to build game context: {e}");
            return ExitCode::FAILURE;
        }
    };

    let schedule = match ServerTickSchedule::with_tick_rate(config.server.tick_rate) {
        Ok(schedule) => schedule,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    run_session(&mut ctx, &config, schedule);
    ExitCode::SUCCESS
}

/// Lobby phase, then the fixed-rate simulation loop.
fn run_session(ctx: &mut GameContext, config: &Config, mut schedule: ServerTickSchedule) {
    ctx.world_mut().subscribe(|event| match event {
        GameEvent::Died { entity } => info!("{entity} went down"),
        GameEvent::LifeStateChanged { entity, from, to } => {
            info!("{entity}: {from:?} -> {to:?}");
        }
        GameEvent::EffectStarted { entity, effect } => info!("{entity} is {effect}"),
        _ => {}
    });

    for client_id in LOBBY {
        reply(ctx, ClientMessage::Connect(ConnectRequest { client_id }));
    }
    let loadout: Vec<_> = ctx.actions().iter().take(2).map(|(id, _)| id).collect();
    ctx.handle_message(ClientMessage::SelectLoadout(SelectLoadout {
        client_id: LOBBY[0],
        selection: LoadoutSelection {
            class_id: 1,
            actions: loadout,
        },
    }));

    if let Err(e) = ctx.start_game() {
        error!("Could not start the game: {e}");
        return;
    }
    reply(ctx, ClientMessage::Connect(ConnectRequest { client_id: LATECOMER }));

    let players: Vec<NetworkId> = LOBBY
        .iter()
        .filter_map(|&client| match ctx.spawn_player(client) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!("No entity for {client}: {e}");
                None
            }
        })
        .collect();

    let heartbeat = ctx.scheduler().subscribe(1.0, |elapsed| {
        info!("Heartbeat ({elapsed:.2}s since last)");
    });
    if let Err(e) = heartbeat {
        warn!("Heartbeat disabled: {e}");
    }

    let dt = schedule.tick_duration_secs();
    let total_ticks = (config.server.simulate_seconds / dt).round() as u64;
    let ticks_per_second = u64::from(config.server.tick_rate);

    let mut mirror = ObserverWorld::new();
    let mut bytes_sent = 0usize;

    info!(
        "Simulating {:.1}s at {} Hz with {} players",
        config.server.simulate_seconds,
        config.server.tick_rate,
        players.len()
    );
    while schedule.total_ticks() < total_ticks {
        for _ in 0..schedule.accumulate(dt) {
            let tick = schedule.total_ticks();
            if tick % ticks_per_second == 0 {
                script_second(ctx, &players, tick / ticks_per_second);
            }

            let updates = ctx.step(dt as f32);
            if updates.is_empty() {
                continue;
            }
            match messages::encode(&ServerMessage::State(updates.clone())) {
                Ok(bytes) => bytes_sent += bytes.len(),
                Err(e) => warn!("Failed to encode state: {e}"),
            }
            mirror.apply_all(&updates);
        }
    }

    for &client_id in &LOBBY {
        ctx.handle_message(ClientMessage::Disconnect(Disconnect { client_id }));
    }

    for &entity in &players {
        info!(
            "Final {entity}: health {:?}, {:?}",
            mirror.health(entity),
            mirror.life_state(entity)
        );
    }
    info!(
        "Session finished after {} ticks, {bytes_sent} bytes of state replicated",
        schedule.total_ticks()
    );
}

/// Scripted gameplay for second `second` of the session.
fn script_second(ctx: &mut GameContext, players: &[NetworkId], second: u64) {
    let Some(&target) = players.get(second as usize % players.len().max(1)) else {
        return;
    };

    let effect = match second % 4 {
        0 => "burning",
        1 => "poisoned",
        2 => "shielded",
        _ => "regenerating",
    };
    match ctx.apply_effect(target, effect) {
        Ok(outcome) => info!("{effect} on {target}: {outcome:?}"),
        Err(e) => warn!("{effect} on {target} failed: {e}"),
    }

    match ctx.world_mut().apply_health_change(target, -35.0) {
        Ok(outcome) => info!("Shot {target}: {outcome:?}"),
        Err(e) => warn!("Shot {target} failed: {e}"),
    }

    if let Ok(action) = ctx.actions().well_known(WellKnownAction::Target) {
        ctx.handle_message(ClientMessage::Action(ActionRequest {
            client_id: LOBBY[0],
            action,
        }));
    }
}

/// Sends a client message and logs the admission reply.
fn reply(ctx: &mut GameContext, message: ClientMessage) {
    if let Some(ServerMessage::Admission(result)) = ctx.handle_message(message) {
        info!("Admission: {result:?}");
    }
}
