//! Command-line argument parsing for the Skirmish server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Skirmish server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "skirmish-server", about = "Skirmish authoritative game server")]
pub struct CliArgs {
    /// Simulation tick rate (Hz).
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Maximum number of admitted clients (0 = unlimited).
    #[arg(long)]
    pub max_players: Option<u32>,

    /// Gameplay content file.
    #[arg(long)]
    pub content: Option<PathBuf>,

    /// Length of the headless run in seconds.
    #[arg(long)]
    pub seconds: Option<f64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(rate) = args.tick_rate {
            self.server.tick_rate = rate;
        }
        if let Some(max) = args.max_players {
            self.server.max_players = max;
        }
        if let Some(ref content) = args.content {
            self.server.content_file = content.clone();
        }
        if let Some(seconds) = args.seconds {
            self.server.simulate_seconds = seconds;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
