//! Command-line interface for tictactoe_arena.

use clap::{Parser, Subcommand};

/// Tictactoe Arena - authoritative tic-tac-toe match engine
#[derive(Parser, Debug)]
#[command(name = "arena")]
#[command(about = "Tick-driven tic-tac-toe match engine with stats", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Engine configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Path to the stats database (created if it doesn't exist)
    #[arg(long, global = true, env = "ARENA_DB_PATH", default_value = "arena.db")]
    pub db_path: String,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a local match between two bots and print the protocol stream
    Play {
        /// Enable the turn clock
        #[arg(long)]
        timed: bool,

        /// User id of the first player (plays X)
        #[arg(long, default_value = "alice")]
        player_x: String,

        /// User id of the second player (plays O)
        #[arg(long, default_value = "bob")]
        player_o: String,
    },

    /// Show the top players by wins minus losses
    Leaderboard {
        /// Number of rows
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },

    /// Show one player's totals
    Stats {
        /// User id
        user: String,
    },

    /// Show one player's recent games
    History {
        /// User id
        user: String,
    },
}
