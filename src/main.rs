//! Tictactoe Arena - Unified CLI
//!
//! Runs local matches through the scheduler and queries the stats store.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tictactoe_arena::db::StatsRepository;
use tictactoe_arena::{
    Board, ClientMessage, EngineConfig, InboundMessage, Mark, MatchParams, OutboundEvent,
    Position, Presence, Scheduler, ServerMessage, SqliteReporter, Square, SystemClock, UserId,
};
use tracing::{debug, info, instrument};
use tracing_subscriber::EnvFilter;

/// Preference order of the local bots.
const BOT_PREFERENCE: [Position; 9] = [
    Position::Center,
    Position::TopLeft,
    Position::TopRight,
    Position::BottomLeft,
    Position::BottomRight,
    Position::TopCenter,
    Position::MiddleLeft,
    Position::MiddleRight,
    Position::BottomCenter,
];

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let repository = StatsRepository::new(cli.db_path.clone(), *config.history_limit());
    repository
        .run_migrations()
        .context("Failed to prepare stats database")?;

    match cli.command {
        Command::Play {
            timed,
            player_x,
            player_o,
        } => run_play(config, repository, timed, player_x, player_o).await,
        Command::Leaderboard { limit } => show_leaderboard(&repository, limit),
        Command::Stats { user } => show_stats(&repository, &user),
        Command::History { user } => show_history(&repository, &user),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_file(path)?),
        None => Ok(EngineConfig::default()),
    }
}

/// Plays one match between two local bots and prints every message.
#[instrument(skip(config, repository))]
async fn run_play(
    config: EngineConfig,
    repository: StatsRepository,
    timed: bool,
    player_x: String,
    player_o: String,
) -> Result<()> {
    if player_x == player_o {
        bail!("Players need distinct user ids");
    }

    let reporter = Arc::new(SqliteReporter::new(repository));
    let (scheduler, mut outbound) = Scheduler::new(config.clone(), reporter, Arc::new(SystemClock));
    let match_id = scheduler
        .create_match(MatchParams::new().with_timed(timed))
        .await;
    println!("match {}", match_id);

    let players = vec![
        Presence::new(player_x.as_str(), format!("{}-local", player_x)),
        Presence::new(player_o.as_str(), format!("{}-local", player_o)),
    ];
    for presence in &players {
        scheduler
            .join_attempt(&match_id, presence.clone())
            .await
            .with_context(|| format!("{} could not join", presence.user_id()))?;
    }
    scheduler.join(&match_id, players.clone()).await?;

    // A turn can last the whole timed budget; allow that plus slack.
    let patience = Duration::from_secs(u64::from(*config.turn_time_timed_sec()) + 5);
    let mut marks: BTreeMap<UserId, Mark> = BTreeMap::new();

    loop {
        let Some(event) = tokio::time::timeout(patience, outbound.recv())
            .await
            .context("Match went silent")?
        else {
            bail!("Scheduler closed before the match finished");
        };

        let envelope = match event.into_parts().1 {
            OutboundEvent::Label(label) => {
                println!("label  {}", label);
                continue;
            }
            OutboundEvent::Message(envelope) => envelope,
        };
        println!(
            "{:<13} {}",
            envelope.op_code().to_string(),
            envelope.payload().as_deref().unwrap_or("")
        );

        let (board, turn) = match envelope.message()? {
            ServerMessage::Start(start) => {
                marks = start.marks;
                (start.board, start.mark)
            }
            ServerMessage::Update(update) => (update.board, update.mark),
            ServerMessage::Done(done) => {
                print_result(&marks, done.winner);
                scheduler.flush_reports().await;
                return Ok(());
            }
            ServerMessage::Rejected | ServerMessage::OpponentLeft => continue,
        };

        let Some(mover) = players
            .iter()
            .find(|p| marks.get(p.user_id()) == Some(&turn))
        else {
            continue;
        };
        let Some(position) = choose_move(&board) else {
            continue;
        };
        debug!(user_id = %mover.user_id(), position = position.label(), "Bot moving");

        let (op_code, data) = ClientMessage::Move(position).encode()?;
        scheduler
            .send_message(&match_id, InboundMessage::new(mover.clone(), op_code.value(), data))
            .await?;
    }
}

fn choose_move(cells: &[Option<Mark>; 9]) -> Option<Position> {
    let mut board = Board::new();
    for (position, cell) in Position::ALL.iter().zip(cells) {
        if let Some(mark) = cell {
            board.set(*position, Square::Occupied(*mark));
        }
    }
    let open = Position::valid_moves(&board);
    BOT_PREFERENCE
        .into_iter()
        .find(|position| open.contains(position))
}

fn print_result(marks: &BTreeMap<UserId, Mark>, winner: Option<Mark>) {
    match winner {
        Some(mark) => {
            let user = marks
                .iter()
                .find(|(_, m)| **m == mark)
                .map(|(user, _)| user.as_str())
                .unwrap_or("?");
            println!("winner {} ({})", user, mark);
        }
        None => println!("draw"),
    }
}

fn show_leaderboard(repository: &StatsRepository, limit: u32) -> Result<()> {
    let entries = repository.leaderboard(limit)?;
    info!(count = entries.len(), "Showing leaderboard");
    if entries.is_empty() {
        println!("No games recorded yet.");
        return Ok(());
    }

    println!("{:>4}  {:<20} {:>6} {:>5} {:>5} {:>5}", "rank", "player", "score", "W", "L", "D");
    for entry in entries {
        let stats = entry.stats();
        println!(
            "{:>4}  {:<20} {:>6} {:>5} {:>5} {:>5}",
            entry.rank(),
            stats.user_id(),
            stats.score(),
            stats.wins(),
            stats.losses(),
            stats.draws()
        );
    }
    Ok(())
}

fn show_stats(repository: &StatsRepository, user: &str) -> Result<()> {
    let Some(standing) = repository.standing(user)? else {
        println!("{} has no recorded games.", user);
        return Ok(());
    };
    let stats = standing.stats();

    println!("player       {}", stats.user_id());
    println!("rank         {}", standing.rank());
    println!("games        {}", stats.total_games());
    println!("wins         {}", stats.wins());
    println!("losses       {}", stats.losses());
    println!("draws        {}", stats.draws());
    println!("score        {}", stats.score());
    println!("win streak   {} (best {})", stats.win_streak(), stats.best_win_streak());
    println!("last game    {}", stats.last_game_time().format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}

fn show_history(repository: &StatsRepository, user: &str) -> Result<()> {
    let entries = repository.history(user)?;
    if entries.is_empty() {
        println!("{} has no recorded games.", user);
        return Ok(());
    }

    for entry in entries {
        println!(
            "{}  {:<5} vs {:<20} match {}",
            entry.played_at().format("%Y-%m-%d %H:%M:%S"),
            entry.parse_outcome()?.to_db_string(),
            entry.opponent_id(),
            entry.match_id()
        );
    }
    Ok(())
}
