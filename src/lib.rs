//! Tictactoe Arena library - authoritative tick-driven tic-tac-toe matches
//!
//! The engine owns all game truth for two-player matches: board, turn
//! order, turn clock, win/draw detection, reconnection and the wire
//! protocol clients learn state from.
//!
//! # Architecture
//!
//! - **Presence**: per-user slots (active / reserved) and join admission
//! - **Lifecycle**: [`MatchCore`], driven once per tick and per event
//! - **Protocol**: opcodes and JSON payloads ([`ClientMessage`], [`ServerMessage`])
//! - **Seams**: [`Dispatcher`] for broadcasts, [`ResultReporter`] for outcomes, [`Clock`]
//! - **Scheduler**: one tokio task per match
//! - **Stats**: SQLite-backed results, leaderboard and history
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tictactoe_arena::{EngineConfig, MatchParams, NoopReporter, Scheduler, SystemClock};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (scheduler, mut outbound) = Scheduler::new(
//!     EngineConfig::default(),
//!     Arc::new(NoopReporter),
//!     Arc::new(SystemClock),
//! );
//! let match_id = scheduler.create_match(MatchParams::new().with_timed(true)).await;
//! println!("created {match_id}");
//! while let Some(event) = outbound.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod clock;
mod config;
mod dispatch;
mod lifecycle;
mod presence;
mod protocol;
mod reporter;
mod scheduler;
mod state;

/// Persistence for game results.
pub mod db;

// Crate-level exports - Configuration and time
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, EngineConfig};

// Crate-level exports - Presence
pub use presence::{
    Admission, JoinRejection, MATCH_CAPACITY, Presence, PresenceTable, Slot, UserId,
};

// Crate-level exports - Match lifecycle
pub use lifecycle::{Flow, InboundMessage, MatchCore, MatchParams};
pub use state::{MatchLabel, MatchPhase, MatchState};

// Crate-level exports - Wire protocol
pub use protocol::{
    ClientMessage, DecodeError, DoneMessage, MoveMessage, OpCode, ServerMessage, StartMessage,
    UpdateMessage,
};

// Crate-level exports - Collaborator seams
pub use dispatch::{
    ChannelDispatcher, Dispatcher, Envelope, MatchContext, Outbound, OutboundEvent, Recipients,
};
pub use reporter::{
    NoopReporter, OutcomeReport, QueuedReporter, RecordingReporter, ReportError, ResultReporter,
    SqliteReporter,
};

// Crate-level exports - Runtime
pub use scheduler::{MatchId, MatchListing, Scheduler, SchedulerError};

// Crate-level exports - Board types
pub use arena_board::{Board, Mark, Move, Position, RoundResult, Square, WinningLine};
