//! Tick-driven match runtime.
//!
//! Each match runs in its own tokio task that owns its [`MatchCore`]. Ticks
//! come from an interval and events from a command channel, so calls for
//! one match never overlap. Broadcasts from every match are forwarded, in
//! production order, to the receiver returned by [`Scheduler::new`].
//! Outcomes go through a [`QueuedReporter`], so storage never stalls a
//! match loop.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::dispatch::{ChannelDispatcher, MatchContext, Outbound};
use crate::lifecycle::{Flow, InboundMessage, MatchCore, MatchParams};
use crate::presence::{JoinRejection, Presence};
use crate::reporter::{QueuedReporter, ResultReporter};
use derive_getters::Getters;
use derive_more::Display;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, instrument, warn};

/// Unique identifier for a match.
pub type MatchId = String;

/// Scheduler failure.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SchedulerError {
    /// No match with this id.
    #[display("Match {} not found", _0)]
    MatchNotFound(MatchId),
    /// The match refused the join.
    #[display("Join rejected: {}", _0)]
    Rejected(JoinRejection),
    /// The match stopped before answering.
    #[display("Match {} closed", _0)]
    MatchClosed(MatchId),
}

impl std::error::Error for SchedulerError {}

/// A match as listed for matchmaking.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct MatchListing {
    /// Match id.
    match_id: MatchId,
    /// Current label JSON.
    label: String,
}

enum MatchCommand {
    JoinAttempt {
        presence: Presence,
        reply: oneshot::Sender<Result<(), JoinRejection>>,
    },
    Join(Vec<Presence>),
    CancelJoin(Presence),
    Leave(Vec<Presence>),
    Message(InboundMessage),
    Signal {
        payload: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Terminate {
        grace_secs: u32,
    },
}

#[derive(Debug, Clone)]
struct MatchHandle {
    commands: mpsc::UnboundedSender<MatchCommand>,
    label: watch::Receiver<String>,
}

/// Owns the match table and spawns one task per match.
#[derive(Clone)]
pub struct Scheduler {
    config: EngineConfig,
    matches: Arc<RwLock<HashMap<MatchId, MatchHandle>>>,
    reporter: QueuedReporter,
    clock: Arc<dyn Clock>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Scheduler {
    /// Creates a scheduler and the receiver all broadcasts are sent to.
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all, fields(tick_rate = config.tick_rate()))]
    pub fn new(
        config: EngineConfig,
        reporter: Arc<dyn ResultReporter>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        info!("Creating scheduler");
        let scheduler = Self {
            config,
            matches: Arc::new(RwLock::new(HashMap::new())),
            reporter: QueuedReporter::spawn(reporter),
            clock,
            outbound,
        };
        (scheduler, rx)
    }

    /// Creates a match and starts driving it. Must be called from within a
    /// tokio runtime.
    #[instrument(skip(self))]
    pub async fn create_match(&self, params: MatchParams) -> MatchId {
        let match_id = uuid::Uuid::new_v4().to_string();
        let (core, tick_rate, label) = MatchCore::init(match_id.clone(), self.config.clone(), &params);

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (label_tx, label_rx) = watch::channel(label);
        self.matches.write().await.insert(
            match_id.clone(),
            MatchHandle {
                commands,
                label: label_rx,
            },
        );

        let task = MatchTask {
            core,
            commands: command_rx,
            label: label_tx,
            dispatcher: ChannelDispatcher::new(match_id.clone(), self.outbound.clone()),
            reporter: self.reporter.clone(),
            clock: Arc::clone(&self.clock),
            matches: Arc::clone(&self.matches),
        };
        tokio::spawn(task.run(tick_period(tick_rate)));

        info!(match_id = %match_id, "Match scheduled");
        match_id
    }

    /// Asks a match to admit a presence.
    #[instrument(skip(self, presence), fields(user_id = %presence.user_id()))]
    pub async fn join_attempt(
        &self,
        match_id: &str,
        presence: Presence,
    ) -> Result<(), SchedulerError> {
        let (reply, answer) = oneshot::channel();
        self.command(match_id, MatchCommand::JoinAttempt { presence, reply })
            .await?;
        answer
            .await
            .map_err(|_| SchedulerError::MatchClosed(match_id.to_string()))?
            .map_err(SchedulerError::Rejected)
    }

    /// Completes admitted joins.
    #[instrument(skip(self, presences), fields(count = presences.len()))]
    pub async fn join(&self, match_id: &str, presences: Vec<Presence>) -> Result<(), SchedulerError> {
        self.command(match_id, MatchCommand::Join(presences)).await
    }

    /// Releases the seat of an admitted join whose connection went away
    /// before [`Scheduler::join`].
    #[instrument(skip(self, presence), fields(user_id = %presence.user_id()))]
    pub async fn cancel_join(&self, match_id: &str, presence: Presence) -> Result<(), SchedulerError> {
        self.command(match_id, MatchCommand::CancelJoin(presence)).await
    }

    /// Reports departures.
    #[instrument(skip(self, presences), fields(count = presences.len()))]
    pub async fn leave(&self, match_id: &str, presences: Vec<Presence>) -> Result<(), SchedulerError> {
        self.command(match_id, MatchCommand::Leave(presences)).await
    }

    /// Buffers a client message for the match's next tick.
    #[instrument(skip(self, message), fields(user_id = %message.sender().user_id(), op_code = message.op_code()))]
    pub async fn send_message(
        &self,
        match_id: &str,
        message: InboundMessage,
    ) -> Result<(), SchedulerError> {
        self.command(match_id, MatchCommand::Message(message)).await
    }

    /// Sends an administrative signal and waits for the reply.
    #[instrument(skip(self, payload))]
    pub async fn signal(
        &self,
        match_id: &str,
        payload: impl Into<String>,
    ) -> Result<Option<String>, SchedulerError> {
        let (reply, answer) = oneshot::channel();
        let payload = payload.into();
        self.command(match_id, MatchCommand::Signal { payload, reply })
            .await?;
        answer
            .await
            .map_err(|_| SchedulerError::MatchClosed(match_id.to_string()))
    }

    /// Shuts a match down.
    #[instrument(skip(self))]
    pub async fn terminate(&self, match_id: &str, grace_secs: u32) -> Result<(), SchedulerError> {
        self.command(match_id, MatchCommand::Terminate { grace_secs })
            .await
    }

    /// Waits until every reported outcome has reached the reporter.
    pub async fn flush_reports(&self) {
        self.reporter.flush().await;
    }

    /// Running matches, ordered by id.
    pub async fn list_matches(&self) -> Vec<MatchListing> {
        let matches = self.matches.read().await;
        let mut listings: Vec<MatchListing> = matches
            .iter()
            .map(|(match_id, handle)| MatchListing {
                match_id: match_id.clone(),
                label: handle.label.borrow().clone(),
            })
            .collect();
        listings.sort_by(|a, b| a.match_id.cmp(&b.match_id));
        listings
    }

    /// Current label of a running match.
    pub async fn label(&self, match_id: &str) -> Option<String> {
        self.matches
            .read()
            .await
            .get(match_id)
            .map(|handle| handle.label.borrow().clone())
    }

    async fn command(&self, match_id: &str, command: MatchCommand) -> Result<(), SchedulerError> {
        let commands = self
            .matches
            .read()
            .await
            .get(match_id)
            .map(|handle| handle.commands.clone())
            .ok_or_else(|| SchedulerError::MatchNotFound(match_id.to_string()))?;
        commands
            .send(command)
            .map_err(|_| SchedulerError::MatchClosed(match_id.to_string()))
    }
}

fn tick_period(tick_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1)))
}

struct MatchTask {
    core: MatchCore,
    commands: mpsc::UnboundedReceiver<MatchCommand>,
    label: watch::Sender<String>,
    dispatcher: ChannelDispatcher,
    reporter: QueuedReporter,
    clock: Arc<dyn Clock>,
    matches: Arc<RwLock<HashMap<MatchId, MatchHandle>>>,
}

impl MatchTask {
    async fn run(mut self, period: Duration) {
        let match_id = self.core.match_id().clone();
        info!(match_id = %match_id, ?period, "Match loop started");

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inbox: Vec<InboundMessage> = Vec::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let messages = std::mem::take(&mut inbox);
                    let flow = {
                        let mut ctx = MatchContext::new(
                            &match_id,
                            &mut self.dispatcher,
                            &self.reporter,
                            self.clock.as_ref(),
                        );
                        self.core.tick(&mut ctx, messages)
                    };
                    self.sync_label();
                    if flow == Flow::Terminate {
                        break;
                    }
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!(match_id = %match_id, "Command channel closed");
                        break;
                    };
                    if let MatchCommand::Message(message) = command {
                        inbox.push(message);
                        continue;
                    }
                    let stop = self.handle(&match_id, command);
                    self.sync_label();
                    if stop {
                        break;
                    }
                }
            }
        }

        self.matches.write().await.remove(&match_id);
        info!(match_id = %match_id, "Match loop stopped");
    }

    /// Runs one non-tick command. Returns true when the loop should stop.
    fn handle(&mut self, match_id: &str, command: MatchCommand) -> bool {
        let mut ctx = MatchContext::new(
            match_id,
            &mut self.dispatcher,
            &self.reporter,
            self.clock.as_ref(),
        );

        match command {
            MatchCommand::JoinAttempt { presence, reply } => {
                let result = self.core.join_attempt(&presence);
                if let Err(unanswered) = reply.send(result) {
                    warn!(match_id, user_id = %presence.user_id(), "Join attempt caller went away");
                    if unanswered.is_ok() {
                        self.core.cancel_join(&presence);
                    }
                }
                false
            }
            MatchCommand::Join(presences) => {
                self.core.join(&mut ctx, presences);
                false
            }
            MatchCommand::CancelJoin(presence) => {
                self.core.cancel_join(&presence);
                false
            }
            MatchCommand::Leave(presences) => {
                self.core.leave(&mut ctx, presences) == Flow::Terminate
            }
            MatchCommand::Signal { payload, reply } => {
                let answer = self.core.signal(&mut ctx, &payload);
                if reply.send(answer).is_err() {
                    debug!(match_id, "Signal caller went away");
                }
                false
            }
            MatchCommand::Terminate { grace_secs } => {
                self.core.terminate(&mut ctx, grace_secs);
                true
            }
            MatchCommand::Message(_) => false,
        }
    }

    fn sync_label(&self) {
        let current = self.core.state().label().to_json();
        self.label.send_if_modified(|label| {
            if *label == current {
                false
            } else {
                *label = current;
                true
            }
        });
    }
}
