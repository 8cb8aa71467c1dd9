//! Match lifecycle controller.
//!
//! [`MatchCore`] is one match instance: the scheduler calls it once per
//! tick and once per join, leave or signal, never concurrently. Every
//! terminal transition goes through `finish_round`, which acts only while a
//! round is in progress, so each round is reported exactly once.

use crate::config::EngineConfig;
use crate::dispatch::{MatchContext, Recipients};
use crate::presence::{JoinRejection, Presence};
use crate::protocol::{ClientMessage, DoneMessage, ServerMessage, StartMessage, UpdateMessage};
use crate::reporter::OutcomeReport;
use crate::state::{MatchLabel, MatchPhase, MatchState};
use arena_board::{Board, Mark, Move, RoundResult, WinningLine, round_result};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};

/// What the scheduler should do with the match after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep running.
    Continue,
    /// Stop driving the match and drop it.
    Terminate,
}

/// A client message buffered for the next tick.
#[derive(Debug, Clone, PartialEq, Eq, Getters, derive_new::new)]
pub struct InboundMessage {
    /// Who sent it.
    sender: Presence,
    /// Raw opcode.
    op_code: u8,
    /// Raw payload.
    data: Vec<u8>,
}

/// String parameters a match is created with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchParams {
    params: BTreeMap<String, String>,
}

impl MatchParams {
    /// No parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `timed`.
    pub fn with_timed(mut self, timed: bool) -> Self {
        self.params.insert("timed".into(), timed.to_string());
        self
    }

    /// Sets an arbitrary parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Looks up a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// True when `timed` is `"true"` or `"1"`.
    pub fn is_timed(&self) -> bool {
        matches!(self.get("timed"), Some("true") | Some("1"))
    }
}

impl FromIterator<(String, String)> for MatchParams {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// Administrative signals, sent as JSON `{"type": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Signal {
    Ping,
    ResetRound,
}

#[derive(Debug, Serialize)]
struct SignalReply {
    phase: MatchPhase,
    label: MatchLabel,
    accepted: bool,
}

/// One running match.
#[derive(Debug, Clone, Getters)]
pub struct MatchCore {
    /// Id the scheduler knows this match by.
    match_id: String,
    /// Timing settings.
    config: EngineConfig,
    /// Current state.
    state: MatchState,
}

impl MatchCore {
    /// Creates a match. Returns the instance, its tick rate and its
    /// initial label JSON.
    #[instrument(skip(config, params), fields(timed = params.is_timed()))]
    pub fn init(
        match_id: impl Into<String> + std::fmt::Debug,
        config: EngineConfig,
        params: &MatchParams,
    ) -> (Self, u32, String) {
        let match_id = match_id.into();
        let label = MatchLabel::new(params.is_timed());
        let label_json = label.to_json();
        let tick_rate = *config.tick_rate();
        info!(match_id = %match_id, tick_rate, label = %label_json, "Match created");

        let core = Self {
            match_id,
            config,
            state: MatchState::new(label),
        };
        (core, tick_rate, label_json)
    }

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        self.state.phase()
    }

    /// Admission control. A successful attempt must be followed by
    /// [`MatchCore::join`] for the same presence.
    #[instrument(skip(self, presence), fields(match_id = %self.match_id, user_id = %presence.user_id()))]
    pub fn join_attempt(&mut self, presence: &Presence) -> Result<(), JoinRejection> {
        let user_id = presence.user_id();
        if self.state.playing()
            && self.state.mark_of(user_id).is_none()
            && !self.state.presences.is_active(user_id)
        {
            debug!("Rejecting outsider while a round is running");
            return Err(JoinRejection::MatchFull);
        }

        let admission = self.state.presences.admit(user_id)?;
        debug!(?admission, "Join admitted");
        Ok(())
    }

    /// Completes admitted joins.
    #[instrument(skip(self, ctx, presences), fields(match_id = %self.match_id, count = presences.len()))]
    pub fn join(&mut self, ctx: &mut MatchContext<'_>, presences: Vec<Presence>) {
        for presence in presences {
            info!(user_id = %presence.user_id(), "Player joined");
            self.state.presences.complete_join(presence.clone());
            self.state.empty_ticks = 0;

            if self.state.playing() {
                if let Some(update) = self.update_message(ctx.now()) {
                    ctx.send(ServerMessage::Update(update), Recipients::one(presence));
                }
            } else if self.state.mark_of(presence.user_id()).is_some() {
                if let Some(done) = self.done_message(ctx.now()) {
                    ctx.send(ServerMessage::Done(done), Recipients::one(presence));
                }
            }
        }

        if self.state.result.is_none() && self.state.presences.active_count() >= 2 {
            self.start_round(ctx);
        }

        if self.state.presences.total() >= 2 && *self.state.label.open() {
            self.state.label.set_open(false);
            ctx.publish_label(self.state.label.to_json());
        }
    }

    /// Handles departures. A round left with a single connected
    /// participant is forfeited to them.
    #[instrument(skip(self, ctx, presences), fields(match_id = %self.match_id, count = presences.len()))]
    pub fn leave(&mut self, ctx: &mut MatchContext<'_>, presences: Vec<Presence>) -> Flow {
        for presence in &presences {
            if self.state.presences.mark_departed(presence.user_id()) {
                info!(user_id = %presence.user_id(), "Player left");
            } else {
                warn!(user_id = %presence.user_id(), "Leave for unknown user");
            }
        }

        let remaining = self.state.presences.active_presences();

        if self.state.playing() {
            let participants: Vec<Presence> = remaining
                .into_iter()
                .filter(|p| self.state.mark_of(p.user_id()).is_some())
                .collect();

            if let [survivor] = participants.as_slice() {
                info!(user_id = %survivor.user_id(), "Opponent left, awarding round");
                self.forfeit_to(ctx, survivor.clone());
            }
        } else if let [survivor] = remaining.as_slice() {
            ctx.send(ServerMessage::OpponentLeft, Recipients::one(survivor.clone()));
        }

        Flow::Continue
    }

    /// Drops a join admitted by [`MatchCore::join_attempt`] that will never
    /// be completed, releasing its seat.
    #[instrument(skip(self, presence), fields(match_id = %self.match_id, user_id = %presence.user_id()))]
    pub fn cancel_join(&mut self, presence: &Presence) {
        if self.state.presences.cancel_join() {
            info!("Admitted join abandoned");
        } else {
            warn!("No join in flight to cancel");
        }
    }

    /// Advances the match by one tick, consuming the buffered messages in
    /// receipt order.
    #[instrument(skip(self, ctx, messages), fields(match_id = %self.match_id, messages = messages.len()))]
    pub fn tick(&mut self, ctx: &mut MatchContext<'_>, messages: Vec<InboundMessage>) -> Flow {
        if self.state.presences.occupancy() == 0 {
            self.state.empty_ticks += 1;
            if self.state.empty_ticks >= self.config.max_empty_ticks() {
                if self.state.playing() {
                    info!("Both players gone, recording abandoned round as a draw");
                    self.finish_round(ctx, RoundResult::Draw, None, Recipients::All);
                }
                info!(empty_ticks = self.state.empty_ticks, "Closing idle match");
                return Flow::Terminate;
            }
        }

        if !self.state.playing() {
            self.state.presences.purge_reserved();

            if self.state.presences.total() < 2 && !*self.state.label.open() {
                self.state.label.set_open(true);
                ctx.publish_label(self.state.label.to_json());
            }

            if self.state.result.is_none() && self.state.presences.active_count() >= 2 {
                self.start_round(ctx);
            }

            return Flow::Continue;
        }

        if self.forfeit_if_abandoned(ctx) {
            return Flow::Continue;
        }

        for message in messages {
            if self.handle_message(ctx, message) == Flow::Terminate {
                return Flow::Terminate;
            }
        }

        self.advance_deadline(ctx);
        Flow::Continue
    }

    /// Called when the host shuts the match down. State is left untouched.
    #[instrument(skip(self, _ctx), fields(match_id = %self.match_id, phase = %self.state.phase()))]
    pub fn terminate(&mut self, _ctx: &mut MatchContext<'_>, grace_secs: u32) {
        info!(grace_secs, "Match terminating");
    }

    /// Handles an administrative signal and returns the reply, if any.
    #[instrument(skip(self, ctx), fields(match_id = %self.match_id))]
    pub fn signal(&mut self, ctx: &mut MatchContext<'_>, payload: &str) -> Option<String> {
        let signal: Signal = match serde_json::from_str(payload) {
            Ok(signal) => signal,
            Err(e) => {
                warn!(error = %e, "Ignoring unrecognised signal");
                return None;
            }
        };

        let accepted = match signal {
            Signal::Ping => true,
            Signal::ResetRound => self.reset_round(ctx),
        };

        let reply = SignalReply {
            phase: self.state.phase(),
            label: self.state.label,
            accepted,
        };
        match serde_json::to_string(&reply) {
            Ok(json) => Some(json),
            Err(e) => {
                error!(error = %e, "Failed to encode signal reply");
                None
            }
        }
    }

    /// Clears a finished round once both of its participants are gone.
    fn reset_round(&mut self, ctx: &mut MatchContext<'_>) -> bool {
        if self.state.phase() != MatchPhase::RoundOver {
            debug!(phase = %self.state.phase(), "Reset refused outside round over");
            return false;
        }
        let connected: Vec<&String> = self
            .state
            .marks
            .iter()
            .map(|(user_id, _)| user_id)
            .filter(|user_id| self.state.presences.is_active(user_id))
            .collect();
        if !connected.is_empty() {
            debug!(?connected, "Reset refused while a participant is connected");
            return false;
        }

        self.state.presences.purge_reserved();
        self.state.clear_round();
        info!("Round reset");

        if self.state.presences.total() < 2 && !*self.state.label.open() {
            self.state.label.set_open(true);
            ctx.publish_label(self.state.label.to_json());
        }
        if self.state.presences.active_count() >= 2 {
            self.start_round(ctx);
        }
        true
    }

    fn start_round(&mut self, ctx: &mut MatchContext<'_>) {
        let timed = *self.state.label.timed();
        self.state.marks = self
            .state
            .presences
            .active_presences()
            .into_iter()
            .zip([Mark::X, Mark::O])
            .map(|(presence, mark)| (presence.user_id().clone(), mark))
            .collect();
        self.state.board = Some(Board::new());
        self.state.mark = Mark::X;
        self.state.result = Some(RoundResult::InProgress);
        self.state.winner_positions = None;
        self.state.history.clear();
        self.state.abandoned_ticks = 0;
        self.state.deadline_remaining_ticks = self.config.deadline_ticks(timed);

        info!(participants = ?self.state.marks, timed, "Round started");

        let start = StartMessage {
            board: Board::new().cells(),
            marks: self.state.marks.iter().cloned().collect(),
            mark: self.state.mark,
            deadline: self.wire_deadline(ctx.now()),
        };
        ctx.send(ServerMessage::Start(start), Recipients::All);
    }

    /// Validates and applies one client message. Invalid messages are
    /// answered with REJECTED to the sender and change nothing.
    fn handle_message(&mut self, ctx: &mut MatchContext<'_>, message: InboundMessage) -> Flow {
        let sender = message.sender;
        let user_id = sender.user_id().clone();

        let Some(mark) = self.state.mark_of(&user_id) else {
            debug!(%user_id, "Message from non-participant");
            ctx.send(ServerMessage::Rejected, Recipients::one(sender));
            return Flow::Continue;
        };

        let position = match ClientMessage::decode(message.op_code, &message.data) {
            Ok(ClientMessage::Move(position)) => position,
            Err(e) => {
                debug!(%user_id, error = %e, "Undecodable message");
                ctx.send(ServerMessage::Rejected, Recipients::one(sender));
                return Flow::Continue;
            }
        };

        if mark != self.state.mark {
            debug!(%user_id, %mark, turn = %self.state.mark, "Move out of turn");
            ctx.send(ServerMessage::Rejected, Recipients::one(sender));
            return Flow::Continue;
        }

        let Some(board) = self.state.board.as_mut() else {
            error!("Round in progress without a board");
            ctx.send(ServerMessage::Rejected, Recipients::one(sender));
            return Flow::Continue;
        };

        let mv = Move::new(mark, position);
        if let Err(e) = board.place(mv) {
            debug!(%user_id, error = %e, "Move refused");
            ctx.send(ServerMessage::Rejected, Recipients::one(sender));
            return Flow::Continue;
        }
        let (result, line) = round_result(board, mark);

        self.state.history.push(mv);
        self.state.mark = mark.opponent();
        self.state.deadline_remaining_ticks = self.config.deadline_ticks(*self.state.label.timed());
        debug!(%user_id, %mv, "Move accepted");

        #[cfg(debug_assertions)]
        self.check_board_invariants();

        if result.is_terminal() {
            self.finish_round(ctx, result, line, Recipients::All);
            return Flow::Terminate;
        }

        if let Some(update) = self.update_message(ctx.now()) {
            ctx.send(ServerMessage::Update(update), Recipients::All);
        }
        Flow::Continue
    }

    /// Awards the running round to `survivor` and tells them their opponent
    /// is gone.
    fn forfeit_to(&mut self, ctx: &mut MatchContext<'_>, survivor: Presence) {
        let Some(mark) = self.state.mark_of(survivor.user_id()) else {
            return;
        };
        let recipients = Recipients::one(survivor);
        if self.finish_round(ctx, RoundResult::Win(mark), None, recipients.clone()) {
            ctx.send(ServerMessage::OpponentLeft, recipients);
        }
    }

    /// A round where only one participant came back after both dropped is
    /// forfeited to them once the other has stayed away for the idle window.
    fn forfeit_if_abandoned(&mut self, ctx: &mut MatchContext<'_>) -> bool {
        let connected: Vec<Presence> = self
            .state
            .presences
            .active_presences()
            .into_iter()
            .filter(|p| self.state.mark_of(p.user_id()).is_some())
            .collect();
        let [survivor] = connected.as_slice() else {
            self.state.abandoned_ticks = 0;
            return false;
        };

        self.state.abandoned_ticks += 1;
        if self.state.abandoned_ticks < self.config.max_empty_ticks() {
            return false;
        }
        info!(
            user_id = %survivor.user_id(),
            abandoned_ticks = self.state.abandoned_ticks,
            "Opponent never returned, awarding round"
        );
        self.forfeit_to(ctx, survivor.clone());
        true
    }

    /// Timed mode counts down and passes the turn on expiry; untimed mode
    /// keeps the deadline pinned.
    fn advance_deadline(&mut self, ctx: &mut MatchContext<'_>) {
        let timed = *self.state.label.timed();
        let budget = self.config.deadline_ticks(timed);

        if !timed {
            self.state.deadline_remaining_ticks = self.state.deadline_remaining_ticks.max(budget);
            return;
        }

        self.state.deadline_remaining_ticks -= 1;
        if self.state.deadline_remaining_ticks <= 0 {
            let expired = self.state.mark;
            self.state.mark = expired.opponent();
            self.state.deadline_remaining_ticks = budget;
            info!(%expired, next = %self.state.mark, "Turn timed out, passing turn");
            if let Some(update) = self.update_message(ctx.now()) {
                ctx.send(ServerMessage::Update(update), Recipients::All);
            }
        }
    }

    /// Ends the running round, reports it and sends DONE. Does nothing if
    /// no round is in progress.
    fn finish_round(
        &mut self,
        ctx: &mut MatchContext<'_>,
        result: RoundResult,
        line: Option<WinningLine>,
        recipients: Recipients,
    ) -> bool {
        if !self.state.playing() || !result.is_terminal() {
            return false;
        }

        self.state.result = Some(result);
        self.state.winner_positions = line;
        self.state.deadline_remaining_ticks = 0;
        self.state.next_game_remaining_ticks = 0;

        let participants = self.state.participants();
        let winner = result
            .winner()
            .and_then(|mark| self.state.user_of_mark(mark))
            .cloned();
        let report = match winner {
            Some(winner) => OutcomeReport::win(winner, participants, ctx.match_id()),
            None => {
                if !result.is_draw() {
                    warn!(%result, "Winning mark has no participant, reporting a draw");
                }
                OutcomeReport::draw(participants, ctx.match_id())
            }
        };
        info!(%result, winner = ?report.winner(), "Round finished");
        ctx.report(&report);

        if let Some(done) = self.done_message(ctx.now()) {
            ctx.send(ServerMessage::Done(done), recipients);
        }
        true
    }

    fn wire_deadline(&self, now: i64) -> i64 {
        now + self.state.deadline_remaining_ticks / i64::from(*self.config.tick_rate())
    }

    fn update_message(&self, now: i64) -> Option<UpdateMessage> {
        let board = self.state.board.as_ref()?;
        Some(UpdateMessage {
            board: board.cells(),
            mark: self.state.mark,
            deadline: self.wire_deadline(now),
        })
    }

    fn done_message(&self, now: i64) -> Option<DoneMessage> {
        let board = self.state.board.as_ref()?;
        let result = self.state.result?;
        let next_game_start = if self.state.next_game_remaining_ticks > 0 {
            now + self.state.next_game_remaining_ticks / i64::from(*self.config.tick_rate())
        } else {
            0
        };
        Some(DoneMessage::new(
            board,
            result.winner(),
            self.state.winner_positions,
            next_game_start,
        ))
    }

    #[cfg(debug_assertions)]
    fn check_board_invariants(&self) {
        use arena_board::invariants::{self, MonotonicBoardInvariant, RoundView};

        let Some(board) = self.state.board.as_ref() else {
            return;
        };
        let view = RoundView {
            board,
            history: &self.state.history,
        };
        if let Err(violation) = invariants::check::<_, MonotonicBoardInvariant>(&view) {
            error!(%violation, "Board invariant violated");
        }
    }
}
