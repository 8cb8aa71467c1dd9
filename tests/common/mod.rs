//! Shared helpers for driving a match without a scheduler.

#![allow(dead_code)]

use tictactoe_arena::{
    Dispatcher, EngineConfig, Envelope, FixedClock, Flow, InboundMessage, JoinRejection,
    MatchContext, MatchCore, MatchParams, OpCode, Presence, RecordingReporter, ServerMessage,
};

pub const MATCH_ID: &str = "match-1";
pub const NOW: i64 = 1_700_000_000;

/// Keeps everything a match sends.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    pub envelopes: Vec<Envelope>,
    pub labels: Vec<String>,
}

impl Dispatcher for RecordingDispatcher {
    fn broadcast(&mut self, envelope: Envelope) {
        self.envelopes.push(envelope);
    }

    fn update_label(&mut self, label: String) {
        self.labels.push(label);
    }
}

/// A match core wired to in-memory collaborators.
pub struct Harness {
    pub core: MatchCore,
    pub dispatcher: RecordingDispatcher,
    pub reporter: RecordingReporter,
    pub clock: FixedClock,
}

impl Harness {
    pub fn new(config: EngineConfig, timed: bool) -> Self {
        let (core, _, _) = MatchCore::init(MATCH_ID, config, &MatchParams::new().with_timed(timed));
        Self {
            core,
            dispatcher: RecordingDispatcher::default(),
            reporter: RecordingReporter::new(),
            clock: FixedClock::new(NOW),
        }
    }

    pub fn untimed() -> Self {
        Self::new(EngineConfig::default(), false)
    }

    /// Two players admitted and joined; the round has started and the
    /// outbox is cleared.
    pub fn playing(config: EngineConfig, timed: bool) -> Self {
        let mut harness = Self::new(config, timed);
        harness.attempt("alice").expect("alice admitted");
        harness.attempt("bob").expect("bob admitted");
        harness.join(&["alice", "bob"]);
        harness.drain();
        harness
    }

    pub fn attempt(&mut self, user: &str) -> Result<(), JoinRejection> {
        self.core.join_attempt(&presence(user))
    }

    pub fn join(&mut self, users: &[&str]) {
        let Harness {
            core,
            dispatcher,
            reporter,
            clock,
        } = self;
        let mut ctx = MatchContext::new(MATCH_ID, dispatcher, reporter, clock);
        core.join(&mut ctx, users.iter().map(|u| presence(u)).collect());
    }

    /// Admission followed by join, for each user in turn.
    pub fn enter(&mut self, user: &str) {
        self.attempt(user).expect("join admitted");
        self.join(&[user]);
    }

    pub fn cancel(&mut self, user: &str) {
        self.core.cancel_join(&presence(user));
    }

    pub fn leave(&mut self, users: &[&str]) -> Flow {
        let Harness {
            core,
            dispatcher,
            reporter,
            clock,
        } = self;
        let mut ctx = MatchContext::new(MATCH_ID, dispatcher, reporter, clock);
        core.leave(&mut ctx, users.iter().map(|u| presence(u)).collect())
    }

    pub fn tick(&mut self, messages: Vec<InboundMessage>) -> Flow {
        let Harness {
            core,
            dispatcher,
            reporter,
            clock,
        } = self;
        let mut ctx = MatchContext::new(MATCH_ID, dispatcher, reporter, clock);
        core.tick(&mut ctx, messages)
    }

    pub fn signal(&mut self, payload: &str) -> Option<String> {
        let Harness {
            core,
            dispatcher,
            reporter,
            clock,
        } = self;
        let mut ctx = MatchContext::new(MATCH_ID, dispatcher, reporter, clock);
        core.signal(&mut ctx, payload)
    }

    pub fn terminate(&mut self, grace_secs: u32) {
        let Harness {
            core,
            dispatcher,
            reporter,
            clock,
        } = self;
        let mut ctx = MatchContext::new(MATCH_ID, dispatcher, reporter, clock);
        core.terminate(&mut ctx, grace_secs);
    }

    /// Plays one move per tick and returns the flow of the last tick.
    pub fn play(&mut self, moves: &[(&str, i64)]) -> Flow {
        let mut flow = Flow::Continue;
        for (user, position) in moves {
            flow = self.tick(vec![move_msg(user, *position)]);
        }
        flow
    }

    /// Takes everything broadcast so far.
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.dispatcher.labels.clear();
        std::mem::take(&mut self.dispatcher.envelopes)
    }

    pub fn op_codes(&self) -> Vec<OpCode> {
        self.dispatcher
            .envelopes
            .iter()
            .map(|e| *e.op_code())
            .collect()
    }
}

pub fn presence(user: &str) -> Presence {
    Presence::new(user, format!("{}-session", user))
}

pub fn move_msg(user: &str, position: i64) -> InboundMessage {
    InboundMessage::new(
        presence(user),
        OpCode::Move.value(),
        format!("{{\"position\":{}}}", position).into_bytes(),
    )
}

pub fn decode(envelope: &Envelope) -> ServerMessage {
    envelope.message().expect("server message decodes")
}
