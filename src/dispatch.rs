//! Outbound seam between a match and its transport.
//!
//! The lifecycle controller never talks to sockets. It hands encoded
//! [`Envelope`]s and label updates to a [`Dispatcher`], and terminal
//! outcomes to a [`ResultReporter`], through a per-call [`MatchContext`].

use crate::clock::Clock;
use crate::protocol::{OpCode, ServerMessage};
use crate::presence::Presence;
use crate::reporter::{OutcomeReport, ResultReporter};
use derive_getters::Getters;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Who receives a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    /// Every connected presence of the match.
    All,
    /// Only these presences.
    Only(Vec<Presence>),
}

impl Recipients {
    /// A single presence.
    pub fn one(presence: Presence) -> Self {
        Recipients::Only(vec![presence])
    }

    /// True if a user would receive the broadcast.
    pub fn includes(&self, user_id: &str) -> bool {
        match self {
            Recipients::All => true,
            Recipients::Only(presences) => presences.iter().any(|p| p.user_id() == user_id),
        }
    }
}

/// An encoded message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Getters, derive_new::new)]
pub struct Envelope {
    /// Message opcode.
    op_code: OpCode,
    /// JSON payload, absent for payload-less opcodes.
    payload: Option<String>,
    /// Target presences.
    recipients: Recipients,
}

impl Envelope {
    /// Decodes the payload back into a typed message.
    pub fn message(&self) -> Result<ServerMessage, crate::protocol::DecodeError> {
        ServerMessage::decode(self.op_code, self.payload.as_deref())
    }
}

/// Broadcast transport and label publication.
pub trait Dispatcher: Send {
    /// Sends an envelope. Delivery is fire-and-forget.
    fn broadcast(&mut self, envelope: Envelope);

    /// Publishes the match label JSON.
    fn update_label(&mut self, label: String);
}

/// Everything a lifecycle call may reach outside the match state.
pub struct MatchContext<'a> {
    match_id: &'a str,
    dispatcher: &'a mut dyn Dispatcher,
    reporter: &'a dyn ResultReporter,
    clock: &'a dyn Clock,
}

impl<'a> MatchContext<'a> {
    /// Bundles the collaborators for one invocation.
    pub fn new(
        match_id: &'a str,
        dispatcher: &'a mut dyn Dispatcher,
        reporter: &'a dyn ResultReporter,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            match_id,
            dispatcher,
            reporter,
            clock,
        }
    }

    /// Id of the match being driven.
    pub fn match_id(&self) -> &str {
        self.match_id
    }

    /// Current unix time in seconds.
    pub fn now(&self) -> i64 {
        self.clock.now_unix_secs()
    }

    /// Encodes and broadcasts a message. Encoding failures are logged and
    /// the message is dropped.
    pub fn send(&mut self, message: ServerMessage, recipients: Recipients) {
        match message.encode(recipients) {
            Ok(envelope) => {
                debug!(match_id = %self.match_id, op_code = %envelope.op_code(), "Broadcasting message");
                self.dispatcher.broadcast(envelope);
            }
            Err(e) => {
                error!(match_id = %self.match_id, op_code = %message.op_code(), error = %e, "Failed to encode message");
            }
        }
    }

    /// Publishes a label JSON.
    pub fn publish_label(&mut self, label: String) {
        debug!(match_id = %self.match_id, label = %label, "Publishing label");
        self.dispatcher.update_label(label);
    }

    /// Hands an outcome to the reporter. Errors are logged and swallowed.
    pub fn report(&self, report: &OutcomeReport) {
        if let Err(e) = self.reporter.record_outcome(report) {
            error!(match_id = %self.match_id, error = %e, "Failed to record game result");
        }
    }
}

/// What a [`ChannelDispatcher`] forwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// A protocol message.
    Message(Envelope),
    /// A new label JSON.
    Label(String),
}

/// An outbound event tagged with its match.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct Outbound {
    /// Originating match.
    match_id: String,
    /// The event.
    event: OutboundEvent,
}

impl Outbound {
    /// Splits into match id and event.
    pub fn into_parts(self) -> (String, OutboundEvent) {
        (self.match_id, self.event)
    }
}

/// Forwards everything onto an unbounded channel, in production order.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    match_id: String,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelDispatcher {
    /// Creates a dispatcher for one match.
    pub fn new(match_id: String, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { match_id, tx }
    }

    fn forward(&self, event: OutboundEvent) {
        let outbound = Outbound {
            match_id: self.match_id.clone(),
            event,
        };
        if self.tx.send(outbound).is_err() {
            warn!(match_id = %self.match_id, "Outbound channel closed, dropping event");
        }
    }
}

impl Dispatcher for ChannelDispatcher {
    fn broadcast(&mut self, envelope: Envelope) {
        self.forward(OutboundEvent::Message(envelope));
    }

    fn update_label(&mut self, label: String) {
        self.forward(OutboundEvent::Label(label));
    }
}
